//! Minimal chat-completions client for the generation pipeline.
//!
//! One prompt per call, hard timeout, no retrying here: retry policy belongs
//! to the pipeline module, which keeps this a pure I/O boundary. Calls are
//! instrumented and log model names, latencies, and response sizes (not
//! contents). The API key is never logged.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, USER_AGENT};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, instrument};

/// Typed transport outcomes. Each is terminal for one call; whether to try
/// again is the caller's decision.
#[derive(Debug, Error)]
pub enum GenerationError {
  #[error("request timed out")]
  Timeout,
  #[error("authentication failed: {0}")]
  AuthFailure(String),
  #[error("rate limited: {0}")]
  RateLimited(String),
  #[error("transport error: {0}")]
  Transport(String),
}

/// Boundary trait so the pipeline can be exercised with a scripted fake.
#[async_trait]
pub trait TextGenerator: Send + Sync {
  /// Send one prompt and return the raw response text.
  async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError>;
}

#[derive(Clone)]
pub struct LlmClient {
  client: reqwest::Client,
  api_key: String,
  base_url: String,
  model: String,
  temperature: f32,
}

impl LlmClient {
  /// Construct the client if LLM_API_KEY is present; otherwise return None.
  pub fn from_env(timeout: Duration) -> Option<Self> {
    let api_key = std::env::var("LLM_API_KEY").ok()?;
    let base_url =
      std::env::var("LLM_BASE_URL").unwrap_or_else(|_| "https://api.openai.com/v1".into());
    let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| "gpt-4o-mini".into());

    let client = reqwest::Client::builder().timeout(timeout).build().ok()?;

    Some(Self { client, api_key, base_url, model, temperature: 0.7 })
  }

  pub fn base_url(&self) -> &str { &self.base_url }
  pub fn model(&self) -> &str { &self.model }
}

#[async_trait]
impl TextGenerator for LlmClient {
  #[instrument(level = "info", skip(self, system, user), fields(model = %self.model, user_len = user.len()))]
  async fn generate(&self, system: &str, user: &str) -> Result<String, GenerationError> {
    let url = format!("{}/chat/completions", self.base_url);
    let req = ChatCompletionRequest {
      model: self.model.clone(),
      messages: vec![
        ChatMessageReq { role: "system".into(), content: system.into() },
        ChatMessageReq { role: "user".into(), content: user.into() },
      ],
      temperature: self.temperature,
      max_tokens: Some(8000),
    };

    let start = std::time::Instant::now();
    let res = self
      .client
      .post(&url)
      .header(USER_AGENT, "courseforge-backend/0.1")
      .header(CONTENT_TYPE, "application/json")
      .header(AUTHORIZATION, format!("Bearer {}", self.api_key))
      .json(&req)
      .send()
      .await
      .map_err(classify_reqwest_error)?;

    if !res.status().is_success() {
      let status = res.status();
      let body = res.text().await.unwrap_or_default();
      let msg = extract_api_error(&body).unwrap_or(body);
      return Err(match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => GenerationError::AuthFailure(msg),
        StatusCode::TOO_MANY_REQUESTS => GenerationError::RateLimited(msg),
        _ => GenerationError::Transport(format!("HTTP {status}: {msg}")),
      });
    }

    let body: ChatCompletionResponse =
      res.json().await.map_err(|e| GenerationError::Transport(e.to_string()))?;
    if let Some(usage) = &body.usage {
      info!(target: "generation",
            prompt_tokens = ?usage.prompt_tokens,
            completion_tokens = ?usage.completion_tokens,
            total_tokens = ?usage.total_tokens,
            "LLM usage");
    }
    let text = body
      .choices
      .first()
      .and_then(|c| c.message.content.clone())
      .unwrap_or_default();

    info!(target: "generation", elapsed = ?start.elapsed(), response_len = text.len(), "LLM response received");
    Ok(text)
  }
}

fn classify_reqwest_error(e: reqwest::Error) -> GenerationError {
  if e.is_timeout() {
    GenerationError::Timeout
  } else {
    GenerationError::Transport(e.to_string())
  }
}

// --- Chat DTOs ---

#[derive(Serialize)]
struct ChatCompletionRequest {
  model: String,
  messages: Vec<ChatMessageReq>,
  temperature: f32,
  #[serde(skip_serializing_if = "Option::is_none")]
  max_tokens: Option<u32>,
}
#[derive(Serialize)]
struct ChatMessageReq { role: String, content: String }

#[derive(Deserialize)]
struct ChatCompletionResponse {
  choices: Vec<ChatChoice>,
  #[serde(default)] usage: Option<Usage>,
}
#[derive(Deserialize)]
struct ChatChoice { message: ChatMessageResp }
#[derive(Deserialize)]
struct ChatMessageResp { content: Option<String> }
#[derive(Deserialize)]
struct Usage {
  #[serde(default)] prompt_tokens: Option<u32>,
  #[serde(default)] completion_tokens: Option<u32>,
  #[serde(default)] total_tokens: Option<u32>,
}

/// Try to extract a clean error message from an API error body.
fn extract_api_error(body: &str) -> Option<String> {
  #[derive(Deserialize)]
  struct EWrap { error: EObj }
  #[derive(Deserialize)]
  struct EObj { message: String }
  serde_json::from_str::<EWrap>(body).ok().map(|w| w.error.message)
}
