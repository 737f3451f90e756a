//! CourseForge · Adaptive Course Generation Backend
//!
//! - Axum HTTP API for course generation, quizzes, and progress tracking
//! - LLM-backed content generation with repair and validation
//! - JSON-file persistence under DATA_DIR
//!
//! Important env variables:
//!   PORT            : u16 (default 3000)
//!   LLM_API_KEY     : enables generation endpoints if present
//!   LLM_BASE_URL    : default "https://api.openai.com/v1"
//!   LLM_MODEL       : default "gpt-4o-mini"
//!   APP_CONFIG_PATH : path to TOML config (thresholds + prompt templates)
//!   DATA_DIR        : storage root (default "./data")
//!   LOG_LEVEL       : tracing filter, e.g. "debug" or full directives
//!   LOG_FORMAT      : "pretty" (default) or "json"

mod assess;
mod builder;
mod config;
mod domain;
mod llm;
mod pipeline;
mod protocol;
mod regen;
mod repair;
mod routes;
mod schema;
mod state;
mod storage;
mod telemetry;
mod util;

use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{info, instrument};

use crate::routes::build_router;
use crate::state::AppState;

#[instrument(level = "info", skip_all)]
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
  telemetry::init_tracing();

  // Build shared application state (store, engine, pipeline, prompts).
  let state = Arc::new(AppState::new()?);

  // Build the HTTP router with routes, CORS and tracing layers.
  let app = build_router(state);

  // Read port from env or default to 3000.
  let addr: SocketAddr = std::env::var("PORT")
    .ok()
    .and_then(|p| p.parse::<u16>().ok())
    .map(|port| SocketAddr::from(([0, 0, 0, 0], port)))
    .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], 3000)));

  let listener = TcpListener::bind(addr).await?;
  info!(target: "courseforge_backend", %addr, "HTTP server listening");
  axum::serve(listener, app)
    .with_graceful_shutdown(shutdown_signal())
    .await?;
  Ok(())
}

async fn shutdown_signal() {
  if tokio::signal::ctrl_c().await.is_ok() {
    info!(target: "courseforge_backend", "shutdown signal received");
  }
}
