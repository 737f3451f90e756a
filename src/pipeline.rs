//! Generate-and-validate with a bounded retry loop.
//!
//! Retries exist to paper over non-deterministic generation quality: the same
//! prompt can yield valid or invalid structure on different calls. Failures
//! are dominated by content malformation rather than load, so the bound is
//! small and uniform and there is no backoff delay. After the first failed
//! attempt the stricter system prompt is used.

use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::config::{EngineConfig, Prompts};
use crate::domain::{
  CognitiveLevel, CourseAudience, DifficultyTier, FeedbackTag, GenerationRequest, Lesson,
  LessonBody,
};
use crate::llm::TextGenerator;
use crate::repair::{repair_json, RepairError};
use crate::schema::{validate, Shape};
use crate::util::{fill_template, trunc_for_log};

/// Terminal pipeline outcome after all attempts are consumed. This is a
/// normal (if unhappy) result value: the pipeline never panics on exhaustion.
#[derive(Debug, Error)]
#[error("generation exhausted after {attempts} attempts: {last_error}")]
pub struct GenerationExhausted {
  pub attempts: u32,
  /// Raw text of the last generator response, for diagnostics.
  pub last_raw: Option<String>,
  /// Details of the last repair/validation/transport failure.
  pub last_error: String,
}

/// System + user prompt for one pipeline invocation. `system_strict`
/// replaces `system` on retry attempts.
#[derive(Clone, Debug)]
pub struct PipelinePrompt {
  pub system: String,
  pub system_strict: String,
  pub user: String,
}

#[derive(Clone)]
pub struct RetryOrchestrator {
  generator: Arc<dyn TextGenerator>,
  max_attempts: u32,
}

impl RetryOrchestrator {
  pub fn new(generator: Arc<dyn TextGenerator>, config: &EngineConfig) -> Self {
    Self { generator, max_attempts: config.max_attempts.max(1) }
  }

  /// Run up to `max_attempts` generate/repair/validate rounds and return the
  /// first accepted value. Transport failures skip straight to the next
  /// attempt; malformed content goes through the repair cascade first.
  pub async fn generate_validated(
    &self,
    prompt: &PipelinePrompt,
    shape: Shape,
  ) -> Result<Value, GenerationExhausted> {
    self.generate_checked(prompt, shape, None).await
  }

  /// Like `generate_validated`, but a structurally valid response that does
  /// not actually cover `topic` is rejected and retried. Catches the failure
  /// mode where the generator returns a well-formed course about something
  /// else entirely.
  pub async fn generate_on_topic(
    &self,
    prompt: &PipelinePrompt,
    shape: Shape,
    topic: &str,
  ) -> Result<Value, GenerationExhausted> {
    self.generate_checked(prompt, shape, Some(topic)).await
  }

  #[instrument(level = "info", skip(self, prompt, topic), fields(shape = shape.as_str(), max_attempts = self.max_attempts))]
  async fn generate_checked(
    &self,
    prompt: &PipelinePrompt,
    shape: Shape,
    topic: Option<&str>,
  ) -> Result<Value, GenerationExhausted> {
    let mut last_raw: Option<String> = None;
    let mut last_error = String::from("no attempts made");

    for attempt in 1..=self.max_attempts {
      let system = if attempt == 1 { &prompt.system } else { &prompt.system_strict };

      let raw = match self.generator.generate(system, &prompt.user).await {
        Ok(text) => text,
        Err(e) => {
          warn!(target: "generation", attempt, error = %e, "generator call failed");
          last_error = format!("attempt {attempt}: {e}");
          continue;
        }
      };

      let decoded = match repair_json(&raw, shape) {
        Ok(v) => v,
        Err(RepairError::Unrecoverable { reason, raw }) => {
          warn!(target: "generation", attempt, reason = %reason,
                preview = %trunc_for_log(&raw, 200), "response not repairable");
          last_error = format!("attempt {attempt}: repair failed: {reason}");
          last_raw = Some(raw);
          continue;
        }
      };

      match validate(decoded, shape) {
        Ok(value) => {
          if let Some(topic) = topic {
            if !topic_is_covered(&value, topic) {
              warn!(target: "generation", attempt, topic, "valid response does not cover the topic");
              last_error = format!("attempt {attempt}: generated content does not cover \"{topic}\"");
              last_raw = Some(raw);
              continue;
            }
          }
          info!(target: "generation", attempt, "validated generation accepted");
          return Ok(value);
        }
        Err(e) => {
          warn!(target: "generation", attempt, error = %e, "schema validation rejected response");
          last_error = format!("attempt {attempt}: {e}");
          last_raw = Some(raw);
        }
      }
    }

    error!(target: "generation", attempts = self.max_attempts, error = %last_error, "generation exhausted");
    Err(GenerationExhausted { attempts: self.max_attempts, last_raw, last_error })
  }
}

/// Cheap lexical check that generated content is actually about `topic`.
/// Significant topic words (longer than three characters, split on spaces,
/// ampersands, and hyphens) are counted in the serialized content: at least
/// half of them must appear, with three mentions overall. A topic with no
/// significant words passes unchecked.
pub fn topic_is_covered(value: &Value, topic: &str) -> bool {
  let words: Vec<String> = topic
    .to_lowercase()
    .split(|c: char| c == ' ' || c == '&' || c == '-')
    .filter(|w| w.len() > 3)
    .map(str::to_string)
    .collect();
  if words.is_empty() {
    return true;
  }
  let haystack = value.to_string().to_lowercase();
  let found = words.iter().filter(|w| haystack.contains(w.as_str())).count();
  let mentions: usize = words.iter().map(|w| haystack.matches(w.as_str()).count()).sum();
  found >= (words.len() / 2).max(1) && mentions >= 3
}

/// Assemble the prompt for generating a whole course. Module count scales
/// with the requested duration; lesson count per module is fixed.
pub fn course_prompt(
  prompts: &Prompts,
  topic: &str,
  audience: CourseAudience,
  duration_hours: u32,
) -> PipelinePrompt {
  let num_modules = (duration_hours / 2).clamp(2, 6);
  let user = fill_template(
    &prompts.course_user_template,
    &[
      ("topic", topic),
      ("audience", audience.as_str()),
      ("duration_hours", &duration_hours.to_string()),
      ("num_modules", &num_modules.to_string()),
      ("lessons_per_module", "3"),
    ],
  );
  PipelinePrompt {
    system: prompts.course_system.clone(),
    system_strict: prompts.course_system_strict.clone(),
    user,
  }
}

/// Assemble the prompt for a quiz generation request, pitched at the
/// learner's current tier and level, with an optional feedback-driven
/// adaptation note.
pub fn quiz_prompt(prompts: &Prompts, req: &GenerationRequest) -> PipelinePrompt {
  let adaptation = match req.feedback {
    Some(FeedbackTag::TooHard) => {
      " The learner found previous questions too hard; keep wording simple and test one idea per question."
    }
    Some(FeedbackTag::TooEasy) => {
      " The learner found previous questions too easy; make the distractors more plausible."
    }
    Some(FeedbackTag::Unclear) => {
      " Previous questions were reported as unclear; make each question unambiguous and self-contained."
    }
    Some(FeedbackTag::MoreExamples) => {
      " Ground each question in a concrete example or scenario."
    }
    Some(FeedbackTag::DifferentApproach) => {
      " Approach the material from a different angle than a straight recall of the lesson text."
    }
    None => "",
  };
  let user = fill_template(
    &prompts.quiz_user_template,
    &[
      ("num_questions", &req.num_items.to_string()),
      ("lesson_content", &req.context),
      ("bloom_level", req.level.as_str()),
      ("bloom_description", req.level.description()),
      ("difficulty", req.difficulty.as_str()),
      ("adaptation", adaptation),
    ],
  );
  PipelinePrompt {
    system: prompts.quiz_system.clone(),
    system_strict: prompts.quiz_system.clone(),
    user,
  }
}

/// Flatten a lesson body into prompt text.
pub fn lesson_content_text(lesson: &Lesson) -> String {
  match &lesson.body {
    LessonBody::FreeText { text } => text.clone(),
    LessonBody::Structured(s) => {
      let mut out = String::new();
      out.push_str(&s.introduction);
      for c in &s.core_concepts {
        out.push_str("\n\n");
        out.push_str(&c.title);
        out.push_str(": ");
        out.push_str(&c.explanation);
        if let Some(code) = &c.code_example {
          out.push('\n');
          out.push_str(code);
        }
      }
      for e in &s.worked_examples {
        out.push_str("\n\nExample: ");
        out.push_str(&e.description);
        out.push_str(". ");
        out.push_str(&e.explanation);
      }
      out.push_str("\n\n");
      out.push_str(&s.summary);
      out
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::llm::GenerationError;
  use async_trait::async_trait;
  use std::sync::Mutex;

  /// Scripted generator: pops one canned outcome per call and counts calls.
  struct ScriptedGenerator {
    script: Mutex<Vec<Result<String, GenerationError>>>,
    calls: Mutex<u32>,
  }

  impl ScriptedGenerator {
    fn new(script: Vec<Result<String, GenerationError>>) -> Self {
      Self { script: Mutex::new(script), calls: Mutex::new(0) }
    }

    fn call_count(&self) -> u32 {
      *self.calls.lock().expect("lock")
    }
  }

  #[async_trait]
  impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
      *self.calls.lock().expect("lock") += 1;
      let mut script = self.script.lock().expect("lock");
      if script.is_empty() {
        return Err(GenerationError::Transport("script exhausted".into()));
      }
      script.remove(0)
    }
  }

  fn orchestrator(gen: Arc<ScriptedGenerator>) -> RetryOrchestrator {
    RetryOrchestrator::new(gen, &EngineConfig::default())
  }

  fn prompt() -> PipelinePrompt {
    PipelinePrompt {
      system: "system".into(),
      system_strict: "strict".into(),
      user: "user".into(),
    }
  }

  const VALID_QUIZ: &str = r#"[{"question": "2+2?", "options": ["3", "4", "5", "6"],
    "correct_answer": "4", "difficulty": "easy", "explanation": "Basic arithmetic"}]"#;

  #[tokio::test]
  async fn returns_on_first_valid_attempt_without_extra_calls() {
    let gen = Arc::new(ScriptedGenerator::new(vec![
      Ok(VALID_QUIZ.to_string()),
      Ok(VALID_QUIZ.to_string()),
    ]));
    let orch = orchestrator(gen.clone());
    let v = orch.generate_validated(&prompt(), Shape::QuizQuestions).await.expect("valid");
    assert!(v.is_array());
    assert_eq!(gen.call_count(), 1);
  }

  #[tokio::test]
  async fn transport_failure_moves_to_next_attempt() {
    let gen = Arc::new(ScriptedGenerator::new(vec![
      Err(GenerationError::Timeout),
      Ok(VALID_QUIZ.to_string()),
    ]));
    let orch = orchestrator(gen.clone());
    let v = orch.generate_validated(&prompt(), Shape::QuizQuestions).await;
    assert!(v.is_ok());
    assert_eq!(gen.call_count(), 2);
  }

  #[tokio::test]
  async fn invalid_content_retries_then_succeeds_via_embedded_extraction() {
    let wrapped = format!("Here you go:\n{VALID_QUIZ}\nHope that helps!");
    let gen = Arc::new(ScriptedGenerator::new(vec![
      Ok("total garbage, no structure".to_string()),
      Ok(wrapped),
    ]));
    let orch = orchestrator(gen.clone());
    let v = orch.generate_validated(&prompt(), Shape::QuizQuestions).await.expect("valid");
    assert_eq!(v[0]["correct_answer"], "4");
    assert_eq!(gen.call_count(), 2);
  }

  #[tokio::test]
  async fn never_exceeds_max_attempts_and_reports_last_raw() {
    let gen = Arc::new(ScriptedGenerator::new(vec![
      Ok("bad one".to_string()),
      Ok("bad two".to_string()),
      Ok("bad three".to_string()),
      Ok(VALID_QUIZ.to_string()), // must never be reached
    ]));
    let orch = orchestrator(gen.clone());
    let err = orch
      .generate_validated(&prompt(), Shape::QuizQuestions)
      .await
      .expect_err("exhausted");
    assert_eq!(gen.call_count(), 3);
    assert_eq!(err.attempts, 3);
    assert_eq!(err.last_raw.as_deref(), Some("bad three"));
  }

  #[tokio::test]
  async fn schema_rejection_is_preserved_in_exhaustion_report() {
    // Decodes fine but the correct answer is not among the options.
    let bad = r#"[{"question": "2+2?", "options": ["3", "4", "5", "6"],
      "correct_answer": "7", "explanation": "nope"}]"#;
    let gen = Arc::new(ScriptedGenerator::new(vec![
      Ok(bad.to_string()),
      Ok(bad.to_string()),
      Ok(bad.to_string()),
    ]));
    let orch = orchestrator(gen);
    let err = orch
      .generate_validated(&prompt(), Shape::QuizQuestions)
      .await
      .expect_err("exhausted");
    assert!(err.last_error.contains("correct_answer"));
  }

  fn course_payload(title: &str, prose: &str) -> String {
    format!(
      r#"{{"title": "{title}", "overview": "An overview", "modules": [{{
        "module_title": "M1", "module_description": "D1",
        "lessons": [{{"lesson_title": "L1", "bloom_level": "Remember",
          "learning_outcomes": ["o"], "content": "{prose}"}}]}}]}}"#
    )
  }

  #[tokio::test]
  async fn off_topic_course_is_retried_until_it_covers_the_topic() {
    let off = course_payload("Intro to Baking", "Knead the dough and proof it twice.");
    let on = course_payload(
      "Rust Ownership",
      "Ownership rules: each value has one owner. Ownership moves on assignment. Borrowing lets you use a value without taking ownership.",
    );
    let gen = Arc::new(ScriptedGenerator::new(vec![Ok(off), Ok(on)]));
    let orch = orchestrator(gen.clone());
    let v = orch
      .generate_on_topic(&prompt(), Shape::Course, "ownership")
      .await
      .expect("second attempt covers the topic");
    assert_eq!(v["title"], "Rust Ownership");
    assert_eq!(gen.call_count(), 2);
  }

  #[tokio::test]
  async fn persistently_off_topic_generation_exhausts_with_a_topic_error() {
    let off = course_payload("Intro to Baking", "Knead the dough and proof it twice.");
    let gen = Arc::new(ScriptedGenerator::new(vec![
      Ok(off.clone()),
      Ok(off.clone()),
      Ok(off),
    ]));
    let orch = orchestrator(gen);
    let err = orch
      .generate_on_topic(&prompt(), Shape::Course, "ownership")
      .await
      .expect_err("never on topic");
    assert!(err.last_error.contains("does not cover"));
  }

  #[test]
  fn topic_coverage_ignores_short_words_and_counts_mentions() {
    let value: Value = serde_json::from_str(&course_payload(
      "Graphs",
      "A graph has nodes and edges. Traversing a graph visits every node. Graph algorithms differ.",
    ))
    .expect("json");
    assert!(topic_is_covered(&value, "graph theory")); // "graph" 3x, "theory" absent but 1 of 2 suffices
    assert!(!topic_is_covered(&value, "linear algebra"));
    // Nothing significant to check in a short topic.
    assert!(topic_is_covered(&value, "c"));
  }

  #[test]
  fn course_prompt_scales_module_count_with_duration() {
    let prompts = Prompts::default();
    let short = course_prompt(&prompts, "rust", CourseAudience::Beginner, 2);
    assert!(short.user.contains("2 modules"));
    let long = course_prompt(&prompts, "rust", CourseAudience::Advanced, 40);
    assert!(long.user.contains("6 modules"));
    assert!(long.user.contains("\"rust\""));
  }

  #[test]
  fn quiz_prompt_carries_level_difficulty_and_adaptation() {
    let prompts = Prompts::default();
    let lesson = Lesson {
      lesson_id: "l-1".into(),
      title: "Ownership".into(),
      cognitive_level: CognitiveLevel::Apply,
      learning_outcomes: vec!["o".into()],
      estimated_duration_minutes: 30,
      body: LessonBody::FreeText { text: "Ownership moves values.".into() },
      quiz: Vec::new(),
    };
    let p = quiz_prompt(
      &prompts,
      &GenerationRequest {
        context: lesson_content_text(&lesson),
        level: CognitiveLevel::Analyze,
        difficulty: DifficultyTier::Hard,
        num_items: 5,
        feedback: Some(FeedbackTag::TooEasy),
      },
    );
    assert!(p.user.contains("exactly 5 quiz questions"));
    assert!(p.user.contains("Analyze"));
    assert!(p.user.contains("hard"));
    assert!(p.user.contains("Ownership moves values."));
    assert!(p.user.contains("distractors"));
  }
}
