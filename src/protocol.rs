//! HTTP request/response DTOs and the API error type.
//!
//! Domain types serialize directly where the wire shape matches; everything
//! else gets an explicit Out struct here so the API surface can evolve
//! without touching storage formats.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::assess::{AttemptOutcome, Correction, GradeReport, SubmissionError};
use crate::domain::{
  CognitiveLevel, Course, DifficultyTier, FeedbackTag, Lesson, Mastery, ProficiencyRecord,
  QuizQuestion,
};
use crate::pipeline::GenerationExhausted;
use crate::regen::RegenError;
use crate::storage::StoreError;

// ---- requests ----

#[derive(Debug, Deserialize)]
pub struct GenerateCourseIn {
  pub topic: String,
  #[serde(default)]
  pub audience: Option<String>,
  #[serde(default)]
  pub duration_hours: Option<u32>,
}

#[derive(Debug, Deserialize)]
pub struct RegenerateLessonIn {
  pub feedback: FeedbackTag,
  /// Free-form notes passed through to the rewrite prompt and kept in the
  /// course's feedback log.
  #[serde(default)]
  pub comments: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateQuizIn {
  #[serde(default)]
  pub num_questions: Option<usize>,
  /// Explicit tier override; without it the learner's current tier is used.
  #[serde(default)]
  pub difficulty: Option<DifficultyTier>,
}

#[derive(Debug, Deserialize)]
pub struct SubmitQuizIn {
  /// question_id -> selected option text.
  pub answers: HashMap<String, String>,
  #[serde(default)]
  pub feedback: Option<FeedbackTag>,
}

// ---- responses ----

#[derive(Serialize)]
pub struct HealthOut {
  pub ok: bool,
  pub llm_enabled: bool,
}

#[derive(Serialize)]
pub struct CourseSummaryOut {
  pub course_id: String,
  pub title: String,
  pub topic: String,
  pub audience: String,
  pub duration_hours: u32,
  pub confirmed: bool,
  pub version: u32,
  pub created_at: DateTime<Utc>,
  pub module_count: usize,
  pub lesson_count: usize,
}

impl CourseSummaryOut {
  pub fn from_course(c: &Course) -> Self {
    Self {
      course_id: c.course_id.clone(),
      title: c.title.clone(),
      topic: c.topic.clone(),
      audience: c.audience.as_str().to_string(),
      duration_hours: c.duration_hours,
      confirmed: c.confirmed,
      version: c.version,
      created_at: c.created_at,
      module_count: c.modules.len(),
      lesson_count: c.modules.iter().map(|m| m.lessons.len()).sum(),
    }
  }
}

#[derive(Serialize)]
pub struct DeleteOut {
  pub deleted: bool,
}

/// Mutation responses return the generated content even when writing it back
/// failed; `saved` tells the client whether the content is on disk or only in
/// this response body.
#[derive(Serialize)]
pub struct CourseOut {
  pub saved: bool,
  pub course: Course,
}

#[derive(Serialize)]
pub struct LessonOut {
  pub saved: bool,
  pub lesson: Lesson,
}

#[derive(Serialize)]
pub struct QuizOut {
  pub saved: bool,
  pub questions: Vec<QuizQuestion>,
}

#[derive(Serialize)]
pub struct QuizResultOut {
  pub course_id: String,
  pub lesson_id: String,
  pub score: f32,
  pub correct_count: usize,
  pub total_questions: usize,
  pub passed: bool,
  /// True when any answer was wrong; the client shows the corrections pane.
  pub needs_feedback: bool,
  pub previous_difficulty: DifficultyTier,
  pub updated_difficulty: DifficultyTier,
  pub current_level: CognitiveLevel,
  pub next_level: CognitiveLevel,
  pub attempts: u32,
  pub best_score: f32,
  pub smoothed_score: f32,
  pub mastery: &'static str,
  pub corrections: Vec<Correction>,
}

impl QuizResultOut {
  pub fn from_outcome(
    course_id: &str,
    lesson_id: &str,
    report: GradeReport,
    outcome: AttemptOutcome,
  ) -> Self {
    Self {
      course_id: course_id.to_string(),
      lesson_id: lesson_id.to_string(),
      score: outcome.score,
      correct_count: report.correct_count,
      total_questions: report.total_questions,
      passed: outcome.passed,
      needs_feedback: report.correct_count < report.total_questions,
      previous_difficulty: outcome.previous_difficulty,
      updated_difficulty: outcome.next_difficulty,
      current_level: outcome.previous_level,
      next_level: outcome.next_level,
      attempts: outcome.attempts,
      best_score: outcome.best_score,
      smoothed_score: outcome.smoothed_score,
      mastery: outcome.mastery.label(),
      corrections: report.corrections,
    }
  }
}

#[derive(Serialize)]
pub struct LessonProgressOut {
  pub lesson_id: String,
  pub title: String,
  pub attempts: u32,
  pub best_score: f32,
  pub smoothed_score: f32,
  pub current_difficulty: DifficultyTier,
  pub current_level: CognitiveLevel,
  pub completed: bool,
  pub mastery: &'static str,
}

#[derive(Serialize)]
pub struct ProgressOut {
  pub course_id: String,
  pub user_id: String,
  pub lessons_total: usize,
  pub lessons_completed: usize,
  pub completion_percent: f32,
  pub lessons: Vec<LessonProgressOut>,
}

/// One row of the all-courses progress overview.
#[derive(Serialize)]
pub struct CourseProgressSummaryOut {
  pub course_id: String,
  pub title: String,
  pub confirmed: bool,
  pub lessons_total: usize,
  pub lessons_completed: usize,
  pub completion_percent: f32,
}

pub fn lesson_progress_out(
  lesson_id: &str,
  title: &str,
  record: Option<&ProficiencyRecord>,
  mastery: Mastery,
) -> LessonProgressOut {
  match record {
    Some(r) => LessonProgressOut {
      lesson_id: lesson_id.to_string(),
      title: title.to_string(),
      attempts: r.attempts,
      best_score: r.best_score,
      smoothed_score: r.smoothed_score,
      current_difficulty: r.current_difficulty,
      current_level: r.current_level,
      completed: r.completed,
      mastery: mastery.label(),
    },
    None => LessonProgressOut {
      lesson_id: lesson_id.to_string(),
      title: title.to_string(),
      attempts: 0,
      best_score: 0.0,
      smoothed_score: 0.0,
      current_difficulty: DifficultyTier::Medium,
      current_level: CognitiveLevel::Remember,
      completed: false,
      mastery: Mastery::NotStarted.label(),
    },
  }
}

// ---- errors ----

#[derive(Serialize)]
pub struct ErrorOut {
  pub error: String,
}

#[derive(Debug)]
pub enum ApiError {
  NotFound(String),
  Forbidden(String),
  Conflict(String),
  Unprocessable(String),
  Unavailable(String),
  UpstreamFailed(String),
  Internal(String),
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let (status, msg) = match self {
      ApiError::NotFound(m) => (StatusCode::NOT_FOUND, m),
      ApiError::Forbidden(m) => (StatusCode::FORBIDDEN, m),
      ApiError::Conflict(m) => (StatusCode::CONFLICT, m),
      ApiError::Unprocessable(m) => (StatusCode::UNPROCESSABLE_ENTITY, m),
      ApiError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m),
      ApiError::UpstreamFailed(m) => (StatusCode::BAD_GATEWAY, m),
      ApiError::Internal(m) => (StatusCode::INTERNAL_SERVER_ERROR, m),
    };
    (status, Json(ErrorOut { error: msg })).into_response()
  }
}

impl From<StoreError> for ApiError {
  fn from(e: StoreError) -> Self {
    match e {
      StoreError::InvalidKey(k) => ApiError::Unprocessable(format!("invalid id: {k}")),
      other => ApiError::Internal(other.to_string()),
    }
  }
}

impl From<SubmissionError> for ApiError {
  fn from(e: SubmissionError) -> Self {
    ApiError::Unprocessable(e.to_string())
  }
}

impl From<GenerationExhausted> for ApiError {
  fn from(e: GenerationExhausted) -> Self {
    ApiError::UpstreamFailed(e.to_string())
  }
}

impl From<RegenError> for ApiError {
  fn from(e: RegenError) -> Self {
    match e {
      RegenError::Busy(slot) => {
        ApiError::Conflict(format!("regeneration already in progress for {slot}"))
      }
      RegenError::UnknownLesson(id) => ApiError::NotFound(format!("lesson not found: {id}")),
      RegenError::Exhausted(e) => ApiError::UpstreamFailed(e.to_string()),
      RegenError::Serde(e) => ApiError::Internal(e.to_string()),
    }
  }
}
