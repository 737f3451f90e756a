//! HTTP endpoint handlers. Thin wrappers that load state, call into the
//! pipeline/engine, persist, and map domain errors onto status codes.
//!
//! Identity is the `x-user-id` header; absent means "default_user". Courses
//! are owner-scoped: reading or mutating someone else's course is 403.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::builder;
use crate::domain::{
  CognitiveLevel, Course, CourseAudience, DifficultyTier, FeedbackEntry, Lesson,
};
use crate::pipeline::course_prompt;
use crate::protocol::*;
use crate::schema::Shape;
use crate::state::AppState;

const DEFAULT_USER: &str = "default_user";
const DEFAULT_DURATION_HOURS: u32 = 4;
const DEFAULT_QUIZ_QUESTIONS: usize = 3;

fn user_of(headers: &HeaderMap) -> String {
  headers
    .get("x-user-id")
    .and_then(|v| v.to_str().ok())
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .unwrap_or(DEFAULT_USER)
    .to_string()
}

/// Load a course and check ownership. 404 before 403 so probing for other
/// users' course ids and missing ids look different only to the owner.
fn load_owned(state: &AppState, course_id: &str, user_id: &str) -> Result<Course, ApiError> {
  let course = state
    .store
    .load_course(course_id)?
    .ok_or_else(|| ApiError::NotFound(format!("course not found: {course_id}")))?;
  if course.owner_id != user_id {
    return Err(ApiError::Forbidden("you do not own this course".into()));
  }
  Ok(course)
}

fn llm_unavailable() -> ApiError {
  ApiError::Unavailable("generation is disabled: no LLM_API_KEY configured".into())
}

/// Write a course back to the store. Validated content is never discarded
/// over a failed write: the error is logged and surfaced through the
/// response's `saved` flag instead of a 500.
fn persist_course(state: &AppState, course: &Course) -> bool {
  match state.store.save_course(course) {
    Ok(()) => true,
    Err(e) => {
      error!(target: "courseforge_backend", course = %course.course_id, error = %e,
             "failed to persist course; returning unsaved content");
      false
    }
  }
}

/// The learner's current tier and level for a lesson, falling back to the
/// lesson's own level at medium difficulty before any attempts exist.
fn current_position(
  state: &AppState,
  course_id: &str,
  user_id: &str,
  lesson: &Lesson,
) -> Result<(CognitiveLevel, DifficultyTier), ApiError> {
  let progress = state.store.load_progress(course_id, user_id)?;
  Ok(match progress.get(&lesson.lesson_id) {
    Some(r) => (r.current_level, r.current_difficulty),
    None => (lesson.cognitive_level, DifficultyTier::Medium),
  })
}

#[instrument(level = "info", skip(state))]
pub async fn http_health(State(state): State<Arc<AppState>>) -> Json<HealthOut> {
  Json(HealthOut { ok: true, llm_enabled: state.orchestrator.is_some() })
}

#[instrument(level = "info", skip(state, headers, body), fields(topic = %body.topic))]
pub async fn http_generate_course(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Json(body): Json<GenerateCourseIn>,
) -> Result<Json<CourseOut>, ApiError> {
  let user_id = user_of(&headers);

  let topic = body.topic.trim();
  if topic.is_empty() {
    return Err(ApiError::Unprocessable("topic must be non-empty".into()));
  }
  let audience = match body.audience.as_deref() {
    Some(s) => CourseAudience::parse(s)
      .ok_or_else(|| ApiError::Unprocessable(format!("unknown audience: {s}")))?,
    None => CourseAudience::default(),
  };
  let duration_hours = body.duration_hours.unwrap_or(DEFAULT_DURATION_HOURS).clamp(1, 100);

  let orchestrator = state.orchestrator.as_ref().ok_or_else(llm_unavailable)?;
  let prompt = course_prompt(&state.prompts, topic, audience, duration_hours);
  let value = orchestrator.generate_on_topic(&prompt, Shape::Course, topic).await?;
  let course = builder::build_course(&value, topic, duration_hours, audience, &user_id);
  let saved = persist_course(&state, &course);

  info!(target: "courseforge_backend", course = %course.course_id, %user_id, saved, "course generated");
  Ok(Json(CourseOut { saved, course }))
}

#[instrument(level = "info", skip(state, headers))]
pub async fn http_list_courses(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> Result<Json<Vec<CourseSummaryOut>>, ApiError> {
  let user_id = user_of(&headers);
  let courses = state.store.list_courses(&user_id)?;
  Ok(Json(courses.iter().map(CourseSummaryOut::from_course).collect()))
}

#[instrument(level = "info", skip(state, headers), fields(%course_id))]
pub async fn http_get_course(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(course_id): Path<String>,
) -> Result<Json<Course>, ApiError> {
  let user_id = user_of(&headers);
  Ok(Json(load_owned(&state, &course_id, &user_id)?))
}

#[instrument(level = "info", skip(state, headers), fields(%course_id))]
pub async fn http_delete_course(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(course_id): Path<String>,
) -> Result<Json<DeleteOut>, ApiError> {
  let user_id = user_of(&headers);
  let _lock = state.course_locks.acquire(&course_id).await;
  load_owned(&state, &course_id, &user_id)?;
  let deleted = state.store.delete_course(&course_id)?;
  info!(target: "courseforge_backend", %course_id, %user_id, deleted, "course deleted");
  Ok(Json(DeleteOut { deleted }))
}

#[instrument(level = "info", skip(state, headers), fields(%course_id))]
pub async fn http_confirm_course(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(course_id): Path<String>,
) -> Result<Json<CourseOut>, ApiError> {
  let user_id = user_of(&headers);
  let _lock = state.course_locks.acquire(&course_id).await;
  let mut course = load_owned(&state, &course_id, &user_id)?;
  let mut saved = true;
  if !course.confirmed {
    course.confirmed = true;
    saved = persist_course(&state, &course);
    info!(target: "courseforge_backend", %course_id, saved, "course confirmed");
  }
  Ok(Json(CourseOut { saved, course }))
}

#[instrument(level = "info", skip(state, headers), fields(%course_id))]
pub async fn http_regenerate_course(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(course_id): Path<String>,
) -> Result<Json<CourseOut>, ApiError> {
  let user_id = user_of(&headers);
  let _lock = state.course_locks.acquire(&course_id).await;
  let mut course = load_owned(&state, &course_id, &user_id)?;
  let regen = state.regen.as_ref().ok_or_else(llm_unavailable)?;

  regen.regenerate_course(&mut course).await?;
  // Every lesson and question id below the root is new; old progress would
  // point at nothing.
  state.store.delete_progress_for_course(&course_id)?;
  let saved = persist_course(&state, &course);
  info!(target: "courseforge_backend", %course_id, version = course.version, saved, "course regenerated");
  Ok(Json(CourseOut { saved, course }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%course_id, %lesson_id, feedback = body.feedback.as_str()))]
pub async fn http_regenerate_lesson(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path((course_id, lesson_id)): Path<(String, String)>,
  Json(body): Json<RegenerateLessonIn>,
) -> Result<Json<LessonOut>, ApiError> {
  let user_id = user_of(&headers);
  let _lock = state.course_locks.acquire(&course_id).await;
  let mut course = load_owned(&state, &course_id, &user_id)?;
  let regen = state.regen.as_ref().ok_or_else(llm_unavailable)?;

  regen
    .regenerate_lesson(&mut course, &lesson_id, body.feedback, body.comments.as_deref())
    .await?;
  let saved = persist_course(&state, &course);

  let (module, lesson) = course
    .find_lesson(&lesson_id)
    .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;
  let entry = FeedbackEntry {
    timestamp: Utc::now(),
    feedback: body.feedback,
    module_id: Some(module.module_id.clone()),
    lesson_id: Some(lesson_id.clone()),
    comments: body.comments.clone(),
    course_version: course.version,
  };
  if let Err(e) = state.store.append_feedback(&course_id, &entry) {
    warn!(target: "courseforge_backend", %course_id, error = %e, "failed to record feedback entry");
  }
  Ok(Json(LessonOut { saved, lesson: lesson.clone() }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%course_id, %lesson_id))]
pub async fn http_generate_quiz(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path((course_id, lesson_id)): Path<(String, String)>,
  Json(body): Json<GenerateQuizIn>,
) -> Result<Json<QuizOut>, ApiError> {
  let user_id = user_of(&headers);
  let _lock = state.course_locks.acquire(&course_id).await;
  let mut course = load_owned(&state, &course_id, &user_id)?;
  let regen = state.regen.as_ref().ok_or_else(llm_unavailable)?;

  let (level, current_tier) = {
    let (_, lesson) = course
      .find_lesson(&lesson_id)
      .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;
    current_position(&state, &course_id, &user_id, lesson)?
  };
  let difficulty = body.difficulty.unwrap_or(current_tier);
  let num_questions = body.num_questions.unwrap_or(DEFAULT_QUIZ_QUESTIONS).clamp(1, 10);

  regen
    .regenerate_quiz(&mut course, &lesson_id, level, difficulty, num_questions, None)
    .await?;
  let saved = persist_course(&state, &course);

  let (_, lesson) = course
    .find_lesson(&lesson_id)
    .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;
  Ok(Json(QuizOut { saved, questions: lesson.quiz.clone() }))
}

/// Retake: regenerate the quiz at the learner's current tier and level,
/// carrying the feedback tag from their latest attempt into the prompt.
#[instrument(level = "info", skip(state, headers), fields(%course_id, %lesson_id))]
pub async fn http_retake_quiz(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path((course_id, lesson_id)): Path<(String, String)>,
) -> Result<Json<QuizOut>, ApiError> {
  let user_id = user_of(&headers);
  let _lock = state.course_locks.acquire(&course_id).await;
  let mut course = load_owned(&state, &course_id, &user_id)?;
  let regen = state.regen.as_ref().ok_or_else(llm_unavailable)?;

  let (level, difficulty) = {
    let (_, lesson) = course
      .find_lesson(&lesson_id)
      .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;
    current_position(&state, &course_id, &user_id, lesson)?
  };
  let last_feedback = state
    .store
    .load_progress(&course_id, &user_id)?
    .get(&lesson_id)
    .and_then(|r| r.attempt_history.last())
    .and_then(|a| a.feedback);

  regen
    .regenerate_quiz(&mut course, &lesson_id, level, difficulty, DEFAULT_QUIZ_QUESTIONS, last_feedback)
    .await?;
  let saved = persist_course(&state, &course);

  let (_, lesson) = course
    .find_lesson(&lesson_id)
    .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;
  Ok(Json(QuizOut { saved, questions: lesson.quiz.clone() }))
}

#[instrument(level = "info", skip(state, headers, body), fields(%course_id, %lesson_id, answers = body.answers.len()))]
pub async fn http_submit_quiz(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path((course_id, lesson_id)): Path<(String, String)>,
  Json(body): Json<SubmitQuizIn>,
) -> Result<Json<QuizResultOut>, ApiError> {
  let user_id = user_of(&headers);

  // Serialize read-modify-write of this learner's progress in this course.
  let _lock = state.progress_locks.acquire(&format!("{course_id}:{user_id}")).await;

  let course = load_owned(&state, &course_id, &user_id)?;
  if !course.confirmed {
    return Err(ApiError::Conflict("course must be confirmed before taking quizzes".into()));
  }
  let (_, lesson) = course
    .find_lesson(&lesson_id)
    .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;

  let report = state.engine.grade(&lesson.quiz, &body.answers)?;

  let mut progress = state.store.load_progress(&course_id, &user_id)?;
  let record = progress
    .entry(lesson_id.clone())
    .or_insert_with(|| crate::domain::ProficiencyRecord::new(&lesson_id, lesson.cognitive_level));
  let outcome = state.engine.apply_attempt(record, &report, body.feedback);
  state.store.save_progress(&course_id, &user_id, &progress)?;

  info!(target: "quiz", %course_id, %lesson_id, %user_id,
        score = outcome.score, passed = outcome.passed, "quiz submission processed");
  Ok(Json(QuizResultOut::from_outcome(&course_id, &lesson_id, report, outcome)))
}

#[instrument(level = "info", skip(state, headers), fields(%course_id))]
pub async fn http_progress(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(course_id): Path<String>,
) -> Result<Json<ProgressOut>, ApiError> {
  let user_id = user_of(&headers);
  let course = load_owned(&state, &course_id, &user_id)?;
  let progress = state.store.load_progress(&course_id, &user_id)?;

  let mut lessons = Vec::new();
  for module in &course.modules {
    for lesson in &module.lessons {
      let record = progress.get(&lesson.lesson_id);
      let mastery = record
        .map(|r| state.engine.mastery(r))
        .unwrap_or(crate::domain::Mastery::NotStarted);
      lessons.push(lesson_progress_out(&lesson.lesson_id, &lesson.title, record, mastery));
    }
  }
  let lessons_completed = lessons.iter().filter(|l| l.completed).count();
  let completion_percent = if lessons.is_empty() {
    0.0
  } else {
    100.0 * lessons_completed as f32 / lessons.len() as f32
  };
  Ok(Json(ProgressOut {
    course_id,
    user_id,
    lessons_total: lessons.len(),
    lessons_completed,
    completion_percent,
    lessons,
  }))
}

/// Mark a lesson complete without a quiz attempt, e.g. a lesson with no
/// gradeable content. Completion via passing a quiz stays the normal path.
#[instrument(level = "info", skip(state, headers), fields(%course_id, %lesson_id))]
pub async fn http_complete_lesson(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path((course_id, lesson_id)): Path<(String, String)>,
) -> Result<Json<LessonProgressOut>, ApiError> {
  let user_id = user_of(&headers);
  let _lock = state.progress_locks.acquire(&format!("{course_id}:{user_id}")).await;

  let course = load_owned(&state, &course_id, &user_id)?;
  let (_, lesson) = course
    .find_lesson(&lesson_id)
    .ok_or_else(|| ApiError::NotFound(format!("lesson not found: {lesson_id}")))?;

  let mut progress = state.store.load_progress(&course_id, &user_id)?;
  let record = progress
    .entry(lesson_id.clone())
    .or_insert_with(|| crate::domain::ProficiencyRecord::new(&lesson_id, lesson.cognitive_level));
  record.completed = true;
  let mastery = state.engine.mastery(record);
  let row = lesson_progress_out(&lesson_id, &lesson.title, Some(record), mastery);
  state.store.save_progress(&course_id, &user_id, &progress)?;

  info!(target: "quiz", %course_id, %lesson_id, %user_id, "lesson marked complete");
  Ok(Json(row))
}

/// Progress overview across every course the caller owns.
#[instrument(level = "info", skip(state, headers))]
pub async fn http_all_progress(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
) -> Result<Json<Vec<CourseProgressSummaryOut>>, ApiError> {
  let user_id = user_of(&headers);
  let mut out = Vec::new();
  for course in state.store.list_courses(&user_id)? {
    let progress = state.store.load_progress(&course.course_id, &user_id)?;
    let lessons_total: usize = course.modules.iter().map(|m| m.lessons.len()).sum();
    let lessons_completed = progress.values().filter(|r| r.completed).count();
    let completion_percent = if lessons_total == 0 {
      0.0
    } else {
      100.0 * lessons_completed as f32 / lessons_total as f32
    };
    out.push(CourseProgressSummaryOut {
      course_id: course.course_id,
      title: course.title,
      confirmed: course.confirmed,
      lessons_total,
      lessons_completed,
      completion_percent,
    });
  }
  Ok(Json(out))
}

/// What learners asked to change in this course, oldest first.
#[instrument(level = "info", skip(state, headers), fields(%course_id))]
pub async fn http_feedback_history(
  State(state): State<Arc<AppState>>,
  headers: HeaderMap,
  Path(course_id): Path<String>,
) -> Result<Json<Vec<FeedbackEntry>>, ApiError> {
  let user_id = user_of(&headers);
  load_owned(&state, &course_id, &user_id)?;
  Ok(Json(state.store.load_feedback(&course_id)?))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::assess::AssessmentEngine;
  use crate::config::{EngineConfig, Prompts};
  use crate::domain::{FeedbackTag, LessonBody, Module};
  use crate::llm::{GenerationError, TextGenerator};
  use crate::pipeline::RetryOrchestrator;
  use crate::regen::RegenerationCoordinator;
  use crate::state::KeyedLocks;
  use crate::storage::Store;
  use async_trait::async_trait;
  use chrono::Utc;
  use std::fs;

  struct CannedGenerator {
    response: String,
  }

  #[async_trait]
  impl TextGenerator for CannedGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
      Ok(self.response.clone())
    }
  }

  fn state_with(dir: &tempfile::TempDir, response: &str) -> Arc<AppState> {
    let store = Store::new(dir.path()).expect("store");
    let cfg = EngineConfig::default();
    let orch = RetryOrchestrator::new(
      Arc::new(CannedGenerator { response: response.to_string() }),
      &cfg,
    );
    Arc::new(AppState {
      store,
      engine: AssessmentEngine::new(cfg),
      prompts: Prompts::default(),
      orchestrator: Some(orch.clone()),
      regen: Some(RegenerationCoordinator::new(orch, Prompts::default())),
      course_locks: KeyedLocks::default(),
      progress_locks: KeyedLocks::default(),
    })
  }

  fn lesson(id: &str) -> Lesson {
    Lesson {
      lesson_id: id.to_string(),
      title: format!("Old {id}"),
      cognitive_level: CognitiveLevel::Apply,
      learning_outcomes: vec!["o".into()],
      estimated_duration_minutes: 30,
      body: LessonBody::FreeText { text: "old prose".into() },
      quiz: Vec::new(),
    }
  }

  fn two_lesson_course() -> Course {
    Course {
      course_id: "c-1".into(),
      owner_id: DEFAULT_USER.into(),
      title: "T".into(),
      topic: "rust".into(),
      overview: "O".into(),
      duration_hours: 4,
      audience: CourseAudience::Beginner,
      confirmed: true,
      modules: vec![Module {
        module_id: "m-1".into(),
        title: "M".into(),
        description: "D".into(),
        lessons: vec![lesson("l-1"), lesson("l-2")],
      }],
      created_at: Utc::now(),
      version: 1,
    }
  }

  const CANNED_COURSE: &str = r#"{
    "title": "Understanding Ownership",
    "overview": "Ownership is the core memory model.",
    "modules": [{
      "module_title": "M1",
      "module_description": "D1",
      "lessons": [{
        "lesson_title": "L1",
        "bloom_level": "Remember",
        "learning_outcomes": ["explain ownership"],
        "content": "Every value has a single owner. Ownership moves on assignment."
      }]
    }]
  }"#;

  const CANNED_LESSON: &str = r#"{
    "lesson_title": "Improved lesson",
    "bloom_level": "Remember",
    "learning_outcomes": ["better outcome"],
    "content": "new prose"
  }"#;

  #[tokio::test]
  async fn generated_course_survives_a_failed_store_write() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(&dir, CANNED_COURSE);
    // Make every course write fail from here on.
    fs::remove_dir_all(dir.path().join("courses")).expect("remove");

    let out = http_generate_course(
      State(Arc::clone(&state)),
      HeaderMap::new(),
      Json(GenerateCourseIn { topic: "ownership".into(), audience: None, duration_hours: None }),
    )
    .await
    .expect("content is returned despite the failed write");
    assert!(!out.0.saved);
    assert_eq!(out.0.course.title, "Understanding Ownership");
    assert_eq!(out.0.course.modules.len(), 1);
  }

  #[tokio::test]
  async fn generated_course_is_persisted_when_the_store_is_healthy() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(&dir, CANNED_COURSE);

    let out = http_generate_course(
      State(Arc::clone(&state)),
      HeaderMap::new(),
      Json(GenerateCourseIn { topic: "ownership".into(), audience: None, duration_hours: None }),
    )
    .await
    .expect("generated");
    assert!(out.0.saved);
    let reloaded = state
      .store
      .load_course(&out.0.course.course_id)
      .expect("load")
      .expect("present");
    assert_eq!(reloaded.title, "Understanding Ownership");
  }

  #[tokio::test]
  async fn concurrent_lesson_regenerations_both_persist() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(&dir, CANNED_LESSON);
    state.store.save_course(&two_lesson_course()).expect("seed");

    let regen = |lesson_id: &str| {
      let state = Arc::clone(&state);
      let lesson_id = lesson_id.to_string();
      tokio::spawn(async move {
        http_regenerate_lesson(
          State(state),
          HeaderMap::new(),
          Path(("c-1".to_string(), lesson_id)),
          Json(RegenerateLessonIn { feedback: FeedbackTag::Unclear, comments: None }),
        )
        .await
      })
    };
    let (a, b) = tokio::join!(regen("l-1"), regen("l-2"));
    a.expect("task").expect("l-1 regenerated");
    b.expect("task").expect("l-2 regenerated");

    // Without whole-course serialization one save clobbers the other.
    let course = state.store.load_course("c-1").expect("load").expect("present");
    let (_, l1) = course.find_lesson("l-1").expect("l-1");
    let (_, l2) = course.find_lesson("l-2").expect("l-2");
    assert_eq!(l1.title, "Improved lesson");
    assert_eq!(l2.title, "Improved lesson");
  }

  #[tokio::test]
  async fn lesson_regeneration_is_recorded_in_the_feedback_log() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(&dir, CANNED_LESSON);
    state.store.save_course(&two_lesson_course()).expect("seed");

    let out = http_regenerate_lesson(
      State(Arc::clone(&state)),
      HeaderMap::new(),
      Path(("c-1".to_string(), "l-1".to_string())),
      Json(RegenerateLessonIn {
        feedback: FeedbackTag::MoreExamples,
        comments: Some("show a worked example with vectors".into()),
      }),
    )
    .await
    .expect("regenerated");
    assert!(out.0.saved);

    let log = state.store.load_feedback("c-1").expect("load");
    assert_eq!(log.len(), 1);
    assert_eq!(log[0].feedback, FeedbackTag::MoreExamples);
    assert_eq!(log[0].lesson_id.as_deref(), Some("l-1"));
    assert_eq!(log[0].module_id.as_deref(), Some("m-1"));
    assert_eq!(log[0].comments.as_deref(), Some("show a worked example with vectors"));
    assert_eq!(log[0].course_version, 2);
  }

  #[tokio::test]
  async fn manual_completion_counts_toward_progress_views() {
    let dir = tempfile::tempdir().expect("tempdir");
    let state = state_with(&dir, CANNED_LESSON);
    state.store.save_course(&two_lesson_course()).expect("seed");

    let row = http_complete_lesson(
      State(Arc::clone(&state)),
      HeaderMap::new(),
      Path(("c-1".to_string(), "l-1".to_string())),
    )
    .await
    .expect("completed");
    assert!(row.0.completed);
    assert_eq!(row.0.attempts, 0);

    let progress = http_progress(
      State(Arc::clone(&state)),
      HeaderMap::new(),
      Path("c-1".to_string()),
    )
    .await
    .expect("progress");
    assert_eq!(progress.0.lessons_completed, 1);
    assert_eq!(progress.0.lessons_total, 2);

    let overview = http_all_progress(State(Arc::clone(&state)), HeaderMap::new())
      .await
      .expect("overview");
    assert_eq!(overview.0.len(), 1);
    assert_eq!(overview.0[0].lessons_completed, 1);
    assert_eq!(overview.0[0].completion_percent, 50.0);
  }
}
