//! Feedback-driven regeneration of lessons and whole courses.
//!
//! Regeneration replaces the content of an existing slot while keeping its
//! identifier stable, so learner progress and links keep pointing at the
//! same lesson. Concurrent regeneration of the same slot is rejected up
//! front rather than queued; the second caller gets a busy error and the
//! result of the first run.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde_json::{json, Value};
use thiserror::Error;
use tracing::{info, instrument};

use crate::builder;
use crate::config::Prompts;
use crate::domain::{Course, FeedbackTag, Lesson, LessonBody};
use crate::domain::{CognitiveLevel, DifficultyTier, GenerationRequest};
use crate::pipeline::{
  course_prompt, lesson_content_text, quiz_prompt, GenerationExhausted, PipelinePrompt,
  RetryOrchestrator,
};
use crate::schema::Shape;
use crate::util::fill_template;

#[derive(Debug, Error)]
pub enum RegenError {
  #[error("regeneration already in progress for slot {0}")]
  Busy(String),
  #[error("lesson not found: {0}")]
  UnknownLesson(String),
  #[error(transparent)]
  Exhausted(#[from] GenerationExhausted),
  #[error("serialization error: {0}")]
  Serde(#[from] serde_json::Error),
}

/// Slot keys currently being regenerated. Guards release on drop, including
/// on the error paths.
#[derive(Clone, Default)]
pub struct InFlightSlots {
  inner: Arc<Mutex<HashSet<String>>>,
}

impl InFlightSlots {
  pub fn try_acquire(&self, key: &str) -> Option<SlotGuard> {
    let mut set = lock_slots(&self.inner);
    if set.insert(key.to_string()) {
      Some(SlotGuard { key: key.to_string(), inner: Arc::clone(&self.inner) })
    } else {
      None
    }
  }
}

pub struct SlotGuard {
  key: String,
  inner: Arc<Mutex<HashSet<String>>>,
}

impl Drop for SlotGuard {
  fn drop(&mut self) {
    lock_slots(&self.inner).remove(&self.key);
  }
}

fn lock_slots(inner: &Mutex<HashSet<String>>) -> std::sync::MutexGuard<'_, HashSet<String>> {
  match inner.lock() {
    Ok(g) => g,
    Err(poisoned) => poisoned.into_inner(),
  }
}

/// The concrete rewrite instruction for each feedback tag.
pub fn feedback_instruction(tag: FeedbackTag) -> &'static str {
  match tag {
    FeedbackTag::TooHard => {
      "Simplify the material. Use plainer language, smaller steps, and easier examples."
    }
    FeedbackTag::TooEasy => {
      "Increase the depth and challenge. Assume more prior knowledge and go further into the topic."
    }
    FeedbackTag::Unclear => {
      "Rewrite the explanations for clarity. Define terms before using them and reason step by step."
    }
    FeedbackTag::MoreExamples => {
      "Add more worked examples, with short code where appropriate."
    }
    FeedbackTag::DifferentApproach => {
      "Teach the same learning outcomes using a different approach or analogy than the original."
    }
  }
}

#[derive(Clone)]
pub struct RegenerationCoordinator {
  orchestrator: RetryOrchestrator,
  prompts: Prompts,
  slots: InFlightSlots,
}

impl RegenerationCoordinator {
  pub fn new(orchestrator: RetryOrchestrator, prompts: Prompts) -> Self {
    Self { orchestrator, prompts, slots: InFlightSlots::default() }
  }

  /// Regenerate one lesson in place. The lesson keeps its id and cognitive
  /// level; body, quiz, and everything else are replaced, and the course
  /// version is bumped. Free-form learner comments, when present, are
  /// appended to the rewrite instruction.
  #[instrument(level = "info", skip(self, course, comments), fields(course = %course.course_id, lesson = lesson_id, feedback = feedback.as_str()))]
  pub async fn regenerate_lesson(
    &self,
    course: &mut Course,
    lesson_id: &str,
    feedback: FeedbackTag,
    comments: Option<&str>,
  ) -> Result<(), RegenError> {
    let slot = format!("{}:{}", course.course_id, lesson_id);
    let _guard = self
      .slots
      .try_acquire(&slot)
      .ok_or_else(|| RegenError::Busy(slot.clone()))?;

    let (original_json, level) = {
      let (_, lesson) = course
        .find_lesson(lesson_id)
        .ok_or_else(|| RegenError::UnknownLesson(lesson_id.to_string()))?;
      (lesson_prompt_json(lesson)?, lesson.cognitive_level)
    };

    let mut instruction = feedback_instruction(feedback).to_string();
    if let Some(c) = comments.map(str::trim).filter(|c| !c.is_empty()) {
      instruction.push_str(" The learner added: ");
      instruction.push_str(c);
    }
    let user = fill_template(
      &self.prompts.regen_user_template,
      &[
        ("original_json", &original_json.to_string()),
        ("feedback", feedback.as_str()),
        ("instruction", &instruction),
        ("bloom_level", level.as_str()),
      ],
    );
    let prompt = PipelinePrompt {
      system: self.prompts.course_system.clone(),
      system_strict: self.prompts.course_system_strict.clone(),
      user,
    };

    let value = self.orchestrator.generate_validated(&prompt, Shape::Lesson).await?;
    let mut rebuilt = builder::build_lesson(&value, &course.topic);
    rebuilt.lesson_id = lesson_id.to_string();
    rebuilt.cognitive_level = level;

    let target = course
      .find_lesson_mut(lesson_id)
      .ok_or_else(|| RegenError::UnknownLesson(lesson_id.to_string()))?;
    *target = rebuilt;
    course.version += 1;
    info!(target: "generation", lesson = lesson_id, version = course.version, "lesson regenerated");
    Ok(())
  }

  /// Replace one lesson's quiz with freshly generated questions pitched at
  /// the given tier and level. Question ids are new; grading always targets
  /// whatever quiz is stored on the lesson, so stale ids cannot be scored.
  #[instrument(level = "info", skip(self, course), fields(course = %course.course_id, lesson = lesson_id, level = level.as_str(), difficulty = difficulty.as_str()))]
  pub async fn regenerate_quiz(
    &self,
    course: &mut Course,
    lesson_id: &str,
    level: CognitiveLevel,
    difficulty: DifficultyTier,
    num_questions: usize,
    feedback: Option<FeedbackTag>,
  ) -> Result<(), RegenError> {
    let slot = format!("{}:{}:quiz", course.course_id, lesson_id);
    let _guard = self
      .slots
      .try_acquire(&slot)
      .ok_or_else(|| RegenError::Busy(slot.clone()))?;

    let prompt = {
      let (_, lesson) = course
        .find_lesson(lesson_id)
        .ok_or_else(|| RegenError::UnknownLesson(lesson_id.to_string()))?;
      let req = GenerationRequest {
        context: lesson_content_text(lesson),
        level,
        difficulty,
        num_items: num_questions,
        feedback,
      };
      quiz_prompt(&self.prompts, &req)
    };

    let value = self.orchestrator.generate_validated(&prompt, Shape::QuizQuestions).await?;
    let quiz = builder::build_quiz(&value, level, difficulty);

    let target = course
      .find_lesson_mut(lesson_id)
      .ok_or_else(|| RegenError::UnknownLesson(lesson_id.to_string()))?;
    target.quiz = quiz;
    info!(target: "generation", lesson = lesson_id, questions = target.quiz.len(), "quiz regenerated");
    Ok(())
  }

  /// Regenerate the whole course in place. Keeps the course id, owner, and
  /// creation time; bumps the version and clears the confirmed flag since
  /// every lesson and question id below the root is new.
  #[instrument(level = "info", skip(self, course), fields(course = %course.course_id))]
  pub async fn regenerate_course(&self, course: &mut Course) -> Result<(), RegenError> {
    let slot = format!("course:{}", course.course_id);
    let _guard = self
      .slots
      .try_acquire(&slot)
      .ok_or_else(|| RegenError::Busy(slot.clone()))?;

    let prompt = course_prompt(&self.prompts, &course.topic, course.audience, course.duration_hours);
    let value = self
      .orchestrator
      .generate_on_topic(&prompt, Shape::Course, &course.topic)
      .await?;

    let mut rebuilt = builder::build_course(
      &value,
      &course.topic,
      course.duration_hours,
      course.audience,
      &course.owner_id,
    );
    rebuilt.course_id = course.course_id.clone();
    rebuilt.created_at = course.created_at;
    rebuilt.version = course.version + 1;
    rebuilt.confirmed = false;
    *course = rebuilt;
    info!(target: "generation", course = %course.course_id, version = course.version, "course regenerated");
    Ok(())
  }
}

/// Render a lesson in the same JSON layout the generator emits, so the
/// regeneration prompt's "same structure" instruction holds.
fn lesson_prompt_json(lesson: &Lesson) -> Result<Value, serde_json::Error> {
  let content = match &lesson.body {
    LessonBody::FreeText { text } => Value::String(text.clone()),
    LessonBody::Structured(sections) => serde_json::to_value(sections)?,
  };
  let quiz: Vec<Value> = lesson
    .quiz
    .iter()
    .map(|q| {
      json!({
        "question": q.question,
        "options": q.options,
        "correct_answer": q.correct_answer,
        "difficulty": q.difficulty.as_str(),
        "bloom_level": q.cognitive_level.as_str(),
        "explanation": q.explanation,
      })
    })
    .collect();
  Ok(json!({
    "lesson_title": lesson.title,
    "bloom_level": lesson.cognitive_level.as_str(),
    "learning_outcomes": lesson.learning_outcomes,
    "estimated_duration_minutes": lesson.estimated_duration_minutes,
    "content": content,
    "quiz": quiz,
  }))
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::config::EngineConfig;
  use crate::domain::{CognitiveLevel, CourseAudience, Module};
  use crate::llm::{GenerationError, TextGenerator};
  use async_trait::async_trait;
  use chrono::Utc;

  struct CannedGenerator {
    response: String,
  }

  #[async_trait]
  impl TextGenerator for CannedGenerator {
    async fn generate(&self, _system: &str, _user: &str) -> Result<String, GenerationError> {
      Ok(self.response.clone())
    }
  }

  fn coordinator(response: &str) -> RegenerationCoordinator {
    let orch = RetryOrchestrator::new(
      Arc::new(CannedGenerator { response: response.to_string() }),
      &EngineConfig::default(),
    );
    RegenerationCoordinator::new(orch, Prompts::default())
  }

  fn course() -> Course {
    Course {
      course_id: "c-1".into(),
      owner_id: "alice".into(),
      title: "Old title".into(),
      topic: "rust".into(),
      overview: "Old overview".into(),
      duration_hours: 4,
      audience: CourseAudience::Beginner,
      confirmed: true,
      modules: vec![Module {
        module_id: "m-1".into(),
        title: "M".into(),
        description: "D".into(),
        lessons: vec![Lesson {
          lesson_id: "l-1".into(),
          title: "Old lesson".into(),
          cognitive_level: CognitiveLevel::Apply,
          learning_outcomes: vec!["o".into()],
          estimated_duration_minutes: 30,
          body: LessonBody::FreeText { text: "old prose".into() },
          quiz: Vec::new(),
        }],
      }],
      created_at: Utc::now(),
      version: 1,
    }
  }

  const NEW_LESSON: &str = r#"{
    "lesson_title": "Improved lesson",
    "bloom_level": "Remember",
    "learning_outcomes": ["better outcome"],
    "content": "new prose"
  }"#;

  #[tokio::test]
  async fn lesson_regeneration_preserves_id_and_level() {
    let mut c = course();
    coordinator(NEW_LESSON)
      .regenerate_lesson(&mut c, "l-1", FeedbackTag::Unclear, None)
      .await
      .expect("regenerated");
    let (_, lesson) = c.find_lesson("l-1").expect("still addressable");
    assert_eq!(lesson.title, "Improved lesson");
    // Id and level come from the slot, not from the generated payload.
    assert_eq!(lesson.lesson_id, "l-1");
    assert_eq!(lesson.cognitive_level, CognitiveLevel::Apply);
    assert!(lesson.quiz.len() >= 2);
    assert_eq!(c.version, 2);
  }

  #[tokio::test]
  async fn unknown_lesson_is_rejected_before_any_generation() {
    let mut c = course();
    let err = coordinator(NEW_LESSON)
      .regenerate_lesson(&mut c, "l-missing", FeedbackTag::TooHard, None)
      .await
      .expect_err("unknown");
    assert!(matches!(err, RegenError::UnknownLesson(_)));
  }

  #[tokio::test]
  async fn busy_slot_rejects_concurrent_regeneration() {
    let coord = coordinator(NEW_LESSON);
    let mut c = course();
    let _held = coord.slots.try_acquire("c-1:l-1").expect("first acquire");
    let err = coord
      .regenerate_lesson(&mut c, "l-1", FeedbackTag::TooEasy, None)
      .await
      .expect_err("busy");
    assert!(matches!(err, RegenError::Busy(_)));
  }

  #[test]
  fn slot_guard_releases_on_drop() {
    let slots = InFlightSlots::default();
    let guard = slots.try_acquire("k").expect("acquired");
    assert!(slots.try_acquire("k").is_none());
    drop(guard);
    assert!(slots.try_acquire("k").is_some());
  }

  const NEW_QUIZ: &str = r#"[
    {"question": "2+2?", "options": ["3", "4", "5", "6"], "correct_answer": "4",
     "explanation": "Basic arithmetic"},
    {"question": "3+3?", "options": ["5", "6", "7", "8"], "correct_answer": "6",
     "explanation": "Basic arithmetic"}
  ]"#;

  #[tokio::test]
  async fn quiz_regeneration_replaces_slot_and_stamps_level() {
    let mut c = course();
    coordinator(NEW_QUIZ)
      .regenerate_quiz(&mut c, "l-1", CognitiveLevel::Evaluate, DifficultyTier::Hard, 2, None)
      .await
      .expect("regenerated");
    let (_, lesson) = c.find_lesson("l-1").expect("lesson");
    assert_eq!(lesson.quiz.len(), 2);
    assert!(lesson.quiz.iter().all(|q| q.cognitive_level == CognitiveLevel::Evaluate));
    assert!(lesson.quiz.iter().all(|q| q.difficulty == DifficultyTier::Hard));
    assert!(!lesson.quiz[0].question_id.is_empty());
  }

  const NEW_COURSE: &str = r#"{
    "title": "Fresh Rust course",
    "overview": "Rust from the ground up.",
    "modules": [{
      "module_title": "M1",
      "module_description": "D1",
      "lessons": [{
        "lesson_title": "L1",
        "bloom_level": "Remember",
        "learning_outcomes": ["o"],
        "content": "Rust programs start in main. Rust enforces ownership at compile time."
      }]
    }]
  }"#;

  #[tokio::test]
  async fn course_regeneration_keeps_identity_and_bumps_version() {
    let mut c = course();
    let created = c.created_at;
    coordinator(NEW_COURSE).regenerate_course(&mut c).await.expect("regenerated");
    assert_eq!(c.course_id, "c-1");
    assert_eq!(c.owner_id, "alice");
    assert_eq!(c.created_at, created);
    assert_eq!(c.version, 2);
    assert!(!c.confirmed);
    assert_eq!(c.title, "Fresh Rust course");
    assert_ne!(c.modules[0].lessons[0].lesson_id, "l-1");
  }
}
