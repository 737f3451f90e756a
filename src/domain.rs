//! Domain models: cognitive levels, difficulty tiers, courses, lessons,
//! quiz questions, and per-learner proficiency records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bloom-style cognitive levels, ordered from shallow recall to creation.
/// Transitions between levels are always single-step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum CognitiveLevel {
  Remember,
  Understand,
  Apply,
  Analyze,
  Evaluate,
  Create,
}

impl CognitiveLevel {
  pub const ALL: [CognitiveLevel; 6] = [
    CognitiveLevel::Remember,
    CognitiveLevel::Understand,
    CognitiveLevel::Apply,
    CognitiveLevel::Analyze,
    CognitiveLevel::Evaluate,
    CognitiveLevel::Create,
  ];

  pub fn as_str(&self) -> &'static str {
    match self {
      CognitiveLevel::Remember => "Remember",
      CognitiveLevel::Understand => "Understand",
      CognitiveLevel::Apply => "Apply",
      CognitiveLevel::Analyze => "Analyze",
      CognitiveLevel::Evaluate => "Evaluate",
      CognitiveLevel::Create => "Create",
    }
  }

  /// Case-insensitive parse of model-emitted labels. Unknown labels map to None.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "remember" => Some(CognitiveLevel::Remember),
      "understand" => Some(CognitiveLevel::Understand),
      "apply" => Some(CognitiveLevel::Apply),
      "analyze" | "analyse" => Some(CognitiveLevel::Analyze),
      "evaluate" => Some(CognitiveLevel::Evaluate),
      "create" => Some(CognitiveLevel::Create),
      _ => None,
    }
  }

  pub fn next_up(&self) -> Self {
    let i = Self::ALL.iter().position(|l| l == self).unwrap_or(0);
    Self::ALL[(i + 1).min(Self::ALL.len() - 1)]
  }

  pub fn next_down(&self) -> Self {
    let i = Self::ALL.iter().position(|l| l == self).unwrap_or(0);
    Self::ALL[i.saturating_sub(1)]
  }

  pub fn description(&self) -> &'static str {
    match self {
      CognitiveLevel::Remember => "Recall facts and basic concepts",
      CognitiveLevel::Understand => "Explain ideas and concepts",
      CognitiveLevel::Apply => "Use information in new situations",
      CognitiveLevel::Analyze => "Draw connections among ideas",
      CognitiveLevel::Evaluate => "Justify decisions and actions",
      CognitiveLevel::Create => "Produce new or original work",
    }
  }
}

impl Default for CognitiveLevel {
  fn default() -> Self { CognitiveLevel::Remember }
}

/// Quiz question difficulty. Three tiers, single-step transitions only.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DifficultyTier {
  Easy,
  Medium,
  Hard,
}

impl DifficultyTier {
  pub const ALL: [DifficultyTier; 3] =
    [DifficultyTier::Easy, DifficultyTier::Medium, DifficultyTier::Hard];

  pub fn as_str(&self) -> &'static str {
    match self {
      DifficultyTier::Easy => "easy",
      DifficultyTier::Medium => "medium",
      DifficultyTier::Hard => "hard",
    }
  }

  /// Case-insensitive parse with a few wording variants the generator emits.
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "easy" | "low" | "beginner" => Some(DifficultyTier::Easy),
      "medium" | "med" | "moderate" | "intermediate" => Some(DifficultyTier::Medium),
      "hard" | "high" | "difficult" | "advanced" => Some(DifficultyTier::Hard),
      _ => None,
    }
  }

  pub fn next_up(&self) -> Self {
    match self {
      DifficultyTier::Easy => DifficultyTier::Medium,
      DifficultyTier::Medium | DifficultyTier::Hard => DifficultyTier::Hard,
    }
  }

  pub fn next_down(&self) -> Self {
    match self {
      DifficultyTier::Hard => DifficultyTier::Medium,
      DifficultyTier::Medium | DifficultyTier::Easy => DifficultyTier::Easy,
    }
  }
}

impl Default for DifficultyTier {
  fn default() -> Self { DifficultyTier::Medium }
}

/// Audience level for a whole course (distinct from per-question tiers).
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
pub enum CourseAudience {
  Beginner,
  Intermediate,
  Advanced,
}

impl CourseAudience {
  pub fn parse(s: &str) -> Option<Self> {
    match s.trim().to_lowercase().as_str() {
      "beginner" => Some(CourseAudience::Beginner),
      "intermediate" => Some(CourseAudience::Intermediate),
      "advanced" => Some(CourseAudience::Advanced),
      _ => None,
    }
  }

  pub fn as_str(&self) -> &'static str {
    match self {
      CourseAudience::Beginner => "Beginner",
      CourseAudience::Intermediate => "Intermediate",
      CourseAudience::Advanced => "Advanced",
    }
  }
}

impl Default for CourseAudience {
  fn default() -> Self { CourseAudience::Intermediate }
}

/// One multiple-choice quiz question.
/// Invariants (enforced by the schema validator, not here):
/// exactly four distinct options, and `correct_answer` is one of them.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizQuestion {
  pub question_id: String,
  pub question: String,
  pub options: Vec<String>,
  pub correct_answer: String,
  pub difficulty: DifficultyTier,
  pub cognitive_level: CognitiveLevel,
  pub explanation: String,
}

/// A single named concept inside the structured lesson body.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CoreConcept {
  pub title: String,
  pub explanation: String,
  #[serde(default)] pub code_example: Option<String>,
}

/// A worked example with optional code.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WorkedExample {
  pub description: String,
  #[serde(default)] pub code: Option<String>,
  pub explanation: String,
}

/// Structured lesson sections. Each list is either absent from the source
/// or non-empty after building; the builder fills gaps, it never stores
/// present-but-empty sections.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct LessonSections {
  pub introduction: String,
  pub outline: Vec<String>,
  pub core_concepts: Vec<CoreConcept>,
  pub walkthrough: Vec<String>,
  pub worked_examples: Vec<WorkedExample>,
  pub common_mistakes: Vec<String>,
  pub summary: String,
  pub reflection_prompts: Vec<String>,
}

/// Lesson body: structured sections, or a legacy free-text blob kept as-is.
/// The builder decides which variant applies; nothing downstream type-sniffs.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "format", rename_all = "snake_case")]
pub enum LessonBody {
  Structured(LessonSections),
  FreeText { text: String },
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Lesson {
  pub lesson_id: String,
  pub title: String,
  pub cognitive_level: CognitiveLevel,
  pub learning_outcomes: Vec<String>,
  pub estimated_duration_minutes: u32,
  pub body: LessonBody,
  pub quiz: Vec<QuizQuestion>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Module {
  pub module_id: String,
  pub title: String,
  pub description: String,
  pub lessons: Vec<Lesson>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Course {
  pub course_id: String,
  pub owner_id: String,
  pub title: String,
  pub topic: String,
  pub overview: String,
  pub duration_hours: u32,
  pub audience: CourseAudience,
  pub confirmed: bool,
  pub modules: Vec<Module>,
  pub created_at: DateTime<Utc>,
  pub version: u32,
}

impl Course {
  pub fn find_lesson(&self, lesson_id: &str) -> Option<(&Module, &Lesson)> {
    for m in &self.modules {
      if let Some(l) = m.lessons.iter().find(|l| l.lesson_id == lesson_id) {
        return Some((m, l));
      }
    }
    None
  }

  pub fn find_lesson_mut(&mut self, lesson_id: &str) -> Option<&mut Lesson> {
    self.modules.iter_mut()
      .flat_map(|m| m.lessons.iter_mut())
      .find(|l| l.lesson_id == lesson_id)
  }
}

/// Closed feedback vocabulary. Unknown tags fail deserialization; they are
/// never silently defaulted.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackTag {
  TooHard,
  TooEasy,
  Unclear,
  MoreExamples,
  DifferentApproach,
}

impl FeedbackTag {
  pub fn as_str(&self) -> &'static str {
    match self {
      FeedbackTag::TooHard => "too_hard",
      FeedbackTag::TooEasy => "too_easy",
      FeedbackTag::Unclear => "unclear",
      FeedbackTag::MoreExamples => "more_examples",
      FeedbackTag::DifferentApproach => "different_approach",
    }
  }
}

/// One feedback-driven regeneration, as stored in the per-course feedback log.
/// The log is append-only; it exists so course authors can see what learners
/// asked to change and when.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FeedbackEntry {
  pub timestamp: DateTime<Utc>,
  pub feedback: FeedbackTag,
  #[serde(default)] pub module_id: Option<String>,
  #[serde(default)] pub lesson_id: Option<String>,
  #[serde(default)] pub comments: Option<String>,
  /// Course version after the regeneration this entry describes.
  pub course_version: u32,
}

/// One graded attempt, as stored in the proficiency history.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct QuizAttempt {
  pub attempt_number: u32,
  pub score: f32,
  pub passed: bool,
  #[serde(default)] pub feedback: Option<FeedbackTag>,
  pub timestamp: DateTime<Utc>,
}

/// Per-learner, per-lesson proficiency. Created lazily on the first graded
/// attempt; mutated only by the assessment engine.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProficiencyRecord {
  pub lesson_id: String,
  pub attempts: u32,
  pub best_score: f32,
  /// Exponential moving average of score/100, in [0.0, 1.0].
  pub smoothed_score: f32,
  pub current_difficulty: DifficultyTier,
  pub current_level: CognitiveLevel,
  pub attempt_history: Vec<QuizAttempt>,
  pub completed: bool,
}

impl ProficiencyRecord {
  pub fn new(lesson_id: &str, level: CognitiveLevel) -> Self {
    Self {
      lesson_id: lesson_id.to_string(),
      attempts: 0,
      best_score: 0.0,
      smoothed_score: 0.0,
      current_difficulty: DifficultyTier::Medium,
      current_level: level,
      attempt_history: Vec::new(),
      completed: false,
    }
  }
}

/// Derived mastery label, recomputed on read from best score and attempt count.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Mastery {
  NotStarted,
  Mastered,
  Proficient,
  Developing,
  NeedsPractice,
}

impl Mastery {
  pub fn label(&self) -> &'static str {
    match self {
      Mastery::NotStarted => "Not Started",
      Mastery::Mastered => "Mastered",
      Mastery::Proficient => "Proficient",
      Mastery::Developing => "Developing",
      Mastery::NeedsPractice => "Needs Practice",
    }
  }
}

/// Transient parameter bundle for one generation pipeline invocation.
#[derive(Clone, Debug)]
pub struct GenerationRequest {
  pub context: String,
  pub level: CognitiveLevel,
  pub difficulty: DifficultyTier,
  pub num_items: usize,
  pub feedback: Option<FeedbackTag>,
}

pub fn new_id() -> String {
  Uuid::new_v4().to_string()
}
