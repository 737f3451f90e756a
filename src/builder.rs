//! Mapping validated generator output into the canonical domain model.
//!
//! The builder owns identifier assignment: entities arriving without an id
//! get a fresh UUID here, and an id assigned once is never reassigned across
//! regenerations of the same slot. Label coercion is forgiving (unknown
//! difficulty or level labels fall back to defaults) because by this point
//! the value has already passed schema validation; rejecting a whole course
//! over one odd label would throw away good content.

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use crate::domain::{
  new_id, CognitiveLevel, CoreConcept, Course, CourseAudience, DifficultyTier, Lesson, LessonBody,
  LessonSections, Module, QuizQuestion, WorkedExample,
};

fn str_or<'a>(v: &'a Value, key: &str, default: &'a str) -> String {
  v.get(key).and_then(Value::as_str).filter(|s| !s.trim().is_empty()).unwrap_or(default).to_string()
}

fn string_list(v: &Value, key: &str) -> Vec<String> {
  v.get(key)
    .and_then(Value::as_array)
    .map(|a| {
      a.iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .filter(|s| !s.trim().is_empty())
        .collect()
    })
    .unwrap_or_default()
}

/// Parse a level label, defaulting to Remember. Unknown labels are logged,
/// not fatal.
pub fn coerce_level(raw: Option<&str>, default: CognitiveLevel) -> CognitiveLevel {
  match raw {
    Some(s) => CognitiveLevel::parse(s).unwrap_or_else(|| {
      debug!(target: "generation", label = %s, "unknown cognitive level label; using default");
      default
    }),
    None => default,
  }
}

/// Parse a difficulty label, defaulting to the mid tier.
pub fn coerce_tier(raw: Option<&str>) -> DifficultyTier {
  match raw {
    Some(s) => DifficultyTier::parse(s).unwrap_or_else(|| {
      debug!(target: "generation", label = %s, "unknown difficulty label; using medium");
      DifficultyTier::Medium
    }),
    None => DifficultyTier::Medium,
  }
}

/// Build one quiz question from a validated raw object.
pub fn build_question(raw: &Value, level: CognitiveLevel, tier: DifficultyTier) -> QuizQuestion {
  let options = string_list(raw, "options");
  let correct = str_or(raw, "correct_answer", "");
  QuizQuestion {
    question_id: str_or(raw, "question_id", &new_id()),
    question: str_or(raw, "question", "Question text missing"),
    correct_answer: correct,
    options,
    difficulty: raw
      .get("difficulty")
      .and_then(Value::as_str)
      .map(|s| coerce_tier(Some(s)))
      .unwrap_or(tier),
    cognitive_level: raw
      .get("bloom_level")
      .and_then(Value::as_str)
      .map(|s| coerce_level(Some(s), level))
      .unwrap_or(level),
    explanation: str_or(raw, "explanation", "Review the lesson for more details."),
  }
}

/// Build a full question list from a validated quiz array, stamping the
/// requested level/tier where the raw objects carry none.
pub fn build_quiz(raw: &Value, level: CognitiveLevel, tier: DifficultyTier) -> Vec<QuizQuestion> {
  raw.as_array()
    .map(|a| a.iter().map(|q| build_question(q, level, tier)).collect())
    .unwrap_or_default()
}

fn synthetic_question(topic: &str, level: CognitiveLevel) -> QuizQuestion {
  QuizQuestion {
    question_id: new_id(),
    question: format!("Practice question about {topic} at the {} level", level.as_str()),
    options: vec![
      format!("A correct statement about {topic}"),
      "An unrelated statement".to_string(),
      "A common misconception".to_string(),
      "None of the above".to_string(),
    ],
    correct_answer: format!("A correct statement about {topic}"),
    difficulty: DifficultyTier::Medium,
    cognitive_level: level,
    explanation: format!("This reinforces {topic} concepts."),
  }
}

/// Build the lesson body. A legacy string body becomes the explicit FreeText
/// variant; an object becomes the structured bundle with gaps filled so no
/// section is stored present-but-empty.
pub fn build_lesson_body(raw: &Value, topic: &str) -> LessonBody {
  if let Some(text) = raw.as_str() {
    return LessonBody::FreeText { text: text.to_string() };
  }

  let mut core_concepts: Vec<CoreConcept> = raw
    .get("core_concepts")
    .and_then(Value::as_array)
    .map(|a| {
      a.iter()
        .filter_map(Value::as_object)
        .map(|c| CoreConcept {
          title: c.get("title").and_then(Value::as_str).unwrap_or("Concept").to_string(),
          explanation: c
            .get("explanation")
            .and_then(Value::as_str)
            .unwrap_or("Explanation needed")
            .to_string(),
          code_example: c.get("code_example").and_then(Value::as_str).map(str::to_string),
        })
        .collect()
    })
    .unwrap_or_default();
  if core_concepts.is_empty() {
    core_concepts.push(CoreConcept {
      title: format!("Core concept: {topic}"),
      explanation: format!("This concept builds on the fundamentals of {topic}."),
      code_example: None,
    });
  }

  let mut worked_examples: Vec<WorkedExample> = raw
    .get("worked_examples")
    .and_then(Value::as_array)
    .map(|a| {
      a.iter()
        .filter_map(Value::as_object)
        .map(|e| WorkedExample {
          description: e.get("description").and_then(Value::as_str).unwrap_or("Example").to_string(),
          code: e.get("code").and_then(Value::as_str).map(str::to_string),
          explanation: e.get("explanation").and_then(Value::as_str).unwrap_or("Explanation").to_string(),
        })
        .collect()
    })
    .unwrap_or_default();
  if worked_examples.is_empty() {
    worked_examples.push(WorkedExample {
      description: format!("Practical application of {topic}"),
      code: None,
      explanation: format!("Apply the concepts learned to a real scenario involving {topic}."),
    });
  }

  let mut outline = string_list(raw, "outline");
  if outline.is_empty() {
    outline = vec![format!("Understanding {topic}"), "Practical applications".to_string()];
  }
  let mut walkthrough = string_list(raw, "walkthrough");
  if walkthrough.is_empty() {
    walkthrough = vec![
      format!("Step 1: Understand the fundamentals of {topic}"),
      "Step 2: Practice with the provided examples".to_string(),
      "Step 3: Apply to your own use cases".to_string(),
    ];
  }
  let mut common_mistakes = string_list(raw, "common_mistakes");
  if common_mistakes.is_empty() {
    common_mistakes = vec![format!("Common mistakes when working with {topic}")];
  }
  let mut reflection_prompts = string_list(raw, "reflection_prompts");
  if reflection_prompts.is_empty() {
    reflection_prompts = vec![format!("How would you apply {topic} in a real project?")];
  }

  LessonBody::Structured(LessonSections {
    introduction: str_or(raw, "introduction", &format!("Welcome to this lesson on {topic}.")),
    outline,
    core_concepts,
    walkthrough,
    worked_examples,
    common_mistakes,
    summary: str_or(raw, "summary", &format!("This lesson covered the key aspects of {topic}.")),
    reflection_prompts,
  })
}

pub fn build_lesson(raw: &Value, topic: &str) -> Lesson {
  let level = coerce_level(raw.get("bloom_level").and_then(Value::as_str), CognitiveLevel::Remember);

  let mut quiz = raw
    .get("quiz")
    .and_then(Value::as_array)
    .map(|a| a.iter().map(|q| build_question(q, level, DifficultyTier::Medium)).collect::<Vec<_>>())
    .unwrap_or_default();
  // A confirmed lesson must carry a non-empty quiz; pad thin ones.
  while quiz.len() < 2 {
    quiz.push(synthetic_question(topic, level));
  }

  let mut outcomes = string_list(raw, "learning_outcomes");
  if outcomes.is_empty() {
    outcomes = vec![format!("Understand {topic} concepts")];
  }

  Lesson {
    lesson_id: str_or(raw, "lesson_id", &new_id()),
    title: str_or(raw, "lesson_title", &format!("{topic} lesson")),
    cognitive_level: level,
    learning_outcomes: outcomes,
    estimated_duration_minutes: raw
      .get("estimated_duration_minutes")
      .and_then(Value::as_u64)
      .map(|m| m as u32)
      .unwrap_or(30),
    body: build_lesson_body(raw.get("content").unwrap_or(&Value::Null), topic),
    quiz,
  }
}

/// Build a complete course from a validated raw value.
pub fn build_course(
  raw: &Value,
  topic: &str,
  duration_hours: u32,
  audience: CourseAudience,
  owner_id: &str,
) -> Course {
  let modules = raw
    .get("modules")
    .and_then(Value::as_array)
    .map(|a| {
      a.iter()
        .map(|m| Module {
          module_id: str_or(m, "module_id", &new_id()),
          title: str_or(m, "module_title", &format!("{topic} module")),
          description: str_or(m, "module_description", &format!("Learning about {topic}")),
          lessons: m
            .get("lessons")
            .and_then(Value::as_array)
            .map(|ls| ls.iter().map(|l| build_lesson(l, topic)).collect())
            .unwrap_or_default(),
        })
        .collect()
    })
    .unwrap_or_default();

  Course {
    course_id: new_id(),
    owner_id: owner_id.to_string(),
    title: str_or(raw, "title", &format!("Course on {topic}")),
    topic: topic.to_string(),
    overview: str_or(raw, "overview", &format!("A comprehensive course on {topic}")),
    duration_hours,
    audience,
    confirmed: false,
    modules,
    created_at: Utc::now(),
    version: 1,
  }
}
