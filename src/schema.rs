//! Shape validation for decoded generator output.
//!
//! Pure functions: a candidate `serde_json::Value` goes in, an accepted
//! (lightly normalized) value or a `ValidationError` comes out. Normalization
//! here is limited to canonicalizing enum spellings and unwrapping the
//! `{"questions": [...]}` envelope some models insist on; structural repair
//! belongs to the repair module and defaulting belongs to the builder.

use serde_json::{Map, Value};
use thiserror::Error;

use crate::domain::{CognitiveLevel, DifficultyTier};

/// Target shape for one generation request.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Shape {
  Course,
  Lesson,
  LessonSections,
  QuizQuestions,
}

impl Shape {
  pub fn as_str(&self) -> &'static str {
    match self {
      Shape::Course => "course",
      Shape::Lesson => "lesson",
      Shape::LessonSections => "lesson_sections",
      Shape::QuizQuestions => "quiz_questions",
    }
  }
}

#[derive(Debug, Error)]
pub enum ValidationError {
  #[error("{path}: missing required field `{field}`")]
  MissingField { path: String, field: &'static str },
  #[error("{path}: {reason}")]
  Invalid { path: String, reason: String },
}

fn invalid(path: impl Into<String>, reason: impl Into<String>) -> ValidationError {
  ValidationError::Invalid { path: path.into(), reason: reason.into() }
}

/// Validate `value` against `shape`. Returns the accepted value, possibly
/// normalized (canonical enum spellings, unwrapped question arrays).
pub fn validate(value: Value, shape: Shape) -> Result<Value, ValidationError> {
  match shape {
    Shape::Course => validate_course(value),
    Shape::Lesson => {
      let mut value = value;
      validate_lesson(&mut value, "lesson")?;
      Ok(value)
    }
    Shape::LessonSections => validate_lesson_sections(value, "content"),
    Shape::QuizQuestions => validate_quiz(value),
  }
}

// ---- course ----

fn validate_course(mut value: Value) -> Result<Value, ValidationError> {
  let obj = value
    .as_object_mut()
    .ok_or_else(|| invalid("course", "course must be a JSON object"))?;

  for field in ["title", "overview"] {
    let ok = obj.get(field).and_then(Value::as_str).map(|s| !s.trim().is_empty()).unwrap_or(false);
    if !ok {
      return Err(invalid("course", format!("`{field}` must be a non-empty string")));
    }
  }

  let modules = obj
    .get_mut("modules")
    .and_then(Value::as_array_mut)
    .ok_or(ValidationError::MissingField { path: "course".into(), field: "modules" })?;
  if modules.is_empty() {
    return Err(invalid("course.modules", "must be a non-empty array"));
  }

  for (mi, module) in modules.iter_mut().enumerate() {
    let path = format!("course.modules[{mi}]");
    let mobj = module
      .as_object_mut()
      .ok_or_else(|| invalid(&path, "module must be an object"))?;
    if mobj.get("module_title").and_then(Value::as_str).map(str::trim).unwrap_or("").is_empty() {
      return Err(ValidationError::MissingField { path, field: "module_title" });
    }
    let lessons = mobj
      .get_mut("lessons")
      .and_then(Value::as_array_mut)
      .ok_or(ValidationError::MissingField { path: path.clone(), field: "lessons" })?;
    if lessons.is_empty() {
      return Err(invalid(format!("{path}.lessons"), "must be a non-empty array"));
    }
    for (li, lesson) in lessons.iter_mut().enumerate() {
      validate_lesson(lesson, &format!("{path}.lessons[{li}]"))?;
    }
  }

  Ok(value)
}

fn validate_lesson(lesson: &mut Value, path: &str) -> Result<(), ValidationError> {
  let obj = lesson
    .as_object_mut()
    .ok_or_else(|| invalid(path, "lesson must be an object"))?;

  for field in ["lesson_title", "bloom_level", "learning_outcomes", "content"] {
    if !obj.contains_key(field) {
      return Err(ValidationError::MissingField { path: path.into(), field });
    }
  }

  // Canonicalize the level spelling in place ("understand" -> "Understand").
  let level_raw = obj.get("bloom_level").and_then(Value::as_str).unwrap_or_default();
  let level = CognitiveLevel::parse(level_raw)
    .ok_or_else(|| invalid(path, format!("unknown bloom_level `{level_raw}`")))?;
  obj.insert("bloom_level".into(), Value::String(level.as_str().to_string()));

  let outcomes_ok = obj
    .get("learning_outcomes")
    .and_then(Value::as_array)
    .map(|a| !a.is_empty())
    .unwrap_or(false);
  if !outcomes_ok {
    return Err(invalid(path, "`learning_outcomes` must be a non-empty array"));
  }

  // Content is either a legacy free-text string (the builder wraps it) or
  // the structured section bundle.
  match obj.get_mut("content") {
    Some(Value::String(s)) if !s.trim().is_empty() => Ok(()),
    Some(Value::String(_)) => Err(invalid(path, "legacy string content must be non-empty")),
    Some(content @ Value::Object(_)) => {
      validate_lesson_sections(std::mem::take(content), path).map(|v| {
        *content = v;
      })
    }
    _ => Err(invalid(path, "`content` must be a string or an object")),
  }
}

/// Section bundle checks: critical sections present; any present section
/// non-empty (absent is fine, present-but-empty is not).
fn validate_lesson_sections(value: Value, path: &str) -> Result<Value, ValidationError> {
  let obj = value
    .as_object()
    .ok_or_else(|| invalid(path, "lesson content must be an object"))?;

  for field in ["introduction", "core_concepts"] {
    if !obj.contains_key(field) {
      return Err(ValidationError::MissingField { path: path.into(), field });
    }
  }

  let intro = obj.get("introduction").and_then(Value::as_str).unwrap_or_default();
  if intro.trim().is_empty() {
    return Err(invalid(path, "`introduction` must be non-empty"));
  }

  for section in [
    "outline",
    "core_concepts",
    "walkthrough",
    "worked_examples",
    "common_mistakes",
    "reflection_prompts",
  ] {
    if let Some(v) = obj.get(section) {
      let arr = v
        .as_array()
        .ok_or_else(|| invalid(path, format!("`{section}` must be an array")))?;
      if arr.is_empty() {
        return Err(invalid(path, format!("`{section}` is present but empty")));
      }
    }
  }

  for concept in obj.get("core_concepts").and_then(Value::as_array).into_iter().flatten() {
    let cobj = concept
      .as_object()
      .ok_or_else(|| invalid(path, "core_concepts entries must be objects"))?;
    for field in ["title", "explanation"] {
      let ok = cobj.get(field).and_then(Value::as_str).map(|s| !s.trim().is_empty()).unwrap_or(false);
      if !ok {
        return Err(invalid(path, format!("core concept `{field}` must be a non-empty string")));
      }
    }
  }

  Ok(value)
}

// ---- quiz ----

fn validate_quiz(value: Value) -> Result<Value, ValidationError> {
  let questions = unwrap_question_array(value)?;
  if questions.is_empty() {
    return Err(invalid("quiz", "must contain at least one question"));
  }

  let mut normalized = Vec::with_capacity(questions.len());
  for (qi, q) in questions.into_iter().enumerate() {
    normalized.push(validate_question(q, &format!("quiz[{qi}]"))?);
  }
  Ok(Value::Array(normalized))
}

/// Accept a bare array, or an object wrapping one (`{"questions": [...]}` or
/// any single array-valued field).
fn unwrap_question_array(value: Value) -> Result<Vec<Value>, ValidationError> {
  match value {
    Value::Array(a) => Ok(a),
    Value::Object(mut obj) => {
      if let Some(Value::Array(a)) = obj.remove("questions") {
        return Ok(a);
      }
      let arrays: Vec<Vec<Value>> = obj
        .into_iter()
        .filter_map(|(_, v)| match v {
          Value::Array(a) if !a.is_empty() => Some(a),
          _ => None,
        })
        .collect();
      match arrays.into_iter().next() {
        Some(a) => Ok(a),
        None => Err(invalid("quiz", "expected an array of questions")),
      }
    }
    _ => Err(invalid("quiz", "expected an array of questions")),
  }
}

fn validate_question(mut q: Value, path: &str) -> Result<Value, ValidationError> {
  let obj: &mut Map<String, Value> = q
    .as_object_mut()
    .ok_or_else(|| invalid(path, "question must be an object"))?;

  let text_ok = obj.get("question").and_then(Value::as_str).map(|s| !s.trim().is_empty()).unwrap_or(false);
  if !text_ok {
    return Err(ValidationError::MissingField { path: path.into(), field: "question" });
  }

  let options: Vec<String> = obj
    .get("options")
    .and_then(Value::as_array)
    .ok_or(ValidationError::MissingField { path: path.into(), field: "options" })?
    .iter()
    .map(|v| v.as_str().map(str::to_string))
    .collect::<Option<Vec<_>>>()
    .ok_or_else(|| invalid(path, "options must all be strings"))?;

  if options.len() != 4 {
    return Err(invalid(path, format!("expected exactly 4 options, got {}", options.len())));
  }
  for (i, a) in options.iter().enumerate() {
    if a.trim().is_empty() {
      return Err(invalid(path, "options must be non-empty"));
    }
    if options[i + 1..].iter().any(|b| b == a) {
      return Err(invalid(path, format!("duplicate option `{a}`")));
    }
  }

  // The designated correct option must be a member of the option set.
  // Guessing which option was "really" meant is unsafe, so a mismatch
  // rejects the question rather than patching it.
  let answer = obj
    .get("correct_answer")
    .and_then(Value::as_str)
    .ok_or(ValidationError::MissingField { path: path.into(), field: "correct_answer" })?;
  if !options.iter().any(|o| o == answer) {
    return Err(invalid(path, "correct_answer is not one of the options"));
  }

  // Canonicalize enum spellings where present; absence is filled by the builder.
  if let Some(raw) = obj.get("difficulty").and_then(Value::as_str) {
    if let Some(tier) = DifficultyTier::parse(raw) {
      obj.insert("difficulty".into(), Value::String(tier.as_str().to_string()));
    }
  }
  if let Some(raw) = obj.get("bloom_level").and_then(Value::as_str) {
    if let Some(level) = CognitiveLevel::parse(raw) {
      obj.insert("bloom_level".into(), Value::String(level.as_str().to_string()));
    }
  }

  Ok(q)
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  fn question(correct: &str) -> Value {
    json!({
      "question": "2+2?",
      "options": ["3", "4", "5", "6"],
      "correct_answer": correct,
      "difficulty": "Easy",
      "explanation": "Basic arithmetic",
    })
  }

  #[test]
  fn accepts_valid_question_array_and_canonicalizes_difficulty() {
    let v = validate(json!([question("4")]), Shape::QuizQuestions).expect("valid");
    assert_eq!(v[0]["difficulty"], "easy");
  }

  #[test]
  fn rejects_correct_answer_outside_options() {
    let err = validate(json!([question("7")]), Shape::QuizQuestions).expect_err("invalid");
    assert!(err.to_string().contains("correct_answer"));
  }

  #[test]
  fn rejects_wrong_option_count() {
    let mut q = question("4");
    q["options"] = json!(["3", "4"]);
    assert!(validate(json!([q]), Shape::QuizQuestions).is_err());
  }

  #[test]
  fn rejects_duplicate_options() {
    let mut q = question("4");
    q["options"] = json!(["4", "4", "5", "6"]);
    assert!(validate(json!([q]), Shape::QuizQuestions).is_err());
  }

  #[test]
  fn unwraps_question_envelope_object() {
    let v = validate(json!({"questions": [question("4")]}), Shape::QuizQuestions).expect("valid");
    assert!(v.is_array());
  }

  #[test]
  fn rejects_empty_quiz() {
    assert!(validate(json!([]), Shape::QuizQuestions).is_err());
  }

  fn minimal_course() -> Value {
    json!({
      "title": "Rust Basics",
      "overview": "An overview.",
      "modules": [{
        "module_title": "Module 1",
        "module_description": "Desc",
        "lessons": [{
          "lesson_title": "Ownership",
          "bloom_level": "understand",
          "learning_outcomes": ["Explain ownership"],
          "content": {
            "introduction": "Ownership is central to Rust.",
            "core_concepts": [{"title": "Moves", "explanation": "Values move."}],
          },
        }],
      }],
    })
  }

  #[test]
  fn accepts_minimal_course_and_canonicalizes_level() {
    let v = validate(minimal_course(), Shape::Course).expect("valid");
    assert_eq!(v["modules"][0]["lessons"][0]["bloom_level"], "Understand");
  }

  #[test]
  fn accepts_legacy_string_lesson_content() {
    let mut c = minimal_course();
    c["modules"][0]["lessons"][0]["content"] = json!("Just a paragraph of prose.");
    assert!(validate(c, Shape::Course).is_ok());
  }

  #[test]
  fn rejects_unknown_bloom_level() {
    let mut c = minimal_course();
    c["modules"][0]["lessons"][0]["bloom_level"] = json!("transcend");
    assert!(validate(c, Shape::Course).is_err());
  }

  #[test]
  fn validates_standalone_lesson_object() {
    let lesson = minimal_course()["modules"][0]["lessons"][0].clone();
    let v = validate(lesson, Shape::Lesson).expect("valid");
    assert_eq!(v["bloom_level"], "Understand");
    assert!(validate(json!({"lesson_title": "x"}), Shape::Lesson).is_err());
  }

  #[test]
  fn rejects_present_but_empty_section() {
    let mut c = minimal_course();
    c["modules"][0]["lessons"][0]["content"]["common_mistakes"] = json!([]);
    assert!(validate(c, Shape::Course).is_err());
  }

  #[test]
  fn rejects_course_without_modules() {
    let mut c = minimal_course();
    c["modules"] = json!([]);
    assert!(validate(c, Shape::Course).is_err());
  }
}
