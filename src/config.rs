//! Application configuration: assessment thresholds, retry policy, and prompt
//! templates, loadable from TOML (APP_CONFIG_PATH) with sensible defaults.

use serde::Deserialize;
use tracing::{error, info};

/// Thresholds and policy knobs for the assessment engine and the retry
/// orchestrator. Passed explicitly at construction so tests can pin boundary
/// values; nothing reads these from the environment at call time.
#[derive(Clone, Copy, Debug, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
  /// Minimum score to pass a quiz.
  pub pass_threshold: f32,
  /// Score at or above which tier/level advance one step.
  pub mastery_threshold: f32,
  /// Score below which tier/level regress one step.
  pub struggle_threshold: f32,
  /// EMA smoothing factor for the proficiency score.
  pub smoothing_alpha: f32,
  /// Fixed retry bound for generate-and-validate.
  pub max_attempts: u32,
  /// Per-call timeout for the generation client, in seconds.
  pub request_timeout_secs: u64,
}

impl Default for EngineConfig {
  fn default() -> Self {
    Self {
      pass_threshold: 70.0,
      mastery_threshold: 85.0,
      struggle_threshold: 50.0,
      smoothing_alpha: 0.3,
      max_attempts: 3,
      request_timeout_secs: 60,
    }
  }
}

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
  #[serde(default)]
  pub engine: EngineConfig,
  #[serde(default)]
  pub prompts: Prompts,
}

/// Prompt templates used by the generation client. Overridable in TOML to
/// tune tone/structure without rebuilding.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Prompts {
  pub course_system: String,
  /// Stricter system prompt used on retry attempts after a malformed response.
  pub course_system_strict: String,
  pub course_user_template: String,
  pub quiz_system: String,
  pub quiz_user_template: String,
  pub regen_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      course_system: "You are writing a professional programming course. \
        Write comprehensive, detailed lessons, like a patient instructor explaining to a motivated learner. \
        Output ONLY valid JSON: no text before or after, no markdown code fences. \
        All strings must be properly escaped; use \\n for newlines inside strings. \
        Keep code examples short and simple."
        .into(),
      course_system_strict: "You are a professional course author. Output VALID JSON ONLY. \
        No text before or after the JSON, no markdown fences. \
        Escape every string properly: \\n for newlines, \\\\ for backslashes. \
        Keep code examples to 3-5 lines and avoid complex escape sequences."
        .into(),
      course_user_template: "Create a course about \"{topic}\" for a {audience} audience, {duration_hours} hours total, \
        {num_modules} modules with {lessons_per_module} lessons each. \
        Lessons progress through cognitive levels (Remember, Understand, Apply, Analyze, Evaluate, Create). \
        Each lesson's \"content\" must be an object with: introduction (string), outline (array of strings), \
        core_concepts (array of objects with title, explanation, code_example), walkthrough (array of strings), \
        worked_examples (array of objects with description, code, explanation), common_mistakes (array of strings), \
        summary (string), reflection_prompts (array of strings). \
        Each lesson needs 3 quiz questions with exactly 4 options, one correct_answer that exactly matches an option, \
        a difficulty (easy|medium|hard), and an explanation. \
        Return ONLY JSON with this shape: {\"title\": \"...\", \"overview\": \"...\", \"modules\": [{\"module_title\": \"...\", \
        \"module_description\": \"...\", \"lessons\": [{\"lesson_title\": \"...\", \"bloom_level\": \"Remember\", \
        \"learning_outcomes\": [\"...\"], \"content\": {}, \"estimated_duration_minutes\": 30, \"quiz\": []}]}]}"
        .into(),
      quiz_system: "You are a quiz author. Output ONLY a valid JSON array, starting with [ and ending with ]. \
        No markdown, no code fences, no explanatory text."
        .into(),
      quiz_user_template: "Generate exactly {num_questions} quiz questions from this lesson content.\n\n\
        LESSON CONTENT:\n{lesson_content}\n\n\
        Requirements: test the {bloom_level} level ({bloom_description}); difficulty {difficulty}; \
        each question has exactly 4 options and one correct_answer that EXACTLY matches one option; \
        include an explanation for the correct answer.{adaptation}\n\n\
        Format: [{\"question\": \"...\", \"options\": [\"A\", \"B\", \"C\", \"D\"], \"correct_answer\": \"A\", \
        \"difficulty\": \"{difficulty}\", \"explanation\": \"...\"}]"
        .into(),
      regen_user_template: "Regenerate this lesson based on learner feedback.\n\n\
        ORIGINAL:\n{original_json}\n\n\
        FEEDBACK: {feedback}\nINSTRUCTION: {instruction}\n\n\
        Keep the cognitive level at {bloom_level}. Return the complete improved lesson as ONE JSON object \
        in the same structure as the original."
        .into(),
    }
  }
}

/// Load `AppConfig` from the file named by APP_CONFIG_PATH.
/// Any IO or parse error falls back to defaults (reported, not fatal).
pub fn load_app_config_from_env() -> AppConfig {
  let path = match std::env::var("APP_CONFIG_PATH") {
    Ok(p) => p,
    Err(_) => return AppConfig::default(),
  };
  match std::fs::read_to_string(&path) {
    Ok(s) => match toml::from_str::<AppConfig>(&s) {
      Ok(cfg) => {
        info!(target: "courseforge_backend", %path, "Loaded app config (TOML)");
        cfg
      }
      Err(e) => {
        error!(target: "courseforge_backend", %path, error = %e, "Failed to parse TOML config; using defaults");
        AppConfig::default()
      }
    },
    Err(e) => {
      error!(target: "courseforge_backend", %path, error = %e, "Failed to read TOML config file; using defaults");
      AppConfig::default()
    }
  }
}
