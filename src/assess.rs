//! Grading and adaptive proficiency tracking.
//!
//! Grading is pure and deterministic: exact string match against the stored
//! correct answer, no partial credit. Transitions look at the raw score of
//! the latest attempt, not the smoothed average, so a single strong or weak
//! attempt moves the learner immediately. The smoothed score is the stable
//! signal reported back to the learner.

use chrono::Utc;
use std::collections::HashMap;
use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::config::EngineConfig;
use crate::domain::{
  CognitiveLevel, DifficultyTier, FeedbackTag, Mastery, ProficiencyRecord, QuizAttempt,
  QuizQuestion,
};

/// Submissions rejected before grading. These never touch the proficiency
/// record.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SubmissionError {
  #[error("answer references unknown question id: {0}")]
  UnknownQuestion(String),
  #[error("submission contains no answers")]
  Empty,
}

/// Outcome of grading one submission, before it is applied to the record.
#[derive(Clone, Debug)]
pub struct GradeReport {
  pub score: f32,
  pub passed: bool,
  pub correct_count: usize,
  pub total_questions: usize,
  /// Question ids answered incorrectly or not at all, with the right answer
  /// and its explanation for the learner.
  pub corrections: Vec<Correction>,
}

#[derive(Clone, Debug, serde::Serialize)]
pub struct Correction {
  pub question_id: String,
  pub question: String,
  pub your_answer: Option<String>,
  pub correct_answer: String,
  pub explanation: String,
}

/// What changed when an attempt was applied.
#[derive(Clone, Debug)]
pub struct AttemptOutcome {
  pub score: f32,
  pub passed: bool,
  pub best_score: f32,
  pub smoothed_score: f32,
  pub attempts: u32,
  pub previous_difficulty: DifficultyTier,
  pub next_difficulty: DifficultyTier,
  pub previous_level: CognitiveLevel,
  pub next_level: CognitiveLevel,
  pub mastery: Mastery,
}

#[derive(Clone, Copy)]
pub struct AssessmentEngine {
  config: EngineConfig,
}

impl AssessmentEngine {
  pub fn new(config: EngineConfig) -> Self {
    Self { config }
  }

  /// Grade a submission against a quiz. Every answer must reference a known
  /// question id; one unknown id rejects the whole submission unscored.
  /// Unanswered questions count as wrong.
  #[instrument(level = "debug", skip(self, quiz, answers), fields(questions = quiz.len()))]
  pub fn grade(
    &self,
    quiz: &[QuizQuestion],
    answers: &HashMap<String, String>,
  ) -> Result<GradeReport, SubmissionError> {
    if answers.is_empty() {
      return Err(SubmissionError::Empty);
    }
    for qid in answers.keys() {
      if !quiz.iter().any(|q| &q.question_id == qid) {
        return Err(SubmissionError::UnknownQuestion(qid.clone()));
      }
    }

    let total = quiz.len();
    let mut correct = 0usize;
    let mut corrections = Vec::new();
    for q in quiz {
      let given = answers.get(&q.question_id);
      if given.map(|a| a == &q.correct_answer).unwrap_or(false) {
        correct += 1;
      } else {
        corrections.push(Correction {
          question_id: q.question_id.clone(),
          question: q.question.clone(),
          your_answer: given.cloned(),
          correct_answer: q.correct_answer.clone(),
          explanation: q.explanation.clone(),
        });
      }
    }

    let score = if total == 0 { 0.0 } else { 100.0 * correct as f32 / total as f32 };
    let passed = score >= self.config.pass_threshold;
    debug!(target: "quiz", score, passed, correct, total, "graded submission");
    Ok(GradeReport { score, passed, correct_count: correct, total_questions: total, corrections })
  }

  /// Fold a graded attempt into the proficiency record and compute the next
  /// difficulty tier and cognitive level.
  ///
  /// Boundary convention: score >= mastery advances, score < struggle
  /// regresses, anything in between (the struggle threshold itself included)
  /// holds. Transitions are single-step and saturate at the extremes.
  #[instrument(level = "info", skip(self, record, report), fields(lesson = %record.lesson_id))]
  pub fn apply_attempt(
    &self,
    record: &mut ProficiencyRecord,
    report: &GradeReport,
    feedback: Option<FeedbackTag>,
  ) -> AttemptOutcome {
    let previous_difficulty = record.current_difficulty;
    let previous_level = record.current_level;

    record.attempts += 1;
    record.best_score = record.best_score.max(report.score);

    let normalized = report.score / 100.0;
    record.smoothed_score = if record.attempts == 1 {
      normalized
    } else {
      self.config.smoothing_alpha * normalized
        + (1.0 - self.config.smoothing_alpha) * record.smoothed_score
    };

    if report.score >= self.config.mastery_threshold {
      record.current_difficulty = record.current_difficulty.next_up();
      record.current_level = record.current_level.next_up();
    } else if report.score < self.config.struggle_threshold {
      record.current_difficulty = record.current_difficulty.next_down();
      record.current_level = record.current_level.next_down();
    }

    if report.passed {
      record.completed = true;
    }

    record.attempt_history.push(QuizAttempt {
      attempt_number: record.attempts,
      score: report.score,
      passed: report.passed,
      feedback,
      timestamp: Utc::now(),
    });

    let mastery = self.mastery(record);
    info!(target: "quiz",
          score = report.score,
          passed = report.passed,
          attempts = record.attempts,
          smoothed = record.smoothed_score,
          difficulty = ?record.current_difficulty,
          level = ?record.current_level,
          "attempt applied");

    AttemptOutcome {
      score: report.score,
      passed: report.passed,
      best_score: record.best_score,
      smoothed_score: record.smoothed_score,
      attempts: record.attempts,
      previous_difficulty,
      next_difficulty: record.current_difficulty,
      previous_level,
      next_level: record.current_level,
      mastery,
    }
  }

  /// Mastery label, derived on read from best score and attempt count.
  pub fn mastery(&self, record: &ProficiencyRecord) -> Mastery {
    if record.attempts == 0 {
      Mastery::NotStarted
    } else if record.best_score >= self.config.mastery_threshold {
      Mastery::Mastered
    } else if record.best_score >= self.config.pass_threshold {
      Mastery::Proficient
    } else if record.best_score >= self.config.struggle_threshold {
      Mastery::Developing
    } else {
      Mastery::NeedsPractice
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn engine() -> AssessmentEngine {
    AssessmentEngine::new(EngineConfig::default())
  }

  fn question(id: &str, correct: &str) -> QuizQuestion {
    QuizQuestion {
      question_id: id.to_string(),
      question: format!("q {id}"),
      options: vec![correct.to_string(), "b".into(), "c".into(), "d".into()],
      correct_answer: correct.to_string(),
      difficulty: DifficultyTier::Medium,
      cognitive_level: CognitiveLevel::Understand,
      explanation: "because".into(),
    }
  }

  fn quiz() -> Vec<QuizQuestion> {
    vec![question("q1", "a1"), question("q2", "a2"), question("q3", "a3"), question("q4", "a4")]
  }

  fn answers(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
  }

  fn report_with_score(score: f32) -> GradeReport {
    GradeReport {
      score,
      passed: score >= 70.0,
      correct_count: 0,
      total_questions: 4,
      corrections: Vec::new(),
    }
  }

  #[test]
  fn grading_is_exact_match_no_partial_credit() {
    let report = engine()
      .grade(&quiz(), &answers(&[("q1", "a1"), ("q2", "A2"), ("q3", "a3"), ("q4", "wrong")]))
      .expect("graded");
    assert_eq!(report.correct_count, 2);
    assert_eq!(report.score, 50.0);
    assert!(!report.passed);
    assert_eq!(report.corrections.len(), 2);
    assert_eq!(report.corrections[0].question_id, "q2");
  }

  #[test]
  fn unanswered_questions_count_as_wrong() {
    let report = engine().grade(&quiz(), &answers(&[("q1", "a1")])).expect("graded");
    assert_eq!(report.correct_count, 1);
    assert_eq!(report.score, 25.0);
    assert_eq!(report.corrections.len(), 3);
    assert!(report.corrections.iter().all(|c| c.your_answer.is_none() || c.question_id == "q1"));
  }

  #[test]
  fn unknown_question_id_rejects_whole_submission() {
    let err = engine()
      .grade(&quiz(), &answers(&[("q1", "a1"), ("q-bogus", "x")]))
      .expect_err("rejected");
    assert_eq!(err, SubmissionError::UnknownQuestion("q-bogus".into()));
  }

  #[test]
  fn empty_submission_is_rejected() {
    let err = engine().grade(&quiz(), &HashMap::new()).expect_err("rejected");
    assert_eq!(err, SubmissionError::Empty);
  }

  #[test]
  fn three_of_four_clears_the_pass_threshold() {
    let eng = engine();
    let three_of_four = eng
      .grade(&quiz(), &answers(&[("q1", "a1"), ("q2", "a2"), ("q3", "a3"), ("q4", "no")]))
      .expect("graded");
    assert_eq!(three_of_four.score, 75.0);
    assert!(three_of_four.passed);
  }

  #[test]
  fn score_85_advances_one_step_from_every_tier_and_level() {
    let eng = engine();
    for tier in DifficultyTier::ALL {
      for level in CognitiveLevel::ALL {
        let mut rec = ProficiencyRecord::new("l", level);
        rec.current_difficulty = tier;
        let out = eng.apply_attempt(&mut rec, &report_with_score(85.0), None);
        assert_eq!(out.next_difficulty, tier.next_up());
        assert_eq!(out.next_level, level.next_up());
      }
    }
    // Saturation at the top.
    let mut rec = ProficiencyRecord::new("l", CognitiveLevel::Create);
    rec.current_difficulty = DifficultyTier::Hard;
    let out = eng.apply_attempt(&mut rec, &report_with_score(100.0), None);
    assert_eq!(out.next_difficulty, DifficultyTier::Hard);
    assert_eq!(out.next_level, CognitiveLevel::Create);
  }

  #[test]
  fn score_below_50_regresses_and_exactly_50_holds() {
    let eng = engine();
    let mut rec = ProficiencyRecord::new("l", CognitiveLevel::Apply);
    rec.current_difficulty = DifficultyTier::Medium;

    let out = eng.apply_attempt(&mut rec, &report_with_score(50.0), None);
    assert_eq!(out.next_difficulty, DifficultyTier::Medium);
    assert_eq!(out.next_level, CognitiveLevel::Apply);

    let out = eng.apply_attempt(&mut rec, &report_with_score(49.9), None);
    assert_eq!(out.next_difficulty, DifficultyTier::Easy);
    assert_eq!(out.next_level, CognitiveLevel::Understand);

    // Saturation at the bottom.
    let out = eng.apply_attempt(&mut rec, &report_with_score(0.0), None);
    assert_eq!(out.next_difficulty, DifficultyTier::Easy);
    assert_eq!(out.next_level, CognitiveLevel::Remember);
    let out = eng.apply_attempt(&mut rec, &report_with_score(0.0), None);
    assert_eq!(out.next_difficulty, DifficultyTier::Easy);
    assert_eq!(out.next_level, CognitiveLevel::Remember);
  }

  #[test]
  fn in_between_scores_hold_position() {
    let eng = engine();
    let mut rec = ProficiencyRecord::new("l", CognitiveLevel::Analyze);
    rec.current_difficulty = DifficultyTier::Hard;
    for score in [50.0, 69.9, 70.0, 84.9] {
      let out = eng.apply_attempt(&mut rec, &report_with_score(score), None);
      assert_eq!(out.next_difficulty, DifficultyTier::Hard, "score {score}");
      assert_eq!(out.next_level, CognitiveLevel::Analyze, "score {score}");
    }
  }

  #[test]
  fn first_attempt_initializes_ema_then_smooths() {
    let eng = engine();
    let mut rec = ProficiencyRecord::new("l", CognitiveLevel::Understand);

    let out = eng.apply_attempt(&mut rec, &report_with_score(90.0), None);
    assert!((out.smoothed_score - 0.9).abs() < 1e-6);
    assert_eq!(out.next_difficulty, DifficultyTier::Hard);
    assert_eq!(out.next_level, CognitiveLevel::Apply);
    assert_eq!(out.best_score, 90.0);

    // 0.3 * 0.4 + 0.7 * 0.9 = 0.75
    let out = eng.apply_attempt(&mut rec, &report_with_score(40.0), None);
    assert!((out.smoothed_score - 0.75).abs() < 1e-6);
    assert_eq!(out.next_difficulty, DifficultyTier::Medium);
    assert_eq!(out.next_level, CognitiveLevel::Understand);
    assert_eq!(out.best_score, 90.0);
    assert_eq!(out.attempts, 2);
  }

  #[test]
  fn passing_marks_lesson_completed_and_stays_completed() {
    let eng = engine();
    let mut rec = ProficiencyRecord::new("l", CognitiveLevel::Remember);
    eng.apply_attempt(&mut rec, &report_with_score(75.0), None);
    assert!(rec.completed);
    eng.apply_attempt(&mut rec, &report_with_score(30.0), None);
    assert!(rec.completed);
  }

  #[test]
  fn history_preserves_order_and_feedback() {
    let eng = engine();
    let mut rec = ProficiencyRecord::new("l", CognitiveLevel::Remember);
    eng.apply_attempt(&mut rec, &report_with_score(60.0), Some(FeedbackTag::TooHard));
    eng.apply_attempt(&mut rec, &report_with_score(80.0), None);
    assert_eq!(rec.attempt_history.len(), 2);
    assert_eq!(rec.attempt_history[0].attempt_number, 1);
    assert_eq!(rec.attempt_history[0].feedback, Some(FeedbackTag::TooHard));
    assert_eq!(rec.attempt_history[1].attempt_number, 2);
    assert!(rec.attempt_history[1].passed);
  }

  #[test]
  fn mastery_labels_follow_best_score_bands() {
    let eng = engine();
    let mut rec = ProficiencyRecord::new("l", CognitiveLevel::Remember);
    assert_eq!(eng.mastery(&rec), Mastery::NotStarted);

    eng.apply_attempt(&mut rec, &report_with_score(30.0), None);
    assert_eq!(eng.mastery(&rec), Mastery::NeedsPractice);
    eng.apply_attempt(&mut rec, &report_with_score(55.0), None);
    assert_eq!(eng.mastery(&rec), Mastery::Developing);
    eng.apply_attempt(&mut rec, &report_with_score(70.0), None);
    assert_eq!(eng.mastery(&rec), Mastery::Proficient);
    eng.apply_attempt(&mut rec, &report_with_score(85.0), None);
    assert_eq!(eng.mastery(&rec), Mastery::Mastered);
    // Best score never decreases, so the label sticks.
    eng.apply_attempt(&mut rec, &report_with_score(10.0), None);
    assert_eq!(eng.mastery(&rec), Mastery::Mastered);
  }
}
