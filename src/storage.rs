//! JSON-file persistence for courses and learner progress.
//!
//! One file per course and one per (course, learner) progress map, under
//! DATA_DIR (default ./data). Writes go through a temp file and rename so a
//! crash mid-write never leaves a truncated document behind.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{info, warn};

use crate::domain::{Course, FeedbackEntry, ProficiencyRecord};

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("invalid storage key: {0}")]
  InvalidKey(String),
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
  #[error("serialization error: {0}")]
  Serde(#[from] serde_json::Error),
}

/// Progress for one learner in one course, keyed by lesson id.
pub type ProgressMap = HashMap<String, ProficiencyRecord>;

#[derive(Clone, Debug)]
pub struct Store {
  courses_dir: PathBuf,
  progress_dir: PathBuf,
  feedback_dir: PathBuf,
}

impl Store {
  pub fn new(root: impl AsRef<Path>) -> Result<Self, StoreError> {
    let root = root.as_ref();
    let courses_dir = root.join("courses");
    let progress_dir = root.join("progress");
    let feedback_dir = root.join("feedback");
    fs::create_dir_all(&courses_dir)?;
    fs::create_dir_all(&progress_dir)?;
    fs::create_dir_all(&feedback_dir)?;
    info!(target: "courseforge_backend", root = %root.display(), "storage initialized");
    Ok(Self { courses_dir, progress_dir, feedback_dir })
  }

  pub fn from_env() -> Result<Self, StoreError> {
    let root = std::env::var("DATA_DIR").unwrap_or_else(|_| "./data".into());
    Self::new(root)
  }

  pub fn save_course(&self, course: &Course) -> Result<(), StoreError> {
    check_key(&course.course_id)?;
    let path = self.courses_dir.join(format!("{}.json", course.course_id));
    write_atomic(&path, &serde_json::to_vec_pretty(course)?)?;
    Ok(())
  }

  pub fn load_course(&self, course_id: &str) -> Result<Option<Course>, StoreError> {
    check_key(course_id)?;
    let path = self.courses_dir.join(format!("{course_id}.json"));
    if !path.exists() {
      return Ok(None);
    }
    let bytes = fs::read(&path)?;
    Ok(Some(serde_json::from_slice(&bytes)?))
  }

  /// All courses owned by `owner_id`. Files that fail to parse are skipped
  /// and reported rather than failing the whole listing.
  pub fn list_courses(&self, owner_id: &str) -> Result<Vec<Course>, StoreError> {
    let mut out = Vec::new();
    for entry in fs::read_dir(&self.courses_dir)? {
      let path = entry?.path();
      if path.extension().and_then(|e| e.to_str()) != Some("json") {
        continue;
      }
      match fs::read(&path).map_err(StoreError::from).and_then(|b| {
        serde_json::from_slice::<Course>(&b).map_err(StoreError::from)
      }) {
        Ok(course) if course.owner_id == owner_id => out.push(course),
        Ok(_) => {}
        Err(e) => {
          warn!(target: "courseforge_backend", path = %path.display(), error = %e,
                "skipping unreadable course file");
        }
      }
    }
    out.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    Ok(out)
  }

  /// Delete a course and every learner's progress in it.
  pub fn delete_course(&self, course_id: &str) -> Result<bool, StoreError> {
    check_key(course_id)?;
    let path = self.courses_dir.join(format!("{course_id}.json"));
    if !path.exists() {
      return Ok(false);
    }
    fs::remove_file(&path)?;
    self.delete_progress_for_course(course_id)?;
    let feedback = self.feedback_path(course_id);
    if feedback.exists() {
      if let Err(e) = fs::remove_file(&feedback) {
        warn!(target: "courseforge_backend", path = %feedback.display(), error = %e,
              "failed to remove feedback log");
      }
    }
    Ok(true)
  }

  /// Append one entry to the course's feedback log.
  pub fn append_feedback(&self, course_id: &str, entry: &FeedbackEntry) -> Result<(), StoreError> {
    check_key(course_id)?;
    let mut log = self.load_feedback(course_id)?;
    log.push(entry.clone());
    write_atomic(&self.feedback_path(course_id), &serde_json::to_vec_pretty(&log)?)?;
    Ok(())
  }

  /// Full feedback log for a course, oldest first; empty if none recorded.
  pub fn load_feedback(&self, course_id: &str) -> Result<Vec<FeedbackEntry>, StoreError> {
    check_key(course_id)?;
    let path = self.feedback_path(course_id);
    if !path.exists() {
      return Ok(Vec::new());
    }
    let bytes = fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  pub fn save_progress(
    &self,
    course_id: &str,
    user_id: &str,
    progress: &ProgressMap,
  ) -> Result<(), StoreError> {
    check_key(course_id)?;
    check_key(user_id)?;
    let path = self.progress_path(course_id, user_id);
    write_atomic(&path, &serde_json::to_vec_pretty(progress)?)?;
    Ok(())
  }

  /// Progress map for one learner, empty if none recorded yet.
  pub fn load_progress(&self, course_id: &str, user_id: &str) -> Result<ProgressMap, StoreError> {
    check_key(course_id)?;
    check_key(user_id)?;
    let path = self.progress_path(course_id, user_id);
    if !path.exists() {
      return Ok(ProgressMap::new());
    }
    let bytes = fs::read(&path)?;
    Ok(serde_json::from_slice(&bytes)?)
  }

  /// Drop all learners' progress for a course. Used on delete and on
  /// whole-course regeneration, which invalidates old question ids.
  pub fn delete_progress_for_course(&self, course_id: &str) -> Result<(), StoreError> {
    check_key(course_id)?;
    let prefix = format!("{course_id}__");
    for entry in fs::read_dir(&self.progress_dir)? {
      let path = entry?.path();
      let matches = path
        .file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with(&prefix))
        .unwrap_or(false);
      if matches {
        if let Err(e) = fs::remove_file(&path) {
          warn!(target: "courseforge_backend", path = %path.display(), error = %e,
                "failed to remove progress file");
        }
      }
    }
    Ok(())
  }

  fn progress_path(&self, course_id: &str, user_id: &str) -> PathBuf {
    self.progress_dir.join(format!("{course_id}__{user_id}.json"))
  }

  fn feedback_path(&self, course_id: &str) -> PathBuf {
    self.feedback_dir.join(format!("{course_id}.json"))
  }
}

/// Storage keys become file names; restrict them to a safe alphabet.
fn check_key(key: &str) -> Result<(), StoreError> {
  let ok = !key.is_empty()
    && key.len() <= 128
    && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_' || c == '.');
  if ok && !key.starts_with('.') {
    Ok(())
  } else {
    Err(StoreError::InvalidKey(key.to_string()))
  }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), StoreError> {
  let tmp = path.with_extension("json.tmp");
  fs::write(&tmp, bytes)?;
  fs::rename(&tmp, path)?;
  Ok(())
}
