//! Application state: persistent store, assessment engine, generation
//! pipeline, and per-learner progress locks.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{info, instrument, warn};

use crate::assess::AssessmentEngine;
use crate::config::{load_app_config_from_env, Prompts};
use crate::llm::LlmClient;
use crate::pipeline::RetryOrchestrator;
use crate::regen::RegenerationCoordinator;
use crate::storage::{Store, StoreError};

/// Serializes read-modify-write cycles that share a string key, e.g. one
/// learner's progress in one course, or one course document. Acquisitions
/// for the same key apply in sequence; the map itself is only held long
/// enough to clone the per-key lock. Entries with no guard and no waiter
/// are evicted on the next acquire, so the map does not grow with every
/// key ever seen.
#[derive(Clone, Default)]
pub struct KeyedLocks {
  inner: Arc<Mutex<HashMap<String, Arc<Mutex<()>>>>>,
}

impl KeyedLocks {
  pub async fn acquire(&self, key: &str) -> OwnedMutexGuard<()> {
    let lock = {
      let mut map = self.inner.lock().await;
      // A guard or a waiting task holds its own Arc clone; count 1 means
      // the map is the only remaining owner.
      map.retain(|_, l| Arc::strong_count(l) > 1);
      Arc::clone(map.entry(key.to_string()).or_default())
    };
    lock.lock_owned().await
  }
}

#[derive(Clone)]
pub struct AppState {
  pub store: Store,
  pub engine: AssessmentEngine,
  pub prompts: Prompts,
  /// Absent when LLM_API_KEY is unset; generation endpoints report 503.
  pub orchestrator: Option<RetryOrchestrator>,
  pub regen: Option<RegenerationCoordinator>,
  /// Serializes load-modify-save of one course document.
  pub course_locks: KeyedLocks,
  /// Serializes one learner's progress updates in one course.
  pub progress_locks: KeyedLocks,
}

impl AppState {
  /// Build state from env: load config, open the store, init the generation
  /// client if an API key is present.
  #[instrument(level = "info", skip_all)]
  pub fn new() -> Result<Self, StoreError> {
    let cfg = load_app_config_from_env();
    let store = Store::from_env()?;
    let engine = AssessmentEngine::new(cfg.engine);

    let timeout = Duration::from_secs(cfg.engine.request_timeout_secs);
    let orchestrator = LlmClient::from_env(timeout).map(|client| {
      info!(target: "courseforge_backend", base_url = %client.base_url(), model = %client.model(), "LLM enabled");
      RetryOrchestrator::new(Arc::new(client), &cfg.engine)
    });
    if orchestrator.is_none() {
      warn!(target: "courseforge_backend", "LLM disabled (no LLM_API_KEY); generation endpoints unavailable");
    }
    let regen = orchestrator
      .clone()
      .map(|orch| RegenerationCoordinator::new(orch, cfg.prompts.clone()));

    Ok(Self {
      store,
      engine,
      prompts: cfg.prompts,
      orchestrator,
      regen,
      course_locks: KeyedLocks::default(),
      progress_locks: KeyedLocks::default(),
    })
  }
}
