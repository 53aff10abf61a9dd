//! Runtime configuration (spec §9 "global mutable state"), loaded once
//! from an `agentor.toml` file and cached behind a process-wide `RwLock`,
//! grounded on `core/runtime_config.py`'s module-level `_CACHE` singleton
//! with an explicit `reset_runtime_config_cache` test hook.

use crate::error::{OrchestratorError, OrchestratorResult};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

static CACHE: RwLock<Option<RuntimeConfig>> = RwLock::new(None);

/// The workflow engine's tunable budgets and workspace location. Field
/// defaults mirror `core/runtime_config.py`'s fallback values and
/// `config.py`'s module constants.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct RuntimeConfig {
    pub max_review_attempts_per_plan: u32,
    pub max_check_attempts_v2: u32,
    pub max_plan_attempts: u32,
    pub oversized_action_threshold_days: f64,
    pub split_depth_budget: u32,
    pub executor_batch_size: usize,
    pub reviewer_batch_size: usize,
    pub check_batch_size: usize,
    pub plan_runtime_seconds_budget: u64,
    pub max_llm_calls_per_run: u32,
    pub failed_auto_reset_ready: bool,
    pub workspace_root: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_review_attempts_per_plan: 3,
            max_check_attempts_v2: 3,
            max_plan_attempts: 3,
            oversized_action_threshold_days: 10.0,
            split_depth_budget: 5,
            executor_batch_size: 5,
            reviewer_batch_size: 5,
            check_batch_size: 5,
            plan_runtime_seconds_budget: 2 * 60 * 60,
            max_llm_calls_per_run: 200,
            failed_auto_reset_ready: false,
            workspace_root: PathBuf::from("workspace"),
        }
    }
}

impl RuntimeConfig {
    /// Parses `path` as TOML, falling back to defaults for any field it
    /// doesn't set, matching `_load_json`'s "missing file -> defaults"
    /// behavior.
    pub fn load(path: impl AsRef<Path>) -> OrchestratorResult<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| OrchestratorError::Config(format!("invalid {}: {e}", path.display())))
    }

    /// Returns a clone of the process-wide cached config, loading
    /// `agentor.toml` from the current directory on first access.
    pub fn get() -> OrchestratorResult<RuntimeConfig> {
        if let Some(cfg) = CACHE.read().expect("config cache lock poisoned").as_ref() {
            return Ok(cfg.clone());
        }
        let loaded = Self::load("agentor.toml")?;
        *CACHE.write().expect("config cache lock poisoned") = Some(loaded.clone());
        Ok(loaded)
    }

    /// Clears the cached config so the next [`RuntimeConfig::get`] call
    /// reloads from disk. Test isolation hook, per spec §9.
    pub fn reset_for_test() {
        *CACHE.write().expect("config cache lock poisoned") = None;
    }
}
