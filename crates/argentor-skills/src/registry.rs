//! Central registry mapping skill name to implementation, with the cached
//! short-circuit invocation path spec §6 describes.

use crate::descriptor::SkillDescriptor;
use crate::error::{SkillError, SkillResult};
use crate::idempotency;
use crate::skill::{Skill, SkillArtifact, SkillInput, SkillOutcome};
use argentor_core::SkillRunId;
use argentor_storage::{SkillRun, Store};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Central registry for all available skills.
pub struct SkillRegistry {
    skills: HashMap<String, Arc<dyn Skill>>,
}

impl SkillRegistry {
    pub fn new() -> Self {
        Self { skills: HashMap::new() }
    }

    pub fn register(&mut self, skill: Arc<dyn Skill>) {
        let name = skill.descriptor().name.clone();
        info!(skill = %name, "registered skill");
        self.skills.insert(name, skill);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Skill>> {
        self.skills.get(name)
    }

    pub fn list_descriptors(&self) -> Vec<&SkillDescriptor> {
        self.skills.values().map(|s| s.descriptor()).collect()
    }

    /// Invokes `name` against `input`, consulting the `skill_runs` cache
    /// first when the skill's idempotency strategy allows it. Every
    /// invocation — cached or not — is recorded; a fresh invocation's
    /// result is additionally persisted so future calls can hit the cache.
    pub async fn invoke(&self, store: &Store, name: &str, input: SkillInput) -> SkillResult<SkillOutcome> {
        let skill = self.skills.get(name).ok_or_else(|| SkillError::UnknownSkill(name.to_string()))?;
        let descriptor = skill.descriptor();

        let idempotency_key = idempotency::compute_key(descriptor.idempotency_strategy, &input.files, &input.params)
            .map_err(|e| SkillError::BadInput {
                skill: "skill_registry",
                reason: format!("reading input files for idempotency hash: {e}"),
            })?;

        if let Some(key) = &idempotency_key {
            if let Some(cached) = store.find_cached_skill_run(name, key)? {
                info!(skill = name, idempotency_key = %key, "skill cache hit, short-circuiting");
                return outcome_from_cached(&cached);
            }
        }

        let input_hash = combined_input_hash(&input.files);
        let task_id = input.task_id;
        let started_at = argentor_core::utc_now();
        let result = skill.execute(input).await;

        match result {
            Ok(outcome) => {
                let run = SkillRun {
                    skill_run_id: SkillRunId::new(),
                    task_id,
                    skill_name: name.to_string(),
                    idempotency_key,
                    input_hash: input_hash.clone(),
                    status: "SUCCEEDED".to_string(),
                    output_json: Some(serde_json::to_value(&outcome).unwrap_or(serde_json::Value::Null)),
                    error_code: None,
                    started_at,
                    finished_at: Some(argentor_core::utc_now()),
                };
                store.record_skill_run(&run)?;
                Ok(outcome)
            }
            Err(err) => {
                warn!(skill = name, error = %err, "skill invocation failed");
                let error_code = match &err {
                    SkillError::BadInput { .. } => "SKILL_BAD_INPUT",
                    _ => "SKILL_FAILED",
                };
                let run = SkillRun {
                    skill_run_id: SkillRunId::new(),
                    task_id,
                    skill_name: name.to_string(),
                    idempotency_key,
                    input_hash,
                    status: "FAILED".to_string(),
                    output_json: None,
                    error_code: Some(error_code.to_string()),
                    started_at,
                    finished_at: Some(argentor_core::utc_now()),
                };
                store.record_skill_run(&run)?;
                Err(err)
            }
        }
    }

    pub fn skill_count(&self) -> usize {
        self.skills.len()
    }
}

impl Default for SkillRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Folds the selected inputs' content hashes into one digest recorded on the
/// `skill_runs` row, so a run can be traced back to the exact evidence
/// versions it consumed without re-reading files off disk.
fn combined_input_hash(files: &[crate::skill::SkillInputFile]) -> Option<String> {
    if files.is_empty() {
        return None;
    }
    let mut sorted: Vec<&str> = files.iter().map(|f| f.sha256.as_str()).collect();
    sorted.sort_unstable();
    let mut hasher = Sha256::new();
    for sha in sorted {
        hasher.update(sha.as_bytes());
    }
    Some(hex::encode(hasher.finalize()))
}

fn outcome_from_cached(run: &SkillRun) -> SkillResult<SkillOutcome> {
    let artifacts: Vec<SkillArtifact> = run
        .output_json
        .as_ref()
        .and_then(|v| v.get("artifacts"))
        .cloned()
        .map(serde_json::from_value)
        .transpose()
        .map_err(|e| SkillError::Failed { skill: "skill_registry", reason: format!("corrupt cached skill_runs row: {e}") })?
        .unwrap_or_default();
    Ok(SkillOutcome { artifacts })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::IdempotencyStrategy;
    use crate::skill::SkillInputFile;
    use async_trait::async_trait;
    use argentor_core::{PlanId, TaskId};

    struct CountingSkill {
        descriptor: SkillDescriptor,
        calls: std::sync::atomic::AtomicUsize,
    }

    impl CountingSkill {
        fn new(strategy: IdempotencyStrategy) -> Self {
            Self {
                descriptor: SkillDescriptor {
                    name: "counting".into(),
                    description: "counts invocations".into(),
                    input_schema: serde_json::json!({}),
                    output_schema: serde_json::json!({}),
                    params_schema: serde_json::json!({}),
                    idempotency_strategy: strategy,
                },
                calls: std::sync::atomic::AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Skill for CountingSkill {
        fn descriptor(&self) -> &SkillDescriptor {
            &self.descriptor
        }

        async fn execute(&self, _input: SkillInput) -> SkillResult<SkillOutcome> {
            self.calls.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            Ok(SkillOutcome {
                artifacts: vec![SkillArtifact {
                    name: "out".into(),
                    path: "/tmp/out.txt".into(),
                    sha256: "abc".into(),
                    format: argentor_core::ArtifactFormat::Txt,
                }],
            })
        }
    }

    fn sample_input(files: Vec<SkillInputFile>) -> SkillInput {
        SkillInput { task_id: TaskId::new(), plan_id: PlanId::new(), files, params: serde_json::json!({}) }
    }

    #[tokio::test]
    async fn cached_success_short_circuits_the_second_invocation() {
        let store = Store::open_in_memory().unwrap();
        let mut registry = SkillRegistry::new();
        let skill = Arc::new(CountingSkill::new(IdempotencyStrategy::InputHashes));
        registry.register(skill.clone());

        let mut f = tempfile::NamedTempFile::new().unwrap();
        std::io::Write::write_all(&mut f, b"content").unwrap();
        let file = SkillInputFile { name: "doc".into(), path: f.path().to_string_lossy().to_string(), sha256: "deadbeef".into() };

        registry.invoke(&store, "counting", sample_input(vec![file.clone()])).await.unwrap();
        registry.invoke(&store, "counting", sample_input(vec![file])).await.unwrap();

        assert_eq!(skill.calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn disabled_strategy_never_caches() {
        let store = Store::open_in_memory().unwrap();
        let mut registry = SkillRegistry::new();
        let skill = Arc::new(CountingSkill::new(IdempotencyStrategy::Disabled));
        registry.register(skill.clone());

        registry.invoke(&store, "counting", sample_input(vec![])).await.unwrap();
        registry.invoke(&store, "counting", sample_input(vec![])).await.unwrap();

        assert_eq!(skill.calls.load(std::sync::atomic::Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn unknown_skill_name_is_an_error() {
        let store = Store::open_in_memory().unwrap();
        let registry = SkillRegistry::new();
        let err = registry.invoke(&store, "nonexistent", sample_input(vec![])).await.unwrap_err();
        assert!(matches!(err, SkillError::UnknownSkill(_)));
    }
}
