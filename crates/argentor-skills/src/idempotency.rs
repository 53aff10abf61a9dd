//! Computes the cache key used to short-circuit repeated skill invocations
//! (spec §6: "Each invocation produces a skill_runs row keyed by the
//! idempotency hash; cached successful runs short-circuit").

use crate::descriptor::IdempotencyStrategy;
use crate::skill::SkillInputFile;
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fs;

/// Computes the idempotency key for one invocation, or `None` when the
/// strategy is [`IdempotencyStrategy::Disabled`].
///
/// `INPUT_HASHES` hashes the file contents only; `INPUT_HASHES_PLUS_PARAMS`
/// folds the canonical JSON params into the same digest so a param change
/// invalidates the cache even when the inputs are unchanged.
pub fn compute_key(
    strategy: IdempotencyStrategy,
    files: &[SkillInputFile],
    params: &Value,
) -> std::io::Result<Option<String>> {
    if strategy == IdempotencyStrategy::Disabled {
        return Ok(None);
    }

    let mut hasher = Sha256::new();
    let mut sorted: Vec<&SkillInputFile> = files.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    for file in sorted {
        hasher.update(file.path.as_bytes());
        hasher.update(fs::read(&file.path)?);
    }

    if strategy == IdempotencyStrategy::InputHashesPlusParams {
        hasher.update(params.to_string().as_bytes());
    }

    Ok(Some(hex::encode(hasher.finalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn file_with(content: &[u8]) -> (tempfile::NamedTempFile, SkillInputFile) {
        let mut f = tempfile::NamedTempFile::new().unwrap();
        f.write_all(content).unwrap();
        let path = f.path().to_string_lossy().to_string();
        (f, SkillInputFile { name: "doc".into(), path, sha256: "deadbeef".into() })
    }

    #[test]
    fn disabled_strategy_never_produces_a_key() {
        let (_f, file) = file_with(b"hello");
        let key = compute_key(IdempotencyStrategy::Disabled, &[file], &serde_json::json!({})).unwrap();
        assert!(key.is_none());
    }

    #[test]
    fn same_content_produces_the_same_key_under_input_hashes() {
        let (_f, file) = file_with(b"hello world");
        let a = compute_key(IdempotencyStrategy::InputHashes, &[file.clone()], &serde_json::json!({"x": 1})).unwrap();
        let b = compute_key(IdempotencyStrategy::InputHashes, &[file], &serde_json::json!({"x": 2})).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn param_change_invalidates_the_key_under_input_hashes_plus_params() {
        let (_f, file) = file_with(b"hello world");
        let a = compute_key(IdempotencyStrategy::InputHashesPlusParams, &[file.clone()], &serde_json::json!({"x": 1}))
            .unwrap();
        let b = compute_key(IdempotencyStrategy::InputHashesPlusParams, &[file], &serde_json::json!({"x": 2}))
            .unwrap();
        assert_ne!(a, b);
    }
}
