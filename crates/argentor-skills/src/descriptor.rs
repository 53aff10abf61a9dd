//! Skill metadata: declared schemas and the idempotency strategy a skill's
//! invocations follow (spec §6 "Skill runtime").

use serde::{Deserialize, Serialize};

/// How a skill's cache key is derived from its invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IdempotencyStrategy {
    /// Every invocation runs fresh; no `skill_runs` cache lookup.
    Disabled,
    /// Cache key is a hash of the input file contents only.
    InputHashes,
    /// Cache key is a hash of the input file contents plus the params.
    InputHashesPlusParams,
}

/// Metadata describing a skill's interface, declared for the registry and
/// surfaced to executor prompts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: serde_json::Value,
    pub output_schema: serde_json::Value,
    pub params_schema: serde_json::Value,
    pub idempotency_strategy: IdempotencyStrategy,
}
