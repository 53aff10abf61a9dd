//! The `Skill` trait every skill implementation satisfies, whether it's the
//! in-tree reference skill or one registered by an embedder.

use crate::descriptor::SkillDescriptor;
use crate::error::SkillResult;
use argentor_core::{ArtifactFormat, PlanId, TaskId};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single input file handed to a skill, bound to the `input_requirements`
/// row it satisfies.
#[derive(Debug, Clone)]
pub struct SkillInputFile {
    pub name: String,
    pub path: String,
    /// Content hash of the evidence row this file was selected from, kept
    /// alongside the path so a cache hit can be traced back to the exact
    /// input version without re-reading the file.
    pub sha256: String,
}

/// Everything a skill needs for one invocation.
#[derive(Debug, Clone)]
pub struct SkillInput {
    pub task_id: TaskId,
    pub plan_id: PlanId,
    pub files: Vec<SkillInputFile>,
    pub params: Value,
}

/// An artifact a skill produced, ready to be persisted by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SkillArtifact {
    pub name: String,
    pub path: String,
    pub sha256: String,
    pub format: ArtifactFormat,
}

/// The result of a successful skill invocation.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SkillOutcome {
    pub artifacts: Vec<SkillArtifact>,
}

/// Trait every skill implementation satisfies.
#[async_trait]
pub trait Skill: Send + Sync {
    fn descriptor(&self) -> &SkillDescriptor;

    /// Runs the skill against `input`. Callers are responsible for timeout
    /// enforcement and the per-task `WAITING_SKILL` retry counter — the
    /// trait itself returns as soon as the work is done or has failed.
    async fn execute(&self, input: SkillInput) -> SkillResult<SkillOutcome>;
}
