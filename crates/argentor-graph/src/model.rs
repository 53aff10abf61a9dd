//! The data model entities from spec §3: Plan, Task Node, Task Edge,
//! Input Requirement, Evidence, Artifact, Review.

use argentor_core::{
    AndOr, ArtifactFormat, ArtifactId, BlockedReason, EdgeId, EvidenceId, NodeType, Owner, PlanId,
    Priority, RequirementId, RequirementKind, RequirementSource, ReviewId, TaskId, TaskStatus,
    Verdict,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Constraints {
    pub deadline: Option<String>,
    pub priority: Priority,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub plan_id: PlanId,
    pub title: String,
    pub owner: Owner,
    pub root_task_id: TaskId,
    pub created_at: DateTime<Utc>,
    pub constraints: Constraints,
}

/// A node in the task graph (spec §3 "Task Node"). `active_branch`
/// records whether this node still participates in GOAL aggregation
/// after ALTERNATIVE selection and inactive-branch propagation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskNode {
    pub task_id: TaskId,
    pub plan_id: PlanId,
    pub node_type: NodeType,
    pub title: String,
    pub goal_statement: Option<String>,
    pub rationale: Option<String>,
    pub owner: Owner,
    pub priority: i32,
    pub tags: Vec<String>,
    pub status: TaskStatus,
    pub blocked_reason: Option<BlockedReason>,
    pub attempt_count: i32,
    pub confidence: f64,
    pub active_branch: bool,
    pub active_artifact_id: Option<ArtifactId>,
    pub approved_artifact_id: Option<ArtifactId>,
    pub review_target_task_id: Option<TaskId>,
    pub estimated_person_days: Option<f64>,
    pub deliverable_spec: Option<Value>,
    pub acceptance_criteria: Option<String>,
    pub review_output_spec: Option<Value>,
}

impl TaskNode {
    pub fn new(plan_id: PlanId, node_type: NodeType, title: impl Into<String>, owner: Owner) -> Self {
        Self {
            task_id: TaskId::new(),
            plan_id,
            node_type,
            title: title.into(),
            goal_statement: None,
            rationale: None,
            owner,
            priority: 0,
            tags: Vec::new(),
            status: TaskStatus::Pending,
            blocked_reason: None,
            attempt_count: 0,
            confidence: 0.0,
            active_branch: true,
            active_artifact_id: None,
            approved_artifact_id: None,
            review_target_task_id: None,
            estimated_person_days: None,
            deliverable_spec: None,
            acceptance_criteria: None,
            review_output_spec: None,
        }
    }

    /// Asserts the current `status` is legal for this node's `node_type`
    /// (status_rules.py parity, re-exported from argentor-core).
    pub fn validate_status(&self) -> Result<(), String> {
        TaskStatus::validate_for_node_type(self.node_type, self.status)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub and_or: Option<AndOr>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEdge {
    pub edge_id: EdgeId,
    pub plan_id: PlanId,
    pub from_task_id: TaskId,
    pub to_task_id: TaskId,
    pub edge_type: argentor_core::EdgeType,
    pub metadata: EdgeMetadata,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputRequirement {
    pub requirement_id: RequirementId,
    pub task_id: TaskId,
    pub name: String,
    pub kind: RequirementKind,
    pub required: bool,
    pub min_count: i32,
    pub allowed_types: Vec<String>,
    pub source: RequirementSource,
    pub validation: Option<Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Evidence {
    pub evidence_id: EvidenceId,
    pub requirement_id: RequirementId,
    pub path: String,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub artifact_id: ArtifactId,
    pub task_id: TaskId,
    pub name: String,
    pub path: String,
    pub format: ArtifactFormat,
    pub version: i32,
    pub sha256: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Review {
    pub review_id: ReviewId,
    pub check_task_id: TaskId,
    pub review_target_task_id: TaskId,
    pub reviewed_artifact_id: Option<ArtifactId>,
    pub reviewer: Owner,
    pub total_score: i32,
    pub verdict: Verdict,
    pub breakdown: Value,
    pub suggestions: Value,
    pub summary: String,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}
