//! Shared enums from the data model (spec §3) used across every crate in
//! the workspace: storage, graph, contracts, and orchestrator all need the
//! same closed vocabulary rather than redefining it at each boundary.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Who owns execution of a task node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Owner {
    /// The agent that produces artifacts.
    Executor,
    /// The agent that reviews artifacts against a CHECK.
    Reviewer,
    /// An optional secondary reviewer role.
    SecondaryReviewer,
}

/// The three node kinds in the task graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NodeType {
    /// An aggregate node that completes when its DECOMPOSE children do.
    Goal,
    /// A node executed by the executor role, producing candidate artifacts.
    Action,
    /// A node executed by a reviewer role, gating an ACTION's artifact.
    Check,
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            NodeType::Goal => "GOAL",
            NodeType::Action => "ACTION",
            NodeType::Check => "CHECK",
        };
        write!(f, "{s}")
    }
}

impl FromStr for NodeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "GOAL" => Ok(NodeType::Goal),
            "ACTION" => Ok(NodeType::Action),
            "CHECK" => Ok(NodeType::Check),
            other => Err(format!("unknown node_type: {other}")),
        }
    }
}

/// Task node status (spec §3 status table).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskStatus {
    Pending,
    Ready,
    InProgress,
    Blocked,
    ReadyToCheck,
    ToBeModify,
    Done,
    Failed,
    Abandoned,
}

impl TaskStatus {
    /// Statuses allowed for a given node type (status_rules.py parity).
    pub fn allowed_for(node_type: NodeType) -> &'static [TaskStatus] {
        use TaskStatus::*;
        match node_type {
            // GOAL is an aggregate node; it should never require READY_TO_CHECK.
            NodeType::Goal => &[Pending, Ready, InProgress, Blocked, Done, Failed, Abandoned],
            NodeType::Action => &[
                Pending,
                Ready,
                InProgress,
                Blocked,
                ReadyToCheck,
                ToBeModify,
                Done,
                Failed,
                Abandoned,
            ],
            // CHECK is a reviewer-executed node; it must not use READY_TO_CHECK.
            NodeType::Check => &[Pending, Ready, InProgress, Blocked, Done, Failed, Abandoned],
        }
    }

    /// Validates that `status` is a legal status for `node_type`.
    pub fn validate_for_node_type(node_type: NodeType, status: TaskStatus) -> Result<(), String> {
        if Self::allowed_for(node_type).contains(&status) {
            Ok(())
        } else {
            Err(format!("status {status:?} is not allowed for node_type {node_type:?}"))
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Ready => "READY",
            TaskStatus::InProgress => "IN_PROGRESS",
            TaskStatus::Blocked => "BLOCKED",
            TaskStatus::ReadyToCheck => "READY_TO_CHECK",
            TaskStatus::ToBeModify => "TO_BE_MODIFY",
            TaskStatus::Done => "DONE",
            TaskStatus::Failed => "FAILED",
            TaskStatus::Abandoned => "ABANDONED",
        };
        write!(f, "{s}")
    }
}

impl FromStr for TaskStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use TaskStatus::*;
        Ok(match s {
            "PENDING" => Pending,
            "READY" => Ready,
            "IN_PROGRESS" => InProgress,
            "BLOCKED" => Blocked,
            "READY_TO_CHECK" => ReadyToCheck,
            "TO_BE_MODIFY" => ToBeModify,
            "DONE" => Done,
            "FAILED" => Failed,
            "ABANDONED" => Abandoned,
            other => return Err(format!("unknown status: {other}")),
        })
    }
}

/// Why a task is BLOCKED.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BlockedReason {
    WaitingInput,
    WaitingExternal,
    WaitingSkill,
}

impl fmt::Display for BlockedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BlockedReason::WaitingInput => "WAITING_INPUT",
            BlockedReason::WaitingExternal => "WAITING_EXTERNAL",
            BlockedReason::WaitingSkill => "WAITING_SKILL",
        };
        write!(f, "{s}")
    }
}

/// Task edge kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EdgeType {
    Decompose,
    DependsOn,
    Alternative,
}

impl fmt::Display for EdgeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EdgeType::Decompose => "DECOMPOSE",
            EdgeType::DependsOn => "DEPENDS_ON",
            EdgeType::Alternative => "ALTERNATIVE",
        };
        write!(f, "{s}")
    }
}

impl FromStr for EdgeType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "DECOMPOSE" => Ok(EdgeType::Decompose),
            "DEPENDS_ON" => Ok(EdgeType::DependsOn),
            "ALTERNATIVE" => Ok(EdgeType::Alternative),
            other => Err(format!("unknown edge_type: {other}")),
        }
    }
}

/// AND/OR aggregation mode for DECOMPOSE children of a GOAL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AndOr {
    And,
    Or,
}

impl Default for AndOr {
    fn default() -> Self {
        AndOr::And
    }
}

/// Input requirement kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequirementKind {
    File,
    Confirmation,
    SkillOutput,
}

/// Who is expected to supply a requirement's evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RequirementSource {
    User,
    Agent,
    Any,
}

/// Plan priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Priority {
    Low,
    Med,
    High,
}

/// Artifact file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactFormat {
    Md,
    Txt,
    Json,
    Html,
    Css,
    Js,
}

impl FromStr for ArtifactFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "md" => Ok(ArtifactFormat::Md),
            "txt" => Ok(ArtifactFormat::Txt),
            "json" => Ok(ArtifactFormat::Json),
            "html" => Ok(ArtifactFormat::Html),
            "css" => Ok(ArtifactFormat::Css),
            "js" => Ok(ArtifactFormat::Js),
            other => Err(format!("artifact.format must be one of md|txt|json|html|css|js, got {other}")),
        }
    }
}

/// Reviewer verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Verdict {
    Approved,
    Rejected,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_type_round_trips_through_display_and_parse() {
        for nt in [NodeType::Goal, NodeType::Action, NodeType::Check] {
            let parsed: NodeType = nt.to_string().parse().unwrap();
            assert_eq!(parsed.to_string(), nt.to_string());
        }
    }

    #[test]
    fn goal_disallows_ready_to_check() {
        assert!(TaskStatus::validate_for_node_type(NodeType::Goal, TaskStatus::ReadyToCheck).is_err());
    }

    #[test]
    fn check_disallows_ready_to_check() {
        assert!(TaskStatus::validate_for_node_type(NodeType::Check, TaskStatus::ReadyToCheck).is_err());
    }

    #[test]
    fn action_allows_ready_to_check() {
        assert!(TaskStatus::validate_for_node_type(NodeType::Action, TaskStatus::ReadyToCheck).is_ok());
    }

    #[test]
    fn artifact_format_rejects_unknown_suffix() {
        assert!("pdf".parse::<ArtifactFormat>().is_err());
    }
}
