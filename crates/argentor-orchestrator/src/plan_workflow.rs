//! The plan lifecycle (spec §4.2): generate a plan with the planner,
//! validate/normalize it through the PLAN_GEN contract, have the reviewer
//! score it through PLAN_REVIEW, and on approval persist the whole graph.
//! Grounded on `core/plan_workflow.py`'s `generate_and_review_plan`.
//!
//! Diverges from that original with two nested attempt loops instead of
//! one flat one: PLAN_REVIEW retries against the *same* generated plan
//! until `max_review_attempts_per_plan` is exhausted before a fresh
//! PLAN_GEN call is ever issued. The Python original regenerates the plan
//! from scratch on every kind of failure, including a low-scoring review.

use crate::config::RuntimeConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::errors_runtime::set_status;
use argentor_agent::{call_json, LlmBackend};
use argentor_contracts::{normalize_and_validate, ContractContext, ContractName};
use argentor_core::{
    parse_iso8601, utc_now, utc_now_iso, AndOr, EdgeType, EventId, NodeType, Owner, PlanId,
    RequirementKind, RequirementSource, TaskId, TaskStatus, Verdict,
};
use argentor_graph::{Constraints, EdgeMetadata, InputRequirement, Plan, TaskEdge, TaskNode};
use argentor_storage::{Store, TaskEvent};
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

/// Outcome of a successful [`generate_and_review_plan`] call.
#[derive(Debug, Clone)]
pub struct PlanWorkflowResult {
    pub plan_id: PlanId,
    pub plan_path: PathBuf,
    pub total_score: i32,
    pub review_summary: String,
}

const MAX_NOTE_CHARS: usize = 500;

fn truncate_note(s: &str) -> String {
    if s.chars().count() <= MAX_NOTE_CHARS {
        s.to_string()
    } else {
        let mut out: String = s.chars().take(MAX_NOTE_CHARS.saturating_sub(1)).collect();
        out.push('\u{2026}');
        out
    }
}

fn build_planner_prompt(top_task: &str, constraints: &Constraints) -> String {
    format!(
        "You are planning how to accomplish a task.\n\
         top_task: {top_task}\n\
         constraints: {}\n\n\
         Return a PLAN_GEN contract JSON object with top-level keys plan, \
         nodes, edges, requirements, decomposing the task into GOAL/ACTION/CHECK \
         nodes connected by DECOMPOSE/DEPENDS_ON/ALTERNATIVE edges.",
        serde_json::to_string(constraints).unwrap_or_default()
    )
}

fn build_plan_reviewer_prompt(plan_id: PlanId, normalized_plan: &Value) -> String {
    format!(
        "You are reviewing a generated plan for approval.\n\
         plan_id: {plan_id}\n\n\
         Plan JSON:\n{}\n\n\
         Return a PLAN_REVIEW contract JSON object with schema_version, task_id, \
         review_target=PLAN, total_score (0-100), breakdown, summary, \
         action_required, and suggestions.",
        serde_json::to_string_pretty(normalized_plan).unwrap_or_default()
    )
}

#[derive(Debug, Deserialize)]
struct PlanJsonDoc {
    plan: PlanMetaJson,
    nodes: Vec<NodeJson>,
    edges: Vec<EdgeJson>,
    requirements: Vec<RequirementJson>,
}

#[derive(Debug, Deserialize)]
struct PlanMetaJson {
    plan_id: PlanId,
    title: String,
    owner_agent_id: Owner,
    root_task_id: TaskId,
    created_at: String,
    constraints: Constraints,
}

#[derive(Debug, Deserialize)]
struct NodeJson {
    task_id: TaskId,
    node_type: NodeType,
    title: String,
    #[serde(default)]
    goal_statement: Option<String>,
    #[serde(default)]
    rationale: Option<String>,
    owner_agent_id: Owner,
    priority: i64,
    #[serde(default)]
    tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct EdgeJson {
    edge_id: argentor_core::EdgeId,
    from_task_id: TaskId,
    to_task_id: TaskId,
    edge_type: EdgeType,
    #[serde(default)]
    metadata: EdgeMetadataJson,
}

#[derive(Debug, Default, Deserialize)]
struct EdgeMetadataJson {
    #[serde(default)]
    and_or: Option<AndOr>,
    #[serde(default)]
    group_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RequirementJson {
    requirement_id: argentor_core::RequirementId,
    task_id: TaskId,
    name: String,
    kind: RequirementKind,
    required: i64,
    min_count: i64,
    #[serde(default)]
    allowed_types: Vec<String>,
    source: RequirementSource,
}

/// Deserializes a normalized-and-validated PLAN_GEN payload into this
/// workspace's typed graph records. The contract's `required` field is an
/// integer 0/1 (spec §4.1), not a JSON boolean, hence the `!= 0` bridge.
fn plan_json_to_records(normalized: &Value) -> OrchestratorResult<(Plan, Vec<TaskNode>, Vec<TaskEdge>, Vec<InputRequirement>)> {
    let doc: PlanJsonDoc = serde_json::from_value(normalized.clone())?;

    let plan = Plan {
        plan_id: doc.plan.plan_id,
        title: doc.plan.title,
        owner: doc.plan.owner_agent_id,
        root_task_id: doc.plan.root_task_id,
        created_at: parse_iso8601(&doc.plan.created_at)
            .map_err(|e| OrchestratorError::Config(format!("plan.created_at invalid: {e}")))?,
        constraints: doc.plan.constraints,
    };

    let nodes: Vec<TaskNode> = doc
        .nodes
        .into_iter()
        .map(|n| {
            let mut node = TaskNode::new(plan.plan_id, n.node_type, n.title, n.owner_agent_id);
            node.task_id = n.task_id;
            node.goal_statement = n.goal_statement;
            node.rationale = n.rationale;
            node.priority = n.priority as i32;
            node.tags = n.tags;
            node
        })
        .collect();

    let edges: Vec<TaskEdge> = doc
        .edges
        .into_iter()
        .map(|e| TaskEdge {
            edge_id: e.edge_id,
            plan_id: plan.plan_id,
            from_task_id: e.from_task_id,
            to_task_id: e.to_task_id,
            edge_type: e.edge_type,
            metadata: EdgeMetadata { and_or: e.metadata.and_or, group_id: e.metadata.group_id },
        })
        .collect();

    let requirements: Vec<InputRequirement> = doc
        .requirements
        .into_iter()
        .map(|r| InputRequirement {
            requirement_id: r.requirement_id,
            task_id: r.task_id,
            name: r.name,
            kind: r.kind,
            required: r.required != 0,
            min_count: r.min_count as i32,
            allowed_types: r.allowed_types,
            source: r.source,
            validation: None,
        })
        .collect();

    Ok((plan, nodes, edges, requirements))
}

fn plan_review_idempotency_key(check_task_id: TaskId, plan_id: PlanId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(check_task_id.to_string().as_bytes());
    hasher.update(b"\0plan_review\0");
    hasher.update(plan_id.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

/// Persists `plan`/`nodes`/`edges`/`requirements`, writes the plan JSON to
/// `plan_output_dir`, and if the graph carries a dedicated PLAN-review
/// CHECK (reviewer-owned, tagged `review`+`plan`), marks it DONE and
/// stores the review against it.
fn persist_approved_plan(
    store: &Store,
    plan: Plan,
    nodes: Vec<TaskNode>,
    edges: Vec<TaskEdge>,
    requirements: Vec<InputRequirement>,
    normalized_plan_json: &Value,
    review_json: &Value,
    plan_output_dir: &Path,
) -> OrchestratorResult<PathBuf> {
    let plan_id = plan.plan_id;
    store.insert_plan(&plan)?;
    for node in &nodes {
        store.insert_task_node(node)?;
    }
    for edge in &edges {
        store.insert_task_edge(edge)?;
    }
    for req in &requirements {
        store.insert_requirement(req)?;
    }

    std::fs::create_dir_all(plan_output_dir)?;
    let plan_path = plan_output_dir.join(format!("{plan_id}.json"));
    std::fs::write(&plan_path, serde_json::to_vec_pretty(normalized_plan_json)?)?;

    store.record_event(&TaskEvent {
        event_id: EventId::new(),
        plan_id,
        task_id: None,
        event_type: "PLAN_APPROVED".to_string(),
        payload: json!({"total_score": review_json["total_score"]}),
        created_at: utc_now(),
    })?;

    if let Some(check) = nodes.iter().find(|n| {
        n.node_type == NodeType::Check
            && n.owner == Owner::Reviewer
            && n.tags.iter().any(|t| t == "review")
            && n.tags.iter().any(|t| t == "plan")
    }) {
        let key = plan_review_idempotency_key(check.task_id, plan_id);
        let review = argentor_graph::Review {
            review_id: argentor_core::ReviewId::new(),
            check_task_id: check.task_id,
            review_target_task_id: plan.root_task_id,
            reviewed_artifact_id: None,
            reviewer: Owner::Reviewer,
            total_score: review_json["total_score"].as_i64().unwrap_or(0) as i32,
            verdict: Verdict::Approved,
            breakdown: review_json["breakdown"].clone(),
            suggestions: review_json["suggestions"].clone(),
            summary: review_json["summary"].as_str().unwrap_or("").to_string(),
            idempotency_key: key,
            created_at: utc_now(),
        };
        store.insert_review_if_absent(&review)?;
        set_status(store, plan_id, check.task_id, TaskStatus::Done, None)?;
    }

    Ok(plan_path)
}

/// Runs the full plan lifecycle end to end (spec §4.2): PLAN_GEN, then
/// PLAN_REVIEW retried against the same plan up to
/// `max_review_attempts_per_plan` times before a fresh plan is generated.
/// Only an approved plan (`total_score >= 90 && action_required ==
/// "APPROVE"`) is ever persisted to `store`.
pub async fn generate_and_review_plan(
    store: &Store,
    top_task: &str,
    constraints: Constraints,
    backend: &dyn LlmBackend,
    plan_output_dir: &Path,
) -> OrchestratorResult<PlanWorkflowResult> {
    let cfg = RuntimeConfig::get()?;
    let mut prompt_task = top_task.to_string();
    let mut last_reason = String::from("no attempt completed");

    for plan_attempt in 1..=cfg.max_plan_attempts {
        let plan_prompt = build_planner_prompt(&prompt_task, &constraints);
        let plan_call = call_json(backend, &plan_prompt).await;

        if plan_call.error_code.is_some() || plan_call.parsed_json.is_none() {
            last_reason = format!(
                "plan generation attempt {plan_attempt} failed: {}",
                plan_call.error.as_deref().unwrap_or("no parseable JSON")
            );
            prompt_task = format!("{prompt_task}\n\n{}", truncate_note(&last_reason));
            continue;
        }
        let Some(raw) = plan_call.parsed_json else {
            continue;
        };

        let now_iso = utc_now_iso();
        let ctx = ContractContext { top_task: &prompt_task, now_iso: &now_iso, ..Default::default() };
        let (normalized, contract_err) = normalize_and_validate(ContractName::PlanGen, raw, &ctx);
        if let Some(err) = contract_err {
            last_reason = format!("plan generation attempt {plan_attempt} invalid: {}", err.format_short());
            prompt_task = format!("{prompt_task}\n\n{}", truncate_note(&err.format_short()));
            continue;
        }

        let plan_id = match normalized["plan"]["plan_id"].as_str().and_then(|s| PlanId::parse(s).ok()) {
            Some(id) => id,
            None => {
                last_reason = "normalized plan missing plan.plan_id".to_string();
                continue;
            }
        };

        let mut last_review_reason = String::new();
        for review_attempt in 1..=cfg.max_review_attempts_per_plan {
            let review_prompt = build_plan_reviewer_prompt(plan_id, &normalized);
            let review_call = call_json(backend, &review_prompt).await;

            if review_call.error_code.is_some() || review_call.parsed_json.is_none() {
                last_review_reason = format!(
                    "plan review attempt {review_attempt} failed: {}",
                    review_call.error.as_deref().unwrap_or("no parseable JSON")
                );
                continue;
            }
            let Some(raw_review) = review_call.parsed_json else {
                continue;
            };

            let plan_id_str = plan_id.to_string();
            let review_ctx = ContractContext { task_id: &plan_id_str, ..Default::default() };
            let (review_json, review_err) = normalize_and_validate(ContractName::PlanReview, raw_review, &review_ctx);
            if let Some(err) = review_err {
                last_review_reason = format!("plan review attempt {review_attempt} invalid: {}", err.format_short());
                continue;
            }

            let total_score = review_json["total_score"].as_i64().unwrap_or(0) as i32;
            let action_required = review_json["action_required"].as_str().unwrap_or("MODIFY");
            let summary = review_json["summary"].as_str().unwrap_or("").to_string();

            if total_score >= 90 && action_required == "APPROVE" {
                let (plan, nodes, edges, requirements) = plan_json_to_records(&normalized)?;
                let plan_path = persist_approved_plan(
                    store,
                    plan,
                    nodes,
                    edges,
                    requirements,
                    &normalized,
                    &review_json,
                    plan_output_dir,
                )?;
                return Ok(PlanWorkflowResult { plan_id, plan_path, total_score, review_summary: summary });
            }

            last_review_reason = format!(
                "plan review attempt {review_attempt} scored {total_score} ({action_required}): {summary}"
            );
        }

        last_reason = last_review_reason;
        prompt_task = format!("{prompt_task}\n\nReviewer feedback (must address):\n{}", truncate_note(&last_reason));
    }

    Err(OrchestratorError::PlanWorkflow {
        top_task: top_task.to_string(),
        attempts: cfg.max_plan_attempts,
        reason: last_reason,
    })
}
