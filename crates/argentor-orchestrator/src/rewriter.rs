//! Structural-only plan repair (spec §4.7). `propose_rewrite` is a pure
//! dry-run: it reads doctor findings and feasibility over the current
//! graph and produces a patch plan with nothing written. `apply_rewrite`
//! snapshots the graph to disk, then mutates it. `converge_v2_plan` loops
//! doctor -> feasibility -> apply until both pass or no patch applies.
//! Grounded on `core/rewriter_v2.py` and `core/v2_converge.py`.

use crate::config::RuntimeConfig;
use crate::doctor::run_doctor;
use crate::error::OrchestratorResult;
use crate::feasibility::{compute_depths, feasibility_check};
use argentor_core::{utc_now_iso, AndOr, EdgeId, EdgeType, NodeType, Owner, PlanId, TaskId, TaskStatus};
use argentor_graph::{EdgeMetadata, TaskEdge, TaskNode};
use argentor_storage::Store;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct Issue {
    pub code: String,
    pub message: String,
    pub task_title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MissingFieldTarget {
    pub task_id: TaskId,
    pub title: String,
    pub missing: Vec<&'static str>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CheckBindingTarget {
    pub task_id: TaskId,
    pub title: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SplitTarget {
    pub task_id: TaskId,
    pub title: String,
    pub estimated_person_days: f64,
    pub parts: u32,
    pub apply_allowed: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Patch {
    AddMissingV2Fields(Vec<MissingFieldTarget>),
    AddCheckBinding(Vec<CheckBindingTarget>),
    SplitOversizedAction(Vec<SplitTarget>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct PatchPlan {
    pub plan_id: PlanId,
    pub plan_title: String,
    pub issues: Vec<Issue>,
    pub patches: Vec<Patch>,
    pub risk_level: &'static str,
    pub risk_notes: Vec<String>,
    pub threshold_person_days: f64,
    pub max_depth: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RewriteResult {
    pub patch_plan: PatchPlan,
    pub snapshot_path: Option<PathBuf>,
}

fn default_deliverable_spec(title: &str) -> Value {
    json!({
        "format": "md",
        "filename": "deliverable.md",
        "single_file": true,
        "bundle_mode": "MANIFEST",
        "description": format!("Deliverable for: {title}"),
    })
}

fn default_acceptance_criteria() -> String {
    "Meets the task requirements and is readable.".to_string()
}

/// Builds the dry-run patch plan. Writes nothing; safe to call repeatedly.
pub fn propose_rewrite(store: &Store, plan_id: PlanId) -> OrchestratorResult<PatchPlan> {
    let cfg = RuntimeConfig::get()?;
    let plan = store.get_plan(plan_id)?;
    let nodes = store.list_task_nodes(plan_id)?;
    let edges = store.list_task_edges(plan_id)?;

    let plan_id_str = plan_id.to_string();
    let issues: Vec<Issue> = run_doctor(store, Some(&plan_id_str))
        .into_iter()
        .map(|f| Issue { code: f.code.to_string(), message: f.message, task_title: String::new() })
        .collect();

    let actions: Vec<&TaskNode> = nodes.iter().filter(|n| n.active_branch && n.node_type == NodeType::Action).collect();
    let checks: Vec<&TaskNode> = nodes.iter().filter(|n| n.active_branch && n.node_type == NodeType::Check).collect();

    let mut check_targets: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    for c in &checks {
        if let Some(target) = c.review_target_task_id {
            check_targets.entry(target).or_default().push(c.task_id);
        }
    }

    let depths = compute_depths(plan.root_task_id, &edges);

    let mut patches = Vec::new();
    let mut risk_level = "LOW";
    let mut risk_notes = Vec::new();

    let mut missing_field_targets = Vec::new();
    for a in &actions {
        let mut missing = Vec::new();
        if a.estimated_person_days.is_none() {
            missing.push("estimated_person_days");
        }
        if a.deliverable_spec.is_none() {
            missing.push("deliverable_spec");
        }
        if a.acceptance_criteria.as_deref().unwrap_or("").trim().is_empty() {
            missing.push("acceptance_criteria");
        }
        if !missing.is_empty() {
            missing_field_targets.push(MissingFieldTarget { task_id: a.task_id, title: a.title.clone(), missing });
        }
    }
    if !missing_field_targets.is_empty() {
        patches.push(Patch::AddMissingV2Fields(missing_field_targets));
    }

    let mut missing_check_targets = Vec::new();
    for a in &actions {
        if !check_targets.contains_key(&a.task_id) {
            missing_check_targets.push(CheckBindingTarget { task_id: a.task_id, title: a.title.clone() });
        }
    }
    if !missing_check_targets.is_empty() {
        patches.push(Patch::AddCheckBinding(missing_check_targets));
    }

    for (action_id, check_ids) in &check_targets {
        if check_ids.len() > 1 {
            risk_level = "MED";
            let title = actions.iter().find(|a| a.task_id == *action_id).map(|a| a.title.clone()).unwrap_or_default();
            risk_notes.push(format!(
                "Multiple CHECK nodes bound to one ACTION (will not auto-delete): action_title={title} count={}",
                check_ids.len()
            ));
        }
    }

    let mut split_targets = Vec::new();
    for a in &actions {
        let Some(epd) = a.estimated_person_days else { continue };
        if epd <= cfg.oversized_action_threshold_days {
            continue;
        }
        let depth = depths.get(&a.task_id).copied().unwrap_or(0);
        let apply_allowed = depth < cfg.split_depth_budget;
        if !apply_allowed {
            risk_level = "MED";
            risk_notes.push(format!(
                "Split suggested but depth limit reached (will not apply): action_title={} depth={depth} max_depth={}",
                a.title, cfg.split_depth_budget
            ));
        }
        let parts = ((epd / cfg.oversized_action_threshold_days).ceil() as u32).max(2);
        split_targets.push(SplitTarget {
            task_id: a.task_id,
            title: a.title.clone(),
            estimated_person_days: epd,
            parts,
            apply_allowed,
        });
    }
    if !split_targets.is_empty() {
        patches.push(Patch::SplitOversizedAction(split_targets));
    }

    Ok(PatchPlan {
        plan_id,
        plan_title: plan.title,
        issues,
        patches,
        risk_level,
        risk_notes,
        threshold_person_days: cfg.oversized_action_threshold_days,
        max_depth: cfg.split_depth_budget,
    })
}

fn snapshot_plan(store: &Store, plan_id: PlanId, snapshot_dir: &Path) -> OrchestratorResult<PathBuf> {
    std::fs::create_dir_all(snapshot_dir)?;
    let plan = store.get_plan(plan_id)?;
    let nodes = store.list_task_nodes(plan_id)?;
    let edges = store.list_task_edges(plan_id)?;
    let data = json!({
        "snapshot_at": utc_now_iso(),
        "plan_id": plan_id.to_string(),
        "plan": plan,
        "task_nodes": nodes,
        "task_edges": edges,
    });
    let ts = utc_now_iso().replace([':', '-'], "");
    let path = snapshot_dir.join(format!("snapshot_{ts}.json"));
    std::fs::write(&path, serde_json::to_vec_pretty(&data)?)?;
    Ok(path)
}

fn apply_add_missing_fields(store: &Store, targets: &[MissingFieldTarget], threshold: f64) -> OrchestratorResult<()> {
    for t in targets {
        let mut node = store.get_task_node(t.task_id)?;
        if node.estimated_person_days.is_none() {
            node.estimated_person_days = Some((threshold * 0.5).max(1.0));
        }
        if node.deliverable_spec.is_none() {
            node.deliverable_spec = Some(default_deliverable_spec(&node.title));
        }
        if node.acceptance_criteria.as_deref().unwrap_or("").trim().is_empty() {
            node.acceptance_criteria = Some(default_acceptance_criteria());
        }
        store.update_task_node(&node)?;
    }
    Ok(())
}

fn apply_add_check_binding(store: &Store, plan_id: PlanId, targets: &[CheckBindingTarget]) -> OrchestratorResult<()> {
    for t in targets {
        let existing = store.list_task_nodes(plan_id)?.into_iter().any(|n| {
            n.active_branch && n.node_type == NodeType::Check && n.review_target_task_id == Some(t.task_id)
        });
        if existing {
            continue;
        }
        let mut check = TaskNode::new(plan_id, NodeType::Check, format!("Review: {}", t.title), Owner::Reviewer);
        check.status = TaskStatus::Ready;
        check.review_target_task_id = Some(t.task_id);
        store.insert_task_node(&check)?;
    }
    Ok(())
}

fn apply_split_oversized_action(store: &Store, plan_id: PlanId, targets: &[SplitTarget]) -> OrchestratorResult<()> {
    for t in targets {
        if !t.apply_allowed {
            continue;
        }
        let mut parent = store.get_task_node(t.task_id)?;

        for node in store.list_task_nodes(plan_id)? {
            if node.node_type == NodeType::Check && node.review_target_task_id == Some(t.task_id) {
                let mut check = node;
                check.status = TaskStatus::Abandoned;
                check.blocked_reason = None;
                check.review_target_task_id = None;
                store.update_task_node(&check)?;
            }
        }

        let remaining_total = parent.estimated_person_days.unwrap_or(t.estimated_person_days);
        parent.node_type = NodeType::Goal;
        parent.status = TaskStatus::Pending;
        parent.blocked_reason = None;
        store.update_task_node(&parent)?;

        let mut remaining = remaining_total;
        for i in 0..t.parts {
            let child_epd = if i < t.parts - 1 { remaining_total / t.parts as f64 } else { remaining.max(0.1) };
            remaining = (remaining - child_epd).max(0.0);

            let child_title = format!("{} (Part {}/{})", parent.title, i + 1, t.parts);
            let mut child = TaskNode::new(plan_id, NodeType::Action, child_title.clone(), parent.owner);
            child.priority = parent.priority;
            child.estimated_person_days = Some(child_epd);
            child.deliverable_spec = parent.deliverable_spec.clone().or_else(|| Some(default_deliverable_spec(&child_title)));
            child.acceptance_criteria = parent
                .acceptance_criteria
                .clone()
                .filter(|s| !s.trim().is_empty())
                .or_else(|| Some(default_acceptance_criteria()));
            store.insert_task_node(&child)?;

            let mut child_check = TaskNode::new(plan_id, NodeType::Check, format!("Review: {child_title}"), Owner::Reviewer);
            child_check.status = TaskStatus::Ready;
            child_check.review_target_task_id = Some(child.task_id);
            store.insert_task_node(&child_check)?;

            store.insert_task_edge(&TaskEdge {
                edge_id: EdgeId::new(),
                plan_id,
                from_task_id: parent.task_id,
                to_task_id: child.task_id,
                edge_type: EdgeType::Decompose,
                metadata: EdgeMetadata { and_or: Some(AndOr::And), group_id: None },
            })?;
        }
    }
    Ok(())
}

/// Applies `patch_plan` to the store. When `dry_run` is true (the
/// default posture), nothing is written and `snapshot_path` is `None`.
pub fn apply_rewrite(store: &Store, patch_plan: &PatchPlan, snapshot_dir: &Path, dry_run: bool) -> OrchestratorResult<RewriteResult> {
    if dry_run {
        return Ok(RewriteResult { patch_plan: patch_plan.clone(), snapshot_path: None });
    }
    let snapshot_path = snapshot_plan(store, patch_plan.plan_id, snapshot_dir)?;
    for patch in &patch_plan.patches {
        match patch {
            Patch::AddMissingV2Fields(targets) => apply_add_missing_fields(store, targets, patch_plan.threshold_person_days)?,
            Patch::AddCheckBinding(targets) => apply_add_check_binding(store, patch_plan.plan_id, targets)?,
            Patch::SplitOversizedAction(targets) => apply_split_oversized_action(store, patch_plan.plan_id, targets)?,
        }
    }
    Ok(RewriteResult { patch_plan: patch_plan.clone(), snapshot_path: Some(snapshot_path) })
}

#[derive(Debug, Clone, PartialEq)]
pub struct RequiredDoc {
    pub name: &'static str,
    pub description: &'static str,
    pub accepted_types: &'static [&'static str],
    pub suggested_path: &'static str,
}

const EFFORT_ESTIMATES_DOC: RequiredDoc = RequiredDoc {
    name: "effort_estimates",
    description: "Provide per-feature effort estimates or constraints to guide decomposition (person-days).",
    accepted_types: &["md", "txt", "json"],
    suggested_path: "inputs/plan/effort_estimates.md",
};

const DECOMPOSITION_GUIDANCE_DOC: RequiredDoc = RequiredDoc {
    name: "decomposition_guidance",
    description: "Provide decomposition rules or target module breakdown (what sub-systems, acceptance).",
    accepted_types: &["md", "txt"],
    suggested_path: "inputs/plan/decomposition_guidance.md",
};

#[derive(Debug, Clone, PartialEq)]
pub enum ConvergeStatus {
    Ok,
    RequestExternalInput,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvergeResult {
    pub status: ConvergeStatus,
    pub rounds: u32,
    pub required_docs: Vec<RequiredDoc>,
    pub required_docs_path: Option<PathBuf>,
}

fn write_required_docs(required_docs_dir: &Path, plan_id: PlanId, docs: &[RequiredDoc]) -> OrchestratorResult<PathBuf> {
    std::fs::create_dir_all(required_docs_dir)?;
    let path = required_docs_dir.join(format!("plan_{plan_id}.md"));
    let mut lines = vec![format!("# Required Docs for plan {plan_id}"), String::new()];
    for doc in docs {
        lines.push(format!("- {}: {}", doc.name, doc.description));
        lines.push(format!("  - accepted_types: {:?}", doc.accepted_types));
        lines.push(format!("  - suggested_path: {}", doc.suggested_path));
    }
    lines.push(String::new());
    std::fs::write(&path, lines.join("\n"))?;
    Ok(path)
}

/// Deterministic doctor -> feasibility -> rewrite loop (spec §4.7). Never
/// calls an LLM; purely structural. Bails to `REQUEST_EXTERNAL_INPUT` when
/// no patch applies or the round budget is exhausted.
pub fn converge_v2_plan(
    store: &Store,
    plan_id: PlanId,
    max_rounds: u32,
    required_docs_dir: &Path,
    snapshot_dir: &Path,
) -> OrchestratorResult<ConvergeResult> {
    let cfg = RuntimeConfig::get()?;
    let plan = store.get_plan(plan_id)?;
    let mut last_required: Option<Vec<RequiredDoc>> = None;

    for round_idx in 1..=max_rounds {
        let plan_id_str = plan_id.to_string();
        let doctor_ok = run_doctor(store, Some(&plan_id_str)).is_empty();
        let nodes = store.list_task_nodes(plan_id)?;
        let edges = store.list_task_edges(plan_id)?;
        let nodes_map: HashMap<_, _> = nodes.into_iter().map(|n| (n.task_id, n)).collect();
        let feas = feasibility_check(plan.root_task_id, &nodes_map, &edges, cfg.oversized_action_threshold_days, cfg.split_depth_budget);

        if doctor_ok && feas.ok {
            return Ok(ConvergeResult { status: ConvergeStatus::Ok, rounds: round_idx, required_docs: Vec::new(), required_docs_path: None });
        }

        let patch_plan = propose_rewrite(store, plan_id)?;
        let blocked_by_depth = patch_plan.patches.iter().any(|p| match p {
            Patch::SplitOversizedAction(targets) => targets.iter().any(|t| !t.apply_allowed),
            _ => false,
        });

        if patch_plan.patches.is_empty() || blocked_by_depth {
            let docs = vec![EFFORT_ESTIMATES_DOC, DECOMPOSITION_GUIDANCE_DOC];
            last_required = Some(docs.clone());
            let path = write_required_docs(required_docs_dir, plan_id, &docs)?;
            crate::errors_runtime::record_error(
                store,
                plan_id,
                None,
                argentor_core::ErrorCode::InputMissing,
                "Need additional decomposition guidance to converge.",
                json!({"required_docs_path": path.display().to_string()}),
            )?;
            return Ok(ConvergeResult {
                status: ConvergeStatus::RequestExternalInput,
                rounds: round_idx,
                required_docs: docs,
                required_docs_path: Some(path),
            });
        }

        apply_rewrite(store, &patch_plan, snapshot_dir, false)?;
    }

    let docs = last_required.unwrap_or_else(|| vec![DECOMPOSITION_GUIDANCE_DOC]);
    let path = write_required_docs(required_docs_dir, plan_id, &docs)?;
    crate::errors_runtime::record_error(
        store,
        plan_id,
        None,
        argentor_core::ErrorCode::InputMissing,
        "Convergence rounds exceeded.",
        json!({"required_docs_path": path.display().to_string()}),
    )?;
    Ok(ConvergeResult { status: ConvergeStatus::RequestExternalInput, rounds: max_rounds, required_docs: docs, required_docs_path: Some(path) })
}

/// Renders a patch plan as markdown for the `rewrite` CLI command.
pub fn render_patch_plan_md(patch_plan: &PatchPlan) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# Rewrite Proposal: {}", patch_plan.plan_title));
    lines.push(String::new());
    lines.push(format!("- plan_id: {}", patch_plan.plan_id));
    lines.push(format!("- patch_count: {}", patch_plan.patches.len()));
    lines.push(format!("- risk: {}", patch_plan.risk_level));
    for note in patch_plan.risk_notes.iter().take(10) {
        lines.push(format!("  - {note}"));
    }
    lines.push(String::new());

    lines.push("## Issues".to_string());
    if patch_plan.issues.is_empty() {
        lines.push("- (none)".to_string());
    } else {
        for issue in patch_plan.issues.iter().take(20) {
            lines.push(format!("- {}: {}", issue.code, issue.message));
        }
    }
    lines.push(String::new());

    lines.push("## Patches".to_string());
    if patch_plan.patches.is_empty() {
        lines.push("- (none)".to_string());
    }
    for patch in &patch_plan.patches {
        match patch {
            Patch::AddMissingV2Fields(targets) => {
                lines.push(format!("- ADD_MISSING_V2_FIELDS: {} target(s)", targets.len()));
            }
            Patch::AddCheckBinding(targets) => {
                lines.push(format!("- ADD_CHECK_BINDING: {} target(s)", targets.len()));
            }
            Patch::SplitOversizedAction(targets) => {
                lines.push(format!("- SPLIT_OVERSIZED_ACTION: {} target(s)", targets.len()));
            }
        }
    }
    lines.push(String::new());
    lines.join("\n")
}
