//! Human- and machine-readable plan status reports (spec §6 `report`,
//! the blocked-summary file from spec §7). `generate_plan_report`/
//! `render_plan_report_md` are grounded on `core/reporting.py`, adapted to
//! this workspace's schema (`owner` takes the place of the original's
//! free-text `owner_agent_id` column). `is_plan_blocked_waiting_user` and
//! `write_blocked_summary` are grounded on `run.py`'s functions of the same
//! name, which write the `required_docs/blocked_summary.md` sidecar the
//! main loop's convergence check materializes when a plan goes quiet
//! without finishing.

use crate::error::OrchestratorResult;
use argentor_core::{utc_now_iso, BlockedReason, NodeType, Owner, PlanId, TaskStatus};
use argentor_graph::TaskNode;
use argentor_storage::Store;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct NodeItem {
    pub task_title: String,
    pub node_type: NodeType,
    pub status: TaskStatus,
    pub blocked_reason: Option<String>,
    pub attempt_count: i32,
    pub owner: Owner,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ErrorItem {
    pub task_title: String,
    pub created_at: String,
    pub error_code: String,
    pub message: String,
    pub hint: String,
    /// This task's total occurrence count for `error_code` (spec §2
    /// "Error counters"), not just whether this particular event fired.
    pub count: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReviewTraceItem {
    pub action_title: String,
    pub active_artifact_id: String,
    pub approved_artifact_id: String,
    pub latest_verdict: Option<String>,
    pub latest_reviewed_artifact_id: Option<String>,
    pub latest_created_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct NextStep {
    pub cmd: String,
    pub why: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanSummary {
    pub generated_at: String,
    pub is_done: bool,
    pub is_blocked_waiting_input: bool,
    pub runnable_counts: HashMap<String, HashMap<String, i64>>,
    pub in_progress: Vec<NodeItem>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanReport {
    pub plan_id: String,
    pub plan_title: String,
    pub summary: PlanSummary,
    pub blocked: Vec<NodeItem>,
    pub failed: Vec<NodeItem>,
    pub ready: Vec<NodeItem>,
    pub waiting_review: Vec<NodeItem>,
    pub recent_errors: Vec<ErrorItem>,
    pub review_trace: Vec<ReviewTraceItem>,
    pub next_steps: Vec<NextStep>,
}

fn node_item(node: &argentor_graph::TaskNode, reason: String) -> NodeItem {
    NodeItem {
        task_title: node.title.clone(),
        node_type: node.node_type,
        status: node.status,
        blocked_reason: node.blocked_reason.map(|r| r.to_string()),
        attempt_count: node.attempt_count,
        owner: node.owner,
        reason,
    }
}

fn latest_error_payload(store: &Store, plan_id: PlanId, task_id: argentor_core::TaskId) -> OrchestratorResult<Option<serde_json::Value>> {
    let events = store.list_events(plan_id)?;
    let latest = events
        .iter()
        .filter(|e| e.task_id == Some(task_id) && e.event_type == "ERROR")
        .max_by_key(|e| e.created_at);
    Ok(latest.map(|e| e.payload.clone()))
}

fn hint_from_error_payload(payload: &serde_json::Value) -> String {
    let ctx = payload.get("context").and_then(|c| c.as_object());
    if let Some(ctx) = ctx {
        if let Some(hint) = ctx.get("hint").and_then(|v| v.as_str()) {
            if !hint.trim().is_empty() {
                return hint.trim().to_string();
            }
        }
        for key in ["validator_error", "missing_path"] {
            if let Some(v) = ctx.get(key).and_then(|v| v.as_str()) {
                if !v.trim().is_empty() {
                    return v.trim().to_string();
                }
            }
        }
    }
    String::new()
}

/// Builds a full status report for `plan_id`. `v2_mode` gates the
/// review-gate-v2-only sections (waiting-review nodes, review trace).
pub fn generate_plan_report(store: &Store, plan_id: PlanId, v2_mode: bool) -> OrchestratorResult<PlanReport> {
    let plan = store.get_plan(plan_id)?;
    let nodes = store.list_task_nodes(plan_id)?;

    let root = nodes.iter().find(|n| n.task_id == plan.root_task_id);
    let is_done = root.map(|n| n.status == TaskStatus::Done).unwrap_or(false);
    let is_blocked_waiting_input = nodes
        .iter()
        .any(|n| n.active_branch && n.status == TaskStatus::Blocked && n.blocked_reason == Some(argentor_core::BlockedReason::WaitingInput));

    let mut runnable_counts: HashMap<String, HashMap<String, i64>> = HashMap::new();
    for n in nodes.iter().filter(|n| n.active_branch) {
        *runnable_counts.entry(n.node_type.to_string()).or_default().entry(n.status.to_string()).or_insert(0) += 1;
    }

    let in_progress: Vec<NodeItem> = nodes
        .iter()
        .filter(|n| n.active_branch && n.status == TaskStatus::InProgress)
        .map(|n| node_item(n, String::new()))
        .collect();

    let mut blocked = Vec::new();
    let mut failed = Vec::new();
    let mut ready = Vec::new();
    for n in nodes.iter().filter(|n| n.active_branch && matches!(n.status, TaskStatus::Blocked | TaskStatus::Failed | TaskStatus::Ready)) {
        match n.status {
            TaskStatus::Blocked => blocked.push(node_item(n, String::new())),
            TaskStatus::Failed => failed.push(node_item(n, String::new())),
            _ => ready.push(node_item(n, String::new())),
        }
    }

    let mut waiting_review = Vec::new();
    if v2_mode {
        for n in nodes.iter().filter(|n| n.active_branch) {
            let is_waiting = (n.node_type == NodeType::Action && n.status == TaskStatus::ReadyToCheck)
                || (n.node_type == NodeType::Check
                    && matches!(n.status, TaskStatus::Ready | TaskStatus::InProgress)
                    && n.review_target_task_id.is_some());
            if !is_waiting {
                continue;
            }
            let payload = latest_error_payload(store, plan_id, n.task_id)?;
            let reason = match payload.as_ref().and_then(|p| p.get("error_code")).and_then(|v| v.as_str()) {
                Some("STALE_REVIEW") => "stale_review: a newer candidate artifact needs review".to_string(),
                _ => String::new(),
            };
            waiting_review.push(node_item(n, reason));
        }
    }

    let mut events = store.list_events(plan_id)?;
    events.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    let recent_errors: Vec<ErrorItem> = events
        .iter()
        .filter(|e| e.event_type == "ERROR")
        .take(20)
        .map(|e| {
            let task_title = e
                .task_id
                .and_then(|tid| nodes.iter().find(|n| n.task_id == tid))
                .map(|n| n.title.clone())
                .unwrap_or_default();
            let error_code = e.payload.get("error_code").and_then(|v| v.as_str()).unwrap_or("").to_string();
            let count = e
                .task_id
                .and_then(|tid| store.get_error_counter(tid, &error_code).ok().flatten())
                .unwrap_or(1);
            ErrorItem {
                task_title,
                created_at: e.created_at.to_rfc3339(),
                error_code,
                message: e.payload.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string(),
                hint: hint_from_error_payload(&e.payload),
                count,
            }
        })
        .collect();

    let mut review_trace = Vec::new();
    if v2_mode {
        for action in nodes.iter().filter(|n| n.active_branch && n.node_type == NodeType::Action) {
            let reviews = store.list_reviews_for_target(action.task_id)?;
            let latest = reviews.iter().max_by_key(|r| r.created_at);
            review_trace.push(ReviewTraceItem {
                action_title: action.title.clone(),
                active_artifact_id: action.active_artifact_id.map(|a| a.to_string()).unwrap_or_default(),
                approved_artifact_id: action.approved_artifact_id.map(|a| a.to_string()).unwrap_or_default(),
                latest_verdict: latest.map(|r| format!("{:?}", r.verdict).to_ascii_uppercase()),
                latest_reviewed_artifact_id: latest.and_then(|r| r.reviewed_artifact_id).map(|a| a.to_string()),
                latest_created_at: latest.map(|r| r.created_at.to_rfc3339()),
            });
        }
    }

    let mut next_steps = vec![NextStep {
        cmd: format!("agentor-cli doctor --plan-id {plan_id}"),
        why: "check graph structural/consistency issues".to_string(),
    }];
    if v2_mode {
        next_steps.push(NextStep {
            cmd: format!("agentor-cli export --plan-id {plan_id}"),
            why: "export the final deliverable (approved artifacts only by default)".to_string(),
        });
    }
    if !waiting_review.is_empty() {
        next_steps.push(NextStep { cmd: "agentor-cli run --max-iterations 20".to_string(), why: "trigger pending CHECK reviews".to_string() });
    }
    if !ready.is_empty() {
        next_steps.push(NextStep { cmd: "agentor-cli run --max-iterations 20".to_string(), why: "advance READY nodes".to_string() });
    }

    Ok(PlanReport {
        plan_id: plan.plan_id.to_string(),
        plan_title: plan.title,
        summary: PlanSummary {
            generated_at: utc_now_iso(),
            is_done,
            is_blocked_waiting_input,
            runnable_counts,
            in_progress,
        },
        blocked,
        failed,
        ready,
        waiting_review,
        recent_errors,
        review_trace,
        next_steps,
    })
}

fn section(lines: &mut Vec<String>, title: &str, items: &[NodeItem]) {
    lines.push(format!("## {title}"));
    if items.is_empty() {
        lines.push("- (none)".to_string());
    } else {
        for it in items.iter().take(20) {
            let mut line = format!(
                "- {} [{}] status={}, owner={:?}, attempts={}",
                it.task_title, it.node_type, it.status, it.owner, it.attempt_count
            );
            if let Some(br) = &it.blocked_reason {
                line.push_str(&format!(", blocked_reason={br}"));
            }
            if !it.reason.is_empty() {
                line.push_str(&format!(" reason={}", it.reason));
            }
            lines.push(line);
        }
    }
    lines.push(String::new());
}

/// Renders `report` as the markdown status document spec §7 names as the
/// blocked-summary file.
pub fn render_plan_report_md(report: &PlanReport) -> String {
    let mut lines = Vec::new();
    lines.push(format!("# Plan Report: {}", report.plan_title));
    lines.push(String::new());
    lines.push(format!("- plan_id: {}", report.plan_id));
    lines.push(format!("- generated_at: {}", report.summary.generated_at));
    lines.push(format!("- is_done: {}", report.summary.is_done));
    lines.push(format!("- blocked_waiting_input: {}", report.summary.is_blocked_waiting_input));
    lines.push(String::new());

    section(&mut lines, "Waiting Review", &report.waiting_review);
    section(&mut lines, "Blocked", &report.blocked);
    section(&mut lines, "Failed", &report.failed);

    lines.push("## Recent Errors".to_string());
    if report.recent_errors.is_empty() {
        lines.push("- (none)".to_string());
    } else {
        for e in report.recent_errors.iter().take(20) {
            lines.push(
                format!("- [{}] {}: {} (x{}) {}", e.created_at, e.task_title, e.error_code, e.count, e.message).trim_end().to_string(),
            );
            if !e.hint.is_empty() {
                lines.push(format!("  - hint: {}", e.hint));
            }
        }
    }
    lines.push(String::new());

    lines.push("## Next Steps".to_string());
    if report.next_steps.is_empty() {
        lines.push("- (none)".to_string());
    } else {
        for s in report.next_steps.iter().take(12) {
            lines.push(format!("- {}", s.cmd));
            if !s.why.is_empty() {
                lines.push(format!("  - why: {}", s.why));
            }
        }
    }
    lines.push(String::new());

    let mut out = lines.join("\n");
    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}

/// True once nothing active is runnable and at least one active node is
/// stuck on the caller: no active-branch node sits in a runnable status
/// (`READY`/`TO_BE_MODIFY`/`READY_TO_CHECK`/`IN_PROGRESS`), and at least
/// one active-branch `BLOCKED` node's `blocked_reason` is `WAITING_INPUT`
/// or `WAITING_EXTERNAL`. Mirrors `run.py`'s `is_plan_blocked_waiting_user`.
pub fn is_plan_blocked_waiting_user(nodes: &[TaskNode]) -> bool {
    let has_runnable = nodes.iter().any(|n| {
        n.active_branch && matches!(n.status, TaskStatus::Ready | TaskStatus::ToBeModify | TaskStatus::ReadyToCheck | TaskStatus::InProgress)
    });
    if has_runnable {
        return false;
    }
    nodes.iter().any(|n| {
        n.active_branch
            && n.status == TaskStatus::Blocked
            && matches!(n.blocked_reason, Some(BlockedReason::WaitingInput) | Some(BlockedReason::WaitingExternal))
    })
}

fn missing_requirements_for(store: &Store, task_id: argentor_core::TaskId) -> OrchestratorResult<Vec<String>> {
    let mut out = Vec::new();
    for req in store.list_requirements(task_id)?.into_iter().filter(|r| r.required) {
        let have = store.list_evidence(req.requirement_id)?.len() as i32;
        if have < req.min_count {
            out.push(format!("{} (need {}, have {})", req.name, req.min_count, have));
        }
        if out.len() >= 20 {
            break;
        }
    }
    Ok(out)
}

/// Writes the blocked-summary sidecar spec §7 names: one entry per
/// active-branch `BLOCKED` node (priority descending), with its
/// blocked_reason, attempt count, owner, required-docs path (if one was
/// written for it), unmet input requirements, per-error-code counters, and
/// the most recent `ERROR` event's code/message/time. Grounded on `run.py`'s
/// `write_blocked_summary`; written to
/// `workspace_root/required_docs/blocked_summary.md`, the directory
/// [`crate::executor`]'s per-task required-docs notes already live under.
pub fn write_blocked_summary(store: &Store, plan_id: PlanId, workspace_root: &Path) -> OrchestratorResult<PathBuf> {
    let required_docs_dir = workspace_root.join("required_docs");
    std::fs::create_dir_all(&required_docs_dir)?;
    let path = required_docs_dir.join("blocked_summary.md");

    let plan = store.get_plan(plan_id)?;
    let mut blocked: Vec<_> = store
        .list_task_nodes(plan_id)?
        .into_iter()
        .filter(|n| n.active_branch && n.status == TaskStatus::Blocked)
        .collect();
    blocked.sort_by(|a, b| b.priority.cmp(&a.priority));

    let mut lines = vec![format!("# Blocked Summary ({})", plan.plan_id), format!("- generated_at: {}", utc_now_iso()), String::new()];
    lines.push("- how_to_resume: add files under workspace/inputs/<requirement_name>/".to_string());
    lines.push(String::new());

    for node in &blocked {
        let reason = node.blocked_reason.map(|r| r.to_string()).unwrap_or_default();
        lines.push(format!("## {} [{reason}]", node.title));
        lines.push(format!("- attempt_count: {}", node.attempt_count));
        lines.push(format!("- owner: {:?}", node.owner));

        let docs_path = required_docs_dir.join(format!("{}.md", node.task_id));
        if docs_path.exists() {
            lines.push(format!("- required_docs: {}", docs_path.display()));
        }

        let missing = missing_requirements_for(store, node.task_id)?;
        if !missing.is_empty() {
            lines.push("- missing_requirements:".to_string());
            for m in missing {
                lines.push(format!("  - {m}"));
            }
        }

        let counters = store.list_error_counters(node.task_id)?;
        if !counters.is_empty() {
            let mut sorted = counters;
            sorted.sort_by(|a, b| a.error_code.cmp(&b.error_code));
            lines.push("- error_counters:".to_string());
            for c in sorted {
                lines.push(format!("  - {}: {}", c.error_code, c.count));
            }
        }

        if let Some(payload) = latest_error_payload(store, plan_id, node.task_id)? {
            let code = payload.get("error_code").and_then(|v| v.as_str()).unwrap_or("");
            let mut message = payload.get("message").and_then(|v| v.as_str()).unwrap_or("").to_string();
            message.truncate(200);
            let events = store.list_events(plan_id)?;
            let last_at = events
                .iter()
                .filter(|e| e.task_id == Some(node.task_id) && e.event_type == "ERROR")
                .max_by_key(|e| e.created_at)
                .map(|e| e.created_at.to_rfc3339())
                .unwrap_or_default();
            lines.push(format!("- last_error_at: {last_at}"));
            lines.push(format!("- last_error_code: {code}"));
            lines.push(format!("- last_error_message: {message}"));
        }
        lines.push(String::new());
    }

    let mut out = lines.join("\n");
    out.truncate(out.trim_end().len());
    out.push('\n');
    std::fs::write(&path, out)?;
    Ok(path)
}
