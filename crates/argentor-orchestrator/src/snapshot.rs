//! The single-source-of-truth plan snapshot spec §6's `status`/`snapshot`
//! commands read from: report + doctor + feasibility + final-deliverable
//! pointer, combined into one value and rendered two ways. Grounded on
//! `core/observability.py`'s `get_plan_snapshot`/`render_snapshot_brief`/
//! `render_snapshot_md`.

use crate::config::RuntimeConfig;
use crate::doctor::{run_doctor, DoctorIssue};
use crate::error::OrchestratorResult;
use crate::feasibility::{feasibility_check, FeasibilityReport};
use crate::reporting::{generate_plan_report, render_plan_report_md, PlanReport};
use argentor_core::{utc_now_iso, PlanId};
use argentor_storage::Store;
use std::collections::HashMap;

#[derive(Debug, Clone, PartialEq)]
pub struct ReasonCount {
    pub code: &'static str,
    pub count: usize,
    pub example: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinalDeliverablePointer {
    pub final_entrypoint: String,
    pub final_task_title: String,
    pub final_artifact_id: String,
    pub how_to_run: Vec<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlanSnapshot {
    pub ts: String,
    pub report: PlanReport,
    pub reasons: Vec<ReasonCount>,
    pub doctor_ok: bool,
    pub doctor_findings: Vec<DoctorIssue>,
    pub feasibility: Option<FeasibilityReport>,
    pub final_deliverable: Option<FinalDeliverablePointer>,
}

fn summarize_reasons(report: &PlanReport) -> Vec<ReasonCount> {
    let mut reasons = Vec::new();
    if !report.waiting_review.is_empty() {
        reasons.push(ReasonCount {
            code: "WAITING_REVIEW",
            count: report.waiting_review.len(),
            example: report.waiting_review[0].task_title.clone(),
        });
    }
    if !report.blocked.is_empty() {
        let waiting_input: Vec<_> = report
            .blocked
            .iter()
            .filter(|b| b.blocked_reason.as_deref() == Some("WAITING_INPUT"))
            .collect();
        let waiting_external: Vec<_> = report
            .blocked
            .iter()
            .filter(|b| b.blocked_reason.as_deref() == Some("WAITING_EXTERNAL"))
            .collect();
        let other_count = report.blocked.len() - waiting_input.len() - waiting_external.len();
        if let Some(first) = waiting_input.first() {
            reasons.push(ReasonCount { code: "WAITING_INPUT", count: waiting_input.len(), example: first.task_title.clone() });
        }
        if let Some(first) = waiting_external.first() {
            reasons.push(ReasonCount { code: "WAITING_EXTERNAL", count: waiting_external.len(), example: first.task_title.clone() });
        }
        if other_count > 0 {
            let example = report
                .blocked
                .iter()
                .find(|b| b.blocked_reason.as_deref() != Some("WAITING_INPUT") && b.blocked_reason.as_deref() != Some("WAITING_EXTERNAL"))
                .map(|b| b.task_title.clone())
                .unwrap_or_default();
            reasons.push(ReasonCount { code: "BLOCKED", count: other_count, example });
        }
    }
    if !report.failed.is_empty() {
        reasons.push(ReasonCount { code: "FAILED", count: report.failed.len(), example: report.failed[0].task_title.clone() });
    }
    if !report.ready.is_empty() {
        reasons.push(ReasonCount { code: "RUNNABLE", count: report.ready.len(), example: report.ready[0].task_title.clone() });
    }
    if reasons.is_empty() && report.summary.is_done {
        reasons.push(ReasonCount { code: "DONE", count: 1, example: report.plan_title.clone() });
    }
    reasons
}

fn read_final_json(out_dir: &std::path::Path) -> Option<FinalDeliverablePointer> {
    let text = std::fs::read_to_string(out_dir.join("final.json")).ok()?;
    let obj: serde_json::Value = serde_json::from_str(&text).ok()?;
    Some(FinalDeliverablePointer {
        final_entrypoint: obj.get("final_entrypoint").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        final_task_title: obj.get("final_task_title").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        final_artifact_id: obj.get("final_artifact_id").and_then(|v| v.as_str()).unwrap_or("").to_string(),
        how_to_run: obj
            .get("how_to_run")
            .and_then(|v| v.as_array())
            .map(|a| a.iter().filter_map(|v| v.as_str().map(String::from)).collect())
            .unwrap_or_default(),
    })
}

/// Builds the full snapshot for `plan_id`. `deliverables_dir`, when set,
/// points at a prior [`crate::deliverables::export_deliverables`] output
/// whose `final.json` is read back in, if present.
pub fn get_plan_snapshot(
    store: &Store,
    plan_id: PlanId,
    v2_mode: bool,
    deliverables_dir: Option<&std::path::Path>,
) -> OrchestratorResult<PlanSnapshot> {
    let cfg = RuntimeConfig::get()?;
    let report = generate_plan_report(store, plan_id, v2_mode)?;
    let plan_id_str = plan_id.to_string();
    let doctor_findings = run_doctor(store, Some(&plan_id_str));

    let feasibility = if v2_mode {
        let plan = store.get_plan(plan_id)?;
        let nodes = store.list_task_nodes(plan_id)?;
        let edges = store.list_task_edges(plan_id)?;
        let nodes_map: HashMap<_, _> = nodes.into_iter().map(|n| (n.task_id, n)).collect();
        Some(feasibility_check(plan.root_task_id, &nodes_map, &edges, cfg.oversized_action_threshold_days, cfg.split_depth_budget))
    } else {
        None
    };

    let final_deliverable = deliverables_dir.and_then(read_final_json);

    Ok(PlanSnapshot {
        ts: utc_now_iso(),
        reasons: summarize_reasons(&report),
        doctor_ok: doctor_findings.is_empty(),
        doctor_findings,
        feasibility,
        final_deliverable,
        report,
    })
}

/// Short human-readable status, matching `render_snapshot_brief`.
pub fn render_snapshot_brief(snapshot: &PlanSnapshot) -> String {
    let mut lines = Vec::new();
    lines.push(format!("plan: {}", snapshot.report.plan_title));
    lines.push(format!("plan_id: {}", snapshot.report.plan_id));
    lines.push(String::new());
    lines.push(format!("status: {}", if snapshot.report.summary.is_done { "DONE" } else { "NOT_DONE" }));
    lines.push(String::new());

    if !snapshot.reasons.is_empty() {
        lines.push("reasons:".to_string());
        for r in snapshot.reasons.iter().take(8) {
            lines.push(format!("- {}: {}", r.code, r.count));
        }
        lines.push(String::new());
    }

    if let Some(fd) = &snapshot.final_deliverable {
        if !fd.final_entrypoint.is_empty() {
            lines.push(format!("final_entrypoint: {}", fd.final_entrypoint));
            if !fd.how_to_run.is_empty() {
                lines.push("how_to_run:".to_string());
                for s in fd.how_to_run.iter().take(6) {
                    lines.push(format!("- {s}"));
                }
            }
            lines.push(String::new());
        }
    }

    if !snapshot.report.next_steps.is_empty() {
        lines.push("next_steps:".to_string());
        for s in snapshot.report.next_steps.iter().take(8) {
            lines.push(format!("- {}", s.cmd));
        }
        lines.push(String::new());
    }

    let mut out = lines.join("\n");
    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}

/// Full markdown combining report + doctor + feasibility + final pointer,
/// matching `render_snapshot_md`.
pub fn render_snapshot_md(snapshot: &PlanSnapshot) -> String {
    let mut lines = vec![render_plan_report_md(&snapshot.report).trim_end().to_string(), String::new()];

    lines.push("## Doctor".to_string());
    if snapshot.doctor_ok {
        lines.push("- OK".to_string());
    } else {
        for f in snapshot.doctor_findings.iter().take(30) {
            lines.push(format!("- {}: {}", f.code, f.message));
        }
    }
    lines.push(String::new());

    if let Some(feas) = &snapshot.feasibility {
        lines.push("## Feasibility (v2)".to_string());
        lines.push(format!("- ok: {}", feas.ok));
        lines.push(format!("- threshold_person_days: {}", feas.threshold_person_days));
        if !feas.over_threshold.is_empty() {
            lines.push("- over_threshold:".to_string());
            for it in feas.over_threshold.iter().take(20) {
                lines.push(format!("  - {}: {}d can_split={}", it.task_title, it.estimated_person_days, it.can_split));
            }
        }
        if !feas.missing_estimate.is_empty() {
            lines.push("- missing_estimate:".to_string());
            for it in feas.missing_estimate.iter().take(20) {
                lines.push(format!("  - {}", it.task_title));
            }
        }
        lines.push(String::new());
    }

    lines.push("## Final Deliverable".to_string());
    match &snapshot.final_deliverable {
        Some(fd) if !fd.final_entrypoint.is_empty() => {
            lines.push(format!("- final_entrypoint: {}", fd.final_entrypoint));
        }
        _ => lines.push("- (not exported yet)".to_string()),
    }
    lines.push(String::new());

    let mut out = lines.join("\n");
    out.truncate(out.trim_end().len());
    out.push('\n');
    out
}
