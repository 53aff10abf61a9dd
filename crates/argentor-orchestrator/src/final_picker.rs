//! Picks a single "final deliverable" artifact for a plan (spec §4.8),
//! scoring DONE ACTION artifacts against the root GOAL's
//! `deliverable_spec` and a final/package tag or title hint. Grounded on
//! `core/final_picker.py`'s `pick_final_deliverable`.

use crate::error::{OrchestratorError, OrchestratorResult};
use argentor_core::{ArtifactFormat, NodeType, PlanId, TaskStatus};
use argentor_storage::Store;
use std::path::Path;

#[derive(Debug, Clone, PartialEq)]
pub struct FinalDeliverable {
    pub task_id: String,
    pub task_title: String,
    pub artifact_id: String,
    pub source_path: String,
    pub format: String,
    pub entrypoint_filename: String,
    pub reasoning: Vec<&'static str>,
}

pub(crate) fn format_str(format: ArtifactFormat) -> &'static str {
    match format {
        ArtifactFormat::Md => "md",
        ArtifactFormat::Txt => "txt",
        ArtifactFormat::Json => "json",
        ArtifactFormat::Html => "html",
        ArtifactFormat::Css => "css",
        ArtifactFormat::Js => "js",
    }
}

fn is_finalish(title: &str, tags: &[String]) -> bool {
    let title_lower = title.to_ascii_lowercase();
    tags.iter().any(|t| t.eq_ignore_ascii_case("final") || t.eq_ignore_ascii_case("package"))
        || title_lower.contains("final")
        || title_lower.contains("package")
}

struct Candidate {
    task_id: String,
    task_title: String,
    tags: Vec<String>,
    artifact_id: String,
    artifact_format: String,
    artifact_path: String,
    artifact_created_at: String,
}

/// `(spec_match, finalish, created_at, title)`, sorted descending as a
/// tuple to mirror the python original's tuple-keyed sort.
fn score(c: &Candidate, desired_filename: &str, desired_format: &str) -> (i32, i32, String, String) {
    let path_name = Path::new(&c.artifact_path)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let name_match = !desired_filename.is_empty() && path_name.eq_ignore_ascii_case(desired_filename);
    let fmt_match = !desired_format.is_empty() && c.artifact_format.eq_ignore_ascii_case(desired_format);
    let spec_match = if name_match && (desired_format.is_empty() || fmt_match) {
        10
    } else if name_match {
        5
    } else if fmt_match {
        3
    } else {
        0
    };
    let finalish = if is_finalish(&c.task_title, &c.tags) { 2 } else { 0 };
    (spec_match, finalish, c.artifact_created_at.clone(), c.task_title.clone())
}

/// Picks the best final deliverable for `plan_id`. Only considers approved
/// artifacts unless `include_candidates` is set, in which case a DONE
/// ACTION's still-active (unapproved) artifact is also eligible.
pub fn pick_final_deliverable(
    store: &Store,
    plan_id: PlanId,
    include_candidates: bool,
) -> OrchestratorResult<FinalDeliverable> {
    let plan = store.get_plan(plan_id)?;
    let nodes = store.list_task_nodes(plan_id)?;

    let root = nodes.iter().find(|n| n.task_id == plan.root_task_id && n.node_type == NodeType::Goal);
    let spec = root.and_then(|r| r.deliverable_spec.as_ref()).and_then(|v| v.as_object());
    let desired_filename = spec
        .and_then(|s| s.get("filename"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_string();
    let desired_format = spec
        .and_then(|s| s.get("format"))
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase();

    let mut candidates = Vec::new();
    for node in nodes.iter().filter(|n| n.active_branch && n.node_type == NodeType::Action && n.status == TaskStatus::Done) {
        let artifact_id = match (node.approved_artifact_id, include_candidates.then_some(node.active_artifact_id).flatten()) {
            (Some(id), _) => Some(id),
            (None, Some(id)) => Some(id),
            (None, None) => None,
        };
        let Some(artifact_id) = artifact_id else { continue };
        let Ok(artifact) = store.get_artifact(artifact_id) else { continue };
        candidates.push(Candidate {
            task_id: node.task_id.to_string(),
            task_title: node.title.clone(),
            tags: node.tags.clone(),
            artifact_id: artifact.artifact_id.to_string(),
            artifact_format: format_str(artifact.format).to_string(),
            artifact_path: artifact.path,
            artifact_created_at: artifact.created_at.to_rfc3339(),
        });
    }

    if candidates.is_empty() {
        return Err(OrchestratorError::NoFinalDeliverable {
            plan_id: plan_id.to_string(),
            hint: "No approved deliverables found. Next: run CHECK reviews so ACTION nodes get approved_artifact_id, then re-run export.".into(),
        });
    }

    let best = candidates
        .into_iter()
        .max_by(|a, b| score(a, &desired_filename, &desired_format).cmp(&score(b, &desired_filename, &desired_format)))
        .expect("non-empty");

    let best_score = score(&best, &desired_filename, &desired_format);
    let mut reasoning = Vec::new();
    if !desired_filename.is_empty() || !desired_format.is_empty() {
        reasoning.push(if best_score.0 >= 5 { "matched_root_final_deliverable_spec" } else { "root_spec_present_but_not_matched" });
    }
    if is_finalish(&best.task_title, &best.tags) {
        reasoning.push("final_tag_or_title");
    }
    reasoning.push("latest_approved_artifact_fallback");

    let src_path = Path::new(&best.artifact_path);
    let mut entrypoint_filename = src_path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| if desired_filename.is_empty() { "deliverable".into() } else { desired_filename.clone() });
    if best.artifact_format == "html" && !entrypoint_filename.to_ascii_lowercase().ends_with(".html") {
        entrypoint_filename.push_str(".html");
    }

    Ok(FinalDeliverable {
        task_id: best.task_id,
        task_title: best.task_title,
        artifact_id: best.artifact_id,
        source_path: best.artifact_path,
        format: best.artifact_format,
        entrypoint_filename,
        reasoning,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_core::Owner;
    use argentor_graph::{Artifact, Constraints, Plan, TaskNode};
    use chrono::Utc;

    fn setup_plan(store: &Store) -> (PlanId, argentor_core::TaskId) {
        let root_id = argentor_core::TaskId::new();
        let plan = Plan {
            plan_id: PlanId::new(),
            title: "t".into(),
            owner: Owner::Executor,
            root_task_id: root_id,
            created_at: Utc::now(),
            constraints: Constraints { deadline: None, priority: argentor_core::Priority::Med },
        };
        store.insert_plan(&plan).unwrap();
        let mut root = TaskNode::new(plan.plan_id, NodeType::Goal, "root goal", Owner::Executor);
        root.task_id = root_id;
        store.insert_task_node(&root).unwrap();
        (plan.plan_id, root_id)
    }

    #[test]
    fn picks_the_only_done_approved_action() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, _root_id) = setup_plan(&store);

        let mut action = TaskNode::new(plan_id, NodeType::Action, "write report", Owner::Executor);
        action.status = TaskStatus::Done;
        let artifact = Artifact {
            artifact_id: argentor_core::ArtifactId::new(),
            task_id: action.task_id,
            name: "report.md".into(),
            path: "/work/report.md".into(),
            format: ArtifactFormat::Md,
            version: 1,
            sha256: "abc".into(),
            created_at: Utc::now(),
        };
        action.approved_artifact_id = Some(artifact.artifact_id);
        store.insert_task_node(&action).unwrap();
        store.insert_artifact(&artifact).unwrap();

        let result = pick_final_deliverable(&store, plan_id, false).unwrap();
        assert_eq!(result.artifact_id, artifact.artifact_id.to_string());
        assert_eq!(result.entrypoint_filename, "report.md");
    }

    #[test]
    fn no_approved_artifact_is_an_actionable_error() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, _root_id) = setup_plan(&store);
        let err = pick_final_deliverable(&store, plan_id, false).unwrap_err();
        match err {
            OrchestratorError::NoFinalDeliverable { hint, .. } => assert!(hint.contains("CHECK reviews")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn include_candidates_falls_back_to_unapproved_active_artifact() {
        let store = Store::open_in_memory().unwrap();
        let (plan_id, _root_id) = setup_plan(&store);

        let mut action = TaskNode::new(plan_id, NodeType::Action, "draft", Owner::Executor);
        action.status = TaskStatus::Done;
        let artifact = Artifact {
            artifact_id: argentor_core::ArtifactId::new(),
            task_id: action.task_id,
            name: "draft.txt".into(),
            path: "/work/draft.txt".into(),
            format: ArtifactFormat::Txt,
            version: 1,
            sha256: "abc".into(),
            created_at: Utc::now(),
        };
        action.active_artifact_id = Some(artifact.artifact_id);
        store.insert_task_node(&action).unwrap();
        store.insert_artifact(&artifact).unwrap();

        assert!(pick_final_deliverable(&store, plan_id, false).is_err());
        let result = pick_final_deliverable(&store, plan_id, true).unwrap();
        assert_eq!(result.artifact_id, artifact.artifact_id.to_string());
    }
}
