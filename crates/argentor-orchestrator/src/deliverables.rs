//! Exports a plan's deliverables into a handoff-ready folder (spec §4.8):
//! one subfolder per DONE ACTION's artifact, a `manifest.json`, a
//! `plan_meta.json`, and a `final.json` pointing at the single
//! entrypoint the [`crate::final_picker`] module chose. Grounded on
//! `core/deliverables.py`'s `export_deliverables`.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::final_picker::{format_str, pick_final_deliverable};
use argentor_core::{utc_now_iso, NodeType, PlanId, TaskStatus};
use argentor_storage::{Store, TaskEvent};
use serde_json::{json, Value};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    pub plan_id: String,
    pub out_dir: PathBuf,
    pub files_copied: usize,
}

/// Collapses `text` to a filesystem-safe slug: letters, digits, CJK,
/// `._ -` survive, everything else becomes `_`, spaces become `_`,
/// leading/trailing `._-` trimmed, truncated to `max_len` bytes-safe chars.
fn safe_name(text: &str, max_len: usize) -> String {
    let cleaned: String = text
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || ('\u{4e00}'..='\u{9fff}').contains(&c) || ".-_ ".contains(c) {
                c
            } else {
                '_'
            }
        })
        .collect();
    let cleaned = cleaned.replace(' ', "_");
    let trimmed = cleaned.trim_matches(|c| c == '.' || c == '_' || c == '-');
    if trimmed.is_empty() {
        "item".to_string()
    } else {
        trimmed.chars().take(max_len).collect()
    }
}

struct ExportedTask {
    task_id: String,
    task_title: String,
    node_type: String,
    status: String,
    owner_agent_id: String,
    tags: Vec<String>,
    artifact_id: String,
    artifact_format: String,
    artifact_sha256: String,
    artifact_created_at: String,
    source_path: PathBuf,
    dest_path: PathBuf,
}

/// Copies every DONE ACTION's (approved, or candidate when
/// `include_candidates`) artifact under `out_dir`, then writes the
/// manifest/plan-meta/final-pointer files export consumers rely on.
pub fn export_deliverables(
    store: &Store,
    plan_id: PlanId,
    out_dir: &Path,
    include_candidates: bool,
) -> OrchestratorResult<ExportResult> {
    std::fs::create_dir_all(out_dir)?;
    let artifacts_dir = out_dir.join("artifacts");
    std::fs::create_dir_all(&artifacts_dir)?;

    let plan = store.get_plan(plan_id)?;
    let plan_meta = json!({
        "plan_id": plan.plan_id.to_string(),
        "title": plan.title,
        "root_task_id": plan.root_task_id.to_string(),
        "created_at": plan.created_at.to_rfc3339(),
        "exported_at": utc_now_iso(),
    });
    std::fs::write(out_dir.join("plan_meta.json"), serde_json::to_string_pretty(&plan_meta)?)?;

    let nodes = store.list_task_nodes(plan_id)?;
    let mut exported = Vec::new();

    for node in nodes.iter().filter(|n| n.active_branch && n.node_type == NodeType::Action && n.status == TaskStatus::Done) {
        let artifact_id = match (node.approved_artifact_id, include_candidates.then_some(node.active_artifact_id).flatten()) {
            (Some(id), _) => Some(id),
            (None, Some(id)) => Some(id),
            (None, None) => None,
        };
        let Some(artifact_id) = artifact_id else { continue };
        let Ok(artifact) = store.get_artifact(artifact_id) else { continue };

        let src = PathBuf::from(&artifact.path);
        if !src.exists() {
            continue;
        }

        let task_slug = format!("{}_{}", safe_name(&node.title, 60), &node.task_id.to_string()[..8]);
        let dest_dir = artifacts_dir.join(&task_slug);
        std::fs::create_dir_all(&dest_dir)?;

        let src_name = src.file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default();
        let mut dest = dest_dir.join(&src_name);
        if dest.exists() {
            let stem = src.file_stem().map(|s| s.to_string_lossy().to_string()).unwrap_or_default();
            let suffix = src.extension().map(|e| format!(".{}", e.to_string_lossy())).unwrap_or_default();
            dest = dest_dir.join(format!("{stem}_{}{suffix}", &artifact.artifact_id.to_string()[..8]));
        }
        std::fs::copy(&src, &dest)?;

        exported.push(ExportedTask {
            task_id: node.task_id.to_string(),
            task_title: node.title.clone(),
            node_type: "ACTION".to_string(),
            status: "DONE".to_string(),
            owner_agent_id: format!("{:?}", node.owner).to_ascii_uppercase(),
            tags: node.tags.clone(),
            artifact_id: artifact.artifact_id.to_string(),
            artifact_format: format_str(artifact.format).to_string(),
            artifact_sha256: artifact.sha256.clone(),
            artifact_created_at: artifact.created_at.to_rfc3339(),
            source_path: src,
            dest_path: dest.strip_prefix(out_dir).unwrap_or(&dest).to_path_buf(),
        });
    }

    let files_copied = exported.len();
    let files_json: Vec<Value> = exported
        .iter()
        .map(|f| {
            json!({
                "task_id": f.task_id,
                "task_title": f.task_title,
                "node_type": f.node_type,
                "status": f.status,
                "owner_agent_id": f.owner_agent_id,
                "tags": f.tags,
                "artifact": {
                    "artifact_id": f.artifact_id,
                    "format": f.artifact_format,
                    "sha256": f.artifact_sha256,
                    "created_at": f.artifact_created_at,
                    "source_path": f.source_path.display().to_string(),
                    "dest_path": f.dest_path.display().to_string(),
                },
            })
        })
        .collect();

    let mut manifest = json!({
        "plan": plan_meta,
        "files": files_json,
        "bundle_mode": if files_copied <= 1 { "SINGLE" } else { "MANIFEST" },
        "entrypoint": "",
        "final_candidates": Value::Array(
            exported.iter().take(10).map(|f| json!({
                "task_title": f.task_title,
                "artifact_id": f.artifact_id,
                "format": f.artifact_format,
            })).collect()
        ),
    });
    std::fs::write(out_dir.join("manifest.json"), serde_json::to_string_pretty(&manifest)?)?;

    let picked = pick_final_deliverable(store, plan_id, include_candidates)?;

    let final_entrypoint = exported
        .iter()
        .find(|f| f.artifact_id == picked.artifact_id)
        .map(|f| f.dest_path.display().to_string())
        .unwrap_or_else(|| PathBuf::from(&picked.source_path).file_name().map(|n| n.to_string_lossy().to_string()).unwrap_or_default());
    manifest["entrypoint"] = Value::String(final_entrypoint.clone());
    std::fs::write(out_dir.join("manifest.json"), serde_json::to_string_pretty(&manifest)?)?;

    let root_node = nodes.iter().find(|n| n.task_id == plan.root_task_id);
    let acceptance_criteria = root_node.and_then(|n| n.acceptance_criteria.clone());

    let mut trace = Vec::new();
    for f in &exported {
        let task_id = argentor_core::TaskId::parse(&f.task_id).map_err(|e| OrchestratorError::Config(e.to_string()))?;
        let reviews = store.list_reviews_for_target(task_id)?;
        let latest = reviews.iter().max_by_key(|r| r.created_at);
        trace.push(json!({
            "task_title": f.task_title,
            "approved_artifact_id": f.artifact_id,
            "reviewed_artifact_id": latest.and_then(|r| r.reviewed_artifact_id).map(|id| id.to_string()).unwrap_or_default(),
            "latest_verdict": latest.map(|r| format!("{:?}", r.verdict).to_ascii_uppercase()).unwrap_or_default(),
            "review_created_at": latest.map(|r| r.created_at.to_rfc3339()).unwrap_or_default(),
        }));
    }

    let how_to_run = if picked.format == "html" {
        vec![format!("Open `{final_entrypoint}` in a browser (double click).")]
    } else {
        vec![format!("Open `{final_entrypoint}` and follow its instructions.")]
    };

    let final_json = json!({
        "final_entrypoint": final_entrypoint,
        "final_task_title": picked.task_title,
        "final_artifact_id": picked.artifact_id,
        "how_to_run": how_to_run,
        "acceptance_criteria": acceptance_criteria,
        "trace": trace,
        "reasoning": picked.reasoning,
    });
    std::fs::write(out_dir.join("final.json"), serde_json::to_string_pretty(&final_json)?)?;

    let _ = store.record_event(&TaskEvent {
        event_id: argentor_core::EventId::new(),
        plan_id,
        task_id: None,
        event_type: "EXPORT_DONE".to_string(),
        payload: json!({
            "out_dir": out_dir.display().to_string(),
            "files_copied": files_copied,
            "final_entrypoint": final_entrypoint,
            "final_artifact_id": picked.artifact_id,
        }),
        created_at: chrono::Utc::now(),
    });

    Ok(ExportResult { plan_id: plan_id.to_string(), out_dir: out_dir.to_path_buf(), files_copied })
}
