//! Input file discovery and removal detection (spec §2 "Input file
//! scanning"). Grounded on `core/matcher.py`'s
//! `scan_inputs_and_bind_evidence`/`detect_removed_input_files`, run once
//! per `Orchestrator::run_plan` iteration, the same cadence `run.py`'s
//! top-level loop uses.

use crate::error::OrchestratorResult;
use crate::errors_runtime::record_error;
use argentor_core::{utc_now, ErrorCode, EventId, EvidenceId, PlanId};
use argentor_graph::Evidence;
use argentor_storage::{Store, TaskEvent};
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};

fn sha256_file(path: &Path) -> std::io::Result<String> {
    let bytes = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&bytes);
    Ok(hex::encode(hasher.finalize()))
}

fn walk_files(dir: &Path, out: &mut Vec<PathBuf>) {
    let Ok(entries) = std::fs::read_dir(dir) else { return };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            walk_files(&path, out);
        } else if path.is_file() {
            out.push(path);
        }
    }
}

/// Finds the single input requirement whose `name` appears (case-
/// insensitively) in the file's stem, so a file can be auto-bound as
/// evidence without a dedicated scoring pass. Returns `None` on no match
/// or an ambiguous one — ambiguity is left for a human to resolve, the
/// same as the original's tied-candidates case.
fn bind_target<'a>(reqs: &'a [argentor_graph::InputRequirement], file_stem: &str) -> Option<&'a argentor_graph::InputRequirement> {
    let stem = file_stem.to_ascii_lowercase();
    let mut matches = reqs.iter().filter(|r| stem.contains(&r.name.to_ascii_lowercase()));
    let first = matches.next()?;
    if matches.next().is_some() {
        return None;
    }
    Some(first)
}

/// Scans `inputs_dir` for files not yet recorded against `plan_id`,
/// recording each one and, where it uniquely matches one of the plan's
/// open input requirements by name, binding it as [`Evidence`]. Returns
/// the number of newly-discovered files.
pub fn scan_inputs(store: &Store, plan_id: PlanId, inputs_dir: &Path) -> OrchestratorResult<usize> {
    if !inputs_dir.is_dir() {
        return Ok(0);
    }
    let nodes = store.list_task_nodes(plan_id)?;
    let mut requirements = Vec::new();
    for node in &nodes {
        requirements.extend(store.list_requirements(node.task_id)?);
    }

    let mut files = Vec::new();
    walk_files(inputs_dir, &mut files);
    let mut discovered = 0usize;
    let now = utc_now();

    for path in files {
        let sha256 = match sha256_file(&path) {
            Ok(h) => h,
            Err(e) => {
                record_error(store, plan_id, None, ErrorCode::InputMissing, &format!("failed hashing {}: {e}", path.display()), serde_json::json!({}))?;
                continue;
            }
        };
        let path_str = path.display().to_string();
        let Some(file) = store.record_input_file_if_absent(plan_id, &path_str, &sha256, now)? else { continue };
        discovered += 1;

        let stem = path.file_stem().and_then(|s| s.to_str()).unwrap_or("");
        if let Some(req) = bind_target(&requirements, stem) {
            store.bind_input_file_requirement(file.input_file_id, req.requirement_id)?;
            store.insert_evidence(&Evidence {
                evidence_id: EvidenceId::new(),
                requirement_id: req.requirement_id,
                path: path_str,
                sha256,
                created_at: now,
            })?;
        }
    }
    Ok(discovered)
}

/// Reports (and stops tracking) every previously-scanned file that no
/// longer exists on disk, emitting one `FILE_REMOVED` event per file.
/// Returns the number removed.
pub fn detect_removed_inputs(store: &Store, plan_id: PlanId) -> OrchestratorResult<usize> {
    let mut removed = 0usize;
    for file in store.list_input_files(plan_id)? {
        if Path::new(&file.path).exists() {
            continue;
        }
        store.record_event(&TaskEvent {
            event_id: EventId::new(),
            plan_id,
            task_id: None,
            event_type: "FILE_REMOVED".to_string(),
            payload: serde_json::json!({"path": file.path, "sha256": file.sha256}),
            created_at: utc_now(),
        })?;
        store.remove_input_file(file.input_file_id)?;
        removed += 1;
    }
    Ok(removed)
}
