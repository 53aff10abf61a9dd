//! The executor round (spec §4.5): for one ready ACTION, select its best
//! input per requirement, optionally run a skill to extract their text,
//! call the executor, validate the TASK_ACTION contract, and dispatch on
//! `result_type`. Grounded on `run.py`'s `xiaobo_round`.

use crate::config::RuntimeConfig;
use crate::error::OrchestratorResult;
use crate::errors_runtime::{apply_error_outcome, increment_attempt, map_error_to_outcome, record_error, set_status};
use argentor_agent::{call_json, LlmBackend};
use argentor_contracts::{normalize_and_validate, ContractContext, ContractName};
use argentor_core::{ArtifactFormat, ErrorCode, PlanId, TaskId, TaskStatus};
use argentor_graph::Artifact;
use argentor_skills::{SkillInput, SkillInputFile, SkillRegistry};
use argentor_storage::Store;
use serde_json::{json, Value};
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// What the executor round did with one ACTION.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutorOutcome {
    /// Conflicting input versions were found for a requirement; the task
    /// is blocked waiting for the caller to pick one.
    InputConflict { conflicts: Vec<Value> },
    /// The text-extraction skill hasn't succeeded yet (failed, timed out,
    /// or is still within its retry budget).
    SkillPending,
    /// The executor reported missing required input; a required-docs note
    /// was written for the caller.
    NeedsInput { required_docs_path: PathBuf },
    /// A new artifact was produced and the ACTION moved to READY_TO_CHECK.
    ArtifactProduced { artifact_id: argentor_core::ArtifactId },
    /// The executor had nothing to do; the ACTION moved to READY_TO_CHECK
    /// with no new artifact.
    Noop,
    /// The executor itself, the contract, or the backend failed.
    Error { error_code: ErrorCode, hint: String },
}

struct SelectedInput {
    path: String,
    sha256: String,
    requirement_name: String,
}

/// Picks one evidence file per requirement name: prefer a filename
/// containing "final" (case-insensitive), else the most recently added.
/// Also reports requirement names with more than one non-"final"
/// candidate, for visibility, mirroring `_select_best_inputs_per_requirement`.
fn select_best_inputs_per_requirement(store: &Store, task_id: TaskId) -> OrchestratorResult<(Vec<SelectedInput>, Vec<Value>)> {
    let requirements = store.list_requirements(task_id)?;
    let mut selected = Vec::new();
    let mut conflicts = Vec::new();

    for req in requirements {
        let mut evidence = store.list_evidence(req.requirement_id)?;
        if evidence.is_empty() {
            continue;
        }
        evidence.sort_by(|a, b| {
            let a_final = Path::new(&a.path).file_name().and_then(|n| n.to_str()).unwrap_or("").to_ascii_lowercase().contains("final");
            let b_final = Path::new(&b.path).file_name().and_then(|n| n.to_str()).unwrap_or("").to_ascii_lowercase().contains("final");
            (b_final, b.created_at).cmp(&(a_final, a.created_at))
        });
        let best = &evidence[0];
        let best_is_final = Path::new(&best.path).file_name().and_then(|n| n.to_str()).unwrap_or("").to_ascii_lowercase().contains("final");
        if evidence.len() > 1 && !best_is_final {
            conflicts.push(json!({
                "requirement_name": req.name,
                "chosen": Path::new(&best.path).file_name().map(|n| n.to_string_lossy().to_string()),
                "candidates": evidence.iter().take(5).map(|e| Path::new(&e.path).file_name().map(|n| n.to_string_lossy().to_string())).collect::<Vec<_>>(),
            }));
        }
        selected.push(SelectedInput { path: best.path.clone(), sha256: best.sha256.clone(), requirement_name: req.name });
    }

    Ok((selected, conflicts))
}

fn write_required_docs(workspace_root: &Path, task_id: TaskId, required_docs: &Value) -> OrchestratorResult<PathBuf> {
    let dir = workspace_root.join("required_docs");
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{task_id}.md"));
    let mut lines = vec![format!("# Required Docs for {task_id}"), String::new()];
    if let Some(docs) = required_docs.as_array() {
        for doc in docs {
            let name = doc.get("name").and_then(Value::as_str).unwrap_or("");
            let description = doc.get("description").and_then(Value::as_str).unwrap_or("");
            lines.push(format!("- {name}: {description}"));
            if let Some(types) = doc.get("accepted_types").and_then(Value::as_array) {
                if !types.is_empty() {
                    lines.push(format!("  - accepted_types: {types:?}"));
                }
            }
        }
    }
    std::fs::write(&path, lines.join("\n") + "\n")?;
    Ok(path)
}

fn write_artifact_file(artifacts_dir: &Path, task_id: TaskId, name: &str, ext: &str, content: &str) -> OrchestratorResult<PathBuf> {
    let dir = artifacts_dir.join(task_id.to_string());
    std::fs::create_dir_all(&dir)?;
    let path = dir.join(format!("{name}.{ext}"));
    std::fs::write(&path, content)?;
    Ok(path)
}

fn build_executor_prompt(task_title: &str, suggestions_text: &str, extracted_snippets: &[String]) -> String {
    let snippets = if extracted_snippets.is_empty() {
        "(no extracted input text)".to_string()
    } else {
        extracted_snippets.join("\n---\n")
    };
    format!(
        "You are executing one ACTION task.\n\
         task_title: {task_title}\n\n\
         Reviewer suggestions from the last rejection (if any):\n{suggestions_text}\n\n\
         Extracted input text:\n{snippets}\n\n\
         Return a TASK_ACTION contract JSON object with schema_version, task_id, \
         result_type (NEEDS_INPUT|ARTIFACT|NOOP|ERROR), and the fields that \
         result_type requires."
    )
}

/// Runs one executor attempt for `task_id`, an ACTION the caller has
/// already confirmed is READY and assigned to it. Does not transition the
/// task to IN_PROGRESS itself — unlike [`crate::review_gate::run_check_once`]
/// there is no single shared lock column contended over by concurrent
/// executors in this engine's sequential main loop.
pub async fn run_executor_once(
    store: &Store,
    skills: &SkillRegistry,
    plan_id: PlanId,
    task_id: TaskId,
    backend: &dyn LlmBackend,
    workspace_root: &Path,
) -> OrchestratorResult<ExecutorOutcome> {
    let cfg = RuntimeConfig::get()?;
    let task = store.get_task_node(task_id)?;

    let suggestions_path = workspace_root.join("reviews").join(task_id.to_string()).join("suggestions.md");
    let suggestions_text = std::fs::read_to_string(&suggestions_path).unwrap_or_default();

    let (selected_files, conflicts) = select_best_inputs_per_requirement(store, task_id)?;
    if !conflicts.is_empty() {
        record_error(
            store,
            plan_id,
            Some(task_id),
            ErrorCode::InputConflict,
            "Multiple input versions detected; please confirm which to use.",
            json!({"conflicts": conflicts}),
        )?;
        apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::InputConflict))?;
        return Ok(ExecutorOutcome::InputConflict { conflicts });
    }

    let mut extracted_snippets = Vec::new();
    if !selected_files.is_empty() {
        let files: Vec<SkillInputFile> = selected_files
            .iter()
            .map(|f| SkillInputFile { name: f.requirement_name.clone(), path: f.path.clone(), sha256: f.sha256.clone() })
            .collect();
        let input = SkillInput { task_id, plan_id, files, params: json!({"max_chars": 50_000}) };
        match skills.invoke(store, "text_extract", input).await {
            Ok(outcome) => {
                for artifact in outcome.artifacts.iter().take(3) {
                    if let Ok(text) = std::fs::read_to_string(&artifact.path) {
                        extracted_snippets.push(text.chars().take(20_000).collect());
                    }
                }
            }
            Err(err) => {
                let code = match &err {
                    argentor_skills::SkillError::BadInput { .. } => ErrorCode::SkillBadInput,
                    _ => ErrorCode::SkillFailed,
                };
                record_error(store, plan_id, Some(task_id), code, &err.to_string(), json!({"skill": "text_extract"}))?;
                let attempts = increment_attempt(store, task_id)?;
                if attempts >= cfg.max_check_attempts_v2 as i32 {
                    apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::MaxAttemptsExceeded))?;
                    return Ok(ExecutorOutcome::Error {
                        error_code: ErrorCode::MaxAttemptsExceeded,
                        hint: "text_extract failed repeatedly; waiting external.".into(),
                    });
                }
                apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(code))?;
                return Ok(ExecutorOutcome::SkillPending);
            }
        }
    }

    let prompt = build_executor_prompt(&task.title, &suggestions_text, &extracted_snippets);
    let call = call_json(backend, &prompt).await;

    if call.error_code.is_some() && call.parsed_json.is_none() {
        record_error(
            store,
            plan_id,
            Some(task_id),
            call.error_code.unwrap_or(ErrorCode::LlmFailed),
            call.error.as_deref().unwrap_or("llm failed"),
            json!({}),
        )?;
        let attempts = increment_attempt(store, task_id)?;
        if attempts >= cfg.max_check_attempts_v2 as i32 {
            apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::MaxAttemptsExceeded))?;
            return Ok(ExecutorOutcome::Error { error_code: ErrorCode::MaxAttemptsExceeded, hint: "Max attempts exceeded".into() });
        }
        apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::LlmFailed))?;
        return Ok(ExecutorOutcome::Error { error_code: ErrorCode::LlmFailed, hint: "executor call failed; will retry".into() });
    }

    let Some(raw) = call.parsed_json else {
        return handle_contract_failure(store, plan_id, task_id, &cfg, "executor produced no parseable JSON".to_string()).await;
    };

    let task_id_str = task_id.to_string();
    let ctx = ContractContext { task_id: &task_id_str, ..Default::default() };
    let (obj, err) = normalize_and_validate(ContractName::TaskAction, raw, &ctx);
    if let Some(err) = err {
        return handle_contract_failure(store, plan_id, task_id, &cfg, err.format_short()).await;
    }

    match obj["result_type"].as_str().unwrap_or("") {
        "NEEDS_INPUT" => {
            let required_docs = obj["needs_input"]["required_docs"].clone();
            let path = write_required_docs(workspace_root, task_id, &required_docs)?;
            record_error(
                store,
                plan_id,
                Some(task_id),
                ErrorCode::InputMissing,
                "Missing required input(s).",
                json!({"required_docs": required_docs}),
            )?;
            apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::InputMissing))?;
            Ok(ExecutorOutcome::NeedsInput { required_docs_path: path })
        }
        "ARTIFACT" => {
            let name = obj["artifact"]["name"].as_str().unwrap_or("artifact").to_string();
            let fmt_str = obj["artifact"]["format"].as_str().unwrap_or("md");
            let format = ArtifactFormat::from_str(fmt_str).unwrap_or(ArtifactFormat::Md);
            let content = obj["artifact"]["content"].as_str().unwrap_or("").to_string();
            let path = write_artifact_file(&workspace_root.join("artifacts"), task_id, &name, fmt_str, &content)?;
            let sha256 = {
                use sha2::{Digest, Sha256};
                let mut hasher = Sha256::new();
                hasher.update(content.as_bytes());
                hex::encode(hasher.finalize())
            };
            let existing_versions = store.list_artifacts(task_id)?.len() as i32;
            let artifact = Artifact {
                artifact_id: argentor_core::ArtifactId::new(),
                task_id,
                name,
                path: path.display().to_string(),
                format,
                version: existing_versions + 1,
                sha256,
                created_at: argentor_core::utc_now(),
            };
            store.insert_artifact(&artifact)?;
            let mut node = store.get_task_node(task_id)?;
            node.active_artifact_id = Some(artifact.artifact_id);
            store.update_task_node(&node)?;
            set_status(store, plan_id, task_id, TaskStatus::ReadyToCheck, None)?;
            Ok(ExecutorOutcome::ArtifactProduced { artifact_id: artifact.artifact_id })
        }
        "NOOP" => {
            set_status(store, plan_id, task_id, TaskStatus::ReadyToCheck, None)?;
            Ok(ExecutorOutcome::Noop)
        }
        "ERROR" => {
            let code = obj["error"]["code"].as_str().unwrap_or("LLM_FAILED");
            let message = obj["error"]["message"].as_str().unwrap_or("model reported ERROR");
            record_error(store, plan_id, Some(task_id), ErrorCode::LlmFailed, &format!("model_error[{code}]: {message}"), json!({}))?;
            let attempts = increment_attempt(store, task_id)?;
            if attempts >= cfg.max_check_attempts_v2 as i32 {
                apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::MaxAttemptsExceeded))?;
                return Ok(ExecutorOutcome::Error { error_code: ErrorCode::MaxAttemptsExceeded, hint: "Max attempts exceeded".into() });
            }
            apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::LlmFailed))?;
            Ok(ExecutorOutcome::Error { error_code: ErrorCode::LlmFailed, hint: format!("model reported error: {message}") })
        }
        other => {
            record_error(store, plan_id, Some(task_id), ErrorCode::LlmUnparseable, &format!("unknown result_type: {other}"), json!({}))?;
            apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::LlmUnparseable))?;
            Ok(ExecutorOutcome::Error { error_code: ErrorCode::LlmUnparseable, hint: format!("unknown result_type: {other}") })
        }
    }
}

async fn handle_contract_failure(
    store: &Store,
    plan_id: PlanId,
    task_id: TaskId,
    cfg: &RuntimeConfig,
    reason: String,
) -> OrchestratorResult<ExecutorOutcome> {
    record_error(store, plan_id, Some(task_id), ErrorCode::LlmUnparseable, &reason, json!({}))?;
    let attempts = increment_attempt(store, task_id)?;
    if attempts >= cfg.max_check_attempts_v2 as i32 {
        apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::MaxAttemptsExceeded))?;
        return Ok(ExecutorOutcome::Error { error_code: ErrorCode::MaxAttemptsExceeded, hint: "Max attempts exceeded".into() });
    }
    apply_error_outcome(store, plan_id, task_id, map_error_to_outcome(ErrorCode::LlmUnparseable))?;
    Ok(ExecutorOutcome::Error { error_code: ErrorCode::LlmUnparseable, hint: reason })
}
