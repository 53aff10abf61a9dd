//! The v2 review gate (spec §4.6): "the core correctness primitive". Given
//! a CHECK task, atomically locks it, pins the ACTION's artifact at the
//! moment review starts, calls the reviewer, and transitions both tasks
//! off a single, race-safe idempotency key. Grounded on
//! `core/v2_review_gate.py`'s `run_check_once`.

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::errors_runtime::{apply_error_outcome, increment_attempt, map_error_to_outcome, record_error, set_status};
use crate::config::RuntimeConfig;
use argentor_agent::{call_json, LlmBackend};
use argentor_contracts::{normalize_and_validate, ContractContext, ContractName};
use argentor_core::{utc_now, ArtifactId, ErrorCode, NodeType, PlanId, TaskId, TaskStatus, Verdict};
use argentor_graph::Review;
use argentor_storage::Store;
use serde_json::json;
use sha2::{Digest, Sha256};

/// The outcome of one `run_check_once` call, mirroring the dict the
/// Python original returns, typed instead of stringly keyed.
#[derive(Debug, Clone, PartialEq)]
pub enum CheckOutcome {
    /// Another iteration already holds this CHECK's lock.
    SkippedLockNotAcquired,
    /// A review with this idempotency key already exists; CHECK restored
    /// to READY, no state mutated.
    AlreadyReviewed { review_id: String },
    /// The gate bailed before producing a verdict.
    Error { error_code: ErrorCode, hint: String },
    /// A verdict was recorded and the ACTION/CHECK transitioned.
    Reviewed {
        verdict: Verdict,
        review_target_task_id: TaskId,
        reviewed_artifact_id: ArtifactId,
        /// True when a newer candidate artifact appeared on the ACTION
        /// while this review was in flight (spec's STALE_REVIEW case).
        stale: bool,
    },
}

/// Atomic READY -> IN_PROGRESS transition scoped to this CHECK task only.
/// Returns `false` (not an error) when another iteration already holds it.
fn acquire_check_lock(store: &Store, check_task_id: TaskId) -> OrchestratorResult<bool> {
    let rows = store.connection().execute(
        "UPDATE task_nodes SET status = 'IN_PROGRESS', blocked_reason = NULL \
         WHERE task_id = ?1 AND active_branch = 1 AND node_type = 'CHECK' AND status = 'READY'",
        rusqlite::params![check_task_id.to_string()],
    )?;
    Ok(rows == 1)
}

fn idempotency_key(check_task_id: TaskId, reviewed_artifact_id: ArtifactId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(check_task_id.to_string().as_bytes());
    hasher.update(b"\0");
    hasher.update(reviewed_artifact_id.to_string().as_bytes());
    hex::encode(hasher.finalize())
}

fn build_reviewer_prompt(plan_id: PlanId, check_task_id: TaskId, target_task_id: TaskId, target_title: &str, artifact_text: &str) -> String {
    format!(
        "You are reviewing a deliverable artifact for approval.\n\
         plan_id: {plan_id}\n\
         check_task_id: {check_task_id}\n\
         review_target_task_id: {target_task_id}\n\
         target_task_title: {target_title}\n\n\
         Artifact content:\n{artifact_text}\n\n\
         Return a TASK_CHECK contract JSON object with schema_version, task_id, \
         review_target, total_score (0-100), breakdown, summary, action_required, \
         and suggestions."
    )
}

/// Runs one review attempt for `check_task_id`. Silently returns
/// `SkippedLockNotAcquired` if the lock couldn't be acquired; never panics
/// on a missing bound ACTION, missing artifact, or reviewer failure.
pub async fn run_check_once(
    store: &Store,
    plan_id: PlanId,
    check_task_id: TaskId,
    backend: &dyn LlmBackend,
) -> OrchestratorResult<CheckOutcome> {
    if !acquire_check_lock(store, check_task_id)? {
        return Ok(CheckOutcome::SkippedLockNotAcquired);
    }

    let check = match store.get_task_node(check_task_id) {
        Ok(n) if n.node_type == NodeType::Check => n,
        _ => {
            record_error(store, plan_id, Some(check_task_id), ErrorCode::TaskNotFound, "CHECK task not found", json!({}))?;
            set_status(store, plan_id, check_task_id, TaskStatus::Ready, None)?;
            return Ok(CheckOutcome::Error { error_code: ErrorCode::TaskNotFound, hint: "CHECK task not found".into() });
        }
    };

    let Some(target_id) = check.review_target_task_id else {
        record_error(
            store,
            plan_id,
            Some(check_task_id),
            ErrorCode::InputMissing,
            "CHECK missing review_target_task_id (v2 binding)",
            json!({"json_path": "$.task_nodes[task_id=<check>].review_target_task_id"}),
        )?;
        apply_error_outcome(store, plan_id, check_task_id, map_error_to_outcome(ErrorCode::InputMissing))?;
        return Ok(CheckOutcome::Error {
            error_code: ErrorCode::InputMissing,
            hint: "Bind CHECK.review_target_task_id to an ACTION task_id.".into(),
        });
    };

    let target = match store.get_task_node(target_id) {
        Ok(n) if n.node_type == NodeType::Action => n,
        _ => {
            record_error(
                store,
                plan_id,
                Some(check_task_id),
                ErrorCode::InputMissing,
                "CHECK review_target_task_id does not reference an existing ACTION",
                json!({"target_task_id": target_id.to_string()}),
            )?;
            apply_error_outcome(store, plan_id, check_task_id, map_error_to_outcome(ErrorCode::InputConflict))?;
            return Ok(CheckOutcome::Error {
                error_code: ErrorCode::InputMissing,
                hint: "Fix review_target_task_id to reference an existing ACTION.".into(),
            });
        }
    };

    // Race-safe version pin: whatever happens to target.active_artifact_id
    // from here on does not change which artifact this review is about.
    let Some(reviewed_artifact_id) = target.active_artifact_id else {
        record_error(
            store,
            plan_id,
            Some(check_task_id),
            ErrorCode::InputMissing,
            "Target ACTION has no active_artifact_id to review",
            json!({"review_target_task_id": target_id.to_string()}),
        )?;
        apply_error_outcome(store, plan_id, check_task_id, map_error_to_outcome(ErrorCode::InputMissing))?;
        return Ok(CheckOutcome::Error {
            error_code: ErrorCode::InputMissing,
            hint: "Generate an artifact for the ACTION first.".into(),
        });
    };

    let key = idempotency_key(check_task_id, reviewed_artifact_id);
    if let Some(existing) = store.find_review_by_idempotency_key(&key)? {
        set_status(store, plan_id, check_task_id, TaskStatus::Ready, None)?;
        return Ok(CheckOutcome::AlreadyReviewed { review_id: existing.review_id.to_string() });
    }

    let artifact = store.get_artifact(reviewed_artifact_id)?;
    if !std::path::Path::new(&artifact.path).exists() {
        record_error(
            store,
            plan_id,
            Some(check_task_id),
            ErrorCode::InputMissing,
            "Locked artifact file missing on disk",
            json!({"reviewed_artifact_id": reviewed_artifact_id.to_string(), "missing_path": artifact.path}),
        )?;
        apply_error_outcome(store, plan_id, check_task_id, map_error_to_outcome(ErrorCode::InputMissing))?;
        return Ok(CheckOutcome::Error {
            error_code: ErrorCode::InputMissing,
            hint: format!("Missing artifact file: {}", artifact.path),
        });
    }

    let artifact_text = std::fs::read_to_string(&artifact.path).unwrap_or_default();
    let prompt = build_reviewer_prompt(plan_id, check_task_id, target_id, &target.title, &artifact_text);
    let call = call_json(backend, &prompt).await;

    // Reviewer exception: the backend itself failed (transport, timeout,
    // refusal) rather than returning something we can validate.
    if let Some(code) = call.error_code {
        if call.parsed_json.is_none() {
            record_error(
                store,
                plan_id,
                Some(check_task_id),
                ErrorCode::ReviewerFailed,
                call.error.as_deref().unwrap_or("reviewer call failed"),
                json!({"check_task_id": check_task_id.to_string(), "review_target_task_id": target_id.to_string(), "reviewed_artifact_id": reviewed_artifact_id.to_string(), "underlying": code.to_string()}),
            )?;
            apply_error_outcome(store, plan_id, check_task_id, map_error_to_outcome(ErrorCode::InputConflict))?;
            return Ok(CheckOutcome::Error {
                error_code: ErrorCode::ReviewerFailed,
                hint: "Reviewer crashed; check prompt/contracts or rerun later.".into(),
            });
        }
    }

    let Some(raw) = call.parsed_json else {
        return handle_bad_output(store, plan_id, check_task_id, "reviewer produced no parseable JSON").await;
    };
    if !raw.is_object() {
        return handle_bad_output(store, plan_id, check_task_id, "reviewer output must be a JSON object").await;
    }

    let check_task_id_str = check_task_id.to_string();
    let ctx = ContractContext { task_id: &check_task_id_str, ..Default::default() };
    let (normalized, contract_err) = normalize_and_validate(ContractName::TaskCheck, raw, &ctx);
    if let Some(err) = contract_err {
        record_error(
            store,
            plan_id,
            Some(check_task_id),
            ErrorCode::ContractMismatch,
            &err.format_short(),
            json!({"hint": err.example_fix, "check_task_id": check_task_id.to_string(), "review_target_task_id": target_id.to_string(), "reviewed_artifact_id": reviewed_artifact_id.to_string()}),
        )?;
        let attempts = increment_attempt(store, check_task_id)?;
        let cfg = RuntimeConfig::get()?;
        if attempts >= cfg.max_check_attempts_v2 as i32 {
            apply_error_outcome(store, plan_id, check_task_id, map_error_to_outcome(ErrorCode::MaxAttemptsExceeded))?;
            return Ok(CheckOutcome::Error {
                error_code: ErrorCode::MaxAttemptsExceeded,
                hint: "Contract mismatch repeatedly; open LLM Explorer / fix prompt schema.".into(),
            });
        }
        set_status(store, plan_id, check_task_id, TaskStatus::Ready, None)?;
        return Ok(CheckOutcome::Error { error_code: ErrorCode::ContractMismatch, hint: err.format_short() });
    }

    let total_score = normalized["total_score"].as_i64().unwrap_or(0);
    let action_required = normalized["action_required"].as_str().unwrap_or("MODIFY");
    let verdict = if action_required == "APPROVE" || total_score >= 90 { Verdict::Approved } else { Verdict::Rejected };

    let review = Review {
        review_id: argentor_core::ReviewId::new(),
        check_task_id,
        review_target_task_id: target_id,
        reviewed_artifact_id: Some(reviewed_artifact_id),
        reviewer: check.owner,
        total_score: total_score as i32,
        verdict,
        breakdown: normalized["breakdown"].clone(),
        suggestions: normalized["suggestions"].clone(),
        summary: normalized["summary"].as_str().unwrap_or("").to_string(),
        idempotency_key: key.clone(),
        created_at: utc_now(),
    };

    let inserted = store.insert_review_if_absent(&review)?;
    if inserted.is_none() {
        // Another writer won the race on this idempotency key between our
        // pre-check above and this insert; treat identically to the
        // pre-check hit.
        let existing = store
            .find_review_by_idempotency_key(&key)?
            .ok_or_else(|| OrchestratorError::Config("review vanished after constraint violation".into()))?;
        set_status(store, plan_id, check_task_id, TaskStatus::Ready, None)?;
        return Ok(CheckOutcome::AlreadyReviewed { review_id: existing.review_id.to_string() });
    }

    let stale = match verdict {
        Verdict::Approved => {
            let mut target_node = store.get_task_node(target_id)?;
            target_node.approved_artifact_id = Some(reviewed_artifact_id);
            let current_active = target_node.active_artifact_id;
            let is_stale = current_active.is_some_and(|id| id != reviewed_artifact_id);
            if is_stale {
                record_error(
                    store,
                    plan_id,
                    Some(target_id),
                    ErrorCode::StaleReview,
                    "Approved an older candidate while a newer candidate exists; ACTION still requires review of the latest artifact.",
                    json!({"approved_artifact_id": reviewed_artifact_id.to_string(), "current_active_artifact_id": current_active.map(|id| id.to_string())}),
                )?;
                target_node.status = TaskStatus::ReadyToCheck;
            } else {
                target_node.status = TaskStatus::Done;
            }
            store.update_task_node(&target_node)?;
            is_stale
        }
        Verdict::Rejected => {
            set_status(store, plan_id, target_id, TaskStatus::ToBeModify, None)?;
            false
        }
    };

    set_status(store, plan_id, check_task_id, TaskStatus::Done, None)?;

    Ok(CheckOutcome::Reviewed { verdict, review_target_task_id: target_id, reviewed_artifact_id, stale })
}

async fn handle_bad_output(store: &Store, plan_id: PlanId, check_task_id: TaskId, message: &str) -> OrchestratorResult<CheckOutcome> {
    record_error(store, plan_id, Some(check_task_id), ErrorCode::ReviewerBadOutput, message, json!({}))?;
    let attempts = increment_attempt(store, check_task_id)?;
    let cfg = RuntimeConfig::get()?;
    if attempts >= cfg.max_check_attempts_v2 as i32 {
        apply_error_outcome(store, plan_id, check_task_id, map_error_to_outcome(ErrorCode::MaxAttemptsExceeded))?;
        return Ok(CheckOutcome::Error {
            error_code: ErrorCode::MaxAttemptsExceeded,
            hint: "Reviewer output repeatedly invalid; please fix prompts/contracts.".into(),
        });
    }
    set_status(store, plan_id, check_task_id, TaskStatus::Ready, None)?;
    Ok(CheckOutcome::Error { error_code: ErrorCode::ReviewerBadOutput, hint: "Reviewer output invalid; will retry.".into() })
}

#[cfg(test)]
mod tests {
    use super::*;
    use argentor_agent::AgentResult;
    use argentor_core::{ArtifactFormat, Owner, Priority};
    use argentor_graph::{Artifact, Constraints, Plan, TaskNode};
    use async_trait::async_trait;
    use chrono::Utc;
    use tokio::sync::Mutex;

    struct ScriptedBackend {
        responses: Mutex<Vec<AgentResult<String>>>,
    }

    impl ScriptedBackend {
        fn new(responses: Vec<AgentResult<String>>) -> Self {
            Self { responses: Mutex::new(responses) }
        }
    }

    #[async_trait]
    impl LlmBackend for ScriptedBackend {
        async fn call(&self, _prompt: &str) -> AgentResult<String> {
            self.responses.lock().await.remove(0)
        }
        fn name(&self) -> &'static str {
            "scripted"
        }
    }

    struct Fixture {
        store: Store,
        plan_id: PlanId,
        action_id: TaskId,
        check_id: TaskId,
        artifact_id: ArtifactId,
        db_path: std::path::PathBuf,
        _dir: tempfile::TempDir,
    }

    fn setup() -> Fixture {
        RuntimeConfig::reset_for_test();
        let dir = tempfile::tempdir().unwrap();
        let db_path = dir.path().join("plan.db");
        let store = Store::open(&db_path).unwrap();
        let root_id = TaskId::new();
        let plan = Plan {
            plan_id: PlanId::new(),
            title: "demo".into(),
            owner: Owner::Executor,
            root_task_id: root_id,
            created_at: Utc::now(),
            constraints: Constraints { deadline: None, priority: Priority::Med },
        };
        store.insert_plan(&plan).unwrap();
        let mut root = TaskNode::new(plan.plan_id, NodeType::Goal, "root", Owner::Executor);
        root.task_id = root_id;
        store.insert_task_node(&root).unwrap();

        let mut action = TaskNode::new(plan.plan_id, NodeType::Action, "write report", Owner::Executor);
        action.status = TaskStatus::ReadyToCheck;
        let path = dir.path().join("report.md");
        std::fs::write(&path, "draft content").unwrap();
        let artifact = Artifact {
            artifact_id: ArtifactId::new(),
            task_id: action.task_id,
            name: "report.md".into(),
            path: path.display().to_string(),
            format: ArtifactFormat::Md,
            version: 1,
            sha256: "abc".into(),
            created_at: Utc::now(),
        };
        action.active_artifact_id = Some(artifact.artifact_id);
        store.insert_task_node(&action).unwrap();
        store.insert_artifact(&artifact).unwrap();

        let mut check = TaskNode::new(plan.plan_id, NodeType::Check, "review report", Owner::Reviewer);
        check.status = TaskStatus::Ready;
        check.review_target_task_id = Some(action.task_id);
        store.insert_task_node(&check).unwrap();

        Fixture {
            store,
            plan_id: plan.plan_id,
            action_id: action.task_id,
            check_id: check.task_id,
            artifact_id: artifact.artifact_id,
            db_path,
            _dir: dir,
        }
    }

    fn approve_payload() -> String {
        json!({
            "schema_version": "review_v1",
            "task_id": "x",
            "review_target": "NODE",
            "total_score": 95,
            "action_required": "APPROVE",
            "summary": "looks great",
            "breakdown": [{"dimension": "overall", "score": 95, "max_score": 100, "issues": []}],
            "suggestions": [],
        })
        .to_string()
    }

    #[tokio::test]
    async fn approved_review_marks_action_done_and_check_done() {
        let fx = setup();
        let backend = ScriptedBackend::new(vec![Ok(approve_payload())]);
        let outcome = run_check_once(&fx.store, fx.plan_id, fx.check_id, &backend).await.unwrap();
        match outcome {
            CheckOutcome::Reviewed { verdict, stale, .. } => {
                assert_eq!(verdict, Verdict::Approved);
                assert!(!stale);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let action = fx.store.get_task_node(fx.action_id).unwrap();
        assert_eq!(action.status, TaskStatus::Done);
        assert_eq!(action.approved_artifact_id, Some(fx.artifact_id));
        let check = fx.store.get_task_node(fx.check_id).unwrap();
        assert_eq!(check.status, TaskStatus::Done);
    }

    #[tokio::test]
    async fn rejected_review_sends_action_back_to_be_modified() {
        let fx = setup();
        let payload = json!({
            "schema_version": "review_v1",
            "task_id": "x",
            "review_target": "NODE",
            "total_score": 40,
            "action_required": "MODIFY",
            "summary": "needs work",
            "breakdown": [{"dimension": "overall", "score": 40, "max_score": 100, "issues": []}],
            "suggestions": [],
        })
        .to_string();
        let backend = ScriptedBackend::new(vec![Ok(payload)]);
        let outcome = run_check_once(&fx.store, fx.plan_id, fx.check_id, &backend).await.unwrap();
        assert!(matches!(outcome, CheckOutcome::Reviewed { verdict: Verdict::Rejected, .. }));
        let action = fx.store.get_task_node(fx.action_id).unwrap();
        assert_eq!(action.status, TaskStatus::ToBeModify);
    }

    #[tokio::test]
    async fn second_call_with_same_artifact_is_an_idempotent_no_op() {
        let fx = setup();
        let backend = ScriptedBackend::new(vec![Ok(approve_payload())]);
        run_check_once(&fx.store, fx.plan_id, fx.check_id, &backend).await.unwrap();

        // Re-open the CHECK for a second attempt against the same artifact.
        let mut check = fx.store.get_task_node(fx.check_id).unwrap();
        check.status = TaskStatus::Ready;
        fx.store.update_task_node(&check).unwrap();

        let backend2 = ScriptedBackend::new(vec![Ok(approve_payload())]);
        let outcome = run_check_once(&fx.store, fx.plan_id, fx.check_id, &backend2).await.unwrap();
        assert!(matches!(outcome, CheckOutcome::AlreadyReviewed { .. }));
    }

    #[tokio::test]
    async fn lock_not_acquired_when_check_is_not_ready() {
        let fx = setup();
        let mut check = fx.store.get_task_node(fx.check_id).unwrap();
        check.status = TaskStatus::Done;
        fx.store.update_task_node(&check).unwrap();

        let backend = ScriptedBackend::new(vec![]);
        let outcome = run_check_once(&fx.store, fx.plan_id, fx.check_id, &backend).await.unwrap();
        assert_eq!(outcome, CheckOutcome::SkippedLockNotAcquired);
    }

    #[tokio::test]
    async fn stale_review_keeps_action_at_ready_to_check_not_done() {
        let fx = setup();
        // The reviewer "mutates" the ACTION's active artifact to a newer
        // candidate before the approval is persisted, simulating a
        // concurrent executor round finishing mid-review.
        struct MutatingBackend {
            db_path: std::path::PathBuf,
            action_id: TaskId,
        }
        #[async_trait]
        impl LlmBackend for MutatingBackend {
            async fn call(&self, _prompt: &str) -> AgentResult<String> {
                let side_store = Store::open(&self.db_path).expect("open side connection");
                let mut action = side_store.get_task_node(self.action_id).unwrap();
                action.active_artifact_id = Some(ArtifactId::new());
                side_store.update_task_node(&action).unwrap();
                Ok(approve_payload())
            }
            fn name(&self) -> &'static str {
                "mutating"
            }
        }
        let backend = MutatingBackend { db_path: fx.db_path.clone(), action_id: fx.action_id };
        let outcome = run_check_once(&fx.store, fx.plan_id, fx.check_id, &backend).await.unwrap();
        match outcome {
            CheckOutcome::Reviewed { stale, reviewed_artifact_id, .. } => {
                assert!(stale);
                assert_eq!(reviewed_artifact_id, fx.artifact_id);
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        let action = fx.store.get_task_node(fx.action_id).unwrap();
        assert_eq!(action.status, TaskStatus::ReadyToCheck);
        assert_eq!(action.approved_artifact_id, Some(fx.artifact_id));

        let reviews = fx.store.list_reviews_for_target(fx.action_id).unwrap();
        assert_eq!(reviews.len(), 1);
        assert_eq!(reviews[0].reviewed_artifact_id, Some(fx.artifact_id));
    }
}
