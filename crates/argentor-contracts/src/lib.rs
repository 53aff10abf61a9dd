//! Bidirectional coercion and strict validation of the three LLM output
//! contracts used by the workflow engine (spec §4.1): TASK_ACTION
//! (executor output), PLAN_GEN (planner output), and TASK_CHECK /
//! PLAN_REVIEW (reviewer output, discriminated by `review_target`).
//!
//! `normalize_and_validate` is deterministic and side-effect-free: it
//! never calls the LLM, filesystem, or database.

mod error;
mod plan_gen;
mod review;
mod task_action;
mod util;

pub use error::{infer_error_from_reason, ContractError};

use serde_json::Value;
use std::fmt;

/// The three contracts named in spec §4.1, with `TaskCheck`/`PlanReview`
/// sharing the same `review_v1` payload shape discriminated by
/// `review_target`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractName {
    TaskAction,
    PlanGen,
    TaskCheck,
    PlanReview,
}

impl fmt::Display for ContractName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ContractName::TaskAction => "TASK_ACTION",
            ContractName::PlanGen => "PLAN_GEN",
            ContractName::TaskCheck => "TASK_CHECK",
            ContractName::PlanReview => "PLAN_REVIEW",
        };
        write!(f, "{s}")
    }
}

impl ContractName {
    pub fn schema_version(self) -> &'static str {
        match self {
            ContractName::TaskAction => task_action::SCHEMA_VERSION,
            ContractName::PlanGen => plan_gen::SCHEMA_VERSION,
            ContractName::TaskCheck | ContractName::PlanReview => review::SCHEMA_VERSION,
        }
    }
}

/// Context a contract's normalize/validate pass needs beyond the raw
/// object: the task this output is attached to, a review's target kind,
/// the original top-level task text (PLAN_GEN only), and a timestamp
/// source (PLAN_GEN only, injected so this crate stays free of wall-clock
/// calls of its own).
#[derive(Debug, Clone, Default)]
pub struct ContractContext<'a> {
    pub task_id: &'a str,
    pub top_task: &'a str,
    pub now_iso: &'a str,
}

/// Normalizes `raw_obj` for `contract` and validates the result. Returns
/// the normalized object on success, or the object alongside a structured
/// [`ContractError`] on failure — the normalized object is still returned
/// so the caller can inspect what survived repair.
pub fn normalize_and_validate(
    contract: ContractName,
    mut raw_obj: Value,
    context: &ContractContext<'_>,
) -> (Value, Option<ContractError>) {
    let schema = contract.to_string();
    let schema_version = contract.schema_version();

    let reason = match contract {
        ContractName::TaskAction => {
            task_action::normalize(&mut raw_obj, context.task_id);
            task_action::validate(&raw_obj).err()
        }
        ContractName::PlanGen => {
            plan_gen::normalize(&mut raw_obj, context.top_task, context.now_iso);
            plan_gen::validate(&raw_obj).err()
        }
        ContractName::TaskCheck => {
            review::normalize(&mut raw_obj, context.task_id, "NODE");
            review::validate(&raw_obj, "NODE").err()
        }
        ContractName::PlanReview => {
            review::normalize(&mut raw_obj, context.task_id, "PLAN");
            review::validate(&raw_obj, "PLAN").err()
        }
    };

    match reason {
        None => (raw_obj, None),
        Some(reason) => {
            let err = infer_error_from_reason(&reason, &schema, schema_version);
            (raw_obj, Some(err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn task_action_round_trips_a_noop() {
        let ctx = ContractContext {
            task_id: "t1",
            ..Default::default()
        };
        let (obj, err) = normalize_and_validate(ContractName::TaskAction, json!({"result_type": "noop"}), &ctx);
        assert!(err.is_none());
        assert_eq!(obj["result_type"], "NOOP");
    }

    #[test]
    fn task_action_artifact_bad_format_produces_contract_error() {
        let ctx = ContractContext {
            task_id: "t1",
            ..Default::default()
        };
        let raw = json!({"result_type": "ARTIFACT", "artifact": {"name": "a", "format": "pdf", "content": "x"}});
        let (_, err) = normalize_and_validate(ContractName::TaskAction, raw, &ctx);
        let err = err.expect("pdf is not an allowed artifact format");
        assert_eq!(err.error_code, "SCHEMA_MISMATCH");
        assert_eq!(err.json_path, "$.artifact.format");
    }

    #[test]
    fn plan_gen_normalizes_a_bare_goal_statement_into_a_full_plan() {
        let ctx = ContractContext {
            top_task: "Write the quarterly report",
            now_iso: "2026-01-01T00:00:00.000Z",
            ..Default::default()
        };
        let raw = json!({"nodes": [{"task_id": "root", "node_type": "GOAL", "title": "root"}]});
        let (obj, err) = normalize_and_validate(ContractName::PlanGen, raw, &ctx);
        assert!(err.is_none(), "{err:?}");
        assert_eq!(obj["nodes"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn task_check_rejects_wrong_review_target() {
        let ctx = ContractContext {
            task_id: "t1",
            ..Default::default()
        };
        let raw = json!({"task_id": "t1", "total_score": 50, "review_target": "PLAN"});
        let (_, err) = normalize_and_validate(ContractName::TaskCheck, raw, &ctx);
        let err = err.expect("review_target PLAN should mismatch TaskCheck's NODE");
        assert_eq!(err.error_code, "SCHEMA_MISMATCH");
    }
}
