//! Plan lifecycle, review gate v2, rewriter/convergence, deliverables,
//! and the bounded main loop that drives [`argentor_graph`]'s readiness
//! engine end to end.

pub mod config;
pub mod deliverables;
pub mod doctor;
pub mod engine;
pub mod error;
pub mod errors_runtime;
pub mod executor;
pub mod feasibility;
pub mod final_picker;
pub mod input_scan;
pub mod plan_workflow;
pub mod readiness;
pub mod reporting;
pub mod review_gate;
pub mod rewriter;
pub mod snapshot;

pub use config::RuntimeConfig;
pub use deliverables::{export_deliverables, ExportResult};
pub use doctor::{run_doctor, DoctorIssue};
pub use engine::{Orchestrator, ProgressCallback, RunSummary, StopReason};
pub use error::{OrchestratorError, OrchestratorResult};
pub use errors_runtime::{apply_error_outcome, increment_attempt, map_error_to_outcome, record_error, set_status, ErrorOutcome};
pub use executor::{run_executor_once, ExecutorOutcome};
pub use feasibility::{feasibility_check, FeasibilityReport, MissingEstimate, OverThreshold};
pub use final_picker::{pick_final_deliverable, FinalDeliverable};
pub use input_scan::{detect_removed_inputs, scan_inputs};
pub use plan_workflow::{generate_and_review_plan, PlanWorkflowResult};
pub use readiness::recompute_readiness_for_plan;
pub use reporting::{generate_plan_report, render_plan_report_md, PlanReport};
pub use review_gate::{run_check_once, CheckOutcome};
pub use rewriter::{apply_rewrite, converge_v2_plan, propose_rewrite, render_patch_plan_md, ConvergeResult, ConvergeStatus, Patch, PatchPlan, RewriteResult};
pub use snapshot::{get_plan_snapshot, render_snapshot_brief, render_snapshot_md, PlanSnapshot};
