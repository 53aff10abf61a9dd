//! One function per CLI subcommand (spec §6 "CLI surface"). Each returns
//! an [`i32`] exit code directly (0 success, 1 graceful failure, 2 usage/
//! config error) rather than a `Result`, since a usage problem and a
//! "ran fine but found issues" outcome both need to reach `main` as plain
//! process exit codes, not as an error type.

use crate::cli_config;
use argentor_core::{BlockedReason, PlanId, TaskId, TaskStatus};
use argentor_graph::Constraints;
use argentor_orchestrator::{
    apply_rewrite, converge_v2_plan, export_deliverables, generate_and_review_plan, get_plan_snapshot,
    propose_rewrite, recompute_readiness_for_plan, render_patch_plan_md, render_plan_report_md,
    render_snapshot_brief, render_snapshot_md, run_doctor, Orchestrator,
};
use argentor_skills::{SkillRegistry, TextExtractSkill};
use argentor_storage::Store;
use std::path::Path;
use std::sync::Arc;

const EXIT_OK: i32 = 0;
const EXIT_ISSUES: i32 = 1;
const EXIT_USAGE: i32 = 2;

fn parse_plan_id(raw: &str) -> Result<PlanId, i32> {
    PlanId::parse(raw).map_err(|e| {
        eprintln!("invalid plan id {raw:?}: {e}");
        EXIT_USAGE
    })
}

fn parse_task_id(raw: &str) -> Result<TaskId, i32> {
    TaskId::parse(raw).map_err(|e| {
        eprintln!("invalid task id {raw:?}: {e}");
        EXIT_USAGE
    })
}

fn open_store(db_path: &Path) -> Result<Store, i32> {
    Store::open(db_path).map_err(|e| {
        eprintln!("failed to open database {}: {e}", db_path.display());
        EXIT_USAGE
    })
}

fn registry() -> Arc<SkillRegistry> {
    let mut reg = SkillRegistry::new();
    reg.register(Arc::new(TextExtractSkill::default()));
    Arc::new(reg)
}

fn priority_from_str(raw: &str) -> Result<argentor_core::Priority, i32> {
    match raw.to_ascii_lowercase().as_str() {
        "low" => Ok(argentor_core::Priority::Low),
        "med" | "medium" => Ok(argentor_core::Priority::Med),
        "high" => Ok(argentor_core::Priority::High),
        other => {
            eprintln!("invalid priority {other:?}, expected low|med|high");
            Err(EXIT_USAGE)
        }
    }
}

pub async fn create_plan(
    db_path: &Path,
    cli_config_path: &Path,
    top_task: &str,
    priority: &str,
    deadline: Option<String>,
    out_dir: &Path,
) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let priority = match priority_from_str(priority) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let cfg = match cli_config::load(cli_config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };
    let backend = cli_config::build_backend(cfg.model);
    let constraints = Constraints { deadline, priority };

    match generate_and_review_plan(&store, top_task, constraints, backend.as_ref(), out_dir).await {
        Ok(result) => {
            println!("plan_id: {}", result.plan_id);
            println!("plan_path: {}", result.plan_path.display());
            println!("total_score: {}", result.total_score);
            println!("review_summary: {}", result.review_summary);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("create-plan failed: {e}");
            EXIT_ISSUES
        }
    }
}

pub async fn run(db_path: &Path, cli_config_path: &Path, workspace_root: &Path, plan_id: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let cfg = match cli_config::load(cli_config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("{e}");
            return EXIT_USAGE;
        }
    };
    let backend = cli_config::build_backend(cfg.model);
    let orchestrator = Orchestrator::new(store, registry(), backend, workspace_root.to_path_buf())
        .with_progress(|msg| println!("{msg}"));

    match orchestrator.run_plan(plan_id).await {
        Ok(summary) => {
            println!(
                "rounds={} llm_calls={} executor_outcomes={} check_outcomes={} stop_reason={:?}",
                summary.rounds, summary.llm_calls, summary.executor_outcomes, summary.check_outcomes, summary.stop_reason
            );
            EXIT_OK
        }
        Err(e) => {
            eprintln!("run failed: {e}");
            EXIT_ISSUES
        }
    }
}

pub fn status(db_path: &Path, plan_id: &str, v2: bool, deliverables_dir: Option<&Path>, brief: bool) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };
    match get_plan_snapshot(&store, plan_id, v2, deliverables_dir) {
        Ok(snapshot) => {
            let has_issues = !snapshot.doctor_ok || snapshot.feasibility.as_ref().is_some_and(|f| !f.ok);
            if brief {
                println!("{}", render_snapshot_brief(&snapshot));
            } else {
                println!("{}", render_snapshot_md(&snapshot));
            }
            if has_issues {
                EXIT_ISSUES
            } else {
                EXIT_OK
            }
        }
        Err(e) => {
            eprintln!("status failed: {e}");
            EXIT_USAGE
        }
    }
}

pub fn events(db_path: &Path, plan_id: &str, task_id: Option<&str>) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let task_filter = match task_id.map(parse_task_id).transpose() {
        Ok(t) => t,
        Err(code) => return code,
    };
    match store.list_events(plan_id) {
        Ok(rows) => {
            for row in rows.iter().filter(|e| task_filter.map_or(true, |t| e.task_id == Some(t))) {
                println!(
                    "{} {} {} {}",
                    row.created_at.to_rfc3339(),
                    row.event_type,
                    row.task_id.map(|t| t.to_string()).unwrap_or_default(),
                    row.payload
                );
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("events failed: {e}");
            EXIT_USAGE
        }
    }
}

pub fn errors(db_path: &Path, plan_id: &str) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };
    match store.list_events(plan_id) {
        Ok(rows) => {
            let error_rows: Vec<_> = rows.iter().filter(|e| e.event_type == "ERROR").collect();
            for row in &error_rows {
                println!(
                    "{} task={} {}",
                    row.created_at.to_rfc3339(),
                    row.task_id.map(|t| t.to_string()).unwrap_or_default(),
                    row.payload
                );
            }
            if error_rows.is_empty() {
                EXIT_OK
            } else {
                EXIT_ISSUES
            }
        }
        Err(e) => {
            eprintln!("errors failed: {e}");
            EXIT_USAGE
        }
    }
}

pub fn doctor(db_path: &Path, plan_id: Option<&str>) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let issues = run_doctor(&store, plan_id);
    if issues.is_empty() {
        println!("doctor: no issues found");
        EXIT_OK
    } else {
        for issue in &issues {
            println!("{}: {}", issue.code, issue.message);
        }
        EXIT_ISSUES
    }
}

pub fn repair_db(db_path: &Path) -> i32 {
    // `Store::open` applies every pending migration idempotently (spec
    // §6 "migrations tolerate duplicate-column errors"), so opening the
    // database back up *is* the repair.
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let issues = run_doctor(&store, None);
    println!("migrations applied; {} structural issue(s) remain", issues.len());
    for issue in &issues {
        println!("{}: {}", issue.code, issue.message);
    }
    if issues.is_empty() {
        EXIT_OK
    } else {
        EXIT_ISSUES
    }
}

pub fn export(db_path: &Path, plan_id: &str, out_dir: &Path, include_candidates: bool) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };
    match export_deliverables(&store, plan_id, out_dir, include_candidates) {
        Ok(result) => {
            println!("exported {} file(s) to {}", result.files_copied, result.out_dir.display());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("export failed: {e}");
            EXIT_ISSUES
        }
    }
}

pub fn report(db_path: &Path, plan_id: &str, v2: bool) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };
    match argentor_orchestrator::generate_plan_report(&store, plan_id, v2) {
        Ok(rep) => {
            let has_issues = !rep.blocked.is_empty() || !rep.failed.is_empty();
            println!("{}", render_plan_report_md(&rep));
            if has_issues {
                EXIT_ISSUES
            } else {
                EXIT_OK
            }
        }
        Err(e) => {
            eprintln!("report failed: {e}");
            EXIT_USAGE
        }
    }
}

pub fn snapshot(db_path: &Path, plan_id: &str, v2: bool, deliverables_dir: Option<&Path>) -> i32 {
    status(db_path, plan_id, v2, deliverables_dir, false)
}

/// Prunes `workspace_root/artifacts/<task_id>` directories whose task no
/// longer exists in any plan's graph. Deliberately minimal: the full
/// reset/cleanup drill utilities are named as external collaborators
/// (spec §1 Non-goals), this just keeps a long-lived workspace from
/// accumulating orphaned artifact folders.
pub fn cleanup(db_path: &Path, workspace_root: &Path, dry_run: bool) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let mut live_task_ids = std::collections::HashSet::new();
    let plans = match store.list_plans() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("cleanup failed: {e}");
            return EXIT_USAGE;
        }
    };
    for plan in &plans {
        match store.list_task_nodes(plan.plan_id) {
            Ok(nodes) => live_task_ids.extend(nodes.iter().map(|n| n.task_id.to_string())),
            Err(e) => {
                eprintln!("cleanup failed listing plan {}: {e}", plan.plan_id);
                return EXIT_USAGE;
            }
        }
    }

    let artifacts_dir = workspace_root.join("artifacts");
    let mut removed = 0usize;
    if let Ok(entries) = std::fs::read_dir(&artifacts_dir) {
        for entry in entries.flatten() {
            let Some(name) = entry.file_name().to_str().map(str::to_string) else { continue };
            if live_task_ids.contains(&name) {
                continue;
            }
            removed += 1;
            if dry_run {
                println!("would remove {}", entry.path().display());
            } else {
                println!("removing {}", entry.path().display());
                let _ = std::fs::remove_dir_all(entry.path());
            }
        }
    }
    println!("{}{} orphaned artifact folder(s)", if dry_run { "would remove " } else { "removed " }, removed);
    EXIT_OK
}

pub fn reset_db(db_path: &Path, yes: bool) -> i32 {
    if !yes {
        eprintln!("reset-db deletes {} entirely; pass --yes to confirm", db_path.display());
        return EXIT_USAGE;
    }
    if db_path.exists() {
        if let Err(e) = std::fs::remove_file(db_path) {
            eprintln!("reset-db failed: {e}");
            return EXIT_USAGE;
        }
    }
    match Store::open(db_path) {
        Ok(_) => {
            println!("database reset: {}", db_path.display());
            EXIT_OK
        }
        Err(e) => {
            eprintln!("reset-db failed to recreate database: {e}");
            EXIT_USAGE
        }
    }
}

/// Reverts every task node in `plan_id` back to its freshly-planned state
/// (PENDING, no blocked reason, no attempts spent, full branch
/// participation), clears its per-error-code counters, and re-runs the
/// readiness engine, so the plan can be driven by `run` again from
/// scratch. Review/artifact/event history is left in place as an audit
/// trail.
pub fn reset_to_plan(db_path: &Path, plan_id: &str, yes: bool) -> i32 {
    if !yes {
        eprintln!("reset-to-plan discards in-progress execution state for {plan_id}; pass --yes to confirm");
        return EXIT_USAGE;
    }
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };
    let nodes = match store.list_task_nodes(plan_id) {
        Ok(n) => n,
        Err(e) => {
            eprintln!("reset-to-plan failed: {e}");
            return EXIT_USAGE;
        }
    };
    for mut node in nodes {
        node.status = TaskStatus::Pending;
        node.blocked_reason = None::<BlockedReason>;
        node.attempt_count = 0;
        node.active_branch = true;
        node.active_artifact_id = None;
        node.approved_artifact_id = None;
        if let Err(e) = store.update_task_node(&node) {
            eprintln!("reset-to-plan failed updating {}: {e}", node.task_id);
            return EXIT_USAGE;
        }
        if let Err(e) = store.reset_error_counters_for_task(node.task_id) {
            eprintln!("reset-to-plan failed clearing error counters for {}: {e}", node.task_id);
            return EXIT_USAGE;
        }
    }
    match recompute_readiness_for_plan(&store, plan_id) {
        Ok(changed) => {
            println!("reset {plan_id} to its planned state; readiness recompute changed {changed} node(s)");
            EXIT_OK
        }
        Err(e) => {
            eprintln!("reset-to-plan readiness recompute failed: {e}");
            EXIT_ISSUES
        }
    }
}

pub fn rewrite(db_path: &Path, plan_id: &str, required_docs_dir: &Path, snapshot_dir: &Path, apply: bool, dry_run: bool) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let plan_id = match parse_plan_id(plan_id) {
        Ok(p) => p,
        Err(code) => return code,
    };

    if apply {
        let cfg = match argentor_orchestrator::RuntimeConfig::get() {
            Ok(c) => c,
            Err(e) => {
                eprintln!("rewrite failed loading runtime config: {e}");
                return EXIT_USAGE;
            }
        };
        match converge_v2_plan(&store, plan_id, cfg.max_plan_attempts.max(1), required_docs_dir, snapshot_dir) {
            Ok(result) => {
                println!("converge rounds={} status={:?}", result.rounds, result.status);
                if let Some(path) = &result.required_docs_path {
                    println!("required docs written to {}", path.display());
                }
                match result.status {
                    argentor_orchestrator::ConvergeStatus::Ok => EXIT_OK,
                    argentor_orchestrator::ConvergeStatus::RequestExternalInput => EXIT_ISSUES,
                }
            }
            Err(e) => {
                eprintln!("rewrite failed: {e}");
                EXIT_ISSUES
            }
        }
    } else {
        match propose_rewrite(&store, plan_id) {
            Ok(patch_plan) => {
                println!("{}", render_patch_plan_md(&patch_plan));
                let has_patches = !patch_plan.patches.is_empty();
                if dry_run || !has_patches {
                    return if has_patches { EXIT_ISSUES } else { EXIT_OK };
                }
                match apply_rewrite(&store, &patch_plan, snapshot_dir, false) {
                    Ok(result) => {
                        if let Some(path) = &result.snapshot_path {
                            println!("snapshot written to {}", path.display());
                        }
                        EXIT_OK
                    }
                    Err(e) => {
                        eprintln!("rewrite apply failed: {e}");
                        EXIT_ISSUES
                    }
                }
            }
            Err(e) => {
                eprintln!("rewrite failed: {e}");
                EXIT_USAGE
            }
        }
    }
}

pub fn prompt_list(db_path: &Path) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    match store.list_latest_prompts() {
        Ok(prompts) => {
            if prompts.is_empty() {
                println!("no prompts registered");
            }
            for p in &prompts {
                println!("{} v{} ({} byte body)", p.name, p.version, p.body.len());
            }
            EXIT_OK
        }
        Err(e) => {
            eprintln!("prompt list failed: {e}");
            EXIT_USAGE
        }
    }
}

pub fn prompt_show(db_path: &Path, name: &str, version: Option<i64>) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    let found = match version {
        Some(v) => store.get_prompt_version(name, v),
        None => store.latest_prompt(name),
    };
    match found {
        Ok(Some(p)) => {
            println!("{} v{} (created {})", p.name, p.version, p.created_at.to_rfc3339());
            println!("{}", p.body);
            EXIT_OK
        }
        Ok(None) => {
            eprintln!("no prompt named {name:?} found");
            EXIT_ISSUES
        }
        Err(e) => {
            eprintln!("prompt show failed: {e}");
            EXIT_USAGE
        }
    }
}

/// Registers a new prompt version, reusing the current one instead of
/// minting a new version when `body` is unchanged (spec §2 "Prompt
/// versioning" — content-addressed dedup from `core/prompt_store.py`).
pub fn prompt_set(db_path: &Path, name: &str, body: String) -> i32 {
    let store = match open_store(db_path) {
        Ok(s) => s,
        Err(code) => return code,
    };
    match store.register_prompt(name, &body) {
        Ok(prompt) => {
            println!("{} v{} saved", prompt.name, prompt.version);
            EXIT_OK
        }
        Err(e) => {
            eprintln!("prompt set failed: {e}");
            EXIT_ISSUES
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_from_str_accepts_documented_spellings() {
        assert!(priority_from_str("low").is_ok());
        assert!(priority_from_str("Med").is_ok());
        assert!(priority_from_str("HIGH").is_ok());
        assert!(priority_from_str("urgent").is_err());
    }

    #[test]
    fn parse_plan_id_rejects_non_uuid_input() {
        assert_eq!(parse_plan_id("not-a-uuid"), Err(EXIT_USAGE));
    }

    #[test]
    fn cleanup_reports_zero_when_workspace_has_no_artifacts_dir() {
        let db = tempfile::NamedTempFile::new().unwrap();
        let ws = tempfile::tempdir().unwrap();
        let code = cleanup(db.path(), ws.path(), true);
        assert_eq!(code, EXIT_OK);
    }

    #[test]
    fn reset_db_without_yes_flag_refuses_and_returns_usage_error() {
        let db = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(reset_db(db.path(), false), EXIT_USAGE);
    }

    #[test]
    fn prompt_round_trips_through_set_list_show() {
        let db = tempfile::NamedTempFile::new().unwrap();
        let path = db.path();
        assert_eq!(prompt_set(path, "plan_gen", "v1 body".into()), EXIT_OK);
        assert_eq!(prompt_set(path, "plan_gen", "v2 body".into()), EXIT_OK);
        assert_eq!(prompt_list(path), EXIT_OK);
        assert_eq!(prompt_show(path, "plan_gen", None), EXIT_OK);
        assert_eq!(prompt_show(path, "plan_gen", Some(1)), EXIT_OK);
        assert_eq!(prompt_show(path, "missing", None), EXIT_ISSUES);
    }

    #[test]
    fn doctor_on_fresh_database_finds_no_issues() {
        let db = tempfile::NamedTempFile::new().unwrap();
        assert_eq!(doctor(db.path(), None), EXIT_OK);
    }
}
