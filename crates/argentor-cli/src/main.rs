//! CLI front-end for the workflow engine core (spec §6 "CLI surface").
//! Every subcommand is non-core per spec §1 — it is a thin operator
//! surface over `argentor-orchestrator`/`argentor-storage`, never a
//! place new engine logic lives. Grounded on `agentor-cli/src/main.rs`'s
//! clap/tracing-subscriber/config-loading shape, generalized from its
//! two subcommands to the fifteen named in spec §6.

mod cli_config;
mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "argentor", about = "Multi-agent workflow engine core — plan lifecycle, readiness/scheduling, review gate v2")]
struct Cli {
    /// SQLite database file the engine persists to.
    #[arg(long, global = true, default_value = "agentor.db")]
    db: PathBuf,

    /// Path to the `[model]` config (LLM provider settings).
    #[arg(long, global = true, default_value = "agentor.toml")]
    config: PathBuf,

    /// Workspace root for artifacts/reviews/required-docs/deliverables.
    #[arg(long, global = true, default_value = "workspace")]
    workspace: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a plan via PLAN_GEN/PLAN_REVIEW and persist it.
    CreatePlan {
        #[arg(long)]
        top_task: String,
        #[arg(long, default_value = "med")]
        priority: String,
        #[arg(long)]
        deadline: Option<String>,
        #[arg(long, default_value = "plans")]
        out_dir: PathBuf,
    },
    /// Drive a persisted plan's executor/check rounds to convergence.
    Run {
        #[arg(long)]
        plan_id: String,
    },
    /// Print the plan's status snapshot (report + doctor + feasibility).
    Status {
        #[arg(long)]
        plan_id: String,
        #[arg(long)]
        v2: bool,
        #[arg(long)]
        deliverables_dir: Option<PathBuf>,
        #[arg(long)]
        brief: bool,
    },
    /// List a plan's task_events log.
    Events {
        #[arg(long)]
        plan_id: String,
        #[arg(long)]
        task_id: Option<String>,
    },
    /// List a plan's recorded ERROR events.
    Errors {
        #[arg(long)]
        plan_id: String,
    },
    /// Run structural referential-integrity checks against the database.
    Doctor {
        #[arg(long)]
        plan_id: Option<String>,
    },
    /// Re-apply pending migrations and re-run doctor's checks.
    RepairDb,
    /// Export a plan's deliverables into a handoff-ready folder.
    Export {
        #[arg(long)]
        plan_id: String,
        #[arg(long)]
        out_dir: PathBuf,
        #[arg(long)]
        include_candidates: bool,
    },
    /// Print the plan's full status report.
    Report {
        #[arg(long)]
        plan_id: String,
        #[arg(long)]
        v2: bool,
    },
    /// Print the plan's one-page snapshot.
    Snapshot {
        #[arg(long)]
        plan_id: String,
        #[arg(long)]
        v2: bool,
        #[arg(long)]
        deliverables_dir: Option<PathBuf>,
    },
    /// Prune orphaned artifact folders under the workspace root.
    Cleanup {
        #[arg(long)]
        dry_run: bool,
    },
    /// Delete and recreate the database file.
    ResetDb {
        #[arg(long)]
        yes: bool,
    },
    /// Revert a plan's execution state back to freshly-planned.
    ResetToPlan {
        #[arg(long)]
        plan_id: String,
        #[arg(long)]
        yes: bool,
    },
    /// Propose (and optionally apply) the structural doctor/feasibility
    /// rewrite loop.
    Rewrite {
        #[arg(long)]
        plan_id: String,
        #[arg(long, default_value = "required_docs")]
        required_docs_dir: PathBuf,
        #[arg(long, default_value = "snapshots")]
        snapshot_dir: PathBuf,
        /// Run the full doctor -> feasibility -> apply convergence loop
        /// instead of a one-shot propose.
        #[arg(long)]
        apply: bool,
        /// With a one-shot propose, skip applying even if a patch exists.
        #[arg(long)]
        dry_run: bool,
    },
    /// Manage prompt templates.
    Prompt {
        #[command(subcommand)]
        action: PromptAction,
    },
}

#[derive(Subcommand)]
enum PromptAction {
    /// List the latest version of every registered prompt.
    List,
    /// Print one prompt's body.
    Show {
        #[arg(long)]
        name: String,
        #[arg(long)]
        version: Option<i64>,
    },
    /// Save a new version of a prompt.
    Set {
        #[arg(long)]
        name: String,
        /// Literal prompt body. Mutually exclusive with `--body-file`.
        #[arg(long)]
        body: Option<String>,
        /// Read the prompt body from a file.
        #[arg(long)]
        body_file: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .json()
        .init();

    let cli = Cli::parse();
    let code = dispatch(cli).await;
    std::process::exit(code);
}

async fn dispatch(cli: Cli) -> i32 {
    match cli.command {
        Commands::CreatePlan { top_task, priority, deadline, out_dir } => {
            commands::create_plan(&cli.db, &cli.config, &top_task, &priority, deadline, &out_dir).await
        }
        Commands::Run { plan_id } => commands::run(&cli.db, &cli.config, &cli.workspace, &plan_id).await,
        Commands::Status { plan_id, v2, deliverables_dir, brief } => {
            commands::status(&cli.db, &plan_id, v2, deliverables_dir.as_deref(), brief)
        }
        Commands::Events { plan_id, task_id } => commands::events(&cli.db, &plan_id, task_id.as_deref()),
        Commands::Errors { plan_id } => commands::errors(&cli.db, &plan_id),
        Commands::Doctor { plan_id } => commands::doctor(&cli.db, plan_id.as_deref()),
        Commands::RepairDb => commands::repair_db(&cli.db),
        Commands::Export { plan_id, out_dir, include_candidates } => {
            commands::export(&cli.db, &plan_id, &out_dir, include_candidates)
        }
        Commands::Report { plan_id, v2 } => commands::report(&cli.db, &plan_id, v2),
        Commands::Snapshot { plan_id, v2, deliverables_dir } => {
            commands::snapshot(&cli.db, &plan_id, v2, deliverables_dir.as_deref())
        }
        Commands::Cleanup { dry_run } => commands::cleanup(&cli.db, &cli.workspace, dry_run),
        Commands::ResetDb { yes } => commands::reset_db(&cli.db, yes),
        Commands::ResetToPlan { plan_id, yes } => commands::reset_to_plan(&cli.db, &plan_id, yes),
        Commands::Rewrite { plan_id, required_docs_dir, snapshot_dir, apply, dry_run } => {
            commands::rewrite(&cli.db, &plan_id, &required_docs_dir, &snapshot_dir, apply, dry_run)
        }
        Commands::Prompt { action } => match action {
            PromptAction::List => commands::prompt_list(&cli.db),
            PromptAction::Show { name, version } => commands::prompt_show(&cli.db, &name, version),
            PromptAction::Set { name, body, body_file } => match resolve_body(body, body_file) {
                Ok(body) => commands::prompt_set(&cli.db, &name, body),
                Err(code) => code,
            },
        },
    }
}

fn resolve_body(body: Option<String>, body_file: Option<PathBuf>) -> Result<String, i32> {
    match (body, body_file) {
        (Some(b), None) => Ok(b),
        (None, Some(path)) => std::fs::read_to_string(&path).map_err(|e| {
            eprintln!("failed to read {}: {e}", path.display());
            2
        }),
        (None, None) => {
            eprintln!("prompt set requires --body or --body-file");
            Err(2)
        }
        (Some(_), Some(_)) => {
            eprintln!("prompt set takes only one of --body or --body-file");
            Err(2)
        }
    }
}
