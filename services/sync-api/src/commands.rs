use crate::infra::{build_engine, open_existing_store, open_or_create_store, SqliteEngine};
use clap::Args;
use membership_sync::config::AppConfig;
use membership_sync::error::AppError;
use membership_sync::membership::{
    CancellationFlag, MigrationReport, ReconciliationPlan, ReconciliationTally,
};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{info, warn};

#[derive(Args, Debug, Default)]
pub(crate) struct ReconcileArgs {
    /// Override the configured SQLite database path
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// Report what would be created without writing anything
    #[arg(long)]
    pub(crate) dry_run: bool,
}

#[derive(Args, Debug, Default)]
pub(crate) struct MigrateArgs {
    /// Override the configured SQLite database path
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
    /// Create the users and membership_applications tables when they are missing
    #[arg(long)]
    pub(crate) init_schema: bool,
}

/// How a command finished, mapped onto the process exit code by `main`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandStatus {
    Success,
    /// The pass ran but some users could not be processed.
    RowFailures,
}

impl CommandStatus {
    pub fn exit_code(self) -> ExitCode {
        match self {
            CommandStatus::Success => ExitCode::SUCCESS,
            CommandStatus::RowFailures => ExitCode::FAILURE,
        }
    }

    /// An interrupted pass is not an error by itself; only failed rows are.
    fn from_tally(tally: &ReconciliationTally) -> Self {
        if tally.has_failures() {
            CommandStatus::RowFailures
        } else {
            CommandStatus::Success
        }
    }
}

pub(crate) async fn run_reconcile(
    config: &AppConfig,
    args: ReconcileArgs,
) -> Result<CommandStatus, AppError> {
    let path = args.database.unwrap_or_else(|| config.database.path.clone());
    let store = open_existing_store(&path)?;
    let engine = Arc::new(build_engine(config, store));

    if args.dry_run {
        let plan = tokio::task::spawn_blocking(move || engine.plan())
            .await
            .map_err(join_error)??;
        for line in render_plan(&plan) {
            println!("{line}");
        }
        return Ok(CommandStatus::Success);
    }

    let flag = CancellationFlag::new();
    let pass = {
        let flag = flag.clone();
        tokio::task::spawn_blocking(move || run_pass(&engine, &flag))
    };
    let watcher = tokio::spawn(cancel_on_interrupt(flag));

    let tally = pass.await.map_err(join_error)??;
    watcher.abort();

    for line in render_tally(&tally) {
        println!("{line}");
    }
    Ok(CommandStatus::from_tally(&tally))
}

pub(crate) fn run_migrate(
    config: &AppConfig,
    args: MigrateArgs,
) -> Result<CommandStatus, AppError> {
    let path = args.database.unwrap_or_else(|| config.database.path.clone());
    let store = if args.init_schema {
        let store = open_or_create_store(&path)?;
        store.initialize_schema()?;
        info!(path = %path.display(), "base schema ensured");
        store
    } else {
        open_existing_store(&path)?
    };

    let reports = store.apply_migrations()?;
    for line in render_migrations(&reports) {
        println!("{line}");
    }
    Ok(CommandStatus::Success)
}

fn run_pass(
    engine: &SqliteEngine,
    flag: &CancellationFlag,
) -> Result<ReconciliationTally, AppError> {
    Ok(engine.run_until(flag)?)
}

async fn cancel_on_interrupt(flag: CancellationFlag) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("interrupt received; stopping after the current user");
            flag.cancel();
        }
        Err(err) => warn!(error = %err, "unable to listen for interrupt signal"),
    }
}

fn join_error(err: tokio::task::JoinError) -> AppError {
    AppError::Io(std::io::Error::other(err))
}

pub(crate) fn render_tally(tally: &ReconciliationTally) -> Vec<String> {
    let mut lines = vec![
        "Membership reconciliation".to_string(),
        format!("  Created:          {}", tally.created),
        format!("  Already existing: {}", tally.already_existing),
        format!("  Ineligible:       {}", tally.ineligible),
        format!("  Failed:           {}", tally.failed),
    ];
    if !tally.failed_user_ids.is_empty() {
        let ids: Vec<String> = tally
            .failed_user_ids
            .iter()
            .map(ToString::to_string)
            .collect();
        lines.push(format!("  Failed users:     {}", ids.join(", ")));
    }
    if tally.cancelled {
        lines.push("  Pass cancelled before every user was visited".to_string());
    }
    lines
}

pub(crate) fn render_plan(plan: &ReconciliationPlan) -> Vec<String> {
    let projected = plan.projected_tally();
    let mut lines = vec![
        "Membership reconciliation (dry run)".to_string(),
        format!("  Would create:     {}", projected.created),
        format!("  Already existing: {}", projected.already_existing),
        format!("  Ineligible:       {}", projected.ineligible),
    ];
    if !plan.to_create.is_empty() {
        let ids: Vec<String> = plan.to_create.iter().map(ToString::to_string).collect();
        lines.push(format!("  Users to enrol:   {}", ids.join(", ")));
    }
    if !plan.duplicate_owners.is_empty() {
        let ids: Vec<String> = plan
            .duplicate_owners
            .iter()
            .map(ToString::to_string)
            .collect();
        lines.push(format!("  Duplicate owners: {}", ids.join(", ")));
    }
    lines
}

fn render_migrations(reports: &[MigrationReport]) -> Vec<String> {
    reports
        .iter()
        .map(|report| format!("{}: {}", report.name, report.outcome))
        .collect()
}
