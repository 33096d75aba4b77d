use crate::commands::{run_migrate, run_reconcile, CommandStatus, MigrateArgs, ReconcileArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use membership_sync::config::AppConfig;
use membership_sync::error::AppError;
use membership_sync::telemetry;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "membership-sync",
    about = "Reconcile membership applications against the users table",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Run one reconciliation pass and print the tally
    Reconcile(ReconcileArgs),
    /// Apply additive schema migrations
    Migrate(MigrateArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Override the configured SQLite database path
    #[arg(long)]
    pub(crate) database: Option<PathBuf>,
}

pub(crate) async fn run() -> Result<CommandStatus, AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    let config = AppConfig::load()?;
    telemetry::init(&config.telemetry)?;

    match command {
        Command::Serve(args) => server::run(config, args)
            .await
            .map(|()| CommandStatus::Success),
        Command::Reconcile(args) => run_reconcile(&config, args).await,
        Command::Migrate(args) => run_migrate(&config, args),
    }
}
