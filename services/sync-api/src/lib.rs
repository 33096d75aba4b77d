mod cli;
mod commands;
mod infra;
mod routes;
mod server;

pub use commands::CommandStatus;
use membership_sync::error::AppError;

pub async fn run() -> Result<CommandStatus, AppError> {
    cli::run().await
}
