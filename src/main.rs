use clap::Parser;
use std::{io, process::ExitCode};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use config::{AppConfig, Cli};
use errors::AppError;
use services::storage_service::LocalStorage;

#[tokio::main]
async fn main() -> ExitCode {
    // --- Logging setup (stderr, so command output stays clean) ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::debug!("command failed with exit code {}: {}", err.code, err);
            eprintln!("Error: {}", err);
            err.exit_code()
        }
    }
}

async fn run(cli: Cli) -> Result<(), AppError> {
    // --- Resolve config: flag > env > file > default ---
    let cfg = AppConfig::load(&cli)?;
    tracing::debug!("Resolved config: {:?}", cfg);

    // --- One storage handle, passed to every command ---
    let storage = LocalStorage::new(&cfg.data_dir).with_options(cfg.storage);
    tracing::debug!(
        "Using data directory {} (chunk size {}, pipe depth {})",
        storage.base_path.display(),
        storage.options().chunk_size,
        storage.options().pipe_depth
    );

    let mut stdout = io::stdout().lock();
    routes::dispatch(&storage, cli.command, &mut stdout).await
}
