//! Restores the newest backup of the configured periodicity class.
//!
//! Every table of the target schema is dropped before the backup is loaded.

// dbvault/src/bin/db_restore.rs
use std::process::ExitCode;

use anyhow::{Context, Result};
use dbvault::cli::{failure_exit_code, init_tracing};
use dbvault::config::load_restore_config;
use dbvault::restore::{PgConnector, RestoreOutcome, run_restore_flow};
use dbvault::storage::S3ObjectStore;
use dbvault::tools::SystemRunner;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    match run_app().await {
        Ok(outcome) => {
            println!(
                "✅ Database restored from {}/{} ({} tables replaced).",
                outcome.namespace, outcome.record.key, outcome.dropped_tables
            );
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::from(failure_exit_code(&e))
        }
    }
}

async fn run_app() -> Result<RestoreOutcome> {
    let (app_config, restore_config) = load_restore_config(|key: &str| std::env::var(key).ok())
        .context("Failed to load configuration from environment")?;

    println!(
        "🔄 Starting restore of {} from {} backups...",
        app_config.database.name, app_config.periodicity
    );
    let store = S3ObjectStore::connect(&app_config.storage).await;
    let connector = PgConnector::new(&app_config.database);
    let outcome = run_restore_flow(&app_config, &restore_config, &store, &SystemRunner, &connector)
        .await
        .context("Restore process failed")?;
    Ok(outcome)
}
