//! Periodic database backup.
//!
//! Intended for cron: run it as often as the shortest class interval, each
//! invocation only backs up when its periodicity class is due.

// dbvault/src/bin/db_backup.rs
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::Utc;
use dbvault::backup::{BackupOutcome, run_backup_flow};
use dbvault::cli::{EXIT_NOT_DUE, failure_exit_code, init_tracing};
use dbvault::config::load_backup_config;
use dbvault::storage::S3ObjectStore;
use dbvault::tools::SystemRunner;

#[tokio::main]
async fn main() -> ExitCode {
    dotenv::dotenv().ok();
    init_tracing();

    match run_app().await {
        Ok(BackupOutcome::Completed { namespace, key, pruned }) => {
            println!(
                "✅ Backup {} stored in {} ({} old backups deleted).",
                key,
                namespace,
                pruned.len()
            );
            ExitCode::SUCCESS
        }
        Ok(BackupOutcome::NotDue {
            namespace,
            last_backup,
            next_due,
        }) => {
            println!(
                "⏳ Too early for a new backup in {}: last one at {}, next due at {}.",
                namespace,
                last_backup.to_rfc3339(),
                next_due.to_rfc3339()
            );
            ExitCode::from(EXIT_NOT_DUE)
        }
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::from(failure_exit_code(&e))
        }
    }
}

async fn run_app() -> Result<BackupOutcome> {
    let (app_config, backup_config) = load_backup_config(|key: &str| std::env::var(key).ok())
        .context("Failed to load configuration from environment")?;

    println!(
        "🚀 Starting {} backup of {}...",
        app_config.periodicity, app_config.database.name
    );
    let store = S3ObjectStore::connect(&app_config.storage).await;
    let outcome = run_backup_flow(&app_config, &backup_config, &store, &SystemRunner, Utc::now())
        .await
        .context("Backup process failed")?;
    Ok(outcome)
}
