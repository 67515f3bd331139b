// dbvault/src/restore/mod.rs
pub(crate) mod db_restore;
pub(crate) mod decrypt;

use crate::artifact::{ArtifactGuard, ArtifactPaths};
use crate::config::{AppConfig, RestoreConfig, ensure_key_file};
use crate::errors::{AppError, Result};
use crate::policy::naming::namespace;
use crate::policy::retention::latest;
use crate::storage::{BackupRecord, ObjectStore};
use crate::tools::CommandRunner;

pub use db_restore::{DatabaseConnector, PgConnector, SchemaAdmin};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RestoreOutcome {
    pub namespace: String,
    pub record: BackupRecord,
    pub dropped_tables: usize,
}

/// Newest backup in `namespace`; an empty namespace is fatal.
pub async fn select_latest_backup<S>(store: &S, namespace: &str) -> Result<BackupRecord>
where
    S: ObjectStore + ?Sized,
{
    let records = store.list(namespace).await?;
    latest(&records)
        .cloned()
        .ok_or_else(|| AppError::NothingToRestore(namespace.to_string()))
}

/// Public entry point for the restore process.
///
/// Downloads the newest backup of the configured class, decrypts and
/// decompresses it, drops every table of the target schema and replays the
/// script with psql. The database handle is opened for the wipe only.
pub async fn run_restore_flow<S, R, C>(
    app_config: &AppConfig,
    restore_config: &RestoreConfig,
    store: &S,
    runner: &R,
    connector: &C,
) -> Result<RestoreOutcome>
where
    S: ObjectStore + ?Sized,
    R: CommandRunner + ?Sized,
    C: DatabaseConnector,
{
    ensure_key_file(&restore_config.private_key_file, "Private decryption key")?;

    let bucket = namespace(&app_config.storage.bucket_base, app_config.periodicity);
    let record = select_latest_backup(store, &bucket).await?;
    println!(
        "🔎 Last backup in {} is {}, {} MB, downloading it",
        bucket,
        record.key,
        record.size_mb()
    );

    let paths = ArtifactPaths::in_dir(&app_config.work_dir);
    let mut guard = ArtifactGuard::new();
    let downloaded = guard.claim(&paths.downloaded)?;
    store.download(&bucket, &record.key, &downloaded).await?;
    println!("✓ Downloaded");

    let script = decrypt::decrypt_and_decompress(
        runner,
        &restore_config.private_key_file,
        &paths,
        &mut guard,
    )?;

    let dropped_tables = db_restore::wipe_schema(connector, &app_config.database.schema).await?;
    db_restore::load_database(runner, &app_config.database, &script)?;
    drop(guard);

    Ok(RestoreOutcome {
        namespace: bucket,
        record,
        dropped_tables,
    })
}
