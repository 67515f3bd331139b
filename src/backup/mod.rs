// dbvault/src/backup/mod.rs
pub(crate) mod db_dump;
pub(crate) mod prune;

use chrono::{DateTime, Utc};

use crate::artifact::{ArtifactGuard, ArtifactPaths};
use crate::config::{AppConfig, BackupConfig, ensure_key_file};
use crate::errors::Result;
use crate::policy::naming::{namespace, object_key};
use crate::policy::retention::{Eligibility, check_schedule};
use crate::storage::ObjectStore;
use crate::tools::CommandRunner;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackupOutcome {
    Completed {
        namespace: String,
        key: String,
        pruned: Vec<String>,
    },
    /// The newest backup of the class is younger than its minimum interval.
    NotDue {
        namespace: String,
        last_backup: DateTime<Utc>,
        next_due: DateTime<Utc>,
    },
}

/// Public entry point for the backup process.
///
/// 1. Checks the public key file.
/// 2. Refuses if the class already has a recent enough backup.
/// 3. Dumps, compresses and encrypts the database.
/// 4. Uploads the envelope under a periodicity-tagged key.
/// 5. Prunes the class down to its retention count.
///
/// Local artifacts are deleted on every exit path.
pub async fn run_backup_flow<S, R>(
    app_config: &AppConfig,
    backup_config: &BackupConfig,
    store: &S,
    runner: &R,
    now: DateTime<Utc>,
) -> Result<BackupOutcome>
where
    S: ObjectStore + ?Sized,
    R: CommandRunner + ?Sized,
{
    ensure_key_file(&backup_config.public_key_file, "Public encryption key")?;

    let periodicity = app_config.periodicity;
    let class = app_config.policy.class(periodicity);
    let bucket = namespace(&app_config.storage.bucket_base, periodicity);

    let existing = store.list(&bucket).await?;
    if let Eligibility::NotDue {
        last_backup,
        next_due,
    } = check_schedule(now, &existing, class.min_interval())
    {
        return Ok(BackupOutcome::NotDue {
            namespace: bucket,
            last_backup,
            next_due,
        });
    }
    println!("⏰ Time to do {} backup.", periodicity);

    let paths = ArtifactPaths::in_dir(&app_config.work_dir);
    let mut guard = ArtifactGuard::new();
    let encrypted = db_dump::produce_encrypted_dump(
        runner,
        &app_config.database,
        &backup_config.public_key_file,
        &paths,
        &mut guard,
    )?;

    let key = object_key(periodicity, &now.with_timezone(&app_config.time_zone));
    println!("☁️  Starting upload of {} to {}", key, bucket);
    store.upload(&bucket, &encrypted, &key).await?;
    println!("✓ Uploaded");

    let pruned = prune::prune_old_backups(store, &bucket, class.keep).await?;
    drop(guard);

    Ok(BackupOutcome::Completed {
        namespace: bucket,
        key,
        pruned,
    })
}
