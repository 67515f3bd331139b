// dbvault/src/backup/prune.rs
use tracing::info;

use crate::errors::Result;
use crate::policy::retention::select_for_pruning;
use crate::storage::ObjectStore;

/// Deletes everything but the `keep` newest backups of `namespace` in one
/// batch and returns the deleted keys.
pub async fn prune_old_backups<S>(store: &S, namespace: &str, keep: usize) -> Result<Vec<String>>
where
    S: ObjectStore + ?Sized,
{
    println!("🧹 Starting delete of old backups from {}", namespace);
    let records = store.list(namespace).await?;
    if records.is_empty() {
        println!("ℹ️  No old backups");
        return Ok(Vec::new());
    }

    let doomed: Vec<String> = select_for_pruning(&records, keep)
        .into_iter()
        .map(|r| r.key)
        .collect();
    if doomed.is_empty() {
        println!("✓ {} backups stored, limit is {}; nothing to delete", records.len(), keep);
        return Ok(doomed);
    }

    store.delete_many(namespace, &doomed).await?;
    info!(namespace, deleted = ?doomed, "pruned old backups");
    println!("✓ Deleted {} old backups", doomed.len());
    Ok(doomed)
}
