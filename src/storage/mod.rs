// dbvault/src/storage/mod.rs
pub mod s3;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::errors::Result;

pub use s3::S3ObjectStore;

/// Metadata of one stored backup object.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRecord {
    pub key: String,
    pub last_modified: DateTime<Utc>,
    pub size: u64,
}

impl BackupRecord {
    /// Size in whole megabytes, halves rounded to even.
    pub fn size_mb(&self) -> u64 {
        (self.size as f64 / (1024.0 * 1024.0)).round_ties_even() as u64
    }
}

/// Object storage scoped by namespace (one bucket per periodicity class).
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Every object in `namespace`; empty when the namespace holds nothing.
    async fn list(&self, namespace: &str) -> Result<Vec<BackupRecord>>;

    /// Stores `local_path` under `key`, replacing an existing object.
    async fn upload(&self, namespace: &str, local_path: &Path, key: &str) -> Result<()>;

    /// Fetches `key` into `local_path`, replacing any stale file there.
    async fn download(&self, namespace: &str, key: &str, local_path: &Path) -> Result<()>;

    /// Deletes `keys`; does nothing for an empty slice.
    async fn delete_many(&self, namespace: &str, keys: &[String]) -> Result<()>;
}
