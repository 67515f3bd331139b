// dbvault/src/artifact.rs
use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use crate::errors::{AppError, Result};

/// Fixed local paths for every pipeline stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactPaths {
    pub raw_dump: PathBuf,
    pub compressed_dump: PathBuf,
    pub encrypted_dump: PathBuf,
    pub downloaded: PathBuf,
    pub decrypted: PathBuf,
    pub restore_script: PathBuf,
}

impl ArtifactPaths {
    pub fn in_dir(work_dir: &Path) -> Self {
        ArtifactPaths {
            raw_dump: work_dir.join("backup_db.sql"),
            compressed_dump: work_dir.join("backup_db.sql.gz"),
            encrypted_dump: work_dir.join("backup_db.sql.gz.enc"),
            downloaded: work_dir.join("backup_db.sql.gz.enc"),
            decrypted: work_dir.join("db.sql.gz"),
            restore_script: work_dir.join("db.sql"),
        }
    }
}

/// Removes a leftover file, treating "not there" as success.
pub fn remove_stale(path: &Path) -> Result<()> {
    match fs::remove_file(path) {
        Ok(()) => {
            debug!(path = %path.display(), "removed stale artifact");
            Ok(())
        }
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(AppError::io(path, e)),
    }
}

/// Replaces whatever is at `path` with a new empty file only the owner can
/// read. Tools that later write to the path truncate it and keep the mode.
pub fn create_private(path: &Path) -> Result<File> {
    remove_stale(path)?;
    let mut options = OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    options.open(path).map_err(|e| AppError::io(path, e))
}

/// Owns the local artifacts of one run and deletes them when dropped, so
/// plaintext dumps never outlive the process on any exit path.
#[derive(Debug, Default)]
pub struct ArtifactGuard {
    paths: Vec<PathBuf>,
}

impl ArtifactGuard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces any stale file at `path` with an empty owner-only file and
    /// registers it for cleanup.
    pub fn claim(&mut self, path: &Path) -> Result<PathBuf> {
        create_private(path)?;
        if !self.paths.iter().any(|p| p == path) {
            self.paths.push(path.to_path_buf());
        }
        Ok(path.to_path_buf())
    }

    /// Deletes one artifact early, once the next stage has consumed it.
    pub fn release(&mut self, path: &Path) -> Result<()> {
        remove_stale(path)?;
        self.paths.retain(|p| p != path);
        Ok(())
    }
}

impl Drop for ArtifactGuard {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            if let Err(e) = remove_stale(&path) {
                warn!(path = %path.display(), error = %e, "failed to remove local artifact");
            }
        }
    }
}
