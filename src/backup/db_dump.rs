// dbvault/src/backup/db_dump.rs
use std::path::{Path, PathBuf};

use crate::artifact::{ArtifactGuard, ArtifactPaths};
use crate::codec::gzip_file;
use crate::config::DatabaseConfig;
use crate::errors::{AppError, Result};
use crate::tools::{CommandRunner, Invocation, Stage, run_stage};

/// pg_dump of the whole database as a plain SQL script.
pub fn dump_invocation(db: &DatabaseConfig, output: &Path) -> Invocation {
    Invocation::new("pg_dump")
        .arg("-w") // never prompt, the password comes from PGPASSWORD
        .arg("-h")
        .arg(&db.host)
        .arg("-p")
        .arg(db.port.to_string())
        .arg("-U")
        .arg(&db.user)
        .arg("-f")
        .arg(output)
        .arg(&db.name)
        .env("PGPASSWORD", &db.password)
}

/// openssl S/MIME envelope (AES-256, DER output) for the given certificate.
pub fn encrypt_invocation(input: &Path, output: &Path, public_key: &Path) -> Invocation {
    Invocation::new("openssl")
        .arg("smime")
        .arg("-encrypt")
        .arg("-aes256")
        .arg("-binary")
        .arg("-outform")
        .arg("DEM")
        .arg("-in")
        .arg(input)
        .arg("-out")
        .arg(output)
        .arg(public_key)
}

/// Dumps, gzips and encrypts the database, returning the encrypted file.
///
/// Plaintext intermediates are deleted as soon as the next stage has
/// consumed them; `guard` removes whatever is left on failure.
pub fn produce_encrypted_dump<R: CommandRunner + ?Sized>(
    runner: &R,
    db: &DatabaseConfig,
    public_key: &Path,
    paths: &ArtifactPaths,
    guard: &mut ArtifactGuard,
) -> Result<PathBuf> {
    println!("📦 Preparing database backup started");

    let raw = guard.claim(&paths.raw_dump)?;
    run_stage(runner, Stage::Dump, &dump_invocation(db, &raw))?;

    let compressed = guard.claim(&paths.compressed_dump)?;
    let dumped_bytes = gzip_file(&raw, &compressed).map_err(|source| AppError::Codec {
        stage: Stage::Compress,
        source,
    })?;
    guard.release(&raw)?;

    let encrypted = guard.claim(&paths.encrypted_dump)?;
    run_stage(
        runner,
        Stage::Encrypt,
        &encrypt_invocation(&compressed, &encrypted, public_key),
    )?;
    guard.release(&compressed)?;

    println!(
        "✓ DB dumped ({} bytes of SQL), archived and encrypted",
        dumped_bytes
    );
    Ok(encrypted)
}
