// dbvault/src/restore/decrypt.rs
use std::path::{Path, PathBuf};

use crate::artifact::{ArtifactGuard, ArtifactPaths};
use crate::codec::gunzip_file;
use crate::errors::{AppError, Result};
use crate::tools::{CommandRunner, Invocation, Stage, run_stage};

/// openssl S/MIME decryption of a DER-encoded envelope.
pub fn decrypt_invocation(input: &Path, output: &Path, private_key: &Path) -> Invocation {
    Invocation::new("openssl")
        .arg("smime")
        .arg("-decrypt")
        .arg("-binary")
        .arg("-inform")
        .arg("DEM")
        .arg("-in")
        .arg(input)
        .arg("-inkey")
        .arg(private_key)
        .arg("-out")
        .arg(output)
}

/// Turns the downloaded envelope into a plaintext SQL script and returns its
/// path. Each consumed input is deleted as soon as the next file exists.
pub fn decrypt_and_decompress<R: CommandRunner + ?Sized>(
    runner: &R,
    private_key: &Path,
    paths: &ArtifactPaths,
    guard: &mut ArtifactGuard,
) -> Result<PathBuf> {
    let decrypted = guard.claim(&paths.decrypted)?;
    run_stage(
        runner,
        Stage::Decrypt,
        &decrypt_invocation(&paths.downloaded, &decrypted, private_key),
    )?;
    guard.release(&paths.downloaded)?;
    println!("🔓 Database decrypted");

    let script = guard.claim(&paths.restore_script)?;
    gunzip_file(&decrypted, &script).map_err(|source| AppError::Codec {
        stage: Stage::Decompress,
        source,
    })?;
    guard.release(&decrypted)?;
    println!("📂 Database unzipped");
    Ok(script)
}
