// dbvault/src/cli.rs
//! Process-level plumbing shared by the two binaries.
use tracing_subscriber::EnvFilter;

use crate::errors::AppError;

/// Exit status when a backup run is refused because the class is not due.
pub const EXIT_NOT_DUE: u8 = 75;

/// Diagnostics go to stderr; `RUST_LOG` overrides the default `warn` level.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}

/// Maps a failed run to its exit status using the first [`AppError`] in the
/// context chain.
pub fn failure_exit_code(error: &anyhow::Error) -> u8 {
    error
        .chain()
        .find_map(|cause| cause.downcast_ref::<AppError>())
        .map(AppError::exit_code)
        .unwrap_or(1)
}
