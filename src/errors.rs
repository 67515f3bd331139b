// dbvault/src/errors.rs
use std::path::PathBuf;

use thiserror::Error;

use crate::tools::Stage;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{stage} stage could not start {program}: {source}")]
    ToolLaunch {
        stage: Stage,
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{}", describe_tool_failure(.stage, .status, .stderr))]
    ToolFailed {
        stage: Stage,
        status: Option<i32>,
        stderr: String,
    },

    #[error("{stage} stage failed: {source}")]
    Codec {
        stage: Stage,
        #[source]
        source: std::io::Error,
    },

    #[error("Storage {operation} on {namespace} failed: {message}")]
    Storage {
        operation: &'static str,
        namespace: String,
        message: String,
    },

    #[error("Nothing to restore: {0} holds no backups")]
    NothingToRestore(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl AppError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        AppError::Io {
            path: path.into(),
            source,
        }
    }

    /// Process exit status for this failure (sysexits values where one fits).
    pub fn exit_code(&self) -> u8 {
        match self {
            AppError::Config(_) => 78,
            AppError::NothingToRestore(_) => 66,
            _ => 1,
        }
    }
}

fn describe_tool_failure(stage: &Stage, status: &Option<i32>, stderr: &str) -> String {
    let mut message = match status {
        Some(code) => format!("{} stage exited with status {}", stage, code),
        None => format!("{} stage was terminated by a signal", stage),
    };
    // The last stderr line is usually the one that explains the failure.
    if let Some(line) = stderr.lines().rev().find(|l| !l.trim().is_empty()) {
        message.push_str(": ");
        message.push_str(line.trim());
    }
    message
}

pub type Result<T> = std::result::Result<T, AppError>;
