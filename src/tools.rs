// dbvault/src/tools.rs
//! External tool invocation.
//!
//! pg_dump, openssl and psql are all driven through [`CommandRunner`] so the
//! backup and restore flows can run against a scripted runner in tests.

use std::ffi::OsString;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::process::Command;

use tracing::debug;
use which::which;

use crate::errors::{AppError, Result};

/// A pipeline stage, used to name failures for the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Dump,
    Compress,
    Encrypt,
    Decrypt,
    Decompress,
    Load,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Dump => "dump",
            Stage::Compress => "compress",
            Stage::Encrypt => "encrypt",
            Stage::Decrypt => "decrypt",
            Stage::Decompress => "decompress",
            Stage::Load => "load",
        };
        f.write_str(name)
    }
}

/// One external program call: program name, arguments and extra environment.
#[derive(Debug, Clone)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<OsString>,
    pub env: Vec<(String, String)>,
}

impl Invocation {
    pub fn new(program: &str) -> Self {
        Invocation {
            program: program.to_string(),
            args: Vec::new(),
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<OsString>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.env.push((key.to_string(), value.to_string()));
        self
    }

    /// Value following `flag` in the argument list, if any.
    pub fn flag_value(&self, flag: &str) -> Option<PathBuf> {
        self.args
            .iter()
            .position(|a| a == flag)
            .and_then(|i| self.args.get(i + 1))
            .map(PathBuf::from)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// Exit code, `None` when the process was killed by a signal.
    pub status: Option<i32>,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ToolOutput {
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }
}

pub trait CommandRunner: Send + Sync {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput>;
}

/// Runs programs found on `PATH`.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemRunner;

impl CommandRunner for SystemRunner {
    fn run(&self, invocation: &Invocation) -> io::Result<ToolOutput> {
        let program = which(&invocation.program).map_err(|e| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!(
                    "{} executable not found in PATH ({}). Please ensure it is installed.",
                    invocation.program, e
                ),
            )
        })?;
        debug!(program = %program.display(), args = ?invocation.args, "running external tool");

        let output = Command::new(&program)
            .args(&invocation.args)
            .envs(invocation.env.iter().map(|(k, v)| (k, v)))
            .output()?;

        Ok(ToolOutput {
            status: output.status.code(),
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

/// Runs one stage and turns a launch problem or non-zero exit into an error.
pub fn run_stage<R: CommandRunner + ?Sized>(
    runner: &R,
    stage: Stage,
    invocation: &Invocation,
) -> Result<ToolOutput> {
    let output = runner
        .run(invocation)
        .map_err(|source| AppError::ToolLaunch {
            stage,
            program: invocation.program.clone(),
            source,
        })?;

    if !output.success() {
        return Err(AppError::ToolFailed {
            stage,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        });
    }
    debug!(%stage, "stage finished");
    Ok(output)
}
