//! Command execution utilities for the agent.
//!
//! The radio-management and route-table utilities are external programs; this module runs
//! them with a time bound and turns their various ways of failing into [`ToolError`].
//! It also runs the configured reboot command when the server requests a restart.

use core::time::Duration;
use std::{
    io,
    process::{ExitStatus, Stdio},
};

use thiserror::Error as ThisError;
use tokio::{process, time::timeout};
use tracing::{debug, info};

/// Ways an external utility invocation can fail.
#[derive(Debug, ThisError)]
pub enum ToolError {
    #[error("no program configured")]
    EmptyCommand,
    #[error("failed to spawn {program}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },
    #[error("{program} did not finish within {after:?}")]
    Timeout { program: String, after: Duration },
    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },
    #[error("{program} reported failure: {reply}")]
    Rejected { program: String, reply: String },
}

/// A configured utility: program, fixed leading arguments and a time bound.
#[derive(Debug, Clone)]
pub struct Tool {
    command: Vec<String>,
    limit: Duration,
}

impl Tool {
    #[must_use]
    pub const fn new(command: Vec<String>, limit: Duration) -> Self {
        Self { command, limit }
    }

    /// Runs the utility with extra arguments and returns its stdout.
    ///
    /// # Errors
    ///
    /// Returns an error if the program cannot be spawned, overruns its time bound, or
    /// exits unsuccessfully.
    pub async fn run(&self, args: &[&str]) -> Result<String, ToolError> {
        let Some((program, prefix)) = self.command.split_first() else {
            return Err(ToolError::EmptyCommand);
        };

        let mut cmd = process::Command::new(program);
        cmd.args(prefix)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        debug!(program, ?args, "Running tool");

        let output = match timeout(self.limit, cmd.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(source)) => {
                return Err(ToolError::Spawn {
                    program: program.clone(),
                    source,
                });
            }
            Err(_) => {
                return Err(ToolError::Timeout {
                    program: program.clone(),
                    after: self.limit,
                });
            }
        };

        if !output.status.success() {
            return Err(ToolError::Failed {
                program: program.clone(),
                status: output.status,
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    /// Like [`Tool::run`], for utilities that exit 0 but answer `FAIL...` on stdout.
    ///
    /// # Errors
    ///
    /// As [`Tool::run`], plus [`ToolError::Rejected`] when the reply starts with `FAIL`.
    pub async fn run_checked(&self, args: &[&str]) -> Result<String, ToolError> {
        let reply = self.run(args).await?;
        let trimmed = reply.trim();
        if trimmed.starts_with("FAIL") {
            return Err(ToolError::Rejected {
                program: self.command.first().cloned().unwrap_or_default(),
                reply: trimmed.to_string(),
            });
        }
        Ok(reply)
    }
}

/// Executes the configured reboot command via the appropriate shell for the platform.
///
/// # Errors
///
/// Returns `Err` if spawning or waiting on the process fails.
pub async fn execute_reboot(reboot_command: &str) -> Result<(), io::Error> {
    info!("Executing command: {reboot_command}");

    const IS_WINDOWS: bool = cfg!(target_os = "windows");

    process::Command::new(if IS_WINDOWS { "pwsh" } else { "sh" })
        .arg(if IS_WINDOWS { "-Command" } else { "-c" })
        .arg(reboot_command)
        .spawn()?
        .wait()
        .await?;

    Ok(())
}
