//! Subprocess execution behind a substitutable capability.

use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{DeployError, ExecFailure, Result};

/// Runs an external program once and captures its standard output.
///
/// Implementations must stop the child when `cancel` fires. There are no
/// retries; the caller decides what a failure means.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>>;
}

/// Run a command and return its stdout as trimmed UTF-8 text.
pub async fn run_text(
    executor: &dyn CommandExecutor,
    cancel: &CancellationToken,
    program: &str,
    args: &[&str],
) -> Result<String> {
    let stdout = executor.run(cancel, program, args).await?;
    let text =
        String::from_utf8(stdout).map_err(|_| DeployError::exec(program, ExecFailure::NonUtf8))?;
    Ok(text.trim().to_string())
}

/// Executor backed by `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct SystemExecutor {
    timeout: Option<Duration>,
    current_dir: Option<PathBuf>,
}

impl SystemExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort any command that runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Run commands from `dir` instead of the process working directory.
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }
}

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[&str],
    ) -> Result<Vec<u8>> {
        if cancel.is_cancelled() {
            return Err(DeployError::exec(program, ExecFailure::Cancelled));
        }

        let mut cmd = Command::new(program);
        cmd.args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = &self.current_dir {
            cmd.current_dir(dir);
        }

        debug!(program, ?args, "running command");
        let child = cmd
            .spawn()
            .map_err(|e| DeployError::exec(program, ExecFailure::Spawn(e)))?;

        let deadline = async {
            match self.timeout {
                Some(limit) => tokio::time::sleep(limit).await,
                None => std::future::pending::<()>().await,
            }
        };

        // Dropping the wait future drops the child, which kills it.
        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| DeployError::exec(program, ExecFailure::Spawn(e)))?
            }
            _ = cancel.cancelled() => {
                debug!(program, "command cancelled");
                return Err(DeployError::exec(program, ExecFailure::Cancelled));
            }
            _ = deadline => {
                let limit = self.timeout.unwrap_or_default();
                debug!(program, ?limit, "command timed out");
                return Err(DeployError::exec(program, ExecFailure::TimedOut(limit)));
            }
        };

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(DeployError::exec(
                program,
                ExecFailure::Status {
                    code: output.status.code(),
                    stderr: stderr.trim().to_string(),
                },
            ));
        }

        Ok(output.stdout)
    }
}
