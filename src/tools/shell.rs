// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Shell execution capability.
//!
//! Runs a command through the platform shell with a hard timeout, capturing
//! stdout, stderr and the exit code. Used for shell steps.

use async_trait::async_trait;
use serde::Serialize;
use std::path::Path;
use std::time::{Duration, Instant};
use tokio::process::Command;
use tokio::time::timeout;

#[cfg(feature = "telemetry")]
use tracing::{debug, instrument, warn};

use crate::error::ToolError;
use crate::tools::truncate_output;

const MAX_OUTPUT_LINES: usize = 500;

/// Captured result of a shell command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ShellOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub duration_ms: u64,
    pub timed_out: bool,
}

impl ShellOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0 && !self.timed_out
    }

    /// Human-readable rendering with truncated streams.
    pub fn render(&self) -> String {
        let mut parts = Vec::new();

        if self.timed_out {
            parts.push(format!(
                "Command timed out after {:.1}s",
                self.duration_ms as f64 / 1000.0
            ));
        }

        if !self.stdout.is_empty() {
            parts.push(truncate_output(&self.stdout, MAX_OUTPUT_LINES));
        }

        if !self.stderr.is_empty() {
            let truncated = truncate_output(&self.stderr, MAX_OUTPUT_LINES / 4);
            parts.push(format!("\n[stderr]\n{truncated}"));
        }

        if self.exit_code != 0 && !self.timed_out {
            parts.push(format!("\n[exit code: {}]", self.exit_code));
        }

        if parts.is_empty() {
            "[No output]".to_string()
        } else {
            parts.join("\n")
        }
    }
}

/// Runs shell commands.
#[async_trait]
pub trait ShellRunner: Send + Sync {
    /// Run `command` in `cwd`. A timeout is reported in the output, not as
    /// an error; errors mean the command could not be started.
    async fn run(&self, command: &str, cwd: &Path, limit: Duration) -> Result<ShellOutput, ToolError>;
}

/// [`ShellRunner`] backed by `bash -c` (`cmd /C` on Windows).
#[derive(Debug, Clone, Copy, Default)]
pub struct BashRunner;

#[async_trait]
impl ShellRunner for BashRunner {
    #[cfg_attr(feature = "telemetry", instrument(skip(self), fields(exit_code)))]
    async fn run(&self, command: &str, cwd: &Path, limit: Duration) -> Result<ShellOutput, ToolError> {
        if command.trim().is_empty() {
            return Err(ToolError::InvalidInput("command must not be empty".to_string()));
        }
        if !cwd.is_dir() {
            return Err(ToolError::FileNotFound(format!(
                "Working directory does not exist: {}",
                cwd.display()
            )));
        }

        let start = Instant::now();

        let shell = if cfg!(windows) { "cmd" } else { "bash" };
        let shell_flag = if cfg!(windows) { "/C" } else { "-c" };

        let mut cmd = Command::new(shell);
        cmd.arg(shell_flag)
            .arg(command)
            .current_dir(cwd)
            .kill_on_drop(true)
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::piped());

        let result = timeout(limit, cmd.output()).await;
        let duration_ms = start.elapsed().as_millis() as u64;

        let output = match result {
            Ok(Ok(output)) => ShellOutput {
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                exit_code: output.status.code().unwrap_or(-1),
                duration_ms,
                timed_out: false,
            },
            Ok(Err(e)) => {
                return Err(ToolError::ExecutionFailed(format!(
                    "Failed to execute command: {e}"
                )))
            }
            Err(_) => ShellOutput {
                stdout: String::new(),
                stderr: format!("Command timed out after {}ms", limit.as_millis()),
                exit_code: -1,
                duration_ms,
                timed_out: true,
            },
        };

        #[cfg(feature = "telemetry")]
        {
            tracing::Span::current().record("exit_code", output.exit_code);
            if output.timed_out {
                warn!("Command timed out");
            } else {
                debug!(exit_code = output.exit_code, duration_ms, "Command executed");
            }
        }

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn echo_command() -> &'static str {
        if cfg!(windows) {
            "echo hello world"
        } else {
            "echo 'hello world'"
        }
    }

    fn timeout_command() -> &'static str {
        if cfg!(windows) {
            "ping -n 5 127.0.0.1 > NUL"
        } else {
            "sleep 10"
        }
    }

    #[tokio::test]
    async fn test_echo() {
        let dir = tempdir().unwrap();
        let output = BashRunner
            .run(echo_command(), dir.path(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(output.success());
        assert!(output.stdout.contains("hello world"));
    }

    #[tokio::test]
    async fn test_runs_in_cwd() {
        let dir = tempdir().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();

        let list = if cfg!(windows) { "dir /B" } else { "ls" };
        let output = BashRunner
            .run(list, dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(output.stdout.contains("marker.txt"));
    }

    #[tokio::test]
    async fn test_exit_code() {
        let dir = tempdir().unwrap();
        let output = BashRunner
            .run("exit 3", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();

        assert!(!output.success());
        assert_eq!(output.exit_code, 3);
        assert!(output.render().contains("exit code: 3"));
    }

    #[tokio::test]
    async fn test_timeout() {
        let dir = tempdir().unwrap();
        let output = BashRunner
            .run(timeout_command(), dir.path(), Duration::from_millis(100))
            .await
            .unwrap();

        assert!(output.timed_out);
        assert!(!output.success());
        assert!(output.render().contains("timed out"));
    }

    #[tokio::test]
    async fn test_empty_command_rejected() {
        let dir = tempdir().unwrap();
        let result = BashRunner.run("   ", dir.path(), Duration::from_secs(1)).await;
        assert!(matches!(result, Err(ToolError::InvalidInput(_))));
    }

    #[tokio::test]
    async fn test_missing_cwd_rejected() {
        let result = BashRunner
            .run("echo hi", Path::new("/nonexistent/path"), Duration::from_secs(1))
            .await;
        assert!(matches!(result, Err(ToolError::FileNotFound(_))));
    }

    #[test]
    fn test_render_empty() {
        let output = ShellOutput {
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            duration_ms: 1,
            timed_out: false,
        };
        assert_eq!(output.render(), "[No output]");
    }
}
