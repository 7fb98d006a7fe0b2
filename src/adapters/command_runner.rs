//! Tokio-backed subprocess runner.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{CommandOutput, CommandRunner};

/// Runs commands with `tokio::process`, honoring cancellation by killing
/// the child.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> DomainResult<CommandOutput> {
        let mut command = Command::new(program);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = cwd {
            command.current_dir(cwd);
        }

        let child = command
            .spawn()
            .map_err(|e| DomainError::Harness(format!("spawn {program}: {e}")))?;

        let output = tokio::select! {
            output = child.wait_with_output() => {
                output.map_err(|e| DomainError::Harness(format!("wait {program}: {e}")))?
            }
            () = cancel.cancelled() => return Err(DomainError::Canceled),
        };

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let runner = TokioCommandRunner::new();
        let cancel = CancellationToken::new();
        let output = runner
            .run(&cancel, "sh", &["-c".into(), "echo hail".into()], None)
            .await
            .unwrap();
        assert_eq!(output.exit_code, 0);
        assert_eq!(output.stdout.trim(), "hail");
    }

    #[tokio::test]
    async fn nonzero_exit_is_reported_not_an_error() {
        let runner = TokioCommandRunner::new();
        let cancel = CancellationToken::new();
        let output = runner
            .run(&cancel, "sh", &["-c".into(), "exit 3".into()], None)
            .await
            .unwrap();
        assert_eq!(output.exit_code, 3);
    }
}
