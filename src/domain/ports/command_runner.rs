//! Single-method subprocess capability.
//!
//! Harness drivers, gate runners, and worktree managers shell out through
//! this one seam so they stay trivially mockable.

use std::path::Path;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;

/// Captured output of one subprocess run.
#[derive(Debug, Clone, Default)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(
        &self,
        cancel: &CancellationToken,
        program: &str,
        args: &[String],
        cwd: Option<&Path>,
    ) -> DomainResult<CommandOutput>;
}
