//! Worktree manager port: per-mission isolated working directories.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;

#[async_trait]
pub trait WorktreeManager: Send + Sync {
    /// Create (or reuse) the worktree for a mission, returning its
    /// absolute path.
    async fn create(&self, cancel: &CancellationToken, mission_id: &str) -> DomainResult<PathBuf>;

    /// Remove the worktree for a mission. Idempotent.
    async fn remove(&self, cancel: &CancellationToken, mission_id: &str) -> DomainResult<()>;
}
