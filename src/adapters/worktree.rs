//! Git-backed worktree manager.
//!
//! Each mission gets an isolated worktree branched from the base branch,
//! `<root>/.sc3/worktrees/mission-<slug>` on branch `mission/<slug>`.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::ports::{slugify, CommandRunner, WorktreeManager};

pub struct GitWorktreeManager {
    runner: Arc<dyn CommandRunner>,
    repo_root: PathBuf,
    base_branch: String,
}

impl GitWorktreeManager {
    pub fn new(runner: Arc<dyn CommandRunner>, repo_root: PathBuf, base_branch: String) -> Self {
        Self {
            runner,
            repo_root,
            base_branch,
        }
    }

    fn worktree_path(&self, mission_id: &str) -> PathBuf {
        self.repo_root
            .join(".sc3")
            .join("worktrees")
            .join(format!("mission-{}", slugify(mission_id)))
    }

    async fn git(
        &self,
        cancel: &CancellationToken,
        args: &[String],
    ) -> DomainResult<String> {
        let output = self
            .runner
            .run(cancel, "git", args, Some(&self.repo_root))
            .await?;
        if output.exit_code != 0 {
            return Err(DomainError::Harness(format!(
                "git {} failed: {}",
                args.first().map(String::as_str).unwrap_or(""),
                output.stderr.trim()
            )));
        }
        Ok(output.stdout)
    }
}

#[async_trait]
impl WorktreeManager for GitWorktreeManager {
    async fn create(&self, cancel: &CancellationToken, mission_id: &str) -> DomainResult<PathBuf> {
        let path = self.worktree_path(mission_id);
        if path.join(".git").exists() {
            tracing::debug!(mission_id, path = %path.display(), "reusing existing worktree");
            return Ok(path);
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| DomainError::Harness(format!("create worktree parent: {e}")))?;
        }
        let branch = format!("mission/{}", slugify(mission_id));
        self.git(
            cancel,
            &[
                "worktree".into(),
                "add".into(),
                "-B".into(),
                branch,
                path.display().to_string(),
                self.base_branch.clone(),
            ],
        )
        .await?;
        tracing::info!(mission_id, path = %path.display(), "worktree created");
        Ok(path)
    }

    async fn remove(&self, cancel: &CancellationToken, mission_id: &str) -> DomainResult<()> {
        let path = self.worktree_path(mission_id);
        if !path.exists() {
            return Ok(());
        }
        self.git(
            cancel,
            &[
                "worktree".into(),
                "remove".into(),
                "--force".into(),
                path.display().to_string(),
            ],
        )
        .await?;
        Ok(())
    }
}

/// Worktrees as plain directories, for hosts without git and for tests.
pub struct DirWorktreeManager {
    root: PathBuf,
}

impl DirWorktreeManager {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }
}

#[async_trait]
impl WorktreeManager for DirWorktreeManager {
    async fn create(&self, _cancel: &CancellationToken, mission_id: &str) -> DomainResult<PathBuf> {
        let path = self.root.join(format!("mission-{}", slugify(mission_id)));
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| DomainError::Harness(format!("create worktree dir: {e}")))?;
        Ok(path)
    }

    async fn remove(&self, _cancel: &CancellationToken, mission_id: &str) -> DomainResult<()> {
        let path = self.root.join(format!("mission-{}", slugify(mission_id)));
        if path.exists() {
            tokio::fs::remove_dir_all(&path)
                .await
                .map_err(|e| DomainError::Harness(format!("remove worktree dir: {e}")))?;
        }
        Ok(())
    }
}
