//! Live harness-session registry port, used by supervision and recovery.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;

#[async_trait]
pub trait SessionManager: Send + Sync {
    /// Ids of all currently live harness sessions.
    async fn live_sessions(&self) -> DomainResult<Vec<String>>;

    /// Tear down a session nobody claims. Idempotent.
    async fn cleanup_dead_session(&self, session_id: &str) -> DomainResult<()>;
}
