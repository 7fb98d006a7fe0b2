//! In-memory live-session registry.

use std::collections::BTreeSet;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::ports::SessionManager;

#[derive(Default)]
pub struct MemorySessionManager {
    live: Mutex<BTreeSet<String>>,
    cleaned: Mutex<Vec<String>>,
}

impl MemorySessionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, session_id: impl Into<String>) {
        self.live
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(session_id.into());
    }

    pub fn drop_session(&self, session_id: &str) {
        self.live
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(session_id);
    }

    /// Sessions torn down via `cleanup_dead_session`, in call order.
    pub fn cleaned(&self) -> Vec<String> {
        self.cleaned
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl SessionManager for MemorySessionManager {
    async fn live_sessions(&self) -> DomainResult<Vec<String>> {
        Ok(self
            .live
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .cloned()
            .collect())
    }

    async fn cleanup_dead_session(&self, session_id: &str) -> DomainResult<()> {
        self.drop_session(session_id);
        self.cleaned
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(session_id.to_string());
        Ok(())
    }
}
