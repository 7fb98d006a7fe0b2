//! Record store port: the only durable state backend.
//!
//! An issue-tracker-style database. The core treats it as the source of
//! truth and re-reads it on any restart; all writes are synchronous.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Record, RecordDraft, RecordFilter};

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Create a record, returning its id.
    async fn create(&self, draft: RecordDraft) -> DomainResult<String>;

    /// Fetch one record.
    async fn show(&self, id: &str) -> DomainResult<Record>;

    /// List records matching the filter.
    async fn list(&self, filter: RecordFilter) -> DomainResult<Vec<Record>>;

    /// Single-dimension state write (`set-state id key=value`).
    async fn set_state(&self, id: &str, key: &str, value: &str) -> DomainResult<()>;

    /// Set a label on a record.
    async fn set_label(&self, id: &str, key: &str, value: &str) -> DomainResult<()>;

    /// Attach a JSON notes blob to a record, replacing any prior blob.
    async fn update_notes(&self, id: &str, notes: serde_json::Value) -> DomainResult<()>;

    /// Add a dependency edge `child -> parent`.
    async fn add_dependency(&self, child: &str, parent: &str) -> DomainResult<()>;

    /// Missions of the commission whose dependencies are all done and whose
    /// own state is still `backlog`, in stable id order.
    async fn ready_missions(&self, commission_id: &str) -> DomainResult<Vec<Record>>;

    /// Append to the audit log of a record.
    async fn add_comment(&self, id: &str, comment: &str) -> DomainResult<()>;

    /// Read the audit log of a record in append order.
    async fn comments(&self, id: &str) -> DomainResult<Vec<String>>;

    /// Record a liveness heartbeat for an agent.
    async fn heartbeat(&self, agent_id: &str) -> DomainResult<()>;
}
