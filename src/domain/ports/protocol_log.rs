//! Protocol event log port: append-only, read by (mission, cursor).

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::ProtocolEvent;

#[async_trait]
pub trait ProtocolLog: Send + Sync {
    /// Append an event; the store assigns and returns the sequence number.
    async fn append(&self, event: ProtocolEvent) -> DomainResult<u64>;

    /// Events for a mission with `seq > after_seq`, in append order.
    async fn events_after(&self, mission_id: &str, after_seq: u64)
        -> DomainResult<Vec<ProtocolEvent>>;

    /// Highest assigned sequence number, zero when empty.
    async fn latest_seq(&self) -> DomainResult<u64>;
}
