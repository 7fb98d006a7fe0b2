//! In-memory protocol event log.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::ProtocolEvent;
use crate::domain::ports::ProtocolLog;

#[derive(Default)]
pub struct MemoryProtocolLog {
    events: RwLock<Vec<ProtocolEvent>>,
}

impl MemoryProtocolLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full log snapshot, used by tests.
    pub async fn all(&self) -> Vec<ProtocolEvent> {
        self.events.read().await.clone()
    }
}

#[async_trait]
impl ProtocolLog for MemoryProtocolLog {
    async fn append(&self, mut event: ProtocolEvent) -> DomainResult<u64> {
        let mut events = self.events.write().await;
        let seq = events.len() as u64 + 1;
        event.seq = seq;
        events.push(event);
        Ok(seq)
    }

    async fn events_after(
        &self,
        mission_id: &str,
        after_seq: u64,
    ) -> DomainResult<Vec<ProtocolEvent>> {
        let events = self.events.read().await;
        Ok(events
            .iter()
            .filter(|e| e.mission_id == mission_id && e.seq > after_seq)
            .cloned()
            .collect())
    }

    async fn latest_seq(&self) -> DomainResult<u64> {
        let events = self.events.read().await;
        Ok(events.last().map_or(0, |e| e.seq))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::ProtocolEventType;
    use chrono::Utc;
    use serde_json::json;

    #[tokio::test]
    async fn append_assigns_monotonic_sequence() {
        let log = MemoryProtocolLog::new();
        let seq1 = log
            .append(ProtocolEvent::new(
                ProtocolEventType::RedComplete,
                "M-1",
                json!({}),
                Utc::now(),
            ))
            .await
            .unwrap();
        let seq2 = log
            .append(ProtocolEvent::new(
                ProtocolEventType::GreenComplete,
                "M-1",
                json!({}),
                Utc::now(),
            ))
            .await
            .unwrap();
        assert!(seq2 > seq1);
        assert_eq!(log.latest_seq().await.unwrap(), seq2);
    }

    #[tokio::test]
    async fn events_after_filters_by_mission_and_cursor() {
        let log = MemoryProtocolLog::new();
        for mission in ["M-1", "M-2", "M-1"] {
            log.append(ProtocolEvent::new(
                ProtocolEventType::RedComplete,
                mission,
                json!({}),
                Utc::now(),
            ))
            .await
            .unwrap();
        }
        let events = log.events_after("M-1", 1).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].seq, 3);
    }
}
