//! SQLite implementation of the protocol event log.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProtocolEvent, ProtocolEventType};
use crate::domain::ports::ProtocolLog;

#[derive(Clone)]
pub struct SqliteProtocolLog {
    pool: SqlitePool,
}

impl SqliteProtocolLog {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn from_row(row: &sqlx::sqlite::SqliteRow) -> DomainResult<ProtocolEvent> {
        let timestamp: String = row.get("timestamp");
        Ok(ProtocolEvent {
            seq: u64::try_from(row.get::<i64, _>("seq")).unwrap_or(0),
            event_type: ProtocolEventType::parse(row.get::<&str, _>("event_type"))?,
            mission_id: row.get("mission_id"),
            payload: serde_json::from_str(row.get::<&str, _>("payload"))?,
            timestamp: DateTime::parse_from_rfc3339(&timestamp)
                .map_err(|e| DomainError::Store(format!("bad event timestamp: {e}")))?
                .with_timezone(&Utc),
        })
    }
}

#[async_trait]
impl ProtocolLog for SqliteProtocolLog {
    async fn append(&self, event: ProtocolEvent) -> DomainResult<u64> {
        let result = sqlx::query(
            "INSERT INTO protocol_events (event_type, mission_id, payload, timestamp) VALUES (?, ?, ?, ?)",
        )
        .bind(event.event_type.as_str())
        .bind(&event.mission_id)
        .bind(serde_json::to_string(&event.payload)?)
        .bind(event.timestamp.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(u64::try_from(result.last_insert_rowid()).unwrap_or(0))
    }

    async fn events_after(
        &self,
        mission_id: &str,
        after_seq: u64,
    ) -> DomainResult<Vec<ProtocolEvent>> {
        let rows = sqlx::query(
            "SELECT seq, event_type, mission_id, payload, timestamp FROM protocol_events
             WHERE mission_id = ? AND seq > ? ORDER BY seq",
        )
        .bind(mission_id)
        .bind(i64::try_from(after_seq).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(Self::from_row).collect()
    }

    async fn latest_seq(&self) -> DomainResult<u64> {
        let row: Option<(i64,)> = sqlx::query_as("SELECT COALESCE(MAX(seq), 0) FROM protocol_events")
            .fetch_optional(&self.pool)
            .await?;
        Ok(row
            .and_then(|(seq,)| u64::try_from(seq).ok())
            .unwrap_or(0))
    }
}
