//! SQLite adapters: the durable backend.

pub mod database;
pub mod lock_store;
pub mod migrations;
pub mod protocol_log;
pub mod record_store;

pub use database::{Database, StoreOpenError};
pub use lock_store::SqliteLockStore;
pub use migrations::{Migration, MigrationError, Migrator};
pub use protocol_log::SqliteProtocolLog;
pub use record_store::SqliteRecordStore;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{ProtocolEvent, ProtocolEventType, RecordDraft, RecordType, SurfaceLock};
    use crate::domain::ports::{LockStore, ProtocolLog, RecordStore};
    use chrono::Utc;
    use serde_json::json;

    async fn store() -> (SqliteRecordStore, SqliteProtocolLog, SqliteLockStore) {
        let db = Database::open_in_memory().await.unwrap();
        (db.records(), db.protocol_log(), db.locks())
    }

    #[tokio::test]
    async fn record_round_trip_with_state_and_notes() {
        let (records, _, _) = store().await;
        records
            .create(RecordDraft {
                id: Some("C-1".into()),
                record_type: Some(RecordType::Commission),
                title: "commission".into(),
                body: "body".into(),
                ..RecordDraft::default()
            })
            .await
            .unwrap();
        records.set_state("C-1", "commission_status", "planning").await.unwrap();
        records.update_notes("C-1", json!({"version": "v1"})).await.unwrap();
        records.add_comment("C-1", "created").await.unwrap();

        let record = records.show("C-1").await.unwrap();
        assert_eq!(record.state_value("commission_status"), Some("planning"));
        assert_eq!(record.notes.unwrap()["version"], "v1");
        assert_eq!(records.comments("C-1").await.unwrap(), vec!["created"]);
    }

    #[tokio::test]
    async fn ready_missions_respect_deps() {
        let (records, _, _) = store().await;
        records
            .create(RecordDraft {
                id: Some("C-1".into()),
                record_type: Some(RecordType::Commission),
                title: "c".into(),
                ..RecordDraft::default()
            })
            .await
            .unwrap();
        for id in ["M-1", "M-2"] {
            records
                .create(RecordDraft {
                    id: Some(id.into()),
                    record_type: Some(RecordType::Mission),
                    title: id.into(),
                    parent: Some("C-1".into()),
                    ..RecordDraft::default()
                })
                .await
                .unwrap();
        }
        records.add_dependency("M-2", "M-1").await.unwrap();

        let ready = records.ready_missions("C-1").await.unwrap();
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].id, "M-1");

        records.set_state("M-1", "mission_state", "done").await.unwrap();
        let ready = records.ready_missions("C-1").await.unwrap();
        assert_eq!(ready[0].id, "M-2");
    }

    #[tokio::test]
    async fn protocol_log_orders_by_sequence() {
        let (_, log, _) = store().await;
        let first = log
            .append(ProtocolEvent::new(
                ProtocolEventType::RedComplete,
                "M-1",
                json!({"ac_id": "AC-1"}),
                Utc::now(),
            ))
            .await
            .unwrap();
        let second = log
            .append(ProtocolEvent::new(
                ProtocolEventType::GreenComplete,
                "M-1",
                json!({"ac_id": "AC-1"}),
                Utc::now(),
            ))
            .await
            .unwrap();
        assert!(second > first);

        let events = log.events_after("M-1", first).await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].event_type, ProtocolEventType::GreenComplete);
    }

    #[tokio::test]
    async fn lock_store_round_trips() {
        let (_, _, locks) = store().await;
        let now = Utc::now();
        let set = vec![SurfaceLock {
            mission_id: "M-1".into(),
            patterns: vec!["src/**".into()],
            acquired_at: now,
            expires_at: now + chrono::Duration::seconds(600),
        }];
        locks.save(&set).await.unwrap();
        let loaded = locks.load().await.unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].mission_id, "M-1");
        assert_eq!(loaded[0].patterns, vec!["src/**"]);
    }
}
