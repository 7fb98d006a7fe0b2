//! SQLite implementation of the record store.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MissionState, Record, RecordDraft, RecordFilter, RecordType};
use crate::domain::ports::{Clock, RecordStore, SystemClock};

#[derive(Clone)]
pub struct SqliteRecordStore {
    pool: SqlitePool,
    clock: Arc<dyn Clock>,
}

impl SqliteRecordStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self::with_clock(pool, Arc::new(SystemClock))
    }

    pub fn with_clock(pool: SqlitePool, clock: Arc<dyn Clock>) -> Self {
        Self { pool, clock }
    }

    async fn hydrate(&self, id: &str) -> DomainResult<Record> {
        let row = sqlx::query(
            "SELECT id, record_type, title, body, parent, priority, notes FROM records WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DomainError::NotFound {
            kind: "record".into(),
            id: id.into(),
        })?;

        let mut record = Record::new(
            row.get::<String, _>("id"),
            RecordType::parse(row.get::<&str, _>("record_type"))?,
            row.get::<String, _>("title"),
        );
        record.body = row.get("body");
        record.parent = row.get("parent");
        record.priority = row.get("priority");
        record.notes = row
            .get::<Option<String>, _>("notes")
            .map(|n| serde_json::from_str(&n))
            .transpose()?;

        record.state = self.kv(id, "record_state").await?;
        record.labels = self.kv(id, "record_labels").await?;
        Ok(record)
    }

    async fn kv(&self, id: &str, table: &str) -> DomainResult<BTreeMap<String, String>> {
        let rows = sqlx::query(&format!(
            "SELECT key, value FROM {table} WHERE record_id = ?"
        ))
        .bind(id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|row| (row.get("key"), row.get("value")))
            .collect())
    }

    async fn upsert_kv(&self, table: &str, id: &str, key: &str, value: &str) -> DomainResult<()> {
        let updated = sqlx::query(&format!(
            "INSERT INTO {table} (record_id, key, value) VALUES (?, ?, ?)
             ON CONFLICT (record_id, key) DO UPDATE SET value = excluded.value"
        ))
        .bind(id)
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await;
        match updated {
            Ok(_) => Ok(()),
            Err(e) => Err(DomainError::Store(format!("{table} upsert for {id}: {e}"))),
        }
    }

    async fn exists(&self, id: &str) -> DomainResult<bool> {
        let row = sqlx::query("SELECT 1 FROM records WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn create(&self, draft: RecordDraft) -> DomainResult<String> {
        let id = draft
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        if self.exists(&id).await? {
            return Err(DomainError::Store(format!("record {id} already exists")));
        }
        sqlx::query(
            "INSERT INTO records (id, record_type, title, body, parent, priority) VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(draft.record_type.unwrap_or(RecordType::Mission).as_str())
        .bind(&draft.title)
        .bind(&draft.body)
        .bind(&draft.parent)
        .bind(draft.priority)
        .execute(&self.pool)
        .await?;
        for (key, value) in &draft.labels {
            self.upsert_kv("record_labels", &id, key, value).await?;
        }
        Ok(id)
    }

    async fn show(&self, id: &str) -> DomainResult<Record> {
        self.hydrate(id).await
    }

    async fn list(&self, filter: RecordFilter) -> DomainResult<Vec<Record>> {
        let rows = sqlx::query("SELECT id FROM records ORDER BY id")
            .fetch_all(&self.pool)
            .await?;
        let mut records = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            let record = self.hydrate(&id).await?;
            let keep = filter.record_type.map_or(true, |t| record.record_type == t)
                && filter
                    .parent
                    .as_ref()
                    .map_or(true, |p| record.parent.as_deref() == Some(p.as_str()))
                && filter
                    .state
                    .as_ref()
                    .map_or(true, |(k, v)| record.state_value(k) == Some(v.as_str()));
            if keep {
                records.push(record);
            }
        }
        Ok(records)
    }

    async fn set_state(&self, id: &str, key: &str, value: &str) -> DomainResult<()> {
        if !self.exists(id).await? {
            return Err(DomainError::NotFound {
                kind: "record".into(),
                id: id.into(),
            });
        }
        self.upsert_kv("record_state", id, key, value).await
    }

    async fn set_label(&self, id: &str, key: &str, value: &str) -> DomainResult<()> {
        if !self.exists(id).await? {
            return Err(DomainError::NotFound {
                kind: "record".into(),
                id: id.into(),
            });
        }
        self.upsert_kv("record_labels", id, key, value).await
    }

    async fn update_notes(&self, id: &str, notes: serde_json::Value) -> DomainResult<()> {
        let result = sqlx::query("UPDATE records SET notes = ? WHERE id = ?")
            .bind(serde_json::to_string(&notes)?)
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DomainError::NotFound {
                kind: "record".into(),
                id: id.into(),
            });
        }
        Ok(())
    }

    async fn add_dependency(&self, child: &str, parent: &str) -> DomainResult<()> {
        sqlx::query("INSERT OR IGNORE INTO record_deps (child, parent) VALUES (?, ?)")
            .bind(child)
            .bind(parent)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn ready_missions(&self, commission_id: &str) -> DomainResult<Vec<Record>> {
        let rows = sqlx::query(
            "SELECT r.id FROM records r
             LEFT JOIN record_state s ON s.record_id = r.id AND s.key = 'mission_state'
             WHERE r.record_type = 'mission'
               AND r.parent = ?
               AND COALESCE(s.value, 'backlog') = 'backlog'
               AND NOT EXISTS (
                   SELECT 1 FROM record_deps d
                   LEFT JOIN record_state ps ON ps.record_id = d.parent AND ps.key = 'mission_state'
                   WHERE d.child = r.id AND COALESCE(ps.value, 'backlog') != ?
               )
             ORDER BY r.id",
        )
        .bind(commission_id)
        .bind(MissionState::Done.as_str())
        .fetch_all(&self.pool)
        .await?;

        let mut records = Vec::new();
        for row in rows {
            let id: String = row.get("id");
            records.push(self.hydrate(&id).await?);
        }
        Ok(records)
    }

    async fn add_comment(&self, id: &str, comment: &str) -> DomainResult<()> {
        if !self.exists(id).await? {
            return Err(DomainError::NotFound {
                kind: "record".into(),
                id: id.into(),
            });
        }
        sqlx::query("INSERT INTO record_comments (record_id, body, created_at) VALUES (?, ?, ?)")
            .bind(id)
            .bind(comment)
            .bind(self.clock.now().to_rfc3339())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn comments(&self, id: &str) -> DomainResult<Vec<String>> {
        let rows =
            sqlx::query("SELECT body FROM record_comments WHERE record_id = ? ORDER BY seq")
                .bind(id)
                .fetch_all(&self.pool)
                .await?;
        Ok(rows.into_iter().map(|row| row.get("body")).collect())
    }

    async fn heartbeat(&self, agent_id: &str) -> DomainResult<()> {
        let now = self.clock.now().to_rfc3339();
        self.set_label(agent_id, "last_heartbeat", &now).await
    }
}
