//! SQLite persistence for the surface-area lock set.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{Row, SqlitePool};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::SurfaceLock;
use crate::domain::ports::LockStore;

#[derive(Clone)]
pub struct SqliteLockStore {
    pool: SqlitePool,
}

impl SqliteLockStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LockStore for SqliteLockStore {
    async fn save(&self, locks: &[SurfaceLock]) -> DomainResult<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM surface_locks")
            .execute(&mut *tx)
            .await?;
        for lock in locks {
            sqlx::query(
                "INSERT INTO surface_locks (mission_id, patterns, acquired_at, expires_at) VALUES (?, ?, ?, ?)",
            )
            .bind(&lock.mission_id)
            .bind(serde_json::to_string(&lock.patterns)?)
            .bind(lock.acquired_at.to_rfc3339())
            .bind(lock.expires_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn load(&self) -> DomainResult<Vec<SurfaceLock>> {
        let rows = sqlx::query(
            "SELECT mission_id, patterns, acquired_at, expires_at FROM surface_locks ORDER BY mission_id",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter()
            .map(|row| {
                let parse = |column: &str| -> DomainResult<DateTime<Utc>> {
                    let raw: String = row.get(column);
                    DateTime::parse_from_rfc3339(&raw)
                        .map(|t| t.with_timezone(&Utc))
                        .map_err(|e| DomainError::Store(format!("bad lock timestamp: {e}")))
                };
                Ok(SurfaceLock {
                    mission_id: row.get("mission_id"),
                    patterns: serde_json::from_str(row.get::<&str, _>("patterns"))?,
                    acquired_at: parse("acquired_at")?,
                    expires_at: parse("expires_at")?,
                })
            })
            .collect()
    }
}
