//! Embedded versioned migrations for the SQLite backend.

use sqlx::SqlitePool;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MigrationError {
    #[error("Failed to execute migration {version}: {source}")]
    ExecutionError {
        version: i64,
        #[source]
        source: sqlx::Error,
    },
    #[error("Failed to get schema version: {0}")]
    VersionCheckError(#[source] sqlx::Error),
}

#[derive(Debug, Clone)]
pub struct Migration {
    pub version: i64,
    pub description: &'static str,
    pub sql: &'static str,
}

pub fn embedded_migrations() -> Vec<Migration> {
    vec![
        Migration {
            version: 1,
            description: "records, state, labels, comments, dependencies",
            sql: r"
                CREATE TABLE IF NOT EXISTS records (
                    id TEXT PRIMARY KEY,
                    record_type TEXT NOT NULL,
                    title TEXT NOT NULL,
                    body TEXT NOT NULL DEFAULT '',
                    parent TEXT,
                    priority INTEGER,
                    notes TEXT
                );
                CREATE TABLE IF NOT EXISTS record_state (
                    record_id TEXT NOT NULL REFERENCES records(id),
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (record_id, key)
                );
                CREATE TABLE IF NOT EXISTS record_labels (
                    record_id TEXT NOT NULL REFERENCES records(id),
                    key TEXT NOT NULL,
                    value TEXT NOT NULL,
                    PRIMARY KEY (record_id, key)
                );
                CREATE TABLE IF NOT EXISTS record_comments (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    record_id TEXT NOT NULL REFERENCES records(id),
                    body TEXT NOT NULL,
                    created_at TEXT NOT NULL DEFAULT (datetime('now'))
                );
                CREATE TABLE IF NOT EXISTS record_deps (
                    child TEXT NOT NULL REFERENCES records(id),
                    parent TEXT NOT NULL REFERENCES records(id),
                    PRIMARY KEY (child, parent)
                );
                CREATE INDEX IF NOT EXISTS idx_records_type ON records(record_type);
                CREATE INDEX IF NOT EXISTS idx_records_parent ON records(parent);
            ",
        },
        Migration {
            version: 2,
            description: "protocol event log",
            sql: r"
                CREATE TABLE IF NOT EXISTS protocol_events (
                    seq INTEGER PRIMARY KEY AUTOINCREMENT,
                    event_type TEXT NOT NULL,
                    mission_id TEXT NOT NULL,
                    payload TEXT NOT NULL,
                    timestamp TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_protocol_mission ON protocol_events(mission_id, seq);
            ",
        },
        Migration {
            version: 3,
            description: "surface-area locks",
            sql: r"
                CREATE TABLE IF NOT EXISTS surface_locks (
                    mission_id TEXT PRIMARY KEY,
                    patterns TEXT NOT NULL,
                    acquired_at TEXT NOT NULL,
                    expires_at TEXT NOT NULL
                );
            ",
        },
    ]
}

pub struct Migrator {
    pool: SqlitePool,
}

impl Migrator {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Apply all pending embedded migrations; returns how many ran.
    pub async fn run(&self) -> Result<usize, MigrationError> {
        self.ensure_migrations_table().await?;
        let current = self.current_version().await?;
        let pending: Vec<_> = embedded_migrations()
            .into_iter()
            .filter(|m| m.version > current)
            .collect();
        let count = pending.len();
        for migration in pending {
            sqlx::raw_sql(migration.sql)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::ExecutionError {
                    version: migration.version,
                    source: e,
                })?;
            sqlx::query("INSERT INTO schema_migrations (version, description) VALUES (?, ?)")
                .bind(migration.version)
                .bind(migration.description)
                .execute(&self.pool)
                .await
                .map_err(|e| MigrationError::ExecutionError {
                    version: migration.version,
                    source: e,
                })?;
        }
        Ok(count)
    }

    async fn ensure_migrations_table(&self) -> Result<(), MigrationError> {
        sqlx::query(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                version INTEGER PRIMARY KEY,
                applied_at TEXT NOT NULL DEFAULT (datetime('now')),
                description TEXT
            )",
        )
        .execute(&self.pool)
        .await
        .map_err(|e| MigrationError::ExecutionError { version: 0, source: e })?;
        Ok(())
    }

    pub async fn current_version(&self) -> Result<i64, MigrationError> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT COALESCE(MAX(version), 0) FROM schema_migrations")
                .fetch_optional(&self.pool)
                .await
                .map_err(MigrationError::VersionCheckError)?;
        Ok(row.map_or(0, |(v,)| v))
    }
}
