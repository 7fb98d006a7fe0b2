//! Open-and-migrate entry point for the SQLite backend.
//!
//! `Database::open` prepares the on-disk database (parent directory, WAL
//! journal, foreign keys), applies every pending embedded migration, and
//! hands out the per-concern repositories over a shared pool.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use thiserror::Error;

use super::lock_store::SqliteLockStore;
use super::migrations::{MigrationError, Migrator};
use super::protocol_log::SqliteProtocolLog;
use super::record_store::SqliteRecordStore;

#[derive(Debug, Error)]
pub enum StoreOpenError {
    #[error("Invalid database URL {url}: {source}")]
    BadUrl {
        url: String,
        #[source]
        source: sqlx::Error,
    },
    #[error("Could not prepare directory for {path}: {source}")]
    Directory {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Could not open database: {0}")]
    Connect(#[source] sqlx::Error),
    #[error(transparent)]
    Migrate(#[from] MigrationError),
}

/// An open, fully migrated database.
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open the database at `url` (e.g. `sqlite:.sc3/commander.db`),
    /// creating the file and its parent directory as needed.
    pub async fn open(url: &str) -> Result<Self, StoreOpenError> {
        if let Some(path) = file_path(url) {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| StoreOpenError::Directory {
                        path: path.display().to_string(),
                        source: e,
                    })?;
            }
        }
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| StoreOpenError::BadUrl {
                url: url.to_string(),
                source: e,
            })?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(Duration::from_secs(30));
        Self::connect(options, 5).await
    }

    /// A private in-memory database, one connection so every query sees
    /// the same data. Used by tests.
    pub async fn open_in_memory() -> Result<Self, StoreOpenError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| StoreOpenError::BadUrl {
                url: "sqlite::memory:".to_string(),
                source: e,
            })?
            .foreign_keys(true);
        Self::connect(options, 1).await
    }

    async fn connect(
        options: SqliteConnectOptions,
        max_connections: u32,
    ) -> Result<Self, StoreOpenError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect_with(options)
            .await
            .map_err(StoreOpenError::Connect)?;
        let applied = Migrator::new(pool.clone()).run().await?;
        if applied > 0 {
            tracing::info!(applied, "database migrations applied");
        }
        Ok(Self { pool })
    }

    pub fn records(&self) -> SqliteRecordStore {
        SqliteRecordStore::new(self.pool.clone())
    }

    pub fn protocol_log(&self) -> SqliteProtocolLog {
        SqliteProtocolLog::new(self.pool.clone())
    }

    pub fn locks(&self) -> SqliteLockStore {
        SqliteLockStore::new(self.pool.clone())
    }

    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }
}

/// File path behind a `sqlite:`/`sqlite://` URL; None for in-memory.
fn file_path(url: &str) -> Option<&Path> {
    let trimmed = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))
        .unwrap_or(url);
    if trimmed.is_empty() || trimmed == ":memory:" {
        return None;
    }
    Some(Path::new(trimmed))
}
