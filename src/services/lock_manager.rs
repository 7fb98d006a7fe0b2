//! Surface-area lock manager: glob-based exclusive reservations with TTL.
//!
//! The active set is authoritative in memory and persisted write-through.
//! Expired locks are pruned on every operation; re-acquisition by the same
//! mission is idempotent.

use std::sync::Arc;

use chrono::Duration as ChronoDuration;
use tokio::sync::Mutex;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{normalize_pattern, SurfaceLock};
use crate::domain::ports::{Clock, LockStore};

/// Configuration for the lock manager.
#[derive(Debug, Clone)]
pub struct LockManagerConfig {
    pub expiry_timeout_secs: u64,
}

impl Default for LockManagerConfig {
    fn default() -> Self {
        Self {
            expiry_timeout_secs: 1800,
        }
    }
}

pub struct SurfaceLockManager {
    store: Arc<dyn LockStore>,
    clock: Arc<dyn Clock>,
    config: LockManagerConfig,
    locks: Mutex<Vec<SurfaceLock>>,
}

impl SurfaceLockManager {
    pub fn new(store: Arc<dyn LockStore>, clock: Arc<dyn Clock>, config: LockManagerConfig) -> Self {
        Self {
            store,
            clock,
            config,
            locks: Mutex::new(Vec::new()),
        }
    }

    /// Load the persisted lock set, dropping already-expired entries.
    pub async fn hydrate(&self) -> DomainResult<()> {
        let now = self.clock.now();
        let mut persisted = self.store.load().await?;
        persisted.retain(|lock| !lock.is_expired(now));
        let mut locks = self.locks.lock().await;
        *locks = persisted;
        Ok(())
    }

    /// Acquire exclusive reservations for a mission's patterns.
    ///
    /// The mission's existing locks are dropped before conflict checking,
    /// making re-acquisition idempotent. Returns `DomainError::Conflict`
    /// naming the holding missions on overlap.
    pub async fn acquire(&self, mission_id: &str, patterns: &[String]) -> DomainResult<SurfaceLock> {
        let normalized: Vec<String> = patterns.iter().map(|p| normalize_pattern(p)).collect();
        if normalized.iter().all(|p| p.is_empty()) {
            return Err(DomainError::Validation(format!(
                "mission {mission_id} declared no usable surface patterns"
            )));
        }
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        locks.retain(|lock| !lock.is_expired(now));
        locks.retain(|lock| lock.mission_id != mission_id);

        let holders: Vec<String> = locks
            .iter()
            .filter(|lock| lock.conflicts_with(&normalized))
            .map(|lock| lock.mission_id.clone())
            .collect();
        if !holders.is_empty() {
            return Err(DomainError::Conflict {
                mission_id: mission_id.to_string(),
                holders,
            });
        }

        let lock = SurfaceLock {
            mission_id: mission_id.to_string(),
            patterns: normalized,
            acquired_at: now,
            expires_at: now
                + ChronoDuration::seconds(
                    i64::try_from(self.config.expiry_timeout_secs).unwrap_or(i64::MAX),
                ),
        };
        locks.push(lock.clone());
        self.store.save(&locks).await?;
        tracing::debug!(mission_id, patterns = ?lock.patterns, "surface lock acquired");
        Ok(lock)
    }

    /// Release a mission's lock. Idempotent.
    pub async fn release(&self, mission_id: &str) -> DomainResult<()> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        let before = locks.len();
        locks.retain(|lock| !lock.is_expired(now) && lock.mission_id != mission_id);
        if locks.len() != before {
            self.store.save(&locks).await?;
            tracing::debug!(mission_id, "surface lock released");
        }
        Ok(())
    }

    /// Active locks that would conflict with the candidate patterns.
    pub async fn check_conflict(&self, patterns: &[String]) -> DomainResult<Vec<SurfaceLock>> {
        let normalized: Vec<String> = patterns.iter().map(|p| normalize_pattern(p)).collect();
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        locks.retain(|lock| !lock.is_expired(now));
        Ok(locks
            .iter()
            .filter(|lock| lock.conflicts_with(&normalized))
            .cloned()
            .collect())
    }

    /// Snapshot of the active lock set. Defensive copy.
    pub async fn active_locks(&self) -> Vec<SurfaceLock> {
        let now = self.clock.now();
        let mut locks = self.locks.lock().await;
        locks.retain(|lock| !lock.is_expired(now));
        locks.clone()
    }
}
