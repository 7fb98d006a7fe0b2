//! In-memory lock persistence.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::domain::errors::DomainResult;
use crate::domain::models::SurfaceLock;
use crate::domain::ports::LockStore;

#[derive(Default)]
pub struct MemoryLockStore {
    locks: RwLock<Vec<SurfaceLock>>,
}

impl MemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl LockStore for MemoryLockStore {
    async fn save(&self, locks: &[SurfaceLock]) -> DomainResult<()> {
        let mut stored = self.locks.write().await;
        *stored = locks.to_vec();
        Ok(())
    }

    async fn load(&self) -> DomainResult<Vec<SurfaceLock>> {
        Ok(self.locks.read().await.clone())
    }
}
