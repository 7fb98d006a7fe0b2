//! Durable persistence for the surface-area lock set.

use async_trait::async_trait;

use crate::domain::errors::DomainResult;
use crate::domain::models::SurfaceLock;

#[async_trait]
pub trait LockStore: Send + Sync {
    /// Replace the persisted lock set (write-through snapshot).
    async fn save(&self, locks: &[SurfaceLock]) -> DomainResult<()>;

    /// Load the persisted lock set.
    async fn load(&self) -> DomainResult<Vec<SurfaceLock>>;
}
