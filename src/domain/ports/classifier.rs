//! Mission risk classifier port.
//!
//! Injected into the ready room at construction; the classifier never
//! calls back into the room.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;
use crate::domain::models::{ClassifiedRisk, Commission, MissionPlan};

#[async_trait]
pub trait MissionClassifier: Send + Sync {
    /// Classify one mission against its commission context.
    async fn classify(
        &self,
        cancel: &CancellationToken,
        commission: &Commission,
        mission: &MissionPlan,
    ) -> DomainResult<ClassifiedRisk>;

    /// Confidence below which the decider is asked to confirm.
    fn review_threshold(&self) -> f64 {
        0.7
    }
}
