//! Plan persistence on the commission record's notes.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{EnvelopeStatus, PlanEnvelope, PlanState};
use crate::domain::ports::{Clock, RecordStore};

/// Shelves a plan with decider feedback.
#[async_trait]
pub trait PlanShelver: Send + Sync {
    async fn shelve(&self, commission_id: &str, feedback: &str) -> DomainResult<()>;
}

/// Feeds decider feedback back into the planning loop.
#[async_trait]
pub trait FeedbackInjector: Send + Sync {
    async fn inject(&self, commission_id: &str, feedback: &str) -> DomainResult<()>;
}

/// Reads and writes the plan envelope on commission notes.
pub struct PlanStore {
    store: Arc<dyn RecordStore>,
    clock: Arc<dyn Clock>,
}

impl PlanStore {
    pub fn new(store: Arc<dyn RecordStore>, clock: Arc<dyn Clock>) -> Self {
        Self { store, clock }
    }

    /// Serialize the plan state onto the commission record.
    pub async fn save_plan(
        &self,
        commission_id: &str,
        status: EnvelopeStatus,
        state: PlanState,
    ) -> DomainResult<PlanEnvelope> {
        let envelope = PlanEnvelope::new(commission_id, status, state, self.clock.now());
        self.store
            .update_notes(commission_id, envelope.to_json()?)
            .await?;
        Ok(envelope)
    }

    /// Load the envelope; fails on version or commission-id mismatch.
    pub async fn load_plan(&self, commission_id: &str) -> DomainResult<PlanEnvelope> {
        let record = self.store.show(commission_id).await?;
        let notes = record.notes.ok_or_else(|| DomainError::NotFound {
            kind: "plan envelope".into(),
            id: commission_id.into(),
        })?;
        PlanEnvelope::from_json(commission_id, &notes)
    }
}

#[async_trait]
impl PlanShelver for PlanStore {
    /// Shelving preserves the plan state and mutates only status,
    /// feedback, and the saved-at stamp.
    async fn shelve(&self, commission_id: &str, feedback: &str) -> DomainResult<()> {
        let mut envelope = match self.load_plan(commission_id).await {
            Ok(envelope) => envelope,
            Err(DomainError::NotFound { .. }) => PlanEnvelope::new(
                commission_id,
                EnvelopeStatus::Shelved,
                PlanState::default(),
                self.clock.now(),
            ),
            Err(e) => return Err(e),
        };
        envelope.commission_status = EnvelopeStatus::Shelved;
        envelope.feedback_text = feedback.to_string();
        envelope.saved_at = self.clock.now();
        self.store
            .update_notes(commission_id, envelope.to_json()?)
            .await?;
        tracing::info!(commission_id, "plan shelved");
        Ok(())
    }
}

#[async_trait]
impl FeedbackInjector for PlanStore {
    /// Records the feedback on the envelope for the next planning round
    /// and in the commission audit log.
    async fn inject(&self, commission_id: &str, feedback: &str) -> DomainResult<()> {
        if let Ok(mut envelope) = self.load_plan(commission_id).await {
            envelope.feedback_text = feedback.to_string();
            envelope.saved_at = self.clock.now();
            self.store
                .update_notes(commission_id, envelope.to_json()?)
                .await?;
        }
        self.store
            .add_comment(commission_id, &format!("planner_feedback {feedback:?}"))
            .await?;
        Ok(())
    }
}
