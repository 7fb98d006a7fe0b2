//! Lifecycle state machine: validates and records transitions for the
//! four entity classes.
//!
//! A pure validator over explicit transition tables. Accepted transitions
//! write the new state dimension to the record store, then append an
//! audit comment; rejected transitions never write and emit an
//! invariant-violation telemetry event.

use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::json;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AcPhase, AgentState, CommissionStatus, MissionState};
use crate::domain::ports::{Clock, RecordStore};
use crate::services::event_bus::{CoreEvent, EventBus, EventKind, EventSeverity};

/// Entity classes governed by the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Commission,
    Mission,
    AcceptanceCriterion,
    Agent,
}

impl EntityKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commission => "commission",
            Self::Mission => "mission",
            Self::AcceptanceCriterion => "acceptance_criterion",
            Self::Agent => "agent",
        }
    }
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A state enum the machine can validate and persist.
pub trait LifecycleState: Copy + std::fmt::Display + Send + Sync + 'static {
    const ENTITY: EntityKind;
    /// Record-store state dimension this entity writes.
    const DIMENSION: &'static str;

    fn can_transition(self, to: Self) -> bool;
}

impl LifecycleState for CommissionStatus {
    const ENTITY: EntityKind = EntityKind::Commission;
    const DIMENSION: &'static str = "commission_status";

    fn can_transition(self, to: Self) -> bool {
        CommissionStatus::can_transition(self, to)
    }
}

impl LifecycleState for MissionState {
    const ENTITY: EntityKind = EntityKind::Mission;
    const DIMENSION: &'static str = "mission_state";

    fn can_transition(self, to: Self) -> bool {
        MissionState::can_transition(self, to)
    }
}

impl LifecycleState for AcPhase {
    const ENTITY: EntityKind = EntityKind::AcceptanceCriterion;
    const DIMENSION: &'static str = "ac_phase";

    fn can_transition(self, to: Self) -> bool {
        AcPhase::can_transition(self, to)
    }
}

impl LifecycleState for AgentState {
    const ENTITY: EntityKind = EntityKind::Agent;
    const DIMENSION: &'static str = "agent_state";

    fn can_transition(self, to: Self) -> bool {
        AgentState::can_transition(self, to)
    }
}

/// One accepted transition, kept in local history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionRecord {
    pub entity: EntityKind,
    pub id: String,
    pub from: String,
    pub to: String,
    pub reason: String,
    pub actor: String,
    pub timestamp: DateTime<Utc>,
}

/// The lifecycle state machine.
pub struct StateMachine {
    store: Arc<dyn RecordStore>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    history: Mutex<Vec<TransitionRecord>>,
}

impl StateMachine {
    pub fn new(store: Arc<dyn RecordStore>, bus: Arc<EventBus>, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            bus,
            clock,
            history: Mutex::new(Vec::new()),
        }
    }

    /// Validate and record one transition.
    ///
    /// The state write happens-before the audit comment. Store errors are
    /// wrapped and propagated; nothing is retried.
    pub async fn transition<S: LifecycleState>(
        &self,
        id: &str,
        from: S,
        to: S,
        reason: &str,
        actor: &str,
    ) -> DomainResult<()> {
        if !from.can_transition(to) {
            self.bus.publish(CoreEvent::new(
                EventKind::InvariantViolation,
                EventSeverity::Error,
                (S::ENTITY == EntityKind::Mission).then(|| id.to_string()),
                json!({
                    "entity": S::ENTITY.as_str(),
                    "id": id,
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "reason": reason,
                }),
            ));
            return Err(DomainError::IllegalTransition {
                entity: S::ENTITY.to_string(),
                id: id.to_string(),
                from: from.to_string(),
                to: to.to_string(),
            });
        }

        let timestamp = self.clock.now();
        self.store
            .set_state(id, S::DIMENSION, &to.to_string())
            .await
            .map_err(|e| DomainError::Store(format!("set_state {id} {}: {e}", S::DIMENSION)))?;
        self.store
            .add_comment(
                id,
                &format!(
                    "state_transition entity={} from={} to={} actor={} timestamp={} reason={:?}",
                    S::ENTITY,
                    from,
                    to,
                    actor,
                    timestamp.to_rfc3339(),
                    reason,
                ),
            )
            .await
            .map_err(|e| DomainError::Store(format!("add_comment {id}: {e}")))?;

        let record = TransitionRecord {
            entity: S::ENTITY,
            id: id.to_string(),
            from: from.to_string(),
            to: to.to_string(),
            reason: reason.to_string(),
            actor: actor.to_string(),
            timestamp,
        };
        tracing::debug!(
            entity = %record.entity,
            id = %record.id,
            from = %record.from,
            to = %record.to,
            actor = %record.actor,
            "state transition"
        );
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(record);
        Ok(())
    }

    /// Local transition history, newest last. Defensive copy.
    pub fn history(&self) -> Vec<TransitionRecord> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
