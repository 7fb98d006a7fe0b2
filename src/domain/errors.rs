//! Domain errors for the ship-commander orchestration engine.

use thiserror::Error;

use crate::domain::models::mission::HaltReason;

/// Domain-level errors that can occur in the orchestration core.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Illegal {entity} transition for {id}: {from} -> {to}")]
    IllegalTransition {
        entity: String,
        id: String,
        from: String,
        to: String,
    },

    #[error("Surface-area conflict for mission {mission_id}: held by {holders:?}")]
    Conflict {
        mission_id: String,
        holders: Vec<String>,
    },

    #[error("Timed out after {timeout_secs}s waiting for {operation}")]
    Timeout {
        operation: String,
        timeout_secs: u64,
    },

    #[error("Operation canceled")]
    Canceled,

    #[error("Record store error: {0}")]
    Store(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: String, id: String },

    #[error("Plan shelved by decider: {0}")]
    ApprovalShelved(String),

    #[error("Plan returned for rework: {0}")]
    ApprovalFeedback(String),

    #[error("Mission halted ({reason})")]
    Halted {
        mission_id: Option<String>,
        reason: HaltReason,
    },

    #[error("Protocol violation: {0}")]
    Protocol(String),

    #[error("Phase attempts exhausted for {mission_id}/{ac_id} in {phase}")]
    PhaseAttemptsExhausted {
        mission_id: String,
        ac_id: String,
        phase: String,
    },

    #[error("Harness error: {0}")]
    Harness(String),

    #[error("Demo token invalid: {0}")]
    DemoToken(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

pub type DomainResult<T> = Result<T, DomainError>;

impl DomainError {
    /// True when the caller should defer the mission to a later wave rather
    /// than treat the error as fatal.
    pub const fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }

    /// True for errors raised by decider responses rather than faults.
    pub const fn is_approval_outcome(&self) -> bool {
        matches!(self, Self::ApprovalShelved(_) | Self::ApprovalFeedback(_))
    }
}

impl From<serde_json::Error> for DomainError {
    fn from(err: serde_json::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for DomainError {
    fn from(err: serde_yaml::Error) -> Self {
        DomainError::Serialization(err.to_string())
    }
}

impl From<sqlx::Error> for DomainError {
    fn from(err: sqlx::Error) -> Self {
        DomainError::Store(err.to_string())
    }
}
