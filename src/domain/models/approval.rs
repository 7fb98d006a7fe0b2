//! Approval request/response models for the decider rendezvous.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::mission::{CoverageState, MissionPlan};

/// A wave slot in the execution schedule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaveAssignment {
    pub wave: u32,
    pub mission_ids: Vec<String>,
}

/// What the planner asks the decider to authorize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub commission_id: String,
    pub manifest: Vec<MissionPlan>,
    pub wave_assignments: Vec<WaveAssignment>,
    pub coverage: BTreeMap<String, CoverageState>,
    pub iteration: u32,
    pub max_iterations: u32,
    /// True for the inter-wave checkpoint prompt.
    #[serde(default)]
    pub wave_review: bool,
}

impl ApprovalRequest {
    /// Reject malformed requests before they are published to the decider.
    pub fn validate(&self) -> DomainResult<()> {
        if self.commission_id.trim().is_empty() {
            return Err(DomainError::Validation(
                "approval request has empty commission id".into(),
            ));
        }
        if self.manifest.is_empty() {
            return Err(DomainError::Validation(
                "approval request has empty mission manifest".into(),
            ));
        }
        if self.iteration < 1 || self.iteration > self.max_iterations {
            return Err(DomainError::Validation(format!(
                "approval iteration {} outside 1..={}",
                self.iteration, self.max_iterations
            )));
        }
        Ok(())
    }
}

/// The decider's answer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", content = "text", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved,
    Feedback(String),
    Shelved(String),
    Halted(String),
}

impl ApprovalDecision {
    /// Feedback requires non-empty text; other variants carry free text.
    pub fn validate(&self) -> DomainResult<()> {
        if let Self::Feedback(text) = self {
            if text.trim().is_empty() {
                return Err(DomainError::Validation(
                    "feedback decision requires non-empty text".into(),
                ));
            }
        }
        Ok(())
    }

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Feedback(_) => "feedback",
            Self::Shelved(_) => "shelved",
            Self::Halted(_) => "halted",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::mission::MissionPlan;

    fn request() -> ApprovalRequest {
        ApprovalRequest {
            commission_id: "C-1".into(),
            manifest: vec![MissionPlan::new("M-1", "one")],
            wave_assignments: vec![],
            coverage: BTreeMap::new(),
            iteration: 1,
            max_iterations: 3,
            wave_review: false,
        }
    }

    #[test]
    fn valid_request_passes() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn empty_commission_id_rejected() {
        let mut r = request();
        r.commission_id = "  ".into();
        assert!(r.validate().is_err());
    }

    #[test]
    fn empty_manifest_rejected() {
        let mut r = request();
        r.manifest.clear();
        assert!(r.validate().is_err());
    }

    #[test]
    fn iteration_bounds_enforced() {
        let mut r = request();
        r.iteration = 0;
        assert!(r.validate().is_err());
        r.iteration = 4;
        assert!(r.validate().is_err());
        r.iteration = 3;
        assert!(r.validate().is_ok());
    }

    #[test]
    fn feedback_requires_text() {
        assert!(ApprovalDecision::Feedback(String::new()).validate().is_err());
        assert!(ApprovalDecision::Feedback("  ".into()).validate().is_err());
        assert!(ApprovalDecision::Feedback("split it".into()).validate().is_ok());
        assert!(ApprovalDecision::Approved.validate().is_ok());
    }
}
