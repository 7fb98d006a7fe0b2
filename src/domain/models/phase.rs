//! Acceptance-criterion phase sub-state-machine.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::mission::Classification;

/// Per (mission, AC) phase pointer. Only forward transitions are legal;
/// no cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AcPhase {
    Red,
    VerifyRed,
    Green,
    VerifyGreen,
    Refactor,
    VerifyRefactor,
    Implement,
    VerifyImplement,
    Complete,
}

impl AcPhase {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Red => "red",
            Self::VerifyRed => "verify_red",
            Self::Green => "green",
            Self::VerifyGreen => "verify_green",
            Self::Refactor => "refactor",
            Self::VerifyRefactor => "verify_refactor",
            Self::Implement => "implement",
            Self::VerifyImplement => "verify_implement",
            Self::Complete => "complete",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "red" => Ok(Self::Red),
            "verify_red" => Ok(Self::VerifyRed),
            "green" => Ok(Self::Green),
            "verify_green" => Ok(Self::VerifyGreen),
            "refactor" => Ok(Self::Refactor),
            "verify_refactor" => Ok(Self::VerifyRefactor),
            "implement" => Ok(Self::Implement),
            "verify_implement" => Ok(Self::VerifyImplement),
            "complete" => Ok(Self::Complete),
            other => Err(DomainError::Validation(format!("unknown AC phase: {other}"))),
        }
    }

    /// Forward-only transition table covering both pipelines.
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Red, Self::VerifyRed)
                | (Self::VerifyRed, Self::Green)
                | (Self::Green, Self::VerifyGreen)
                | (Self::VerifyGreen, Self::Refactor)
                | (Self::Refactor, Self::VerifyRefactor)
                | (Self::VerifyRefactor, Self::Complete)
                | (Self::Implement, Self::VerifyImplement)
                | (Self::VerifyImplement, Self::Complete)
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Initial work phase for a classification.
    pub const fn initial(classification: Classification) -> Self {
        match classification {
            Classification::RedAlert => Self::Red,
            Classification::StandardOps => Self::Implement,
        }
    }

    /// The verify phase that gates this work phase, if it is a work phase.
    pub const fn verify_phase(&self) -> Option<Self> {
        match self {
            Self::Red => Some(Self::VerifyRed),
            Self::Green => Some(Self::VerifyGreen),
            Self::Refactor => Some(Self::VerifyRefactor),
            Self::Implement => Some(Self::VerifyImplement),
            _ => None,
        }
    }

    /// The work phase that follows this verify phase on acceptance.
    pub const fn next_after_verify(&self) -> Option<Self> {
        match self {
            Self::VerifyRed => Some(Self::Green),
            Self::VerifyGreen => Some(Self::Refactor),
            Self::VerifyRefactor => Some(Self::Complete),
            Self::VerifyImplement => Some(Self::Complete),
            _ => None,
        }
    }

    /// Work phases of the pipeline for a classification, in order.
    pub fn work_phases(classification: Classification) -> &'static [Self] {
        match classification {
            Classification::RedAlert => &[Self::Red, Self::Green, Self::Refactor],
            Classification::StandardOps => &[Self::Implement],
        }
    }
}

impl std::fmt::Display for AcPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn red_alert_pipeline_is_forward_only() {
        use AcPhase::*;
        let order = [Red, VerifyRed, Green, VerifyGreen, Refactor, VerifyRefactor, Complete];
        for pair in order.windows(2) {
            assert!(pair[0].can_transition(pair[1]), "{} -> {}", pair[0], pair[1]);
            assert!(!pair[1].can_transition(pair[0]), "{} <- {}", pair[0], pair[1]);
        }
    }

    #[test]
    fn standard_ops_pipeline_is_compressed() {
        use AcPhase::*;
        assert!(Implement.can_transition(VerifyImplement));
        assert!(VerifyImplement.can_transition(Complete));
        assert!(!Implement.can_transition(Complete));
        assert!(!Red.can_transition(Implement));
    }

    #[test]
    fn verify_pairing() {
        assert_eq!(AcPhase::Red.verify_phase(), Some(AcPhase::VerifyRed));
        assert_eq!(AcPhase::VerifyRed.next_after_verify(), Some(AcPhase::Green));
        assert_eq!(AcPhase::VerifyRefactor.next_after_verify(), Some(AcPhase::Complete));
        assert_eq!(AcPhase::Complete.verify_phase(), None);
    }
}
