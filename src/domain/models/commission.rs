//! Commission model: the root of one planning/execution run.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Lifecycle status of a commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CommissionStatus {
    Planning,
    Approved,
    Executing,
    Completed,
    Shelved,
}

impl CommissionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Planning => "planning",
            Self::Approved => "approved",
            Self::Executing => "executing",
            Self::Completed => "completed",
            Self::Shelved => "shelved",
        }
    }

    /// Parse a status string, rejecting unknowns.
    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "planning" => Ok(Self::Planning),
            "approved" => Ok(Self::Approved),
            "executing" => Ok(Self::Executing),
            "completed" => Ok(Self::Completed),
            "shelved" => Ok(Self::Shelved),
            other => Err(DomainError::Validation(format!(
                "unknown commission status: {other}"
            ))),
        }
    }

    /// Legal forward transitions, plus un-shelving.
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Planning, Self::Approved)
                | (Self::Approved, Self::Executing)
                | (Self::Executing, Self::Completed)
                | (Self::Executing, Self::Shelved)
                | (Self::Planning, Self::Shelved)
                | (Self::Approved, Self::Shelved)
                | (Self::Shelved, Self::Planning)
                | (Self::Shelved, Self::Approved)
        )
    }
}

impl std::fmt::Display for CommissionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a single acceptance criterion as recorded on its use case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum CriterionStatus {
    #[default]
    Pending,
    InProgress,
    Complete,
}

/// A verifiable condition attached to a use case; the unit of the TDD
/// phase pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcceptanceCriterion {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub status: CriterionStatus,
}

/// A use case parsed out of the PRD, with nested acceptance criteria.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UseCase {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub acceptance_criteria: Vec<AcceptanceCriterion>,
}

/// The root of one planning/execution run. Created by PRD parse; mutated
/// only through the state machine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commission {
    pub id: String,
    pub title: String,
    /// Raw PRD body the planners receive as context.
    pub prd: String,
    #[serde(default)]
    pub use_cases: Vec<UseCase>,
    #[serde(default)]
    pub functional_groups: Vec<String>,
    #[serde(default)]
    pub in_scope: Vec<String>,
    #[serde(default)]
    pub out_of_scope: Vec<String>,
    #[serde(default = "default_status")]
    pub status: CommissionStatus,
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,
}

fn default_status() -> CommissionStatus {
    CommissionStatus::Planning
}

impl Commission {
    /// Find an acceptance criterion across all use cases.
    pub fn criterion(&self, ac_id: &str) -> Option<&AcceptanceCriterion> {
        self.use_cases
            .iter()
            .flat_map(|uc| uc.acceptance_criteria.iter())
            .find(|ac| ac.id == ac_id)
    }

    /// All acceptance criteria belonging to the given use cases, in
    /// declaration order.
    pub fn criteria_for(&self, use_case_ids: &[String]) -> Vec<AcceptanceCriterion> {
        self.use_cases
            .iter()
            .filter(|uc| use_case_ids.contains(&uc.id))
            .flat_map(|uc| uc.acceptance_criteria.iter().cloned())
            .collect()
    }

    /// Load a commission from its structured YAML form (the PRD parser's
    /// output contract).
    pub fn from_yaml(input: &str) -> DomainResult<Self> {
        let commission: Self = serde_yaml::from_str(input)?;
        if commission.id.trim().is_empty() {
            return Err(DomainError::Validation("commission id is empty".into()));
        }
        Ok(commission)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_lifecycle() {
        use CommissionStatus::*;
        assert!(Planning.can_transition(Approved));
        assert!(Approved.can_transition(Executing));
        assert!(Executing.can_transition(Completed));
        assert!(Executing.can_transition(Shelved));
        assert!(Shelved.can_transition(Planning));
        assert!(Shelved.can_transition(Approved));
        assert!(!Completed.can_transition(Planning));
        assert!(!Planning.can_transition(Executing));
    }

    #[test]
    fn parse_rejects_unknown_status() {
        assert!(CommissionStatus::parse("warp").is_err());
        assert_eq!(
            CommissionStatus::parse("executing").unwrap(),
            CommissionStatus::Executing
        );
    }

    #[test]
    fn criteria_for_preserves_declaration_order() {
        let commission = Commission {
            id: "C-1".into(),
            title: "t".into(),
            prd: String::new(),
            use_cases: vec![
                UseCase {
                    id: "UC-1".into(),
                    title: "a".into(),
                    description: String::new(),
                    acceptance_criteria: vec![
                        AcceptanceCriterion {
                            id: "AC-1".into(),
                            description: "first".into(),
                            status: CriterionStatus::Pending,
                        },
                        AcceptanceCriterion {
                            id: "AC-2".into(),
                            description: "second".into(),
                            status: CriterionStatus::Pending,
                        },
                    ],
                },
                UseCase {
                    id: "UC-2".into(),
                    title: "b".into(),
                    description: String::new(),
                    acceptance_criteria: vec![AcceptanceCriterion {
                        id: "AC-3".into(),
                        description: "third".into(),
                        status: CriterionStatus::Pending,
                    }],
                },
            ],
            functional_groups: vec![],
            in_scope: vec![],
            out_of_scope: vec![],
            status: CommissionStatus::Planning,
            created_at: Utc::now(),
        };

        let acs = commission.criteria_for(&["UC-1".into(), "UC-2".into()]);
        let ids: Vec<_> = acs.iter().map(|a| a.id.as_str()).collect();
        assert_eq!(ids, vec!["AC-1", "AC-2", "AC-3"]);
    }
}
