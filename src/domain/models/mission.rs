//! Mission plan and runtime state models.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::record::Record;

/// Per-mission risk tag controlling which phase pipeline runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum Classification {
    /// Full RED -> GREEN -> REFACTOR TDD pipeline.
    #[serde(rename = "RED_ALERT")]
    #[default]
    RedAlert,
    /// Compressed implement-then-verify pipeline.
    #[serde(rename = "STANDARD_OPS")]
    StandardOps,
}

impl Classification {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RedAlert => "RED_ALERT",
            Self::StandardOps => "STANDARD_OPS",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "RED_ALERT" => Ok(Self::RedAlert),
            "STANDARD_OPS" => Ok(Self::StandardOps),
            other => Err(DomainError::Validation(format!(
                "unknown classification: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for Classification {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where the current classification value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    #[default]
    Classifier,
    Decider,
}

/// Classification with its confidence band and review marker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ClassifiedRisk {
    pub tag: Classification,
    /// Classifier confidence in `[0, 1]`.
    #[serde(default)]
    pub confidence: f64,
    #[serde(default)]
    pub needs_review: bool,
    #[serde(default)]
    pub source: ClassificationSource,
}

/// Per-mission, per-role signoff triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Signoffs {
    pub captain: bool,
    pub commander: bool,
    pub design_officer: bool,
}

impl Signoffs {
    pub const fn complete(&self) -> bool {
        self.captain && self.commander && self.design_officer
    }

    pub const fn any(&self) -> bool {
        self.captain || self.commander || self.design_officer
    }
}

/// An executable work item owning one or more acceptance criteria.
/// Immutable once approval is issued except for state fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionPlan {
    pub id: String,
    pub title: String,
    /// Use cases this mission implements, in insertion order.
    #[serde(default)]
    pub use_case_ids: Vec<String>,
    #[serde(default)]
    pub signoffs: Signoffs,
    #[serde(default)]
    pub classification: ClassifiedRisk,
    /// Mission ids this mission depends on.
    #[serde(default)]
    pub depends_on: Vec<String>,
    /// Declared surface-area glob patterns.
    #[serde(default)]
    pub surface_area: Vec<String>,
    /// Ceiling on reviewer-driven revisions; None falls back to config.
    #[serde(default)]
    pub max_revisions: Option<u32>,
}

impl MissionPlan {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            use_case_ids: Vec::new(),
            signoffs: Signoffs::default(),
            classification: ClassifiedRisk::default(),
            depends_on: Vec::new(),
            surface_area: Vec::new(),
            max_revisions: None,
        }
    }

    /// Union-insert use-case ids, preserving insertion order.
    pub fn add_use_cases(&mut self, ids: &[String]) {
        for id in ids {
            if !self.use_case_ids.contains(id) {
                self.use_case_ids.push(id.clone());
            }
        }
    }
}

/// Runtime lifecycle pointer for a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum MissionState {
    #[default]
    Backlog,
    InProgress,
    Review,
    Approved,
    Done,
    Halted,
}

impl MissionState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Backlog => "backlog",
            Self::InProgress => "in_progress",
            Self::Review => "review",
            Self::Approved => "approved",
            Self::Done => "done",
            Self::Halted => "halted",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "backlog" => Ok(Self::Backlog),
            "in_progress" => Ok(Self::InProgress),
            "review" => Ok(Self::Review),
            "approved" => Ok(Self::Approved),
            "done" => Ok(Self::Done),
            "halted" => Ok(Self::Halted),
            other => Err(DomainError::Validation(format!(
                "unknown mission state: {other}"
            ))),
        }
    }

    /// Transition table. Backwards moves exist only for orphan repair
    /// (in_progress -> backlog) and reviewer rework (review -> in_progress).
    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Backlog, Self::InProgress)
                | (Self::InProgress, Self::Review)
                | (Self::InProgress, Self::Backlog)
                | (Self::InProgress, Self::Halted)
                | (Self::Review, Self::Approved)
                | (Self::Review, Self::InProgress)
                | (Self::Review, Self::Halted)
                | (Self::Approved, Self::Done)
                | (Self::Approved, Self::Halted)
        )
    }

    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Halted)
    }
}

impl std::fmt::Display for MissionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a mission was halted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HaltReason {
    MaxRevisionsExceeded,
    PhaseAttemptsExhausted,
    ApprovalHalted,
    ReviewTimeout,
    Internal(String),
}

impl std::fmt::Display for HaltReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MaxRevisionsExceeded => f.write_str("MaxRevisionsExceeded"),
            Self::PhaseAttemptsExhausted => f.write_str("PhaseAttemptsExhausted"),
            Self::ApprovalHalted => f.write_str("ApprovalHalted"),
            Self::ReviewTimeout => f.write_str("ReviewTimeout"),
            Self::Internal(msg) => write!(f, "Internal: {msg}"),
        }
    }
}

/// Per-mission pointer into the runtime lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MissionRuntime {
    pub mission_id: String,
    pub state: MissionState,
    /// Session currently assigned to the implementer agent, if any.
    pub session_id: Option<String>,
    /// Number of implementer dispatches so far (the initial dispatch is 1).
    pub revision: u32,
    pub updated_at: DateTime<Utc>,
}

impl MissionRuntime {
    pub fn new(mission_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            mission_id: mission_id.into(),
            state: MissionState::Backlog,
            session_id: None,
            revision: 0,
            updated_at: now,
        }
    }

    /// Rehydrate the runtime pointer from a mission record. Missing state
    /// dimensions fall back to a fresh backlog pointer.
    pub fn from_record(record: &Record, now: DateTime<Utc>) -> DomainResult<Self> {
        let state = match record.state_value("mission_state") {
            Some(raw) => MissionState::parse(raw)?,
            None => MissionState::Backlog,
        };
        Ok(Self {
            mission_id: record.id.clone(),
            state,
            session_id: record.label("session_id").map(str::to_string),
            revision: record
                .state_value("revision")
                .and_then(|r| r.parse().ok())
                .unwrap_or(0),
            updated_at: now,
        })
    }
}

/// Ternary coverage tag per use case, computed from signoffs of
/// referencing missions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CoverageState {
    Covered,
    Partial,
    Uncovered,
}

impl CoverageState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Covered => "covered",
            Self::Partial => "partial",
            Self::Uncovered => "uncovered",
        }
    }
}

/// Compute coverage for every use case id against the planned missions.
///
/// Covered iff at least one fully-signed mission references the use case;
/// partial iff referenced only by partially-signed missions; uncovered
/// otherwise.
pub fn compute_coverage(
    use_case_ids: &[String],
    missions: &[MissionPlan],
) -> BTreeMap<String, CoverageState> {
    let mut coverage = BTreeMap::new();
    for uc in use_case_ids {
        let referencing: Vec<&MissionPlan> = missions
            .iter()
            .filter(|m| m.use_case_ids.contains(uc))
            .collect();
        let state = if referencing.iter().any(|m| m.signoffs.complete()) {
            CoverageState::Covered
        } else if !referencing.is_empty() {
            CoverageState::Partial
        } else {
            CoverageState::Uncovered
        };
        coverage.insert(uc.clone(), state);
    }
    coverage
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mission(id: &str, ucs: &[&str], signed: bool) -> MissionPlan {
        let mut m = MissionPlan::new(id, id);
        m.use_case_ids = ucs.iter().map(|s| (*s).to_string()).collect();
        if signed {
            m.signoffs = Signoffs {
                captain: true,
                commander: true,
                design_officer: true,
            };
        }
        m
    }

    #[test]
    fn coverage_tiers() {
        let ucs = vec!["UC-1".to_string(), "UC-2".to_string(), "UC-3".to_string()];
        let missions = vec![
            mission("M-1", &["UC-1"], true),
            mission("M-2", &["UC-2"], false),
        ];
        let cov = compute_coverage(&ucs, &missions);
        assert_eq!(cov["UC-1"], CoverageState::Covered);
        assert_eq!(cov["UC-2"], CoverageState::Partial);
        assert_eq!(cov["UC-3"], CoverageState::Uncovered);
    }

    #[test]
    fn mission_state_table() {
        use MissionState::*;
        assert!(Backlog.can_transition(InProgress));
        assert!(InProgress.can_transition(Review));
        assert!(InProgress.can_transition(Backlog));
        assert!(Review.can_transition(Approved));
        assert!(Review.can_transition(InProgress));
        assert!(Approved.can_transition(Done));
        assert!(!Done.can_transition(Backlog));
        assert!(!Backlog.can_transition(Review));
        assert!(!Halted.can_transition(InProgress));
    }

    #[test]
    fn use_case_union_preserves_insertion_order() {
        let mut m = MissionPlan::new("M-1", "first");
        m.add_use_cases(&["UC-2".into(), "UC-1".into()]);
        m.add_use_cases(&["UC-1".into(), "UC-3".into()]);
        assert_eq!(m.use_case_ids, vec!["UC-2", "UC-1", "UC-3"]);
    }

    #[test]
    fn classification_round_trips_wire_names() {
        assert_eq!(Classification::parse("RED_ALERT").unwrap(), Classification::RedAlert);
        assert_eq!(Classification::parse("STANDARD_OPS").unwrap(), Classification::StandardOps);
        assert!(Classification::parse("red_alert").is_err());
    }
}
