//! Plan envelope: the serialized planning state saved on the commission
//! record's notes.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::approval::WaveAssignment;
use crate::domain::models::message::ReadyRoomMessage;
use crate::domain::models::mission::{CoverageState, MissionPlan, Signoffs};

pub const ENVELOPE_VERSION: &str = "v1";

/// Planning state carried inside the envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct PlanState {
    pub mission_list: Vec<MissionPlan>,
    pub ready_room_messages: Vec<ReadyRoomMessage>,
    pub signoff_map: BTreeMap<String, Signoffs>,
    pub iteration_count: u32,
    pub coverage_map: BTreeMap<String, CoverageState>,
    pub wave_assignments: Vec<WaveAssignment>,
}

/// Envelope status, a strict subset of the commission lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnvelopeStatus {
    Approved,
    Shelved,
}

/// The durable plan envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanEnvelope {
    pub version: String,
    pub commission_id: String,
    pub commission_status: EnvelopeStatus,
    #[serde(default)]
    pub feedback_text: String,
    pub saved_at: DateTime<Utc>,
    pub state: PlanState,
}

impl PlanEnvelope {
    pub fn new(
        commission_id: impl Into<String>,
        status: EnvelopeStatus,
        state: PlanState,
        saved_at: DateTime<Utc>,
    ) -> Self {
        Self {
            version: ENVELOPE_VERSION.to_string(),
            commission_id: commission_id.into(),
            commission_status: status,
            feedback_text: String::new(),
            saved_at,
            state,
        }
    }

    pub fn to_json(&self) -> DomainResult<serde_json::Value> {
        Ok(serde_json::to_value(self)?)
    }

    /// Decode an envelope for the given commission. Unsupported versions
    /// and commission-id mismatches fail the load.
    pub fn from_json(commission_id: &str, notes: &serde_json::Value) -> DomainResult<Self> {
        let envelope: Self = serde_json::from_value(notes.clone())?;
        if envelope.version != ENVELOPE_VERSION {
            return Err(DomainError::Validation(format!(
                "unsupported plan envelope version: {}",
                envelope.version
            )));
        }
        if envelope.commission_id != commission_id {
            return Err(DomainError::Validation(format!(
                "plan envelope belongs to commission {} not {}",
                envelope.commission_id, commission_id
            )));
        }
        Ok(envelope)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> PlanState {
        let mut signoffs = BTreeMap::new();
        signoffs.insert(
            "M-1".to_string(),
            Signoffs {
                captain: true,
                commander: true,
                design_officer: false,
            },
        );
        let mut coverage = BTreeMap::new();
        coverage.insert("UC-1".to_string(), CoverageState::Partial);
        PlanState {
            mission_list: vec![MissionPlan::new("M-1", "one")],
            ready_room_messages: vec![],
            signoff_map: signoffs,
            iteration_count: 2,
            coverage_map: coverage,
            wave_assignments: vec![WaveAssignment {
                wave: 1,
                mission_ids: vec!["M-1".into()],
            }],
        }
    }

    #[test]
    fn save_load_round_trip() {
        let envelope = PlanEnvelope::new("C-1", EnvelopeStatus::Approved, state(), Utc::now());
        let json = envelope.to_json().unwrap();
        let loaded = PlanEnvelope::from_json("C-1", &json).unwrap();
        assert_eq!(loaded, envelope);
    }

    #[test]
    fn version_mismatch_fails_load() {
        let mut envelope = PlanEnvelope::new("C-1", EnvelopeStatus::Approved, state(), Utc::now());
        envelope.version = "v0".into();
        let json = envelope.to_json().unwrap();
        assert!(PlanEnvelope::from_json("C-1", &json).is_err());
    }

    #[test]
    fn commission_mismatch_fails_load() {
        let envelope = PlanEnvelope::new("C-1", EnvelopeStatus::Approved, state(), Utc::now());
        let json = envelope.to_json().unwrap();
        assert!(PlanEnvelope::from_json("C-2", &json).is_err());
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let envelope = PlanEnvelope::new("C-1", EnvelopeStatus::Shelved, state(), Utc::now());
        let json = envelope.to_json().unwrap();
        assert!(json.get("commissionId").is_some());
        assert!(json.get("commissionStatus").is_some());
        assert!(json["state"].get("missionList").is_some());
        assert!(json["state"].get("iterationCount").is_some());
    }
}
