//! Append-only protocol events emitted by agents and the core.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Phase-boundary and escalation event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProtocolEventType {
    #[serde(rename = "RED_COMPLETE")]
    RedComplete,
    #[serde(rename = "GREEN_COMPLETE")]
    GreenComplete,
    #[serde(rename = "REFACTOR_COMPLETE")]
    RefactorComplete,
    #[serde(rename = "IMPLEMENT_COMPLETE")]
    ImplementComplete,
    #[serde(rename = "REVIEW_COMPLETE")]
    ReviewComplete,
    #[serde(rename = "STUCK_ESCALATION")]
    StuckEscalation,
}

impl ProtocolEventType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RedComplete => "RED_COMPLETE",
            Self::GreenComplete => "GREEN_COMPLETE",
            Self::RefactorComplete => "REFACTOR_COMPLETE",
            Self::ImplementComplete => "IMPLEMENT_COMPLETE",
            Self::ReviewComplete => "REVIEW_COMPLETE",
            Self::StuckEscalation => "STUCK_ESCALATION",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "RED_COMPLETE" => Ok(Self::RedComplete),
            "GREEN_COMPLETE" => Ok(Self::GreenComplete),
            "REFACTOR_COMPLETE" => Ok(Self::RefactorComplete),
            "IMPLEMENT_COMPLETE" => Ok(Self::ImplementComplete),
            "REVIEW_COMPLETE" => Ok(Self::ReviewComplete),
            "STUCK_ESCALATION" => Ok(Self::StuckEscalation),
            other => Err(DomainError::Validation(format!(
                "unknown protocol event type: {other}"
            ))),
        }
    }
}

impl std::fmt::Display for ProtocolEventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One append-only protocol record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolEvent {
    /// Store-assigned append sequence; zero until appended.
    #[serde(default)]
    pub seq: u64,
    pub event_type: ProtocolEventType,
    pub mission_id: String,
    pub payload: serde_json::Value,
    pub timestamp: DateTime<Utc>,
}

impl ProtocolEvent {
    pub fn new(
        event_type: ProtocolEventType,
        mission_id: impl Into<String>,
        payload: serde_json::Value,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            seq: 0,
            event_type,
            mission_id: mission_id.into(),
            payload,
            timestamp,
        }
    }

    /// Acceptance-criterion id carried in the payload, if any.
    pub fn ac_id(&self) -> Option<&str> {
        self.payload.get("ac_id").and_then(|v| v.as_str())
    }
}

/// Reviewer verdict on a mission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewVerdict {
    Approved,
    NeedsFixes,
}

impl ReviewVerdict {
    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "approved" => Ok(Self::Approved),
            "needs_fixes" => Ok(Self::NeedsFixes),
            other => Err(DomainError::Validation(format!(
                "unknown review verdict: {other}"
            ))),
        }
    }
}

/// Payload of a `REVIEW_COMPLETE` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewOutcome {
    pub verdict: ReviewVerdict,
    #[serde(default)]
    pub feedback: String,
    pub implementer_session_id: String,
    pub reviewer_session_id: String,
}

impl ReviewOutcome {
    pub fn from_payload(payload: &serde_json::Value) -> DomainResult<Self> {
        serde_json::from_value(payload.clone()).map_err(|e| {
            DomainError::Protocol(format!("malformed review payload: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn event_type_wire_names() {
        assert_eq!(ProtocolEventType::RedComplete.as_str(), "RED_COMPLETE");
        assert_eq!(
            ProtocolEventType::parse("REVIEW_COMPLETE").unwrap(),
            ProtocolEventType::ReviewComplete
        );
        assert!(ProtocolEventType::parse("red_complete").is_err());
    }

    #[test]
    fn review_payload_round_trip() {
        let payload = json!({
            "verdict": "needs_fixes",
            "feedback": "missing edge case",
            "implementer_session_id": "sess-1",
            "reviewer_session_id": "sess-2",
        });
        let outcome = ReviewOutcome::from_payload(&payload).unwrap();
        assert_eq!(outcome.verdict, ReviewVerdict::NeedsFixes);
        assert_eq!(outcome.feedback, "missing edge case");
    }

    #[test]
    fn ac_id_extracted_from_payload() {
        let ev = ProtocolEvent::new(
            ProtocolEventType::RedComplete,
            "M-1",
            json!({"ac_id": "AC-1"}),
            Utc::now(),
        );
        assert_eq!(ev.ac_id(), Some("AC-1"));
    }
}
