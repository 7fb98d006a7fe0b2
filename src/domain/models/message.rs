//! Ready-room roles and messages.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// The three planning specialists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerRole {
    Captain,
    Commander,
    DesignOfficer,
}

impl PlannerRole {
    /// Fixed visit order within a planning iteration.
    pub const VISIT_ORDER: [Self; 3] = [Self::Captain, Self::Commander, Self::DesignOfficer];

    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Captain => "captain",
            Self::Commander => "commander",
            Self::DesignOfficer => "design_officer",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "captain" => Ok(Self::Captain),
            "commander" => Ok(Self::Commander),
            "design_officer" | "design-officer" => Ok(Self::DesignOfficer),
            other => Err(DomainError::Validation(format!("unknown planner role: {other}"))),
        }
    }
}

impl std::fmt::Display for PlannerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Message recipient: a single role or the whole room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Recipient {
    Role(PlannerRole),
    Broadcast,
}

impl Recipient {
    /// Parse a recipient string; `all` and `broadcast` both fan out.
    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "all" | "broadcast" => Ok(Self::Broadcast),
            role => PlannerRole::parse(role).map(Self::Role).map_err(|_| {
                DomainError::Validation(format!("unknown recipient: {role}"))
            }),
        }
    }
}

/// Kind of ready-room traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Proposal,
    Critique,
    Info,
    Answer,
}

/// One message exchanged between planning specialists.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadyRoomMessage {
    pub sender: PlannerRole,
    pub recipient: Recipient,
    pub kind: MessageKind,
    #[serde(default)]
    pub domain: Option<String>,
    pub content: String,
    /// Zero until the loop clock stamps it.
    #[serde(default = "epoch")]
    pub timestamp: DateTime<Utc>,
}

fn epoch() -> DateTime<Utc> {
    DateTime::<Utc>::UNIX_EPOCH
}

impl ReadyRoomMessage {
    pub fn new(
        sender: PlannerRole,
        recipient: Recipient,
        kind: MessageKind,
        content: impl Into<String>,
    ) -> Self {
        Self {
            sender,
            recipient,
            kind,
            domain: None,
            content: content.into(),
            timestamp: epoch(),
        }
    }

    pub fn is_unstamped(&self) -> bool {
        self.timestamp == DateTime::<Utc>::UNIX_EPOCH
    }
}
