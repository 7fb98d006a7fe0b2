//! Agent session descriptor and lifecycle states.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::record::Record;

/// Lifecycle state of an agent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AgentState {
    Spawning,
    Running,
    Exited,
    Terminated,
    Stuck,
    Dead,
}

impl AgentState {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Running => "running",
            Self::Exited => "exited",
            Self::Terminated => "terminated",
            Self::Stuck => "stuck",
            Self::Dead => "dead",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "spawning" => Ok(Self::Spawning),
            "running" => Ok(Self::Running),
            "exited" => Ok(Self::Exited),
            "terminated" => Ok(Self::Terminated),
            "stuck" => Ok(Self::Stuck),
            "dead" => Ok(Self::Dead),
            other => Err(DomainError::Validation(format!("unknown agent state: {other}"))),
        }
    }

    pub fn can_transition(self, to: Self) -> bool {
        matches!(
            (self, to),
            (Self::Spawning, Self::Running)
                | (Self::Spawning, Self::Dead)
                | (Self::Spawning, Self::Terminated)
                | (Self::Spawning, Self::Stuck)
                | (Self::Running, Self::Exited)
                | (Self::Running, Self::Terminated)
                | (Self::Running, Self::Stuck)
                | (Self::Running, Self::Dead)
                | (Self::Stuck, Self::Running)
                | (Self::Stuck, Self::Terminated)
                | (Self::Stuck, Self::Dead)
        )
    }

    /// States the supervisor counts as active.
    pub const fn is_active(&self) -> bool {
        matches!(self, Self::Spawning | Self::Running | Self::Stuck)
    }

    /// States eligible for stuck detection.
    pub const fn is_runnable(&self) -> bool {
        matches!(self, Self::Spawning | Self::Running)
    }
}

impl std::fmt::Display for AgentState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Captured result of the last harness exchange with a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct CapturedResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub duration_ms: u64,
}

/// Descriptor of one agent subprocess session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSession {
    pub id: String,
    /// Role slug, e.g. `implementer`, `reviewer`, `captain`.
    pub role: String,
    pub pid: Option<u32>,
    /// External session handle assigned by the harness.
    pub session_id: Option<String>,
    pub started_at: DateTime<Utc>,
    pub state: AgentState,
    #[serde(default)]
    pub last_result: Option<CapturedResult>,
    #[serde(default)]
    pub last_heartbeat: Option<DateTime<Utc>>,
}

impl AgentSession {
    pub fn new(id: impl Into<String>, role: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            role: role.into(),
            pid: None,
            session_id: None,
            started_at: now,
            state: AgentState::Spawning,
            last_result: None,
            last_heartbeat: None,
        }
    }

    /// Rehydrate a descriptor from its store record. Fails when the
    /// record carries no agent state.
    pub fn from_record(record: &Record) -> DomainResult<Self> {
        let state = record
            .state_value("agent_state")
            .ok_or_else(|| DomainError::Validation(format!("agent {} has no state", record.id)))
            .and_then(AgentState::parse)?;
        let parse_time = |key: &str| {
            record
                .label(key)
                .and_then(|raw| DateTime::parse_from_rfc3339(raw).ok())
                .map(|t| t.with_timezone(&Utc))
        };
        Ok(Self {
            id: record.id.clone(),
            role: record.title.clone(),
            pid: record.label("pid").and_then(|p| p.parse().ok()),
            session_id: record.label("session_id").map(str::to_string),
            started_at: parse_time("started_at").unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
            state,
            last_result: None,
            last_heartbeat: parse_time("last_heartbeat"),
        })
    }
}
