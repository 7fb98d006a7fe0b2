//! Record-store record shape (issue-tracker style).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};

/// Entity class of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordType {
    Commission,
    UseCase,
    Mission,
    Criterion,
    Agent,
}

impl RecordType {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Commission => "commission",
            Self::UseCase => "use_case",
            Self::Mission => "mission",
            Self::Criterion => "criterion",
            Self::Agent => "agent",
        }
    }

    pub fn parse(s: &str) -> DomainResult<Self> {
        match s {
            "commission" => Ok(Self::Commission),
            "use_case" => Ok(Self::UseCase),
            "mission" => Ok(Self::Mission),
            "criterion" => Ok(Self::Criterion),
            "agent" => Ok(Self::Agent),
            other => Err(DomainError::Validation(format!("unknown record type: {other}"))),
        }
    }
}

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One durable record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: String,
    pub record_type: RecordType,
    pub title: String,
    #[serde(default)]
    pub body: String,
    /// Single-dimension state keys, e.g. `mission_state=backlog`.
    #[serde(default)]
    pub state: BTreeMap<String, String>,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub priority: Option<i64>,
    /// Free-form JSON blob (`update(id, notes=...)`).
    #[serde(default)]
    pub notes: Option<serde_json::Value>,
}

impl Record {
    pub fn new(
        id: impl Into<String>,
        record_type: RecordType,
        title: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            record_type,
            title: title.into(),
            body: String::new(),
            state: BTreeMap::new(),
            labels: BTreeMap::new(),
            parent: None,
            priority: None,
            notes: None,
        }
    }

    pub fn state_value(&self, key: &str) -> Option<&str> {
        self.state.get(key).map(String::as_str)
    }

    pub fn label(&self, key: &str) -> Option<&str> {
        self.labels.get(key).map(String::as_str)
    }
}

/// Draft used to create a record.
#[derive(Debug, Clone, Default)]
pub struct RecordDraft {
    /// Explicit id; the store generates one when empty.
    pub id: Option<String>,
    pub record_type: Option<RecordType>,
    pub title: String,
    pub body: String,
    pub parent: Option<String>,
    pub labels: BTreeMap<String, String>,
    pub priority: Option<i64>,
}

/// Filter for `list`.
#[derive(Debug, Clone, Default)]
pub struct RecordFilter {
    pub record_type: Option<RecordType>,
    pub parent: Option<String>,
    /// Matches records whose `state[key] == value`.
    pub state: Option<(String, String)>,
}
