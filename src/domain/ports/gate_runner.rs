//! Verification gate port.
//!
//! A gate is a deterministic verification step: exit code 0 accepts, any
//! other code rejects with output.

use std::path::PathBuf;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};

/// Which gate to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GateKind {
    VerifyRed,
    VerifyGreen,
    VerifyRefactor,
    VerifyImplement,
}

impl GateKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::VerifyRed => "VERIFY_RED",
            Self::VerifyGreen => "VERIFY_GREEN",
            Self::VerifyRefactor => "VERIFY_REFACTOR",
            Self::VerifyImplement => "VERIFY_IMPLEMENT",
        }
    }

    /// Gates that must run the full test suite.
    pub const fn full_suite(&self) -> bool {
        matches!(self, Self::VerifyGreen | Self::VerifyRefactor | Self::VerifyImplement)
    }
}

impl std::fmt::Display for GateKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One gate invocation.
#[derive(Debug, Clone)]
pub struct GateRequest {
    pub gate: GateKind,
    pub mission_id: String,
    pub ac_id: String,
    pub worktree: PathBuf,
    pub attempt: u32,
    /// Set explicitly for the gates that verify the whole suite.
    pub full_suite: bool,
}

/// Gate verdict: exit code plus captured output.
#[derive(Debug, Clone, Default)]
pub struct GateOutcome {
    pub exit_code: i32,
    pub output: String,
}

impl GateOutcome {
    pub const fn accepted(&self) -> bool {
        self.exit_code == 0
    }
}

#[async_trait]
pub trait GateRunner: Send + Sync {
    async fn run(&self, cancel: &CancellationToken, request: GateRequest)
        -> DomainResult<GateOutcome>;
}

/// Reject unknown gate names at ingress.
pub fn parse_gate(s: &str) -> DomainResult<GateKind> {
    match s {
        "VERIFY_RED" => Ok(GateKind::VerifyRed),
        "VERIFY_GREEN" => Ok(GateKind::VerifyGreen),
        "VERIFY_REFACTOR" => Ok(GateKind::VerifyRefactor),
        "VERIFY_IMPLEMENT" => Ok(GateKind::VerifyImplement),
        other => Err(DomainError::Validation(format!("unknown gate: {other}"))),
    }
}
