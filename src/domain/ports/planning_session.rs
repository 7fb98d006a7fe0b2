//! Planning session ports: one interactive session per specialist role.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;
use crate::domain::models::{Commission, MissionPlan, PlannerRole, Question, ReadyRoomMessage};

/// A mission contribution produced by one specialist visit.
#[derive(Debug, Clone, PartialEq)]
pub struct MissionContribution {
    pub mission_id: String,
    pub title: String,
    pub use_case_ids: Vec<String>,
    pub depends_on: Vec<String>,
    pub surface_area: Vec<String>,
    pub sign_off: bool,
    pub max_revisions: Option<u32>,
}

impl MissionContribution {
    pub fn new(mission_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            mission_id: mission_id.into(),
            title: title.into(),
            use_case_ids: Vec::new(),
            depends_on: Vec::new(),
            surface_area: Vec::new(),
            sign_off: false,
            max_revisions: None,
        }
    }
}

/// What the room hands a specialist on each visit.
#[derive(Debug, Clone)]
pub struct SessionTurnInput<'a> {
    pub iteration: u32,
    pub commission: &'a Commission,
    /// The specialist's drained mailbox.
    pub mailbox: Vec<ReadyRoomMessage>,
    /// Current plan snapshot, sorted by mission id.
    pub missions: Vec<MissionPlan>,
}

/// What a specialist returns from one visit.
#[derive(Debug, Clone, Default)]
pub struct SessionTurn {
    pub messages: Vec<ReadyRoomMessage>,
    pub contributions: Vec<MissionContribution>,
    pub questions: Vec<Question>,
}

/// One live planning session. `close` is guaranteed on any loop exit.
#[async_trait]
pub trait PlanningSession: Send + Sync {
    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        input: SessionTurnInput<'_>,
    ) -> DomainResult<SessionTurn>;

    async fn close(&mut self) -> DomainResult<()>;
}

/// Spawns one planning session per required role.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn spawn(
        &self,
        cancel: &CancellationToken,
        role: PlannerRole,
        commission: &Commission,
    ) -> DomainResult<Box<dyn PlanningSession>>;
}
