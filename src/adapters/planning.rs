//! Scripted planning sessions, for tests and dry runs.
//!
//! Each scripted session replays a queue of turns, recording the
//! mailboxes it was handed so routing guarantees can be asserted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    ClassifiedRisk, Commission, MissionPlan, PlannerRole, ReadyRoomMessage,
};
use crate::domain::ports::{
    MissionClassifier, PlanningSession, SessionFactory, SessionTurn, SessionTurnInput,
};

/// A planning session that replays scripted turns.
pub struct ScriptedPlanningSession {
    role: PlannerRole,
    turns: Mutex<VecDeque<SessionTurn>>,
    /// Mailboxes received, one entry per visit.
    seen_mailboxes: Arc<Mutex<Vec<Vec<ReadyRoomMessage>>>>,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl PlanningSession for ScriptedPlanningSession {
    async fn execute(
        &mut self,
        cancel: &CancellationToken,
        input: SessionTurnInput<'_>,
    ) -> DomainResult<SessionTurn> {
        if cancel.is_cancelled() {
            return Err(DomainError::Canceled);
        }
        self.seen_mailboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(input.mailbox.clone());
        Ok(self
            .turns
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .pop_front()
            .unwrap_or_default())
    }

    async fn close(&mut self) -> DomainResult<()> {
        self.closed.store(true, Ordering::SeqCst);
        tracing::debug!(role = %self.role, "scripted session closed");
        Ok(())
    }
}

/// Factory of scripted sessions, with per-role introspection handles.
#[derive(Default)]
pub struct ScriptedSessionFactory {
    scripts: Mutex<HashMap<PlannerRole, VecDeque<SessionTurn>>>,
    mailboxes: Mutex<HashMap<PlannerRole, Arc<Mutex<Vec<Vec<ReadyRoomMessage>>>>>>,
    closed: Mutex<HashMap<PlannerRole, Arc<AtomicBool>>>,
}

impl ScriptedSessionFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the turns a role will replay, in visit order.
    pub fn script(&self, role: PlannerRole, turns: Vec<SessionTurn>) {
        self.scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(role, turns.into());
    }

    /// Mailboxes a role received so far, one entry per visit.
    pub fn mailboxes_of(&self, role: PlannerRole) -> Vec<Vec<ReadyRoomMessage>> {
        self.mailboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&role)
            .map(|m| m.lock().unwrap_or_else(std::sync::PoisonError::into_inner).clone())
            .unwrap_or_default()
    }

    pub fn was_closed(&self, role: PlannerRole) -> bool {
        self.closed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&role)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(false)
    }
}

#[async_trait]
impl SessionFactory for ScriptedSessionFactory {
    async fn spawn(
        &self,
        _cancel: &CancellationToken,
        role: PlannerRole,
        _commission: &Commission,
    ) -> DomainResult<Box<dyn PlanningSession>> {
        let turns = self
            .scripts
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .remove(&role)
            .unwrap_or_default();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let closed = Arc::new(AtomicBool::new(false));
        self.mailboxes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(role, seen.clone());
        self.closed
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(role, closed.clone());
        Ok(Box::new(ScriptedPlanningSession {
            role,
            turns: Mutex::new(turns),
            seen_mailboxes: seen,
            closed,
        }))
    }
}

/// A classifier returning a fixed risk per mission id.
#[derive(Default)]
pub struct StaticClassifier {
    by_mission: Mutex<HashMap<String, ClassifiedRisk>>,
    default_risk: ClassifiedRisk,
}

impl StaticClassifier {
    pub fn new(default_risk: ClassifiedRisk) -> Self {
        Self {
            by_mission: Mutex::new(HashMap::new()),
            default_risk,
        }
    }

    pub fn set(&self, mission_id: &str, risk: ClassifiedRisk) {
        self.by_mission
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .insert(mission_id.to_string(), risk);
    }
}

#[async_trait]
impl MissionClassifier for StaticClassifier {
    async fn classify(
        &self,
        _cancel: &CancellationToken,
        _commission: &Commission,
        mission: &MissionPlan,
    ) -> DomainResult<ClassifiedRisk> {
        Ok(self
            .by_mission
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .get(&mission.id)
            .cloned()
            .unwrap_or_else(|| self.default_risk.clone()))
    }
}
