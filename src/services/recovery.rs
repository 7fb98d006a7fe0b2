//! Recovery manager: one-shot startup reconciliation.
//!
//! Reconciles persisted state against live harness sessions: in-progress
//! missions whose agent or session is gone return to the backlog, their
//! agents are marked dead (dead first, then session cleanup), and
//! commissions still `executing` are returned for resumption.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{AgentSession, AgentState, MissionState, RecordFilter, RecordType};
use crate::domain::ports::{Clock, RecordStore, SessionManager};
use crate::services::event_bus::{CoreEvent, EventBus, EventKind, EventSeverity};
use crate::services::state_machine::StateMachine;

/// Configuration for recovery.
#[derive(Debug, Clone)]
pub struct RecoveryConfig {
    pub resume_timeout_secs: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            resume_timeout_secs: 10,
        }
    }
}

/// What recovery reconciled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Commissions in `executing` state, to be resumed by the caller.
    pub resume_commission_ids: Vec<String>,
    pub missions_reset: Vec<String>,
    pub agents_marked_dead: Vec<String>,
    pub sessions_cleaned: Vec<String>,
    pub duration_ms: u64,
}

pub struct RecoveryManager {
    store: Arc<dyn RecordStore>,
    sessions: Arc<dyn SessionManager>,
    state: Arc<StateMachine>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: RecoveryConfig,
}

impl RecoveryManager {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionManager>,
        state: Arc<StateMachine>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: RecoveryConfig,
    ) -> Self {
        Self {
            store,
            sessions,
            state,
            bus,
            clock,
            config,
        }
    }

    /// Run the reconciliation, bounded by the resume timeout.
    pub async fn recover(&self) -> DomainResult<RecoveryReport> {
        let started = self.clock.now();
        let bound = Duration::from_secs(self.config.resume_timeout_secs);
        let mut report = tokio::time::timeout(bound, self.reconcile())
            .await
            .map_err(|_| DomainError::Timeout {
                operation: "startup recovery".into(),
                timeout_secs: self.config.resume_timeout_secs,
            })??;

        report.duration_ms =
            u64::try_from((self.clock.now() - started).num_milliseconds().max(0)).unwrap_or(0);
        self.bus.publish(CoreEvent::new(
            EventKind::HealthCheck,
            EventSeverity::Info,
            None,
            json!({
                "source": "recovery",
                "resume_commissions": report.resume_commission_ids.len(),
                "missions_reset": report.missions_reset.len(),
                "agents_marked_dead": report.agents_marked_dead.len(),
                "sessions_cleaned": report.sessions_cleaned.len(),
                "duration_ms": report.duration_ms,
            }),
        ));
        tracing::info!(
            resume = report.resume_commission_ids.len(),
            reset = report.missions_reset.len(),
            dead = report.agents_marked_dead.len(),
            "recovery complete"
        );
        Ok(report)
    }

    async fn reconcile(&self) -> DomainResult<RecoveryReport> {
        let commissions = self
            .store
            .list(RecordFilter {
                record_type: Some(RecordType::Commission),
                ..RecordFilter::default()
            })
            .await?;
        let missions = self
            .store
            .list(RecordFilter {
                record_type: Some(RecordType::Mission),
                ..RecordFilter::default()
            })
            .await?;
        let agents = self
            .store
            .list(RecordFilter {
                record_type: Some(RecordType::Agent),
                ..RecordFilter::default()
            })
            .await?;
        let live: BTreeSet<String> = self.sessions.live_sessions().await?.into_iter().collect();

        let descriptors: Vec<AgentSession> = agents
            .iter()
            .filter_map(|record| AgentSession::from_record(record).ok())
            .collect();
        let mut report = RecoveryReport::default();
        let mut marked_dead: BTreeSet<String> = BTreeSet::new();

        for mission in &missions {
            if mission.state_value("mission_state") != Some(MissionState::InProgress.as_str()) {
                continue;
            }
            let agent = mission
                .state_value("assigned_agent")
                .and_then(|agent_id| descriptors.iter().find(|a| a.id == agent_id));
            let session_live = agent
                .and_then(|a| a.session_id.as_deref())
                .map_or(false, |s| live.contains(s));
            if session_live {
                continue;
            }

            self.state
                .transition(
                    &mission.id,
                    MissionState::InProgress,
                    MissionState::Backlog,
                    "recovery: agent or session lost",
                    "recovery",
                )
                .await?;
            report.missions_reset.push(mission.id.clone());

            if let Some(agent) = agent {
                if agent.state.is_active() {
                    self.state
                        .transition(&agent.id, agent.state, AgentState::Dead, "recovery: session lost", "recovery")
                        .await?;
                    marked_dead.insert(agent.id.clone());
                    report.agents_marked_dead.push(agent.id.clone());
                }
            }
        }

        // Remaining active agents with non-live sessions: mark dead first,
        // then clean up the session.
        for agent in &descriptors {
            if marked_dead.contains(&agent.id) || !agent.state.is_active() {
                continue;
            }
            let session_id = agent.session_id.as_deref();
            if session_id.map_or(false, |s| live.contains(s)) {
                continue;
            }
            self.state
                .transition(&agent.id, agent.state, AgentState::Dead, "recovery: session not live", "recovery")
                .await?;
            report.agents_marked_dead.push(agent.id.clone());
            if let Some(session_id) = session_id {
                self.sessions.cleanup_dead_session(session_id).await?;
                report.sessions_cleaned.push(session_id.to_string());
            }
        }

        for commission in &commissions {
            if commission.state_value("commission_status") == Some("executing") {
                report.resume_commission_ids.push(commission.id.clone());
            }
        }
        report.resume_commission_ids.sort();

        Ok(report)
    }
}
