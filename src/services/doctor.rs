//! Doctor: periodic supervision of agents, missions, and sessions.
//!
//! Each tick loads a snapshot from the record store and the live session
//! set, marks heartbeat-expired agents stuck, returns orphaned missions
//! to the backlog, and cleans up zombie sessions. Tick errors alert and
//! never crash the supervisor.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::DomainResult;
use crate::domain::models::{AgentSession, AgentState, MissionState, RecordFilter, RecordType};
use crate::domain::ports::{Clock, RecordStore, SessionManager};
use crate::services::event_bus::{CoreEvent, EventBus, EventKind, EventSeverity};
use crate::services::state_machine::StateMachine;

/// Configuration for the supervisor.
#[derive(Debug, Clone)]
pub struct DoctorConfig {
    pub tick_interval_secs: u64,
    pub stuck_timeout_secs: u64,
}

impl Default for DoctorConfig {
    fn default() -> Self {
        Self {
            tick_interval_secs: 30,
            stuck_timeout_secs: 300,
        }
    }
}

/// What one tick found and repaired.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DoctorReport {
    pub agents_total: usize,
    pub agents_active: usize,
    pub stuck_marked: Vec<String>,
    pub orphans_repaired: Vec<String>,
    pub zombies_cleaned: Vec<String>,
}

pub struct Doctor {
    store: Arc<dyn RecordStore>,
    sessions: Arc<dyn SessionManager>,
    state: Arc<StateMachine>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: DoctorConfig,
}

impl Doctor {
    pub fn new(
        store: Arc<dyn RecordStore>,
        sessions: Arc<dyn SessionManager>,
        state: Arc<StateMachine>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: DoctorConfig,
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

    /// Supervision loop; stops when the token is cancelled.
    pub async fn run(&self, cancel: &CancellationToken) {
        let mut interval =
            tokio::time::interval(Duration::from_secs(self.config.tick_interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    if let Err(e) = self.tick().await {
                        self.bus.publish(CoreEvent::new(
                            EventKind::SystemAlert,
                            EventSeverity::Error,
                            None,
                            json!({ "error": e.to_string(), "source": "doctor" }),
                        ));
                        tracing::error!(error = %e, "doctor tick failed");
                    }
                }
                () = cancel.cancelled() => {
                    tracing::info!("doctor stopped");
                    return;
                }
            }
        }
    }

    /// One supervision pass.
    pub async fn tick(&self) -> DomainResult<DoctorReport> {
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

        let mut report = DoctorReport {
            agents_total: agents.len(),
            ..DoctorReport::default()
        };

        let descriptors: Vec<AgentSession> = agents
            .iter()
            .filter_map(|record| AgentSession::from_record(record).ok())
            .collect();
        for descriptor in &descriptors {
            if descriptor.state.is_active() {
                report.agents_active += 1;
            }
            if descriptor.state.is_runnable() && self.heartbeat_expired(descriptor) {
                self.state
                    .transition(
                        &descriptor.id,
                        descriptor.state,
                        AgentState::Stuck,
                        "heartbeat expired",
                        "doctor",
                    )
                    .await?;
                self.bus.publish(CoreEvent::new(
                    EventKind::StateTransition,
                    EventSeverity::Warning,
                    None,
                    json!({
                        "entity": "agent",
                        "id": descriptor.id,
                        "from": descriptor.state.as_str(),
                        "to": AgentState::Stuck.as_str(),
                    }),
                ));
                report.stuck_marked.push(descriptor.id.clone());
            }
        }

        for mission in &missions {
            if mission.state_value("mission_state") != Some(MissionState::InProgress.as_str()) {
                continue;
            }
            let session = mission
                .state_value("assigned_agent")
                .and_then(|agent_id| descriptors.iter().find(|a| a.id == agent_id))
                .and_then(|agent| agent.session_id.as_deref());
            let orphaned = match session {
                None => true,
                Some(session_id) => !live.contains(session_id),
            };
            if orphaned {
                self.state
                    .transition(
                        &mission.id,
                        MissionState::InProgress,
                        MissionState::Backlog,
                        "orphaned mission repair",
                        "doctor",
                    )
                    .await?;
                report.orphans_repaired.push(mission.id.clone());
            }
        }

        let claimed: BTreeSet<&str> = descriptors
            .iter()
            .filter_map(|a| a.session_id.as_deref())
            .collect();
        for session_id in &live {
            if !claimed.contains(session_id.as_str()) {
                self.sessions.cleanup_dead_session(session_id).await?;
                report.zombies_cleaned.push(session_id.clone());
            }
        }

        self.bus.publish(CoreEvent::new(
            EventKind::HealthCheck,
            EventSeverity::Info,
            None,
            json!({
                "agents_total": report.agents_total,
                "agents_active": report.agents_active,
                "stuck_marked": report.stuck_marked.len(),
                "orphans_repaired": report.orphans_repaired.len(),
                "zombies_cleaned": report.zombies_cleaned.len(),
                "missions_checked": missions.len(),
            }),
        ));
        tracing::debug!(
            agents = report.agents_total,
            stuck = report.stuck_marked.len(),
            orphans = report.orphans_repaired.len(),
            zombies = report.zombies_cleaned.len(),
            "doctor tick complete"
        );
        Ok(report)
    }

    fn heartbeat_expired(&self, agent: &AgentSession) -> bool {
        let Some(heartbeat) = agent.last_heartbeat else {
            return true;
        };
        let age = (self.clock.now() - heartbeat).num_seconds();
        age >= 0 && u64::try_from(age).unwrap_or(u64::MAX) > self.config.stuck_timeout_secs
    }
}

impl std::fmt::Debug for Doctor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Doctor").field("config", &self.config).finish()
    }
}
