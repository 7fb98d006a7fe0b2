//! Mission executor: wave scheduling over the approved manifest.
//!
//! Reads the approved plan, obtains decider authorization, then executes
//! missions wave by wave: worktree, surface locks, implementer dispatch,
//! phase pipeline per acceptance criterion, demo-token validation, and
//! the reviewer loop with a bounded revision ceiling.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AcPhase, ApprovalDecision, ApprovalRequest, Commission, CommissionStatus, HaltReason,
    MissionPlan, MissionState, ProtocolEventType, RecordDraft, RecordType, ReviewOutcome,
    ReviewVerdict, WaveAssignment,
};
use crate::domain::ports::{
    HarnessDriver, HarnessSession, ProtocolLog, RecordStore, SpawnOptions, WorktreeManager,
};
use crate::services::approval_gate::ApprovalGate;
use crate::services::demo_validator::DemoValidator;
use crate::services::event_bus::{CoreEvent, EventBus, EventKind, EventSeverity};
use crate::services::lock_manager::SurfaceLockManager;
use crate::services::phase_pipeline::{
    criterion_record_id, InstructionDispatcher, PhaseContext, PhaseInstruction, PhasePipeline,
};
use crate::services::plan_store::{FeedbackInjector, PlanShelver, PlanStore};
use crate::services::state_machine::StateMachine;

/// Configuration for the executor.
#[derive(Debug, Clone)]
pub struct MissionExecutorConfig {
    pub wip_limit: usize,
    pub review_poll_interval_secs: u64,
    pub review_timeout_secs: u64,
    /// Default revision ceiling when a mission does not declare one.
    pub max_revisions: u32,
}

impl Default for MissionExecutorConfig {
    fn default() -> Self {
        Self {
            wip_limit: 1,
            review_poll_interval_secs: 2,
            review_timeout_secs: 600,
            max_revisions: 3,
        }
    }
}

/// Outcome summary of one `execute` call.
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    pub commission_id: String,
    pub waves: u32,
    pub completed: Vec<String>,
    pub halted: Vec<String>,
}

enum MissionOutcome {
    Completed,
    Deferred,
    Halted(HaltReason),
}

/// Routes phase instructions to the implementer session of each mission.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: Mutex<HashMap<String, HarnessSession>>,
    harness: Mutex<Option<Arc<dyn HarnessDriver>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn bind_harness(&self, harness: Arc<dyn HarnessDriver>) {
        *self.harness.lock().await = Some(harness);
    }

    pub async fn register(&self, mission_id: &str, session: HarnessSession) {
        self.sessions
            .lock()
            .await
            .insert(mission_id.to_string(), session);
    }

    pub async fn session_for(&self, mission_id: &str) -> Option<HarnessSession> {
        self.sessions.lock().await.get(mission_id).cloned()
    }
}

#[async_trait]
impl InstructionDispatcher for SessionRegistry {
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        instruction: PhaseInstruction,
    ) -> DomainResult<()> {
        let session = self
            .session_for(&instruction.mission_id)
            .await
            .ok_or_else(|| {
                DomainError::Harness(format!(
                    "no implementer session registered for mission {}",
                    instruction.mission_id
                ))
            })?;
        let harness = self
            .harness
            .lock()
            .await
            .clone()
            .ok_or_else(|| DomainError::Harness("no harness bound".into()))?;
        let message = render_phase_message(&instruction);
        harness.send_message(cancel, &session, &message).await?;
        Ok(())
    }
}

fn render_phase_message(instruction: &PhaseInstruction) -> String {
    let mut message = format!(
        "phase={} attempt={} mission {} criterion {}\n{}\nworktree: {}\n",
        instruction.phase,
        instruction.attempt,
        instruction.mission_id,
        instruction.ac_id,
        instruction.ac_description,
        instruction.worktree.display(),
    );
    if let Some(prev) = &instruction.previous_output {
        message.push_str(&format!("previous phase output:\n{prev}\n"));
    }
    if let Some(feedback) = &instruction.prior_feedback {
        message.push_str(&format!("gate feedback:\n{feedback}\n"));
    }
    if let Some(feedback) = &instruction.wave_feedback {
        message.push_str(&format!("wave checkpoint feedback:\n{feedback}\n"));
    }
    message
}

pub struct MissionExecutor {
    store: Arc<dyn RecordStore>,
    plans: Arc<PlanStore>,
    approval: Arc<ApprovalGate>,
    shelver: Arc<dyn PlanShelver>,
    feedback: Arc<dyn FeedbackInjector>,
    worktrees: Arc<dyn WorktreeManager>,
    harness: Arc<dyn HarnessDriver>,
    registry: Arc<SessionRegistry>,
    pipeline: Arc<PhasePipeline>,
    locks: Arc<SurfaceLockManager>,
    state: Arc<StateMachine>,
    bus: Arc<EventBus>,
    log: Arc<dyn ProtocolLog>,
    validator: DemoValidator,
    config: MissionExecutorConfig,
}

impl MissionExecutor {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn RecordStore>,
        plans: Arc<PlanStore>,
        approval: Arc<ApprovalGate>,
        shelver: Arc<dyn PlanShelver>,
        feedback: Arc<dyn FeedbackInjector>,
        worktrees: Arc<dyn WorktreeManager>,
        harness: Arc<dyn HarnessDriver>,
        registry: Arc<SessionRegistry>,
        pipeline: Arc<PhasePipeline>,
        locks: Arc<SurfaceLockManager>,
        state: Arc<StateMachine>,
        bus: Arc<EventBus>,
        log: Arc<dyn ProtocolLog>,
        config: MissionExecutorConfig,
    ) -> Self {
        Self {
            store,
            plans,
            approval,
            shelver,
            feedback,
            worktrees,
            harness,
            registry,
            pipeline,
            locks,
            state,
            bus,
            log,
            validator: DemoValidator::new(),
            config,
        }
    }

    /// Execute the approved manifest of a commission.
    pub async fn execute(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        commission_id: &str,
    ) -> DomainResult<ExecutionReport> {
        self.registry.bind_harness(self.harness.clone()).await;

        let envelope = self.plans.load_plan(commission_id).await?;
        let manifest = envelope.state.mission_list.clone();
        if manifest.is_empty() {
            return Err(DomainError::Validation(format!(
                "commission {commission_id} has no approved missions"
            )));
        }
        let commission = self.load_commission(commission_id).await?;
        let waves = assign_waves(&manifest);
        let max_approvals = u32::try_from(waves.len()).unwrap_or(u32::MAX) + 1;

        // Top-level approval gates the whole run.
        let request = ApprovalRequest {
            commission_id: commission_id.to_string(),
            manifest: manifest.clone(),
            wave_assignments: waves.clone(),
            coverage: envelope.state.coverage_map.clone(),
            iteration: 1,
            max_iterations: max_approvals,
            wave_review: false,
        };
        match self.approval.request_decision(cancel, request).await? {
            ApprovalDecision::Approved => {}
            ApprovalDecision::Feedback(text) => {
                self.feedback.inject(commission_id, &text).await?;
                return Err(DomainError::ApprovalFeedback(text));
            }
            ApprovalDecision::Shelved(text) => {
                self.shelver.shelve(commission_id, &text).await?;
                return Err(DomainError::ApprovalShelved(text));
            }
            ApprovalDecision::Halted(text) => {
                tracing::warn!(commission_id, reason = %text, "run halted at approval");
                return Err(DomainError::Halted {
                    mission_id: None,
                    reason: HaltReason::ApprovalHalted,
                });
            }
        }
        self.state
            .transition(
                commission_id,
                CommissionStatus::Approved,
                CommissionStatus::Executing,
                "approval granted",
                "executor",
            )
            .await?;

        let mission_index: HashMap<String, MissionPlan> =
            manifest.iter().cloned().map(|m| (m.id.clone(), m)).collect();
        let mut report = ExecutionReport {
            commission_id: commission_id.to_string(),
            ..ExecutionReport::default()
        };
        let mut wave_number: u32 = 0;
        let mut wave_feedback: Option<String> = None;

        loop {
            if cancel.is_cancelled() {
                return Err(DomainError::Canceled);
            }
            let ready = self.store.ready_missions(commission_id).await?;
            let ready_missions: Vec<MissionPlan> = ready
                .iter()
                .filter_map(|r| mission_index.get(&r.id).cloned())
                .collect();
            if ready_missions.is_empty() {
                break;
            }
            wave_number += 1;

            if wave_number > 1 {
                let request = ApprovalRequest {
                    commission_id: commission_id.to_string(),
                    manifest: manifest.clone(),
                    wave_assignments: waves.clone(),
                    coverage: envelope.state.coverage_map.clone(),
                    iteration: wave_number.min(max_approvals),
                    max_iterations: max_approvals,
                    wave_review: true,
                };
                match self.approval.request_decision(cancel, request).await? {
                    ApprovalDecision::Approved => {}
                    ApprovalDecision::Feedback(text) => {
                        self.bus.publish(CoreEvent::new(
                            EventKind::WaveFeedbackRecorded,
                            EventSeverity::Info,
                            None,
                            json!({ "wave": wave_number, "feedback": text }),
                        ));
                        wave_feedback = Some(text);
                    }
                    ApprovalDecision::Halted(text) => {
                        tracing::warn!(commission_id, wave = wave_number, reason = %text, "wave halted");
                        return Err(DomainError::Halted {
                            mission_id: None,
                            reason: HaltReason::ApprovalHalted,
                        });
                    }
                    ApprovalDecision::Shelved(text) => {
                        self.shelver.shelve(commission_id, &text).await?;
                        return Err(DomainError::ApprovalShelved(text));
                    }
                }
            }

            let progressed = self
                .run_wave(
                    cancel,
                    &commission,
                    &ready_missions,
                    wave_feedback.clone(),
                    &mut report,
                )
                .await?;
            if !progressed {
                self.bus.publish(CoreEvent::new(
                    EventKind::SystemAlert,
                    EventSeverity::Error,
                    None,
                    json!({
                        "error": "wave made no progress; all ready missions deferred",
                        "wave": wave_number,
                    }),
                ));
                return Err(DomainError::Validation(
                    "wave made no progress; all ready missions deferred on lock conflicts".into(),
                ));
            }
        }

        report.waves = wave_number;
        if report.halted.is_empty() && report.completed.len() == manifest.len() {
            self.state
                .transition(
                    commission_id,
                    CommissionStatus::Executing,
                    CommissionStatus::Completed,
                    "all missions done",
                    "executor",
                )
                .await?;
        }
        Ok(report)
    }

    /// Run one wave; missions execute in ready-list order, up to the WIP
    /// limit concurrently. Returns false when every mission deferred.
    async fn run_wave(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        commission: &Commission,
        missions: &[MissionPlan],
        wave_feedback: Option<String>,
        report: &mut ExecutionReport,
    ) -> DomainResult<bool> {
        let mut progressed = false;
        let mut halt_error: Option<DomainError> = None;

        for chunk in missions.chunks(self.config.wip_limit.max(1)) {
            let mut join_set: JoinSet<(String, DomainResult<MissionOutcome>)> = JoinSet::new();
            for mission in chunk {
                let executor = Arc::clone(self);
                let mission = mission.clone();
                let commission = commission.clone();
                let cancel = cancel.clone();
                let feedback = wave_feedback.clone();
                join_set.spawn(async move {
                    let id = mission.id.clone();
                    let outcome = executor
                        .run_mission(&cancel, &commission, &mission, feedback)
                        .await;
                    (id, outcome)
                });
            }
            while let Some(joined) = join_set.join_next().await {
                let (mission_id, outcome) = joined
                    .map_err(|e| DomainError::Store(format!("mission task panicked: {e}")))?;
                match outcome {
                    Ok(MissionOutcome::Completed) => {
                        progressed = true;
                        report.completed.push(mission_id);
                    }
                    Ok(MissionOutcome::Deferred) => {
                        tracing::info!(mission_id, "mission deferred to next wave on lock conflict");
                    }
                    Ok(MissionOutcome::Halted(reason)) => {
                        progressed = true;
                        report.halted.push(mission_id.clone());
                        if matches!(reason, HaltReason::MaxRevisionsExceeded) {
                            halt_error = Some(DomainError::Halted {
                                mission_id: Some(mission_id),
                                reason,
                            });
                        }
                    }
                    Err(e @ DomainError::Canceled) => return Err(e),
                    Err(e) => {
                        // The mission aborts; the wave machinery continues.
                        progressed = true;
                        report.halted.push(mission_id.clone());
                        self.abort_mission(&mission_id, &e).await;
                    }
                }
            }
        }

        if let Some(err) = halt_error {
            return Err(err);
        }
        Ok(progressed)
    }

    async fn abort_mission(&self, mission_id: &str, error: &DomainError) {
        tracing::error!(mission_id, error = %error, "mission aborted");
        self.bus.publish(CoreEvent::new(
            EventKind::SystemAlert,
            EventSeverity::Error,
            Some(mission_id.to_string()),
            json!({ "error": error.to_string() }),
        ));
        if let Ok(record) = self.store.show(mission_id).await {
            if let Some(state) = record.state_value("mission_state") {
                if let Ok(current) = crate::domain::models::MissionState::parse(state) {
                    if !current.is_terminal() {
                        let _ = self
                            .state
                            .transition(mission_id, current, MissionState::Halted, &error.to_string(), "executor")
                            .await;
                    }
                }
            }
        }
        self.emit_halted(mission_id, &HaltReason::Internal(error.to_string()));
        let _ = self.locks.release(mission_id).await;
    }

    fn emit_halted(&self, mission_id: &str, reason: &HaltReason) {
        self.bus.publish(CoreEvent::new(
            EventKind::MissionHalted,
            EventSeverity::Error,
            Some(mission_id.to_string()),
            json!({ "mission_id": mission_id, "reason": reason.to_string() }),
        ));
    }

    async fn run_mission(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        commission: &Commission,
        mission: &MissionPlan,
        wave_feedback: Option<String>,
    ) -> DomainResult<MissionOutcome> {
        let worktree = self.worktrees.create(cancel, &mission.id).await?;

        match self.locks.acquire(&mission.id, &mission.surface_area).await {
            Ok(_) => {}
            Err(DomainError::Conflict { holders, .. }) => {
                tracing::info!(mission_id = %mission.id, ?holders, "surface conflict, deferring");
                return Ok(MissionOutcome::Deferred);
            }
            Err(e) => return Err(e),
        }

        self.state
            .transition(
                &mission.id,
                MissionState::Backlog,
                MissionState::InProgress,
                "implementer dispatched",
                "executor",
            )
            .await?;

        let prompt = render_implementer_prompt(commission, mission, &worktree, wave_feedback.as_deref());
        let session = self
            .harness
            .spawn_session(
                cancel,
                "implementer",
                &prompt,
                &worktree,
                SpawnOptions {
                    mission_id: Some(mission.id.clone()),
                    ..SpawnOptions::default()
                },
            )
            .await?;
        self.registry.register(&mission.id, session.clone()).await;
        self.register_agent(&mission.id, &session).await?;

        let result = self
            .drive_mission(cancel, commission, mission, &worktree, wave_feedback, &session)
            .await;

        if let Err(e) = self.harness.terminate(&session).await {
            tracing::warn!(mission_id = %mission.id, error = %e, "implementer terminate failed");
        }
        result
    }

    /// Phases, demo validation, and the reviewer loop.
    async fn drive_mission(
        self: &Arc<Self>,
        cancel: &CancellationToken,
        commission: &Commission,
        mission: &MissionPlan,
        worktree: &PathBuf,
        wave_feedback: Option<String>,
        implementer: &HarnessSession,
    ) -> DomainResult<MissionOutcome> {
        let max_revisions = mission.max_revisions.unwrap_or(self.config.max_revisions);
        let ctx = PhaseContext {
            worktree: worktree.clone(),
            wave_feedback,
        };

        self.run_criteria(cancel, commission, mission, &ctx).await?;
        self.validator.validate(worktree, mission).await?;

        // The initial dispatch is revision 1.
        let mut revision: u32 = 1;
        self.store
            .set_state(&mission.id, "revision", &revision.to_string())
            .await?;

        loop {
            if cancel.is_cancelled() {
                return Err(DomainError::Canceled);
            }
            self.state
                .transition(
                    &mission.id,
                    MissionState::InProgress,
                    MissionState::Review,
                    "awaiting review",
                    "executor",
                )
                .await?;

            let review = self.run_review(cancel, mission, worktree, implementer).await?;
            match review {
                Some(outcome) if outcome.verdict == ReviewVerdict::Approved => {
                    self.state
                        .transition(&mission.id, MissionState::Review, MissionState::Approved, "review approved", "reviewer")
                        .await?;
                    self.state
                        .transition(&mission.id, MissionState::Approved, MissionState::Done, "mission complete", "executor")
                        .await?;
                    self.bus.publish(CoreEvent::new(
                        EventKind::MissionCompleted,
                        EventSeverity::Info,
                        Some(mission.id.clone()),
                        json!({ "mission_id": mission.id, "revision": revision }),
                    ));
                    self.locks.release(&mission.id).await?;
                    return Ok(MissionOutcome::Completed);
                }
                Some(outcome) => {
                    let next_revision = revision + 1;
                    if next_revision > max_revisions {
                        self.state
                            .transition(
                                &mission.id,
                                MissionState::Review,
                                MissionState::Halted,
                                "revision ceiling exceeded",
                                "executor",
                            )
                            .await?;
                        self.emit_halted(&mission.id, &HaltReason::MaxRevisionsExceeded);
                        self.locks.release(&mission.id).await?;
                        return Ok(MissionOutcome::Halted(HaltReason::MaxRevisionsExceeded));
                    }
                    revision = next_revision;
                    self.store
                        .set_state(&mission.id, "revision", &revision.to_string())
                        .await?;
                    self.state
                        .transition(
                            &mission.id,
                            MissionState::Review,
                            MissionState::InProgress,
                            "reviewer requested fixes",
                            "executor",
                        )
                        .await?;
                    let rework = format!(
                        "revision {revision} of mission {}\nreviewer feedback:\n{}",
                        mission.id, outcome.feedback
                    );
                    self.harness
                        .send_message(cancel, implementer, &rework)
                        .await?;
                    // Criteria already complete are skipped; a reworked
                    // mission re-validates evidence and re-enters review.
                    self.run_criteria(cancel, commission, mission, &ctx).await?;
                    self.validator.validate(worktree, mission).await?;
                }
                None => {
                    self.state
                        .transition(
                            &mission.id,
                            MissionState::Review,
                            MissionState::Halted,
                            "review timed out",
                            "executor",
                        )
                        .await?;
                    self.emit_halted(&mission.id, &HaltReason::ReviewTimeout);
                    self.locks.release(&mission.id).await?;
                    return Ok(MissionOutcome::Halted(HaltReason::ReviewTimeout));
                }
            }
        }
    }

    async fn run_criteria(
        &self,
        cancel: &CancellationToken,
        commission: &Commission,
        mission: &MissionPlan,
        ctx: &PhaseContext,
    ) -> DomainResult<()> {
        for ac in commission.criteria_for(&mission.use_case_ids) {
            let record_id = criterion_record_id(&mission.id, &ac.id);
            let current = match self.store.show(&record_id).await {
                Ok(record) => record
                    .state_value("ac_phase")
                    .map(AcPhase::parse)
                    .transpose()?,
                Err(DomainError::NotFound { .. }) => {
                    self.store
                        .create(RecordDraft {
                            id: Some(record_id.clone()),
                            record_type: Some(RecordType::Criterion),
                            title: ac.description.clone(),
                            parent: Some(mission.id.clone()),
                            ..RecordDraft::default()
                        })
                        .await?;
                    None
                }
                Err(e) => return Err(e),
            };
            if current == Some(AcPhase::Complete) {
                continue;
            }
            if current.is_none() {
                let initial = AcPhase::initial(mission.classification.tag);
                self.store
                    .set_state(&record_id, "ac_phase", initial.as_str())
                    .await?;
            }
            self.pipeline.run_criterion(cancel, mission, &ac, ctx).await?;
        }
        Ok(())
    }

    /// Dispatch the reviewer and poll for its verdict; None on timeout.
    async fn run_review(
        &self,
        cancel: &CancellationToken,
        mission: &MissionPlan,
        worktree: &PathBuf,
        implementer: &HarnessSession,
    ) -> DomainResult<Option<ReviewOutcome>> {
        let cursor = self.log.latest_seq().await?;
        let prompt = format!(
            "Review mission {} in {}.\nImplementer session: {}\nEmit REVIEW_COMPLETE with your verdict.",
            mission.id,
            worktree.display(),
            implementer.id,
        );
        let reviewer = self
            .harness
            .spawn_session(
                cancel,
                "reviewer",
                &prompt,
                worktree,
                SpawnOptions {
                    mission_id: Some(mission.id.clone()),
                    ..SpawnOptions::default()
                },
            )
            .await?;

        let poll = Duration::from_secs(self.config.review_poll_interval_secs.max(1));
        let timeout = Duration::from_secs(self.config.review_timeout_secs);
        let started = tokio::time::Instant::now();
        let outcome = loop {
            if cancel.is_cancelled() {
                if let Err(e) = self.harness.terminate(&reviewer).await {
                    tracing::warn!(error = %e, "reviewer terminate failed");
                }
                return Err(DomainError::Canceled);
            }
            let events = self.log.events_after(&mission.id, cursor).await?;
            if let Some(event) = events
                .iter()
                .find(|e| e.event_type == ProtocolEventType::ReviewComplete)
            {
                break Some(ReviewOutcome::from_payload(&event.payload)?);
            }
            if started.elapsed() >= timeout {
                tracing::warn!(mission_id = %mission.id, "review timed out");
                break None;
            }
            tokio::time::sleep(poll).await;
        };

        if let Err(e) = self.harness.terminate(&reviewer).await {
            tracing::warn!(error = %e, "reviewer terminate failed");
        }
        Ok(outcome)
    }

    async fn register_agent(&self, mission_id: &str, session: &HarnessSession) -> DomainResult<()> {
        let agent_id = format!("agent-{}", session.id);
        match self
            .store
            .create(RecordDraft {
                id: Some(agent_id.clone()),
                record_type: Some(RecordType::Agent),
                title: session.role.clone(),
                parent: Some(mission_id.to_string()),
                ..RecordDraft::default()
            })
            .await
        {
            Ok(_) => {}
            Err(DomainError::Store(msg)) if msg.contains("already exists") => {}
            Err(e) => return Err(e),
        }
        self.store
            .set_state(&agent_id, "agent_state", "running")
            .await?;
        self.store
            .set_label(&agent_id, "session_id", &session.id)
            .await?;
        self.store
            .set_state(mission_id, "assigned_agent", &agent_id)
            .await?;
        self.store
            .set_label(mission_id, "session_id", &session.id)
            .await?;
        self.store.heartbeat(&agent_id).await?;
        Ok(())
    }

    async fn load_commission(&self, commission_id: &str) -> DomainResult<Commission> {
        let record = self.store.show(commission_id).await?;
        Commission::from_yaml(&record.body).map_err(|e| {
            DomainError::Store(format!(
                "commission {commission_id} body is not a valid commission: {e}"
            ))
        })
    }
}

/// Assign missions to waves by dependency depth; missions with no
/// unresolved dependencies land in wave 1.
pub fn assign_waves(manifest: &[MissionPlan]) -> Vec<WaveAssignment> {
    let ids: HashMap<&str, &MissionPlan> =
        manifest.iter().map(|m| (m.id.as_str(), m)).collect();

    fn depth(
        mission: &MissionPlan,
        ids: &HashMap<&str, &MissionPlan>,
        memo: &mut HashMap<String, u32>,
        visiting: &mut Vec<String>,
    ) -> u32 {
        if let Some(d) = memo.get(&mission.id) {
            return *d;
        }
        if visiting.contains(&mission.id) {
            // Cycle guard: break it at the first repeated node.
            return 1;
        }
        visiting.push(mission.id.clone());
        let d = 1 + mission
            .depends_on
            .iter()
            .filter_map(|dep| ids.get(dep.as_str()))
            .map(|dep| depth(dep, ids, memo, visiting))
            .max()
            .unwrap_or(0);
        visiting.pop();
        memo.insert(mission.id.clone(), d);
        d
    }

    let mut memo = HashMap::new();
    let mut by_wave: std::collections::BTreeMap<u32, Vec<String>> = std::collections::BTreeMap::new();
    for mission in manifest {
        let d = depth(mission, &ids, &mut memo, &mut Vec::new());
        by_wave.entry(d).or_default().push(mission.id.clone());
    }
    by_wave
        .into_iter()
        .map(|(wave, mut mission_ids)| {
            mission_ids.sort();
            WaveAssignment { wave, mission_ids }
        })
        .collect()
}

fn render_implementer_prompt(
    commission: &Commission,
    mission: &MissionPlan,
    worktree: &std::path::Path,
    wave_feedback: Option<&str>,
) -> String {
    let criteria = commission
        .criteria_for(&mission.use_case_ids)
        .iter()
        .map(|ac| format!("- {}: {}", ac.id, ac.description))
        .collect::<Vec<_>>()
        .join("\n");
    let token_path = crate::domain::models::demo_token::canonical_path(worktree, &mission.id);
    let mut prompt = format!(
        "Implement mission {} ({}) for commission {}.\nClassification: {}\n\
         Acceptance criteria:\n{}\nWorktree: {}\n\
         Leave completion evidence at {}\n",
        mission.id,
        mission.title,
        commission.id,
        mission.classification.tag,
        criteria,
        worktree.display(),
        token_path.display(),
    );
    if let Some(feedback) = wave_feedback {
        prompt.push_str(&format!("Wave checkpoint feedback:\n{feedback}\n"));
    }
    prompt
}
