//! Per-acceptance-criterion TDD phase pipeline.
//!
//! RED_ALERT missions run red -> verify_red -> green -> verify_green ->
//! refactor -> verify_refactor -> complete; STANDARD_OPS missions run the
//! compressed implement -> verify_implement -> complete. Each work phase
//! dispatches an instruction to the harness, waits for the matching
//! phase-complete protocol event, then runs the verify gate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    AcPhase, AcceptanceCriterion, MissionPlan, ProtocolEvent, ProtocolEventType,
};
use crate::domain::ports::{Clock, GateKind, GateRequest, GateRunner, ProtocolLog};
use crate::services::event_bus::{CoreEvent, EventBus, EventKind, EventSeverity};
use crate::services::state_machine::StateMachine;

/// Record id of the per-(mission, AC) phase pointer.
pub fn criterion_record_id(mission_id: &str, ac_id: &str) -> String {
    format!("{mission_id}/{ac_id}")
}

/// One phase-specific instruction for the implementer.
#[derive(Debug, Clone)]
pub struct PhaseInstruction {
    pub mission_id: String,
    pub mission_title: String,
    pub ac_id: String,
    pub ac_description: String,
    pub phase: AcPhase,
    pub attempt: u32,
    pub worktree: PathBuf,
    /// Output captured from the previous completed phase.
    pub previous_output: Option<String>,
    /// Gate feedback from a rejected attempt of this phase.
    pub prior_feedback: Option<String>,
    /// Inter-wave approval feedback carried into this mission.
    pub wave_feedback: Option<String>,
}

/// Sends phase instructions to the implementer session.
#[async_trait]
pub trait InstructionDispatcher: Send + Sync {
    async fn dispatch(
        &self,
        cancel: &CancellationToken,
        instruction: PhaseInstruction,
    ) -> DomainResult<()>;
}

/// Context shared by every phase of one criterion run.
#[derive(Debug, Clone, Default)]
pub struct PhaseContext {
    pub worktree: PathBuf,
    pub wave_feedback: Option<String>,
}

/// Configuration for the pipeline.
#[derive(Debug, Clone)]
pub struct PhasePipelineConfig {
    /// Bound on each wait for a phase-complete event.
    pub phase_timeout_secs: u64,
    /// Attempts per phase before the criterion halts.
    pub max_attempts: u32,
    /// Event store poll granularity.
    pub poll_interval_ms: u64,
}

impl Default for PhasePipelineConfig {
    fn default() -> Self {
        Self {
            phase_timeout_secs: 300,
            max_attempts: 3,
            poll_interval_ms: 50,
        }
    }
}

pub struct PhasePipeline {
    dispatcher: Arc<dyn InstructionDispatcher>,
    log: Arc<dyn ProtocolLog>,
    gates: Arc<dyn GateRunner>,
    state: Arc<StateMachine>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: PhasePipelineConfig,
}

impl PhasePipeline {
    pub fn new(
        dispatcher: Arc<dyn InstructionDispatcher>,
        log: Arc<dyn ProtocolLog>,
        gates: Arc<dyn GateRunner>,
        state: Arc<StateMachine>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: PhasePipelineConfig,
    ) -> Self {
        Self {
            dispatcher,
            log,
            gates,
            state,
            bus,
            clock,
            config,
        }
    }

    /// Drive one acceptance criterion to `complete`.
    pub async fn run_criterion(
        &self,
        cancel: &CancellationToken,
        mission: &MissionPlan,
        ac: &AcceptanceCriterion,
        ctx: &PhaseContext,
    ) -> DomainResult<()> {
        let record_id = criterion_record_id(&mission.id, &ac.id);
        let mut after_seq = self.log.latest_seq().await?;
        let mut previous_output: Option<String> = None;

        for work_phase in AcPhase::work_phases(mission.classification.tag) {
            let outcome = self
                .run_phase(
                    cancel,
                    mission,
                    ac,
                    &record_id,
                    *work_phase,
                    ctx,
                    &mut after_seq,
                    previous_output.take(),
                )
                .await?;
            previous_output = outcome;
        }
        Ok(())
    }

    /// Run one work phase and its verify gate; returns the captured
    /// output of the completed phase.
    #[allow(clippy::too_many_arguments)]
    async fn run_phase(
        &self,
        cancel: &CancellationToken,
        mission: &MissionPlan,
        ac: &AcceptanceCriterion,
        record_id: &str,
        work_phase: AcPhase,
        ctx: &PhaseContext,
        after_seq: &mut u64,
        previous_output: Option<String>,
    ) -> DomainResult<Option<String>> {
        let verify_phase = work_phase
            .verify_phase()
            .ok_or_else(|| DomainError::Protocol(format!("{work_phase} has no verify gate")))?;
        let expected = expected_event(work_phase)?;
        let gate = gate_for(work_phase)?;
        let mut feedback: Option<String> = None;
        let mut in_verify = false;

        for attempt in 1..=self.config.max_attempts {
            if cancel.is_cancelled() {
                return Err(DomainError::Canceled);
            }

            self.dispatcher
                .dispatch(
                    cancel,
                    PhaseInstruction {
                        mission_id: mission.id.clone(),
                        mission_title: mission.title.clone(),
                        ac_id: ac.id.clone(),
                        ac_description: ac.description.clone(),
                        phase: work_phase,
                        attempt,
                        worktree: ctx.worktree.clone(),
                        previous_output: previous_output.clone(),
                        prior_feedback: feedback.take(),
                        wave_feedback: ctx.wave_feedback.clone(),
                    },
                )
                .await?;

            let event = self
                .wait_for_event(cancel, &mission.id, &ac.id, attempt, after_seq)
                .await?;
            if event.event_type != expected {
                return Err(DomainError::Protocol(format!(
                    "unexpected {} claim type",
                    event.event_type
                )));
            }
            let captured = event
                .payload
                .get("output")
                .and_then(|v| v.as_str())
                .map(str::to_string);

            if !in_verify {
                self.state
                    .transition(record_id, work_phase, verify_phase, "phase complete", "phase-pipeline")
                    .await?;
                in_verify = true;
            }

            let outcome = self
                .gates
                .run(
                    cancel,
                    GateRequest {
                        gate,
                        mission_id: mission.id.clone(),
                        ac_id: ac.id.clone(),
                        worktree: ctx.worktree.clone(),
                        attempt,
                        full_suite: gate.full_suite(),
                    },
                )
                .await?;

            if outcome.accepted() {
                let next = verify_phase.next_after_verify().ok_or_else(|| {
                    DomainError::Protocol(format!("{verify_phase} has no successor"))
                })?;
                self.state
                    .transition(record_id, verify_phase, next, "gate accepted", "phase-pipeline")
                    .await?;
                return Ok(captured);
            }

            let output = outcome.output.trim();
            let output = if output.is_empty() { "no gate output" } else { output };
            let synthesized = format!("{gate} rejected attempt {attempt}: {output}");
            tracing::warn!(
                mission_id = %mission.id,
                ac_id = %ac.id,
                phase = %work_phase,
                attempt,
                "gate rejected phase attempt"
            );
            feedback = Some(synthesized);
        }

        Err(DomainError::PhaseAttemptsExhausted {
            mission_id: mission.id.clone(),
            ac_id: ac.id.clone(),
            phase: work_phase.to_string(),
        })
    }

    /// Block on the protocol stream for the next event of this
    /// (mission, AC) pair, bounded by the phase timeout.
    async fn wait_for_event(
        &self,
        cancel: &CancellationToken,
        mission_id: &str,
        ac_id: &str,
        attempt: u32,
        after_seq: &mut u64,
    ) -> DomainResult<ProtocolEvent> {
        let timeout = Duration::from_secs(self.config.phase_timeout_secs);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));
        let started = tokio::time::Instant::now();

        loop {
            if cancel.is_cancelled() {
                return Err(DomainError::Canceled);
            }
            let events = self.log.events_after(mission_id, *after_seq).await?;
            if let Some(event) = events
                .into_iter()
                .find(|e| e.ac_id().map_or(true, |id| id == ac_id))
            {
                *after_seq = event.seq;
                return Ok(event);
            }
            if started.elapsed() >= timeout {
                self.escalate_stuck(mission_id, ac_id, attempt).await;
                return Err(DomainError::Timeout {
                    operation: format!("phase event for {mission_id}/{ac_id}"),
                    timeout_secs: self.config.phase_timeout_secs,
                });
            }
            tokio::time::sleep(poll).await;
        }
    }

    async fn escalate_stuck(&self, mission_id: &str, ac_id: &str, attempt: u32) {
        let timestamp = self.clock.now();
        let payload = json!({
            "mission": mission_id,
            "ac": ac_id,
            "attempt": attempt,
            "timeout_secs": self.config.phase_timeout_secs,
            "timestamp": timestamp.to_rfc3339(),
        });
        if let Err(e) = self
            .log
            .append(ProtocolEvent::new(
                ProtocolEventType::StuckEscalation,
                mission_id,
                payload.clone(),
                timestamp,
            ))
            .await
        {
            tracing::error!(mission_id, error = %e, "failed to append stuck escalation");
        }
        self.bus.publish(CoreEvent::new(
            EventKind::StuckEscalation,
            EventSeverity::Warning,
            Some(mission_id.to_string()),
            payload,
        ));
    }
}

fn expected_event(phase: AcPhase) -> DomainResult<ProtocolEventType> {
    match phase {
        AcPhase::Red => Ok(ProtocolEventType::RedComplete),
        AcPhase::Green => Ok(ProtocolEventType::GreenComplete),
        AcPhase::Refactor => Ok(ProtocolEventType::RefactorComplete),
        AcPhase::Implement => Ok(ProtocolEventType::ImplementComplete),
        other => Err(DomainError::Protocol(format!("{other} is not a work phase"))),
    }
}

fn gate_for(phase: AcPhase) -> DomainResult<GateKind> {
    match phase {
        AcPhase::Red => Ok(GateKind::VerifyRed),
        AcPhase::Green => Ok(GateKind::VerifyGreen),
        AcPhase::Refactor => Ok(GateKind::VerifyRefactor),
        AcPhase::Implement => Ok(GateKind::VerifyImplement),
        other => Err(DomainError::Protocol(format!("{other} has no gate"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::memory::{MemoryProtocolLog, MemoryRecordStore};
    use crate::domain::models::{
        Classification, ClassifiedRisk, CriterionStatus, RecordDraft, RecordType,
    };
    use crate::domain::ports::{GateOutcome, RecordStore, SystemClock};
    use crate::services::event_bus::{EventBusConfig, EventKind};
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Dispatcher standing in for the implementer: records instructions
    /// and appends a scripted protocol event per dispatch.
    struct ScriptedDispatcher {
        log: Arc<MemoryProtocolLog>,
        instructions: StdMutex<Vec<PhaseInstruction>>,
        /// Event type appended per dispatch; None emits nothing.
        emissions: StdMutex<VecDeque<Option<ProtocolEventType>>>,
        emit_matching: bool,
    }

    impl ScriptedDispatcher {
        fn matching(log: Arc<MemoryProtocolLog>) -> Self {
            Self {
                log,
                instructions: StdMutex::new(Vec::new()),
                emissions: StdMutex::new(VecDeque::new()),
                emit_matching: true,
            }
        }

        fn scripted(
            log: Arc<MemoryProtocolLog>,
            emissions: Vec<Option<ProtocolEventType>>,
        ) -> Self {
            Self {
                log,
                instructions: StdMutex::new(Vec::new()),
                emissions: StdMutex::new(emissions.into()),
                emit_matching: false,
            }
        }

        fn instructions(&self) -> Vec<PhaseInstruction> {
            self.instructions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .clone()
        }
    }

    #[async_trait]
    impl InstructionDispatcher for ScriptedDispatcher {
        async fn dispatch(
            &self,
            _cancel: &CancellationToken,
            instruction: PhaseInstruction,
        ) -> DomainResult<()> {
            self.instructions
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(instruction.clone());
            let emitted = if self.emit_matching {
                match instruction.phase {
                    AcPhase::Red => Some(ProtocolEventType::RedComplete),
                    AcPhase::Green => Some(ProtocolEventType::GreenComplete),
                    AcPhase::Refactor => Some(ProtocolEventType::RefactorComplete),
                    AcPhase::Implement => Some(ProtocolEventType::ImplementComplete),
                    _ => None,
                }
            } else {
                self.emissions
                    .lock()
                    .unwrap_or_else(std::sync::PoisonError::into_inner)
                    .pop_front()
                    .flatten()
            };
            if let Some(event_type) = emitted {
                self.log
                    .append(ProtocolEvent::new(
                        event_type,
                        &instruction.mission_id,
                        serde_json::json!({
                            "ac_id": instruction.ac_id,
                            "output": format!("{} attempt {}", instruction.phase, instruction.attempt),
                        }),
                        chrono::Utc::now(),
                    ))
                    .await?;
            }
            Ok(())
        }
    }

    /// Gate runner replaying a queue of outcomes, accepting by default.
    #[derive(Default)]
    struct QueueGates {
        calls: StdMutex<Vec<GateKind>>,
        outcomes: StdMutex<VecDeque<GateOutcome>>,
    }

    #[async_trait]
    impl crate::domain::ports::GateRunner for QueueGates {
        async fn run(
            &self,
            _cancel: &CancellationToken,
            request: GateRequest,
        ) -> DomainResult<GateOutcome> {
            self.calls
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(request.gate);
            Ok(self
                .outcomes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .pop_front()
                .unwrap_or_default())
        }
    }

    struct PipelineFixture {
        pipeline: PhasePipeline,
        store: Arc<MemoryRecordStore>,
        events: Arc<StdMutex<Vec<EventKind>>>,
    }

    async fn fixture(
        dispatcher: Arc<dyn InstructionDispatcher>,
        log: Arc<MemoryProtocolLog>,
        gates: Arc<QueueGates>,
        timeout_secs: u64,
    ) -> PipelineFixture {
        let store = Arc::new(MemoryRecordStore::new());
        let bus = Arc::new(EventBus::new(EventBusConfig::default()));
        let events = Arc::new(StdMutex::new(Vec::new()));
        let sink = events.clone();
        bus.subscribe_all(Arc::new(move |event| {
            sink.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event.kind);
        }));
        let state = Arc::new(StateMachine::new(
            store.clone(),
            bus.clone(),
            Arc::new(SystemClock),
        ));
        let pipeline = PhasePipeline::new(
            dispatcher,
            log.clone(),
            gates.clone(),
            state,
            bus.clone(),
            Arc::new(SystemClock),
            PhasePipelineConfig {
                phase_timeout_secs: timeout_secs,
                max_attempts: 3,
                poll_interval_ms: 5,
            },
        );
        PipelineFixture {
            pipeline,
            store,
            events,
        }
    }

    fn red_alert_mission() -> MissionPlan {
        let mut mission = MissionPlan::new("M-1", "mission");
        mission.classification = ClassifiedRisk {
            tag: Classification::RedAlert,
            confidence: 1.0,
            needs_review: false,
            source: Default::default(),
        };
        mission
    }

    fn criterion() -> AcceptanceCriterion {
        AcceptanceCriterion {
            id: "AC-1".into(),
            description: "behaves".into(),
            status: CriterionStatus::Pending,
        }
    }

    async fn seed_criterion(store: &MemoryRecordStore, mission: &MissionPlan) {
        let id = criterion_record_id(&mission.id, "AC-1");
        store
            .create(RecordDraft {
                id: Some(id.clone()),
                record_type: Some(RecordType::Criterion),
                title: "behaves".into(),
                parent: Some(mission.id.clone()),
                ..RecordDraft::default()
            })
            .await
            .unwrap();
        store
            .set_state(&id, "ac_phase", AcPhase::initial(mission.classification.tag).as_str())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn red_alert_walks_the_full_pipeline() {
        let log = Arc::new(MemoryProtocolLog::new());
        let dispatcher = Arc::new(ScriptedDispatcher::matching(log.clone()));
        let gates = Arc::new(QueueGates::default());
        let f = fixture(dispatcher.clone(), log, gates.clone(), 300).await;
        let mission = red_alert_mission();
        seed_criterion(&f.store, &mission).await;

        let cancel = CancellationToken::new();
        f.pipeline
            .run_criterion(&cancel, &mission, &criterion(), &PhaseContext::default())
            .await
            .unwrap();

        let calls = gates.calls.lock().unwrap().clone();
        assert_eq!(
            calls,
            vec![GateKind::VerifyRed, GateKind::VerifyGreen, GateKind::VerifyRefactor]
        );
        let record = f.store.show("M-1/AC-1").await.unwrap();
        assert_eq!(record.state_value("ac_phase"), Some("complete"));

        // The green phase received the red phase's captured output.
        let instructions = dispatcher.instructions();
        assert_eq!(instructions.len(), 3);
        assert_eq!(
            instructions[1].previous_output.as_deref(),
            Some("red attempt 1")
        );
    }

    #[tokio::test]
    async fn unexpected_claim_type_is_an_error() {
        let log = Arc::new(MemoryProtocolLog::new());
        let dispatcher = Arc::new(ScriptedDispatcher::scripted(
            log.clone(),
            vec![Some(ProtocolEventType::GreenComplete)],
        ));
        let gates = Arc::new(QueueGates::default());
        let f = fixture(dispatcher, log, gates, 300).await;
        let mission = red_alert_mission();
        seed_criterion(&f.store, &mission).await;

        let cancel = CancellationToken::new();
        let err = f
            .pipeline
            .run_criterion(&cancel, &mission, &criterion(), &PhaseContext::default())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unexpected GREEN_COMPLETE claim type"));
    }

    #[tokio::test(start_paused = true)]
    async fn wait_timeout_escalates_stuck() {
        let log = Arc::new(MemoryProtocolLog::new());
        // Emits nothing: the wait must time out.
        let dispatcher = Arc::new(ScriptedDispatcher::scripted(log.clone(), vec![None]));
        let gates = Arc::new(QueueGates::default());
        let f = fixture(dispatcher, log.clone(), gates, 1).await;
        let mission = red_alert_mission();
        seed_criterion(&f.store, &mission).await;

        let cancel = CancellationToken::new();
        let err = f
            .pipeline
            .run_criterion(&cancel, &mission, &criterion(), &PhaseContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::Timeout { .. }));

        let escalations = log.all().await;
        assert_eq!(escalations.len(), 1);
        assert_eq!(escalations[0].event_type, ProtocolEventType::StuckEscalation);
        assert_eq!(escalations[0].payload["attempt"], 1);

        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        assert!(f
            .events
            .lock()
            .unwrap()
            .contains(&EventKind::StuckEscalation));
    }

    #[tokio::test]
    async fn rejection_exhausts_attempts_and_halts() {
        let log = Arc::new(MemoryProtocolLog::new());
        let dispatcher = Arc::new(ScriptedDispatcher::matching(log.clone()));
        let gates = Arc::new(QueueGates::default());
        for _ in 0..3 {
            gates
                .outcomes
                .lock()
                .unwrap()
                .push_back(GateOutcome {
                    exit_code: 1,
                    output: "  still passing  ".into(),
                });
        }
        let f = fixture(dispatcher.clone(), log, gates, 300).await;
        let mission = red_alert_mission();
        seed_criterion(&f.store, &mission).await;

        let cancel = CancellationToken::new();
        let err = f
            .pipeline
            .run_criterion(&cancel, &mission, &criterion(), &PhaseContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, DomainError::PhaseAttemptsExhausted { .. }));

        let instructions = dispatcher.instructions();
        assert_eq!(instructions.len(), 3);
        // Feedback is synthesized and trimmed.
        assert_eq!(
            instructions[1].prior_feedback.as_deref(),
            Some("VERIFY_RED rejected attempt 1: still passing")
        );
        assert_eq!(
            instructions[2].prior_feedback.as_deref(),
            Some("VERIFY_RED rejected attempt 2: still passing")
        );
    }

    #[tokio::test]
    async fn empty_gate_output_defaults() {
        let log = Arc::new(MemoryProtocolLog::new());
        let dispatcher = Arc::new(ScriptedDispatcher::matching(log.clone()));
        let gates = Arc::new(QueueGates::default());
        gates.outcomes.lock().unwrap().push_back(GateOutcome {
            exit_code: 2,
            output: "   ".into(),
        });
        let f = fixture(dispatcher.clone(), log, gates, 300).await;
        let mission = red_alert_mission();
        seed_criterion(&f.store, &mission).await;

        let cancel = CancellationToken::new();
        f.pipeline
            .run_criterion(&cancel, &mission, &criterion(), &PhaseContext::default())
            .await
            .unwrap();
        let instructions = dispatcher.instructions();
        assert_eq!(
            instructions[1].prior_feedback.as_deref(),
            Some("VERIFY_RED rejected attempt 1: no gate output")
        );
    }
}
