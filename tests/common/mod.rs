//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex as StdMutex};

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ship_commander::adapters::harness::MockHarness;
use ship_commander::adapters::memory::{MemoryLockStore, MemoryProtocolLog, MemoryRecordStore};
use ship_commander::adapters::worktree::DirWorktreeManager;
use ship_commander::domain::errors::DomainResult;
use ship_commander::domain::models::{
    AcceptanceCriterion, ApprovalDecision, Classification, ClassifiedRisk, Commission,
    CommissionStatus, CriterionStatus, EnvelopeStatus, MissionPlan, PlanState, RecordDraft,
    RecordType, UseCase,
};
use ship_commander::domain::ports::{
    slugify, GateKind, GateOutcome, GateRequest, GateRunner, RecordStore, SystemClock,
};
use ship_commander::services::{
    ApprovalGate, ApprovalGateConfig, CoreEvent, EventBus, EventBusConfig, EventKind,
    MissionExecutor, MissionExecutorConfig, PhasePipeline, PhasePipelineConfig, PlanStore,
    SessionRegistry, StateMachine, SurfaceLockManager,
};
use ship_commander::services::lock_manager::LockManagerConfig;

/// Gate runner that counts invocations per gate and replays scripted
/// outcomes, defaulting to accept.
#[derive(Default)]
pub struct ScriptedGateRunner {
    calls: StdMutex<Vec<GateKind>>,
    outcomes: StdMutex<VecDeque<(GateKind, GateOutcome)>>,
}

impl ScriptedGateRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_outcome(&self, gate: GateKind, outcome: GateOutcome) {
        self.outcomes
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push_back((gate, outcome));
    }

    pub fn calls(&self) -> Vec<GateKind> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, gate: GateKind) -> usize {
        self.calls().iter().filter(|g| **g == gate).count()
    }
}

#[async_trait]
impl GateRunner for ScriptedGateRunner {
    async fn run(
        &self,
        _cancel: &CancellationToken,
        request: GateRequest,
    ) -> DomainResult<GateOutcome> {
        self.calls
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(request.gate);
        let scripted = {
            let mut outcomes = self
                .outcomes
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let index = outcomes.iter().position(|(g, _)| *g == request.gate);
            index.map(|i| outcomes.remove(i).map(|(_, o)| o)).flatten()
        };
        Ok(scripted.unwrap_or_default())
    }
}

/// Captures every bus event for assertions.
pub struct EventCapture {
    seen: Arc<StdMutex<Vec<CoreEvent>>>,
}

impl EventCapture {
    pub fn attach(bus: &EventBus) -> Self {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = seen.clone();
        bus.subscribe_all(Arc::new(move |event| {
            sink.lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(event);
        }));
        Self { seen }
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<CoreEvent> {
        self.seen
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }
}

/// A fully wired executor over in-memory backends and a mock harness.
pub struct ExecutorFixture {
    pub store: Arc<MemoryRecordStore>,
    pub log: Arc<MemoryProtocolLog>,
    pub harness: Arc<MockHarness>,
    pub gates: Arc<ScriptedGateRunner>,
    pub approval: Arc<ApprovalGate>,
    pub bus: Arc<EventBus>,
    pub events: EventCapture,
    pub plans: Arc<PlanStore>,
    pub executor: Arc<MissionExecutor>,
    pub worktree_root: tempfile::TempDir,
}

impl ExecutorFixture {
    pub async fn new() -> Self {
        let clock = Arc::new(SystemClock);
        let store = Arc::new(MemoryRecordStore::new());
        let log = Arc::new(MemoryProtocolLog::new());
        let harness = Arc::new(MockHarness::new().with_log(log.clone()));
        harness.complete_phases_automatically().await;
        let gates = Arc::new(ScriptedGateRunner::new());
        let bus = Arc::new(EventBus::new(EventBusConfig::default()));
        let events = EventCapture::attach(&bus);
        let approval = Arc::new(ApprovalGate::new(ApprovalGateConfig::default(), clock.clone()));
        let state = Arc::new(StateMachine::new(store.clone(), bus.clone(), clock.clone()));
        let plans = Arc::new(PlanStore::new(store.clone(), clock.clone()));
        let locks = Arc::new(SurfaceLockManager::new(
            Arc::new(MemoryLockStore::new()),
            clock.clone(),
            LockManagerConfig::default(),
        ));
        let registry = Arc::new(SessionRegistry::new());
        let pipeline = Arc::new(PhasePipeline::new(
            registry.clone(),
            log.clone(),
            gates.clone(),
            state.clone(),
            bus.clone(),
            clock.clone(),
            PhasePipelineConfig {
                poll_interval_ms: 5,
                ..PhasePipelineConfig::default()
            },
        ));
        let worktree_root = tempfile::tempdir().expect("tempdir");
        let worktrees = Arc::new(DirWorktreeManager::new(worktree_root.path().to_path_buf()));

        let executor = Arc::new(MissionExecutor::new(
            store.clone(),
            plans.clone(),
            approval.clone(),
            plans.clone(),
            plans.clone(),
            worktrees,
            harness.clone(),
            registry,
            pipeline,
            locks,
            state,
            bus.clone(),
            log.clone(),
            MissionExecutorConfig {
                review_poll_interval_secs: 1,
                ..MissionExecutorConfig::default()
            },
        ));

        Self {
            store,
            log,
            harness,
            gates,
            approval,
            bus,
            events,
            plans,
            executor,
            worktree_root,
        }
    }

    /// Register the commission and its mission records, and save the
    /// approved plan envelope.
    pub async fn seed(&self, commission: &Commission, manifest: &[MissionPlan]) {
        self.store
            .create(RecordDraft {
                id: Some(commission.id.clone()),
                record_type: Some(RecordType::Commission),
                title: commission.title.clone(),
                body: serde_yaml::to_string(commission).expect("commission yaml"),
                ..RecordDraft::default()
            })
            .await
            .expect("create commission");
        self.store
            .set_state(&commission.id, "commission_status", CommissionStatus::Approved.as_str())
            .await
            .expect("set status");

        for mission in manifest {
            self.store
                .create(RecordDraft {
                    id: Some(mission.id.clone()),
                    record_type: Some(RecordType::Mission),
                    title: mission.title.clone(),
                    parent: Some(commission.id.clone()),
                    ..RecordDraft::default()
                })
                .await
                .expect("create mission");
        }
        for mission in manifest {
            for dep in &mission.depends_on {
                self.store
                    .add_dependency(&mission.id, dep)
                    .await
                    .expect("add dependency");
            }
        }

        self.plans
            .save_plan(
                &commission.id,
                EnvelopeStatus::Approved,
                PlanState {
                    mission_list: manifest.to_vec(),
                    iteration_count: 1,
                    ..PlanState::default()
                },
            )
            .await
            .expect("save plan");
    }

    /// The deterministic worktree path `DirWorktreeManager` will hand out.
    pub fn worktree_path(&self, mission_id: &str) -> PathBuf {
        self.worktree_root
            .path()
            .join(format!("mission-{}", slugify(mission_id)))
    }

    /// Pre-place a valid demo token where the implementer would leave it.
    pub fn seed_demo_token(&self, mission: &MissionPlan) {
        let worktree = self.worktree_path(&mission.id);
        seed_demo_token_at(&worktree, mission);
    }

    /// Respond to approval requests from a scripted queue.
    pub async fn script_approvals(&self, decisions: Vec<ApprovalDecision>) {
        let mut requests = self.approval.requests().await.expect("requests taken once");
        tokio::spawn(async move {
            let mut queue: VecDeque<ApprovalDecision> = decisions.into();
            while let Some(pending) = requests.recv().await {
                let Some(decision) = queue.pop_front() else {
                    break;
                };
                pending.respond(decision).expect("respond");
            }
        });
    }
}

pub fn seed_demo_token_at(worktree: &Path, mission: &MissionPlan) {
    let demo = worktree.join("demo");
    std::fs::create_dir_all(&demo).expect("demo dir");
    let body = match mission.classification.tag {
        Classification::RedAlert => "### tests\n- cargo test criterion\n\n### commands\n- cargo test\n",
        Classification::StandardOps => "### commands\n- cargo run --example check\n",
    };
    let content = format!(
        "---\nmission_id: {id}\ntitle: {title}\nclassification: {tag}\nstatus: complete\n\
         created_at: 2026-07-01T00:00:00Z\nagent_id: agent-mock\n---\n\n{body}",
        id = mission.id,
        title = mission.title,
        tag = mission.classification.tag,
    );
    std::fs::write(demo.join(format!("MISSION-{}.md", mission.id)), content).expect("token");
}

/// A one-use-case commission.
pub fn commission(id: &str, use_case_ids: &[&str]) -> Commission {
    Commission {
        id: id.to_string(),
        title: format!("commission {id}"),
        prd: "build the thing".into(),
        use_cases: use_case_ids
            .iter()
            .map(|uc| UseCase {
                id: (*uc).to_string(),
                title: (*uc).to_string(),
                description: String::new(),
                acceptance_criteria: vec![AcceptanceCriterion {
                    id: format!("{uc}-AC-1"),
                    description: "behaves as specified".into(),
                    status: CriterionStatus::Pending,
                }],
            })
            .collect(),
        functional_groups: vec![],
        in_scope: vec![],
        out_of_scope: vec![],
        status: CommissionStatus::Approved,
        created_at: chrono::Utc::now(),
    }
}

/// A fully signed mission plan.
pub fn mission(
    id: &str,
    use_cases: &[&str],
    tag: Classification,
    surface: &[&str],
) -> MissionPlan {
    let mut m = MissionPlan::new(id, format!("mission {id}"));
    m.use_case_ids = use_cases.iter().map(|s| (*s).to_string()).collect();
    m.classification = ClassifiedRisk {
        tag,
        confidence: 1.0,
        needs_review: false,
        source: Default::default(),
    };
    m.surface_area = surface.iter().map(|s| (*s).to_string()).collect();
    m.signoffs = ship_commander::domain::models::Signoffs {
        captain: true,
        commander: true,
        design_officer: true,
    };
    m
}

/// Reviewer payload approving the mission.
pub fn review_approved() -> serde_json::Value {
    serde_json::json!({
        "verdict": "approved",
        "feedback": "",
        "implementer_session_id": "sess-1",
    })
}

/// Reviewer payload requesting fixes.
pub fn review_needs_fixes(feedback: &str) -> serde_json::Value {
    serde_json::json!({
        "verdict": "needs_fixes",
        "feedback": feedback,
        "implementer_session_id": "sess-1",
    })
}
