//! Orchestration services: the six core subsystems plus their support.

pub mod approval_gate;
pub mod config;
pub mod demo_validator;
pub mod doctor;
pub mod event_bus;
pub mod lock_manager;
pub mod mission_executor;
pub mod phase_pipeline;
pub mod plan_store;
pub mod question_gate;
pub mod ready_room;
pub mod recovery;
pub mod state_machine;

pub use approval_gate::{ApprovalExchange, ApprovalGate, ApprovalGateConfig, PendingApproval};
pub use config::{Config, ConfigError};
pub use demo_validator::DemoValidator;
pub use doctor::{Doctor, DoctorConfig, DoctorReport};
pub use event_bus::{
    CoreEvent, EventBus, EventBusConfig, EventHandler, EventKind, EventSeverity, PublishReport,
    SubscriberId,
};
pub use lock_manager::{LockManagerConfig, SurfaceLockManager};
pub use mission_executor::{
    assign_waves, ExecutionReport, MissionExecutor, MissionExecutorConfig, SessionRegistry,
};
pub use phase_pipeline::{
    criterion_record_id, InstructionDispatcher, PhaseContext, PhaseInstruction, PhasePipeline,
    PhasePipelineConfig,
};
pub use plan_store::{FeedbackInjector, PlanShelver, PlanStore};
pub use question_gate::{QuestionExchange, QuestionGate, QuestionGateConfig};
pub use ready_room::{PlanOutcome, ReadyRoom, ReadyRoomConfig};
pub use recovery::{RecoveryConfig, RecoveryManager, RecoveryReport};
pub use state_machine::{EntityKind, LifecycleState, StateMachine, TransitionRecord};
