//! Domain models for the orchestration core.

pub mod agent;
pub mod approval;
pub mod commission;
pub mod demo_token;
pub mod lock;
pub mod message;
pub mod mission;
pub mod phase;
pub mod plan_envelope;
pub mod protocol;
pub mod question;
pub mod record;

pub use agent::{AgentSession, AgentState, CapturedResult};
pub use approval::{ApprovalDecision, ApprovalRequest, WaveAssignment};
pub use commission::{AcceptanceCriterion, Commission, CommissionStatus, CriterionStatus, UseCase};
pub use demo_token::{DemoFrontMatter, DemoToken, DiffRef};
pub use lock::{normalize_pattern, patterns_conflict, SurfaceLock};
pub use message::{MessageKind, PlannerRole, ReadyRoomMessage, Recipient};
pub use mission::{
    compute_coverage, Classification, ClassificationSource, ClassifiedRisk, CoverageState,
    HaltReason, MissionPlan, MissionRuntime, MissionState, Signoffs,
};
pub use phase::AcPhase;
pub use plan_envelope::{EnvelopeStatus, PlanEnvelope, PlanState, ENVELOPE_VERSION};
pub use protocol::{ProtocolEvent, ProtocolEventType, ReviewOutcome, ReviewVerdict};
pub use question::{validate_answer, Answer, Question};
pub use record::{Record, RecordDraft, RecordFilter, RecordType};
