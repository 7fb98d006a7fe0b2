//! Ship Commander - deterministic multi-agent TDD orchestration.
//!
//! The control plane for a planning/execution workflow: a lifecycle state
//! machine with an append-only audit trail, a three-specialist planning
//! loop with human question gates, a synchronous approval rendezvous, a
//! per-criterion TDD phase pipeline, a surface-area lock manager, and a
//! supervisor/recovery pair. Agent subprocesses are the data plane,
//! reached only through the harness driver port.

pub mod adapters;
pub mod cli;
pub mod domain;
pub mod infrastructure;
pub mod services;

pub use domain::{DomainError, DomainResult};
pub use services::Config;
