//! Adapters binding the core's ports to concrete backends.

pub mod command_runner;
pub mod gates;
pub mod harness;
pub mod memory;
pub mod planning;
pub mod sqlite;
pub mod stdio_decider;
pub mod worktree;

pub use command_runner::TokioCommandRunner;
pub use gates::{CommandGateRunner, GateCommand};
pub use harness::MockHarness;
pub use planning::{ScriptedPlanningSession, ScriptedSessionFactory, StaticClassifier};
pub use stdio_decider::StdioDecider;
pub use worktree::{DirWorktreeManager, GitWorktreeManager};
