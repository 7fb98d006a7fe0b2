//! Harness driver adapters.

pub mod mock;

pub use mock::{MessageRecord, MockHarness, SpawnRecord};
