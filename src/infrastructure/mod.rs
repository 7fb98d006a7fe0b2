//! Process-level infrastructure.

pub mod logging;
