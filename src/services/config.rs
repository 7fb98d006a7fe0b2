//! Configuration for the orchestration engine.
//!
//! Layered loading: built-in defaults, then an optional YAML file, then
//! `SC3_`-prefixed environment variables.

use std::path::Path;

use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    LoadError(#[from] Box<figment::Error>),
    #[error("Validation failed for {field}: {reason}")]
    ValidationError { field: String, reason: String },
}

/// Supervision and recovery knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisionConfig {
    /// Doctor tick period, seconds.
    pub heartbeat_interval_secs: u64,
    /// Heartbeat age after which a runnable agent is stuck, seconds.
    pub stuck_timeout_secs: u64,
    /// Bound on startup reconciliation, seconds.
    pub resume_timeout_secs: u64,
}

impl Default for SupervisionConfig {
    fn default() -> Self {
        Self {
            heartbeat_interval_secs: 30,
            stuck_timeout_secs: 300,
            resume_timeout_secs: 10,
        }
    }
}

/// Phase pipeline knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Wait bound for a phase-complete event, seconds.
    pub red_timeout_secs: u64,
    /// Attempts per phase before the criterion halts.
    pub max_phase_attempts: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            red_timeout_secs: 300,
            max_phase_attempts: 3,
        }
    }
}

/// Gate buffer sizes and planning bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatesConfig {
    pub approval_buffer_size: usize,
    pub question_buffer_size: usize,
    /// Planning iterations before the room gives up on consensus.
    pub max_iterations: u32,
}

impl Default for GatesConfig {
    fn default() -> Self {
        Self {
            approval_buffer_size: 1,
            question_buffer_size: 1,
            max_iterations: 5,
        }
    }
}

/// Mission execution knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Missions in flight per wave.
    pub wip_limit: usize,
    pub review_poll_interval_secs: u64,
    pub review_timeout_secs: u64,
    /// Default revision ceiling; a mission plan may lower or raise it.
    pub max_revisions: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            wip_limit: 1,
            review_poll_interval_secs: 2,
            review_timeout_secs: 600,
            max_revisions: 3,
        }
    }
}

/// Lock manager knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocksConfig {
    pub lock_expiry_timeout_secs: u64,
}

impl Default for LocksConfig {
    fn default() -> Self {
        Self {
            lock_expiry_timeout_secs: 1800,
        }
    }
}

/// Event bus knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBusKnobs {
    /// Per-subscriber bounded queue size.
    pub event_bus_buffer_size: usize,
}

impl Default for EventBusKnobs {
    fn default() -> Self {
        Self {
            event_bus_buffer_size: 100,
        }
    }
}

/// Storage location.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub database_url: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_url: "sqlite:.sc3/commander.db".to_string(),
        }
    }
}

/// Root configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub supervision: SupervisionConfig,
    pub pipeline: PipelineConfig,
    pub gates: GatesConfig,
    pub execution: ExecutionConfig,
    pub locks: LocksConfig,
    pub event_bus: EventBusKnobs,
    pub storage: StorageConfig,
}

impl Config {
    /// Load from defaults, an optional YAML file, and `SC3_` env vars.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Config::default()));
        if let Some(path) = path {
            figment = figment.merge(Yaml::file(path));
        }
        let config: Config = figment
            .merge(Env::prefixed("SC3_").split("__"))
            .extract()
            .map_err(Box::new)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let nonzero: [(&str, u64); 7] = [
            ("supervision.heartbeat_interval_secs", self.supervision.heartbeat_interval_secs),
            ("supervision.stuck_timeout_secs", self.supervision.stuck_timeout_secs),
            ("supervision.resume_timeout_secs", self.supervision.resume_timeout_secs),
            ("pipeline.red_timeout_secs", self.pipeline.red_timeout_secs),
            ("execution.review_poll_interval_secs", self.execution.review_poll_interval_secs),
            ("execution.review_timeout_secs", self.execution.review_timeout_secs),
            ("locks.lock_expiry_timeout_secs", self.locks.lock_expiry_timeout_secs),
        ];
        for (field, value) in nonzero {
            if value == 0 {
                return Err(ConfigError::ValidationError {
                    field: field.to_string(),
                    reason: "must be positive".to_string(),
                });
            }
        }
        if self.gates.approval_buffer_size == 0 || self.gates.question_buffer_size == 0 {
            return Err(ConfigError::ValidationError {
                field: "gates".to_string(),
                reason: "buffer sizes must be positive".to_string(),
            });
        }
        if self.event_bus.event_bus_buffer_size == 0 {
            return Err(ConfigError::ValidationError {
                field: "event_bus.event_bus_buffer_size".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.execution.wip_limit == 0 {
            return Err(ConfigError::ValidationError {
                field: "execution.wip_limit".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        if self.gates.max_iterations == 0 || self.pipeline.max_phase_attempts == 0 {
            return Err(ConfigError::ValidationError {
                field: "iteration bounds".to_string(),
                reason: "must be positive".to_string(),
            });
        }
        Ok(())
    }
}
