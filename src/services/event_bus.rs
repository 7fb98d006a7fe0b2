//! In-process pub/sub with per-subscriber bounded queues.
//!
//! Publish is synchronous and never blocks: when a subscriber's queue is
//! full the event is dropped for that subscriber and a warning is logged.
//! Each subscriber has one background worker consuming its queue in
//! insertion order; there is no cross-subscriber ordering guarantee.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::domain::ports::{Clock, SystemClock};

/// Event kinds emitted by the core.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    StateTransition,
    InvariantViolation,
    AdmiralQuestion,
    MissionCompleted,
    MissionHalted,
    WaveFeedbackRecorded,
    StuckEscalation,
    HealthCheck,
    SystemAlert,
}

impl EventKind {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::StateTransition => "state_transition",
            Self::InvariantViolation => "invariant_violation",
            Self::AdmiralQuestion => "admiral_question",
            Self::MissionCompleted => "mission_completed",
            Self::MissionHalted => "mission_halted",
            Self::WaveFeedbackRecorded => "wave_feedback_recorded",
            Self::StuckEscalation => "stuck_escalation",
            Self::HealthCheck => "health_check",
            Self::SystemAlert => "system_alert",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Event severity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
    Critical,
}

/// One event on the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoreEvent {
    pub id: Uuid,
    /// Bus-assigned monotonic sequence, zero until published.
    #[serde(default)]
    pub seq: u64,
    pub kind: EventKind,
    pub severity: EventSeverity,
    #[serde(default)]
    pub mission_id: Option<String>,
    pub payload: serde_json::Value,
    /// Populated by publish when left at the epoch.
    pub timestamp: DateTime<Utc>,
}

impl CoreEvent {
    pub fn new(
        kind: EventKind,
        severity: EventSeverity,
        mission_id: Option<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            seq: 0,
            kind,
            severity,
            mission_id,
            payload,
            timestamp: DateTime::<Utc>::UNIX_EPOCH,
        }
    }
}

/// Handle for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

pub type EventHandler = Arc<dyn Fn(CoreEvent) + Send + Sync>;

/// Result of one publish: how many subscribers got the event and how many
/// dropped it on a full queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PublishReport {
    pub delivered: usize,
    pub dropped: usize,
}

struct Subscriber {
    id: SubscriberId,
    /// None subscribes to every kind.
    kind: Option<EventKind>,
    tx: mpsc::Sender<CoreEvent>,
}

struct Inner {
    subscribers: Vec<Subscriber>,
    next_id: u64,
}

/// Configuration for the event bus.
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// Per-subscriber bounded queue capacity.
    pub buffer_size: usize,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self { buffer_size: 100 }
    }
}

/// The in-process event bus.
pub struct EventBus {
    inner: Mutex<Inner>,
    sequence: AtomicU64,
    config: EventBusConfig,
    clock: Arc<dyn Clock>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    pub fn with_clock(config: EventBusConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: Mutex::new(Inner {
                subscribers: Vec::new(),
                next_id: 0,
            }),
            sequence: AtomicU64::new(0),
            config,
            clock,
        }
    }

    /// Subscribe to one event kind. The handler runs on a dedicated
    /// worker, preserving per-subscriber order.
    pub fn subscribe(&self, kind: EventKind, handler: EventHandler) -> SubscriberId {
        self.register(Some(kind), handler)
    }

    /// Subscribe to every event kind.
    pub fn subscribe_all(&self, handler: EventHandler) -> SubscriberId {
        self.register(None, handler)
    }

    fn register(&self, kind: Option<EventKind>, handler: EventHandler) -> SubscriberId {
        let (tx, mut rx) = mpsc::channel::<CoreEvent>(self.config.buffer_size);
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        inner.subscribers.push(Subscriber { id, kind, tx });
        drop(inner);

        tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                handler(event);
            }
        });

        id
    }

    /// Remove a subscriber; its worker drains the queue and stops.
    pub fn unsubscribe(&self, id: SubscriberId) {
        let mut inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        inner.subscribers.retain(|s| s.id != id);
    }

    /// Publish an event. Non-blocking: full subscriber queues drop the
    /// event with a logged warning.
    pub fn publish(&self, mut event: CoreEvent) -> PublishReport {
        if event.timestamp == DateTime::<Utc>::UNIX_EPOCH {
            event.timestamp = self.clock.now();
        }
        event.seq = self.sequence.fetch_add(1, Ordering::SeqCst);

        let inner = self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        let mut report = PublishReport::default();
        for subscriber in inner
            .subscribers
            .iter()
            .filter(|s| s.kind.is_none() || s.kind == Some(event.kind))
        {
            match subscriber.tx.try_send(event.clone()) {
                Ok(()) => report.delivered += 1,
                Err(mpsc::error::TrySendError::Full(dropped)) => {
                    report.dropped += 1;
                    tracing::warn!(
                        subscriber_id = subscriber.id.0,
                        event_kind = %dropped.kind,
                        "subscriber queue full, dropping event"
                    );
                }
                Err(mpsc::error::TrySendError::Closed(_)) => {}
            }
        }
        report
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .subscribers
            .len()
    }
}
