//! Mock harness driver for tests.
//!
//! Records every spawn, message, and termination, and can be scripted to
//! append protocol events when phases are dispatched, standing in for the
//! agent on the other side of the harness.

use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ProtocolEvent, ProtocolEventType};
use crate::domain::ports::{
    session_name, Clock, HarnessDriver, HarnessSession, ProtocolLog, SpawnOptions, SystemClock,
};

/// One recorded spawn.
#[derive(Debug, Clone)]
pub struct SpawnRecord {
    pub role: String,
    pub prompt: String,
    pub session_id: String,
}

/// One recorded message send.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub session_id: String,
    pub role: String,
    pub message: String,
}

type EventScript = Box<dyn Fn(&str, &str) -> Vec<ProtocolEvent> + Send + Sync>;

#[derive(Default)]
struct MockState {
    spawns: Vec<SpawnRecord>,
    messages: Vec<MessageRecord>,
    terminated: Vec<String>,
    /// Review verdicts per mission, consumed in order.
    review_scripts: HashMap<String, Vec<serde_json::Value>>,
    fail_spawn: bool,
}

/// The mock harness.
pub struct MockHarness {
    state: Mutex<MockState>,
    next_session: AtomicU64,
    log: Option<Arc<dyn ProtocolLog>>,
    clock: Arc<dyn Clock>,
    /// Maps a dispatched message to the protocol events the "agent" emits.
    on_message: Mutex<Option<EventScript>>,
}

impl MockHarness {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            next_session: AtomicU64::new(1),
            log: None,
            clock: Arc::new(SystemClock),
            on_message: Mutex::new(None),
        }
    }

    /// Attach a protocol log; scripted agents append their events here.
    pub fn with_log(mut self, log: Arc<dyn ProtocolLog>) -> Self {
        self.log = Some(log);
        self
    }

    /// Script: whenever a message containing `phase=<p>` arrives for a
    /// mission, emit the matching phase-complete event.
    pub async fn complete_phases_automatically(&self) {
        let clock = self.clock.clone();
        let script: EventScript = Box::new(move |mission_id, message| {
            let phase = message
                .lines()
                .next()
                .and_then(|l| l.strip_prefix("phase="))
                .and_then(|l| l.split_whitespace().next());
            let event_type = match phase {
                Some("red") => ProtocolEventType::RedComplete,
                Some("green") => ProtocolEventType::GreenComplete,
                Some("refactor") => ProtocolEventType::RefactorComplete,
                Some("implement") => ProtocolEventType::ImplementComplete,
                _ => return Vec::new(),
            };
            let ac_id = message
                .lines()
                .next()
                .and_then(|l| l.split("criterion ").nth(1))
                .map(str::trim)
                .unwrap_or("AC-1");
            vec![ProtocolEvent::new(
                event_type,
                mission_id,
                serde_json::json!({ "ac_id": ac_id, "output": "phase done" }),
                clock.now(),
            )]
        });
        *self.on_message.lock().await = Some(script);
    }

    /// Queue reviewer verdict payloads for a mission, consumed per
    /// reviewer dispatch.
    pub async fn script_reviews(&self, mission_id: &str, payloads: Vec<serde_json::Value>) {
        self.state
            .lock()
            .await
            .review_scripts
            .insert(mission_id.to_string(), payloads);
    }

    pub async fn fail_next_spawn(&self) {
        self.state.lock().await.fail_spawn = true;
    }

    pub async fn spawns(&self) -> Vec<SpawnRecord> {
        self.state.lock().await.spawns.clone()
    }

    pub async fn spawns_for_role(&self, role: &str) -> Vec<SpawnRecord> {
        self.state
            .lock()
            .await
            .spawns
            .iter()
            .filter(|s| s.role == role)
            .cloned()
            .collect()
    }

    pub async fn messages(&self) -> Vec<MessageRecord> {
        self.state.lock().await.messages.clone()
    }

    pub async fn terminated(&self) -> Vec<String> {
        self.state.lock().await.terminated.clone()
    }
}

impl Default for MockHarness {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl HarnessDriver for MockHarness {
    async fn spawn_session(
        &self,
        _cancel: &CancellationToken,
        role: &str,
        prompt: &str,
        _workdir: &Path,
        opts: SpawnOptions,
    ) -> DomainResult<HarnessSession> {
        let mut state = self.state.lock().await;
        if state.fail_spawn {
            state.fail_spawn = false;
            return Err(DomainError::Harness("scripted spawn failure".into()));
        }
        let n = self.next_session.fetch_add(1, Ordering::SeqCst);
        let session = HarnessSession {
            id: format!("sess-{n}"),
            name: session_name(role, prompt, opts.mission_id.as_deref()),
            role: role.to_string(),
            pid: Some(40_000 + u32::try_from(n).unwrap_or(0)),
        };
        state.spawns.push(SpawnRecord {
            role: role.to_string(),
            prompt: prompt.to_string(),
            session_id: session.id.clone(),
        });

        // A scripted reviewer reports its verdict as soon as it spawns.
        if role == "reviewer" {
            if let Some(mission_id) = opts.mission_id.as_deref() {
                let payload = state
                    .review_scripts
                    .get_mut(mission_id)
                    .and_then(|queue| {
                        if queue.is_empty() {
                            None
                        } else {
                            Some(queue.remove(0))
                        }
                    });
                if let (Some(payload), Some(log)) = (payload, &self.log) {
                    let mut payload = payload;
                    if let Some(map) = payload.as_object_mut() {
                        map.entry("reviewer_session_id")
                            .or_insert_with(|| serde_json::json!(session.id));
                    }
                    log.append(ProtocolEvent::new(
                        ProtocolEventType::ReviewComplete,
                        mission_id,
                        payload,
                        self.clock.now(),
                    ))
                    .await?;
                }
            }
        }
        Ok(session)
    }

    async fn send_message(
        &self,
        _cancel: &CancellationToken,
        session: &HarnessSession,
        message: &str,
    ) -> DomainResult<String> {
        let mission_id = {
            let mut state = self.state.lock().await;
            state.messages.push(MessageRecord {
                session_id: session.id.clone(),
                role: session.role.clone(),
                message: message.to_string(),
            });
            message
                .lines()
                .next()
                .and_then(|l| l.split("mission ").nth(1))
                .and_then(|rest| rest.split_whitespace().next())
                .map(str::to_string)
        };

        if let (Some(mission_id), Some(log)) = (mission_id, &self.log) {
            let script = self.on_message.lock().await;
            if let Some(script) = script.as_ref() {
                for event in script(&mission_id, message) {
                    log.append(event).await?;
                }
            }
        }
        Ok("ack".to_string())
    }

    async fn terminate(&self, session: &HarnessSession) -> DomainResult<()> {
        self.state.lock().await.terminated.push(session.id.clone());
        Ok(())
    }
}
