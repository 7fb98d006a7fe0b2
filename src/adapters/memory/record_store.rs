//! In-memory record store, the test and development backend.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{MissionState, Record, RecordDraft, RecordFilter, RecordType};
use crate::domain::ports::{Clock, RecordStore, SystemClock};

#[derive(Default)]
struct Inner {
    records: BTreeMap<String, Record>,
    comments: HashMap<String, Vec<String>>,
    /// Dependency edges child -> parents.
    deps: HashMap<String, Vec<String>>,
}

pub struct MemoryRecordStore {
    inner: RwLock<Inner>,
    clock: Arc<dyn Clock>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            clock,
        }
    }

    /// Insert a fully-formed record, used by test fixtures.
    pub async fn put(&self, record: Record) {
        let mut inner = self.inner.write().await;
        inner.records.insert(record.id.clone(), record);
    }

    /// Dependency edges of a record (parents it waits on).
    pub async fn dependencies(&self, child: &str) -> Vec<String> {
        let inner = self.inner.read().await;
        inner.deps.get(child).cloned().unwrap_or_default()
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn create(&self, draft: RecordDraft) -> DomainResult<String> {
        let id = draft
            .id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let mut inner = self.inner.write().await;
        if inner.records.contains_key(&id) {
            return Err(DomainError::Store(format!("record {id} already exists")));
        }
        let mut record = Record::new(
            id.clone(),
            draft.record_type.unwrap_or(RecordType::Mission),
            draft.title,
        );
        record.body = draft.body;
        record.parent = draft.parent;
        record.labels = draft.labels;
        record.priority = draft.priority;
        inner.records.insert(id.clone(), record);
        Ok(id)
    }

    async fn show(&self, id: &str) -> DomainResult<Record> {
        let inner = self.inner.read().await;
        inner.records.get(id).cloned().ok_or_else(|| DomainError::NotFound {
            kind: "record".into(),
            id: id.into(),
        })
    }

    async fn list(&self, filter: RecordFilter) -> DomainResult<Vec<Record>> {
        let inner = self.inner.read().await;
        Ok(inner
            .records
            .values()
            .filter(|r| filter.record_type.map_or(true, |t| r.record_type == t))
            .filter(|r| {
                filter
                    .parent
                    .as_ref()
                    .map_or(true, |p| r.parent.as_deref() == Some(p.as_str()))
            })
            .filter(|r| {
                filter
                    .state
                    .as_ref()
                    .map_or(true, |(k, v)| r.state_value(k) == Some(v.as_str()))
            })
            .cloned()
            .collect())
    }

    async fn set_state(&self, id: &str, key: &str, value: &str) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(id).ok_or_else(|| DomainError::NotFound {
            kind: "record".into(),
            id: id.into(),
        })?;
        record.state.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn set_label(&self, id: &str, key: &str, value: &str) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(id).ok_or_else(|| DomainError::NotFound {
            kind: "record".into(),
            id: id.into(),
        })?;
        record.labels.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn update_notes(&self, id: &str, notes: serde_json::Value) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        let record = inner.records.get_mut(id).ok_or_else(|| DomainError::NotFound {
            kind: "record".into(),
            id: id.into(),
        })?;
        record.notes = Some(notes);
        Ok(())
    }

    async fn add_dependency(&self, child: &str, parent: &str) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.records.contains_key(child) || !inner.records.contains_key(parent) {
            return Err(DomainError::NotFound {
                kind: "record".into(),
                id: format!("{child} or {parent}"),
            });
        }
        let edges = inner.deps.entry(child.to_string()).or_default();
        if !edges.contains(&parent.to_string()) {
            edges.push(parent.to_string());
        }
        Ok(())
    }

    async fn ready_missions(&self, commission_id: &str) -> DomainResult<Vec<Record>> {
        let inner = self.inner.read().await;
        let mut ready: Vec<Record> = inner
            .records
            .values()
            .filter(|r| r.record_type == RecordType::Mission)
            .filter(|r| r.parent.as_deref() == Some(commission_id))
            .filter(|r| {
                r.state_value("mission_state")
                    .map_or(true, |s| s == MissionState::Backlog.as_str())
            })
            .filter(|r| {
                inner.deps.get(&r.id).map_or(true, |parents| {
                    parents.iter().all(|p| {
                        inner
                            .records
                            .get(p)
                            .and_then(|pr| pr.state_value("mission_state"))
                            == Some(MissionState::Done.as_str())
                    })
                })
            })
            .cloned()
            .collect();
        ready.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(ready)
    }

    async fn add_comment(&self, id: &str, comment: &str) -> DomainResult<()> {
        let mut inner = self.inner.write().await;
        if !inner.records.contains_key(id) {
            return Err(DomainError::NotFound {
                kind: "record".into(),
                id: id.into(),
            });
        }
        inner
            .comments
            .entry(id.to_string())
            .or_default()
            .push(comment.to_string());
        Ok(())
    }

    async fn comments(&self, id: &str) -> DomainResult<Vec<String>> {
        let inner = self.inner.read().await;
        Ok(inner.comments.get(id).cloned().unwrap_or_default())
    }

    async fn heartbeat(&self, agent_id: &str) -> DomainResult<()> {
        let now = self.clock.now().to_rfc3339();
        self.set_label(agent_id, "last_heartbeat", &now).await
    }
}
