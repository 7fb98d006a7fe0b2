//! Approval gate: a bounded rendezvous between planner and decider.
//!
//! The requester blocks until the decider responds; the decider drains a
//! bounded channel of pending requests. Exactly one history record is
//! appended per completed round-trip.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{ApprovalDecision, ApprovalRequest};
use crate::domain::ports::Clock;

/// One completed approval round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct ApprovalExchange {
    pub request: ApprovalRequest,
    pub response: ApprovalDecision,
    pub asked_at: DateTime<Utc>,
    pub answered_at: DateTime<Utc>,
}

/// A request awaiting the decider, carrying its reply slot.
pub struct PendingApproval {
    pub request: ApprovalRequest,
    reply: oneshot::Sender<ApprovalDecision>,
}

impl PendingApproval {
    /// Deliver the decider's decision. Validates before unblocking the
    /// requester; `Feedback` requires non-empty text.
    pub fn respond(self, decision: ApprovalDecision) -> DomainResult<()> {
        decision.validate()?;
        self.reply
            .send(decision)
            .map_err(|_| DomainError::Canceled)
    }
}

/// Configuration for the approval gate.
#[derive(Debug, Clone)]
pub struct ApprovalGateConfig {
    pub buffer_size: usize,
}

impl Default for ApprovalGateConfig {
    fn default() -> Self {
        Self { buffer_size: 1 }
    }
}

pub struct ApprovalGate {
    tx: mpsc::Sender<PendingApproval>,
    rx: Mutex<Option<mpsc::Receiver<PendingApproval>>>,
    history: StdMutex<Vec<ApprovalExchange>>,
    clock: Arc<dyn Clock>,
}

impl ApprovalGate {
    pub fn new(config: ApprovalGateConfig, clock: Arc<dyn Clock>) -> Self {
        let (tx, rx) = mpsc::channel(config.buffer_size.max(1));
        Self {
            tx,
            rx: Mutex::new(Some(rx)),
            history: StdMutex::new(Vec::new()),
            clock,
        }
    }

    /// Take the pending-request stream. The decider side calls this once.
    pub async fn requests(&self) -> Option<mpsc::Receiver<PendingApproval>> {
        self.rx.lock().await.take()
    }

    /// Submit a request and block until the decider responds.
    ///
    /// Malformed requests are rejected before publication. Cancellation of
    /// `cancel` at any suspension point returns `DomainError::Canceled`.
    pub async fn request_decision(
        &self,
        cancel: &CancellationToken,
        request: ApprovalRequest,
    ) -> DomainResult<ApprovalDecision> {
        request.validate()?;
        if cancel.is_cancelled() {
            return Err(DomainError::Canceled);
        }

        let asked_at = self.clock.now();
        let (reply_tx, reply_rx) = oneshot::channel();
        let pending = PendingApproval {
            request: request.clone(),
            reply: reply_tx,
        };

        tokio::select! {
            sent = self.tx.send(pending) => {
                sent.map_err(|_| DomainError::Canceled)?;
            }
            () = cancel.cancelled() => return Err(DomainError::Canceled),
        }

        let response = tokio::select! {
            reply = reply_rx => reply.map_err(|_| DomainError::Canceled)?,
            () = cancel.cancelled() => return Err(DomainError::Canceled),
        };

        let exchange = ApprovalExchange {
            request,
            response: response.clone(),
            asked_at,
            answered_at: self.clock.now(),
        };
        tracing::info!(
            commission_id = %exchange.request.commission_id,
            decision = exchange.response.as_str(),
            wave_review = exchange.request.wave_review,
            "approval round-trip completed"
        );
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(exchange);
        Ok(response)
    }

    /// Completed round-trips, oldest first. Defensive copy.
    pub fn history(&self) -> Vec<ApprovalExchange> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::mission::MissionPlan;
    use crate::domain::ports::SystemClock;
    use std::collections::BTreeMap;

    fn request(iteration: u32) -> ApprovalRequest {
        ApprovalRequest {
            commission_id: "C-1".into(),
            manifest: vec![MissionPlan::new("M-1", "one")],
            wave_assignments: vec![],
            coverage: BTreeMap::new(),
            iteration,
            max_iterations: 3,
            wave_review: false,
        }
    }

    fn gate() -> Arc<ApprovalGate> {
        Arc::new(ApprovalGate::new(ApprovalGateConfig::default(), Arc::new(SystemClock)))
    }

    #[tokio::test]
    async fn round_trip_appends_one_history_record() {
        let gate = gate();
        let mut requests = gate.requests().await.unwrap();
        let decider = tokio::spawn(async move {
            let pending = requests.recv().await.unwrap();
            pending.respond(ApprovalDecision::Approved).unwrap();
        });

        let cancel = CancellationToken::new();
        let decision = gate.request_decision(&cancel, request(1)).await.unwrap();
        assert_eq!(decision, ApprovalDecision::Approved);
        decider.await.unwrap();
        assert_eq!(gate.history().len(), 1);
    }

    #[tokio::test]
    async fn malformed_request_rejected_before_publish() {
        let gate = gate();
        let cancel = CancellationToken::new();
        let err = gate.request_decision(&cancel, request(0)).await.unwrap_err();
        assert!(matches!(err, DomainError::Validation(_)));
        assert!(gate.history().is_empty());
    }

    #[tokio::test]
    async fn feedback_without_text_rejected_at_respond() {
        let gate = gate();
        let mut requests = gate.requests().await.unwrap();
        let gate_side = gate.clone();
        let requester = tokio::spawn(async move {
            let cancel = CancellationToken::new();
            gate_side.request_decision(&cancel, request(1)).await
        });

        let pending = requests.recv().await.unwrap();
        let request = pending.request.clone();
        assert!(pending.respond(ApprovalDecision::Feedback(String::new())).is_err());
        // The requester is still blocked; answer properly via a new
        // pending entry is impossible, so cancel by dropping the channel.
        drop(requests);
        drop(request);
        let outcome = requester.await.unwrap();
        assert!(matches!(outcome, Err(DomainError::Canceled)));
    }

    #[tokio::test]
    async fn cancellation_unblocks_requester() {
        let gate = gate();
        let _requests = gate.requests().await.unwrap();
        let cancel = CancellationToken::new();
        let gate_side = gate.clone();
        let token = cancel.clone();
        let requester =
            tokio::spawn(async move { gate_side.request_decision(&token, request(1)).await });
        tokio::task::yield_now().await;
        cancel.cancel();
        let outcome = requester.await.unwrap();
        assert!(matches!(outcome, Err(DomainError::Canceled)));
        assert!(gate.history().is_empty());
    }
}
