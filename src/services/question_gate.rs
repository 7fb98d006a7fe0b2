//! Question gate: planner-to-decider questions mid-planning, correlated
//! by question id.
//!
//! Same rendezvous contract as the approval gate, except answers arrive
//! through `submit_answer` and are matched by id: answers for prior
//! cancelled asks are dropped.

use std::sync::{Arc, Mutex as StdMutex};

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{validate_answer, Answer, Question};
use crate::domain::ports::Clock;

/// One completed question round-trip.
#[derive(Debug, Clone, PartialEq)]
pub struct QuestionExchange {
    pub question: Question,
    pub answer: Answer,
    pub asked_at: DateTime<Utc>,
    pub answered_at: DateTime<Utc>,
}

/// Configuration for the question gate.
#[derive(Debug, Clone)]
pub struct QuestionGateConfig {
    pub buffer_size: usize,
}

impl Default for QuestionGateConfig {
    fn default() -> Self {
        Self { buffer_size: 1 }
    }
}

pub struct QuestionGate {
    question_tx: mpsc::Sender<Question>,
    question_rx: Mutex<Option<mpsc::Receiver<Question>>>,
    answer_tx: mpsc::Sender<Answer>,
    answer_rx: Mutex<mpsc::Receiver<Answer>>,
    history: StdMutex<Vec<QuestionExchange>>,
    clock: Arc<dyn Clock>,
}

impl QuestionGate {
    pub fn new(config: QuestionGateConfig, clock: Arc<dyn Clock>) -> Self {
        let size = config.buffer_size.max(1);
        let (question_tx, question_rx) = mpsc::channel(size);
        // Answers may outpace a cancelled ask; keep headroom so
        // submit_answer rarely blocks the decider loop.
        let (answer_tx, answer_rx) = mpsc::channel(size.max(16));
        Self {
            question_tx,
            question_rx: Mutex::new(Some(question_rx)),
            answer_tx,
            answer_rx: Mutex::new(answer_rx),
            history: StdMutex::new(Vec::new()),
            clock,
        }
    }

    /// Take the outstanding-question stream. The decider side calls this
    /// once.
    pub async fn questions(&self) -> Option<mpsc::Receiver<Question>> {
        self.question_rx.lock().await.take()
    }

    /// Deliver an answer from the decider.
    pub async fn submit_answer(&self, answer: Answer) -> DomainResult<()> {
        self.answer_tx
            .send(answer)
            .await
            .map_err(|_| DomainError::Canceled)
    }

    /// Ask one question and block until a matching answer arrives.
    ///
    /// Answers whose id does not match belong to prior cancelled asks and
    /// are dropped. The matching answer is validated against the question
    /// before it is returned.
    pub async fn ask(&self, cancel: &CancellationToken, question: Question) -> DomainResult<Answer> {
        question.validate()?;
        if cancel.is_cancelled() {
            return Err(DomainError::Canceled);
        }

        let asked_at = self.clock.now();
        tokio::select! {
            sent = self.question_tx.send(question.clone()) => {
                sent.map_err(|_| DomainError::Canceled)?;
            }
            () = cancel.cancelled() => return Err(DomainError::Canceled),
        }

        let mut answers = self.answer_rx.lock().await;
        loop {
            let answer = tokio::select! {
                received = answers.recv() => received.ok_or(DomainError::Canceled)?,
                () = cancel.cancelled() => return Err(DomainError::Canceled),
            };
            if answer.question_id != question.id {
                tracing::debug!(
                    expected = %question.id,
                    got = %answer.question_id,
                    "dropping answer for a prior ask"
                );
                continue;
            }
            validate_answer(&question, &answer)?;
            let exchange = QuestionExchange {
                question,
                answer: answer.clone(),
                asked_at,
                answered_at: self.clock.now(),
            };
            self.history
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner)
                .push(exchange);
            return Ok(answer);
        }
    }

    /// Completed round-trips, oldest first. Defensive copy.
    pub fn history(&self) -> Vec<QuestionExchange> {
        self.history
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }
}
