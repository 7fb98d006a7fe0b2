//! Ready Room: the planning loop coordinating the three specialists.
//!
//! Roles execute in a fixed order within each iteration; messages a role
//! produces are visible to any role visited after it in the same
//! iteration and to every role in subsequent iterations. Questions block
//! the loop on the question gate until the decider answers.

use std::collections::{BTreeMap, HashMap};

use serde_json::json;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::{
    compute_coverage, Answer, ClassificationSource, Classification, Commission, CoverageState,
    MessageKind, MissionPlan, PlannerRole, Question, ReadyRoomMessage, Recipient,
};
use crate::domain::ports::{
    Clock, MissionClassifier, MissionContribution, PlanningSession, SessionFactory, SessionTurn,
    SessionTurnInput,
};
use crate::services::event_bus::{CoreEvent, EventBus, EventKind, EventSeverity};
use crate::services::question_gate::QuestionGate;

pub const OPTION_CONFIRM: &str = "Confirm";
pub const OPTION_RED_ALERT: &str = "Reclassify as RED_ALERT";
pub const OPTION_STANDARD_OPS: &str = "Reclassify as STANDARD_OPS";

/// Configuration for the planning loop.
#[derive(Debug, Clone)]
pub struct ReadyRoomConfig {
    pub max_iterations: u32,
}

impl Default for ReadyRoomConfig {
    fn default() -> Self {
        Self { max_iterations: 5 }
    }
}

/// Result of one planning run.
#[derive(Debug, Clone)]
pub struct PlanOutcome {
    /// Missions sorted by id.
    pub missions: Vec<MissionPlan>,
    pub consensus: bool,
    pub iterations: u32,
    pub coverage: BTreeMap<String, CoverageState>,
    /// Full routed-message log in delivery order.
    pub messages: Vec<ReadyRoomMessage>,
}

/// The planning loop.
pub struct ReadyRoom {
    factory: Arc<dyn SessionFactory>,
    question_gate: Arc<QuestionGate>,
    classifier: Option<Arc<dyn MissionClassifier>>,
    bus: Arc<EventBus>,
    clock: Arc<dyn Clock>,
    config: ReadyRoomConfig,
}

impl ReadyRoom {
    pub fn new(
        factory: Arc<dyn SessionFactory>,
        question_gate: Arc<QuestionGate>,
        bus: Arc<EventBus>,
        clock: Arc<dyn Clock>,
        config: ReadyRoomConfig,
    ) -> Self {
        Self {
            factory,
            question_gate,
            classifier: None,
            bus,
            clock,
            config,
        }
    }

    /// Inject the mission classifier. The classifier never calls back
    /// into the room.
    pub fn with_classifier(mut self, classifier: Arc<dyn MissionClassifier>) -> Self {
        self.classifier = Some(classifier);
        self
    }

    /// Run the planning loop to consensus or iteration exhaustion.
    ///
    /// Exactly one session is spawned per role; every spawned session is
    /// closed on any exit path.
    pub async fn plan(
        &self,
        cancel: &CancellationToken,
        commission: &Commission,
    ) -> DomainResult<PlanOutcome> {
        let mut sessions: Vec<(PlannerRole, Box<dyn PlanningSession>)> = Vec::new();
        let mut spawn_error = None;
        for role in PlannerRole::VISIT_ORDER {
            match self.factory.spawn(cancel, role, commission).await {
                Ok(session) => sessions.push((role, session)),
                Err(e) => {
                    spawn_error = Some(e);
                    break;
                }
            }
        }

        let result = match spawn_error {
            Some(e) => Err(e),
            None => self.run_loop(cancel, commission, &mut sessions).await,
        };

        for (role, session) in &mut sessions {
            if let Err(e) = session.close().await {
                tracing::warn!(role = %role, error = %e, "failed to close planning session");
            }
        }

        result
    }

    async fn run_loop(
        &self,
        cancel: &CancellationToken,
        commission: &Commission,
        sessions: &mut [(PlannerRole, Box<dyn PlanningSession>)],
    ) -> DomainResult<PlanOutcome> {
        let mut missions: BTreeMap<String, MissionPlan> = BTreeMap::new();
        let mut mailboxes: HashMap<PlannerRole, Vec<ReadyRoomMessage>> = HashMap::new();
        let mut log: Vec<ReadyRoomMessage> = Vec::new();

        let use_case_ids: Vec<String> =
            commission.use_cases.iter().map(|uc| uc.id.clone()).collect();

        for iteration in 1..=self.config.max_iterations {
            if cancel.is_cancelled() {
                return Err(DomainError::Canceled);
            }
            tracing::debug!(commission_id = %commission.id, iteration, "planning iteration");

            for index in 0..sessions.len() {
                let role = sessions[index].0;
                let mailbox = mailboxes.remove(&role).unwrap_or_default();
                let input = SessionTurnInput {
                    iteration,
                    commission,
                    mailbox,
                    missions: missions.values().cloned().collect(),
                };
                let turn = sessions[index].1.execute(cancel, input).await?;
                self.process_turn(
                    cancel,
                    commission,
                    role,
                    turn,
                    &mut missions,
                    &mut mailboxes,
                    &mut log,
                )
                .await?;
            }

            let coverage = compute_coverage(&use_case_ids, &missions.values().cloned().collect::<Vec<_>>());
            let all_signed = missions.values().all(|m| m.signoffs.complete());
            let all_covered = coverage.values().all(|c| *c == CoverageState::Covered);
            if all_signed && all_covered {
                tracing::info!(
                    commission_id = %commission.id,
                    iteration,
                    missions = missions.len(),
                    "planning consensus reached"
                );
                return Ok(PlanOutcome {
                    missions: missions.into_values().collect(),
                    consensus: true,
                    iterations: iteration,
                    coverage,
                    messages: log,
                });
            }
        }

        let coverage = compute_coverage(&use_case_ids, &missions.values().cloned().collect::<Vec<_>>());
        tracing::warn!(
            commission_id = %commission.id,
            iterations = self.config.max_iterations,
            "planning iterations exhausted without consensus"
        );
        Ok(PlanOutcome {
            missions: missions.into_values().collect(),
            consensus: false,
            iterations: self.config.max_iterations,
            coverage,
            messages: log,
        })
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_turn(
        &self,
        cancel: &CancellationToken,
        commission: &Commission,
        role: PlannerRole,
        turn: SessionTurn,
        missions: &mut BTreeMap<String, MissionPlan>,
        mailboxes: &mut HashMap<PlannerRole, Vec<ReadyRoomMessage>>,
        log: &mut Vec<ReadyRoomMessage>,
    ) -> DomainResult<()> {
        // Questions suspend the loop one at a time until answered.
        for mut question in turn.questions {
            question.asked_by = role;
            let broadcast = question.broadcast;
            let answer = self.question_gate.ask(cancel, question.clone()).await?;
            self.bus.publish(CoreEvent::new(
                EventKind::AdmiralQuestion,
                EventSeverity::Info,
                question.mission_id.clone(),
                json!({ "question": question, "answer": answer }),
            ));
            self.route_answer(role, &answer, broadcast, mailboxes, log);
        }

        let contributed: Vec<String> = turn
            .contributions
            .iter()
            .map(|c| c.mission_id.clone())
            .collect();
        for contribution in turn.contributions {
            merge_contribution(missions, role, contribution);
        }

        // Only the commander's contributions are risk-classified.
        if role == PlannerRole::Commander {
            if let Some(classifier) = &self.classifier {
                for mission_id in contributed {
                    self.classify_mission(cancel, commission, classifier.as_ref(), missions, &mission_id)
                        .await?;
                }
            }
        }

        for mut message in turn.messages {
            message.sender = role;
            if message.is_unstamped() {
                message.timestamp = self.clock.now();
            }
            match message.recipient.clone() {
                Recipient::Broadcast => {
                    for other in PlannerRole::VISIT_ORDER.iter().filter(|r| **r != role) {
                        mailboxes.entry(*other).or_default().push(message.clone());
                    }
                }
                Recipient::Role(target) => {
                    mailboxes.entry(target).or_default().push(message.clone());
                }
            }
            log.push(message);
        }

        Ok(())
    }

    /// A broadcast answer lands in every mailbox at answer time, so a
    /// non-asking role observes it on its next visit.
    fn route_answer(
        &self,
        asking_role: PlannerRole,
        answer: &Answer,
        broadcast: bool,
        mailboxes: &mut HashMap<PlannerRole, Vec<ReadyRoomMessage>>,
        log: &mut Vec<ReadyRoomMessage>,
    ) {
        let mut message = ReadyRoomMessage::new(
            asking_role,
            Recipient::Role(asking_role),
            MessageKind::Answer,
            answer.rendered(),
        );
        message.timestamp = self.clock.now();
        mailboxes.entry(asking_role).or_default().push(message.clone());
        if broadcast || answer.broadcast {
            for other in PlannerRole::VISIT_ORDER.iter().filter(|r| **r != asking_role) {
                mailboxes.entry(*other).or_default().push(message.clone());
            }
        }
        log.push(message);
    }

    async fn classify_mission(
        &self,
        cancel: &CancellationToken,
        commission: &Commission,
        classifier: &dyn MissionClassifier,
        missions: &mut BTreeMap<String, MissionPlan>,
        mission_id: &str,
    ) -> DomainResult<()> {
        let Some(mission) = missions.get(mission_id).cloned() else {
            return Ok(());
        };
        let mut risk = classifier.classify(cancel, commission, &mission).await?;

        if risk.needs_review || risk.confidence < classifier.review_threshold() {
            let question = Question {
                id: format!("classify-{mission_id}"),
                asked_by: PlannerRole::Commander,
                mission_id: Some(mission_id.to_string()),
                domain: Some("classification".to_string()),
                text: format!(
                    "Classifier tagged mission {mission_id} as {} with confidence {:.2}. Confirm?",
                    risk.tag, risk.confidence
                ),
                options: vec![
                    OPTION_CONFIRM.to_string(),
                    OPTION_RED_ALERT.to_string(),
                    OPTION_STANDARD_OPS.to_string(),
                ],
                allow_free_text: false,
                broadcast: false,
            };
            let answer = self.question_gate.ask(cancel, question).await?;
            if !answer.skip {
                match answer.selected.as_deref() {
                    Some(OPTION_RED_ALERT) => {
                        risk.tag = Classification::RedAlert;
                        risk.confidence = 1.0;
                    }
                    Some(OPTION_STANDARD_OPS) => {
                        risk.tag = Classification::StandardOps;
                        risk.confidence = 1.0;
                    }
                    _ => {}
                }
                risk.needs_review = false;
                risk.source = ClassificationSource::Decider;
            }
        }

        if let Some(entry) = missions.get_mut(mission_id) {
            entry.classification = risk;
        }
        Ok(())
    }
}

fn merge_contribution(
    missions: &mut BTreeMap<String, MissionPlan>,
    role: PlannerRole,
    contribution: MissionContribution,
) {
    let entry = missions
        .entry(contribution.mission_id.clone())
        .or_insert_with(|| MissionPlan::new(&contribution.mission_id, &contribution.title));
    if !contribution.title.is_empty() {
        entry.title = contribution.title;
    }
    entry.add_use_cases(&contribution.use_case_ids);
    for dep in contribution.depends_on {
        if !entry.depends_on.contains(&dep) {
            entry.depends_on.push(dep);
        }
    }
    for pattern in contribution.surface_area {
        if !entry.surface_area.contains(&pattern) {
            entry.surface_area.push(pattern);
        }
    }
    if contribution.max_revisions.is_some() {
        entry.max_revisions = contribution.max_revisions;
    }
    if contribution.sign_off {
        match role {
            PlannerRole::Captain => entry.signoffs.captain = true,
            PlannerRole::Commander => entry.signoffs.commander = true,
            PlannerRole::DesignOfficer => entry.signoffs.design_officer = true,
        }
    }
}
