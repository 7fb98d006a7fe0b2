//! Planner-to-decider questions and their answers.

use serde::{Deserialize, Serialize};

use crate::domain::errors::{DomainError, DomainResult};
use crate::domain::models::message::PlannerRole;

/// A blocking question raised mid-planning.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub asked_by: PlannerRole,
    #[serde(default)]
    pub mission_id: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
    pub text: String,
    #[serde(default)]
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_free_text: bool,
    #[serde(default)]
    pub broadcast: bool,
}

impl Question {
    pub fn validate(&self) -> DomainResult<()> {
        if self.id.trim().is_empty() {
            return Err(DomainError::Validation("question has empty id".into()));
        }
        if self.text.trim().is_empty() {
            return Err(DomainError::Validation(format!(
                "question {} has empty text",
                self.id
            )));
        }
        Ok(())
    }
}

/// The decider's answer to one question.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Answer {
    pub question_id: String,
    #[serde(default)]
    pub selected: Option<String>,
    #[serde(default)]
    pub free_text: Option<String>,
    #[serde(default)]
    pub skip: bool,
    #[serde(default)]
    pub broadcast: bool,
}

impl Answer {
    pub fn skip(question_id: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            selected: None,
            free_text: None,
            skip: true,
            broadcast: false,
        }
    }

    pub fn selected(question_id: impl Into<String>, option: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            selected: Some(option.into()),
            free_text: None,
            skip: false,
            broadcast: false,
        }
    }

    pub fn free_text(question_id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            question_id: question_id.into(),
            selected: None,
            free_text: Some(text.into()),
            skip: false,
            broadcast: false,
        }
    }

    /// A short human-readable rendering for mailbox routing.
    pub fn rendered(&self) -> String {
        if self.skip {
            "(skipped)".to_string()
        } else if let Some(sel) = &self.selected {
            sel.clone()
        } else if let Some(text) = &self.free_text {
            text.clone()
        } else {
            String::new()
        }
    }
}

/// An answer is valid iff it skips, selects a listed option, or carries
/// free text when the question allows it.
pub fn validate_answer(question: &Question, answer: &Answer) -> DomainResult<()> {
    if answer.question_id != question.id {
        return Err(DomainError::Validation(format!(
            "answer targets question {} but {} was asked",
            answer.question_id, question.id
        )));
    }
    if answer.skip {
        return Ok(());
    }
    if let Some(selected) = &answer.selected {
        if question.options.iter().any(|o| o == selected) {
            return Ok(());
        }
        return Err(DomainError::Validation(format!(
            "selected option {selected:?} is not offered by question {}",
            question.id
        )));
    }
    match &answer.free_text {
        Some(text) if question.allow_free_text && !text.trim().is_empty() => Ok(()),
        Some(_) => Err(DomainError::Validation(format!(
            "question {} does not accept free text",
            question.id
        ))),
        None => Err(DomainError::Validation(format!(
            "answer to question {} carries no content",
            question.id
        ))),
    }
}
