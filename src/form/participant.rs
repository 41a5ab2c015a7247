//! Participant sub-form: collects name, role and number for one participant,
//! then asks whether to add another.
//!
//! `SelectingField → ValuePending → SelectingField ... → RetryDecision`, and
//! back to `SelectingField` on "repeat". The data itself lives in the
//! `Session`; this controller only tracks where in the cycle the party is.

use serde::Serialize;

use crate::error::FormError;

use super::fields::ParticipantField;
use super::session::{Participant, Session};
use super::signal::{ExpectedSignal, RetryAnswer, Selection};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantState {
    SelectingField,
    ValuePending,
    RetryDecision,
}

impl std::fmt::Display for ParticipantState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::SelectingField => "selecting_field",
            Self::ValuePending => "value_pending",
            Self::RetryDecision => "retry_decision",
        };
        write!(f, "{s}")
    }
}

/// What happened after a participant input was accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParticipantStep {
    /// A value is now awaited for this field.
    Prompt(ParticipantField),
    /// The value was stored but these fields are still missing (sorted by keyword).
    Incomplete {
        stored: ParticipantField,
        missing: Vec<ParticipantField>,
    },
    /// All three fields present. The record is already in the session's
    /// participant list; the party is now asked whether to add another.
    Completed(Participant),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryOutcome {
    /// Start a fresh participant.
    Repeat,
    /// Participant collection is over; control returns to the chain form.
    Stop { participants: usize },
}

/// Controller for the participant sub-form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParticipantForm {
    state: ParticipantState,
}

impl Default for ParticipantForm {
    fn default() -> Self {
        Self::new()
    }
}

impl ParticipantForm {
    pub fn new() -> Self {
        Self {
            state: ParticipantState::SelectingField,
        }
    }

    pub fn state(&self) -> ParticipantState {
        self.state
    }

    pub fn select_field(
        &mut self,
        session: &mut Session,
        field: ParticipantField,
    ) -> Result<ParticipantStep, FormError> {
        if self.state != ParticipantState::SelectingField {
            return Err(FormError::invalid_state("select a participant field", self.state));
        }
        session.select_participant_field(field)?;
        self.state = ParticipantState::ValuePending;
        tracing::debug!(field = %field, "Participant field selected");
        Ok(ParticipantStep::Prompt(field))
    }

    /// Store a value for the pending field, then check completion.
    pub fn store_value(
        &mut self,
        session: &mut Session,
        value: impl Into<String>,
    ) -> Result<ParticipantStep, FormError> {
        if self.state != ParticipantState::ValuePending {
            return Err(FormError::invalid_state("store a participant value", self.state));
        }
        let stored = session.store_participant_value(value)?;
        self.state = ParticipantState::SelectingField;
        Ok(self.check_completion(session, stored))
    }

    /// Incomplete drafts keep the form in `SelectingField`. A complete one is
    /// committed to the session before the retry question is asked, so the
    /// question only concerns starting a new record.
    fn check_completion(&mut self, session: &mut Session, stored: ParticipantField) -> ParticipantStep {
        let missing = session.draft().missing();
        if !missing.is_empty() {
            return ParticipantStep::Incomplete { stored, missing };
        }

        match session.commit_participant() {
            Ok(participant) => {
                self.state = ParticipantState::RetryDecision;
                tracing::debug!(
                    participants = session.participant_count(),
                    "Participant completed"
                );
                ParticipantStep::Completed(participant)
            }
            // Unreachable while `missing` is empty, but stay in SelectingField
            // with whatever the session reports rather than panic.
            Err(_) => ParticipantStep::Incomplete {
                stored,
                missing: session.draft().missing(),
            },
        }
    }

    pub fn decide_retry(
        &mut self,
        session: &mut Session,
        answer: RetryAnswer,
    ) -> Result<RetryOutcome, FormError> {
        if self.state != ParticipantState::RetryDecision {
            return Err(FormError::invalid_state("answer the retry question", self.state));
        }
        match answer {
            RetryAnswer::Repeat => {
                session.discard_draft();
                self.state = ParticipantState::SelectingField;
                Ok(RetryOutcome::Repeat)
            }
            RetryAnswer::Stop => {
                session.flush_participants();
                Ok(RetryOutcome::Stop {
                    participants: session.participant_count(),
                })
            }
        }
    }

    pub fn expected_signals(&self) -> Vec<ExpectedSignal> {
        match self.state {
            ParticipantState::SelectingField => ParticipantField::ALL
                .into_iter()
                .map(|f| ExpectedSignal::Select(Selection::Participant(f)))
                .collect(),
            ParticipantState::ValuePending => vec![ExpectedSignal::Value],
            ParticipantState::RetryDecision => vec![
                ExpectedSignal::Retry(RetryAnswer::Repeat),
                ExpectedSignal::Retry(RetryAnswer::Stop),
            ],
        }
    }
}
