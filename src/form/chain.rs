//! Chain form: the top-level dialogue.
//!
//! ```text
//! SelectingField ⇄ ValuePending
//!       │  ▲
//!       ▼  │ (stop)
//! Participants(ParticipantForm)
//!
//! any ──cancel──▶ Cancelled      SelectingField ──done──▶ Done
//! ```
//!
//! While delegated, the chain form stays parked in `Participants` and resumes
//! in `SelectingField` when the participant form reports `Stop`.

use serde::Serialize;

use crate::error::FormError;

use super::fields::{ChainField, ParticipantField};
use super::participant::{ParticipantForm, ParticipantState, ParticipantStep, RetryOutcome};
use super::session::{ChainRecord, FieldSnapshot, Participant, Session};
use super::signal::{Command, ExpectedSignal, RetryAnswer, Selection, Signal};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainState {
    SelectingField,
    ValuePending,
    /// Delegated to the participant sub-form.
    Participants(ParticipantForm),
    Done,
    Cancelled,
}

impl ChainState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Cancelled)
    }
}

impl std::fmt::Display for ChainState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SelectingField => write!(f, "selecting_field"),
            Self::ValuePending => write!(f, "value_pending"),
            Self::Participants(p) => write!(f, "participants/{}", p.state()),
            Self::Done => write!(f, "done"),
            Self::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// Stored fields plus how many participants have been collected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Review {
    pub snapshot: FieldSnapshot,
    pub participant_count: usize,
}

/// Result of an accepted input, for the presentation layer to render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// The form was just entered.
    Started,
    /// A chain field was selected; its value is awaited.
    PromptChain(ChainField),
    /// A chain value was stored.
    Stored {
        field: ChainField,
        snapshot: FieldSnapshot,
    },
    /// Control moved to the participant sub-form.
    ParticipantsStarted,
    PromptParticipant(ParticipantField),
    ParticipantIncomplete {
        stored: ParticipantField,
        missing: Vec<ParticipantField>,
    },
    /// Participant committed; the retry question is next.
    ParticipantCompleted(Participant),
    /// A new participant is being started.
    ParticipantRepeat,
    /// Participant collection ended; back in chain field selection.
    ParticipantsDone { count: usize },
    Review(Review),
    Finished(ChainRecord),
    Cancelled,
    /// Input did not match anything the current state accepts. Nothing changed.
    Ignored,
}

/// One party's chain form: the session data plus the controller state.
#[derive(Debug, Clone)]
pub struct ChainForm {
    session: Session,
    state: ChainState,
}

impl ChainForm {
    /// Enter the form with a fresh session.
    pub fn begin() -> Self {
        Self {
            session: Session::new(),
            state: ChainState::SelectingField,
        }
    }

    pub fn state(&self) -> &ChainState {
        &self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }

    fn ensure_active(&self, operation: &'static str) -> Result<(), FormError> {
        if self.state.is_terminal() {
            return Err(FormError::invalid_state(operation, &self.state));
        }
        Ok(())
    }

    /// Route a parsed signal to the matching operation for the current state.
    pub fn handle(&mut self, signal: Signal) -> Result<Reply, FormError> {
        match signal {
            Signal::Command(Command::Cancel) => Ok(self.cancel()),
            Signal::Command(Command::CreateChain) => {
                self.ensure_active("begin a chain")?;
                Ok(Reply::Ignored)
            }
            Signal::Command(_) => Ok(Reply::Ignored),
            Signal::Select(selection) => self.handle_selection(selection),
            Signal::Text(text) => self.handle_text(text),
        }
    }

    fn handle_selection(&mut self, selection: Selection) -> Result<Reply, FormError> {
        // Review answers from any open state, including mid-value and inside
        // the participant sub-form, and never moves the form.
        if selection == Selection::Review && !self.state.is_terminal() {
            return Ok(Reply::Review(self.review_current()));
        }
        match &self.state {
            ChainState::SelectingField => self.select_field(selection),
            // Keywords are never taken as values.
            ChainState::ValuePending => Ok(Reply::Ignored),
            ChainState::Participants(_) => match selection {
                Selection::Participant(field) => self.select_participant_field(field),
                other => Err(FormError::invalid_state(
                    "select a participant field",
                    format!("{} (got {})", self.state, other.keyword()),
                )),
            },
            ChainState::Done | ChainState::Cancelled => {
                Err(FormError::invalid_state("select a field", &self.state))
            }
        }
    }

    fn handle_text(&mut self, text: String) -> Result<Reply, FormError> {
        match &self.state {
            ChainState::SelectingField => Ok(Reply::Ignored),
            ChainState::ValuePending => self.store_value(text),
            ChainState::Participants(p) => match p.state() {
                ParticipantState::RetryDecision => {
                    match RetryAnswer::parse(&text) {
                        Some(answer) => self.decide_retry(answer),
                        None => Err(FormError::invalid_state(
                            "answer the retry question",
                            format!("{} (got unrecognized answer)", self.state),
                        )),
                    }
                }
                ParticipantState::ValuePending => self.store_value(text),
                ParticipantState::SelectingField => {
                    Err(FormError::invalid_state(
                        "select a participant field",
                        format!("{} (got unrecognized field)", self.state),
                    ))
                }
            },
            ChainState::Done | ChainState::Cancelled => {
                Err(FormError::invalid_state("store a value", &self.state))
            }
        }
    }

    /// Chain-scope selection. Participant-field keywords are not chain
    /// selections and are ignored here.
    pub fn select_field(&mut self, selection: Selection) -> Result<Reply, FormError> {
        if self.state != ChainState::SelectingField {
            return Err(FormError::invalid_state("select a field", &self.state));
        }
        match selection {
            Selection::Chain(field) => {
                self.session.select_field(field)?;
                self.state = ChainState::ValuePending;
                tracing::debug!(field = %field, "Chain field selected");
                Ok(Reply::PromptChain(field))
            }
            Selection::Participants => {
                self.session.discard_draft();
                self.state = ChainState::Participants(ParticipantForm::new());
                tracing::debug!("Entering participant form");
                Ok(Reply::ParticipantsStarted)
            }
            Selection::Review => Ok(Reply::Review(self.review_current())),
            Selection::Done => self.finish().map(Reply::Finished),
            Selection::Participant(_) => Ok(Reply::Ignored),
        }
    }

    fn select_participant_field(&mut self, field: ParticipantField) -> Result<Reply, FormError> {
        let ChainState::Participants(form) = &mut self.state else {
            return Err(FormError::invalid_state("select a participant field", &self.state));
        };
        match form.select_field(&mut self.session, field)? {
            ParticipantStep::Prompt(field) => Ok(Reply::PromptParticipant(field)),
            step => Ok(participant_reply(step)),
        }
    }

    /// Store a value for whichever field is pending, chain or participant.
    pub fn store_value(&mut self, value: impl Into<String>) -> Result<Reply, FormError> {
        match &mut self.state {
            ChainState::ValuePending => {
                let field = self.session.store_value(value)?;
                self.state = ChainState::SelectingField;
                Ok(Reply::Stored {
                    field,
                    snapshot: self.session.snapshot_fields(),
                })
            }
            ChainState::Participants(form) => {
                let step = form.store_value(&mut self.session, value)?;
                Ok(participant_reply(step))
            }
            _ => Err(FormError::invalid_state("store a value", &self.state)),
        }
    }

    pub fn decide_retry(&mut self, answer: RetryAnswer) -> Result<Reply, FormError> {
        let ChainState::Participants(form) = &mut self.state else {
            return Err(FormError::invalid_state("answer the retry question", &self.state));
        };
        match form.decide_retry(&mut self.session, answer)? {
            RetryOutcome::Repeat => Ok(Reply::ParticipantRepeat),
            RetryOutcome::Stop { participants } => {
                self.state = ChainState::SelectingField;
                tracing::debug!(participants, "Participant form finished");
                Ok(Reply::ParticipantsDone {
                    count: participants,
                })
            }
        }
    }

    /// Never mutates anything.
    pub fn review_current(&self) -> Review {
        Review {
            snapshot: self.session.snapshot_fields(),
            participant_count: self.session.participant_count(),
        }
    }

    /// Drop everything collected so far. Valid from any state.
    pub fn cancel(&mut self) -> Reply {
        self.session.reset();
        self.state = ChainState::Cancelled;
        Reply::Cancelled
    }

    /// Finish the chain once all six fields are present.
    pub fn finish(&mut self) -> Result<ChainRecord, FormError> {
        if self.state != ChainState::SelectingField {
            return Err(FormError::invalid_state("finish the chain", &self.state));
        }
        let missing = self.session.missing_fields();
        if !missing.is_empty() {
            return Err(FormError::IncompleteFields {
                missing: missing.iter().map(|f| f.label().to_string()).collect(),
            });
        }
        let record = self.session.to_record();
        self.state = ChainState::Done;
        Ok(record)
    }

    /// Inputs the current state will accept.
    pub fn expected_signals(&self) -> Vec<ExpectedSignal> {
        let mut expected: Vec<ExpectedSignal> = match &self.state {
            ChainState::SelectingField => ChainField::ALL
                .into_iter()
                .map(|f| ExpectedSignal::Select(Selection::Chain(f)))
                .chain([
                    ExpectedSignal::Select(Selection::Participants),
                    ExpectedSignal::Select(Selection::Review),
                    ExpectedSignal::Select(Selection::Done),
                ])
                .collect(),
            ChainState::ValuePending => {
                vec![ExpectedSignal::Value, ExpectedSignal::Select(Selection::Review)]
            }
            ChainState::Participants(form) => {
                let mut expected = form.expected_signals();
                expected.push(ExpectedSignal::Select(Selection::Review));
                expected
            }
            ChainState::Done | ChainState::Cancelled => return Vec::new(),
        };
        expected.push(ExpectedSignal::Cancel);
        expected
    }
}

fn participant_reply(step: ParticipantStep) -> Reply {
    match step {
        ParticipantStep::Prompt(field) => Reply::PromptParticipant(field),
        ParticipantStep::Incomplete { stored, missing } => {
            Reply::ParticipantIncomplete { stored, missing }
        }
        ParticipantStep::Completed(participant) => Reply::ParticipantCompleted(participant),
    }
}
