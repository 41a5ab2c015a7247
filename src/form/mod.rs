//! Form system: the guided chain-creation dialogue.
//!
//! The chain form walks a party through the six chain fields and delegates to
//! a nested participant form that can be repeated any number of times. All
//! collected data lives in a per-conversation `Session`; nothing is shared
//! between conversations.

pub mod chain;
pub mod fields;
pub mod participant;
pub mod session;
pub mod signal;

pub use chain::{ChainForm, ChainState, Reply, Review};
pub use fields::{ChainField, ParticipantField};
pub use participant::{ParticipantForm, ParticipantState, ParticipantStep, RetryOutcome};
pub use session::{ChainRecord, FieldSnapshot, Participant, ParticipantDraft, Session};
pub use signal::{Command, ExpectedSignal, RetryAnswer, Selection, Signal, SignalParser};
