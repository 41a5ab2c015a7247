//! Per-conversation session state.
//!
//! The session owns everything a party has entered so far: chain field values,
//! the field currently awaiting a value, the participant being filled in and
//! the list of completed participants. Mutation goes through methods so a
//! partially filled participant never leaks into the visible record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::FormError;

use super::fields::{ChainField, ParticipantField};

/// A completed participant. Only constructed once all three fields are present.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Participant {
    pub name: String,
    pub role: String,
    pub number: String,
}

impl Participant {
    pub fn get(&self, field: ParticipantField) -> &str {
        match field {
            ParticipantField::Name => &self.name,
            ParticipantField::Role => &self.role,
            ParticipantField::Number => &self.number,
        }
    }
}

/// A participant being filled in. May hold any subset of the three fields.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantDraft {
    values: BTreeMap<ParticipantField, String>,
    pending: Option<ParticipantField>,
}

impl ParticipantDraft {
    pub fn values(&self) -> &BTreeMap<ParticipantField, String> {
        &self.values
    }

    pub fn pending(&self) -> Option<ParticipantField> {
        self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.pending.is_none()
    }

    /// Required fields not yet provided, sorted by keyword.
    pub fn missing(&self) -> Vec<ParticipantField> {
        let mut missing: Vec<ParticipantField> = ParticipantField::ALL
            .into_iter()
            .filter(|f| !self.values.contains_key(f))
            .collect();
        missing.sort_by_key(|f| f.label());
        missing
    }

    /// Build the completed record, if every field is present.
    pub fn to_participant(&self) -> Option<Participant> {
        Some(Participant {
            name: self.values.get(&ParticipantField::Name)?.clone(),
            role: self.values.get(&ParticipantField::Role)?.clone(),
            number: self.values.get(&ParticipantField::Number)?.clone(),
        })
    }
}

/// Read-only view of the chain fields, for review and display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FieldSnapshot {
    pub fields: BTreeMap<ChainField, String>,
    /// Participants flushed into the record so far. Participants completed in
    /// the current participant round only appear once the party stops adding more.
    pub participants: Vec<Participant>,
}

impl FieldSnapshot {
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty() && self.participants.is_empty()
    }
}

/// The finished chain, handed back by `ChainForm::finish`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainRecord {
    pub fields: BTreeMap<ChainField, String>,
    pub participants: Vec<Participant>,
}

impl ChainRecord {
    pub fn get(&self, field: ChainField) -> Option<&str> {
        self.fields.get(&field).map(String::as_str)
    }
}

/// Mutable state for one conversation.
#[derive(Debug, Clone, Default)]
pub struct Session {
    fields: BTreeMap<ChainField, String>,
    pending_field: Option<ChainField>,
    draft: ParticipantDraft,
    participants: Vec<Participant>,
    /// How many of `participants` have been flushed into the visible record.
    flushed: usize,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    // ── Chain fields ────────────────────────────────────────────────

    /// Mark `field` as awaiting a value.
    pub fn select_field(&mut self, field: ChainField) -> Result<(), FormError> {
        if let Some(pending) = self.pending_field {
            return Err(FormError::invalid_state(
                "select a field",
                format!("awaiting a value for {pending}"),
            ));
        }
        self.pending_field = Some(field);
        Ok(())
    }

    /// Store `value` against the pending field and clear the marker.
    pub fn store_value(&mut self, value: impl Into<String>) -> Result<ChainField, FormError> {
        let field = self
            .pending_field
            .take()
            .ok_or_else(|| FormError::invalid_state("store a value", "no field is pending"))?;
        self.fields.insert(field, value.into());
        Ok(field)
    }

    pub fn pending_field(&self) -> Option<ChainField> {
        self.pending_field
    }

    pub fn snapshot_fields(&self) -> FieldSnapshot {
        FieldSnapshot {
            fields: self.fields.clone(),
            participants: self.participants[..self.flushed].to_vec(),
        }
    }

    /// Chain fields still missing, in declaration order.
    pub fn missing_fields(&self) -> Vec<ChainField> {
        ChainField::ALL
            .into_iter()
            .filter(|f| !self.fields.contains_key(f))
            .collect()
    }

    // ── Participants ────────────────────────────────────────────────

    pub fn select_participant_field(&mut self, field: ParticipantField) -> Result<(), FormError> {
        if let Some(pending) = self.draft.pending {
            return Err(FormError::invalid_state(
                "select a participant field",
                format!("awaiting a value for {pending}"),
            ));
        }
        self.draft.pending = Some(field);
        Ok(())
    }

    pub fn store_participant_value(
        &mut self,
        value: impl Into<String>,
    ) -> Result<ParticipantField, FormError> {
        let field = self.draft.pending.take().ok_or_else(|| {
            FormError::invalid_state("store a participant value", "no participant field is pending")
        })?;
        self.draft.values.insert(field, value.into());
        Ok(field)
    }

    pub fn draft(&self) -> &ParticipantDraft {
        &self.draft
    }

    /// Move the in-progress participant into the participant list.
    ///
    /// Fails without touching anything if the draft is incomplete.
    pub fn commit_participant(&mut self) -> Result<Participant, FormError> {
        let participant = self.draft.to_participant().ok_or_else(|| FormError::IncompleteFields {
            missing: self
                .draft
                .missing()
                .iter()
                .map(|f| f.label().to_string())
                .collect(),
        })?;
        self.participants.push(participant.clone());
        self.draft = ParticipantDraft::default();
        Ok(participant)
    }

    pub fn discard_draft(&mut self) {
        self.draft = ParticipantDraft::default();
    }

    /// Make every completed participant part of the visible record.
    pub fn flush_participants(&mut self) {
        self.flushed = self.participants.len();
    }

    pub fn participants(&self) -> &[Participant] {
        &self.participants
    }

    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }

    // ── Lifecycle ───────────────────────────────────────────────────

    /// Drop all collected data.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
            && self.pending_field.is_none()
            && self.draft.is_empty()
            && self.participants.is_empty()
    }

    /// Assemble the final record. The caller is responsible for checking
    /// `missing_fields` first.
    pub(crate) fn to_record(&self) -> ChainRecord {
        ChainRecord {
            fields: self.fields.clone(),
            participants: self.participants.clone(),
        }
    }
}
