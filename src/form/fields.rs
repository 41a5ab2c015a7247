//! Closed field sets for the chain form and its participant sub-form.
//!
//! Each variant carries the exact keyword the party sends (or taps on the
//! reply keyboard) to select it.

use serde::{Deserialize, Serialize};

/// Top-level chain fields. All six are required before a chain can be finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChainField {
    Title,
    NotificationMessage,
    StartDate,
    EndDate,
    WarningDays,
    Periodicity,
}

impl ChainField {
    /// Every chain field, in declaration order.
    pub const ALL: [ChainField; 6] = [
        Self::Title,
        Self::NotificationMessage,
        Self::StartDate,
        Self::EndDate,
        Self::WarningDays,
        Self::Periodicity,
    ];

    /// Keyword the party uses to select this field.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Title => "Titulo",
            Self::NotificationMessage => "Mensaje de notificación",
            Self::StartDate => "Fecha de inicio",
            Self::EndDate => "Fecha de fin",
            Self::WarningDays => "dias de aviso",
            Self::Periodicity => "Periodicidad",
        }
    }

    /// Exact keyword match.
    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.label() == label)
    }
}

impl std::fmt::Display for ChainField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Participant fields. A participant is complete once all three are present.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ParticipantField {
    Name,
    Role,
    Number,
}

impl ParticipantField {
    pub const ALL: [ParticipantField; 3] = [Self::Name, Self::Role, Self::Number];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Name => "Nombre",
            Self::Role => "Puesto",
            Self::Number => "Numero",
        }
    }

    pub fn from_label(label: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|f| f.label() == label)
    }
}

impl std::fmt::Display for ParticipantField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
