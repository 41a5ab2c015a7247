//! Signals: incoming text mapped onto the inputs the forms understand.
//!
//! Matching is exact keyword matching only. Anything that is neither a
//! command nor a keyword is passed through as free text; whether that text is
//! a value or noise depends on the state the form is in.

use serde::Serialize;

use super::fields::{ChainField, ParticipantField};

/// Parses message text into `Signal`s.
pub struct SignalParser;

impl SignalParser {
    pub fn parse(content: &str) -> Signal {
        let trimmed = content.trim();

        if let Some(command) = parse_command(trimmed) {
            return Signal::Command(command);
        }

        match Selection::from_keyword(trimmed) {
            Some(selection) => Signal::Select(selection),
            None => Signal::Text(trimmed.to_string()),
        }
    }
}

/// `/name[@bot] [args...]`
fn parse_command(trimmed: &str) -> Option<Command> {
    let rest = trimmed.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let head = parts.next()?;
    // Group chats address commands as /cmd@botname.
    let name = head.split('@').next().unwrap_or(head).to_lowercase();
    let args: Vec<String> = parts.map(str::to_string).collect();

    Some(match name.as_str() {
        "start" => Command::Start,
        "help" => Command::Help,
        "mis_cadenas" => Command::MyChains,
        "ver_cadena" => Command::ViewChain { args },
        "crear_cadena" => Command::CreateChain,
        "cancel" => Command::Cancel,
        _ => Command::Unknown { name },
    })
}

/// A parsed input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signal {
    /// A slash command.
    Command(Command),
    /// A keyword naming a field or a form action.
    Select(Selection),
    /// Anything else.
    Text(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// List the caller's chains.
    MyChains,
    /// Show one chain; expects a single `id=...` or `slug=...` argument.
    ViewChain { args: Vec<String> },
    /// Enter the chain form.
    CreateChain,
    Cancel,
    Unknown { name: String },
}

/// Keyword selections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "field", rename_all = "snake_case")]
pub enum Selection {
    Chain(ChainField),
    Participant(ParticipantField),
    /// Delegate to the participant sub-form.
    Participants,
    Review,
    Done,
}

impl Selection {
    pub const PARTICIPANTS_KEYWORD: &'static str = "Participantes";
    pub const REVIEW_KEYWORD: &'static str = "Ver Info";
    pub const DONE_KEYWORD: &'static str = "Listo";

    pub fn from_keyword(text: &str) -> Option<Self> {
        if let Some(field) = ChainField::from_label(text) {
            return Some(Self::Chain(field));
        }
        if let Some(field) = ParticipantField::from_label(text) {
            return Some(Self::Participant(field));
        }
        match text {
            Self::PARTICIPANTS_KEYWORD => Some(Self::Participants),
            Self::REVIEW_KEYWORD => Some(Self::Review),
            Self::DONE_KEYWORD => Some(Self::Done),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Chain(f) => f.label(),
            Self::Participant(f) => f.label(),
            Self::Participants => Self::PARTICIPANTS_KEYWORD,
            Self::Review => Self::REVIEW_KEYWORD,
            Self::Done => Self::DONE_KEYWORD,
        }
    }
}

/// Answer to "add another participant?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryAnswer {
    Repeat,
    Stop,
}

impl RetryAnswer {
    /// Case-insensitive `si` / `no`.
    pub fn parse(text: &str) -> Option<Self> {
        match text.trim().to_lowercase().as_str() {
            "si" | "sí" => Some(Self::Repeat),
            "no" => Some(Self::Stop),
            _ => None,
        }
    }

    pub fn keyword(&self) -> &'static str {
        match self {
            Self::Repeat => "Si",
            Self::Stop => "No",
        }
    }
}

/// An input the current state will accept. The transport decides how to
/// present these (reply keyboard, inline buttons, plain text hint).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum ExpectedSignal {
    Select(Selection),
    Retry(RetryAnswer),
    /// Free text for the pending field.
    Value,
    Cancel,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_commands() {
        assert_eq!(SignalParser::parse("/start"), Signal::Command(Command::Start));
        assert_eq!(SignalParser::parse("/help"), Signal::Command(Command::Help));
        assert_eq!(SignalParser::parse("/mis_cadenas"), Signal::Command(Command::MyChains));
        assert_eq!(
            SignalParser::parse("/crear_cadena"),
            Signal::Command(Command::CreateChain)
        );
        assert_eq!(SignalParser::parse("/cancel"), Signal::Command(Command::Cancel));
    }

    #[test]
    fn parse_command_with_bot_suffix_and_args() {
        assert_eq!(
            SignalParser::parse("/ver_cadena@cadenas_bot slug=mi_cadena"),
            Signal::Command(Command::ViewChain {
                args: vec!["slug=mi_cadena".into()]
            })
        );
        assert_eq!(
            SignalParser::parse("/ver_cadena"),
            Signal::Command(Command::ViewChain { args: vec![] })
        );
    }

    #[test]
    fn parse_unknown_command() {
        assert_eq!(
            SignalParser::parse("/Foo bar"),
            Signal::Command(Command::Unknown { name: "foo".into() })
        );
    }

    #[test]
    fn parse_selections() {
        assert_eq!(
            SignalParser::parse("Titulo"),
            Signal::Select(Selection::Chain(ChainField::Title))
        );
        assert_eq!(
            SignalParser::parse("Mensaje de notificación"),
            Signal::Select(Selection::Chain(ChainField::NotificationMessage))
        );
        assert_eq!(
            SignalParser::parse("Puesto"),
            Signal::Select(Selection::Participant(ParticipantField::Role))
        );
        assert_eq!(SignalParser::parse("Participantes"), Signal::Select(Selection::Participants));
        assert_eq!(SignalParser::parse("Ver Info"), Signal::Select(Selection::Review));
        assert_eq!(SignalParser::parse("  Listo "), Signal::Select(Selection::Done));
    }

    #[test]
    fn near_miss_keywords_are_text() {
        assert_eq!(SignalParser::parse("titulo"), Signal::Text("titulo".into()));
        assert_eq!(SignalParser::parse("Listo!"), Signal::Text("Listo!".into()));
        assert_eq!(SignalParser::parse("Si"), Signal::Text("Si".into()));
    }

    #[test]
    fn keyword_roundtrip() {
        let selections = [
            Selection::Chain(ChainField::EndDate),
            Selection::Participant(ParticipantField::Number),
            Selection::Participants,
            Selection::Review,
            Selection::Done,
        ];
        for sel in selections {
            assert_eq!(Selection::from_keyword(sel.keyword()), Some(sel));
        }
    }

    #[test]
    fn retry_answers() {
        assert_eq!(RetryAnswer::parse("Si"), Some(RetryAnswer::Repeat));
        assert_eq!(RetryAnswer::parse("SI"), Some(RetryAnswer::Repeat));
        assert_eq!(RetryAnswer::parse("sí"), Some(RetryAnswer::Repeat));
        assert_eq!(RetryAnswer::parse("No"), Some(RetryAnswer::Stop));
        assert_eq!(RetryAnswer::parse("nope"), None);
        assert_eq!(RetryAnswer::parse(""), None);
    }
}
