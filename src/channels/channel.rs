//! Channel trait and the message types that flow through it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ChannelError;

/// Stream of incoming messages produced by `Channel::start`.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A message received from a channel.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    pub id: Uuid,
    /// Channel name ("telegram", "cli").
    pub channel: String,
    /// Stable sender identity (Telegram numeric user id).
    pub user_id: String,
    /// Display name, if the channel knows one.
    pub user_name: Option<String>,
    /// Key of the conversation this message belongs to (Telegram chat id).
    /// Form sessions are scoped to it.
    pub conversation_id: String,
    pub content: String,
    pub received_at: DateTime<Utc>,
    pub metadata: serde_json::Value,
}

impl IncomingMessage {
    pub fn new(channel: &str, user_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            channel: channel.to_string(),
            user_id: user_id.to_string(),
            user_name: None,
            conversation_id: user_id.to_string(),
            content: content.to_string(),
            received_at: Utc::now(),
            metadata: serde_json::Value::Null,
        }
    }

    pub fn with_user_name(mut self, name: &str) -> Self {
        self.user_name = Some(name.to_string());
        self
    }

    pub fn with_conversation(mut self, conversation_id: &str) -> Self {
        self.conversation_id = conversation_id.to_string();
        self
    }

    pub fn with_metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = metadata;
        self
    }

    /// Key for per-party state: the sender within its conversation. Two
    /// members of one group chat get different keys.
    pub fn session_key(&self) -> String {
        format!("{}:{}", self.conversation_id, self.user_id)
    }
}

/// Keyboard hint attached to a reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyboard {
    /// Show these buttons (one inner vec per row).
    Buttons { rows: Vec<Vec<String>>, one_time: bool },
    /// Hide any keyboard currently shown.
    Remove,
}

/// A reply to send back on the channel the message came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    /// Telegram-flavoured HTML.
    pub content: String,
    pub keyboard: Option<Keyboard>,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            keyboard: None,
        }
    }

    pub fn with_keyboard(mut self, keyboard: Keyboard) -> Self {
        self.keyboard = Some(keyboard);
        self
    }
}

/// A message transport.
#[async_trait]
pub trait Channel: Send + Sync {
    fn name(&self) -> &str;

    /// Start listening and return the stream of incoming messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a reply to the conversation `msg` came from.
    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError>;

    async fn health_check(&self) -> Result<(), ChannelError>;

    async fn shutdown(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversation_defaults_to_user() {
        let msg = IncomingMessage::new("cli", "local-user", "hola");
        assert_eq!(msg.conversation_id, "local-user");
        assert!(msg.user_name.is_none());

        let msg = msg.with_conversation("-100200").with_user_name("Ana");
        assert_eq!(msg.conversation_id, "-100200");
        assert_eq!(msg.user_name.as_deref(), Some("Ana"));
    }

    #[test]
    fn session_key_separates_members_of_a_chat() {
        let ana = IncomingMessage::new("telegram", "1", "hola").with_conversation("-100");
        let luis = IncomingMessage::new("telegram", "2", "hola").with_conversation("-100");
        assert_eq!(ana.session_key(), "-100:1");
        assert_ne!(ana.session_key(), luis.session_key());
    }

    #[test]
    fn response_builder() {
        let r = OutgoingResponse::text("hola").with_keyboard(Keyboard::Remove);
        assert_eq!(r.content, "hola");
        assert_eq!(r.keyboard, Some(Keyboard::Remove));
    }
}
