//! Telegram channel: long-polls the Bot API for updates.
//!
//! Talks to the Bot API directly over reqwest: `getUpdates` for input,
//! `sendMessage` (HTML, with reply keyboards) for output.

use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};

use crate::channels::{Channel, IncomingMessage, Keyboard, MessageStream, OutgoingResponse};
use crate::error::ChannelError;

/// Maximum message length for Telegram's sendMessage API.
const TELEGRAM_MAX_MESSAGE_LENGTH: usize = 4096;

/// Back-off after a failed poll.
const POLL_RETRY_DELAY: Duration = Duration::from_secs(5);

/// Telegram channel: connects to the Bot API via long-polling.
pub struct TelegramChannel {
    bot_token: SecretString,
    allowed_users: Vec<String>,
    poll_timeout_secs: u64,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(bot_token: SecretString, allowed_users: Vec<String>, poll_timeout_secs: u64) -> Self {
        Self {
            bot_token,
            allowed_users,
            poll_timeout_secs,
            client: reqwest::Client::new(),
        }
    }

    fn api_url(&self, method: &str) -> String {
        format!(
            "https://api.telegram.org/bot{}/{method}",
            self.bot_token.expose_secret()
        )
    }

    /// Check if a username is in the allowed list.
    pub fn is_user_allowed(&self, username: &str) -> bool {
        check_user_allowed(&self.allowed_users, [username])
    }

    /// Check if any of the provided identities is allowed.
    pub fn is_any_user_allowed<'a, I>(&self, identities: I) -> bool
    where
        I: IntoIterator<Item = &'a str>,
    {
        check_user_allowed(&self.allowed_users, identities)
    }

    /// Send a reply, splitting past Telegram's 4096 char limit. The keyboard
    /// goes on the last chunk so it stays attached to the latest message.
    async fn send_message(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        let chunks = split_message(text, TELEGRAM_MAX_MESSAGE_LENGTH);
        let last = chunks.len().saturating_sub(1);

        for (i, chunk) in chunks.iter().enumerate() {
            let markup = if i == last { keyboard } else { None };
            self.send_message_chunk(chat_id, chunk, markup).await?;
        }
        Ok(())
    }

    /// Send a single chunk, HTML first with a plain-text fallback.
    async fn send_message_chunk(
        &self,
        chat_id: &str,
        text: &str,
        keyboard: Option<&Keyboard>,
    ) -> Result<(), ChannelError> {
        let mut html_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
            "parse_mode": "HTML"
        });
        if let Some(kb) = keyboard {
            html_body["reply_markup"] = reply_markup(kb);
        }

        let html_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&html_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if html_resp.status().is_success() {
            return Ok(());
        }

        let html_status = html_resp.status();
        let _html_err = html_resp.text().await.unwrap_or_default();
        tracing::warn!(
            status = ?html_status,
            "Telegram sendMessage with HTML failed; retrying without parse_mode"
        );

        let mut plain_body = serde_json::json!({
            "chat_id": chat_id,
            "text": text,
        });
        if let Some(kb) = keyboard {
            plain_body["reply_markup"] = reply_markup(kb);
        }
        let plain_resp = self
            .client
            .post(self.api_url("sendMessage"))
            .json(&plain_body)
            .send()
            .await
            .map_err(|e| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if !plain_resp.status().is_success() {
            let plain_err = plain_resp.text().await.unwrap_or_default();
            return Err(ChannelError::SendFailed {
                name: "telegram".into(),
                reason: format!(
                    "sendMessage failed (html: {}, plain: {})",
                    html_status, plain_err
                ),
            });
        }

        Ok(())
    }
}

// ── Channel trait implementation ────────────────────────────────────

#[async_trait]
impl Channel for TelegramChannel {
    fn name(&self) -> &str {
        "telegram"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
        let updates_url = self.api_url("getUpdates");
        let allowed_users = self.allowed_users.clone();
        let client = self.client.clone();
        let poll_timeout = self.poll_timeout_secs;

        tokio::spawn(async move {
            let mut offset: i64 = 0;

            tracing::info!("Telegram channel listening for messages...");

            loop {
                let body = serde_json::json!({
                    "offset": offset,
                    "timeout": poll_timeout,
                    "allowed_updates": ["message"]
                });

                let resp = match client
                    .post(&updates_url)
                    .json(&body)
                    .timeout(Duration::from_secs(poll_timeout + 10))
                    .send()
                    .await
                {
                    Ok(r) => r,
                    Err(e) => {
                        tracing::warn!("Telegram poll error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let status = resp.status();
                let data: serde_json::Value = match resp.json().await {
                    Ok(d) => d,
                    Err(e) => {
                        tracing::warn!(status = %status, "Telegram parse error: {e}");
                        tokio::time::sleep(POLL_RETRY_DELAY).await;
                        continue;
                    }
                };

                let results = match update_results(status, &data) {
                    Ok(results) => results,
                    Err(failure) => {
                        tracing::warn!(
                            retry_in = ?failure.retry_after,
                            "Telegram getUpdates failed: {}",
                            failure.reason
                        );
                        tokio::time::sleep(failure.retry_after).await;
                        continue;
                    }
                };

                for update in results {
                    // Advance offset past this update
                    if let Some(uid) = update.get("update_id").and_then(serde_json::Value::as_i64)
                    {
                        offset = uid + 1;
                    }

                    let Some(incoming) = parse_update(update, &allowed_users) else {
                        continue;
                    };

                    if tx.send(incoming).is_err() {
                        tracing::info!("Telegram listener channel closed");
                        return;
                    }
                }
            }
        });

        let stream = futures::stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|msg| (msg, rx))
        });

        Ok(Box::pin(stream))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        let chat_id = msg
            .metadata
            .get("chat_id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| ChannelError::SendFailed {
                name: "telegram".into(),
                reason: "No chat_id in message metadata".into(),
            })?;

        self.send_message(chat_id, &response.content, response.keyboard.as_ref())
            .await
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        let resp = self
            .client
            .get(self.api_url("getMe"))
            .send()
            .await
            .map_err(|e| ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: e.to_string(),
            })?;

        if resp.status().is_success() {
            Ok(())
        } else {
            Err(ChannelError::StartupFailed {
                name: "telegram".into(),
                reason: format!("getMe returned {}", resp.status()),
            })
        }
    }

    async fn shutdown(&self) -> Result<(), ChannelError> {
        tracing::info!("Telegram channel shutting down");
        Ok(())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────

/// Turn one `getUpdates` entry into an `IncomingMessage`.
///
/// Returns `None` for non-text updates and for senders outside the allowlist.
fn parse_update(update: &serde_json::Value, allowed_users: &[String]) -> Option<IncomingMessage> {
    let message = update.get("message")?;
    let text = message.get("text").and_then(serde_json::Value::as_str)?;

    let from = message.get("from");
    let username = from
        .and_then(|f| f.get("username"))
        .and_then(|u| u.as_str())
        .unwrap_or("unknown");
    let user_id = from
        .and_then(|f| f.get("id"))
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string());

    // Check allowlist against both username and numeric ID
    let mut identities = vec![username];
    if let Some(ref id) = user_id {
        identities.push(id.as_str());
    }
    if !check_user_allowed(allowed_users, identities) {
        tracing::warn!(
            "Telegram: ignoring message from unauthorized user: \
             username={username}, user_id={}",
            user_id.as_deref().unwrap_or("unknown")
        );
        return None;
    }

    let chat_id = message
        .get("chat")
        .and_then(|c| c.get("id"))
        .and_then(serde_json::Value::as_i64)
        .map(|id| id.to_string())
        .unwrap_or_default();

    let first_name = from
        .and_then(|f| f.get("first_name"))
        .and_then(|n| n.as_str())
        .unwrap_or(username);

    let sender = user_id.as_deref().unwrap_or(username);
    let conversation = if chat_id.is_empty() { sender } else { chat_id.as_str() };

    Some(
        IncomingMessage::new("telegram", sender, text)
            .with_user_name(first_name)
            .with_conversation(conversation)
            .with_metadata(serde_json::json!({
                "chat_id": chat_id,
                "username": username,
            })),
    )
}

/// Why a `getUpdates` answer carried no updates, and how long to wait.
#[derive(Debug, PartialEq, Eq)]
struct PollFailure {
    reason: String,
    retry_after: Duration,
}

/// The `result` array of a `getUpdates` answer.
///
/// Non-2xx statuses and `"ok": false` bodies (409 from a competing poller or
/// webhook, 429 flood control, 5xx) are failures. A 429's
/// `parameters.retry_after` overrides the default back-off.
fn update_results(
    status: reqwest::StatusCode,
    data: &serde_json::Value,
) -> Result<&[serde_json::Value], PollFailure> {
    let ok = data.get("ok").and_then(serde_json::Value::as_bool) == Some(true);
    if !status.is_success() || !ok {
        let description = data
            .get("description")
            .and_then(serde_json::Value::as_str)
            .unwrap_or("no description");
        let retry_after = data
            .get("parameters")
            .and_then(|p| p.get("retry_after"))
            .and_then(serde_json::Value::as_u64)
            .map(Duration::from_secs)
            .unwrap_or(POLL_RETRY_DELAY);
        return Err(PollFailure {
            reason: format!("status {status}: {description}"),
            retry_after,
        });
    }

    data.get("result")
        .and_then(serde_json::Value::as_array)
        .map(Vec::as_slice)
        .ok_or_else(|| PollFailure {
            reason: "response has no result array".to_string(),
            retry_after: POLL_RETRY_DELAY,
        })
}

/// Telegram `reply_markup` for a keyboard hint.
fn reply_markup(keyboard: &Keyboard) -> serde_json::Value {
    match keyboard {
        Keyboard::Buttons { rows, one_time } => {
            let rows: Vec<Vec<serde_json::Value>> = rows
                .iter()
                .map(|row| {
                    row.iter()
                        .map(|label| serde_json::json!({ "text": label }))
                        .collect()
                })
                .collect();
            serde_json::json!({
                "keyboard": rows,
                "one_time_keyboard": one_time,
                "resize_keyboard": true,
            })
        }
        Keyboard::Remove => serde_json::json!({ "remove_keyboard": true }),
    }
}

/// Check if any identity in the iterator matches the allowed users list.
fn check_user_allowed<'a>(
    allowed_users: &[String],
    identities: impl IntoIterator<Item = &'a str>,
) -> bool {
    let ids: Vec<&str> = identities.into_iter().collect();
    allowed_users
        .iter()
        .any(|u| u == "*" || ids.contains(&u.as_str()))
}

/// Split a message into chunks that fit Telegram's character limit.
///
/// Prefers a line break, then a space, then a hard cut on a char boundary.
/// Only the separator itself is dropped, so indentation at the start of the
/// next line survives. A split never lands inside an HTML tag.
fn split_message(text: &str, max_len: usize) -> Vec<String> {
    if text.len() <= max_len {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut remaining = text;

    while !remaining.is_empty() {
        if remaining.len() <= max_len {
            chunks.push(remaining.to_string());
            break;
        }

        let mut cut = max_len;
        while !remaining.is_char_boundary(cut) {
            cut -= 1;
        }
        let window = &remaining[..cut];

        // (end of this chunk, start of the next)
        let (end, next) = match window.rfind('\n').or_else(|| window.rfind(' ')) {
            Some(at) if at > 0 => (at, at + 1),
            _ => {
                let at = outside_tag(window, cut);
                (at, at)
            }
        };

        chunks.push(remaining[..end].to_string());
        remaining = &remaining[next..];
    }

    chunks
}

/// Move a hard cut back to the start of a tag it would otherwise split.
fn outside_tag(window: &str, cut: usize) -> usize {
    match (window.rfind('<'), window.rfind('>')) {
        (Some(open), close) if open > 0 && close.is_none_or(|c| c < open) => open,
        _ => cut,
    }
}

// ── Tests ───────────────────────────────────────────────────────────
