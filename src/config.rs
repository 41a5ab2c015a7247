//! Configuration types.

use std::time::Duration;

use secrecy::SecretString;

use crate::error::{ConfigError, Result};

/// Bot configuration, read from the environment (and `.env` via dotenvy in `main`).
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Base URI of the chain storage API.
    pub api_base_uri: String,
    /// Telegram bot token. `None` means run on the CLI channel.
    pub telegram_token: Option<SecretString>,
    /// Telegram usernames or numeric ids allowed to talk to the bot. `*` allows everyone.
    pub allowed_users: Vec<String>,
    /// Long-poll timeout passed to `getUpdates`.
    pub poll_timeout_secs: u64,
    /// Per-request timeout for the storage API.
    pub http_timeout: Duration,
    /// Unfinished forms untouched for this long are dropped.
    pub session_idle_timeout: Duration,
}

impl BotConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. `from_env` passes the process environment.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_base_uri = get("API_BASE_URI")
            .ok_or_else(|| ConfigError::MissingEnvVar("API_BASE_URI".to_string()))?;

        let telegram_token = get("TELEGRAM_BOT_TOKEN")
            .or_else(|| get("TELEGRAM_TOKEN"))
            .map(SecretString::from);

        let allowed_users: Vec<String> = get("TELEGRAM_ALLOWED_USERS")
            .unwrap_or_else(|| "*".to_string())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let poll_timeout_secs = parse_secs(get("CHAIN_BOT_POLL_TIMEOUT_SECS"), "CHAIN_BOT_POLL_TIMEOUT_SECS", 30)?;
        let http_timeout_secs = parse_secs(get("CHAIN_BOT_HTTP_TIMEOUT_SECS"), "CHAIN_BOT_HTTP_TIMEOUT_SECS", 15)?;
        let session_idle_secs = parse_secs(get("CHAIN_BOT_SESSION_IDLE_SECS"), "CHAIN_BOT_SESSION_IDLE_SECS", 3600)?;

        Ok(Self {
            api_base_uri,
            telegram_token,
            allowed_users,
            poll_timeout_secs,
            http_timeout: Duration::from_secs(http_timeout_secs),
            session_idle_timeout: Duration::from_secs(session_idle_secs),
        })
    }
}

fn parse_secs(raw: Option<String>, key: &str, default: u64) -> std::result::Result<u64, ConfigError> {
    match raw {
        None => Ok(default),
        Some(v) => v.trim().parse().map_err(|e| ConfigError::InvalidValue {
            key: key.to_string(),
            message: format!("{v:?} is not a number of seconds: {e}"),
        }),
    }
}
