use std::sync::Arc;

use anyhow::Context;

use chain_bot::api::HttpChainApi;
use chain_bot::bot::Bot;
use chain_bot::channels::{Channel, CliChannel, TelegramChannel};
use chain_bot::config::BotConfig;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine; real environment variables still apply.
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().context("loading configuration")?;

    eprintln!("⛓️  Chain bot v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   API: {}", config.api_base_uri);

    let api = Arc::new(HttpChainApi::new(
        config.api_base_uri.clone(),
        config.http_timeout,
    ));

    let channel: Arc<dyn Channel> = match config.telegram_token.clone() {
        Some(token) => {
            eprintln!(
                "   Telegram: enabled (allowed: {})",
                if config.allowed_users.iter().any(|u| u == "*") {
                    "everyone".to_string()
                } else {
                    config.allowed_users.join(", ")
                }
            );
            Arc::new(TelegramChannel::new(
                token,
                config.allowed_users.clone(),
                config.poll_timeout_secs,
            ))
        }
        None => {
            eprintln!("   Telegram: disabled (no TELEGRAM_BOT_TOKEN), using the CLI");
            eprintln!("   Type /crear_cadena to start.\n");
            Arc::new(CliChannel::default())
        }
    };

    Bot::new(api, config.session_idle_timeout)
        .run(channel)
        .await
        .context("running the bot")?;

    Ok(())
}
