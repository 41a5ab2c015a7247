//! Conversation router: maps each incoming message to a command or to the
//! chain form of the party that sent it.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::StreamExt;
use tokio::sync::Mutex;

use crate::api::ChainApi;
use crate::channels::{Channel, IncomingMessage, Keyboard, OutgoingResponse};
use crate::error::{Error, FormError};
use crate::form::{ChainForm, Command, ExpectedSignal, Reply, Signal, SignalParser};

use super::{commands, render};

/// What happened when a signal was routed to a party's form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Dispatch {
    /// The party has no active form.
    NoSession,
    Handled {
        outcome: Result<Reply, FormError>,
        /// Valid next signals after the call.
        expected: Vec<ExpectedSignal>,
    },
}

/// Idle sessions are checked this often.
const PRUNE_INTERVAL: Duration = Duration::from_secs(60);

/// A form plus when its party last touched it.
struct ActiveForm {
    form: ChainForm,
    last_active: Instant,
}

impl ActiveForm {
    fn new(form: ChainForm) -> Self {
        Self {
            form,
            last_active: Instant::now(),
        }
    }
}

/// Active chain forms, one per party (sender within a chat).
///
/// Finished and cancelled forms are dropped, so a later `/crear_cadena`
/// always starts from an empty session. Abandoned forms are dropped by
/// `prune_idle`.
#[derive(Default)]
pub struct SessionRegistry {
    forms: Mutex<HashMap<String, ActiveForm>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a form for `key`. Returns `None` if one is already running.
    pub async fn begin(&self, key: &str) -> Option<Vec<ExpectedSignal>> {
        let mut forms = self.forms.lock().await;
        if forms.contains_key(key) {
            return None;
        }
        let form = ChainForm::begin();
        let expected = form.expected_signals();
        forms.insert(key.to_string(), ActiveForm::new(form));
        tracing::info!(session = %key, "Chain form started");
        Some(expected)
    }

    /// Feed a signal to the form of `key`, if any.
    pub async fn dispatch(&self, key: &str, signal: Signal) -> Dispatch {
        let mut forms = self.forms.lock().await;
        let Some(entry) = forms.get_mut(key) else {
            return Dispatch::NoSession;
        };
        entry.last_active = Instant::now();
        let form = &mut entry.form;

        let before = form.state().to_string();
        let outcome = form.handle(signal);
        let expected = form.expected_signals();
        tracing::debug!(session = %key, from = %before, to = %form.state(), "Form transition");

        if form.is_terminal() {
            tracing::info!(session = %key, state = %form.state(), "Chain form closed");
            forms.remove(key);
        }
        Dispatch::Handled { outcome, expected }
    }

    /// Expected signals for the form of `key`, if one is active.
    pub async fn expected(&self, key: &str) -> Option<Vec<ExpectedSignal>> {
        self.forms
            .lock()
            .await
            .get(key)
            .map(|entry| entry.form.expected_signals())
    }

    /// Drop forms untouched for at least `max_idle`. Returns how many went.
    pub async fn prune_idle(&self, max_idle: Duration) -> usize {
        let mut forms = self.forms.lock().await;
        let before = forms.len();
        forms.retain(|key, entry| {
            let keep = entry.last_active.elapsed() < max_idle;
            if !keep {
                tracing::info!(session = %key, state = %entry.form.state(), "Dropping idle chain form");
            }
            keep
        });
        before - forms.len()
    }

    pub async fn is_active(&self, key: &str) -> bool {
        self.forms.lock().await.contains_key(key)
    }

    pub async fn len(&self) -> usize {
        self.forms.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.forms.lock().await.is_empty()
    }
}

/// The bot: commands plus per-party chain forms.
pub struct Bot {
    api: Arc<dyn ChainApi>,
    sessions: Arc<SessionRegistry>,
    session_idle_timeout: Duration,
}

impl Bot {
    pub fn new(api: Arc<dyn ChainApi>, session_idle_timeout: Duration) -> Self {
        Self {
            api,
            sessions: Arc::new(SessionRegistry::new()),
            session_idle_timeout,
        }
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    /// Run until the channel stream ends or Ctrl+C.
    pub async fn run(&self, channel: Arc<dyn Channel>) -> Result<(), Error> {
        channel.health_check().await?;
        let mut stream = channel.start().await?;

        // Spawn idle session pruning
        let sessions = Arc::clone(&self.sessions);
        let idle_timeout = self.session_idle_timeout;
        let pruning_handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(PRUNE_INTERVAL);
            interval.tick().await; // Skip immediate first tick
            loop {
                interval.tick().await;
                let pruned = sessions.prune_idle(idle_timeout).await;
                if pruned > 0 {
                    tracing::debug!(pruned, "Pruned idle chain forms");
                }
            }
        });

        tracing::info!(channel = channel.name(), "Chain bot ready and listening");

        loop {
            let message = tokio::select! {
                biased;
                _ = tokio::signal::ctrl_c() => {
                    tracing::info!("Ctrl+C received, shutting down...");
                    break;
                }
                msg = stream.next() => {
                    match msg {
                        Some(m) => m,
                        None => {
                            tracing::info!("Channel stream ended, shutting down...");
                            break;
                        }
                    }
                }
            };

            for response in self.handle_message(&message).await {
                if let Err(e) = channel.respond(&message, response).await {
                    tracing::error!(chat_id = %message.conversation_id, error = %e, "Failed to send reply");
                }
            }
        }

        pruning_handle.abort();
        channel.shutdown().await?;
        Ok(())
    }

    /// Everything to send back for one incoming message, in order.
    pub async fn handle_message(&self, message: &IncomingMessage) -> Vec<OutgoingResponse> {
        let key = message.session_key();
        let key = key.as_str();
        let signal = SignalParser::parse(&message.content);

        tracing::debug!(
            session = %key,
            user_id = %message.user_id,
            chars = message.content.len(),
            "Received message"
        );

        match signal {
            Signal::Command(Command::Start) => {
                let name = message.user_name.as_deref().unwrap_or(&message.user_id);
                vec![commands::start(name)]
            }
            Signal::Command(Command::Help) => vec![commands::help()],
            Signal::Command(Command::MyChains) => {
                vec![commands::my_chains(self.api.as_ref(), &message.user_id).await]
            }
            Signal::Command(Command::ViewChain { args }) => {
                vec![commands::view_chain(self.api.as_ref(), &args).await]
            }
            Signal::Command(Command::Unknown { name }) => {
                tracing::debug!(session = %key, command = %name, "Unknown command");
                vec![OutgoingResponse::text(format!(
                    "No conozco el comando /{}.\n\n{}",
                    render::escape_html(&name),
                    render::HELP_TEXT
                ))]
            }
            Signal::Command(Command::CreateChain) => match self.sessions.begin(key).await {
                Some(expected) => render::render_reply(&Reply::Started, &expected),
                None => {
                    let expected = self.sessions.expected(key).await.unwrap_or_default();
                    vec![
                        OutgoingResponse::text(
                            "Ya tienes una cadena en curso. Usa /cancel para descartarla.",
                        )
                        .with_keyboard(render::keyboard_for(&expected)),
                    ]
                }
            },
            signal => self.route_to_form(key, signal).await,
        }
    }

    async fn route_to_form(&self, key: &str, signal: Signal) -> Vec<OutgoingResponse> {
        let is_cancel = matches!(signal, Signal::Command(Command::Cancel));

        match self.sessions.dispatch(key, signal).await {
            Dispatch::NoSession if is_cancel => vec![
                OutgoingResponse::text("No hay ninguna cadena en curso.")
                    .with_keyboard(Keyboard::Remove),
            ],
            // Chatter outside a form is not ours to answer.
            Dispatch::NoSession => Vec::new(),
            Dispatch::Handled {
                outcome: Ok(reply),
                expected,
            } => render::render_reply(&reply, &expected),
            Dispatch::Handled {
                outcome: Err(err),
                expected,
            } => {
                tracing::debug!(session = %key, error = %err, "Form rejected input");
                vec![render::render_form_error(&err, &expected)]
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;

    use super::*;
    use crate::api::{ChainKey, ChainLookup, ChainSummary};
    use crate::error::ApiError;

    struct EmptyApi;

    #[async_trait]
    impl ChainApi for EmptyApi {
        async fn fetch_by_author(&self, _author_id: &str) -> Result<Vec<ChainSummary>, ApiError> {
            Ok(Vec::new())
        }

        async fn fetch_by_id_or_slug(&self, key: &ChainKey) -> Result<ChainLookup, ApiError> {
            Ok(ChainLookup::Missing(format!("no chain {key}")))
        }
    }

    fn bot() -> Bot {
        Bot::new(Arc::new(EmptyApi), Duration::from_secs(3600))
    }

    fn msg(chat: &str, text: &str) -> IncomingMessage {
        IncomingMessage::new("test", "7", text).with_conversation(chat)
    }

    async fn send(bot: &Bot, chat: &str, text: &str) -> Vec<OutgoingResponse> {
        bot.handle_message(&msg(chat, text)).await
    }

    #[tokio::test]
    async fn create_chain_opens_form_with_keyboard() {
        let bot = bot();
        let out = send(&bot, "1", "/crear_cadena").await;
        assert_eq!(out.len(), 1);
        assert!(out[0].content.starts_with("Para crear una cadena"));
        assert!(matches!(out[0].keyboard, Some(Keyboard::Buttons { .. })));
        assert!(bot.sessions().is_active("1:7").await);
    }

    #[tokio::test]
    async fn second_create_keeps_current_form() {
        let bot = bot();
        send(&bot, "1", "/crear_cadena").await;
        send(&bot, "1", "Titulo").await;
        send(&bot, "1", "Guardias").await;

        let out = send(&bot, "1", "/crear_cadena").await;
        assert!(out[0].content.starts_with("Ya tienes una cadena en curso"));

        let out = send(&bot, "1", "Ver Info").await;
        assert!(out[0].content.contains("Guardias"));
    }

    #[tokio::test]
    async fn members_of_one_chat_keep_separate_forms() {
        let bot = bot();
        let from = |user: &str, text: &str| {
            IncomingMessage::new("test", user, text).with_conversation("-100")
        };

        bot.handle_message(&from("ana", "/crear_cadena")).await;
        bot.handle_message(&from("ana", "Titulo")).await;

        let out = bot.handle_message(&from("luis", "/crear_cadena")).await;
        assert!(out[0].content.starts_with("Para crear una cadena"));
        bot.handle_message(&from("luis", "Titulo")).await;
        bot.handle_message(&from("luis", "Texto de Luis")).await;
        bot.handle_message(&from("ana", "Guardias de Ana")).await;

        let ana = bot.handle_message(&from("ana", "Ver Info")).await;
        assert!(ana[0].content.contains("<b>Titulo</b> - Guardias de Ana"));
        assert!(!ana[0].content.contains("Texto de Luis"));

        let luis = bot.handle_message(&from("luis", "Ver Info")).await;
        assert!(luis[0].content.contains("<b>Titulo</b> - Texto de Luis"));
        assert_eq!(bot.sessions().len().await, 2);
    }

    #[tokio::test]
    async fn sessions_are_isolated_per_chat() {
        let bot = bot();
        send(&bot, "a", "/crear_cadena").await;
        send(&bot, "b", "/crear_cadena").await;
        send(&bot, "a", "Titulo").await;
        send(&bot, "a", "Solo en A").await;

        let out = send(&bot, "b", "Ver Info").await;
        assert!(!out[0].content.contains("Solo en A"));
        assert_eq!(bot.sessions().len().await, 2);
    }

    #[tokio::test]
    async fn cancel_drops_session() {
        let bot = bot();
        send(&bot, "1", "/crear_cadena").await;
        let out = send(&bot, "1", "/cancel").await;
        assert_eq!(out[0].content, "La creación de cadena ha sido cancelada.");
        assert_eq!(out[0].keyboard, Some(Keyboard::Remove));
        assert!(bot.sessions().is_empty().await);

        let out = send(&bot, "1", "/cancel").await;
        assert_eq!(out[0].content, "No hay ninguna cadena en curso.");
    }

    #[tokio::test]
    async fn text_outside_form_is_silent() {
        let bot = bot();
        assert!(send(&bot, "1", "hola").await.is_empty());
        assert!(send(&bot, "1", "Titulo").await.is_empty());
    }

    #[tokio::test]
    async fn ignored_input_sends_nothing() {
        let bot = bot();
        send(&bot, "1", "/crear_cadena").await;
        assert!(send(&bot, "1", "cualquier cosa").await.is_empty());
    }

    #[tokio::test]
    async fn invalid_participant_input_reoffers_keyboard() {
        let bot = bot();
        send(&bot, "1", "/crear_cadena").await;
        send(&bot, "1", "Participantes").await;
        let out = send(&bot, "1", "Listo").await;
        assert_eq!(out.len(), 1);
        let Some(Keyboard::Buttons { rows, .. }) = &out[0].keyboard else {
            panic!("expected participant keyboard");
        };
        assert_eq!(rows[0], vec!["Nombre".to_string()]);
    }

    #[tokio::test]
    async fn dispatch_reports_transitions() {
        let registry = SessionRegistry::new();
        assert_eq!(
            registry.dispatch("x", Signal::Text("hola".into())).await,
            Dispatch::NoSession
        );
        registry.begin("x").await;
        let Dispatch::Handled { outcome, expected } = registry
            .dispatch("x", SignalParser::parse("Titulo"))
            .await
        else {
            panic!("session should exist");
        };
        assert!(matches!(outcome, Ok(Reply::PromptChain(_))));
        assert_eq!(expected.first(), Some(&ExpectedSignal::Value));
        assert!(registry.begin("x").await.is_none());
    }

    #[tokio::test]
    async fn prune_idle_drops_only_stale_forms() {
        let registry = SessionRegistry::new();
        registry.begin("a:1").await;
        registry.begin("b:2").await;

        assert_eq!(registry.prune_idle(Duration::from_secs(3600)).await, 0);
        assert_eq!(registry.len().await, 2);

        assert_eq!(registry.prune_idle(Duration::ZERO).await, 2);
        assert!(registry.is_empty().await);
        assert_eq!(
            registry.dispatch("a:1", SignalParser::parse("Titulo")).await,
            Dispatch::NoSession
        );
    }

    #[tokio::test]
    async fn start_uses_display_name() {
        let bot = bot();
        let message = msg("1", "/start").with_user_name("Ana");
        let out = bot.handle_message(&message).await;
        assert!(out[0].content.contains("<b>Ana</b>"));
    }

    #[tokio::test]
    async fn unknown_command_lists_help() {
        let bot = bot();
        let out = send(&bot, "1", "/foo").await;
        assert!(out[0].content.starts_with("No conozco el comando /foo."));
    }
}
