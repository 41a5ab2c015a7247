//! End-to-end tests for the chain bot.
//!
//! Each test spins up an Axum stub of the chain storage API on a random port,
//! points the real HTTP client at it, and drives the bot through a scripted
//! channel.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::extract::Path;
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use futures::stream;
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::time::timeout;

use chain_bot::api::{ChainApi, ChainKey, ChainLookup, HttpChainApi};
use chain_bot::bot::Bot;
use chain_bot::channels::{
    Channel, IncomingMessage, Keyboard, MessageStream, OutgoingResponse,
};
use chain_bot::error::{ApiError, ChannelError};

/// Maximum time any test is allowed to run before we consider it hung.
const TEST_TIMEOUT: Duration = Duration::from_secs(5);

async fn chains_by_author(Path(author): Path<String>) -> Response {
    match author.as_str() {
        "42" => (
            StatusCode::OK,
            Json(json!([
                {"_id": {"$oid": "65a1b2c3d4e5f60718293a4b"}, "slug": "guardias_ab12", "titulo": "Guardias"},
                {"_id": "plain-id", "slug": "cierre_cd34", "titulo": "Cierre"}
            ])),
        )
            .into_response(),
        "500" => (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({"error": "boom"})),
        )
            .into_response(),
        "502" => (
            StatusCode::BAD_GATEWAY,
            Html("<html><body>Bad Gateway</body></html>"),
        )
            .into_response(),
        _ => (StatusCode::OK, Json(json!([]))).into_response(),
    }
}

async fn chain_by_key(Path(key): Path<String>) -> (StatusCode, Json<Value>) {
    if key == "guardias_ab12" || key == "65a1b2c3d4e5f60718293a4b" {
        return (
            StatusCode::OK,
            Json(json!({
                "_id": {"$oid": "65a1b2c3d4e5f60718293a4b"},
                "slug": "guardias_ab12",
                "titulo": "Guardias",
                "autor": {"nombre": "Ana"},
                "fecha_inicio": {"$date": "2024-03-01T00:00:00Z"},
                "fecha_fin": {"$date": {"$numberLong": "1719792000000"}},
                "dia_aviso": 2,
                "mensaje": "Te toca guardia",
                "participantes": [
                    {"nombre": "Luis", "puesto": "Dev", "numero": "5550001"}
                ]
            })),
        );
    }
    (
        StatusCode::NOT_FOUND,
        Json(json!({"error": format!("No existe la cadena {key}")})),
    )
}

/// Start the stub API on a random port and return its base URI.
async fn start_stub_api() -> String {
    let app = Router::new()
        .route("/cadenas/autor/{author}", get(chains_by_author))
        .route("/cadenas/{key}", get(chain_by_key));

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    format!("http://127.0.0.1:{port}")
}

async fn http_api() -> HttpChainApi {
    HttpChainApi::new(start_stub_api().await, Duration::from_secs(2))
}

/// Channel that replays a fixed script and records every reply.
struct ScriptedChannel {
    script: Vec<IncomingMessage>,
    sent: Mutex<Vec<(String, OutgoingResponse)>>,
}

impl ScriptedChannel {
    fn new(chat: &str, lines: &[&str]) -> Self {
        let script = lines
            .iter()
            .map(|line| {
                IncomingMessage::new("scripted", "42", line)
                    .with_user_name("Ana")
                    .with_conversation(chat)
            })
            .collect();
        Self {
            script,
            sent: Mutex::new(Vec::new()),
        }
    }

    fn replies(&self) -> Vec<(String, OutgoingResponse)> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for ScriptedChannel {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn start(&self) -> Result<MessageStream, ChannelError> {
        Ok(Box::pin(stream::iter(self.script.clone())))
    }

    async fn respond(
        &self,
        msg: &IncomingMessage,
        response: OutgoingResponse,
    ) -> Result<(), ChannelError> {
        self.sent
            .lock()
            .unwrap()
            .push((msg.content.clone(), response));
        Ok(())
    }

    async fn health_check(&self) -> Result<(), ChannelError> {
        Ok(())
    }
}

async fn run_script(lines: &[&str]) -> Vec<(String, OutgoingResponse)> {
    let bot = Bot::new(Arc::new(http_api().await), Duration::from_secs(3600));
    let channel = Arc::new(ScriptedChannel::new("chat-1", lines));
    timeout(TEST_TIMEOUT, bot.run(channel.clone()))
        .await
        .expect("bot run timed out")
        .expect("bot run failed");
    channel.replies()
}

fn replies_to<'a>(replies: &'a [(String, OutgoingResponse)], input: &str) -> Vec<&'a OutgoingResponse> {
    replies
        .iter()
        .filter(|(sent, _)| sent == input)
        .map(|(_, r)| r)
        .collect()
}

// ── HTTP client against the stub ────────────────────────────────────

#[tokio::test]
async fn client_lists_chains_by_author() {
    let api = http_api().await;
    let chains = api.fetch_by_author("42").await.unwrap();
    assert_eq!(chains.len(), 2);
    assert_eq!(chains[0].id, "65a1b2c3d4e5f60718293a4b");
    assert_eq!(chains[1].id, "plain-id");
    assert_eq!(chains[1].title, "Cierre");

    assert!(api.fetch_by_author("7").await.unwrap().is_empty());
}

#[tokio::test]
async fn client_reports_non_ok_listing() {
    let api = http_api().await;
    let err = api.fetch_by_author("500").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 500, .. }), "got {err:?}");
}

#[tokio::test]
async fn client_reports_status_for_html_error_page() {
    let api = http_api().await;
    let err = api.fetch_by_author("502").await.unwrap_err();
    assert!(matches!(err, ApiError::Status { status: 502, .. }), "got {err:?}");
}

#[tokio::test]
async fn client_fetches_chain_detail() {
    let api = http_api().await;
    let lookup = api
        .fetch_by_id_or_slug(&ChainKey::Slug("guardias_ab12".into()))
        .await
        .unwrap();
    let ChainLookup::Found(chain) = lookup else {
        panic!("expected a chain, got {lookup:?}");
    };
    assert_eq!(chain.author.name, "Ana");
    assert_eq!(chain.start_date.to_string(), "2024-03-01");
    assert_eq!(chain.end_date.to_string(), "2024-07-01");
    assert_eq!(chain.warning_days, "2");
    assert_eq!(chain.participants[0].name, "Luis");
}

#[tokio::test]
async fn client_maps_error_body_to_missing() {
    let api = http_api().await;
    let lookup = api
        .fetch_by_id_or_slug(&ChainKey::Id("nope".into()))
        .await
        .unwrap();
    assert_eq!(lookup, ChainLookup::Missing("No existe la cadena nope".into()));
}

// ── Bot end to end ──────────────────────────────────────────────────

#[tokio::test]
async fn full_chain_creation_dialogue() {
    let replies = run_script(&[
        "/start",
        "/crear_cadena",
        "Titulo",
        "Guardias",
        "Mensaje de notificación",
        "Te toca guardia",
        "Fecha de inicio",
        "2024-03-01",
        "Fecha de fin",
        "2024-07-01",
        "dias de aviso",
        "2",
        "Periodicidad",
        "semanal",
        "Participantes",
        "Nombre",
        "Luis",
        "Puesto",
        "Dev",
        "Numero",
        "5550001",
        "Si",
        "Nombre",
        "Marta",
        "Numero",
        "5550002",
        "Puesto",
        "QA",
        "No",
        "Ver Info",
        "Listo",
    ])
    .await;

    let start = replies_to(&replies, "/start");
    assert!(start[0].content.starts_with("Hola <b>Ana</b>!"));

    let created = replies_to(&replies, "/crear_cadena");
    let Some(Keyboard::Buttons { rows, .. }) = &created[0].keyboard else {
        panic!("expected chain keyboard");
    };
    assert_eq!(rows.len(), 6);

    let stored = replies_to(&replies, "Guardias");
    assert!(stored[0].content.contains("<b>Titulo</b> - Guardias"));

    let after_first = replies_to(&replies, "5550001");
    assert_eq!(after_first.len(), 2);
    assert_eq!(after_first[1].content, "¿Quieres crear otro participante?");

    let incomplete = replies_to(&replies, "Marta");
    assert_eq!(
        incomplete[0].content,
        "Por favor diligencia los campos: Numero, Puesto"
    );

    let stop = replies_to(&replies, "No");
    assert!(stop[0].content.contains("Participantes registrados: 2"));

    let review = replies_to(&replies, "Ver Info");
    assert!(review[0].content.contains("<b>Luis</b>"));
    assert!(review[0].content.contains("<b>Marta</b>"));

    let done = replies_to(&replies, "Listo");
    assert!(done[0].content.starts_with("¡Listo! Esta es tu cadena:"));
    assert!(done[0].content.contains("<b>Periodicidad</b> - semanal"));
    assert_eq!(done[0].keyboard, Some(Keyboard::Remove));
}

#[tokio::test]
async fn finish_with_missing_fields_keeps_form_open() {
    let replies = run_script(&["/crear_cadena", "Titulo", "Guardias", "Listo", "Ver Info"]).await;

    let done = replies_to(&replies, "Listo");
    assert!(done[0].content.starts_with("Aún faltan los campos:"));
    assert!(done[0].content.contains("Mensaje de notificación"));
    assert!(!done[0].content.contains("Titulo"));

    // Still in the form: review answers with what was stored.
    let review = replies_to(&replies, "Ver Info");
    assert!(review[0].content.contains("Guardias"));
}

#[tokio::test]
async fn cancel_then_restart_is_empty() {
    let replies = run_script(&[
        "/crear_cadena",
        "Titulo",
        "Borrador",
        "/cancel",
        "/crear_cadena",
        "Ver Info",
    ])
    .await;

    let cancelled = replies_to(&replies, "/cancel");
    assert_eq!(cancelled[0].content, "La creación de cadena ha sido cancelada.");

    let review = replies_to(&replies, "Ver Info");
    assert!(!review[0].content.contains("Borrador"));
}

#[tokio::test]
async fn lookup_commands_use_the_api() {
    let replies = run_script(&[
        "/mis_cadenas",
        "/ver_cadena slug=guardias_ab12",
        "/ver_cadena id=nope",
        "/ver_cadena",
    ])
    .await;

    let mine = replies_to(&replies, "/mis_cadenas");
    assert!(mine[0].content.contains("<b><u>Guardias</u></b>"));
    assert!(mine[0].content.contains("id: 65a1b2c3d4e5f60718293a4b"));

    let found = replies_to(&replies, "/ver_cadena slug=guardias_ab12");
    assert!(found[0].content.contains("<b>mensaje</b>: Te toca guardia"));
    assert!(found[0].content.contains("- <b>Luis</b>"));

    let missing = replies_to(&replies, "/ver_cadena id=nope");
    assert_eq!(missing[0].content, "No existe la cadena nope");

    let usage = replies_to(&replies, "/ver_cadena");
    assert!(usage[0].content.contains("requiere un id o slug"));
}
