//! Presentation: turns form replies and API payloads into Telegram HTML and
//! reply keyboards.

use crate::api::{ChainDetail, ChainSummary};
use crate::channels::{Keyboard, OutgoingResponse};
use crate::error::FormError;
use crate::form::{
    ChainRecord, ExpectedSignal, FieldSnapshot, Participant, ParticipantField, Reply, Selection,
};

/// Escape text for Telegram's HTML parse mode.
pub fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Lay out the expected signals as a reply keyboard.
///
/// Chain fields go two per row, everything else gets its own row. Free-text
/// states hide the keyboard.
pub fn keyboard_for(expected: &[ExpectedSignal]) -> Keyboard {
    if expected.contains(&ExpectedSignal::Value) {
        return Keyboard::Remove;
    }
    let mut rows: Vec<Vec<String>> = Vec::new();
    let mut pair: Vec<String> = Vec::new();

    for signal in expected {
        match signal {
            ExpectedSignal::Select(selection @ Selection::Chain(_)) => {
                pair.push(selection.keyword().to_string());
                if pair.len() == 2 {
                    rows.push(std::mem::take(&mut pair));
                }
            }
            ExpectedSignal::Select(selection) => rows.push(vec![selection.keyword().to_string()]),
            ExpectedSignal::Retry(answer) => rows.push(vec![answer.keyword().to_string()]),
            ExpectedSignal::Value | ExpectedSignal::Cancel => {}
        }
    }
    if !pair.is_empty() {
        // Odd number of chain fields: keep the leftover before the action rows.
        let at = rows
            .iter()
            .position(|r| r.len() == 1)
            .unwrap_or(rows.len());
        rows.insert(at, pair);
    }

    if rows.is_empty() {
        Keyboard::Remove
    } else {
        Keyboard::Buttons {
            rows,
            one_time: true,
        }
    }
}

/// Messages for an accepted form input. The last message carries the keyboard
/// for the state the form is now in. `Ignored` renders to nothing.
pub fn render_reply(reply: &Reply, expected: &[ExpectedSignal]) -> Vec<OutgoingResponse> {
    let mut messages: Vec<String> = match reply {
        Reply::Started => vec![
            "Para crear una cadena por favor diligenciar cada una de las siguientes opciones."
                .to_string(),
        ],
        Reply::PromptChain(field) => vec![format!("Provee un valor para {}.", escape_html(field.label()))],
        Reply::Stored { snapshot, .. } => vec![format!(
            "Perfecto, estos son los valores que he guardado:\n{}\nPuedes actualizar un valor o continuar con los demás",
            render_snapshot(snapshot)
        )],
        Reply::ParticipantsStarted => vec![
            "Para crear un participante por favor diligenciar cada una de las siguientes opciones."
                .to_string(),
        ],
        Reply::PromptParticipant(field) => {
            vec![format!("Provee un valor para {}.", escape_html(field.label()))]
        }
        Reply::ParticipantIncomplete { missing, .. } => vec![format!(
            "Por favor diligencia los campos: {}",
            join_labels(missing)
        )],
        Reply::ParticipantCompleted(participant) => vec![
            format!(
                "Perfecto, estos son los valores que he guardado:\n{}",
                render_participant(participant)
            ),
            "¿Quieres crear otro participante?".to_string(),
        ],
        Reply::ParticipantRepeat => vec!["Vas a crear otro participante.".to_string()],
        Reply::ParticipantsDone { count } => vec![format!(
            "No vas a volver a crear otro participante. Participantes registrados: {count}"
        )],
        Reply::Review(review) => vec![format!(
            "Estos son los valores que llevas:\n{}\nParticipantes registrados: {}",
            render_snapshot(&review.snapshot),
            review.participant_count
        )],
        Reply::Finished(record) => vec![format!(
            "¡Listo! Esta es tu cadena:\n{}",
            render_record(record)
        )],
        Reply::Cancelled => vec!["La creación de cadena ha sido cancelada.".to_string()],
        Reply::Ignored => Vec::new(),
    };

    let Some(last) = messages.pop() else {
        return Vec::new();
    };
    let mut out: Vec<OutgoingResponse> = messages.into_iter().map(OutgoingResponse::text).collect();
    out.push(OutgoingResponse::text(last).with_keyboard(keyboard_for(expected)));
    out
}

/// Message for a rejected form input; the keyboard re-offers the valid options.
pub fn render_form_error(err: &FormError, expected: &[ExpectedSignal]) -> OutgoingResponse {
    let text = match err {
        FormError::IncompleteFields { missing } => format!(
            "Aún faltan los campos: {}",
            escape_html(&missing.join(", "))
        ),
        FormError::InvalidState { .. } => {
            "Esa opción no está disponible ahora. Elige una de las opciones del teclado."
                .to_string()
        }
    };
    OutgoingResponse::text(text).with_keyboard(keyboard_for(expected))
}

/// `key - value` lines for the stored chain fields, then flushed participants.
pub fn render_snapshot(snapshot: &FieldSnapshot) -> String {
    if snapshot.is_empty() {
        return "\n(sin valores)\n".to_string();
    }
    let mut out = String::from("\n");
    for (field, value) in &snapshot.fields {
        out.push_str(&format!(
            "<b>{}</b> - {}\n",
            escape_html(field.label()),
            escape_html(value)
        ));
    }
    if !snapshot.participants.is_empty() {
        out.push_str("<b>participantes</b>:\n");
        for p in &snapshot.participants {
            out.push_str(&render_participant(p));
        }
    }
    out
}

pub fn render_participant(p: &Participant) -> String {
    format!(
        "- <b>{}</b>\n\t\tpuesto: {}\n\t\tnumero: {}\n",
        escape_html(&p.name),
        escape_html(&p.role),
        escape_html(&p.number)
    )
}

pub fn render_record(record: &ChainRecord) -> String {
    render_snapshot(&FieldSnapshot {
        fields: record.fields.clone(),
        participants: record.participants.clone(),
    })
}

fn join_labels(fields: &[ParticipantField]) -> String {
    fields
        .iter()
        .map(|f| f.label())
        .collect::<Vec<_>>()
        .join(", ")
}

// ── Commands ────────────────────────────────────────────────────────

pub fn greeting(user_name: &str) -> String {
    format!(
        "Hola <b>{}</b>! usa este bot para crear y administrar tus cadenas.",
        escape_html(user_name)
    )
}

pub const HELP_TEXT: &str = "Comandos disponibles:\n\
/crear_cadena - crear una cadena nueva\n\
/mis_cadenas - ver tus cadenas\n\
/ver_cadena id=... o slug=... - ver una cadena\n\
/cancel - cancelar la creación de una cadena";

pub const VIEW_CHAIN_USAGE: &str = "⚠️ <b>El comando ver_cadena requiere un id o slug</b>\nEjemplo:\n\
    - /ver_cadena id=1234567890abcdefghjklm\n\
    - /ver_cadena slug=mi_cadena_ab12";

pub const API_ERROR_TEXT: &str = "Hubo un error consultando la API, intenta de nuevo más tarde.";

pub fn render_chain_list(chains: &[ChainSummary]) -> String {
    if chains.is_empty() {
        return "Aún no tienes cadenas.".to_string();
    }
    chains
        .iter()
        .map(|c| {
            format!(
                "<b><u>{}</u></b> 🔗:\n\t\t id: {}\n\t\t slug: {}\n",
                escape_html(&c.title),
                escape_html(&c.id),
                escape_html(&c.slug)
            )
        })
        .collect()
}

pub fn render_chain_detail(chain: &ChainDetail) -> String {
    let mut out = format!(
        "<b>Titulo</b>: {}\n\
         <b>id</b>: {}\n\
         <b>slug</b>: {}\n\
         <b>autor</b>: {}\n\
         <b>fecha_inicio</b>: {}\n\
         <b>fecha_fin</b>: {}\n\
         <b>dias_aviso</b>: {}\n\
         <b>mensaje</b>: {}\n\
         <b>participantes</b>:\n",
        escape_html(&chain.title),
        escape_html(&chain.id),
        escape_html(&chain.slug),
        escape_html(&chain.author.name),
        chain.start_date,
        chain.end_date,
        escape_html(&chain.warning_days),
        escape_html(&chain.message),
    );
    for p in &chain.participants {
        out.push_str(&format!(
            "- <b>{}</b>\n\t\tpuesto: {}\n\t\tnumero: {}\n",
            escape_html(&p.name),
            escape_html(&p.role),
            escape_html(&p.number)
        ));
    }
    out
}
