//! Commands that read from the storage API or just talk. None of them touch
//! the chain form.

use crate::api::{ChainApi, ChainKey, ChainLookup};
use crate::channels::OutgoingResponse;

use super::render;

pub fn start(user_name: &str) -> OutgoingResponse {
    OutgoingResponse::text(render::greeting(user_name))
}

pub fn help() -> OutgoingResponse {
    OutgoingResponse::text(render::HELP_TEXT)
}

/// `/mis_cadenas`: chains whose author is the sender.
pub async fn my_chains(api: &dyn ChainApi, user_id: &str) -> OutgoingResponse {
    match api.fetch_by_author(user_id).await {
        Ok(chains) => {
            tracing::debug!(user_id = %user_id, count = chains.len(), "Listed chains");
            OutgoingResponse::text(render::render_chain_list(&chains))
        }
        Err(e) => {
            tracing::warn!(user_id = %user_id, error = %e, "Chain listing failed");
            OutgoingResponse::text(render::API_ERROR_TEXT)
        }
    }
}

/// `/ver_cadena id=...` or `/ver_cadena slug=...`.
pub async fn view_chain(api: &dyn ChainApi, args: &[String]) -> OutgoingResponse {
    let key = match args {
        [arg] => ChainKey::parse(arg),
        _ => None,
    };
    let Some(key) = key else {
        return OutgoingResponse::text(render::VIEW_CHAIN_USAGE);
    };

    match api.fetch_by_id_or_slug(&key).await {
        Ok(ChainLookup::Found(chain)) => {
            OutgoingResponse::text(render::render_chain_detail(&chain))
        }
        Ok(ChainLookup::Missing(message)) => {
            tracing::debug!(key = %key, message = %message, "Chain not found");
            OutgoingResponse::text(render::escape_html(&message))
        }
        Err(e) => {
            tracing::warn!(key = %key, error = %e, "Chain lookup failed");
            OutgoingResponse::text(render::API_ERROR_TEXT)
        }
    }
}
