//! Chain storage API: read-only access used by `/mis_cadenas` and `/ver_cadena`.

pub mod client;
pub mod model;

pub use client::{ChainApi, HttpChainApi};
pub use model::{Author, ChainDetail, ChainKey, ChainLookup, ChainParticipant, ChainSummary};
