//! Bot layer: command handling and per-chat routing on top of the form.

pub mod commands;
pub mod render;
pub mod router;

pub use router::{Bot, Dispatch, SessionRegistry};
