//! Chain bot: a guided Telegram dialogue for creating notification chains.

pub mod api;
pub mod bot;
pub mod channels;
pub mod config;
pub mod error;
pub mod form;
