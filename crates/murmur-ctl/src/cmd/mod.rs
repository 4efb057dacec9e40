//! CLI command modules.

pub mod chat;
pub mod events;
pub mod http;
pub mod sessions;
pub mod status;
pub mod topics;
