// ticketcore_server/src/models/mod.rs

pub mod api;
pub mod webhook;
