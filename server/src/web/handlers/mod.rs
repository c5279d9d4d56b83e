// ticketcore_server/src/web/handlers/mod.rs

pub mod identity;
pub mod pricing_handlers;
pub mod refund_handlers;
pub mod scan_handlers;
pub mod webhook_handlers;
