// ticketcore_server/src/services/mod.rs

pub mod notifier;
pub mod outbox;
pub mod processor_mock;
pub mod signature;
pub mod sweep_job;
