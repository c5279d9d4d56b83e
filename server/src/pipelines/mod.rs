// ticketcore_server/src/pipelines/mod.rs

pub mod contexts;
pub mod webhook_pipeline;

pub use webhook_pipeline::WebhookPipeline;
