// ticketcore_server/src/pipelines/contexts.rs

use crate::models::webhook::WebhookPayload;
use actix_web::web::Bytes;
use std::sync::Arc;
use ticketcore::refund::{ConfirmationResult, RefundReconciler};
use ticketcore::Clock;

/// Shared state of one webhook delivery as it moves through the intake flow.
pub struct WebhookCtxData {
  pub reconciler: RefundReconciler,
  pub clock: Arc<dyn Clock>,
  pub secret: Arc<str>,
  pub tolerance_secs: i64,
  pub raw_payload: Bytes,
  pub signature_header: Option<String>,
  // Filled in by the flow:
  pub payload: Option<WebhookPayload>,
  pub result: Option<ConfirmationResult>,
}
