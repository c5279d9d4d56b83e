// ticketcore_server/src/services/outbox.rs

//! Delivers the mock processor's settlement notices to the webhook intake,
//! signed exactly as the processor signs them. Retryable failures are
//! redelivered with backoff; anything still failing is left to the sweep.

use crate::models::webhook::WebhookPayload;
use crate::pipelines::WebhookPipeline;
use crate::services::signature;
use actix_web::web::Bytes;
use std::sync::Arc;
use std::time::Duration;
use ticketcore::{Clock, ProcessorRefund};
use tokio::sync::mpsc;
use tracing::{error, info, warn};

const MAX_ATTEMPTS: u32 = 4;
const FIRST_BACKOFF: Duration = Duration::from_millis(250);

pub async fn run(
  pipeline: Arc<WebhookPipeline>,
  clock: Arc<dyn Clock>,
  mut settlements: mpsc::UnboundedReceiver<ProcessorRefund>,
) {
  info!("Webhook outbox started.");
  while let Some(refund) = settlements.recv().await {
    deliver(&pipeline, clock.as_ref(), &refund).await;
  }
  info!("Webhook outbox stopped: processor channel closed.");
}

async fn deliver(pipeline: &WebhookPipeline, clock: &dyn Clock, refund: &ProcessorRefund) {
  let body = match serde_json::to_vec(&WebhookPayload::for_refund(refund)) {
    Ok(body) => Bytes::from(body),
    Err(e) => {
      error!(refund_id = %refund.refund_id, error = %e, "Outbox: payload serialization failed.");
      return;
    }
  };

  let mut backoff = FIRST_BACKOFF;
  for attempt in 1..=MAX_ATTEMPTS {
    // Re-signed per attempt so a delayed retry stays inside the tolerance.
    let header = match signature::sign(pipeline.secret(), &body, clock.now()) {
      Ok(header) => header,
      Err(e) => {
        error!(refund_id = %refund.refund_id, error = %e, "Outbox: signing failed.");
        return;
      }
    };

    match pipeline.handle(body.clone(), Some(header)).await {
      Ok(ack) => {
        info!(refund_id = %refund.refund_id, attempt, result = ?ack.result, "Outbox: webhook delivered.");
        return;
      }
      Err(e) if is_retryable(&e) && attempt < MAX_ATTEMPTS => {
        warn!(refund_id = %refund.refund_id, attempt, error = %e, "Outbox: delivery failed; retrying.");
        tokio::time::sleep(backoff).await;
        backoff *= 2;
      }
      Err(e) => {
        error!(refund_id = %refund.refund_id, attempt, error = %e, "Outbox: delivery abandoned; sweep will converge it.");
        return;
      }
    }
  }
}

fn is_retryable(err: &crate::errors::AppError) -> bool {
  match err {
    crate::errors::AppError::Core(core) => core.is_retryable(),
    crate::errors::AppError::Sqlx(_) => true,
    _ => false,
  }
}
