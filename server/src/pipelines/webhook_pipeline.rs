// ticketcore_server/src/pipelines/webhook_pipeline.rs

use crate::errors::AppError;
use crate::models::webhook::WebhookPayload;
use crate::pipelines::contexts::WebhookCtxData;
use crate::services::signature;
use actix_web::web::Bytes;
use serde::Serialize;
use std::sync::Arc;
use ticketcore::refund::{ConfirmationResult, RefundReconciler};
use ticketcore::{Clock, ContextData, Flow, FlowControl, FlowOutcome};
use tracing::{info, instrument, warn};

pub const STEP_VERIFY_SIGNATURE: &str = "verify_signature";
pub const STEP_PARSE_PAYLOAD: &str = "parse_payload";
pub const STEP_APPLY_CONFIRMATION: &str = "apply_confirmation";

/// What the server tells the processor about one delivery.
#[derive(Debug, Clone, Serialize)]
pub struct WebhookAck {
  pub received: bool,
  pub delivery_id: Option<String>,
  pub event_type: Option<String>,
  /// `None` when the notice type is not one this server acts on.
  pub result: Option<ConfirmationResult>,
}

/// Processor webhook intake: signature check, payload parsing, then the
/// reconciler. Shared by the HTTP route and the mock processor's outbox.
pub struct WebhookPipeline {
  flow: Flow<WebhookCtxData, AppError>,
  reconciler: RefundReconciler,
  clock: Arc<dyn Clock>,
  secret: Arc<str>,
  tolerance_secs: i64,
}

impl WebhookPipeline {
  pub fn new(reconciler: RefundReconciler, clock: Arc<dyn Clock>, secret: &str, tolerance_secs: i64) -> Self {
    let mut flow: Flow<WebhookCtxData, AppError> = Flow::new(
      "processor_webhook",
      &[
        (STEP_VERIFY_SIGNATURE, false, None),
        (STEP_PARSE_PAYLOAD, false, None),
        (STEP_APPLY_CONFIRMATION, false, None),
      ],
    );
    flow.on_step(STEP_VERIFY_SIGNATURE, verify_signature);
    flow.on_step(STEP_PARSE_PAYLOAD, parse_payload);
    flow.on_step(STEP_APPLY_CONFIRMATION, apply_confirmation);

    Self {
      flow,
      reconciler,
      clock,
      secret: Arc::from(secret),
      tolerance_secs,
    }
  }

  pub fn secret(&self) -> &str {
    &self.secret
  }

  #[instrument(name = "WebhookPipeline::handle", skip_all, fields(payload_bytes = raw_payload.len()))]
  pub async fn handle(&self, raw_payload: Bytes, signature_header: Option<String>) -> Result<WebhookAck, AppError> {
    let ctx = ContextData::new(WebhookCtxData {
      reconciler: self.reconciler.clone(),
      clock: self.clock.clone(),
      secret: self.secret.clone(),
      tolerance_secs: self.tolerance_secs,
      raw_payload,
      signature_header,
      payload: None,
      result: None,
    });

    let outcome = self.flow.run(ctx.clone()).await?;
    let (payload, result) = ctx.update(|c| (c.payload.take(), c.result.take()));

    if let FlowOutcome::Stopped { step } = &outcome {
      info!(%step, "Webhook: delivery acknowledged without ledger work.");
    }
    Ok(WebhookAck {
      received: true,
      delivery_id: payload.as_ref().map(|p| p.id.clone()),
      event_type: payload.map(|p| p.event_type),
      result,
    })
  }
}

async fn verify_signature(ctx: ContextData<WebhookCtxData>) -> Result<FlowControl, AppError> {
  ctx.with(|c| {
    signature::verify(
      &c.secret,
      c.signature_header.as_deref(),
      &c.raw_payload,
      c.clock.now(),
      c.tolerance_secs,
    )
  })
  .map_err(|e| {
    warn!(error = %e, "Webhook: signature rejected.");
    AppError::Signature(e.to_string())
  })?;
  Ok(FlowControl::Continue)
}

async fn parse_payload(ctx: ContextData<WebhookCtxData>) -> Result<FlowControl, AppError> {
  let raw = ctx.with(|c| c.raw_payload.clone());
  let payload: WebhookPayload = serde_json::from_slice(&raw).map_err(|e| {
    warn!(error = %e, "Webhook: payload is not a refund notice.");
    AppError::Validation(format!("Invalid webhook payload: {}", e))
  })?;

  let handled = payload.kind().is_some();
  info!(delivery_id = %payload.id, event_type = %payload.event_type, handled, "Webhook: payload parsed.");
  ctx.update(|c| c.payload = Some(payload));

  Ok(if handled { FlowControl::Continue } else { FlowControl::Stop })
}

async fn apply_confirmation(ctx: ContextData<WebhookCtxData>) -> Result<FlowControl, AppError> {
  let (reconciler, payload, now) = ctx.with(|c| (c.reconciler.clone(), c.payload.clone(), c.clock.now()));
  let confirmation = payload
    .and_then(|p| p.into_confirmation(now))
    .ok_or_else(|| AppError::Internal("webhook payload missing after parsing".to_string()))?;

  let result = reconciler.confirm(confirmation).await?;
  ctx.update(|c| c.result = Some(result));
  Ok(FlowControl::Continue)
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::models::webhook::{REFUND_FAILED, REFUND_SUCCEEDED};
  use chrono::{Duration, TimeZone, Utc};
  use ticketcore::environment::Environment;
  use ticketcore::memory::{MemoryProcessor, MemoryStore, StaticAccessControl};
  use ticketcore::model::{Event, Order, OrderStatus, RefundReason, RefundType, Ticket, TicketStatus};
  use ticketcore::processor::RefundMetadata;
  use ticketcore::{quote, Currency, FixedClock, LedgerWrite, ProcessorRefund, ProcessorRefundStatus};
  use uuid::Uuid;

  const SECRET: &str = "whsec_pipeline_test";

  struct Harness {
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    pipeline: WebhookPipeline,
    order: Order,
    ticket: Ticket,
  }

  fn harness() -> Harness {
    let now = Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap();
    let clock = Arc::new(FixedClock::new(now));
    let store = Arc::new(MemoryStore::new());
    let access = Arc::new(StaticAccessControl::new());
    let processor = Arc::new(MemoryProcessor::new(clock.clone()));
    let env = Arc::new(Environment::new(store.clone(), access, processor, clock.clone()));

    let event = Event {
      id: Uuid::new_v4(),
      owner_id: Uuid::new_v4(),
      title: "Webhook Test".to_string(),
      starts_at: now + Duration::days(10),
      ends_at: None,
    };
    store.insert_event(event.clone());
    let priced = quote(&[2500], Currency::usd()).unwrap();
    let order = Order::from_quote(
      Uuid::new_v4(),
      Uuid::new_v4(),
      "buyer@example.com",
      event.id,
      &priced,
      OrderStatus::Paid,
      Some("pi_1".to_string()),
      now,
    );
    store.insert_order(order.clone());
    let ticket = Ticket {
      id: Uuid::new_v4(),
      order_id: order.id,
      event_id: event.id,
      tier_id: Uuid::new_v4(),
      owner_id: order.buyer_id,
      holder_name: None,
      token: "tkn_webhook".to_string(),
      status: TicketStatus::Issued,
      redeemed_at: None,
    };
    store.insert_ticket(ticket.clone());

    let pipeline = WebhookPipeline::new(RefundReconciler::new(env), clock.clone(), SECRET, 300);
    Harness {
      store,
      clock,
      pipeline,
      order,
      ticket,
    }
  }

  fn body_for(h: &Harness, status: ProcessorRefundStatus) -> Vec<u8> {
    let refund = ProcessorRefund {
      refund_id: "re_hook".to_string(),
      amount_cents: h.order.total_cents,
      currency: h.order.currency.clone(),
      status,
      metadata: RefundMetadata {
        order_id: h.order.id,
        event_id: h.order.event_id,
        reason: RefundReason::EventCancelled,
        initiator: Uuid::new_v4(),
        refund_type: RefundType::Admin,
      },
      created_at: h.clock.now(),
    };
    serde_json::to_vec(&WebhookPayload::for_refund(&refund)).unwrap()
  }

  #[tokio::test]
  async fn signed_success_notice_applies_the_refund_once() {
    let h = harness();
    let body = body_for(&h, ProcessorRefundStatus::Succeeded);
    let header = signature::sign(SECRET, &body, h.clock.now()).unwrap();

    let ack = h.pipeline.handle(Bytes::from(body.clone()), Some(header.clone())).await.unwrap();
    assert_eq!(ack.event_type.as_deref(), Some(REFUND_SUCCEEDED));
    assert_eq!(ack.result, Some(ConfirmationResult::Recorded(LedgerWrite::Applied)));
    assert_eq!(h.store.order_snapshot(h.order.id).unwrap().status, OrderStatus::Refunded);
    assert_eq!(h.store.ticket_snapshot(h.ticket.id).unwrap().status, TicketStatus::Refunded);

    let replay = h.pipeline.handle(Bytes::from(body), Some(header)).await.unwrap();
    assert_eq!(replay.result, Some(ConfirmationResult::Recorded(LedgerWrite::AlreadyRecorded)));
    assert_eq!(h.store.ledger_entries().len(), 1);
  }

  #[tokio::test]
  async fn unsigned_delivery_is_rejected_before_parsing() {
    let h = harness();
    let body = body_for(&h, ProcessorRefundStatus::Succeeded);
    let err = h.pipeline.handle(Bytes::from(body), None).await.unwrap_err();
    assert!(matches!(err, AppError::Signature(_)));
    assert!(h.store.ledger_entries().is_empty());
  }

  #[tokio::test]
  async fn failure_notices_are_acknowledged_without_ledger_writes() {
    let h = harness();
    let body = body_for(&h, ProcessorRefundStatus::Failed);
    let header = signature::sign(SECRET, &body, h.clock.now()).unwrap();

    let ack = h.pipeline.handle(Bytes::from(body), Some(header)).await.unwrap();
    assert_eq!(ack.event_type.as_deref(), Some(REFUND_FAILED));
    assert_eq!(ack.result, Some(ConfirmationResult::Ignored));
    assert_eq!(h.store.order_snapshot(h.order.id).unwrap().status, OrderStatus::Paid);
  }

  #[tokio::test]
  async fn unknown_notice_types_stop_the_flow() {
    let h = harness();
    let body = serde_json::to_vec(&serde_json::json!({
      "id": "evt_other",
      "type": "payout.created",
      "data": {
        "refund_id": "re_x",
        "order_id": h.order.id,
        "event_id": h.order.event_id,
        "amount_cents": 1,
        "currency": "USD",
        "reason": "other",
        "initiator": Uuid::new_v4(),
        "refund_type": "admin"
      }
    }))
    .unwrap();
    let header = signature::sign(SECRET, &body, h.clock.now()).unwrap();

    let ack = h.pipeline.handle(Bytes::from(body), Some(header)).await.unwrap();
    assert_eq!(ack.delivery_id.as_deref(), Some("evt_other"));
    assert!(ack.result.is_none());
  }

  #[tokio::test]
  async fn malformed_json_is_a_validation_error() {
    let h = harness();
    let body = b"{not json".to_vec();
    let header = signature::sign(SECRET, &body, h.clock.now()).unwrap();
    let err = h.pipeline.handle(Bytes::from(body), Some(header)).await.unwrap_err();
    assert!(matches!(err, AppError::Validation(_)));
  }
}
