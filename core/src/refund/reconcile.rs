// ticketcore/src/refund/reconcile.rs

use crate::environment::Environment;
use crate::error::CoreError;
use crate::model::{IdentityId, OrderId, RefundLedgerEntry, RefundReason, RefundType};
use crate::pricing::Currency;
use crate::processor::{ProcessorRefund, ProcessorRefundStatus};
use crate::store::{LedgerWrite, RequestUpdate, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// A completed processor refund to mirror into the local ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerWriteRequest {
  pub refund_id: String,
  pub order_id: OrderId,
  pub amount_cents: i64,
  pub currency: Currency,
  pub confirmation_id: Option<String>,
  pub reason: RefundReason,
  pub initiator: IdentityId,
  pub refund_type: RefundType,
  pub processed_at: DateTime<Utc>,
}

impl LedgerWriteRequest {
  pub fn from_processor(refund: &ProcessorRefund, confirmation_id: Option<String>, processed_at: DateTime<Utc>) -> Self {
    Self {
      refund_id: refund.refund_id.clone(),
      order_id: refund.metadata.order_id,
      amount_cents: refund.amount_cents,
      currency: refund.currency.clone(),
      confirmation_id,
      reason: refund.metadata.reason,
      initiator: refund.metadata.initiator,
      refund_type: refund.metadata.refund_type,
      processed_at,
    }
  }

  fn into_entry(self) -> RefundLedgerEntry {
    RefundLedgerEntry {
      refund_id: self.refund_id,
      order_id: self.order_id,
      amount_cents: self.amount_cents,
      currency: self.currency,
      confirmation_id: self.confirmation_id,
      reason: self.reason,
      initiator: self.initiator,
      refund_type: self.refund_type,
      processed_at: self.processed_at,
    }
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmationKind {
  Succeeded,
  Failed,
  Pending,
}

/// An asynchronous notice from the processor about one refund.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundConfirmation {
  /// The processor's id for the notice itself.
  pub confirmation_id: String,
  pub kind: ConfirmationKind,
  pub refund: ProcessorRefund,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "result", content = "write", rename_all = "snake_case")]
pub enum ConfirmationResult {
  Recorded(LedgerWrite),
  /// Not a success notice; acknowledged without touching the ledger.
  Ignored,
}

/// Writes processor refunds into the ledger. Safe to call any number of times,
/// concurrently and in any order, for the same refund id.
#[derive(Clone)]
pub struct RefundReconciler {
  env: Arc<Environment>,
}

impl RefundReconciler {
  pub fn new(env: Arc<Environment>) -> Self {
    Self { env }
  }

  #[instrument(name = "RefundReconciler::apply", skip(self, request), fields(refund_id = %request.refund_id, order_id = %request.order_id))]
  pub async fn apply(&self, request: LedgerWriteRequest) -> Result<LedgerWrite, CoreError> {
    let order = self
      .env
      .orders
      .order(request.order_id)
      .await?
      .ok_or_else(|| CoreError::not_found("order", request.order_id))?;

    if request.amount_cents != order.total_cents || request.currency != order.currency {
      warn!(
        amount_cents = request.amount_cents,
        order_total_cents = order.total_cents,
        "Reconciler: refund does not match the order total."
      );
      return Err(CoreError::InvalidInput(format!(
        "refund {} of {} {} does not cover order {} total of {} {}",
        request.refund_id, request.amount_cents, request.currency, order.id, order.total_cents, order.currency
      )));
    }

    let order_id = request.order_id;
    let refund_id = request.refund_id.clone();
    let write = self.env.ledger.record_refund(request.into_entry()).await?;
    info!(?write, "Reconciler: ledger write finished.");

    // The order is refunded now, so an open buyer request on it is settled by
    // this refund. A failed link is retried by the next replay of the refund.
    if let Err(e) = self.link_open_request(order_id, &refund_id).await {
      warn!(error = %e, "Reconciler: could not link the open refund request.");
    }
    Ok(write)
  }

  /// Moves the order's pending or approved request to `processed`, pointing at
  /// `refund_id`. Returns whether a request was linked.
  pub async fn link_open_request(&self, order_id: OrderId, refund_id: &str) -> Result<bool, StoreError> {
    let Some(open) = self.env.requests.open_request_for_order(order_id).await? else {
      return Ok(false);
    };
    let update = RequestUpdate::Complete {
      ledger_refund_id: refund_id.to_string(),
    };
    let linked = self.env.requests.transition(open.id, open.status, update).await?;
    if linked {
      info!(request_id = %open.id, from = ?open.status, "Reconciler: refund request linked to the ledger entry.");
    }
    Ok(linked)
  }

  /// Webhook entry point.
  #[instrument(name = "RefundReconciler::confirm", skip(self, confirmation), fields(confirmation_id = %confirmation.confirmation_id, kind = ?confirmation.kind))]
  pub async fn confirm(&self, confirmation: RefundConfirmation) -> Result<ConfirmationResult, CoreError> {
    if confirmation.kind != ConfirmationKind::Succeeded || confirmation.refund.status != ProcessorRefundStatus::Succeeded {
      info!(refund_id = %confirmation.refund.refund_id, "Reconciler: non-success confirmation ignored.");
      return Ok(ConfirmationResult::Ignored);
    }

    let request = LedgerWriteRequest::from_processor(
      &confirmation.refund,
      Some(confirmation.confirmation_id),
      self.env.clock.now(),
    );
    Ok(ConfirmationResult::Recorded(self.apply(request).await?))
  }
}
