// ticketcore/src/processor.rs

//! The payment processor seam used for refunds.

use crate::model::{EventId, IdentityId, OrderId, RefundReason, RefundType};
use crate::pricing::Currency;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
  #[error("Refund declined by processor: {0}")]
  Declined(String),

  /// The call may or may not have reached the processor.
  #[error("Processor call timed out")]
  Timeout,

  #[error("Processor unavailable: {0}")]
  Unavailable(String),
}

impl ProcessorError {
  /// Retry only with the same idempotency key.
  pub fn is_retryable(&self) -> bool {
    matches!(self, ProcessorError::Timeout | ProcessorError::Unavailable(_))
  }
}

/// Key under which the processor deduplicates refund calls. One logical
/// refund of an order always maps to the same key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
  /// `attempt` is the number of refunds already on the ledger for the order.
  pub fn for_refund(order_id: OrderId, attempt: usize) -> Self {
    IdempotencyKey(format!("refund:{}:{}", order_id, attempt))
  }

  pub fn as_str(&self) -> &str {
    &self.0
  }
}

impl fmt::Display for IdempotencyKey {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(&self.0)
  }
}

/// Tags attached to every refund so the asynchronous paths can rebuild the
/// ledger entry without the original request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundMetadata {
  pub order_id: OrderId,
  pub event_id: EventId,
  pub reason: RefundReason,
  pub initiator: IdentityId,
  pub refund_type: RefundType,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundIssue {
  pub payment_reference: String,
  pub amount_cents: i64,
  pub currency: Currency,
  pub idempotency_key: IdempotencyKey,
  pub metadata: RefundMetadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessorRefundStatus {
  Pending,
  Succeeded,
  Failed,
}

/// The processor's view of a refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcessorRefund {
  pub refund_id: String,
  pub amount_cents: i64,
  pub currency: Currency,
  pub status: ProcessorRefundStatus,
  pub metadata: RefundMetadata,
  pub created_at: DateTime<Utc>,
}

#[async_trait]
pub trait PaymentProcessor: Send + Sync {
  /// Issues (or, for a key seen before, replays) a refund.
  async fn issue_refund(&self, issue: &RefundIssue) -> Result<ProcessorRefund, ProcessorError>;

  /// Refunds created at or after `since`, used by the reconciliation sweep.
  async fn refunds_since(&self, since: DateTime<Utc>) -> Result<Vec<ProcessorRefund>, ProcessorError>;
}
