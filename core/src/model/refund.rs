// ticketcore/src/model/refund.rs

use super::{text_enum, IdentityId, OrderId, RefundRequestId};
use crate::pricing::Currency;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundReason {
  EventCancelled,
  CannotAttend,
  DuplicatePurchase,
  Other,
}

text_enum!(RefundReason, "refund reason", {
  EventCancelled => "event_cancelled",
  CannotAttend => "cannot_attend",
  DuplicatePurchase => "duplicate_purchase",
  Other => "other",
});

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundRequestStatus {
  Pending,
  Approved,
  Declined,
  Processed,
}

text_enum!(RefundRequestStatus, "refund request status", {
  Pending => "pending",
  Approved => "approved",
  Declined => "declined",
  Processed => "processed",
});

impl RefundRequestStatus {
  /// Pending and approved requests still block a second request on the order.
  pub fn is_open(self) -> bool {
    matches!(self, RefundRequestStatus::Pending | RefundRequestStatus::Approved)
  }
}

/// Who asked the processor for the money back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RefundType {
  Organizer,
  Admin,
}

text_enum!(RefundType, "refund type", {
  Organizer => "organizer",
  Admin => "admin",
});

/// Reviewer fields written together when a request leaves `pending`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReviewStamp {
  pub reviewer_id: IdentityId,
  pub note: Option<String>,
  pub reviewed_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundRequest {
  pub id: RefundRequestId,
  pub order_id: OrderId,
  pub requested_by: IdentityId,
  pub reason: RefundReason,
  pub detail: Option<String>,
  pub status: RefundRequestStatus,
  pub review: Option<ReviewStamp>,
  /// External refund id of the ledger entry this request produced.
  pub ledger_refund_id: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Record of a completed processor refund, keyed by the processor's refund id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundLedgerEntry {
  pub refund_id: String,
  pub order_id: OrderId,
  pub amount_cents: i64,
  pub currency: Currency,
  /// Set once the processor's asynchronous confirmation has been seen.
  pub confirmation_id: Option<String>,
  pub reason: RefundReason,
  pub initiator: IdentityId,
  pub refund_type: RefundType,
  pub processed_at: DateTime<Utc>,
}
