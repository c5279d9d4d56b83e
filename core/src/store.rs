// ticketcore/src/store.rs

//! Datastore contracts. Every state change the core makes is a conditional
//! write expressed by one of these methods; implementations must make each
//! method atomic on its own.

use crate::model::{
  Event, EventId, Order, OrderId, RefundLedgerEntry, RefundRequest, RefundRequestId, RefundRequestStatus, ReviewStamp,
  ScanLogEntry, Ticket, TicketId,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
  #[error("Datastore unavailable: {0}")]
  Unavailable(String),

  #[error("Conflicting concurrent update on {entity} {id}")]
  Conflict { entity: &'static str, id: String },

  #[error("Stored {entity} {id} is malformed: {detail}")]
  Corrupt {
    entity: &'static str,
    id: String,
    detail: String,
  },
}

impl StoreError {
  pub fn is_transient(&self) -> bool {
    matches!(self, StoreError::Unavailable(_) | StoreError::Conflict { .. })
  }
}

/// Result of a ledger write keyed by external refund id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerWrite {
  /// First write for this refund id: entry inserted, tickets and order moved.
  Applied,
  /// Entry existed; the processor's confirmation id was added to it.
  Confirmed,
  /// Entry existed with nothing new to record.
  AlreadyRecorded,
}

impl LedgerWrite {
  pub fn changed_state(self) -> bool {
    !matches!(self, LedgerWrite::AlreadyRecorded)
  }
}

/// Conditional transitions of a refund request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RequestUpdate {
  /// `pending -> approved|declined`, stamping the reviewer.
  Claim {
    status: RefundRequestStatus,
    stamp: ReviewStamp,
  },
  /// `approved -> pending`, clearing the reviewer stamp.
  Release,
  /// `approved -> processed`, linking the ledger entry. Also applied from
  /// `pending` when a refund settles the order outside the review.
  Complete { ledger_refund_id: String },
}

impl RequestUpdate {
  pub fn target_status(&self) -> RefundRequestStatus {
    match self {
      RequestUpdate::Claim { status, .. } => *status,
      RequestUpdate::Release => RefundRequestStatus::Pending,
      RequestUpdate::Complete { .. } => RefundRequestStatus::Processed,
    }
  }

  /// Applies the update to an in-memory copy. Callers are responsible for
  /// having checked the expected status first.
  pub fn apply_to(&self, request: &mut RefundRequest) {
    request.status = self.target_status();
    match self {
      RequestUpdate::Claim { stamp, .. } => request.review = Some(stamp.clone()),
      RequestUpdate::Release => request.review = None,
      RequestUpdate::Complete { ledger_refund_id } => request.ledger_refund_id = Some(ledger_refund_id.clone()),
    }
  }
}

#[async_trait]
pub trait OrderStore: Send + Sync {
  async fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError>;

  async fn event(&self, event_id: EventId) -> Result<Option<Event>, StoreError>;

  async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError>;
}

#[async_trait]
pub trait TicketStore: Send + Sync {
  async fn ticket_by_token(&self, token: &str) -> Result<Option<Ticket>, StoreError>;

  async fn ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, StoreError>;

  /// Sets `status = redeemed, redeemed_at = at` only when the ticket is still
  /// unredeemed and in a redeemable status. Returns whether the row changed.
  async fn redeem_if_unredeemed(&self, ticket_id: TicketId, at: DateTime<Utc>) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait ScanLogStore: Send + Sync {
  async fn append(&self, entry: ScanLogEntry) -> Result<(), StoreError>;

  /// Entries for an event, oldest first.
  async fn entries_for_event(&self, event_id: EventId) -> Result<Vec<ScanLogEntry>, StoreError>;
}

#[async_trait]
pub trait RefundRequestStore: Send + Sync {
  /// Inserts `request` unless the order already has a pending or approved
  /// request. Returns whether it was inserted.
  async fn insert_if_none_open(&self, request: RefundRequest) -> Result<bool, StoreError>;

  async fn request(&self, request_id: RefundRequestId) -> Result<Option<RefundRequest>, StoreError>;

  /// The order's pending or approved request, if any. At most one exists.
  async fn open_request_for_order(&self, order_id: OrderId) -> Result<Option<RefundRequest>, StoreError>;

  /// Applies `update` only if the request is currently in `expected`.
  async fn transition(
    &self,
    request_id: RefundRequestId,
    expected: RefundRequestStatus,
    update: RequestUpdate,
  ) -> Result<bool, StoreError>;
}

#[async_trait]
pub trait RefundLedgerStore: Send + Sync {
  /// In one transaction keyed by `entry.refund_id`:
  /// - absent: insert the entry, move the order's issued/transferred tickets
  ///   to `refunded`, release their tier inventory, swap the order
  ///   `paid -> refunded`;
  /// - present without a confirmation id while `entry` carries one: record it;
  /// - otherwise nothing.
  async fn record_refund(&self, entry: RefundLedgerEntry) -> Result<LedgerWrite, StoreError>;

  async fn entry(&self, refund_id: &str) -> Result<Option<RefundLedgerEntry>, StoreError>;

  async fn entries_for_order(&self, order_id: OrderId) -> Result<Vec<RefundLedgerEntry>, StoreError>;
}
