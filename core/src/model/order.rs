// ticketcore/src/model/order.rs

use super::{text_enum, EventId, IdentityId, OrderId};
use crate::pricing::{Currency, Quote};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
  Pending,
  Paid,
  Refunded,
  PartiallyRefunded,
  Failed,
}

text_enum!(OrderStatus, "order status", {
  Pending => "pending",
  Paid => "paid",
  Refunded => "refunded",
  PartiallyRefunded => "partially_refunded",
  Failed => "failed",
});

/// One checkout transaction. Owned by checkout; the core only moves its status.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
  pub id: OrderId,
  pub buyer_id: IdentityId,
  pub buyer_email: String,
  pub event_id: EventId,
  pub subtotal_cents: i64,
  pub fees_cents: i64,
  pub total_cents: i64,
  pub currency: Currency,
  pub status: OrderStatus,
  /// The processor's payment id; refunds are issued against it.
  pub payment_reference: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl Order {
  /// Builds an order whose amounts come from a pricing quote, which is the
  /// only way `fees_cents` is ever derived.
  #[allow(clippy::too_many_arguments)]
  pub fn from_quote(
    id: OrderId,
    buyer_id: IdentityId,
    buyer_email: impl Into<String>,
    event_id: EventId,
    quote: &Quote,
    status: OrderStatus,
    payment_reference: Option<String>,
    created_at: DateTime<Utc>,
  ) -> Self {
    Self {
      id,
      buyer_id,
      buyer_email: buyer_email.into(),
      event_id,
      subtotal_cents: quote.subtotal_cents,
      fees_cents: quote.fees_cents,
      total_cents: quote.total_cents,
      currency: quote.currency.clone(),
      status,
      payment_reference,
      created_at,
    }
  }

  pub fn amounts_consistent(&self) -> bool {
    self.subtotal_cents.checked_add(self.fees_cents) == Some(self.total_cents)
  }
}
