// ticketcore/src/model/ticket.rs

use super::{text_enum, EventId, IdentityId, OrderId, TicketId, TierId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TicketStatus {
  Issued,
  Transferred,
  Redeemed,
  Refunded,
  Void,
}

text_enum!(TicketStatus, "ticket status", {
  Issued => "issued",
  Transferred => "transferred",
  Redeemed => "redeemed",
  Refunded => "refunded",
  Void => "void",
});

impl TicketStatus {
  /// States from which a door scan may admit the holder.
  pub fn is_redeemable(self) -> bool {
    matches!(self, TicketStatus::Issued | TicketStatus::Transferred)
  }

  /// States a completed refund moves to `Refunded`. Redeemed tickets keep
  /// their redemption record; void tickets stay void.
  pub fn is_refundable(self) -> bool {
    matches!(self, TicketStatus::Issued | TicketStatus::Transferred)
  }
}

/// One admission unit.
///
/// `redeemed_at` is set exactly when `status == Redeemed` and never changes
/// afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ticket {
  pub id: TicketId,
  pub order_id: OrderId,
  pub event_id: EventId,
  pub tier_id: TierId,
  pub owner_id: IdentityId,
  /// Name printed on the door receipt.
  pub holder_name: Option<String>,
  /// Value encoded in the QR code presented at the door.
  pub token: String,
  pub status: TicketStatus,
  pub redeemed_at: Option<DateTime<Utc>>,
}

impl Ticket {
  pub fn is_redeemed(&self) -> bool {
    self.redeemed_at.is_some()
  }
}
