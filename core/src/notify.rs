// ticketcore/src/notify.rs

//! Outbound notification intents. The core never sends anything itself; the
//! caller hands these to whatever delivery collaborator is configured.

use crate::model::{OrderId, RefundRequestId};
use crate::pricing::Currency;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NotificationIntent {
  RefundIssued {
    order_id: OrderId,
    recipient_email: String,
    amount_cents: i64,
    currency: Currency,
    refund_id: String,
  },
  RefundDeclined {
    order_id: OrderId,
    request_id: RefundRequestId,
    recipient_email: String,
    note: Option<String>,
  },
}

impl NotificationIntent {
  pub fn recipient(&self) -> &str {
    match self {
      NotificationIntent::RefundIssued { recipient_email, .. }
      | NotificationIntent::RefundDeclined { recipient_email, .. } => recipient_email,
    }
  }

  pub fn order_id(&self) -> OrderId {
    match self {
      NotificationIntent::RefundIssued { order_id, .. } | NotificationIntent::RefundDeclined { order_id, .. } => {
        *order_id
      }
    }
  }
}
