// ticketcore_server/src/models/webhook.rs

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ticketcore::model::{EventId, IdentityId, OrderId, RefundReason, RefundType};
use ticketcore::processor::RefundMetadata;
use ticketcore::refund::{ConfirmationKind, RefundConfirmation};
use ticketcore::{Currency, ProcessorRefund, ProcessorRefundStatus};
use uuid::Uuid;

pub const REFUND_SUCCEEDED: &str = "refund.succeeded";
pub const REFUND_FAILED: &str = "refund.failed";
pub const REFUND_PENDING: &str = "refund.pending";

/// Body of a processor webhook delivery.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
  /// The processor's id for this notice; becomes the ledger confirmation id.
  pub id: String,
  #[serde(rename = "type")]
  pub event_type: String,
  pub data: RefundObject,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundObject {
  pub refund_id: String,
  pub order_id: OrderId,
  pub event_id: EventId,
  pub amount_cents: i64,
  pub currency: Currency,
  pub reason: RefundReason,
  pub initiator: IdentityId,
  pub refund_type: RefundType,
  #[serde(default)]
  pub created_at: Option<DateTime<Utc>>,
}

impl WebhookPayload {
  pub fn for_refund(refund: &ProcessorRefund) -> Self {
    let event_type = match refund.status {
      ProcessorRefundStatus::Succeeded => REFUND_SUCCEEDED,
      ProcessorRefundStatus::Failed => REFUND_FAILED,
      ProcessorRefundStatus::Pending => REFUND_PENDING,
    };
    Self {
      id: format!("evt_{}", Uuid::new_v4().simple()),
      event_type: event_type.to_string(),
      data: RefundObject {
        refund_id: refund.refund_id.clone(),
        order_id: refund.metadata.order_id,
        event_id: refund.metadata.event_id,
        amount_cents: refund.amount_cents,
        currency: refund.currency.clone(),
        reason: refund.metadata.reason,
        initiator: refund.metadata.initiator,
        refund_type: refund.metadata.refund_type,
        created_at: Some(refund.created_at),
      },
    }
  }

  /// `None` for notice types this server does not act on.
  pub fn kind(&self) -> Option<ConfirmationKind> {
    match self.event_type.as_str() {
      REFUND_SUCCEEDED => Some(ConfirmationKind::Succeeded),
      REFUND_FAILED => Some(ConfirmationKind::Failed),
      REFUND_PENDING | "refund.updated" => Some(ConfirmationKind::Pending),
      _ => None,
    }
  }

  pub fn into_confirmation(self, received_at: DateTime<Utc>) -> Option<RefundConfirmation> {
    let kind = self.kind()?;
    let status = match kind {
      ConfirmationKind::Succeeded => ProcessorRefundStatus::Succeeded,
      ConfirmationKind::Failed => ProcessorRefundStatus::Failed,
      ConfirmationKind::Pending => ProcessorRefundStatus::Pending,
    };
    let data = self.data;
    Some(RefundConfirmation {
      confirmation_id: self.id,
      kind,
      refund: ProcessorRefund {
        refund_id: data.refund_id,
        amount_cents: data.amount_cents,
        currency: data.currency,
        status,
        metadata: RefundMetadata {
          order_id: data.order_id,
          event_id: data.event_id,
          reason: data.reason,
          initiator: data.initiator,
          refund_type: data.refund_type,
        },
        created_at: data.created_at.unwrap_or(received_at),
      },
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use serde_json::json;

  #[test]
  fn parses_the_documented_shape() {
    let order_id = Uuid::new_v4();
    let body = json!({
      "id": "evt_1",
      "type": "refund.succeeded",
      "data": {
        "refund_id": "re_1",
        "order_id": order_id,
        "event_id": Uuid::new_v4(),
        "amount_cents": 5388,
        "currency": "usd",
        "reason": "cannot_attend",
        "initiator": Uuid::new_v4(),
        "refund_type": "organizer"
      }
    });
    let payload: WebhookPayload = serde_json::from_value(body).unwrap();
    assert_eq!(payload.data.currency, Currency::usd());

    let confirmation = payload.into_confirmation(Utc::now()).unwrap();
    assert_eq!(confirmation.confirmation_id, "evt_1");
    assert_eq!(confirmation.kind, ConfirmationKind::Succeeded);
    assert_eq!(confirmation.refund.metadata.order_id, order_id);
  }

  #[test]
  fn unknown_types_have_no_confirmation() {
    let refund = ProcessorRefund {
      refund_id: "re_2".to_string(),
      amount_cents: 100,
      currency: Currency::usd(),
      status: ProcessorRefundStatus::Succeeded,
      metadata: RefundMetadata {
        order_id: Uuid::new_v4(),
        event_id: Uuid::new_v4(),
        reason: RefundReason::Other,
        initiator: Uuid::new_v4(),
        refund_type: RefundType::Admin,
      },
      created_at: Utc::now(),
    };
    let mut payload = WebhookPayload::for_refund(&refund);
    assert_eq!(payload.event_type, REFUND_SUCCEEDED);

    payload.event_type = "charge.dispute.created".to_string();
    assert!(payload.into_confirmation(Utc::now()).is_none());
  }
}
