// ticketcore_server/src/db/rows.rs

//! Raw table rows and their conversion into core records. Every text column
//! holding an enum is parsed here; a value the core does not know is reported
//! as a corrupt row rather than silently mapped.

use chrono::{DateTime, Utc};
use sqlx::FromRow;
use std::str::FromStr;
use ticketcore::model::{
  Event, Order, RefundLedgerEntry, RefundRequest, ReviewStamp, ScanLogEntry, ScanOutcome, Ticket,
};
use ticketcore::{Currency, StoreError};
use uuid::Uuid;

fn parse<T>(entity: &'static str, id: impl ToString, raw: &str) -> Result<T, StoreError>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  raw.parse::<T>().map_err(|e| StoreError::Corrupt {
    entity,
    id: id.to_string(),
    detail: e.to_string(),
  })
}

fn currency(entity: &'static str, id: impl ToString, raw: &str) -> Result<Currency, StoreError> {
  Currency::new(raw).map_err(|e| StoreError::Corrupt {
    entity,
    id: id.to_string(),
    detail: e.to_string(),
  })
}

#[derive(Debug, Clone, FromRow)]
pub struct EventRow {
  pub id: Uuid,
  pub owner_id: Uuid,
  pub title: String,
  pub starts_at: DateTime<Utc>,
  pub ends_at: Option<DateTime<Utc>>,
}

impl From<EventRow> for Event {
  fn from(row: EventRow) -> Self {
    Event {
      id: row.id,
      owner_id: row.owner_id,
      title: row.title,
      starts_at: row.starts_at,
      ends_at: row.ends_at,
    }
  }
}

#[derive(Debug, Clone, FromRow)]
pub struct OrderRow {
  pub id: Uuid,
  pub buyer_id: Uuid,
  pub buyer_email: String,
  pub event_id: Uuid,
  pub subtotal_cents: i64,
  pub fees_cents: i64,
  pub total_cents: i64,
  pub currency: String,
  pub status: String,
  pub payment_reference: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl TryFrom<OrderRow> for Order {
  type Error = StoreError;

  fn try_from(row: OrderRow) -> Result<Self, Self::Error> {
    Ok(Order {
      status: parse("order", row.id, &row.status)?,
      currency: currency("order", row.id, &row.currency)?,
      id: row.id,
      buyer_id: row.buyer_id,
      buyer_email: row.buyer_email,
      event_id: row.event_id,
      subtotal_cents: row.subtotal_cents,
      fees_cents: row.fees_cents,
      total_cents: row.total_cents,
      payment_reference: row.payment_reference,
      created_at: row.created_at,
    })
  }
}

#[derive(Debug, Clone, FromRow)]
pub struct TicketRow {
  pub id: Uuid,
  pub order_id: Uuid,
  pub event_id: Uuid,
  pub tier_id: Uuid,
  pub owner_id: Uuid,
  pub holder_name: Option<String>,
  pub token: String,
  pub status: String,
  pub redeemed_at: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRow> for Ticket {
  type Error = StoreError;

  fn try_from(row: TicketRow) -> Result<Self, Self::Error> {
    Ok(Ticket {
      status: parse("ticket", row.id, &row.status)?,
      id: row.id,
      order_id: row.order_id,
      event_id: row.event_id,
      tier_id: row.tier_id,
      owner_id: row.owner_id,
      holder_name: row.holder_name,
      token: row.token,
      redeemed_at: row.redeemed_at,
    })
  }
}

#[derive(Debug, Clone, FromRow)]
pub struct ScanRow {
  pub id: Uuid,
  pub event_id: Uuid,
  pub ticket_id: Option<Uuid>,
  pub scanner_id: Uuid,
  pub code: String,
  pub detail: serde_json::Value,
  pub scanned_at: DateTime<Utc>,
}

impl TryFrom<ScanRow> for ScanLogEntry {
  type Error = StoreError;

  fn try_from(row: ScanRow) -> Result<Self, Self::Error> {
    let detail = ScanOutcome::from_detail_json(row.detail).map_err(|e| StoreError::Corrupt {
      entity: "scan log entry",
      id: row.id.to_string(),
      detail: e.to_string(),
    })?;
    Ok(ScanLogEntry {
      code: parse("scan log entry", row.id, &row.code)?,
      id: row.id,
      event_id: row.event_id,
      ticket_id: row.ticket_id,
      scanner_id: row.scanner_id,
      detail,
      scanned_at: row.scanned_at,
    })
  }
}

#[derive(Debug, Clone, FromRow)]
pub struct RefundRequestRow {
  pub id: Uuid,
  pub order_id: Uuid,
  pub requested_by: Uuid,
  pub reason: String,
  pub detail: Option<String>,
  pub status: String,
  pub reviewer_id: Option<Uuid>,
  pub review_note: Option<String>,
  pub reviewed_at: Option<DateTime<Utc>>,
  pub ledger_refund_id: Option<String>,
  pub created_at: DateTime<Utc>,
}

impl TryFrom<RefundRequestRow> for RefundRequest {
  type Error = StoreError;

  fn try_from(row: RefundRequestRow) -> Result<Self, Self::Error> {
    let review = match (row.reviewer_id, row.reviewed_at) {
      (Some(reviewer_id), Some(reviewed_at)) => Some(ReviewStamp {
        reviewer_id,
        note: row.review_note,
        reviewed_at,
      }),
      _ => None,
    };
    Ok(RefundRequest {
      reason: parse("refund request", row.id, &row.reason)?,
      status: parse("refund request", row.id, &row.status)?,
      id: row.id,
      order_id: row.order_id,
      requested_by: row.requested_by,
      detail: row.detail,
      review,
      ledger_refund_id: row.ledger_refund_id,
      created_at: row.created_at,
    })
  }
}

#[derive(Debug, Clone, FromRow)]
pub struct LedgerRow {
  pub refund_id: String,
  pub order_id: Uuid,
  pub amount_cents: i64,
  pub currency: String,
  pub confirmation_id: Option<String>,
  pub reason: String,
  pub initiator: Uuid,
  pub refund_type: String,
  pub processed_at: DateTime<Utc>,
}

impl TryFrom<LedgerRow> for RefundLedgerEntry {
  type Error = StoreError;

  fn try_from(row: LedgerRow) -> Result<Self, Self::Error> {
    Ok(RefundLedgerEntry {
      currency: currency("refund ledger entry", &row.refund_id, &row.currency)?,
      reason: parse("refund ledger entry", &row.refund_id, &row.reason)?,
      refund_type: parse("refund ledger entry", &row.refund_id, &row.refund_type)?,
      refund_id: row.refund_id,
      order_id: row.order_id,
      amount_cents: row.amount_cents,
      confirmation_id: row.confirmation_id,
      initiator: row.initiator,
      processed_at: row.processed_at,
    })
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::TimeZone;
  use ticketcore::model::{RefundReason, RefundRequestStatus, TicketStatus};

  fn at() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).unwrap()
  }

  #[test]
  fn ticket_rows_parse_their_status() {
    let row = TicketRow {
      id: Uuid::new_v4(),
      order_id: Uuid::new_v4(),
      event_id: Uuid::new_v4(),
      tier_id: Uuid::new_v4(),
      owner_id: Uuid::new_v4(),
      holder_name: None,
      token: "tok".to_string(),
      status: "transferred".to_string(),
      redeemed_at: None,
    };
    let ticket = Ticket::try_from(row).unwrap();
    assert_eq!(ticket.status, TicketStatus::Transferred);
  }

  #[test]
  fn unknown_status_text_is_a_corrupt_row() {
    let id = Uuid::new_v4();
    let row = RefundRequestRow {
      id,
      order_id: Uuid::new_v4(),
      requested_by: Uuid::new_v4(),
      reason: "cannot_attend".to_string(),
      detail: None,
      status: "escalated".to_string(),
      reviewer_id: None,
      review_note: None,
      reviewed_at: None,
      ledger_refund_id: None,
      created_at: at(),
    };
    match RefundRequest::try_from(row) {
      Err(StoreError::Corrupt { entity, id: bad_id, .. }) => {
        assert_eq!(entity, "refund request");
        assert_eq!(bad_id, id.to_string());
      }
      other => panic!("expected a corrupt row, got {:?}", other),
    }
  }

  #[test]
  fn review_stamp_needs_reviewer_and_time() {
    let reviewer = Uuid::new_v4();
    let row = RefundRequestRow {
      id: Uuid::new_v4(),
      order_id: Uuid::new_v4(),
      requested_by: Uuid::new_v4(),
      reason: "other".to_string(),
      detail: Some("moved abroad".to_string()),
      status: "declined".to_string(),
      reviewer_id: Some(reviewer),
      review_note: Some("outside policy".to_string()),
      reviewed_at: Some(at()),
      ledger_refund_id: None,
      created_at: at(),
    };
    let request = RefundRequest::try_from(row).unwrap();
    assert_eq!(request.reason, RefundReason::Other);
    assert_eq!(request.status, RefundRequestStatus::Declined);
    assert_eq!(request.review.map(|r| r.reviewer_id), Some(reviewer));
  }
}
