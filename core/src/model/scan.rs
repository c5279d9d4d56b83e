// ticketcore/src/model/scan.rs

use super::{text_enum, EventId, IdentityId, TicketId, TierId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable outcome codes, as stored in the scan log and shown to door staff.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanCode {
  Valid,
  Duplicate,
  Expired,
  Invalid,
  WrongEvent,
  Refunded,
  Void,
}

text_enum!(ScanCode, "scan outcome", {
  Valid => "valid",
  Duplicate => "duplicate",
  Expired => "expired",
  Invalid => "invalid",
  WrongEvent => "wrong_event",
  Refunded => "refunded",
  Void => "void",
});

/// Result of one redemption attempt. Every variant is an expected operating
/// state, not an error; each carries what the door UI and the audit log need.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ScanOutcome {
  Valid {
    ticket_id: TicketId,
    tier_id: TierId,
    attendee: Option<String>,
    redeemed_at: DateTime<Utc>,
  },
  Duplicate {
    ticket_id: TicketId,
    original_redeemed_at: DateTime<Utc>,
  },
  Expired {
    ticket_id: TicketId,
    event_closed_at: DateTime<Utc>,
  },
  Invalid {
    /// Leading characters of what was presented, for dispute lookups.
    presented_prefix: String,
  },
  WrongEvent {
    ticket_id: TicketId,
    ticket_event_id: EventId,
  },
  Refunded {
    ticket_id: TicketId,
  },
  Void {
    ticket_id: TicketId,
  },
}

impl ScanOutcome {
  pub fn code(&self) -> ScanCode {
    match self {
      ScanOutcome::Valid { .. } => ScanCode::Valid,
      ScanOutcome::Duplicate { .. } => ScanCode::Duplicate,
      ScanOutcome::Expired { .. } => ScanCode::Expired,
      ScanOutcome::Invalid { .. } => ScanCode::Invalid,
      ScanOutcome::WrongEvent { .. } => ScanCode::WrongEvent,
      ScanOutcome::Refunded { .. } => ScanCode::Refunded,
      ScanOutcome::Void { .. } => ScanCode::Void,
    }
  }

  pub fn ticket_id(&self) -> Option<TicketId> {
    match self {
      ScanOutcome::Valid { ticket_id, .. }
      | ScanOutcome::Duplicate { ticket_id, .. }
      | ScanOutcome::Expired { ticket_id, .. }
      | ScanOutcome::WrongEvent { ticket_id, .. }
      | ScanOutcome::Refunded { ticket_id }
      | ScanOutcome::Void { ticket_id } => Some(*ticket_id),
      ScanOutcome::Invalid { .. } => None,
    }
  }

  pub fn is_admitted(&self) -> bool {
    matches!(self, ScanOutcome::Valid { .. })
  }

  /// The outcome as the JSON blob stored in the scan log's detail column.
  pub fn to_detail_json(&self) -> serde_json::Result<serde_json::Value> {
    serde_json::to_value(self)
  }

  pub fn from_detail_json(value: serde_json::Value) -> serde_json::Result<Self> {
    serde_json::from_value(value)
  }
}

/// Append-only audit record of a redemption attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanLogEntry {
  pub id: Uuid,
  /// The event the scanner was admitting for.
  pub event_id: EventId,
  pub ticket_id: Option<TicketId>,
  pub scanner_id: IdentityId,
  pub code: ScanCode,
  pub detail: ScanOutcome,
  pub scanned_at: DateTime<Utc>,
}

impl ScanLogEntry {
  pub fn record(event_id: EventId, scanner_id: IdentityId, outcome: &ScanOutcome, scanned_at: DateTime<Utc>) -> Self {
    Self {
      id: Uuid::new_v4(),
      event_id,
      ticket_id: outcome.ticket_id(),
      scanner_id,
      code: outcome.code(),
      detail: outcome.clone(),
      scanned_at,
    }
  }
}
