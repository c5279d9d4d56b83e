// ticketcore/src/model/mod.rs

//! Records the core reads and writes. Identifiers are plain UUIDs; the aliases
//! only document which table a field points at.

pub mod event;
pub mod order;
pub mod refund;
pub mod scan;
pub mod ticket;

use uuid::Uuid;

pub type IdentityId = Uuid;
pub type EventId = Uuid;
pub type OrderId = Uuid;
pub type TicketId = Uuid;
pub type TierId = Uuid;
pub type RefundRequestId = Uuid;

pub use event::Event;
pub use order::{Order, OrderStatus};
pub use refund::{RefundLedgerEntry, RefundReason, RefundRequest, RefundRequestStatus, RefundType, ReviewStamp};
pub use scan::{ScanCode, ScanLogEntry, ScanOutcome};
pub use ticket::{Ticket, TicketStatus};

/// Error returned when parsing one of the status enums from its stored text.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value '{value}'")]
pub struct UnknownVariant {
  pub kind: &'static str,
  pub value: String,
}

/// Implements `as_str` and `FromStr` for a fieldless enum so every status has
/// exactly one textual form, shared by serde, the database and the logs.
macro_rules! text_enum {
  ($ty:ident, $kind:literal, { $($variant:ident => $text:literal),+ $(,)? }) => {
    impl $ty {
      pub fn as_str(&self) -> &'static str {
        match self {
          $($ty::$variant => $text,)+
        }
      }
    }

    impl std::fmt::Display for $ty {
      fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
      }
    }

    impl std::str::FromStr for $ty {
      type Err = $crate::model::UnknownVariant;

      fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
          $($text => Ok($ty::$variant),)+
          other => Err($crate::model::UnknownVariant {
            kind: $kind,
            value: other.to_string(),
          }),
        }
      }
    }
  };
}

pub(crate) use text_enum;
