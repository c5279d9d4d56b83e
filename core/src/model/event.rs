// ticketcore/src/model/event.rs

use super::{EventId, IdentityId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
  pub id: EventId,
  pub owner_id: IdentityId,
  pub title: String,
  pub starts_at: DateTime<Utc>,
  /// Some listings never publish an end time.
  pub ends_at: Option<DateTime<Utc>>,
}

impl Event {
  /// The moment after which tickets for this event can no longer be redeemed.
  pub fn closes_at(&self, default_duration: Duration) -> DateTime<Utc> {
    self.ends_at.unwrap_or(self.starts_at + default_duration)
  }
}
