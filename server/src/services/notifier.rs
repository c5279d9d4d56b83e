// ticketcore_server/src/services/notifier.rs

//! Hands notification intents to the external mail dispatcher, which tails
//! the `notifications` log target.

use ticketcore::NotificationIntent;
use tracing::{error, info};

pub const NOTIFICATION_TARGET: &str = "notifications";

pub fn subject_for(intent: &NotificationIntent) -> String {
  match intent {
    NotificationIntent::RefundIssued {
      amount_cents, currency, ..
    } => format!(
      "Your refund of {}.{:02} {} is on its way",
      amount_cents / 100,
      amount_cents % 100,
      currency
    ),
    NotificationIntent::RefundDeclined { .. } => "Update on your refund request".to_string(),
  }
}

pub fn dispatch(intent: &NotificationIntent) {
  match serde_json::to_string(intent) {
    Ok(payload) => info!(
      target: NOTIFICATION_TARGET,
      to = intent.recipient(),
      order_id = %intent.order_id(),
      subject = %subject_for(intent),
      %payload,
      "Notification queued."
    ),
    Err(e) => error!(order_id = %intent.order_id(), error = %e, "Notification could not be serialized."),
  }
}
