// ticketcore_server/src/db/seed.rs

//! A small demo dataset so a fresh server has something to scan and refund.

use super::PgStore;
use chrono::{DateTime, Duration, Utc};
use ticketcore::access::Role;
use ticketcore::memory::{MemoryStore, StaticAccessControl};
use ticketcore::model::{Event, IdentityId, Order, OrderStatus, Ticket, TicketStatus, TierId};
use ticketcore::{quote, CoreError, Currency};
use tracing::info;
use uuid::Uuid;

const DEMO_FACE_CENTS: i64 = 4500;
const DEMO_TICKETS: usize = 2;

#[derive(Debug, Clone)]
pub struct DemoData {
  pub event: Event,
  pub tier_id: TierId,
  pub order: Order,
  pub tickets: Vec<Ticket>,
  pub scanner: IdentityId,
  pub platform_admin: IdentityId,
}

impl DemoData {
  /// An event two weeks out, one paid order for the buyer, a door scanner
  /// and a platform admin.
  pub fn build(now: DateTime<Utc>) -> Result<Self, CoreError> {
    let owner = Uuid::new_v4();
    let buyer = Uuid::new_v4();
    let starts_at = now + Duration::days(14);
    let event = Event {
      id: Uuid::new_v4(),
      owner_id: owner,
      title: "Demo Night".to_string(),
      starts_at,
      ends_at: Some(starts_at + Duration::hours(4)),
    };

    let priced = quote(&[DEMO_FACE_CENTS; DEMO_TICKETS], Currency::usd())?;
    let order = Order::from_quote(
      Uuid::new_v4(),
      buyer,
      "demo-buyer@example.com",
      event.id,
      &priced,
      OrderStatus::Paid,
      Some(format!("pi_demo_{}", Uuid::new_v4().simple())),
      now,
    );

    let tier_id = Uuid::new_v4();
    let tickets = (0..DEMO_TICKETS)
      .map(|i| Ticket {
        id: Uuid::new_v4(),
        order_id: order.id,
        event_id: event.id,
        tier_id,
        owner_id: buyer,
        holder_name: Some(format!("Demo Guest {}", i + 1)),
        token: format!("tkn_{}", Uuid::new_v4().simple()),
        status: TicketStatus::Issued,
        redeemed_at: None,
      })
      .collect();

    Ok(Self {
      event,
      tier_id,
      order,
      tickets,
      scanner: Uuid::new_v4(),
      platform_admin: Uuid::new_v4(),
    })
  }

  pub fn load_into_memory(&self, store: &MemoryStore, access: &StaticAccessControl) {
    store.insert_event(self.event.clone());
    store.insert_order(self.order.clone());
    for ticket in &self.tickets {
      store.insert_ticket(ticket.clone());
    }
    access.grant(self.scanner, self.event.id, Role::Scanner);
    access.grant_platform_admin(self.platform_admin);
    self.log();
  }

  pub async fn load_into_postgres(&self, store: &PgStore) -> Result<(), sqlx::Error> {
    store.insert_event(&self.event).await?;
    store
      .insert_tier(self.tier_id, self.event.id, "General Admission", DEMO_FACE_CENTS, 500)
      .await?;
    store.insert_order(&self.order).await?;
    for ticket in &self.tickets {
      store.insert_ticket(ticket).await?;
    }
    store.grant_role(self.scanner, Some(self.event.id), Role::Scanner).await?;
    store.grant_role(self.platform_admin, None, Role::PlatformAdmin).await?;
    self.log();
    Ok(())
  }

  fn log(&self) {
    let tokens: Vec<&str> = self.tickets.iter().map(|t| t.token.as_str()).collect();
    info!(
      event_id = %self.event.id,
      owner = %self.event.owner_id,
      buyer = %self.order.buyer_id,
      order_id = %self.order.id,
      scanner = %self.scanner,
      platform_admin = %self.platform_admin,
      ?tokens,
      "Demo data seeded."
    );
  }
}
