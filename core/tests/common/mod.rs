// tests/common/mod.rs
#![allow(dead_code)]

use chrono::{DateTime, Duration, TimeZone, Utc};
use once_cell::sync::Lazy;
use std::sync::Arc;
use ticketcore::flow::Handler;
use ticketcore::memory::{MemoryProcessor, MemoryStore, StaticAccessControl};
use ticketcore::model::{Event, IdentityId, Order, OrderStatus, Ticket, TicketStatus};
use ticketcore::{quote, Currency, Environment, FixedClock, FlowControl, FlowError, ContextData, RefundPolicy};
use tracing::Level;
use uuid::Uuid;

// --- Flow engine test context ---
#[derive(Clone, Debug, Default)]
pub struct TestContext {
  pub counter: i32,
  pub message: String,
  pub steps_executed: Vec<String>,
  pub should_stop_at: Option<String>,
}

#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum TestError {
  #[error("Flow error: {0}")]
  Flow(String),

  #[error("Test handler failed: {0}")]
  Handler(String),
}

impl From<FlowError> for TestError {
  fn from(fe: FlowError) -> Self {
    TestError::Flow(format!("{:?}", fe))
  }
}

pub fn create_simple_handler(step_name: &'static str, message_to_append: &'static str) -> Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      let mut guard = ctx.write();
      guard.counter += 1;
      guard.message.push_str(message_to_append);
      guard.steps_executed.push(step_name.to_string());
      if guard.should_stop_at.as_deref() == Some(step_name) {
        return Ok(FlowControl::Stop);
      }
      Ok(FlowControl::Continue)
    })
  })
}

pub fn create_failing_handler(step_name: &'static str, error_message: &'static str) -> Handler<TestContext, TestError> {
  Box::new(move |ctx: ContextData<TestContext>| {
    Box::pin(async move {
      ctx.write().steps_executed.push(step_name.to_string());
      Err(TestError::Handler(error_message.to_string()))
    })
  })
}

// --- Tracing ---
static TRACING_INIT: Lazy<()> = Lazy::new(|| {
  tracing_subscriber::fmt()
    .with_max_level(Level::DEBUG)
    .with_test_writer()
    .try_init()
    .ok();
});

pub fn setup_tracing() {
  Lazy::force(&TRACING_INIT);
}

// --- Ticketing fixture ---
pub fn base_time() -> DateTime<Utc> {
  Utc.with_ymd_and_hms(2026, 6, 1, 12, 0, 0).single().unwrap_or_else(Utc::now)
}

/// One event ten days out, a cast of identities, and in-memory collaborators.
pub struct Fixture {
  pub store: Arc<MemoryStore>,
  pub access: Arc<StaticAccessControl>,
  pub processor: Arc<MemoryProcessor>,
  pub clock: Arc<FixedClock>,
  pub env: Arc<Environment>,
  pub event: Event,
  pub owner: IdentityId,
  pub scanner: IdentityId,
  pub org_admin: IdentityId,
  pub platform_admin: IdentityId,
  pub buyer: IdentityId,
  pub outsider: IdentityId,
}

impl Fixture {
  pub fn new() -> Self {
    Self::with_policy(RefundPolicy::default())
  }

  pub fn with_policy(policy: RefundPolicy) -> Self {
    let clock = Arc::new(FixedClock::new(base_time()));
    let store = Arc::new(MemoryStore::new());
    let access = Arc::new(StaticAccessControl::new());
    let processor = Arc::new(MemoryProcessor::new(clock.clone()));

    let owner = Uuid::new_v4();
    let event = Event {
      id: Uuid::new_v4(),
      owner_id: owner,
      title: "Rooftop Sessions".to_string(),
      starts_at: base_time() + Duration::days(10),
      ends_at: Some(base_time() + Duration::days(10) + Duration::hours(4)),
    };
    store.insert_event(event.clone());

    let scanner = Uuid::new_v4();
    let org_admin = Uuid::new_v4();
    let platform_admin = Uuid::new_v4();
    access.grant(scanner, event.id, ticketcore::Role::Scanner);
    access.grant(org_admin, event.id, ticketcore::Role::OrgAdmin);
    access.grant_platform_admin(platform_admin);

    let env = Arc::new(
      Environment::new(store.clone(), access.clone(), processor.clone(), clock.clone()).with_refund_policy(policy),
    );

    Self {
      store,
      access,
      processor,
      clock,
      env,
      event,
      owner,
      scanner,
      org_admin,
      platform_admin,
      buyer: Uuid::new_v4(),
      outsider: Uuid::new_v4(),
    }
  }

  /// Moves the clock to one hour after doors open.
  pub fn doors_open(&self) {
    self.clock.set(self.event.starts_at + Duration::hours(1));
  }

  pub fn add_event(&self, owner: IdentityId) -> Event {
    let event = Event {
      id: Uuid::new_v4(),
      owner_id: owner,
      title: "Another Night".to_string(),
      starts_at: self.event.starts_at,
      ends_at: self.event.ends_at,
    };
    self.store.insert_event(event.clone());
    event
  }

  /// A paid order of `count` 25.00 tickets for the fixture event.
  pub fn paid_order(&self, count: usize) -> (Order, Vec<Ticket>) {
    self.order_for(&self.event, count, OrderStatus::Paid)
  }

  pub fn order_for(&self, event: &Event, count: usize, status: OrderStatus) -> (Order, Vec<Ticket>) {
    let faces = vec![2500; count];
    let priced = quote(&faces, Currency::usd()).unwrap();
    let order = Order::from_quote(
      Uuid::new_v4(),
      self.buyer,
      "buyer@example.com",
      event.id,
      &priced,
      status,
      Some(format!("pi_{}", Uuid::new_v4().simple())),
      base_time(),
    );
    self.store.insert_order(order.clone());

    let tier_id = Uuid::new_v4();
    let tickets: Vec<Ticket> = (0..count)
      .map(|i| Ticket {
        id: Uuid::new_v4(),
        order_id: order.id,
        event_id: event.id,
        tier_id,
        owner_id: self.buyer,
        holder_name: Some(format!("Guest {}", i + 1)),
        token: format!("tkn_{}", Uuid::new_v4().simple()),
        status: TicketStatus::Issued,
        redeemed_at: None,
      })
      .collect();
    for ticket in &tickets {
      self.store.insert_ticket(ticket.clone());
    }
    (order, tickets)
  }

  pub fn ticket_with_status(&self, status: TicketStatus) -> Ticket {
    let (_, tickets) = self.paid_order(1);
    let mut ticket = tickets[0].clone();
    ticket.status = status;
    self.store.insert_ticket(ticket.clone());
    ticket
  }
}
