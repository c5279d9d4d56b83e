// ticketcore/src/memory.rs

//! In-process implementations of every seam: a datastore, a role table and a
//! payment processor. Each store operation runs under one `parking_lot`
//! mutex, which gives it the same all-or-nothing behaviour the database
//! transactions have.

use crate::access::{AccessControl, Role, RoleSet};
use crate::clock::Clock;
use crate::model::{
  Event, EventId, IdentityId, Order, OrderId, OrderStatus, RefundLedgerEntry, RefundRequest, RefundRequestId,
  RefundRequestStatus, ScanLogEntry, Ticket, TicketId, TicketStatus, TierId,
};
use crate::processor::{PaymentProcessor, ProcessorError, ProcessorRefund, ProcessorRefundStatus, RefundIssue};
use crate::store::{
  LedgerWrite, OrderStore, RefundLedgerStore, RefundRequestStore, RequestUpdate, ScanLogStore, StoreError, TicketStore,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

#[derive(Default)]
struct Tables {
  events: HashMap<EventId, Event>,
  orders: HashMap<OrderId, Order>,
  tickets: HashMap<TicketId, Ticket>,
  tokens: HashMap<String, TicketId>,
  /// Tickets sold per tier; a refund gives the seat back.
  tier_sold: HashMap<TierId, i64>,
  scans: Vec<ScanLogEntry>,
  requests: HashMap<RefundRequestId, RefundRequest>,
  ledger: Vec<RefundLedgerEntry>,
}

#[derive(Default)]
pub struct MemoryStore {
  tables: Mutex<Tables>,
  /// Number of upcoming ledger writes that fail as if the database were down.
  failing_ledger_writes: Mutex<usize>,
  /// Number of upcoming `approved|pending -> processed` transitions that fail.
  failing_request_completions: Mutex<usize>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn insert_event(&self, event: Event) {
    self.tables.lock().events.insert(event.id, event);
  }

  pub fn insert_order(&self, order: Order) {
    self.tables.lock().orders.insert(order.id, order);
  }

  /// Adds a ticket and counts it against its tier.
  pub fn insert_ticket(&self, ticket: Ticket) {
    let mut tables = self.tables.lock();
    if !matches!(ticket.status, TicketStatus::Refunded | TicketStatus::Void) {
      *tables.tier_sold.entry(ticket.tier_id).or_insert(0) += 1;
    }
    tables.tokens.insert(ticket.token.clone(), ticket.id);
    tables.tickets.insert(ticket.id, ticket);
  }

  pub fn fail_next_ledger_writes(&self, count: usize) {
    *self.failing_ledger_writes.lock() = count;
  }

  pub fn fail_next_request_completions(&self, count: usize) {
    *self.failing_request_completions.lock() = count;
  }

  pub fn order_snapshot(&self, order_id: OrderId) -> Option<Order> {
    self.tables.lock().orders.get(&order_id).cloned()
  }

  pub fn ticket_snapshot(&self, ticket_id: TicketId) -> Option<Ticket> {
    self.tables.lock().tickets.get(&ticket_id).cloned()
  }

  pub fn request_snapshot(&self, request_id: RefundRequestId) -> Option<RefundRequest> {
    self.tables.lock().requests.get(&request_id).cloned()
  }

  pub fn scan_entries(&self) -> Vec<ScanLogEntry> {
    self.tables.lock().scans.clone()
  }

  pub fn ledger_entries(&self) -> Vec<RefundLedgerEntry> {
    self.tables.lock().ledger.clone()
  }

  pub fn tier_sold(&self, tier_id: TierId) -> i64 {
    self.tables.lock().tier_sold.get(&tier_id).copied().unwrap_or(0)
  }

  fn take_ledger_failure(&self) -> bool {
    take_one(&self.failing_ledger_writes)
  }

  fn take_completion_failure(&self) -> bool {
    take_one(&self.failing_request_completions)
  }
}

fn take_one(counter: &Mutex<usize>) -> bool {
  let mut remaining = counter.lock();
  if *remaining > 0 {
    *remaining -= 1;
    true
  } else {
    false
  }
}

#[async_trait]
impl OrderStore for MemoryStore {
  async fn order(&self, order_id: OrderId) -> Result<Option<Order>, StoreError> {
    Ok(self.order_snapshot(order_id))
  }

  async fn event(&self, event_id: EventId) -> Result<Option<Event>, StoreError> {
    Ok(self.tables.lock().events.get(&event_id).cloned())
  }

  async fn tickets_for_order(&self, order_id: OrderId) -> Result<Vec<Ticket>, StoreError> {
    let tables = self.tables.lock();
    let mut tickets: Vec<Ticket> = tables.tickets.values().filter(|t| t.order_id == order_id).cloned().collect();
    tickets.sort_by_key(|t| t.id);
    Ok(tickets)
  }
}

#[async_trait]
impl TicketStore for MemoryStore {
  async fn ticket_by_token(&self, token: &str) -> Result<Option<Ticket>, StoreError> {
    let tables = self.tables.lock();
    Ok(tables.tokens.get(token).and_then(|id| tables.tickets.get(id)).cloned())
  }

  async fn ticket(&self, ticket_id: TicketId) -> Result<Option<Ticket>, StoreError> {
    Ok(self.ticket_snapshot(ticket_id))
  }

  async fn redeem_if_unredeemed(&self, ticket_id: TicketId, at: DateTime<Utc>) -> Result<bool, StoreError> {
    let mut tables = self.tables.lock();
    match tables.tickets.get_mut(&ticket_id) {
      Some(ticket) if ticket.redeemed_at.is_none() && ticket.status.is_redeemable() => {
        ticket.status = TicketStatus::Redeemed;
        ticket.redeemed_at = Some(at);
        Ok(true)
      }
      _ => Ok(false),
    }
  }
}

#[async_trait]
impl ScanLogStore for MemoryStore {
  async fn append(&self, entry: ScanLogEntry) -> Result<(), StoreError> {
    self.tables.lock().scans.push(entry);
    Ok(())
  }

  async fn entries_for_event(&self, event_id: EventId) -> Result<Vec<ScanLogEntry>, StoreError> {
    let tables = self.tables.lock();
    Ok(tables.scans.iter().filter(|e| e.event_id == event_id).cloned().collect())
  }
}

#[async_trait]
impl RefundRequestStore for MemoryStore {
  async fn insert_if_none_open(&self, request: RefundRequest) -> Result<bool, StoreError> {
    let mut tables = self.tables.lock();
    let open = tables
      .requests
      .values()
      .any(|r| r.order_id == request.order_id && r.status.is_open());
    if open {
      return Ok(false);
    }
    tables.requests.insert(request.id, request);
    Ok(true)
  }

  async fn request(&self, request_id: RefundRequestId) -> Result<Option<RefundRequest>, StoreError> {
    Ok(self.request_snapshot(request_id))
  }

  async fn open_request_for_order(&self, order_id: OrderId) -> Result<Option<RefundRequest>, StoreError> {
    let tables = self.tables.lock();
    Ok(
      tables
        .requests
        .values()
        .find(|r| r.order_id == order_id && r.status.is_open())
        .cloned(),
    )
  }

  async fn transition(
    &self,
    request_id: RefundRequestId,
    expected: RefundRequestStatus,
    update: RequestUpdate,
  ) -> Result<bool, StoreError> {
    if matches!(update, RequestUpdate::Complete { .. }) && self.take_completion_failure() {
      return Err(StoreError::Unavailable("injected request completion failure".to_string()));
    }
    let mut tables = self.tables.lock();
    match tables.requests.get_mut(&request_id) {
      Some(request) if request.status == expected => {
        update.apply_to(request);
        Ok(true)
      }
      _ => Ok(false),
    }
  }
}

#[async_trait]
impl RefundLedgerStore for MemoryStore {
  async fn record_refund(&self, entry: RefundLedgerEntry) -> Result<LedgerWrite, StoreError> {
    if self.take_ledger_failure() {
      return Err(StoreError::Unavailable("injected ledger failure".to_string()));
    }

    let mut tables = self.tables.lock();

    if let Some(existing) = tables.ledger.iter_mut().find(|e| e.refund_id == entry.refund_id) {
      if existing.confirmation_id.is_none() && entry.confirmation_id.is_some() {
        existing.confirmation_id = entry.confirmation_id;
        return Ok(LedgerWrite::Confirmed);
      }
      return Ok(LedgerWrite::AlreadyRecorded);
    }

    let order_id = entry.order_id;
    let Tables {
      orders,
      tickets,
      tier_sold,
      ledger,
      ..
    } = &mut *tables;

    for ticket in tickets.values_mut().filter(|t| t.order_id == order_id) {
      if ticket.status.is_refundable() {
        ticket.status = TicketStatus::Refunded;
        if let Some(sold) = tier_sold.get_mut(&ticket.tier_id) {
          *sold = (*sold - 1).max(0);
        }
      }
    }
    if let Some(order) = orders.get_mut(&order_id) {
      if order.status == OrderStatus::Paid {
        order.status = OrderStatus::Refunded;
      }
    }
    debug!(refund_id = %entry.refund_id, %order_id, "MemoryStore: refund recorded.");
    ledger.push(entry);
    Ok(LedgerWrite::Applied)
  }

  async fn entry(&self, refund_id: &str) -> Result<Option<RefundLedgerEntry>, StoreError> {
    Ok(self.tables.lock().ledger.iter().find(|e| e.refund_id == refund_id).cloned())
  }

  async fn entries_for_order(&self, order_id: OrderId) -> Result<Vec<RefundLedgerEntry>, StoreError> {
    let tables = self.tables.lock();
    Ok(tables.ledger.iter().filter(|e| e.order_id == order_id).cloned().collect())
  }
}

/// A fixed role table.
#[derive(Default)]
pub struct StaticAccessControl {
  grants: Mutex<HashMap<(IdentityId, EventId), RoleSet>>,
  platform_admins: Mutex<HashSet<IdentityId>>,
}

impl StaticAccessControl {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn grant(&self, identity: IdentityId, event_id: EventId, role: Role) {
    self.grants.lock().entry((identity, event_id)).or_default().insert(role);
  }

  pub fn grant_platform_admin(&self, identity: IdentityId) {
    self.platform_admins.lock().insert(identity);
  }

}

#[async_trait]
impl AccessControl for StaticAccessControl {
  async fn roles_for(&self, identity: IdentityId, event_id: EventId) -> Result<RoleSet, StoreError> {
    let mut roles = self.grants.lock().get(&(identity, event_id)).cloned().unwrap_or_default();
    if self.platform_admins.lock().contains(&identity) {
      roles.insert(Role::PlatformAdmin);
    }
    Ok(roles)
  }
}

struct InjectedFailure {
  error: ProcessorError,
  /// The refund goes through before the error is reported, like a timeout
  /// after the processor already acted.
  after_commit: bool,
}

#[derive(Default)]
struct ProcessorState {
  by_key: HashMap<String, ProcessorRefund>,
  refunds: Vec<ProcessorRefund>,
  calls: usize,
  failures: VecDeque<InjectedFailure>,
  settle_as: Option<ProcessorRefundStatus>,
}

/// A payment processor that keeps refunds in memory and deduplicates them by
/// idempotency key.
pub struct MemoryProcessor {
  clock: Arc<dyn Clock>,
  state: Mutex<ProcessorState>,
}

impl MemoryProcessor {
  pub fn new(clock: Arc<dyn Clock>) -> Self {
    Self {
      clock,
      state: Mutex::new(ProcessorState::default()),
    }
  }

  /// The next call fails with `error` without creating a refund.
  pub fn fail_next(&self, error: ProcessorError) {
    self.state.lock().failures.push_back(InjectedFailure {
      error,
      after_commit: false,
    });
  }

  /// The next call creates the refund but reports `error` to the caller.
  pub fn fail_next_after_commit(&self, error: ProcessorError) {
    self.state.lock().failures.push_back(InjectedFailure {
      error,
      after_commit: true,
    });
  }

  /// Status given to newly created refunds (default `Succeeded`).
  pub fn settle_as(&self, status: ProcessorRefundStatus) {
    self.state.lock().settle_as = Some(status);
  }

  /// Marks a stored refund as settled, as the processor does before sending
  /// its confirmation.
  pub fn settle(&self, refund_id: &str, status: ProcessorRefundStatus) -> Option<ProcessorRefund> {
    let mut state = self.state.lock();
    let mut settled = None;
    for refund in state.refunds.iter_mut().filter(|r| r.refund_id == refund_id) {
      refund.status = status;
      settled = Some(refund.clone());
    }
    for refund in state.by_key.values_mut().filter(|r| r.refund_id == refund_id) {
      refund.status = status;
    }
    settled
  }

  pub fn issue_calls(&self) -> usize {
    self.state.lock().calls
  }

  pub fn refunds(&self) -> Vec<ProcessorRefund> {
    self.state.lock().refunds.clone()
  }
}

#[async_trait]
impl PaymentProcessor for MemoryProcessor {
  async fn issue_refund(&self, issue: &RefundIssue) -> Result<ProcessorRefund, ProcessorError> {
    let now = self.clock.now();
    let mut state = self.state.lock();
    state.calls += 1;

    let failure = state.failures.pop_front();
    if let Some(InjectedFailure {
      error,
      after_commit: false,
    }) = failure
    {
      return Err(error);
    }

    let key = issue.idempotency_key.as_str().to_string();
    let refund = match state.by_key.get(&key) {
      Some(existing) => existing.clone(),
      None => {
        let refund = ProcessorRefund {
          refund_id: format!("re_{}", Uuid::new_v4().simple()),
          amount_cents: issue.amount_cents,
          currency: issue.currency.clone(),
          status: state.settle_as.unwrap_or(ProcessorRefundStatus::Succeeded),
          metadata: issue.metadata.clone(),
          created_at: now,
        };
        state.by_key.insert(key, refund.clone());
        state.refunds.push(refund.clone());
        refund
      }
    };

    match failure {
      Some(InjectedFailure { error, .. }) => Err(error),
      None => Ok(refund),
    }
  }

  async fn refunds_since(&self, since: DateTime<Utc>) -> Result<Vec<ProcessorRefund>, ProcessorError> {
    let state = self.state.lock();
    Ok(state.refunds.iter().filter(|r| r.created_at >= since).cloned().collect())
  }
}
