// ticketcore/src/environment.rs

//! The collaborators and policies every workflow runs against.

use crate::access::AccessControl;
use crate::clock::Clock;
use crate::eligibility::RefundPolicy;
use crate::processor::PaymentProcessor;
use crate::store::{OrderStore, RefundLedgerStore, RefundRequestStore, ScanLogStore, TicketStore};
use chrono::Duration;
use std::sync::Arc;

/// Door-side rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedemptionPolicy {
  /// How long an event without a published end time stays open for scanning.
  pub default_event_duration: Duration,
}

impl Default for RedemptionPolicy {
  fn default() -> Self {
    Self {
      default_event_duration: Duration::hours(6),
    }
  }
}

#[derive(Clone)]
pub struct Environment {
  pub orders: Arc<dyn OrderStore>,
  pub tickets: Arc<dyn TicketStore>,
  pub scans: Arc<dyn ScanLogStore>,
  pub requests: Arc<dyn RefundRequestStore>,
  pub ledger: Arc<dyn RefundLedgerStore>,
  pub access: Arc<dyn AccessControl>,
  pub processor: Arc<dyn PaymentProcessor>,
  pub clock: Arc<dyn Clock>,
  pub refund_policy: RefundPolicy,
  pub redemption_policy: RedemptionPolicy,
}

impl Environment {
  /// Wires every store seam to one backing store.
  pub fn new<S>(
    store: Arc<S>,
    access: Arc<dyn AccessControl>,
    processor: Arc<dyn PaymentProcessor>,
    clock: Arc<dyn Clock>,
  ) -> Self
  where
    S: OrderStore + TicketStore + ScanLogStore + RefundRequestStore + RefundLedgerStore + 'static,
  {
    Self {
      orders: store.clone(),
      tickets: store.clone(),
      scans: store.clone(),
      requests: store.clone(),
      ledger: store,
      access,
      processor,
      clock,
      refund_policy: RefundPolicy::default(),
      redemption_policy: RedemptionPolicy::default(),
    }
  }

  pub fn with_refund_policy(mut self, policy: RefundPolicy) -> Self {
    self.refund_policy = policy;
    self
  }

  pub fn with_redemption_policy(mut self, policy: RedemptionPolicy) -> Self {
    self.redemption_policy = policy;
    self
  }
}

impl std::fmt::Debug for Environment {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("Environment")
      .field("refund_policy", &self.refund_policy)
      .field("redemption_policy", &self.redemption_policy)
      .finish_non_exhaustive()
  }
}
