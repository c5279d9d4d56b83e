// ticketcore/src/eligibility.rs

//! The one place refund eligibility is decided. Both the direct refund path
//! and refund request submission/review call `evaluate`; nothing stores its
//! result.

use crate::access::RoleSet;
use crate::model::{Event, IdentityId, Order, OrderStatus, Ticket};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EligibilityReason {
  NotOrderOwner,
  AlreadyRefunded,
  PartiallyRefunded,
  OrderNotPaid,
  RefundWindowClosed,
  TicketRedeemed,
}

impl EligibilityReason {
  pub fn as_str(self) -> &'static str {
    match self {
      EligibilityReason::NotOrderOwner => "not_order_owner",
      EligibilityReason::AlreadyRefunded => "already_refunded",
      EligibilityReason::PartiallyRefunded => "partially_refunded",
      EligibilityReason::OrderNotPaid => "order_not_paid",
      EligibilityReason::RefundWindowClosed => "refund_window_closed",
      EligibilityReason::TicketRedeemed => "ticket_redeemed",
    }
  }
}

impl fmt::Display for EligibilityReason {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
  Eligible,
  Ineligible(EligibilityReason),
}

impl Eligibility {
  pub fn is_eligible(&self) -> bool {
    matches!(self, Eligibility::Eligible)
  }

  pub fn reason(&self) -> Option<EligibilityReason> {
    match self {
      Eligibility::Eligible => None,
      Eligibility::Ineligible(reason) => Some(*reason),
    }
  }
}

/// Configurable refund rules.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RefundPolicy {
  /// Refunds close this long before the event starts.
  pub cutoff_before_start: Duration,
  /// Whole-order refunds are refused once any ticket has been scanned in.
  pub block_if_redeemed: bool,
}

impl Default for RefundPolicy {
  fn default() -> Self {
    Self {
      cutoff_before_start: Duration::hours(24),
      block_if_redeemed: true,
    }
  }
}

/// Everything `evaluate` looks at, read fresh by the caller.
#[derive(Debug, Clone, Copy)]
pub struct EligibilityInput<'a> {
  pub order: &'a Order,
  pub event: &'a Event,
  pub tickets: &'a [Ticket],
  pub requester: IdentityId,
  /// Roles of `requester` for the order's event.
  pub requester_roles: &'a RoleSet,
  pub now: DateTime<Utc>,
}

/// First failing rule wins.
pub fn evaluate(input: &EligibilityInput<'_>, policy: &RefundPolicy) -> Eligibility {
  use EligibilityReason::*;

  let is_buyer = input.order.buyer_id == input.requester;
  if !is_buyer && !input.requester_roles.can_manage_refunds() {
    return Eligibility::Ineligible(NotOrderOwner);
  }

  match input.order.status {
    OrderStatus::Paid => {}
    OrderStatus::Refunded => return Eligibility::Ineligible(AlreadyRefunded),
    OrderStatus::PartiallyRefunded => return Eligibility::Ineligible(PartiallyRefunded),
    OrderStatus::Pending | OrderStatus::Failed => return Eligibility::Ineligible(OrderNotPaid),
  }

  if input.now >= input.event.starts_at - policy.cutoff_before_start {
    return Eligibility::Ineligible(RefundWindowClosed);
  }

  if policy.block_if_redeemed && input.tickets.iter().any(Ticket::is_redeemed) {
    return Eligibility::Ineligible(TicketRedeemed);
  }

  Eligibility::Eligible
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::access::Role;
  use crate::model::TicketStatus;
  use crate::pricing::{quote, Currency};
  use chrono::TimeZone;
  use uuid::Uuid;

  struct Case {
    order: Order,
    event: Event,
    tickets: Vec<Ticket>,
    now: DateTime<Utc>,
  }

  fn case() -> Case {
    let now = Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap();
    let event = Event {
      id: Uuid::new_v4(),
      owner_id: Uuid::new_v4(),
      title: "Eligibility".to_string(),
      starts_at: now + Duration::days(3),
      ends_at: None,
    };
    let priced = quote(&[3000], Currency::usd()).unwrap();
    let order = Order::from_quote(
      Uuid::new_v4(),
      Uuid::new_v4(),
      "buyer@example.com",
      event.id,
      &priced,
      OrderStatus::Paid,
      Some("pi_elig".to_string()),
      now,
    );
    let ticket = Ticket {
      id: Uuid::new_v4(),
      order_id: order.id,
      event_id: event.id,
      tier_id: Uuid::new_v4(),
      owner_id: order.buyer_id,
      holder_name: None,
      token: "tkn_elig".to_string(),
      status: TicketStatus::Issued,
      redeemed_at: None,
    };
    Case {
      order,
      event,
      tickets: vec![ticket],
      now,
    }
  }

  fn check(c: &Case, requester: IdentityId, roles: &RoleSet) -> Eligibility {
    let input = EligibilityInput {
      order: &c.order,
      event: &c.event,
      tickets: &c.tickets,
      requester,
      requester_roles: roles,
      now: c.now,
    };
    evaluate(&input, &RefundPolicy::default())
  }

  #[test]
  fn buyer_of_a_paid_order_is_eligible() {
    let c = case();
    assert!(check(&c, c.order.buyer_id, &RoleSet::empty()).is_eligible());
  }

  #[test]
  fn strangers_are_rejected_before_order_state_is_looked_at() {
    let mut c = case();
    c.order.status = OrderStatus::Refunded;
    let verdict = check(&c, Uuid::new_v4(), &RoleSet::empty());
    assert_eq!(verdict.reason(), Some(EligibilityReason::NotOrderOwner));

    let manager = RoleSet::empty().with(Role::EventManager);
    assert_eq!(
      check(&c, Uuid::new_v4(), &manager).reason(),
      Some(EligibilityReason::AlreadyRefunded)
    );
  }

  #[test]
  fn window_closes_at_the_cutoff() {
    let mut c = case();
    c.now = c.event.starts_at - Duration::hours(24);
    assert_eq!(
      check(&c, c.order.buyer_id, &RoleSet::empty()).reason(),
      Some(EligibilityReason::RefundWindowClosed)
    );
    c.now = c.now - Duration::seconds(1);
    assert!(check(&c, c.order.buyer_id, &RoleSet::empty()).is_eligible());
  }

  #[test]
  fn any_redeemed_ticket_blocks_the_whole_order() {
    let mut c = case();
    c.tickets[0].status = TicketStatus::Redeemed;
    c.tickets[0].redeemed_at = Some(c.now);
    assert_eq!(
      check(&c, c.order.buyer_id, &RoleSet::empty()).reason(),
      Some(EligibilityReason::TicketRedeemed)
    );

    let lenient = RefundPolicy {
      block_if_redeemed: false,
      ..RefundPolicy::default()
    };
    let no_roles = RoleSet::empty();
    let input = EligibilityInput {
      order: &c.order,
      event: &c.event,
      tickets: &c.tickets,
      requester: c.order.buyer_id,
      requester_roles: &no_roles,
      now: c.now,
    };
    assert!(evaluate(&input, &lenient).is_eligible());
  }
}
