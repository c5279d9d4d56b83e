// tests/redemption_tests.rs
mod common;

use chrono::Duration;
use common::*;
use serial_test::serial;
use std::sync::Arc;
use ticketcore::model::{OrderStatus, ScanCode, ScanOutcome, TicketStatus};
use ticketcore::redemption::{ScanContext, STEP_REDEEM};
use ticketcore::{Clock, ContextData, CoreError, ErrorCode, FlowControl, RedemptionValidator};
use tokio::sync::Barrier;
use uuid::Uuid;

#[tokio::test]
#[serial]
async fn test_valid_then_duplicate_reports_original_time() {
  setup_tracing();
  let fx = Fixture::new();
  fx.doors_open();
  let (_, tickets) = fx.paid_order(1);
  let validator = RedemptionValidator::new(fx.env.clone());

  let first = validator.validate(fx.event.id, &tickets[0].token, fx.scanner).await.unwrap();
  let redeemed_at = match first {
    ScanOutcome::Valid {
      ticket_id,
      ref attendee,
      redeemed_at,
      ..
    } => {
      assert_eq!(ticket_id, tickets[0].id);
      assert_eq!(attendee.as_deref(), Some("Guest 1"));
      redeemed_at
    }
    other => panic!("expected valid, got {:?}", other),
  };

  fx.clock.advance(Duration::minutes(20));
  let second = validator.validate(fx.event.id, &tickets[0].token, fx.scanner).await.unwrap();
  assert_eq!(
    second,
    ScanOutcome::Duplicate {
      ticket_id: tickets[0].id,
      original_redeemed_at: redeemed_at,
    }
  );

  let stored = fx.store.ticket_snapshot(tickets[0].id).unwrap();
  assert_eq!(stored.status, TicketStatus::Redeemed);
  assert_eq!(stored.redeemed_at, Some(redeemed_at));

  let codes: Vec<ScanCode> = fx.store.scan_entries().iter().map(|e| e.code).collect();
  assert_eq!(codes, vec![ScanCode::Valid, ScanCode::Duplicate]);
}

#[tokio::test]
#[serial]
async fn test_wrong_event_wins_regardless_of_ticket_status() {
  setup_tracing();
  let fx = Fixture::new();
  fx.doors_open();
  let other_event = fx.add_event(fx.owner);
  let validator = RedemptionValidator::new(fx.env.clone());

  for status in [
    TicketStatus::Issued,
    TicketStatus::Transferred,
    TicketStatus::Redeemed,
    TicketStatus::Refunded,
    TicketStatus::Void,
  ] {
    let (_, tickets) = fx.order_for(&other_event, 1, OrderStatus::Paid);
    let mut ticket = tickets[0].clone();
    ticket.status = status;
    if status == TicketStatus::Redeemed {
      ticket.redeemed_at = Some(fx.clock.now());
    }
    fx.store.insert_ticket(ticket.clone());

    let outcome = validator.validate(fx.event.id, &ticket.token, fx.scanner).await.unwrap();
    assert_eq!(
      outcome,
      ScanOutcome::WrongEvent {
        ticket_id: ticket.id,
        ticket_event_id: other_event.id,
      },
      "status {:?}",
      status
    );
  }

  let entries = fx.store.scan_entries();
  assert_eq!(entries.len(), 5);
  assert!(entries.iter().all(|e| e.code == ScanCode::WrongEvent && e.event_id == fx.event.id));
}

#[tokio::test]
#[serial]
async fn test_terminal_statuses_are_rejected() {
  setup_tracing();
  let fx = Fixture::new();
  fx.doors_open();
  let validator = RedemptionValidator::new(fx.env.clone());

  let refunded = fx.ticket_with_status(TicketStatus::Refunded);
  let void = fx.ticket_with_status(TicketStatus::Void);

  assert_eq!(
    validator.validate(fx.event.id, &refunded.token, fx.scanner).await.unwrap(),
    ScanOutcome::Refunded { ticket_id: refunded.id }
  );
  assert_eq!(
    validator.validate(fx.event.id, &void.token, fx.scanner).await.unwrap(),
    ScanOutcome::Void { ticket_id: void.id }
  );
}

#[tokio::test]
#[serial]
async fn test_transferred_tickets_are_admitted() {
  setup_tracing();
  let fx = Fixture::new();
  fx.doors_open();
  let ticket = fx.ticket_with_status(TicketStatus::Transferred);
  let validator = RedemptionValidator::new(fx.env.clone());

  let outcome = validator.validate(fx.event.id, &ticket.token, fx.owner).await.unwrap();
  assert!(outcome.is_admitted());
}

#[tokio::test]
#[serial]
async fn test_unknown_and_blank_tokens_are_invalid_and_logged_without_ticket() {
  setup_tracing();
  let fx = Fixture::new();
  fx.doors_open();
  let validator = RedemptionValidator::new(fx.env.clone());

  let unknown = validator.validate(fx.event.id, "tkn_doesnotexist_at_all", fx.scanner).await.unwrap();
  assert_eq!(
    unknown,
    ScanOutcome::Invalid {
      presented_prefix: "tkn_doesnote".to_string()
    }
  );
  let blank = validator.validate(fx.event.id, "   ", fx.scanner).await.unwrap();
  assert_eq!(blank.code(), ScanCode::Invalid);

  let entries = fx.store.scan_entries();
  assert_eq!(entries.len(), 2);
  assert!(entries.iter().all(|e| e.ticket_id.is_none()));
}

#[tokio::test]
#[serial]
async fn test_expired_after_event_end() {
  setup_tracing();
  let fx = Fixture::new();
  let (_, tickets) = fx.paid_order(1);
  let closes_at = fx.event.ends_at.unwrap();
  fx.clock.set(closes_at + Duration::minutes(1));
  let validator = RedemptionValidator::new(fx.env.clone());

  let outcome = validator.validate(fx.event.id, &tickets[0].token, fx.scanner).await.unwrap();
  assert_eq!(
    outcome,
    ScanOutcome::Expired {
      ticket_id: tickets[0].id,
      event_closed_at: closes_at,
    }
  );
  assert_eq!(fx.store.ticket_snapshot(tickets[0].id).unwrap().status, TicketStatus::Issued);
}

#[tokio::test]
#[serial]
async fn test_unauthorized_scanner_is_an_error_and_not_logged() {
  setup_tracing();
  let fx = Fixture::new();
  fx.doors_open();
  let (_, tickets) = fx.paid_order(1);
  let validator = RedemptionValidator::new(fx.env.clone());

  // Admin roles do not open the door.
  for identity in [fx.outsider, fx.org_admin, fx.platform_admin] {
    let err = validator.validate(fx.event.id, &tickets[0].token, identity).await.unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthorizationDenied);
  }
  assert!(fx.store.scan_entries().is_empty());
  assert_eq!(fx.store.ticket_snapshot(tickets[0].id).unwrap().redeemed_at, None);
}

#[tokio::test]
#[serial]
async fn test_concurrent_scans_at_the_conditional_update_admit_once() {
  setup_tracing();
  for _ in 0..8 {
    let fx = Fixture::new();
    fx.doors_open();
    let (_, tickets) = fx.paid_order(1);

    // Hold both scans at the redeem step until both have passed every check.
    let barrier = Arc::new(Barrier::new(2));
    let mut validator = RedemptionValidator::new(fx.env.clone());
    let gate = barrier.clone();
    validator.flow_mut().before_step(STEP_REDEEM, move |_ctx: ContextData<ScanContext>| {
      let gate = gate.clone();
      async move {
        gate.wait().await;
        Ok::<_, CoreError>(FlowControl::Continue)
      }
    });

    let token = tickets[0].token.clone();
    let (a, b) = tokio::join!(
      validator.validate(fx.event.id, &token, fx.scanner),
      validator.validate(fx.event.id, &token, fx.owner),
    );
    let outcomes = [a.unwrap(), b.unwrap()];

    let valid: Vec<_> = outcomes.iter().filter(|o| o.is_admitted()).collect();
    assert_eq!(valid.len(), 1, "{:?}", outcomes);
    let redeemed_at = match valid[0] {
      ScanOutcome::Valid { redeemed_at, .. } => *redeemed_at,
      _ => unreachable!(),
    };
    assert!(outcomes.iter().any(|o| *o
      == ScanOutcome::Duplicate {
        ticket_id: tickets[0].id,
        original_redeemed_at: redeemed_at,
      }));
    assert_eq!(fx.store.scan_entries().len(), 2);
  }
}

#[tokio::test]
#[serial]
async fn test_scan_log_export_is_for_managers() {
  setup_tracing();
  let fx = Fixture::new();
  fx.doors_open();
  let (_, tickets) = fx.paid_order(2);
  let validator = RedemptionValidator::new(fx.env.clone());
  validator.validate(fx.event.id, &tickets[0].token, fx.scanner).await.unwrap();
  validator.validate(fx.event.id, &tickets[1].token, fx.scanner).await.unwrap();

  let log = validator.scan_log(fx.event.id, fx.owner).await.unwrap();
  assert_eq!(log.len(), 2);
  assert!(log.iter().all(|e| e.scanner_id == fx.scanner));

  let detail = log[0].detail.to_detail_json().unwrap();
  assert_eq!(detail["outcome"], "valid");

  let err = validator.scan_log(fx.event.id, fx.scanner).await.unwrap_err();
  assert_eq!(err.code(), ErrorCode::AuthorizationDenied);

  let err = validator.scan_log(Uuid::new_v4(), fx.owner).await.unwrap_err();
  assert_eq!(err.code(), ErrorCode::NotFound);
}
