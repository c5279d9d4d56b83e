// tests/refund_processing_tests.rs
mod common;

use chrono::Duration;
use common::*;
use serial_test::serial;
use ticketcore::model::{OrderStatus, RefundReason, RefundType, TicketStatus};
use ticketcore::processor::{IdempotencyKey, ProcessorRefundStatus};
use ticketcore::refund::{ConfirmationKind, ConfirmationResult, RefundConfirmation};
use ticketcore::{
  ErrorCode, EligibilityReason, LedgerStatus, LedgerWrite, NotificationIntent, ProcessorError, RedemptionValidator,
  RefundOutcome, RefundPolicy, RefundProcessor, RefundReconciler,
};

#[tokio::test]
#[serial]
async fn test_owner_refund_marks_everything_refunded() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, tickets) = fx.paid_order(3);
  let tier_id = tickets[0].tier_id;
  assert_eq!(fx.store.tier_sold(tier_id), 3);
  let processor = RefundProcessor::new(fx.env.clone());

  let outcome = processor
    .process_refund(order.id, RefundReason::EventCancelled, fx.owner)
    .await
    .unwrap();

  let (receipt, ledger, notice) = match outcome {
    RefundOutcome::Succeeded {
      receipt,
      ledger,
      notice,
    } => (receipt, ledger, notice),
    other => panic!("expected success, got {:?}", other),
  };
  assert_eq!(receipt.amount_cents, order.total_cents);
  assert_eq!(receipt.status, ProcessorRefundStatus::Succeeded);
  assert_eq!(receipt.refund_type, RefundType::Organizer);
  assert_eq!(ledger, LedgerStatus::Recorded(LedgerWrite::Applied));
  assert_eq!(
    notice,
    NotificationIntent::RefundIssued {
      order_id: order.id,
      recipient_email: "buyer@example.com".to_string(),
      amount_cents: order.total_cents,
      currency: order.currency.clone(),
      refund_id: receipt.refund_id.clone(),
    }
  );

  assert_eq!(fx.store.order_snapshot(order.id).unwrap().status, OrderStatus::Refunded);
  for ticket in &tickets {
    assert_eq!(fx.store.ticket_snapshot(ticket.id).unwrap().status, TicketStatus::Refunded);
  }
  assert_eq!(fx.store.tier_sold(tier_id), 0);

  let entries = fx.store.ledger_entries();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].refund_id, receipt.refund_id);
  assert_eq!(entries[0].reason, RefundReason::EventCancelled);
  assert_eq!(entries[0].initiator, fx.owner);

  let issued = fx.processor.refunds();
  assert_eq!(issued[0].metadata.order_id, order.id);
  assert_eq!(issued[0].metadata.event_id, fx.event.id);
}

#[tokio::test]
#[serial]
async fn test_refund_type_follows_initiator_roles() {
  setup_tracing();
  let fx = Fixture::new();
  let processor = RefundProcessor::new(fx.env.clone());

  let (order, _) = fx.paid_order(1);
  let outcome = processor.process_refund(order.id, RefundReason::Other, fx.platform_admin).await.unwrap();
  assert!(matches!(outcome, RefundOutcome::Succeeded { ref receipt, .. } if receipt.refund_type == RefundType::Admin));

  let (order, _) = fx.paid_order(1);
  let outcome = processor.process_refund(order.id, RefundReason::Other, fx.org_admin).await.unwrap();
  assert!(matches!(outcome, RefundOutcome::Succeeded { ref receipt, .. } if receipt.refund_type == RefundType::Organizer));
}

#[tokio::test]
#[serial]
async fn test_unauthorized_initiator_is_rejected_before_any_side_effect() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, _) = fx.paid_order(1);
  let processor = RefundProcessor::new(fx.env.clone());

  for identity in [fx.buyer, fx.scanner, fx.outsider] {
    let err = processor
      .process_refund(order.id, RefundReason::CannotAttend, identity)
      .await
      .unwrap_err();
    assert_eq!(err.code(), ErrorCode::AuthorizationDenied);
  }
  assert_eq!(fx.processor.issue_calls(), 0);
  assert_eq!(fx.store.order_snapshot(order.id).unwrap().status, OrderStatus::Paid);
}

#[tokio::test]
#[serial]
async fn test_ineligible_orders_never_reach_the_processor() {
  setup_tracing();
  let fx = Fixture::new();
  let processor = RefundProcessor::new(fx.env.clone());

  let (pending, _) = fx.order_for(&fx.event, 1, OrderStatus::Pending);
  let (partial, _) = fx.order_for(&fx.event, 1, OrderStatus::PartiallyRefunded);
  let (refunded, _) = fx.order_for(&fx.event, 1, OrderStatus::Refunded);
  let cases = [
    (pending.id, EligibilityReason::OrderNotPaid),
    (partial.id, EligibilityReason::PartiallyRefunded),
    (refunded.id, EligibilityReason::AlreadyRefunded),
  ];
  for (order_id, reason) in cases {
    let outcome = processor.process_refund(order_id, RefundReason::Other, fx.owner).await.unwrap();
    assert_eq!(outcome, RefundOutcome::NotEligible { reason });
  }

  // Inside the cutoff window.
  let (order, _) = fx.paid_order(1);
  fx.clock.set(fx.event.starts_at - Duration::hours(2));
  let outcome = processor.process_refund(order.id, RefundReason::Other, fx.owner).await.unwrap();
  assert_eq!(
    outcome,
    RefundOutcome::NotEligible {
      reason: EligibilityReason::RefundWindowClosed
    }
  );

  assert_eq!(fx.processor.issue_calls(), 0);
  assert!(fx.store.ledger_entries().is_empty());
}

#[tokio::test]
#[serial]
async fn test_redeemed_ticket_blocks_refund_only_when_configured() {
  setup_tracing();
  for block_if_redeemed in [true, false] {
    let fx = Fixture::with_policy(RefundPolicy {
      cutoff_before_start: Duration::zero(),
      block_if_redeemed,
    });
    let (order, tickets) = fx.paid_order(2);
    fx.doors_open();
    RedemptionValidator::new(fx.env.clone())
      .validate(fx.event.id, &tickets[0].token, fx.scanner)
      .await
      .unwrap();
    // Refunds close at start with a zero cutoff; step back before it.
    fx.clock.set(fx.event.starts_at - Duration::minutes(1));

    let outcome = RefundProcessor::new(fx.env.clone())
      .process_refund(order.id, RefundReason::Other, fx.owner)
      .await
      .unwrap();

    if block_if_redeemed {
      assert_eq!(
        outcome,
        RefundOutcome::NotEligible {
          reason: EligibilityReason::TicketRedeemed
        }
      );
    } else {
      assert!(matches!(outcome, RefundOutcome::Succeeded { .. }));
      // The scanned ticket keeps its redemption record.
      assert_eq!(fx.store.ticket_snapshot(tickets[0].id).unwrap().status, TicketStatus::Redeemed);
      assert_eq!(fx.store.ticket_snapshot(tickets[1].id).unwrap().status, TicketStatus::Refunded);
    }
  }
}

#[tokio::test]
#[serial]
async fn test_processor_failure_changes_nothing_locally() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, tickets) = fx.paid_order(1);
  let processor = RefundProcessor::new(fx.env.clone());
  fx.processor.fail_next(ProcessorError::Declined("insufficient balance".to_string()));

  let err = processor.process_refund(order.id, RefundReason::Other, fx.owner).await.unwrap_err();
  assert_eq!(err.code(), ErrorCode::ProcessorError);
  assert!(!err.is_retryable());
  assert_eq!(fx.store.order_snapshot(order.id).unwrap().status, OrderStatus::Paid);
  assert_eq!(fx.store.ticket_snapshot(tickets[0].id).unwrap().status, TicketStatus::Issued);
  assert!(fx.store.ledger_entries().is_empty());
}

#[tokio::test]
#[serial]
async fn test_retry_after_ambiguous_timeout_reuses_the_idempotency_key() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, _) = fx.paid_order(1);
  let processor = RefundProcessor::new(fx.env.clone());
  fx.processor.fail_next_after_commit(ProcessorError::Timeout);

  let err = processor.process_refund(order.id, RefundReason::Other, fx.owner).await.unwrap_err();
  assert!(err.is_retryable());

  let outcome = processor.process_refund(order.id, RefundReason::Other, fx.owner).await.unwrap();
  assert!(matches!(outcome, RefundOutcome::Succeeded { .. }));

  // Two calls, one refund.
  assert_eq!(fx.processor.issue_calls(), 2);
  assert_eq!(fx.processor.refunds().len(), 1);
  assert_eq!(fx.store.ledger_entries().len(), 1);
  assert_eq!(IdempotencyKey::for_refund(order.id, 0).as_str(), format!("refund:{}:0", order.id));
}

#[tokio::test]
#[serial]
async fn test_ledger_failure_is_pending_and_webhook_converges() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, tickets) = fx.paid_order(2);
  let processor = RefundProcessor::new(fx.env.clone());
  fx.store.fail_next_ledger_writes(1);

  let outcome = processor.process_refund(order.id, RefundReason::EventCancelled, fx.owner).await.unwrap();
  let receipt = match outcome {
    RefundOutcome::Succeeded { receipt, ledger, .. } => {
      assert_eq!(ledger, LedgerStatus::Pending);
      receipt
    }
    other => panic!("expected success, got {:?}", other),
  };
  assert_eq!(fx.store.order_snapshot(order.id).unwrap().status, OrderStatus::Paid);

  let refund = fx.processor.refunds().remove(0);
  let reconciler = RefundReconciler::new(fx.env.clone());
  let confirmation = RefundConfirmation {
    confirmation_id: "evt_1".to_string(),
    kind: ConfirmationKind::Succeeded,
    refund: refund.clone(),
  };
  assert_eq!(
    reconciler.confirm(confirmation.clone()).await.unwrap(),
    ConfirmationResult::Recorded(LedgerWrite::Applied)
  );
  // Redelivery of the same webhook is a no-op.
  assert_eq!(
    reconciler.confirm(confirmation).await.unwrap(),
    ConfirmationResult::Recorded(LedgerWrite::AlreadyRecorded)
  );

  let entries = fx.store.ledger_entries();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].refund_id, receipt.refund_id);
  assert_eq!(entries[0].confirmation_id.as_deref(), Some("evt_1"));
  assert_eq!(fx.store.order_snapshot(order.id).unwrap().status, OrderStatus::Refunded);
  for ticket in &tickets {
    assert_eq!(fx.store.ticket_snapshot(ticket.id).unwrap().status, TicketStatus::Refunded);
  }
}

#[tokio::test]
#[serial]
async fn test_webhook_after_synchronous_write_only_adds_confirmation() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, _) = fx.paid_order(1);
  RefundProcessor::new(fx.env.clone())
    .process_refund(order.id, RefundReason::Other, fx.owner)
    .await
    .unwrap();

  let refund = fx.processor.refunds().remove(0);
  let reconciler = RefundReconciler::new(fx.env.clone());
  let result = reconciler
    .confirm(RefundConfirmation {
      confirmation_id: "evt_late".to_string(),
      kind: ConfirmationKind::Succeeded,
      refund,
    })
    .await
    .unwrap();

  assert_eq!(result, ConfirmationResult::Recorded(LedgerWrite::Confirmed));
  assert_eq!(fx.store.ledger_entries().len(), 1);
}

#[tokio::test]
#[serial]
async fn test_pending_processor_refund_waits_for_confirmation() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, _) = fx.paid_order(1);
  fx.processor.settle_as(ProcessorRefundStatus::Pending);

  let outcome = RefundProcessor::new(fx.env.clone())
    .process_refund(order.id, RefundReason::Other, fx.owner)
    .await
    .unwrap();
  assert!(matches!(outcome, RefundOutcome::Succeeded { ledger: LedgerStatus::Pending, .. }));
  assert!(fx.store.ledger_entries().is_empty());

  let pending = fx.processor.refunds().remove(0);
  let reconciler = RefundReconciler::new(fx.env.clone());
  let ignored = reconciler
    .confirm(RefundConfirmation {
      confirmation_id: "evt_pending".to_string(),
      kind: ConfirmationKind::Pending,
      refund: pending.clone(),
    })
    .await
    .unwrap();
  assert_eq!(ignored, ConfirmationResult::Ignored);

  let settled = fx.processor.settle(&pending.refund_id, ProcessorRefundStatus::Succeeded).unwrap();
  let applied = reconciler
    .confirm(RefundConfirmation {
      confirmation_id: "evt_settled".to_string(),
      kind: ConfirmationKind::Succeeded,
      refund: settled,
    })
    .await
    .unwrap();
  assert_eq!(applied, ConfirmationResult::Recorded(LedgerWrite::Applied));
  assert_eq!(fx.store.order_snapshot(order.id).unwrap().status, OrderStatus::Refunded);
}

#[tokio::test]
#[serial]
async fn test_concurrent_ledger_writes_apply_once() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, tickets) = fx.paid_order(2);
  let tier_id = tickets[0].tier_id;
  fx.processor.settle_as(ProcessorRefundStatus::Pending);
  RefundProcessor::new(fx.env.clone())
    .process_refund(order.id, RefundReason::Other, fx.owner)
    .await
    .unwrap();
  let refund = fx
    .processor
    .settle(&fx.processor.refunds()[0].refund_id, ProcessorRefundStatus::Succeeded)
    .unwrap();

  let reconciler = RefundReconciler::new(fx.env.clone());
  let write = |id: &str| RefundConfirmation {
    confirmation_id: id.to_string(),
    kind: ConfirmationKind::Succeeded,
    refund: refund.clone(),
  };
  let (a, b) = tokio::join!(reconciler.confirm(write("evt_a")), reconciler.confirm(write("evt_b")));
  let mut results = vec![a.unwrap(), b.unwrap()];
  results.sort_by_key(|r| format!("{:?}", r));

  assert_eq!(
    results,
    vec![
      ConfirmationResult::Recorded(LedgerWrite::AlreadyRecorded),
      ConfirmationResult::Recorded(LedgerWrite::Applied),
    ]
  );
  assert_eq!(fx.store.ledger_entries().len(), 1);
  assert_eq!(fx.store.tier_sold(tier_id), 0);
}

#[tokio::test]
#[serial]
async fn test_reconciler_rejects_refunds_that_do_not_cover_the_order() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, _) = fx.paid_order(1);
  fx.processor.settle_as(ProcessorRefundStatus::Pending);
  RefundProcessor::new(fx.env.clone())
    .process_refund(order.id, RefundReason::Other, fx.owner)
    .await
    .unwrap();
  let mut refund = fx.processor.refunds().remove(0);
  refund.status = ProcessorRefundStatus::Succeeded;
  refund.amount_cents -= 1;

  let err = RefundReconciler::new(fx.env.clone())
    .confirm(RefundConfirmation {
      confirmation_id: "evt_short".to_string(),
      kind: ConfirmationKind::Succeeded,
      refund,
    })
    .await
    .unwrap_err();
  assert_eq!(err.code(), ErrorCode::InvalidInput);
  assert!(fx.store.ledger_entries().is_empty());
}

#[tokio::test]
#[serial]
async fn test_concurrent_refunds_of_one_order_issue_a_single_refund() {
  setup_tracing();
  let fx = Fixture::new();
  let (order, tickets) = fx.paid_order(2);
  let owner_side = RefundProcessor::new(fx.env.clone());
  let admin_side = RefundProcessor::new(fx.env.clone());

  let (first, second) = tokio::join!(
    owner_side.process_refund(order.id, RefundReason::EventCancelled, fx.owner),
    admin_side.process_refund(order.id, RefundReason::EventCancelled, fx.platform_admin),
  );

  let mut refund_ids = Vec::new();
  for outcome in [first.unwrap(), second.unwrap()] {
    match outcome {
      RefundOutcome::Succeeded { receipt, .. } => refund_ids.push(receipt.refund_id),
      RefundOutcome::NotEligible { reason } => assert_eq!(reason, EligibilityReason::AlreadyRefunded),
    }
  }
  assert!(!refund_ids.is_empty());
  refund_ids.dedup();
  assert_eq!(refund_ids.len(), 1);

  assert_eq!(fx.processor.refunds().len(), 1);
  let entries = fx.store.ledger_entries();
  assert_eq!(entries.len(), 1);
  assert_eq!(entries[0].refund_id, refund_ids[0]);
  assert_eq!(fx.store.order_snapshot(order.id).unwrap().status, OrderStatus::Refunded);
  assert_eq!(fx.store.tier_sold(tickets[0].tier_id), 0);
}
