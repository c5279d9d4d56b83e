// ticketcore/src/refund/processing.rs

//! Whole-order refunds initiated by someone who manages the event.
//!
//! Steps: resolve the order, authorize the initiator, evaluate eligibility,
//! call the processor once under an order-scoped idempotency key, then mirror
//! the refund into the ledger. Authorization and eligibility are decided
//! before anything external or mutating happens. A ledger write that fails
//! after the processor has paid out is reported as pending; the webhook or the
//! sweep completes it through the same `RefundReconciler::apply`.

use super::reconcile::{LedgerWriteRequest, RefundReconciler};
use crate::access::{effective_roles, Role, RoleSet};
use crate::eligibility::{evaluate, Eligibility, EligibilityInput, EligibilityReason};
use crate::environment::Environment;
use crate::error::CoreError;
use crate::flow::{ContextData, Flow, FlowControl, FlowError};
use crate::model::{Event, IdentityId, Order, OrderId, RefundReason, RefundType, Ticket};
use crate::notify::NotificationIntent;
use crate::pricing::Currency;
use crate::processor::{
  IdempotencyKey, ProcessorError, ProcessorRefund, ProcessorRefundStatus, RefundIssue, RefundMetadata,
};
use crate::store::LedgerWrite;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

pub const STEP_RESOLVE_ORDER: &str = "resolve_order";
pub const STEP_AUTHORIZE_INITIATOR: &str = "authorize_initiator";
pub const STEP_CHECK_ELIGIBILITY: &str = "check_eligibility";
pub const STEP_ISSUE_PROCESSOR_REFUND: &str = "issue_processor_refund";
pub const STEP_RECORD_LEDGER: &str = "record_ledger";

const FLOW_NAME: &str = "refund_processing";

/// What the processor reported for the refund.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundReceipt {
  pub refund_id: String,
  pub amount_cents: i64,
  pub currency: Currency,
  pub status: ProcessorRefundStatus,
  pub refund_type: RefundType,
}

/// Whether the local ledger mirrors the refund yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ledger", content = "write", rename_all = "snake_case")]
pub enum LedgerStatus {
  Recorded(LedgerWrite),
  /// The processor paid out but the ledger has not caught up; the
  /// asynchronous confirmation will complete it.
  Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefundOutcome {
  Succeeded {
    receipt: RefundReceipt,
    ledger: LedgerStatus,
    notice: NotificationIntent,
  },
  NotEligible {
    reason: EligibilityReason,
  },
}

pub struct RefundContext {
  pub env: Arc<Environment>,
  pub order_id: OrderId,
  pub reason: RefundReason,
  pub initiator: IdentityId,
  pub order: Option<Order>,
  pub event: Option<Event>,
  pub tickets: Vec<Ticket>,
  pub roles: RoleSet,
  pub refund_type: Option<RefundType>,
  pub ineligible: Option<EligibilityReason>,
  pub processor_refund: Option<ProcessorRefund>,
  pub ledger: Option<LedgerStatus>,
}

fn missing(what: &'static str) -> CoreError {
  CoreError::Workflow(FlowError::IncompleteRun {
    flow: FLOW_NAME,
    missing: what,
  })
}

/// `admin` when the platform steps in on an event it does not manage.
pub fn classify_refund(roles: &RoleSet) -> RefundType {
  if roles.contains(Role::PlatformAdmin) && !roles.contains(Role::EventManager) {
    RefundType::Admin
  } else {
    RefundType::Organizer
  }
}

pub struct RefundProcessor {
  env: Arc<Environment>,
  flow: Flow<RefundContext, CoreError>,
}

impl RefundProcessor {
  pub fn new(env: Arc<Environment>) -> Self {
    let mut flow: Flow<RefundContext, CoreError> = Flow::new(
      FLOW_NAME,
      &[
        (STEP_RESOLVE_ORDER, false, None),
        (STEP_AUTHORIZE_INITIATOR, false, None),
        (STEP_CHECK_ELIGIBILITY, false, None),
        (STEP_ISSUE_PROCESSOR_REFUND, false, None),
        (STEP_RECORD_LEDGER, false, None),
      ],
    );

    flow.on_step(STEP_RESOLVE_ORDER, resolve_order);
    flow.on_step(STEP_AUTHORIZE_INITIATOR, authorize_initiator);
    flow.on_step(STEP_CHECK_ELIGIBILITY, check_eligibility);
    flow.on_step(STEP_ISSUE_PROCESSOR_REFUND, issue_processor_refund);
    flow.on_step(STEP_RECORD_LEDGER, record_ledger);

    Self { env, flow }
  }

  pub fn flow_mut(&mut self) -> &mut Flow<RefundContext, CoreError> {
    &mut self.flow
  }

  #[instrument(name = "RefundProcessor::process_refund", skip(self))]
  pub async fn process_refund(
    &self,
    order_id: OrderId,
    reason: RefundReason,
    initiator: IdentityId,
  ) -> Result<RefundOutcome, CoreError> {
    let ctx = ContextData::new(RefundContext {
      env: self.env.clone(),
      order_id,
      reason,
      initiator,
      order: None,
      event: None,
      tickets: Vec::new(),
      roles: RoleSet::empty(),
      refund_type: None,
      ineligible: None,
      processor_refund: None,
      ledger: None,
    });

    self.flow.run(ctx.clone()).await?;

    let (ineligible, order, refund, refund_type, ledger) =
      ctx.update(|c| (c.ineligible, c.order.take(), c.processor_refund.take(), c.refund_type, c.ledger));
    if let Some(reason) = ineligible {
      info!(%reason, "Refund: order not eligible.");
      return Ok(RefundOutcome::NotEligible { reason });
    }

    let order = order.ok_or_else(|| missing("the resolved order"))?;
    let refund = refund.ok_or_else(|| missing("a processor refund"))?;
    let refund_type = refund_type.ok_or_else(|| missing("a refund type"))?;
    let ledger = ledger.unwrap_or(LedgerStatus::Pending);

    let notice = NotificationIntent::RefundIssued {
      order_id: order.id,
      recipient_email: order.buyer_email.clone(),
      amount_cents: refund.amount_cents,
      currency: refund.currency.clone(),
      refund_id: refund.refund_id.clone(),
    };
    let receipt = RefundReceipt {
      refund_id: refund.refund_id,
      amount_cents: refund.amount_cents,
      currency: refund.currency,
      status: refund.status,
      refund_type,
    };

    info!(refund_id = %receipt.refund_id, ?ledger, "Refund: processed.");
    Ok(RefundOutcome::Succeeded {
      receipt,
      ledger,
      notice,
    })
  }
}

async fn resolve_order(ctx: ContextData<RefundContext>) -> Result<FlowControl, CoreError> {
  let (env, order_id) = ctx.with(|c| (c.env.clone(), c.order_id));

  let order = env
    .orders
    .order(order_id)
    .await?
    .ok_or_else(|| CoreError::not_found("order", order_id))?;
  let event = env
    .orders
    .event(order.event_id)
    .await?
    .ok_or_else(|| CoreError::not_found("event", order.event_id))?;

  ctx.update(|c| {
    c.order = Some(order);
    c.event = Some(event);
  });
  Ok(FlowControl::Continue)
}

async fn authorize_initiator(ctx: ContextData<RefundContext>) -> Result<FlowControl, CoreError> {
  let (env, initiator, event) = ctx.with(|c| (c.env.clone(), c.initiator, c.event.clone()));
  let event = event.ok_or_else(|| missing("the order's event"))?;

  let roles = effective_roles(env.access.as_ref(), initiator, &event).await?;
  if !roles.can_manage_refunds() {
    warn!(%initiator, event_id = %event.id, "Refund: initiator not authorized.");
    return Err(CoreError::AuthorizationDenied {
      identity: initiator,
      event_id: event.id,
      action: "refund orders",
    });
  }

  ctx.update(|c| {
    c.refund_type = Some(classify_refund(&roles));
    c.roles = roles;
  });
  Ok(FlowControl::Continue)
}

async fn check_eligibility(ctx: ContextData<RefundContext>) -> Result<FlowControl, CoreError> {
  let (env, order_id) = ctx.with(|c| (c.env.clone(), c.order_id));
  let tickets = env.orders.tickets_for_order(order_id).await?;
  let now = env.clock.now();

  ctx.update(|c| {
    c.tickets = tickets;
    let (order, event) = match (&c.order, &c.event) {
      (Some(order), Some(event)) => (order, event),
      _ => return Err(missing("the resolved order")),
    };
    let input = EligibilityInput {
      order,
      event,
      tickets: &c.tickets,
      requester: c.initiator,
      requester_roles: &c.roles,
      now,
    };
    match evaluate(&input, &c.env.refund_policy) {
      Eligibility::Eligible => Ok(FlowControl::Continue),
      Eligibility::Ineligible(reason) => {
        c.ineligible = Some(reason);
        Ok(FlowControl::Stop)
      }
    }
  })
}

async fn issue_processor_refund(ctx: ContextData<RefundContext>) -> Result<FlowControl, CoreError> {
  let (env, order, reason, initiator, refund_type) =
    ctx.with(|c| (c.env.clone(), c.order.clone(), c.reason, c.initiator, c.refund_type));
  let order = order.ok_or_else(|| missing("the resolved order"))?;
  let refund_type = refund_type.ok_or_else(|| missing("a refund type"))?;
  let payment_reference = order
    .payment_reference
    .clone()
    .ok_or_else(|| CoreError::InvalidInput(format!("order {} has no payment reference", order.id)))?;

  let attempt = env.ledger.entries_for_order(order.id).await?.len();
  let issue = RefundIssue {
    payment_reference,
    amount_cents: order.total_cents,
    currency: order.currency.clone(),
    idempotency_key: IdempotencyKey::for_refund(order.id, attempt),
    metadata: RefundMetadata {
      order_id: order.id,
      event_id: order.event_id,
      reason,
      initiator,
      refund_type,
    },
  };

  let refund = env.processor.issue_refund(&issue).await?;
  if refund.status == ProcessorRefundStatus::Failed {
    return Err(ProcessorError::Declined(format!("refund {} reported as failed", refund.refund_id)).into());
  }

  info!(refund_id = %refund.refund_id, key = %issue.idempotency_key, "Refund: processor accepted refund.");
  ctx.update(|c| c.processor_refund = Some(refund));
  Ok(FlowControl::Continue)
}

async fn record_ledger(ctx: ContextData<RefundContext>) -> Result<FlowControl, CoreError> {
  let (env, refund) = ctx.with(|c| (c.env.clone(), c.processor_refund.clone()));
  let refund = refund.ok_or_else(|| missing("a processor refund"))?;

  let status = if refund.status != ProcessorRefundStatus::Succeeded {
    info!(refund_id = %refund.refund_id, "Refund: processor still settling, ledger left to the confirmation.");
    LedgerStatus::Pending
  } else {
    let request = LedgerWriteRequest::from_processor(&refund, None, env.clock.now());
    match RefundReconciler::new(env.clone()).apply(request).await {
      Ok(write) => LedgerStatus::Recorded(write),
      Err(e) => {
        warn!(refund_id = %refund.refund_id, error = %e, "Refund: ledger write failed, awaiting confirmation.");
        LedgerStatus::Pending
      }
    }
  };

  ctx.update(|c| c.ledger = Some(status));
  Ok(FlowControl::Continue)
}
