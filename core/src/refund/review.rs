// ticketcore/src/refund/review.rs

//! Buyer refund requests and their review by event managers.
//!
//! A request is claimed with a compare-and-swap out of `pending` before
//! anything else happens, so only one reviewer ever acts on it. Approval is
//! recorded first and then handed to `RefundProcessor`; if that does not end
//! in a refund the request goes back to `pending`.

use super::processing::{LedgerStatus, RefundOutcome, RefundProcessor, RefundReceipt};
use crate::access::effective_roles;
use crate::eligibility::{evaluate, Eligibility, EligibilityInput, EligibilityReason};
use crate::environment::Environment;
use crate::error::CoreError;
use crate::flow::{ContextData, Flow, FlowControl, FlowError, SkipCondition};
use crate::model::{
  Event, IdentityId, Order, OrderId, RefundReason, RefundRequest, RefundRequestId, RefundRequestStatus, ReviewStamp,
};
use crate::notify::NotificationIntent;
use crate::store::RequestUpdate;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

pub const STEP_LOAD_REQUEST: &str = "load_request";
pub const STEP_AUTHORIZE_REVIEWER: &str = "authorize_reviewer";
pub const STEP_CLAIM_REQUEST: &str = "claim_request";
pub const STEP_DECLINE: &str = "decline";
pub const STEP_PROCESS_REFUND: &str = "process_refund";

const FLOW_NAME: &str = "refund_review";
const MAX_DETAIL_CHARS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReviewAction {
  Approve,
  Decline,
}

/// Whether a processed review's request points at its ledger entry yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestLink {
  Linked,
  /// The refund went through but the request is still `approved`. The next
  /// ledger replay for the refund (webhook or sweep) completes it.
  Pending,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReviewOutcome {
  Declined {
    request: RefundRequest,
    notice: NotificationIntent,
  },
  Processed {
    request: RefundRequest,
    receipt: RefundReceipt,
    ledger: LedgerStatus,
    link: RequestLink,
    notice: NotificationIntent,
  },
  /// Approval could not be carried out. The request is pending again, or
  /// processed when an earlier refund had already settled the order.
  NotEligible {
    request_id: RefundRequestId,
    reason: EligibilityReason,
  },
}

pub struct ReviewContext {
  pub env: Arc<Environment>,
  pub processor: Arc<RefundProcessor>,
  pub request_id: RefundRequestId,
  pub action: ReviewAction,
  pub reviewer: IdentityId,
  pub note: Option<String>,
  pub request: Option<RefundRequest>,
  pub order: Option<Order>,
  pub event: Option<Event>,
  pub outcome: Option<ReviewOutcome>,
}

fn missing(what: &'static str) -> CoreError {
  CoreError::Workflow(FlowError::IncompleteRun {
    flow: FLOW_NAME,
    missing: what,
  })
}

fn skip_unless(action: ReviewAction) -> SkipCondition<ReviewContext> {
  Arc::new(move |ctx: &ContextData<ReviewContext>| ctx.with(|c| c.action != action))
}

pub struct RefundReviewer {
  env: Arc<Environment>,
  processor: Arc<RefundProcessor>,
  flow: Flow<ReviewContext, CoreError>,
}

impl RefundReviewer {
  pub fn new(env: Arc<Environment>, processor: Arc<RefundProcessor>) -> Self {
    let mut flow: Flow<ReviewContext, CoreError> = Flow::new(
      FLOW_NAME,
      &[
        (STEP_LOAD_REQUEST, false, None),
        (STEP_AUTHORIZE_REVIEWER, false, None),
        (STEP_CLAIM_REQUEST, false, None),
        (STEP_DECLINE, false, Some(skip_unless(ReviewAction::Decline))),
        (STEP_PROCESS_REFUND, false, Some(skip_unless(ReviewAction::Approve))),
      ],
    );

    flow.on_step(STEP_LOAD_REQUEST, load_request);
    flow.on_step(STEP_AUTHORIZE_REVIEWER, authorize_reviewer);
    flow.on_step(STEP_CLAIM_REQUEST, claim_request);
    flow.on_step(STEP_DECLINE, decline);
    flow.on_step(STEP_PROCESS_REFUND, process_refund);

    Self { env, processor, flow }
  }

  pub fn flow_mut(&mut self) -> &mut Flow<ReviewContext, CoreError> {
    &mut self.flow
  }

  /// Files a refund request for `order_id`. The requester must be the buyer
  /// (or manage the event), the order must currently be eligible, and only
  /// one pending or approved request per order may exist.
  #[instrument(name = "RefundReviewer::submit", skip(self, detail))]
  pub async fn submit(
    &self,
    order_id: OrderId,
    reason: RefundReason,
    detail: Option<String>,
    requester: IdentityId,
  ) -> Result<RefundRequest, CoreError> {
    let detail = detail.map(|d| d.trim().to_string()).filter(|d| !d.is_empty());
    if reason == RefundReason::Other && detail.is_none() {
      return Err(CoreError::InvalidInput("a refund request with reason 'other' needs a detail".to_string()));
    }
    if detail.as_ref().map_or(false, |d| d.chars().count() > MAX_DETAIL_CHARS) {
      return Err(CoreError::InvalidInput(format!(
        "refund request detail is limited to {} characters",
        MAX_DETAIL_CHARS
      )));
    }

    let env = &self.env;
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
    let roles = effective_roles(env.access.as_ref(), requester, &event).await?;
    if order.buyer_id != requester && !roles.can_manage_refunds() {
      return Err(CoreError::AuthorizationDenied {
        identity: requester,
        event_id: event.id,
        action: "request a refund for this order",
      });
    }

    let tickets = env.orders.tickets_for_order(order_id).await?;
    let input = EligibilityInput {
      order: &order,
      event: &event,
      tickets: &tickets,
      requester,
      requester_roles: &roles,
      now: env.clock.now(),
    };
    if let Eligibility::Ineligible(reason) = evaluate(&input, &env.refund_policy) {
      return Err(CoreError::NotEligible { order_id, reason });
    }

    let request = RefundRequest {
      id: Uuid::new_v4(),
      order_id,
      requested_by: requester,
      reason,
      detail,
      status: RefundRequestStatus::Pending,
      review: None,
      ledger_refund_id: None,
      created_at: env.clock.now(),
    };
    if !env.requests.insert_if_none_open(request.clone()).await? {
      return Err(CoreError::DuplicateRequest { order_id });
    }

    info!(request_id = %request.id, "Review: refund request submitted.");
    Ok(request)
  }

  #[instrument(name = "RefundReviewer::review", skip(self, note))]
  pub async fn review(
    &self,
    request_id: RefundRequestId,
    action: ReviewAction,
    reviewer: IdentityId,
    note: Option<String>,
  ) -> Result<ReviewOutcome, CoreError> {
    let ctx = ContextData::new(ReviewContext {
      env: self.env.clone(),
      processor: self.processor.clone(),
      request_id,
      action,
      reviewer,
      note: note.map(|n| n.trim().to_string()).filter(|n| !n.is_empty()),
      request: None,
      order: None,
      event: None,
      outcome: None,
    });

    self.flow.run(ctx.clone()).await?;
    ctx.update(|c| c.outcome.take()).ok_or_else(|| missing("a review outcome"))
  }
}

async fn load_request(ctx: ContextData<ReviewContext>) -> Result<FlowControl, CoreError> {
  let (env, request_id) = ctx.with(|c| (c.env.clone(), c.request_id));

  let request = env
    .requests
    .request(request_id)
    .await?
    .ok_or_else(|| CoreError::not_found("refund request", request_id))?;
  let order = env
    .orders
    .order(request.order_id)
    .await?
    .ok_or_else(|| CoreError::not_found("order", request.order_id))?;
  let event = env
    .orders
    .event(order.event_id)
    .await?
    .ok_or_else(|| CoreError::not_found("event", order.event_id))?;

  ctx.update(|c| {
    c.request = Some(request);
    c.order = Some(order);
    c.event = Some(event);
  });
  Ok(FlowControl::Continue)
}

async fn authorize_reviewer(ctx: ContextData<ReviewContext>) -> Result<FlowControl, CoreError> {
  let (env, reviewer, event) = ctx.with(|c| (c.env.clone(), c.reviewer, c.event.clone()));
  let event = event.ok_or_else(|| missing("the order's event"))?;

  let roles = effective_roles(env.access.as_ref(), reviewer, &event).await?;
  if !roles.can_manage_refunds() {
    warn!(%reviewer, event_id = %event.id, "Review: reviewer not authorized.");
    return Err(CoreError::AuthorizationDenied {
      identity: reviewer,
      event_id: event.id,
      action: "review refund requests",
    });
  }
  Ok(FlowControl::Continue)
}

async fn claim_request(ctx: ContextData<ReviewContext>) -> Result<FlowControl, CoreError> {
  let (env, request_id, action, stamp) = ctx.with(|c| {
    let stamp = ReviewStamp {
      reviewer_id: c.reviewer,
      note: c.note.clone(),
      reviewed_at: c.env.clock.now(),
    };
    (c.env.clone(), c.request_id, c.action, stamp)
  });
  let status = match action {
    ReviewAction::Approve => RefundRequestStatus::Approved,
    ReviewAction::Decline => RefundRequestStatus::Declined,
  };

  let update = RequestUpdate::Claim { status, stamp };
  let claimed = env
    .requests
    .transition(request_id, RefundRequestStatus::Pending, update.clone())
    .await?;

  if !claimed {
    let current = env
      .requests
      .request(request_id)
      .await?
      .map(|r| r.status)
      .ok_or_else(|| CoreError::not_found("refund request", request_id))?;
    info!(%request_id, status = %current, "Review: request already reviewed.");
    return Err(CoreError::AlreadyReviewed {
      request_id,
      status: current,
    });
  }

  ctx.update(|c| {
    if let Some(request) = c.request.as_mut() {
      update.apply_to(request);
    }
  });
  Ok(FlowControl::Continue)
}

async fn decline(ctx: ContextData<ReviewContext>) -> Result<FlowControl, CoreError> {
  ctx.update(|c| {
    let (request, order) = match (&c.request, &c.order) {
      (Some(request), Some(order)) => (request.clone(), order),
      _ => return Err(missing("the claimed request")),
    };
    let notice = NotificationIntent::RefundDeclined {
      order_id: order.id,
      request_id: request.id,
      recipient_email: order.buyer_email.clone(),
      note: request.review.as_ref().and_then(|r| r.note.clone()),
    };
    info!(request_id = %request.id, "Review: request declined.");
    c.outcome = Some(ReviewOutcome::Declined { request, notice });
    Ok(FlowControl::Continue)
  })
}

async fn process_refund(ctx: ContextData<ReviewContext>) -> Result<FlowControl, CoreError> {
  let (env, processor, request, reviewer) =
    ctx.with(|c| (c.env.clone(), c.processor.clone(), c.request.clone(), c.reviewer));
  let mut request = request.ok_or_else(|| missing("the claimed request"))?;

  let result = processor.process_refund(request.order_id, request.reason, reviewer).await;

  let outcome = match result {
    Ok(RefundOutcome::Succeeded {
      receipt,
      ledger,
      notice,
    }) => {
      let link = link_request(&env, &mut request, &receipt.refund_id).await;
      info!(request_id = %request.id, refund_id = %receipt.refund_id, ?link, "Review: request processed.");
      ReviewOutcome::Processed {
        request,
        receipt,
        ledger,
        link,
        notice,
      }
    }
    Ok(RefundOutcome::NotEligible { reason }) => {
      if !(reason == EligibilityReason::AlreadyRefunded && settle_from_ledger(&env, &mut request).await?) {
        release(&env, request.id).await?;
      }
      ReviewOutcome::NotEligible {
        request_id: request.id,
        reason,
      }
    }
    Err(e) => {
      if let Err(release_err) = release(&env, request.id).await {
        error!(request_id = %request.id, error = %release_err, "Review: could not return request to pending.");
      }
      return Err(e);
    }
  };

  ctx.update(|c| c.outcome = Some(outcome));
  Ok(FlowControl::Continue)
}

/// Marks the approved request processed against `refund_id`. The synchronous
/// ledger write usually links it first, which shows up here as a request
/// already processed against the same refund.
async fn link_request(env: &Environment, request: &mut RefundRequest, refund_id: &str) -> RequestLink {
  let complete = RequestUpdate::Complete {
    ledger_refund_id: refund_id.to_string(),
  };
  match env
    .requests
    .transition(request.id, RefundRequestStatus::Approved, complete.clone())
    .await
  {
    Ok(true) => {
      complete.apply_to(request);
      return RequestLink::Linked;
    }
    Ok(false) => {}
    Err(e) => {
      error!(request_id = %request.id, %refund_id, error = %e, "Review: refund issued but request not marked processed.");
      return RequestLink::Pending;
    }
  }

  match env.requests.request(request.id).await {
    Ok(Some(current))
      if current.status == RefundRequestStatus::Processed
        && current.ledger_refund_id.as_deref() == Some(refund_id) =>
    {
      *request = current;
      RequestLink::Linked
    }
    Ok(_) => {
      error!(request_id = %request.id, %refund_id, "Review: approved request moved while refunding.");
      RequestLink::Pending
    }
    Err(e) => {
      error!(request_id = %request.id, %refund_id, error = %e, "Review: could not re-read request after refunding.");
      RequestLink::Pending
    }
  }
}

/// An approved request on an order that a ledger entry already refunds is
/// processed against that entry instead of going back to `pending`.
async fn settle_from_ledger(env: &Environment, request: &mut RefundRequest) -> Result<bool, CoreError> {
  let entries = env.ledger.entries_for_order(request.order_id).await?;
  let Some(latest) = entries.iter().max_by_key(|e| e.processed_at) else {
    return Ok(false);
  };
  let link = link_request(env, request, &latest.refund_id).await;
  if link == RequestLink::Linked {
    info!(request_id = %request.id, refund_id = %latest.refund_id, "Review: request settled by an existing refund.");
  }
  Ok(link == RequestLink::Linked)
}

async fn release(env: &Environment, request_id: RefundRequestId) -> Result<(), CoreError> {
  let released = env
    .requests
    .transition(request_id, RefundRequestStatus::Approved, RequestUpdate::Release)
    .await?;
  if released {
    info!(%request_id, "Review: approval rolled back to pending.");
  } else {
    warn!(%request_id, "Review: request was no longer approved at rollback.");
  }
  Ok(())
}
