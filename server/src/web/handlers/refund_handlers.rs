// ticketcore_server/src/web/handlers/refund_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument};

use super::identity::Identity;
use crate::errors::AppError;
use crate::models::api::{DirectRefundRequest, RefundResponse, ReviewRequest, ReviewResponse, SubmitRefundRequest};
use crate::services::notifier;
use crate::state::AppState;
use ticketcore::model::{OrderId, RefundRequestId};

/// Organizer or platform-admin refund of a whole order.
#[instrument(
    name = "handler::direct_refund",
    skip(app_state, req_payload, initiator),
    fields(order_id = %order_id, initiator = %initiator.id, reason = %req_payload.reason)
)]
pub async fn direct_refund_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<OrderId>,
  req_payload: web::Json<DirectRefundRequest>,
  initiator: Identity,
) -> Result<HttpResponse, AppError> {
  let outcome = app_state
    .refunds
    .process_refund(order_id.into_inner(), req_payload.reason, initiator.id)
    .await?;

  let (body, notice) = RefundResponse::from_outcome(outcome);
  if let Some(notice) = notice {
    notifier::dispatch(&notice);
  }
  Ok(match body {
    RefundResponse::Refunded { .. } => HttpResponse::Ok().json(body),
    RefundResponse::NotEligible { .. } => HttpResponse::UnprocessableEntity().json(body),
  })
}

#[instrument(
    name = "handler::submit_refund_request",
    skip(app_state, req_payload, requester),
    fields(order_id = %order_id, requester = %requester.id, reason = %req_payload.reason)
)]
pub async fn submit_refund_request_handler(
  app_state: web::Data<AppState>,
  order_id: web::Path<OrderId>,
  req_payload: web::Json<SubmitRefundRequest>,
  requester: Identity,
) -> Result<HttpResponse, AppError> {
  let req_payload = req_payload.into_inner();
  let request = app_state
    .reviewer
    .submit(order_id.into_inner(), req_payload.reason, req_payload.detail, requester.id)
    .await?;
  info!(request_id = %request.id, "Refund request filed.");
  Ok(HttpResponse::Created().json(request))
}

#[instrument(
    name = "handler::review_refund_request",
    skip(app_state, req_payload, reviewer),
    fields(request_id = %request_id, reviewer = %reviewer.id, action = ?req_payload.action)
)]
pub async fn review_refund_request_handler(
  app_state: web::Data<AppState>,
  request_id: web::Path<RefundRequestId>,
  req_payload: web::Json<ReviewRequest>,
  reviewer: Identity,
) -> Result<HttpResponse, AppError> {
  let req_payload = req_payload.into_inner();
  let outcome = app_state
    .reviewer
    .review(request_id.into_inner(), req_payload.action, reviewer.id, req_payload.note)
    .await?;

  let (body, notice) = ReviewResponse::from_outcome(outcome);
  if let Some(notice) = notice {
    notifier::dispatch(&notice);
  }
  Ok(match body {
    ReviewResponse::NotEligible { .. } => HttpResponse::UnprocessableEntity().json(body),
    _ => HttpResponse::Ok().json(body),
  })
}
