// ticketcore_server/src/web/handlers/scan_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument};

use super::identity::Identity;
use crate::errors::AppError;
use crate::models::api::{ScanRequest, ScanResponse};
use crate::state::AppState;
use ticketcore::model::EventId;

/// Every presented token gets a 200 with its outcome; only store and
/// authorization failures surface as errors.
#[instrument(
    name = "handler::record_scan",
    skip(app_state, req_payload, scanner),
    fields(event_id = %event_id, scanner = %scanner.id)
)]
pub async fn record_scan_handler(
  app_state: web::Data<AppState>,
  event_id: web::Path<EventId>,
  req_payload: web::Json<ScanRequest>,
  scanner: Identity,
) -> Result<HttpResponse, AppError> {
  let outcome = app_state
    .redemption
    .validate(event_id.into_inner(), &req_payload.token, scanner.id)
    .await?;
  Ok(HttpResponse::Ok().json(ScanResponse::from(outcome)))
}

#[instrument(name = "handler::scan_log", skip(app_state, requester), fields(event_id = %event_id, requester = %requester.id))]
pub async fn scan_log_handler(
  app_state: web::Data<AppState>,
  event_id: web::Path<EventId>,
  requester: Identity,
) -> Result<HttpResponse, AppError> {
  let entries = app_state.redemption.scan_log(event_id.into_inner(), requester.id).await?;
  info!(entries = entries.len(), "Scan log exported.");
  Ok(HttpResponse::Ok().json(entries))
}
