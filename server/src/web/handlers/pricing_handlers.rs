// ticketcore_server/src/web/handlers/pricing_handlers.rs

use actix_web::{web, HttpResponse};
use tracing::{info, instrument};

use crate::errors::AppError;
use crate::models::api::QuoteRequest;
use ticketcore::{quote, Currency};

#[instrument(name = "handler::quote", skip(req_payload), fields(tickets = req_payload.face_values_cents.len()))]
pub async fn quote_handler(req_payload: web::Json<QuoteRequest>) -> Result<HttpResponse, AppError> {
  let req_payload = req_payload.into_inner();
  let currency = match req_payload.currency.as_deref() {
    Some(code) => Currency::new(code)?,
    None => Currency::usd(),
  };

  let priced = quote(&req_payload.face_values_cents, currency)?;
  info!(total_cents = priced.total_cents, "Quote computed.");
  Ok(HttpResponse::Ok().json(priced))
}
