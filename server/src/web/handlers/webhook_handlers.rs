// ticketcore_server/src/web/handlers/webhook_handlers.rs

use actix_web::{web, HttpRequest, HttpResponse};
use tracing::instrument;

use crate::errors::AppError;
use crate::services::signature::SIGNATURE_HEADER;
use crate::state::AppState;

#[instrument(name = "handler::processor_webhook", skip(app_state, req, body), fields(payload_bytes = body.len()))]
pub async fn processor_webhook_handler(
  app_state: web::Data<AppState>,
  req: HttpRequest,
  body: web::Bytes,
) -> Result<HttpResponse, AppError> {
  let signature_header = req
    .headers()
    .get(SIGNATURE_HEADER)
    .and_then(|value| value.to_str().ok())
    .map(String::from);

  let ack = app_state.webhooks.handle(body, signature_header).await?;
  Ok(HttpResponse::Ok().json(ack))
}
