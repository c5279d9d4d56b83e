// ticketcore_server/src/web/routes.rs

use actix_web::web;

use crate::state::AppState;
use crate::web::handlers::{pricing_handlers, refund_handlers, scan_handlers, webhook_handlers};

async fn health_check_handler(app_state: web::Data<AppState>) -> actix_web::HttpResponse {
  actix_web::HttpResponse::Ok().json(serde_json::json!({
    "status": "ok",
    "store": format!("{:?}", app_state.config.store_backend).to_lowercase(),
  }))
}

pub fn configure_app_routes(cfg: &mut web::ServiceConfig) {
  cfg.service(
    web::scope("/api/v1")
      .route("/health", web::get().to(health_check_handler))
      .route("/pricing/quote", web::post().to(pricing_handlers::quote_handler))
      .service(
        web::resource("/events/{event_id}/scans")
          .route(web::post().to(scan_handlers::record_scan_handler))
          .route(web::get().to(scan_handlers::scan_log_handler)),
      )
      .service(
        web::scope("/orders/{order_id}")
          .route("/refund", web::post().to(refund_handlers::direct_refund_handler))
          .route(
            "/refund-requests",
            web::post().to(refund_handlers::submit_refund_request_handler),
          ),
      )
      .route(
        "/refund-requests/{request_id}/review",
        web::post().to(refund_handlers::review_refund_request_handler),
      )
      .route(
        "/webhooks/processor",
        web::post().to(webhook_handlers::processor_webhook_handler),
      ),
  );
}
