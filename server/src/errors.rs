// ticketcore_server/src/errors.rs

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use thiserror::Error;
use ticketcore::{CoreError, ErrorCode, FlowError};

#[derive(Debug, Error)]
pub enum AppError {
  #[error("{0}")]
  Core(#[from] CoreError),

  #[error("Validation Error: {0}")]
  Validation(String),

  #[error("Authentication Failed: {0}")]
  Auth(String),

  #[error("Webhook signature rejected: {0}")]
  Signature(String),

  #[error("Configuration Error: {0}")]
  Config(String),

  #[error("Database Error: {0}")]
  Sqlx(#[from] sqlx::Error),

  #[error("Internal Server Error: {0}")]
  Internal(String),
}

impl From<FlowError> for AppError {
  fn from(err: FlowError) -> Self {
    AppError::Core(CoreError::Workflow(err))
  }
}

impl AppError {
  /// Stable code sent as the `error` field of every error body.
  pub fn code(&self) -> &'static str {
    match self {
      AppError::Core(e) => e.code().as_str(),
      AppError::Validation(_) => ErrorCode::InvalidInput.as_str(),
      AppError::Auth(_) => "unauthenticated",
      AppError::Signature(_) => "invalid_signature",
      AppError::Config(_) => "configuration_error",
      AppError::Sqlx(_) => ErrorCode::StoreUnavailable.as_str(),
      AppError::Internal(_) => "internal_error",
    }
  }
}

impl ResponseError for AppError {
  fn status_code(&self) -> StatusCode {
    match self {
      AppError::Core(e) => match e.code() {
        ErrorCode::AuthorizationDenied => StatusCode::FORBIDDEN,
        ErrorCode::NotEligible => StatusCode::UNPROCESSABLE_ENTITY,
        ErrorCode::AlreadyReviewed | ErrorCode::DuplicateRequest => StatusCode::CONFLICT,
        ErrorCode::ProcessorError if e.is_retryable() => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::ProcessorError => StatusCode::BAD_GATEWAY,
        ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorCode::WorkflowError => StatusCode::INTERNAL_SERVER_ERROR,
      },
      AppError::Validation(_) => StatusCode::BAD_REQUEST,
      AppError::Auth(_) | AppError::Signature(_) => StatusCode::UNAUTHORIZED,
      AppError::Sqlx(_) => StatusCode::SERVICE_UNAVAILABLE,
      AppError::Config(_) | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }

  fn error_response(&self) -> HttpResponse {
    let status = self.status_code();
    if status.is_server_error() {
      tracing::error!(application_error = %self, code = self.code(), "Responding with error");
    } else {
      tracing::info!(application_error = %self, code = self.code(), "Responding with client error");
    }

    // Database and configuration internals stay in the logs.
    let detail = match self {
      AppError::Sqlx(_) => "Database operation failed".to_string(),
      AppError::Config(_) => "Configuration issue".to_string(),
      other => other.to_string(),
    };
    HttpResponse::build(status).json(json!({ "error": self.code(), "detail": detail }))
  }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
  use super::*;
  use ticketcore::EligibilityReason;
  use uuid::Uuid;

  #[test]
  fn core_errors_map_to_http_statuses() {
    let not_eligible = AppError::from(CoreError::NotEligible {
      order_id: Uuid::new_v4(),
      reason: EligibilityReason::RefundWindowClosed,
    });
    assert_eq!(not_eligible.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(not_eligible.code(), "not_eligible");

    let denied = AppError::from(CoreError::AuthorizationDenied {
      identity: Uuid::new_v4(),
      event_id: Uuid::new_v4(),
      action: "scan tickets",
    });
    assert_eq!(denied.status_code(), StatusCode::FORBIDDEN);

    let timeout = AppError::from(CoreError::Processor(ticketcore::ProcessorError::Timeout));
    assert_eq!(timeout.status_code(), StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(timeout.code(), "processor_error");
  }

  #[test]
  fn signature_failures_are_unauthorized() {
    let err = AppError::Signature("stale timestamp".to_string());
    assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    assert_eq!(err.code(), "invalid_signature");
  }
}
