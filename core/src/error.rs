// ticketcore/src/error.rs

use crate::eligibility::EligibilityReason;
use crate::flow::FlowError;
use crate::model::{EventId, IdentityId, OrderId, RefundRequestId, RefundRequestStatus};
use crate::processor::ProcessorError;
use crate::store::StoreError;
use thiserror::Error;

/// Every failure a core operation can report. Scan rejections and refund
/// ineligibility on the processing path are outcomes, not errors, and do not
/// appear here.
#[derive(Debug, Error)]
pub enum CoreError {
  #[error("Identity {identity} may not {action} for event {event_id}")]
  AuthorizationDenied {
    identity: IdentityId,
    event_id: EventId,
    action: &'static str,
  },

  #[error("Order {order_id} is not eligible for a refund: {reason}")]
  NotEligible { order_id: OrderId, reason: EligibilityReason },

  #[error("Refund request {request_id} was already reviewed (status: {status})")]
  AlreadyReviewed {
    request_id: RefundRequestId,
    status: RefundRequestStatus,
  },

  #[error("Order {order_id} already has an open refund request")]
  DuplicateRequest { order_id: OrderId },

  #[error("Payment processor error: {0}")]
  Processor(#[from] ProcessorError),

  #[error("Invalid input: {0}")]
  InvalidInput(String),

  #[error("{entity} {id} not found")]
  NotFound { entity: &'static str, id: String },

  #[error("Datastore error: {0}")]
  Store(#[from] StoreError),

  #[error("Workflow error: {0}")]
  Workflow(#[from] FlowError),
}

/// Stable, machine-readable error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
  AuthorizationDenied,
  NotEligible,
  AlreadyReviewed,
  DuplicateRequest,
  ProcessorError,
  InvalidInput,
  NotFound,
  StoreUnavailable,
  WorkflowError,
}

impl ErrorCode {
  pub fn as_str(self) -> &'static str {
    match self {
      ErrorCode::AuthorizationDenied => "authorization_denied",
      ErrorCode::NotEligible => "not_eligible",
      ErrorCode::AlreadyReviewed => "already_reviewed",
      ErrorCode::DuplicateRequest => "duplicate_request",
      ErrorCode::ProcessorError => "processor_error",
      ErrorCode::InvalidInput => "invalid_input",
      ErrorCode::NotFound => "not_found",
      ErrorCode::StoreUnavailable => "store_unavailable",
      ErrorCode::WorkflowError => "workflow_error",
    }
  }
}

impl std::fmt::Display for ErrorCode {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.write_str(self.as_str())
  }
}

impl CoreError {
  pub fn code(&self) -> ErrorCode {
    match self {
      CoreError::AuthorizationDenied { .. } => ErrorCode::AuthorizationDenied,
      CoreError::NotEligible { .. } => ErrorCode::NotEligible,
      CoreError::AlreadyReviewed { .. } => ErrorCode::AlreadyReviewed,
      CoreError::DuplicateRequest { .. } => ErrorCode::DuplicateRequest,
      CoreError::Processor(_) => ErrorCode::ProcessorError,
      CoreError::InvalidInput(_) => ErrorCode::InvalidInput,
      CoreError::NotFound { .. } => ErrorCode::NotFound,
      CoreError::Store(_) => ErrorCode::StoreUnavailable,
      CoreError::Workflow(_) => ErrorCode::WorkflowError,
    }
  }

  pub(crate) fn not_found(entity: &'static str, id: impl ToString) -> Self {
    CoreError::NotFound {
      entity,
      id: id.to_string(),
    }
  }

  /// Errors a caller may retry as-is (with the same idempotency key where one applies).
  pub fn is_retryable(&self) -> bool {
    match self {
      CoreError::Processor(e) => e.is_retryable(),
      CoreError::Store(e) => e.is_transient(),
      _ => false,
    }
  }
}

pub type CoreResult<T, E = CoreError> = std::result::Result<T, E>;
