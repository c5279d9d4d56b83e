// ticketcore_server/src/models/api.rs

//! Request and response bodies of the HTTP surface.

use serde::{Deserialize, Serialize};
use ticketcore::model::{RefundReason, RefundRequest, RefundRequestId, ScanCode, ScanOutcome};
use ticketcore::refund::RefundReceipt;
use ticketcore::{
  EligibilityReason, LedgerStatus, NotificationIntent, RefundOutcome, RequestLink, ReviewAction, ReviewOutcome,
};

#[derive(Debug, Deserialize)]
pub struct QuoteRequest {
  pub face_values_cents: Vec<i64>,
  #[serde(default)]
  pub currency: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
  pub token: String,
}

#[derive(Debug, Serialize)]
pub struct ScanResponse {
  pub admitted: bool,
  pub code: ScanCode,
  pub outcome: ScanOutcome,
}

impl From<ScanOutcome> for ScanResponse {
  fn from(outcome: ScanOutcome) -> Self {
    Self {
      admitted: outcome.is_admitted(),
      code: outcome.code(),
      outcome,
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct DirectRefundRequest {
  pub reason: RefundReason,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RefundResponse {
  Refunded { receipt: RefundReceipt, ledger: LedgerStatus },
  NotEligible { reason: EligibilityReason },
}

impl RefundResponse {
  /// Splits an outcome into the HTTP body and the notification to dispatch.
  pub fn from_outcome(outcome: RefundOutcome) -> (Self, Option<NotificationIntent>) {
    match outcome {
      RefundOutcome::Succeeded { receipt, ledger, notice } => (RefundResponse::Refunded { receipt, ledger }, Some(notice)),
      RefundOutcome::NotEligible { reason } => (RefundResponse::NotEligible { reason }, None),
    }
  }
}

#[derive(Debug, Deserialize)]
pub struct SubmitRefundRequest {
  pub reason: RefundReason,
  #[serde(default)]
  pub detail: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
  pub action: ReviewAction,
  #[serde(default)]
  pub note: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ReviewResponse {
  Declined {
    request: RefundRequest,
  },
  Processed {
    request: RefundRequest,
    receipt: RefundReceipt,
    ledger: LedgerStatus,
    link: RequestLink,
  },
  NotEligible {
    request_id: RefundRequestId,
    reason: EligibilityReason,
  },
}

impl ReviewResponse {
  pub fn from_outcome(outcome: ReviewOutcome) -> (Self, Option<NotificationIntent>) {
    match outcome {
      ReviewOutcome::Declined { request, notice } => (ReviewResponse::Declined { request }, Some(notice)),
      ReviewOutcome::Processed {
        request,
        receipt,
        ledger,
        link,
        notice,
      } => (
        ReviewResponse::Processed {
          request,
          receipt,
          ledger,
          link,
        },
        Some(notice),
      ),
      ReviewOutcome::NotEligible { request_id, reason } => (ReviewResponse::NotEligible { request_id, reason }, None),
    }
  }
}
