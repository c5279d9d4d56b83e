// ticketcore_server/src/services/processor_mock.rs

//! A stand-in payment processor. Refunds are accepted as `pending`, settle
//! after a delay, and each settlement is handed to the webhook outbox, which
//! delivers it back to this server the way the real processor would.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use ticketcore::memory::MemoryProcessor;
use ticketcore::processor::RefundIssue;
use ticketcore::{Clock, PaymentProcessor, ProcessorError, ProcessorRefund, ProcessorRefundStatus};
use tokio::sync::mpsc;
use tracing::{info, instrument, warn};

/// Amounts ending in these cents are declined, so the failure path can be
/// exercised by hand.
const DECLINE_SUFFIX_CENTS: i64 = 13;

#[derive(Debug, Clone, Copy)]
pub struct SimulationTiming {
  pub latency: Duration,
  pub settle_after: Duration,
}

impl Default for SimulationTiming {
  fn default() -> Self {
    Self {
      latency: Duration::from_millis(50),
      settle_after: Duration::from_millis(500),
    }
  }
}

pub struct SimulatedProcessor {
  refunds: Arc<MemoryProcessor>,
  timing: SimulationTiming,
  settlements: mpsc::UnboundedSender<ProcessorRefund>,
}

impl SimulatedProcessor {
  pub fn new(
    clock: Arc<dyn Clock>,
    timing: SimulationTiming,
    settlements: mpsc::UnboundedSender<ProcessorRefund>,
  ) -> Self {
    let refunds = Arc::new(MemoryProcessor::new(clock));
    refunds.settle_as(ProcessorRefundStatus::Pending);
    Self {
      refunds,
      timing,
      settlements,
    }
  }

  fn schedule_settlement(&self, refund_id: String) {
    let refunds = self.refunds.clone();
    let settlements = self.settlements.clone();
    let delay = self.timing.settle_after;
    tokio::spawn(async move {
      tokio::time::sleep(delay).await;
      match refunds.settle(&refund_id, ProcessorRefundStatus::Succeeded) {
        Some(settled) => {
          info!(%refund_id, "Mock processor: refund settled.");
          if settlements.send(settled).is_err() {
            warn!(%refund_id, "Mock processor: webhook outbox is closed; settlement not delivered.");
          }
        }
        None => warn!(%refund_id, "Mock processor: refund vanished before settlement."),
      }
    });
  }
}

#[async_trait]
impl PaymentProcessor for SimulatedProcessor {
  #[instrument(name = "SimulatedProcessor::issue_refund", skip(self, issue), fields(key = issue.idempotency_key.as_str(), amount_cents = issue.amount_cents))]
  async fn issue_refund(&self, issue: &RefundIssue) -> Result<ProcessorRefund, ProcessorError> {
    tokio::time::sleep(self.timing.latency).await;

    if issue.amount_cents <= 0 {
      return Err(ProcessorError::Declined("amount must be greater than zero".to_string()));
    }
    if issue.amount_cents % 100 == DECLINE_SUFFIX_CENTS {
      warn!("Mock processor: declining refund by test convention.");
      return Err(ProcessorError::Declined("card issuer rejected the refund".to_string()));
    }

    let refund = self.refunds.issue_refund(issue).await?;
    if refund.status == ProcessorRefundStatus::Pending {
      self.schedule_settlement(refund.refund_id.clone());
    }
    info!(refund_id = %refund.refund_id, status = ?refund.status, "Mock processor: refund accepted.");
    Ok(refund)
  }

  async fn refunds_since(&self, since: DateTime<Utc>) -> Result<Vec<ProcessorRefund>, ProcessorError> {
    tokio::time::sleep(self.timing.latency).await;
    self.refunds.refunds_since(since).await
  }
}
