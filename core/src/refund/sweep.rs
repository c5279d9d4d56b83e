// ticketcore/src/refund/sweep.rs

use super::reconcile::{LedgerWriteRequest, RefundReconciler};
use crate::environment::Environment;
use crate::error::CoreError;
use crate::processor::ProcessorRefundStatus;
use crate::store::LedgerWrite;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
  pub scanned: usize,
  pub applied: usize,
  pub confirmed: usize,
  pub already_recorded: usize,
  pub failed: usize,
}

/// Converges processor refunds whose confirmation never reached the ledger.
#[derive(Clone)]
pub struct ReconciliationSweep {
  env: Arc<Environment>,
  reconciler: RefundReconciler,
}

impl ReconciliationSweep {
  pub fn new(env: Arc<Environment>) -> Self {
    Self {
      reconciler: RefundReconciler::new(env.clone()),
      env,
    }
  }

  /// Feeds every succeeded refund created since `since` through the
  /// reconciler. A refund that fails to apply is counted and left for the
  /// next run.
  #[instrument(name = "ReconciliationSweep::run_once", skip(self))]
  pub async fn run_once(&self, since: DateTime<Utc>) -> Result<SweepReport, CoreError> {
    let refunds = self.env.processor.refunds_since(since).await?;
    let mut report = SweepReport::default();

    for refund in refunds {
      report.scanned += 1;
      if refund.status != ProcessorRefundStatus::Succeeded {
        continue;
      }

      let request = LedgerWriteRequest::from_processor(&refund, None, self.env.clock.now());
      match self.reconciler.apply(request).await {
        Ok(LedgerWrite::Applied) => {
          warn!(refund_id = %refund.refund_id, "Sweep: refund was missing from the ledger.");
          report.applied += 1;
        }
        Ok(LedgerWrite::Confirmed) => report.confirmed += 1,
        Ok(LedgerWrite::AlreadyRecorded) => report.already_recorded += 1,
        Err(e) => {
          warn!(refund_id = %refund.refund_id, error = %e, "Sweep: refund could not be applied.");
          report.failed += 1;
        }
      }
    }

    info!(?report, "Sweep: run finished.");
    Ok(report)
  }
}
