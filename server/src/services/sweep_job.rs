// ticketcore_server/src/services/sweep_job.rs

use chrono::Duration as ChronoDuration;
use std::sync::Arc;
use std::time::Duration;
use ticketcore::{Clock, ReconciliationSweep};
use tokio::time::MissedTickBehavior;
use tracing::{error, info, instrument};

/// Runs the reconciliation sweep every `interval`, looking back `lookback`.
/// The first run happens one interval after start-up.
pub async fn run(sweep: Arc<ReconciliationSweep>, clock: Arc<dyn Clock>, interval: Duration, lookback: ChronoDuration) {
  let mut ticker = tokio::time::interval(interval);
  ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
  ticker.tick().await;

  info!(interval_secs = interval.as_secs(), lookback_hours = lookback.num_hours(), "Reconciliation sweep scheduled.");
  loop {
    ticker.tick().await;
    run_once(&sweep, clock.as_ref(), lookback).await;
  }
}

#[instrument(name = "sweep_job::run_once", skip_all)]
async fn run_once(sweep: &ReconciliationSweep, clock: &dyn Clock, lookback: ChronoDuration) {
  let since = clock.now() - lookback;
  match sweep.run_once(since).await {
    Ok(report) if report.applied > 0 || report.failed > 0 => {
      info!(?report, "Reconciliation sweep converged missing refunds.")
    }
    Ok(_) => {}
    Err(e) => error!(error = %e, "Reconciliation sweep failed; retrying next interval."),
  }
}
