// ticketcore_server/src/state.rs

use crate::config::AppConfig;
use crate::pipelines::WebhookPipeline;
use chrono::Duration;
use std::sync::Arc;
use ticketcore::{
  Environment, ReconciliationSweep, RedemptionPolicy, RedemptionValidator, RefundPolicy, RefundProcessor,
  RefundReconciler, RefundReviewer,
};

#[derive(Clone)]
pub struct AppState {
  pub config: Arc<AppConfig>,
  pub redemption: Arc<RedemptionValidator>,
  pub refunds: Arc<RefundProcessor>,
  pub reviewer: Arc<RefundReviewer>,
  pub webhooks: Arc<WebhookPipeline>,
  pub sweep: Arc<ReconciliationSweep>,
}

impl AppState {
  /// Applies the configured policies to `env` and builds every workflow on it.
  pub fn new(config: Arc<AppConfig>, env: Environment) -> Self {
    let env = Arc::new(
      env
        .with_refund_policy(RefundPolicy {
          cutoff_before_start: Duration::hours(config.refund_cutoff_hours),
          block_if_redeemed: config.block_refund_if_redeemed,
        })
        .with_redemption_policy(RedemptionPolicy {
          default_event_duration: Duration::hours(config.default_event_duration_hours),
        }),
    );

    let refunds = Arc::new(RefundProcessor::new(env.clone()));
    let webhooks = Arc::new(WebhookPipeline::new(
      RefundReconciler::new(env.clone()),
      env.clock.clone(),
      &config.webhook_secret,
      config.webhook_tolerance_secs,
    ));

    Self {
      redemption: Arc::new(RedemptionValidator::new(env.clone())),
      reviewer: Arc::new(RefundReviewer::new(env.clone(), refunds.clone())),
      sweep: Arc::new(ReconciliationSweep::new(env.clone())),
      refunds,
      webhooks,
      config,
    }
  }
}
