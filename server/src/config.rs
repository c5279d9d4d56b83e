// ticketcore_server/src/config.rs

use crate::errors::{AppError, Result};
use dotenvy::dotenv;
use std::env;
use std::str::FromStr;

/// Where the core's records live.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
  /// Process-local tables; everything is lost on restart.
  Memory,
  Postgres,
}

impl FromStr for StoreBackend {
  type Err = AppError;

  fn from_str(s: &str) -> Result<Self> {
    match s.trim().to_ascii_lowercase().as_str() {
      "memory" => Ok(StoreBackend::Memory),
      "postgres" | "postgresql" => Ok(StoreBackend::Postgres),
      other => Err(AppError::Config(format!(
        "Invalid STORE_BACKEND '{}': expected 'memory' or 'postgres'",
        other
      ))),
    }
  }
}

#[derive(Clone)]
pub struct AppConfig {
  pub server_host: String,
  pub server_port: u16,
  pub store_backend: StoreBackend,
  /// Required when `store_backend` is Postgres.
  pub database_url: Option<String>,

  /// Shared secret for processor webhook signatures.
  pub webhook_secret: String,
  pub webhook_tolerance_secs: i64,

  pub refund_cutoff_hours: i64,
  pub block_refund_if_redeemed: bool,
  pub default_event_duration_hours: i64,

  pub reconcile_sweep_interval_secs: u64,
  pub reconcile_lookback_hours: i64,

  /// Load the demo event, order and roles at start-up.
  pub seed_demo_data: bool,
}

impl std::fmt::Debug for AppConfig {
  fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
    f.debug_struct("AppConfig")
      .field("server_host", &self.server_host)
      .field("server_port", &self.server_port)
      .field("store_backend", &self.store_backend)
      .field("database_url", &self.database_url.as_ref().map(|_| "[REDACTED]"))
      .field("webhook_secret", &"[REDACTED]")
      .field("webhook_tolerance_secs", &self.webhook_tolerance_secs)
      .field("refund_cutoff_hours", &self.refund_cutoff_hours)
      .field("block_refund_if_redeemed", &self.block_refund_if_redeemed)
      .field("default_event_duration_hours", &self.default_event_duration_hours)
      .field("reconcile_sweep_interval_secs", &self.reconcile_sweep_interval_secs)
      .field("reconcile_lookback_hours", &self.reconcile_lookback_hours)
      .field("seed_demo_data", &self.seed_demo_data)
      .finish()
  }
}

impl AppConfig {
  pub fn from_env() -> Result<Self> {
    dotenv().ok();

    let get_env = |var_name: &str| env::var(var_name).ok().filter(|v| !v.trim().is_empty());

    let server_host = get_env("SERVER_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
    let server_port = parse_or("SERVER_PORT", get_env("SERVER_PORT"), 8080u16)?;
    let store_backend = get_env("STORE_BACKEND")
      .map(|v| v.parse::<StoreBackend>())
      .transpose()?
      .unwrap_or(StoreBackend::Memory);
    let database_url = get_env("DATABASE_URL");
    if store_backend == StoreBackend::Postgres && database_url.is_none() {
      return Err(AppError::Config(
        "Missing environment variable 'DATABASE_URL' (required for STORE_BACKEND=postgres)".to_string(),
      ));
    }

    let webhook_secret = get_env("WEBHOOK_SECRET")
      .ok_or_else(|| AppError::Config("Missing environment variable 'WEBHOOK_SECRET'".to_string()))?;
    let webhook_tolerance_secs = parse_or("WEBHOOK_TOLERANCE_SECS", get_env("WEBHOOK_TOLERANCE_SECS"), 300i64)?;

    let refund_cutoff_hours = parse_or("REFUND_CUTOFF_HOURS", get_env("REFUND_CUTOFF_HOURS"), 24i64)?;
    let block_refund_if_redeemed = parse_or("BLOCK_REFUND_IF_REDEEMED", get_env("BLOCK_REFUND_IF_REDEEMED"), true)?;
    let default_event_duration_hours = parse_or(
      "DEFAULT_EVENT_DURATION_HOURS",
      get_env("DEFAULT_EVENT_DURATION_HOURS"),
      6i64,
    )?;

    let reconcile_sweep_interval_secs = parse_or(
      "RECONCILE_SWEEP_INTERVAL_SECS",
      get_env("RECONCILE_SWEEP_INTERVAL_SECS"),
      300u64,
    )?;
    let reconcile_lookback_hours = parse_or("RECONCILE_LOOKBACK_HOURS", get_env("RECONCILE_LOOKBACK_HOURS"), 72i64)?;

    let seed_demo_data = parse_or("SEED_DEMO_DATA", get_env("SEED_DEMO_DATA"), false)?;

    if refund_cutoff_hours < 0 || default_event_duration_hours <= 0 || reconcile_lookback_hours <= 0 {
      return Err(AppError::Config(
        "REFUND_CUTOFF_HOURS must be >= 0; DEFAULT_EVENT_DURATION_HOURS and RECONCILE_LOOKBACK_HOURS must be > 0"
          .to_string(),
      ));
    }
    if reconcile_sweep_interval_secs == 0 {
      return Err(AppError::Config("RECONCILE_SWEEP_INTERVAL_SECS must be > 0".to_string()));
    }

    tracing::info!("Application configuration loaded successfully.");

    Ok(Self {
      server_host,
      server_port,
      store_backend,
      database_url,
      webhook_secret,
      webhook_tolerance_secs,
      refund_cutoff_hours,
      block_refund_if_redeemed,
      default_event_duration_hours,
      reconcile_sweep_interval_secs,
      reconcile_lookback_hours,
      seed_demo_data,
    })
  }
}

fn parse_or<T>(var_name: &str, raw: Option<String>, default: T) -> Result<T>
where
  T: FromStr,
  T::Err: std::fmt::Display,
{
  match raw {
    None => Ok(default),
    Some(value) => value
      .trim()
      .parse::<T>()
      .map_err(|e| AppError::Config(format!("Invalid {} value '{}': {}", var_name, value, e))),
  }
}
