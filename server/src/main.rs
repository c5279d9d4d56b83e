// ticketcore_server/src/main.rs

mod config;
mod db;
mod errors;
mod models;
mod pipelines;
mod services;
mod state;
mod web;

use crate::config::{AppConfig, StoreBackend};
use crate::db::seed::DemoData;
use crate::db::PgStore;
use crate::services::processor_mock::{SimulatedProcessor, SimulationTiming};
use crate::services::{outbox, sweep_job};
use crate::state::AppState;

use actix_web::{web as actix_data, App, HttpServer};
use anyhow::Context;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use ticketcore::memory::{MemoryStore, StaticAccessControl};
use ticketcore::{Clock, Environment, PaymentProcessor, SystemClock};
use tokio::sync::mpsc;
use tracing::Level;
use tracing_subscriber::fmt::format::FmtSpan;

#[actix_web::main]
async fn main() -> std::io::Result<()> {
  init_tracing();
  tracing::info!("Starting ticketcore server...");

  let app_config = match AppConfig::from_env() {
    Ok(cfg) => Arc::new(cfg),
    Err(e) => {
      tracing::error!(error = %e, "Failed to load application configuration.");
      return Err(std::io::Error::new(std::io::ErrorKind::InvalidInput, e.to_string()));
    }
  };
  tracing::debug!(config = ?app_config, "Effective configuration.");

  let clock: Arc<dyn Clock> = Arc::new(SystemClock);
  let (settlement_tx, settlement_rx) = mpsc::unbounded_channel();
  let processor: Arc<dyn PaymentProcessor> = Arc::new(SimulatedProcessor::new(
    clock.clone(),
    SimulationTiming::default(),
    settlement_tx,
  ));

  let env = match build_environment(&app_config, processor, clock.clone()).await {
    Ok(env) => env,
    Err(e) => {
      tracing::error!(error = format!("{:#}", e), "Failed to initialize the store.");
      return Err(std::io::Error::new(std::io::ErrorKind::Other, format!("{:#}", e)));
    }
  };
  let app_state = AppState::new(app_config.clone(), env);

  tokio::spawn(outbox::run(app_state.webhooks.clone(), clock.clone(), settlement_rx));
  tokio::spawn(sweep_job::run(
    app_state.sweep.clone(),
    clock,
    Duration::from_secs(app_config.reconcile_sweep_interval_secs),
    chrono::Duration::hours(app_config.reconcile_lookback_hours),
  ));

  let server_address = format!("{}:{}", app_config.server_host, app_config.server_port);
  tracing::info!("Attempting to bind server to {}...", server_address);

  HttpServer::new(move || {
    App::new()
      .app_data(actix_data::Data::new(app_state.clone()))
      .wrap(tracing_actix_web::TracingLogger::default())
      .configure(web::configure_app_routes)
  })
  .bind(&server_address)?
  .run()
  .await
}

/// `LOG_FORMAT=json` switches to one JSON object per line; `RUST_LOG`
/// overrides the default level.
fn init_tracing() {
  let builder = tracing_subscriber::fmt()
    .with_max_level(Level::INFO)
    .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
    .with_span_events(FmtSpan::CLOSE);

  if std::env::var("LOG_FORMAT").map_or(false, |v| v.eq_ignore_ascii_case("json")) {
    builder.json().init();
  } else {
    builder.init();
  }
}

async fn build_environment(
  config: &AppConfig,
  processor: Arc<dyn PaymentProcessor>,
  clock: Arc<dyn Clock>,
) -> anyhow::Result<Environment> {
  match config.store_backend {
    StoreBackend::Memory => {
      let store = Arc::new(MemoryStore::new());
      let access = Arc::new(StaticAccessControl::new());
      if config.seed_demo_data {
        DemoData::build(clock.now())?.load_into_memory(&store, &access);
      }
      tracing::warn!("Using the in-memory store; all records are lost on restart.");
      Ok(Environment::new(store, access, processor, clock))
    }
    StoreBackend::Postgres => {
      let database_url = config
        .database_url
        .as_deref()
        .context("DATABASE_URL is required for the postgres store")?;
      let pool = PgPool::connect(database_url)
        .await
        .context("connecting to the database")?;
      tracing::info!("Successfully connected to the database.");

      sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .context("applying database migrations")?;

      let store = Arc::new(PgStore::new(pool));
      if config.seed_demo_data {
        DemoData::build(clock.now())?
          .load_into_postgres(&store)
          .await
          .context("seeding demo data")?;
      }
      Ok(Environment::new(store.clone(), store, processor, clock))
    }
  }
}
