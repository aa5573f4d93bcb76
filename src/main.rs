// =============================================================================
// Ticker Watch — Main Entry Point
// =============================================================================
//
// Polls a chart API for every configured instrument, runs each sample through
// the per-ticker indicator/scoring engine and serves the results over REST
// and a WebSocket event feed.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod error;
mod events;
mod indicators;
mod market_data;
mod market_structure;
mod price_source;
mod registry;
mod runtime_config;
mod scheduler;
mod signals;
mod ticker;
mod types;

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::{AppState, Registration};
use crate::price_source::ChartClient;
use crate::runtime_config::RuntimeConfig;

const CONFIG_PATH: &str = "ticker_config.json";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Ticker Watch — starting up");

    let mut config = RuntimeConfig::load(CONFIG_PATH).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    if let Ok(syms) = std::env::var("TICKER_SYMBOLS") {
        config.override_symbols(&syms);
    }
    if let Ok(addr) = std::env::var("TICKER_BIND_ADDR") {
        config.bind_addr = addr;
    }
    if let Ok(url) = std::env::var("TICKER_PRICE_SOURCE_URL") {
        config.price_source_url = url;
    }

    let symbols: Vec<&str> = config.tickers.iter().map(|t| t.symbol.as_str()).collect();
    info!(symbols = ?symbols, poll_schedule = %config.poll_schedule, "Configured tickers");

    // ── 2. Price source ──────────────────────────────────────────────────
    let source = Arc::new(ChartClient::new(
        config.price_source_url.clone(),
        Duration::from_secs(config.request_timeout_secs),
        config.refill.interval.clone(),
        config.refill.range.clone(),
    )?);

    let bind_addr = config.bind_addr.clone();
    let refill = config.refill.clone();

    // ── 3. Build shared state (registers configured tickers) ─────────────
    let (state, registrations) = AppState::new(config);
    let state = Arc::new(state);

    // ── 4. Supervisor: one poller per registered ticker ──────────────────
    tokio::spawn(supervise(state.clone(), source.clone(), registrations));

    // ── 5. Daily bulk-history refill ─────────────────────────────────────
    if refill.enabled {
        let schedule = refill
            .schedule
            .build()
            .context("invalid refill schedule")?;
        info!(schedule = %refill.schedule, "History refill enabled");
        tokio::spawn(scheduler::run_refill(state.clone(), source.clone(), schedule));
    }

    // ── 6. API server ────────────────────────────────────────────────────
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server on {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    info!("All subsystems running. Press Ctrl+C to stop.");

    // ── 7. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    if let Err(e) = state.runtime_config.read().save(CONFIG_PATH) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Ticker Watch shut down complete.");
    Ok(())
}

/// Spawn a poll loop for every ticker announced on `registrations`.
async fn supervise(
    state: Arc<AppState>,
    source: Arc<ChartClient>,
    mut registrations: mpsc::UnboundedReceiver<Registration>,
) {
    while let Some(Registration { ticker, schedule }) = registrations.recv().await {
        let symbol = ticker.read().symbol().to_string();
        match schedule.build() {
            Ok(schedule) => {
                tokio::spawn(scheduler::run_poller(
                    state.clone(),
                    source.clone(),
                    ticker,
                    schedule,
                ));
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "cannot start poller");
                state.push_error(format!("{symbol}: {e:#}"));
            }
        }
    }
    info!("registration channel closed — supervisor exiting");
}
