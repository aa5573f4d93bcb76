// =============================================================================
// Scheduling — when to poll, when to refill
// =============================================================================
//
// A `Schedule` answers one question: how long to sleep from `now` until the
// next run. Two implementations cover every trigger the service needs:
//
//   IntervalSchedule   fixed period (per-ticker polling, minute cadence)
//   DailySchedule      once a day at HH:MM UTC (cron-like bulk refill)
//
// The poll and refill loops below are written once and take any schedule,
// so interval-driven and cron-driven tickers share the same code path.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::error::DataError;
use crate::price_source::PriceSource;
use crate::registry::SharedTicker;
use crate::types::{Signal, TrendState};

/// Shortest interval a ticker may be polled at.
const MIN_INTERVAL_SECS: u64 = 1;

// =============================================================================
// Schedule trait + implementations
// =============================================================================

pub trait Schedule: Send + Sync + std::fmt::Debug {
    /// Time to wait, starting at `now`, before the next run.
    fn delay_until_next(&self, now: DateTime<Utc>) -> Duration;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalSchedule {
    period: Duration,
}

impl IntervalSchedule {
    pub fn new(period: Duration) -> Self {
        Self {
            period: period.max(Duration::from_secs(MIN_INTERVAL_SECS)),
        }
    }
}

impl Schedule for IntervalSchedule {
    fn delay_until_next(&self, _now: DateTime<Utc>) -> Duration {
        self.period
    }
}

/// Fires once per day at `hour:minute` UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DailySchedule {
    hour: u32,
    minute: u32,
}

impl DailySchedule {
    pub fn new(hour: u32, minute: u32) -> Result<Self> {
        ensure!(hour < 24, "daily schedule hour out of range: {hour}");
        ensure!(minute < 60, "daily schedule minute out of range: {minute}");
        Ok(Self { hour, minute })
    }

    /// The first `hour:minute` strictly after `now`.
    pub fn next_run(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let today = now
            .date_naive()
            .and_hms_opt(self.hour, self.minute, 0)
            .map(|t| t.and_utc());
        match today {
            Some(t) if t > now => t,
            Some(t) => t + chrono::Duration::days(1),
            // Unreachable for validated hour/minute; fall back to a day later.
            None => now + chrono::Duration::days(1),
        }
    }
}

impl Schedule for DailySchedule {
    fn delay_until_next(&self, now: DateTime<Utc>) -> Duration {
        (self.next_run(now) - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Serialisable schedule description used in the config file and the API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScheduleConfig {
    Interval { secs: u64 },
    Daily { hour: u32, minute: u32 },
}

impl ScheduleConfig {
    pub fn build(&self) -> Result<Box<dyn Schedule>> {
        match *self {
            Self::Interval { secs } => {
                ensure!(
                    secs >= MIN_INTERVAL_SECS,
                    "poll interval must be at least {MIN_INTERVAL_SECS}s"
                );
                Ok(Box::new(IntervalSchedule::new(Duration::from_secs(secs))))
            }
            Self::Daily { hour, minute } => Ok(Box::new(DailySchedule::new(hour, minute)?)),
        }
    }
}

impl std::fmt::Display for ScheduleConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Interval { secs } => write!(f, "every {secs}s"),
            Self::Daily { hour, minute } => write!(f, "daily at {hour:02}:{minute:02} UTC"),
        }
    }
}

// =============================================================================
// Poll cycle
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PollOutcome {
    Accepted {
        price: f64,
        signal: Signal,
        trend: TrendState,
    },
    /// The quote was older than the last accepted sample and was dropped.
    Stale { timestamp: DateTime<Utc> },
}

/// Fetch one quote and hand it to the ticker.
///
/// The lock is taken only after the fetch completes, so readers are never
/// blocked on the network. An unusable upstream payload is reported on the
/// ticker's event stream as a rejected sample before the error is returned.
pub async fn poll_once<P>(source: &P, ticker: &SharedTicker) -> Result<PollOutcome>
where
    P: PriceSource,
{
    let symbol = ticker.read().symbol().to_string();
    let quote = match source.fetch_quote(&symbol).await {
        Ok(quote) => quote,
        Err(e) => {
            if let Some(data_err) = e.downcast_ref::<DataError>() {
                ticker.read().reject_upstream(data_err, Utc::now());
            }
            return Err(e);
        }
    };

    let mut guard = ticker.write();
    if guard.is_stale(quote.timestamp) {
        debug!(symbol = %symbol, timestamp = %quote.timestamp, "dropping stale quote");
        return Ok(PollOutcome::Stale {
            timestamp: quote.timestamp,
        });
    }
    guard.accept_sample(quote.price, quote.timestamp)?;
    if let Some(currency) = quote.currency {
        if currency != guard.currency() {
            guard.set_currency(currency);
        }
    }

    Ok(PollOutcome::Accepted {
        price: quote.price,
        signal: guard.signal(),
        trend: guard.trend(),
    })
}

/// Poll `ticker` immediately, then forever on `schedule`.
pub async fn run_poller<P>(
    state: Arc<AppState>,
    source: Arc<P>,
    ticker: SharedTicker,
    schedule: Box<dyn Schedule>,
) where
    P: PriceSource,
{
    let symbol = ticker.read().symbol().to_string();
    info!(symbol = %symbol, schedule = ?schedule, "poller started");

    loop {
        match poll_once(source.as_ref(), &ticker).await {
            Ok(PollOutcome::Accepted {
                price,
                signal,
                trend,
            }) => {
                debug!(symbol = %symbol, price, signal = %signal, trend = %trend, "poll accepted");
                state.increment_version();
            }
            Ok(PollOutcome::Stale { .. }) => {}
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "poll failed — state unchanged");
                state.push_error(format!("{symbol}: {e:#}"));
            }
        }

        tokio::time::sleep(schedule.delay_until_next(Utc::now())).await;
    }
}

// =============================================================================
// Bulk refill cycle
// =============================================================================

/// Download historical bars for every registered ticker and rebuild their
/// histories. Returns how many tickers were refilled.
pub async fn refill_once<P>(state: &AppState, source: &P) -> usize
where
    P: PriceSource,
{
    let mut refilled = 0;
    for symbol in state.registry.symbols() {
        let Some(ticker) = state.registry.get(&symbol) else {
            continue;
        };
        let outcome = match source.fetch_history(&symbol).await {
            Ok(bars) => {
                let mut guard = ticker.write();
                guard.refill_history(&bars).map_err(anyhow::Error::from)
            }
            Err(e) => Err(e),
        };
        match outcome {
            Ok(retained) => {
                debug!(symbol = %symbol, retained, "refill complete");
                refilled += 1;
            }
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "history refill failed");
                state.push_error(format!("{symbol}: history refill: {e:#}"));
            }
        }
    }
    if refilled > 0 {
        state.increment_version();
    }
    refilled
}

/// Refill once at startup, then on every tick of `schedule`.
pub async fn run_refill<P>(state: Arc<AppState>, source: Arc<P>, schedule: Box<dyn Schedule>)
where
    P: PriceSource,
{
    info!(schedule = ?schedule, "history refill loop started");
    loop {
        let refilled = refill_once(state.as_ref(), source.as_ref()).await;
        info!(refilled, "history refill cycle done");
        tokio::time::sleep(schedule.delay_until_next(Utc::now())).await;
    }
}
