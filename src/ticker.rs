// =============================================================================
// Ticker — per-instrument orchestrator
// =============================================================================
//
// One `Ticker` owns all state for one instrument. Each accepted sample runs
// the full update cycle:
//
//   1. previous := current, current := price, date := timestamp
//   2. day low/high (reset when the UTC calendar date changes)
//   3. history push, support/resistance update
//   4. classify → current signal, append to signal history
//   5. BOS / COC trend transition
//
// Validation happens before step 1 and every later step is infallible, so a
// rejected sample never leaves the ticker half-updated. Callers that share a
// ticker across tasks wrap it in a lock and run `accept_sample` under the
// write guard (see `registry.rs`).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::DataError;
use crate::events::{EventBus, TickerEvent, TickerEventKind};
use crate::indicators::levels::{LevelTracker, LEVEL_WINDOW};
use crate::indicators::volatility::{trend_strength, volatility, INDICATOR_WINDOW};
use crate::market_data::{HistoryBuffer, SignalHistory};
use crate::market_structure::{self, STRUCTURE_WINDOW};
use crate::signals::{classify_with, SignalInputs, SignalThresholds};
use crate::types::{Sample, Signal, SignalRecord, TrendState};

/// Samples (and signals) retained per ticker.
pub const HISTORY_CAPACITY: usize = 100;

// =============================================================================
// Settings
// =============================================================================

fn default_history_capacity() -> usize {
    HISTORY_CAPACITY
}

fn default_level_window() -> usize {
    LEVEL_WINDOW
}

fn default_indicator_window() -> usize {
    INDICATOR_WINDOW
}

fn default_structure_window() -> usize {
    STRUCTURE_WINDOW
}

/// Window sizes and thresholds shared by every ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerSettings {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    #[serde(default = "default_level_window")]
    pub level_window: usize,

    #[serde(default = "default_indicator_window")]
    pub indicator_window: usize,

    #[serde(default = "default_structure_window")]
    pub structure_window: usize,

    #[serde(default)]
    pub thresholds: SignalThresholds,
}

impl Default for TickerSettings {
    fn default() -> Self {
        Self {
            history_capacity: HISTORY_CAPACITY,
            level_window: LEVEL_WINDOW,
            indicator_window: INDICATOR_WINDOW,
            structure_window: STRUCTURE_WINDOW,
            thresholds: SignalThresholds::default(),
        }
    }
}

// =============================================================================
// Snapshot
// =============================================================================

/// Read-only, serialisable view of a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerState {
    pub symbol: String,
    pub currency: String,
    pub current_price: Option<f64>,
    pub previous_price: Option<f64>,
    /// Timestamp of the last accepted sample.
    pub date: Option<DateTime<Utc>>,
    pub signal: Signal,
    pub day_low: Option<f64>,
    pub day_high: Option<f64>,
    pub history: Vec<Sample>,
    pub signal_history: Vec<SignalRecord>,
    pub support: Vec<f64>,
    pub resistance: Vec<f64>,
    pub trend: TrendState,
    /// Latest classifier inputs; absent until the first sample.
    pub indicators: Option<SignalInputs>,
}

// =============================================================================
// Ticker
// =============================================================================

#[derive(Debug)]
pub struct Ticker {
    symbol: String,
    currency: String,
    current_price: Option<f64>,
    previous_price: Option<f64>,
    date: Option<DateTime<Utc>>,
    /// Newest timestamp seen from either a sample or a refilled bar.
    watermark: Option<DateTime<Utc>>,
    signal: Signal,
    day_low: Option<f64>,
    day_high: Option<f64>,
    history: HistoryBuffer,
    signals: SignalHistory,
    levels: LevelTracker,
    trend: TrendState,
    settings: TickerSettings,
    events: Option<EventBus>,
}

impl Ticker {
    pub fn new(
        symbol: impl Into<String>,
        currency: impl Into<String>,
        settings: TickerSettings,
    ) -> Self {
        Self {
            symbol: symbol.into(),
            currency: currency.into(),
            current_price: None,
            previous_price: None,
            date: None,
            watermark: None,
            signal: Signal::Neutral,
            day_low: None,
            day_high: None,
            history: HistoryBuffer::new(settings.history_capacity),
            signals: SignalHistory::new(settings.history_capacity),
            levels: LevelTracker::new(),
            trend: TrendState::Neutral,
            settings,
            events: None,
        }
    }

    /// Publish this ticker's events on `bus`.
    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn set_currency(&mut self, currency: impl Into<String>) {
        self.currency = currency.into();
    }

    pub fn signal(&self) -> Signal {
        self.signal
    }

    pub fn trend(&self) -> TrendState {
        self.trend
    }

    /// True when `timestamp` is strictly older than the newest accepted
    /// sample or refilled bar. Pollers use this to drop late responses.
    pub fn is_stale(&self, timestamp: DateTime<Utc>) -> bool {
        self.watermark.is_some_and(|last| timestamp < last)
    }

    // ── Update cycle ────────────────────────────────────────────────────

    /// Run one full update cycle for a new price observation.
    pub fn accept_sample(&mut self, price: f64, timestamp: DateTime<Utc>) -> Result<(), DataError> {
        if let Err(e) = validate_price(price) {
            self.reject(&e, timestamp);
            return Err(e);
        }

        let mut events = vec![TickerEventKind::SampleAccepted { price }];

        // 1. Prices and clock.
        let prev_date = self.date;
        self.previous_price = self.current_price;
        self.current_price = Some(price);
        self.date = Some(timestamp);
        self.watermark = self.watermark.max(Some(timestamp));

        // 2. Day bounds.
        let rolled_over = prev_date.is_some_and(|d| d.date_naive() != timestamp.date_naive());
        if rolled_over {
            events.push(TickerEventKind::DayRollover {
                previous_low: self.day_low,
                previous_high: self.day_high,
            });
        }
        if rolled_over || prev_date.is_none() {
            self.day_low = None;
            self.day_high = None;
        }
        self.day_low = Some(self.day_low.map_or(price, |low| low.min(price)));
        self.day_high = Some(self.day_high.map_or(price, |high| high.max(price)));

        // 3. History and levels.
        self.history.push(Sample::new(price, timestamp));
        let new_levels = self
            .levels
            .update(price, self.history.window(self.settings.level_window));
        events.extend(new_levels.into_iter().map(|l| TickerEventKind::LevelDiscovered {
            level: l.kind,
            price: l.price,
        }));

        // 4. Signal.
        let inputs = self.inputs_for(price, self.previous_price);
        let signal = classify_with(&inputs, &self.settings.thresholds);
        if signal != self.signal {
            info!(
                symbol = %self.symbol,
                from = %self.signal,
                to = %signal,
                price,
                "signal changed"
            );
            events.push(TickerEventKind::SignalChanged {
                from: self.signal,
                to: signal,
            });
        }
        self.signal = signal;
        self.signals.push(SignalRecord { signal, timestamp });

        // 5. Market structure.
        let transition = market_structure::step(
            self.trend,
            price,
            self.previous_price,
            self.history
                .window_before_latest(self.settings.structure_window),
        );
        if let Some(direction) = transition.break_of_structure {
            info!(symbol = %self.symbol, direction = %direction, price, "break of structure");
            events.push(TickerEventKind::BreakOfStructure { direction });
        }
        if transition.change_of_character {
            info!(symbol = %self.symbol, price, "change of character — trend reset");
            events.push(TickerEventKind::ChangeOfCharacter {
                from: transition.from,
            });
        }
        if transition.changed() {
            debug!(symbol = %self.symbol, from = %transition.from, to = %transition.to, "trend changed");
        }
        self.trend = transition.to;

        debug!(
            symbol = %self.symbol,
            price,
            signal = %self.signal,
            trend = %self.trend,
            volatility = inputs.volatility,
            trend_strength = inputs.trend_strength,
            "sample accepted"
        );

        self.emit(timestamp, events);
        Ok(())
    }

    /// Replace the price history with a bulk download of historical bars.
    ///
    /// The whole batch is validated first; one bad bar rejects all of it.
    /// Bars are replayed in timestamp order through the history buffer and
    /// the level tracker only: prices, signal, trend and day bounds are left
    /// as they are. Returns the number of bars retained.
    pub fn refill_history(&mut self, bars: &[Sample]) -> Result<usize, DataError> {
        let at = bars.last().map_or_else(Utc::now, |b| b.timestamp);
        if bars.is_empty() {
            self.reject(&DataError::EmptyPayload, at);
            return Err(DataError::EmptyPayload);
        }
        if let Some(err) = bars.iter().find_map(|b| validate_price(b.price).err()) {
            self.reject(&err, at);
            return Err(err);
        }

        let mut ordered = bars.to_vec();
        ordered.sort_by_key(|b| b.timestamp);

        let mut events = Vec::new();
        self.history.clear();
        for bar in &ordered {
            self.history.push(*bar);
            let new_levels = self
                .levels
                .update(bar.price, self.history.window(self.settings.level_window));
            events.extend(new_levels.into_iter().map(|l| TickerEventKind::LevelDiscovered {
                level: l.kind,
                price: l.price,
            }));
        }

        self.watermark = self.watermark.max(ordered.last().map(|b| b.timestamp));

        let retained = self.history.len();
        events.push(TickerEventKind::HistoryRefilled { samples: retained });
        info!(
            symbol = %self.symbol,
            bars = bars.len(),
            retained,
            capacity = self.history.capacity(),
            "history refilled"
        );

        self.emit(at, events);
        Ok(retained)
    }

    // ── Read side ───────────────────────────────────────────────────────

    /// Indicator readings for the latest sample.
    pub fn signal_inputs(&self) -> Result<SignalInputs, DataError> {
        let price = self.current_price.ok_or(DataError::NotInitialized)?;
        Ok(self.inputs_for(price, self.previous_price))
    }

    /// Last `n` prices, oldest-first.
    pub fn history(&self, n: usize) -> Vec<f64> {
        self.history.window(n).collect()
    }

    pub fn state(&self) -> TickerState {
        TickerState {
            symbol: self.symbol.clone(),
            currency: self.currency.clone(),
            current_price: self.current_price,
            previous_price: self.previous_price,
            date: self.date,
            signal: self.signal,
            day_low: self.day_low,
            day_high: self.day_high,
            history: self.history.iter().copied().collect(),
            signal_history: self.signals.iter().copied().collect(),
            support: self.levels.support().to_vec(),
            resistance: self.levels.resistance().to_vec(),
            trend: self.trend,
            indicators: self.signal_inputs().ok(),
        }
    }

    // ── Internals ───────────────────────────────────────────────────────

    fn inputs_for(&self, price: f64, previous: Option<f64>) -> SignalInputs {
        let window = self.history.window(self.settings.indicator_window);
        let band = self.settings.thresholds.proximity_pct;
        SignalInputs {
            price_change: previous.map_or(0.0, |prev| price - prev),
            volatility: volatility(window.clone()),
            trend_strength: trend_strength(
                price,
                window,
                self.levels.support(),
                self.levels.resistance(),
            ),
            near_support: self.levels.near_support(price, band),
            near_resistance: self.levels.near_resistance(price, band),
        }
    }

    /// Report a quote that never reached `accept_sample` because the
    /// upstream payload was unusable. State is left untouched.
    pub fn reject_upstream(&self, error: &DataError, at: DateTime<Utc>) {
        self.reject(error, at);
    }

    fn reject(&self, error: &DataError, at: DateTime<Utc>) {
        warn!(symbol = %self.symbol, error = %error, "sample rejected");
        self.emit(
            at,
            vec![TickerEventKind::SampleRejected {
                reason: error.to_string(),
            }],
        );
    }

    fn emit(&self, at: DateTime<Utc>, kinds: Vec<TickerEventKind>) {
        if let Some(bus) = &self.events {
            for kind in kinds {
                bus.publish(TickerEvent::new(self.symbol.clone(), at, kind));
            }
        }
    }
}

fn validate_price(price: f64) -> Result<f64, DataError> {
    if price.is_finite() && price > 0.0 {
        Ok(price)
    } else {
        Err(DataError::InvalidPrice(price))
    }
}
