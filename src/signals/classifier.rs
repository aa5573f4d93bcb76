// =============================================================================
// Signal Classifier — BUY / SELL / NEUTRAL
// =============================================================================
//
// Decision rule (first match wins):
//
//   BUY   priceChange > 0  AND σ < MAX_VOLATILITY AND trend >  MIN_TREND
//         AND NOT near resistance
//   SELL  priceChange < 0  AND σ < MAX_VOLATILITY AND trend < -MIN_TREND
//         AND NOT near support
//   NEUTRAL otherwise
//
// The thresholds are heuristic constants. They are exposed through
// `SignalThresholds` so the runtime config (and tests) can override them.

use serde::{Deserialize, Serialize};

use crate::indicators::levels::DEFAULT_PROXIMITY_PCT;
use crate::types::Signal;

/// Volatility (σ) must be strictly below this for a directional signal.
pub const MAX_VOLATILITY: f64 = 0.02;

/// Absolute trend strength must exceed this for a directional signal.
pub const MIN_TREND_STRENGTH: f64 = 0.5;

fn default_max_volatility() -> f64 {
    MAX_VOLATILITY
}

fn default_min_trend_strength() -> f64 {
    MIN_TREND_STRENGTH
}

fn default_proximity_pct() -> f64 {
    DEFAULT_PROXIMITY_PCT
}

/// Tunable classifier thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalThresholds {
    #[serde(default = "default_max_volatility")]
    pub max_volatility: f64,

    #[serde(default = "default_min_trend_strength")]
    pub min_trend_strength: f64,

    /// Fractional band used for the near-support / near-resistance checks.
    #[serde(default = "default_proximity_pct")]
    pub proximity_pct: f64,
}

impl Default for SignalThresholds {
    fn default() -> Self {
        Self {
            max_volatility: MAX_VOLATILITY,
            min_trend_strength: MIN_TREND_STRENGTH,
            proximity_pct: DEFAULT_PROXIMITY_PCT,
        }
    }
}

/// Everything the classifier looks at for one sample.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalInputs {
    pub price_change: f64,
    pub volatility: f64,
    pub trend_strength: f64,
    pub near_support: bool,
    pub near_resistance: bool,
}

/// Classify a sample with explicit thresholds.
pub fn classify_with(inputs: &SignalInputs, thresholds: &SignalThresholds) -> Signal {
    let calm = inputs.volatility < thresholds.max_volatility;

    if inputs.price_change > 0.0
        && calm
        && inputs.trend_strength > thresholds.min_trend_strength
        && !inputs.near_resistance
    {
        Signal::Buy
    } else if inputs.price_change < 0.0
        && calm
        && inputs.trend_strength < -thresholds.min_trend_strength
        && !inputs.near_support
    {
        Signal::Sell
    } else {
        Signal::Neutral
    }
}
