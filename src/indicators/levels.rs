// =============================================================================
// Support / Resistance Level Tracker
// =============================================================================
//
// A price becomes a support level when it is exactly the minimum of the last
// `LEVEL_WINDOW` prices, and a resistance level when it is exactly the
// maximum. Comparison is exact `f64` equality against the freshly computed
// extremum; nearby values are not merged.
//
// Levels are never removed, so both sets grow monotonically for the life of
// the ticker.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::types::LevelKind;

/// Number of trailing prices inspected when looking for a new extremum.
pub const LEVEL_WINDOW: usize = 20;

/// Default proximity tolerance (1 %) for `near_support` / `near_resistance`.
pub const DEFAULT_PROXIMITY_PCT: f64 = 0.01;

/// A level inserted by the latest [`LevelTracker::update`] call.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NewLevel {
    pub kind: LevelKind,
    pub price: f64,
}

/// Discovered support and resistance levels, kept in discovery order.
// TODO: cap both sets and evict the level farthest from the last price once
// long-running tickers make the unbounded growth measurable.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelTracker {
    support: Vec<f64>,
    resistance: Vec<f64>,
}

impl LevelTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn support(&self) -> &[f64] {
        &self.support
    }

    pub fn resistance(&self) -> &[f64] {
        &self.resistance
    }

    /// Compare `price` with the extremes of `window` and record any new level.
    ///
    /// An empty window is a no-op. Returns the levels that were inserted.
    pub fn update<I>(&mut self, price: f64, window: I) -> Vec<NewLevel>
    where
        I: IntoIterator<Item = f64>,
    {
        let Some((min_price, max_price)) = window
            .into_iter()
            .fold(None, |acc: Option<(f64, f64)>, p| match acc {
                None => Some((p, p)),
                Some((lo, hi)) => Some((lo.min(p), hi.max(p))),
            })
        else {
            return Vec::new();
        };

        let mut inserted = Vec::new();

        if price == min_price && !self.support.contains(&price) {
            self.support.push(price);
            inserted.push(NewLevel {
                kind: LevelKind::Support,
                price,
            });
        }

        if price == max_price && !self.resistance.contains(&price) {
            self.resistance.push(price);
            inserted.push(NewLevel {
                kind: LevelKind::Resistance,
                price,
            });
        }

        if !inserted.is_empty() {
            debug!(
                price,
                support = self.support.len(),
                resistance = self.resistance.len(),
                "new price level recorded"
            );
        }

        inserted
    }

    /// True when any support level `L` satisfies `price <= L * (1 + pct)`.
    pub fn near_support(&self, price: f64, pct: f64) -> bool {
        self.support.iter().any(|&level| price <= level * (1.0 + pct))
    }

    /// True when any resistance level `L` satisfies `price >= L * (1 - pct)`.
    pub fn near_resistance(&self, price: f64, pct: f64) -> bool {
        self.resistance
            .iter()
            .any(|&level| price >= level * (1.0 - pct))
    }
}
