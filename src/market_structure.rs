// =============================================================================
// Market Structure — Break of Structure (BOS) / Change of Character (COC)
// =============================================================================
//
// A three-state trend machine (UP / DOWN / NEUTRAL, initial NEUTRAL) advanced
// once per accepted sample.
//
//   1. BOS   price > max(prior window)  => UP
//            price < min(prior window)  => DOWN
//            otherwise                   => unchanged
//   2. COC   (evaluated on the BOS result)
//            UP   and price < previous   => NEUTRAL
//            DOWN and price > previous   => NEUTRAL
//
// "Prior window" is the last `STRUCTURE_WINDOW` prices *before* the current
// sample. The transition is a pure function of its inputs; the only memory
// is the `TrendState` value the caller threads through.

use serde::{Deserialize, Serialize};

use crate::types::TrendState;

/// Number of prior prices the BOS rule compares against.
pub const STRUCTURE_WINDOW: usize = 10;

/// Outcome of one BOS/COC step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub from: TrendState,
    pub to: TrendState,
    /// Direction of the structure break, when the BOS rule fired (even if the
    /// trend was already pointing that way).
    pub break_of_structure: Option<TrendState>,
    /// True when the COC rule reset the trend to NEUTRAL.
    pub change_of_character: bool,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Direction of a structure break, if `price` escapes the prior window.
/// An empty window never breaks.
pub fn detect_break<I>(price: f64, prior_window: I) -> Option<TrendState>
where
    I: IntoIterator<Item = f64>,
{
    let (lo, hi) = prior_window.into_iter().fold(None, |acc: Option<(f64, f64)>, p| {
        Some(acc.map_or((p, p), |(lo, hi)| (lo.min(p), hi.max(p))))
    })?;

    if price > hi {
        Some(TrendState::Up)
    } else if price < lo {
        Some(TrendState::Down)
    } else {
        None
    }
}

/// Change-of-character rule alone.
pub fn change_of_character(state: TrendState, price: f64, previous_price: Option<f64>) -> TrendState {
    match (state, previous_price) {
        (TrendState::Up, Some(prev)) if price < prev => TrendState::Neutral,
        (TrendState::Down, Some(prev)) if price > prev => TrendState::Neutral,
        _ => state,
    }
}

/// Run BOS then COC for one sample.
pub fn step<I>(
    state: TrendState,
    price: f64,
    previous_price: Option<f64>,
    prior_window: I,
) -> Transition
where
    I: IntoIterator<Item = f64>,
{
    let break_of_structure = detect_break(price, prior_window);
    let after_bos = break_of_structure.unwrap_or(state);
    let after_coc = change_of_character(after_bos, price, previous_price);

    Transition {
        from: state,
        to: after_coc,
        break_of_structure,
        change_of_character: after_coc != after_bos,
    }
}
