// =============================================================================
// Volatility & Trend Strength
// =============================================================================
//
// Both statistics run over the most recent `INDICATOR_WINDOW` prices
// (including the latest one).
//
//   volatility     = sqrt( Σ (p - mean)² / n )          (population σ)
//   trend_strength = price - SMA(window)
//
// Trend strength is then adjusted by where the price sits relative to the
// known levels:
//   price <= min(support)     => × 1.2   (amplify)
//   price >= max(resistance)  => × -1.2  (invert and amplify)
//
// An empty window is not an error: both statistics fall back to 0.0.

/// Number of trailing prices used for volatility and the SMA.
pub const INDICATOR_WINDOW: usize = 10;

/// Multiplier applied when price sits on or below every support level.
pub const SUPPORT_AMPLIFIER: f64 = 1.2;

/// Multiplier applied when price sits on or above every resistance level.
pub const RESISTANCE_AMPLIFIER: f64 = -1.2;

/// Simple moving average of `prices`. Returns 0.0 for an empty window.
pub fn sma<I>(prices: I) -> f64
where
    I: IntoIterator<Item = f64>,
{
    let (sum, count) = prices
        .into_iter()
        .fold((0.0_f64, 0_usize), |(sum, count), p| (sum + p, count + 1));
    if count == 0 {
        return 0.0;
    }
    sum / count as f64
}

/// Population standard deviation of `prices`.
///
/// The iterator is walked twice (mean, then variance), hence the `Clone`
/// bound. One sample yields 0.0, as does an empty window.
pub fn volatility<I>(prices: I) -> f64
where
    I: Iterator<Item = f64> + Clone,
{
    let mean = sma(prices.clone());
    let (sum_sq, count) = prices.fold((0.0_f64, 0_usize), |(acc, count), p| {
        (acc + (p - mean).powi(2), count + 1)
    });
    if count == 0 {
        return 0.0;
    }
    let variance = sum_sq / count as f64;
    if variance.is_finite() {
        variance.sqrt()
    } else {
        0.0
    }
}

/// Raw trend strength: distance of `price` from the window's SMA, before any
/// level adjustment.
pub fn raw_trend_strength<I>(price: f64, prices: I) -> f64
where
    I: Iterator<Item = f64> + Clone,
{
    if prices.clone().next().is_none() {
        return 0.0;
    }
    price - sma(prices)
}

/// Apply the support/resistance positional adjustment to a raw trend
/// strength. Empty level sets never trigger their branch.
pub fn adjust_for_levels(raw: f64, price: f64, support: &[f64], resistance: &[f64]) -> f64 {
    let min_support = support.iter().copied().reduce(f64::min);
    let max_resistance = resistance.iter().copied().reduce(f64::max);

    match (min_support, max_resistance) {
        (Some(s), _) if price <= s => raw * SUPPORT_AMPLIFIER,
        (_, Some(r)) if price >= r => raw * RESISTANCE_AMPLIFIER,
        _ => raw,
    }
}

/// Level-adjusted trend strength for `price` over `prices`.
pub fn trend_strength<I>(price: f64, prices: I, support: &[f64], resistance: &[f64]) -> f64
where
    I: Iterator<Item = f64> + Clone,
{
    adjust_for_levels(raw_trend_strength(price, prices), price, support, resistance)
}
