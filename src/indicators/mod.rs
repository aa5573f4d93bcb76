// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free computations over the rolling price window.
// Degenerate inputs (empty or single-sample windows) produce neutral
// fallback values instead of errors.

pub mod levels;
pub mod volatility;
