// =============================================================================
// Signals Module
// =============================================================================
//
// Turns indicator readings into discrete trading signals.

pub mod classifier;

pub use classifier::{classify_with, SignalInputs, SignalThresholds};
