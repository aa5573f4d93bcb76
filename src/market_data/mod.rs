// =============================================================================
// Market Data Module
// =============================================================================
//
// Bounded per-ticker storage for samples and derived signals.

pub mod ring_buffer;

pub use ring_buffer::{HistoryBuffer, SignalHistory};
