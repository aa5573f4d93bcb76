// =============================================================================
// Ticker Registry — symbol → ticker
// =============================================================================
//
// Each ticker sits behind its own `parking_lot::RwLock`. Writers (the single
// poller per symbol) hold the write guard for one whole update cycle, so any
// reader taking a snapshot sees either the state before a sample or the
// state after it, never a mix.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::info;

use crate::error::RegistryError;
use crate::events::EventBus;
use crate::ticker::{Ticker, TickerSettings, TickerState};

pub type SharedTicker = Arc<RwLock<Ticker>>;

/// Characters allowed in a symbol besides ASCII letters and digits
/// (`BRK.B`, `^GSPC`, `EURUSD=X`, `BTC-USD`).
const SYMBOL_PUNCTUATION: &[char] = &['.', '-', '^', '='];

const MAX_SYMBOL_LEN: usize = 16;

pub struct TickerRegistry {
    tickers: RwLock<HashMap<String, SharedTicker>>,
    settings: TickerSettings,
    events: EventBus,
}

impl TickerRegistry {
    pub fn new(settings: TickerSettings, events: EventBus) -> Self {
        Self {
            tickers: RwLock::new(HashMap::new()),
            settings,
            events,
        }
    }

    /// Trim and uppercase `raw`, rejecting empty or odd-looking symbols.
    pub fn normalize_symbol(raw: &str) -> Result<String, RegistryError> {
        let symbol = raw.trim().to_uppercase();
        let valid = !symbol.is_empty()
            && symbol.len() <= MAX_SYMBOL_LEN
            && symbol
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || SYMBOL_PUNCTUATION.contains(&c));
        if valid {
            Ok(symbol)
        } else {
            Err(RegistryError::InvalidSymbol(raw.to_string()))
        }
    }

    /// Register a new instrument. Duplicate symbols are rejected.
    pub fn add(&self, symbol: &str, currency: &str) -> Result<SharedTicker, RegistryError> {
        let symbol = Self::normalize_symbol(symbol)?;

        let mut map = self.tickers.write();
        if map.contains_key(&symbol) {
            return Err(RegistryError::DuplicateSymbol(symbol));
        }

        let ticker = Ticker::new(symbol.clone(), currency.trim().to_uppercase(), self.settings.clone())
            .with_events(self.events.clone());
        let shared = Arc::new(RwLock::new(ticker));
        map.insert(symbol.clone(), shared.clone());

        info!(symbol = %symbol, total = map.len(), "ticker registered");
        Ok(shared)
    }

    /// Case-insensitive lookup.
    pub fn get(&self, symbol: &str) -> Option<SharedTicker> {
        let key = symbol.trim().to_uppercase();
        self.tickers.read().get(&key).cloned()
    }

    /// Registered symbols, sorted.
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.tickers.read().keys().cloned().collect();
        symbols.sort();
        symbols
    }

    /// Snapshot of every ticker, sorted by symbol.
    pub fn snapshots(&self) -> Vec<TickerState> {
        let tickers: Vec<SharedTicker> = {
            let map = self.tickers.read();
            let mut entries: Vec<(&String, &SharedTicker)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            entries.into_iter().map(|(_, t)| t.clone()).collect()
        };
        tickers.iter().map(|t| t.read().state()).collect()
    }

    pub fn len(&self) -> usize {
        self.tickers.read().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn registry() -> TickerRegistry {
        TickerRegistry::new(TickerSettings::default(), EventBus::new())
    }

    #[test]
    fn add_normalises_symbol_and_currency() {
        let reg = registry();
        let t = reg.add("  aapl ", "usd").unwrap();
        assert_eq!(t.read().symbol(), "AAPL");
        assert_eq!(t.read().currency(), "USD");
        assert!(reg.get("Aapl").is_some());
    }

    #[test]
    fn duplicate_symbol_is_rejected() {
        let reg = registry();
        reg.add("MSFT", "USD").unwrap();
        assert_eq!(
            reg.add("msft", "USD").unwrap_err(),
            RegistryError::DuplicateSymbol("MSFT".into())
        );
        assert_eq!(reg.len(), 1);
    }

    #[test]
    fn invalid_symbols_are_rejected() {
        for bad in ["", "   ", "AA PL", "../etc", "A/B", "TOOLONGSYMBOLNAME123"] {
            assert!(
                matches!(TickerRegistry::normalize_symbol(bad), Err(RegistryError::InvalidSymbol(_))),
                "{bad:?} should be invalid"
            );
        }
        for good in ["BRK.B", "^GSPC", "EURUSD=X", "BTC-USD"] {
            assert!(TickerRegistry::normalize_symbol(good).is_ok(), "{good} should be valid");
        }
    }

    #[test]
    fn snapshots_are_sorted_and_reflect_updates() {
        let reg = registry();
        reg.add("TSLA", "USD").unwrap();
        let aapl = reg.add("AAPL", "USD").unwrap();
        aapl.write().accept_sample(190.0, Utc::now()).unwrap();

        let snaps = reg.snapshots();
        assert_eq!(reg.symbols(), vec!["AAPL", "TSLA"]);
        assert_eq!(snaps[0].symbol, "AAPL");
        assert_eq!(snaps[0].current_price, Some(190.0));
        assert_eq!(snaps[1].current_price, None);
    }

    #[test]
    fn unknown_symbol_is_none() {
        assert!(registry().get("NOPE").is_none());
    }
}
