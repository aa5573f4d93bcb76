// =============================================================================
// Central Application State
// =============================================================================
//
// Ties together the ticker registry, the event bus, the runtime config and
// the error log. One `Arc<AppState>` is shared by every poller, the refill
// loop and the HTTP/WebSocket handlers.
//
// Thread safety:
//   - Atomic counter for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared collections.
//   - Each ticker carries its own lock inside the registry.
//
// New tickers (from config at startup or from the API later) are announced on
// an unbounded mpsc channel; the supervisor in `main` owns the receiver and
// spawns one poller per registration.
// =============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::RegistryError;
use crate::events::EventBus;
use crate::registry::{SharedTicker, TickerRegistry};
use crate::runtime_config::{RuntimeConfig, TickerConfig};
use crate::scheduler::ScheduleConfig;

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the `/errors` endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// ISO 8601 timestamp.
    pub at: String,
}

/// A ticker that needs a poller.
#[derive(Debug, Clone)]
pub struct Registration {
    pub ticker: SharedTicker,
    pub schedule: ScheduleConfig,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

pub struct AppState {
    /// Monotonically increasing version counter. Incremented on every
    /// accepted sample, refill and recorded error.
    pub state_version: AtomicU64,

    pub runtime_config: Arc<RwLock<RuntimeConfig>>,

    pub registry: Arc<TickerRegistry>,
    pub events: EventBus,

    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    registrations: mpsc::UnboundedSender<Registration>,

    /// Used for uptime in `/health`.
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Build the state and register every ticker listed in `config`.
    ///
    /// Returns the receiving half of the registration channel; it already
    /// holds one `Registration` per configured ticker.
    pub fn new(config: RuntimeConfig) -> (Self, mpsc::UnboundedReceiver<Registration>) {
        let events = EventBus::new();
        let registry = Arc::new(TickerRegistry::new(config.engine.clone(), events.clone()));
        let (tx, rx) = mpsc::unbounded_channel();

        let initial = config.tickers.clone();
        let state = Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            registry,
            events,
            recent_errors: RwLock::new(Vec::new()),
            registrations: tx,
            start_time: std::time::Instant::now(),
        };

        for entry in initial {
            if let Err(e) = state.spawn_registration(&entry) {
                warn!(symbol = %entry.symbol, error = %e, "skipping configured ticker");
                state.push_error(format!("config: {e}"));
            }
        }

        (state, rx)
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. Capped at [`MAX_RECENT_ERRORS`]; oldest
    /// entries are evicted first.
    pub fn push_error(&self, msg: String) {
        let record = ErrorRecord {
            message: msg,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
        drop(errors);

        self.increment_version();
    }

    // ── Registration ────────────────────────────────────────────────────

    /// Register a new ticker at runtime and remember it in the config so it
    /// is persisted on shutdown.
    pub fn register_ticker(
        &self,
        symbol: &str,
        currency: &str,
        schedule: Option<ScheduleConfig>,
    ) -> Result<SharedTicker, RegistryError> {
        let entry = TickerConfig {
            symbol: symbol.to_string(),
            currency: currency.to_string(),
            schedule,
        };
        let ticker = self.spawn_registration(&entry)?;

        let persisted = {
            let t = ticker.read();
            TickerConfig {
                symbol: t.symbol().to_string(),
                currency: t.currency().to_string(),
                schedule,
            }
        };
        self.runtime_config.write().upsert_ticker(persisted);
        self.increment_version();
        Ok(ticker)
    }

    /// Validate the schedule, add to the registry and hand the ticker to the
    /// supervisor.
    fn spawn_registration(&self, entry: &TickerConfig) -> Result<SharedTicker, RegistryError> {
        let schedule = self.runtime_config.read().schedule_for(entry);
        schedule
            .build()
            .map_err(|e| RegistryError::InvalidSchedule(format!("{schedule:?}: {e}")))?;

        let ticker = self.registry.add(&entry.symbol, &entry.currency)?;

        if self
            .registrations
            .send(Registration {
                ticker: ticker.clone(),
                schedule,
            })
            .is_err()
        {
            warn!(symbol = %entry.symbol, "supervisor gone, ticker will not be polled");
        }
        Ok(ticker)
    }
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    fn empty_config() -> RuntimeConfig {
        let mut config = RuntimeConfig::default();
        config.tickers.clear();
        config
    }

    #[test]
    fn configured_tickers_are_registered_and_announced() {
        let (state, mut rx) = AppState::new(RuntimeConfig::default());
        assert_eq!(state.registry.symbols(), vec!["AAPL", "GOOGL", "MSFT"]);

        let first = rx.try_recv().unwrap();
        assert_eq!(first.ticker.read().symbol(), "AAPL");
        assert_eq!(first.schedule, ScheduleConfig::Interval { secs: 60 });
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn bad_configured_ticker_is_skipped_and_logged() {
        let mut config = empty_config();
        config.tickers.push(TickerConfig {
            symbol: "NOT VALID".into(),
            currency: "USD".into(),
            schedule: None,
        });
        let (state, mut rx) = AppState::new(config);
        assert_eq!(state.registry.len(), 0);
        assert_eq!(state.recent_errors.read().len(), 1);
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn register_ticker_announces_and_persists() {
        let (state, mut rx) = AppState::new(empty_config());
        let schedule = ScheduleConfig::Daily { hour: 21, minute: 0 };
        let before = state.current_state_version();

        state.register_ticker("tsla", "usd", Some(schedule)).unwrap();

        let reg = rx.try_recv().unwrap();
        assert_eq!(reg.schedule, schedule);
        assert_eq!(reg.ticker.read().symbol(), "TSLA");
        assert!(state.current_state_version() > before);

        let config = state.runtime_config.read();
        assert_eq!(config.tickers.len(), 1);
        assert_eq!(config.tickers[0].symbol, "TSLA");
        assert_eq!(config.tickers[0].schedule, Some(schedule));
    }

    #[test]
    fn register_ticker_rejects_bad_input() {
        let (state, mut rx) = AppState::new(empty_config());
        state.register_ticker("IBM", "USD", None).unwrap();
        let _ = rx.try_recv();

        assert!(matches!(
            state.register_ticker("ibm", "USD", None),
            Err(RegistryError::DuplicateSymbol(_))
        ));
        assert!(matches!(
            state.register_ticker("ORCL", "USD", Some(ScheduleConfig::Interval { secs: 0 })),
            Err(RegistryError::InvalidSchedule(_))
        ));
        assert!(rx.try_recv().is_err());
        assert_eq!(state.runtime_config.read().tickers.len(), 1);
    }

    #[test]
    fn error_log_is_capped() {
        let (state, _rx) = AppState::new(empty_config());
        for i in 0..(MAX_RECENT_ERRORS + 5) {
            state.push_error(format!("error {i}"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "error 5");
    }
}
