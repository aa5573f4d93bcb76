// =============================================================================
// Runtime Configuration — ticker list, schedules and engine tuning
// =============================================================================
//
// Loaded from `ticker_config.json` at startup and written back on shutdown
// (so tickers added through the API survive a restart of the *config*, not
// of their price history).
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::scheduler::ScheduleConfig;
use crate::ticker::TickerSettings;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_true() -> bool {
    true
}

fn default_bind_addr() -> String {
    "0.0.0.0:3001".to_string()
}

fn default_price_source_url() -> String {
    "https://query1.finance.yahoo.com".to_string()
}

fn default_request_timeout_secs() -> u64 {
    10
}

fn default_currency() -> String {
    "USD".to_string()
}

fn default_poll_schedule() -> ScheduleConfig {
    ScheduleConfig::Interval { secs: 60 }
}

fn default_refill_schedule() -> ScheduleConfig {
    ScheduleConfig::Daily { hour: 0, minute: 5 }
}

fn default_history_interval() -> String {
    "1m".to_string()
}

fn default_history_range() -> String {
    "1d".to_string()
}

fn default_tickers() -> Vec<TickerConfig> {
    ["AAPL", "MSFT", "GOOGL"]
        .into_iter()
        .map(|s| TickerConfig {
            symbol: s.to_string(),
            currency: default_currency(),
            schedule: None,
        })
        .collect()
}

// =============================================================================
// TickerConfig
// =============================================================================

/// One instrument to track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TickerConfig {
    pub symbol: String,

    /// Currency shown until the first quote reports the real one.
    #[serde(default = "default_currency")]
    pub currency: String,

    /// Per-ticker poll schedule; falls back to `RuntimeConfig::poll_schedule`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schedule: Option<ScheduleConfig>,
}

// =============================================================================
// RefillConfig
// =============================================================================

/// Daily bulk-history refill.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefillConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_refill_schedule")]
    pub schedule: ScheduleConfig,

    /// Bar size requested from the price source.
    #[serde(default = "default_history_interval")]
    pub interval: String,

    /// Look-back requested from the price source.
    #[serde(default = "default_history_range")]
    pub range: String,
}

impl Default for RefillConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            schedule: default_refill_schedule(),
            interval: default_history_interval(),
            range: default_history_range(),
        }
    }
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Server & upstream --------------------------------------------------

    /// Address the REST/WebSocket API listens on.
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Base URL of the chart API.
    #[serde(default = "default_price_source_url")]
    pub price_source_url: String,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    // --- Tickers ------------------------------------------------------------

    #[serde(default = "default_tickers")]
    pub tickers: Vec<TickerConfig>,

    /// Schedule for tickers that do not set their own.
    #[serde(default = "default_poll_schedule")]
    pub poll_schedule: ScheduleConfig,

    #[serde(default)]
    pub refill: RefillConfig,

    // --- Engine -------------------------------------------------------------

    /// Window sizes and classifier thresholds.
    #[serde(default)]
    pub engine: TickerSettings,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            price_source_url: default_price_source_url(),
            request_timeout_secs: default_request_timeout_secs(),
            tickers: default_tickers(),
            poll_schedule: default_poll_schedule(),
            refill: RefillConfig::default(),
            engine: TickerSettings::default(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        info!(
            path = %path.display(),
            tickers = config.tickers.len(),
            poll_schedule = %config.poll_schedule,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Replace the ticker list with comma-separated `symbols`, keeping any
    /// existing per-ticker settings for symbols that remain.
    pub fn override_symbols(&mut self, symbols: &str) {
        let wanted: Vec<String> = symbols
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
        if wanted.is_empty() {
            return;
        }

        self.tickers = wanted
            .into_iter()
            .map(|symbol| {
                self.tickers
                    .iter()
                    .find(|t| t.symbol.eq_ignore_ascii_case(&symbol))
                    .cloned()
                    .unwrap_or(TickerConfig {
                        symbol,
                        currency: default_currency(),
                        schedule: None,
                    })
            })
            .collect();
    }

    /// Add or replace the entry for `symbol`.
    pub fn upsert_ticker(&mut self, entry: TickerConfig) {
        match self
            .tickers
            .iter_mut()
            .find(|t| t.symbol.eq_ignore_ascii_case(&entry.symbol))
        {
            Some(existing) => *existing = entry,
            None => self.tickers.push(entry),
        }
    }

    /// Effective poll schedule for `ticker`.
    pub fn schedule_for(&self, ticker: &TickerConfig) -> ScheduleConfig {
        ticker.schedule.unwrap_or(self.poll_schedule)
    }
}
