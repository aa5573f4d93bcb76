// =============================================================================
// Price Sources
// =============================================================================
//
// The only thing the ticker core needs from the outside world is a price with
// a timestamp. `PriceSource` is that seam; `ChartClient` is the HTTP
// implementation used in production and tests substitute scripted sources.

pub mod chart_client;

use std::future::Future;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::Sample;

pub use chart_client::ChartClient;

/// Latest price for an instrument as reported upstream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub currency: Option<String>,
}

pub trait PriceSource: Send + Sync + 'static {
    /// Latest quote for `symbol`.
    fn fetch_quote(&self, symbol: &str) -> impl Future<Output = Result<Quote>> + Send;

    /// Historical bars for `symbol`, any order.
    fn fetch_history(&self, symbol: &str) -> impl Future<Output = Result<Vec<Sample>>> + Send;
}
