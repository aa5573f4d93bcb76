// =============================================================================
// Chart API Client — quotes and historical bars over HTTP
// =============================================================================
//
// Talks to a Yahoo-Finance-compatible chart endpoint:
//
//   GET {base}/v8/finance/chart/{symbol}?interval=1m&range=1d
//
// Response shape (only the fields we read):
// ```json
// { "chart": { "result": [ {
//     "meta": { "currency": "USD", "regularMarketPrice": 189.3,
//               "regularMarketTime": 1709307000 },
//     "timestamp": [1709307000, ...],
//     "indicators": { "quote": [ { "close": [189.1, null, ...] } ] }
//   } ], "error": null } }
// ```
//
// Transport failures are `anyhow` errors; a response that arrives but cannot
// be used is a `DataError` so callers can tell bad data from a bad network.

use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use tracing::{debug, instrument};

use crate::error::DataError;
use crate::price_source::{PriceSource, Quote};
use crate::types::Sample;

/// Intraday bars used to derive the latest quote.
const QUOTE_INTERVAL: &str = "1m";
const QUOTE_RANGE: &str = "1d";

/// HTTP client for the chart endpoint.
#[derive(Clone)]
pub struct ChartClient {
    base_url: String,
    client: reqwest::Client,
    history_interval: String,
    history_range: String,
}

impl ChartClient {
    /// Create a new `ChartClient`.
    ///
    /// # Arguments
    /// * `base_url` — scheme + host, no trailing slash required.
    /// * `timeout` — per-request timeout.
    /// * `history_interval` / `history_range` — bar size and look-back used
    ///   by the bulk refill (e.g. `"1m"` / `"1d"`).
    pub fn new(
        base_url: impl Into<String>,
        timeout: Duration,
        history_interval: impl Into<String>,
        history_range: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ticker-watch/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build reqwest client")?;

        let base_url = base_url.into().trim_end_matches('/').to_string();
        debug!(base_url = %base_url, "ChartClient initialised");

        Ok(Self {
            base_url,
            client,
            history_interval: history_interval.into(),
            history_range: history_range.into(),
        })
    }

    fn chart_url(&self, symbol: &str) -> String {
        format!("{}/v8/finance/chart/{}", self.base_url, symbol)
    }

    /// GET the raw chart document for `symbol`.
    async fn get_chart(&self, symbol: &str, interval: &str, range: &str) -> Result<Value> {
        let url = self.chart_url(symbol);

        let resp = self
            .client
            .get(&url)
            .query(&[("interval", interval), ("range", range)])
            .send()
            .await
            .with_context(|| format!("GET {url} request failed"))?;

        let status = resp.status();
        let text = resp
            .text()
            .await
            .context("failed to read chart response body")?;

        if !status.is_success() {
            anyhow::bail!("chart endpoint returned {status} for {symbol}: {text}");
        }

        if text.trim().is_empty() {
            return Err(DataError::EmptyPayload.into());
        }

        let body: Value =
            serde_json::from_str(&text).map_err(|e| DataError::Parse(e.to_string()))?;
        Ok(body)
    }
}

impl PriceSource for ChartClient {
    #[instrument(skip(self), name = "chart::fetch_quote")]
    async fn fetch_quote(&self, symbol: &str) -> Result<Quote> {
        let body = self.get_chart(symbol, QUOTE_INTERVAL, QUOTE_RANGE).await?;
        let quote = parse_quote(&body)?;
        debug!(symbol, price = quote.price, "quote fetched");
        Ok(quote)
    }

    #[instrument(skip(self), name = "chart::fetch_history")]
    async fn fetch_history(&self, symbol: &str) -> Result<Vec<Sample>> {
        let body = self
            .get_chart(symbol, &self.history_interval, &self.history_range)
            .await?;
        let bars = parse_history(&body)?;
        debug!(symbol, count = bars.len(), "history fetched");
        Ok(bars)
    }
}

// ---------------------------------------------------------------------------
// Payload parsing
// ---------------------------------------------------------------------------

/// `chart.result[0]`, or the reason it is unusable.
fn chart_result(body: &Value) -> Result<&Value, DataError> {
    let chart = body.get("chart").ok_or_else(|| DataError::missing("chart"))?;

    if let Some(err) = chart.get("error").filter(|e| !e.is_null()) {
        let description = err
            .get("description")
            .and_then(Value::as_str)
            .map_or_else(|| err.to_string(), str::to_string);
        return Err(DataError::Parse(description));
    }

    let results = chart
        .get("result")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::missing("chart.result"))?;

    results.first().ok_or(DataError::EmptyPayload)
}

fn epoch_seconds(value: &Value, name: &str) -> Result<DateTime<Utc>, DataError> {
    let secs = value.as_i64().ok_or_else(|| DataError::missing(name))?;
    DateTime::from_timestamp(secs, 0)
        .ok_or_else(|| DataError::Parse(format!("{name} out of range: {secs}")))
}

/// Extract the latest quote from a chart document.
pub fn parse_quote(body: &Value) -> Result<Quote, DataError> {
    let meta = chart_result(body)?
        .get("meta")
        .ok_or_else(|| DataError::missing("meta"))?;

    let price = meta
        .get("regularMarketPrice")
        .and_then(Value::as_f64)
        .ok_or_else(|| DataError::missing("meta.regularMarketPrice"))?;

    let timestamp = epoch_seconds(
        meta.get("regularMarketTime").unwrap_or(&Value::Null),
        "meta.regularMarketTime",
    )?;

    let currency = meta
        .get("currency")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(Quote {
        price,
        timestamp,
        currency,
    })
}

/// Extract `(close, timestamp)` bars from a chart document. Bars with a null
/// close (no trades in that interval) are skipped.
pub fn parse_history(body: &Value) -> Result<Vec<Sample>, DataError> {
    let result = chart_result(body)?;

    let timestamps = result
        .get("timestamp")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::missing("timestamp"))?;

    let closes = result
        .pointer("/indicators/quote/0/close")
        .and_then(Value::as_array)
        .ok_or_else(|| DataError::missing("indicators.quote[0].close"))?;

    if timestamps.len() != closes.len() {
        return Err(DataError::Parse(format!(
            "timestamp/close length mismatch: {} vs {}",
            timestamps.len(),
            closes.len()
        )));
    }

    let mut bars = Vec::with_capacity(closes.len());
    for (ts, close) in timestamps.iter().zip(closes) {
        let Some(price) = close.as_f64() else {
            continue;
        };
        bars.push(Sample::new(price, epoch_seconds(ts, "timestamp[]")?));
    }

    if bars.is_empty() {
        return Err(DataError::EmptyPayload);
    }
    Ok(bars)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn chart(result: Value) -> Value {
        json!({ "chart": { "result": [result], "error": null } })
    }

    #[test]
    fn parse_quote_ok() {
        let body = chart(json!({
            "meta": {
                "currency": "USD",
                "symbol": "AAPL",
                "regularMarketPrice": 189.25,
                "regularMarketTime": 1709307000
            }
        }));
        let q = parse_quote(&body).expect("should parse");
        assert!((q.price - 189.25).abs() < f64::EPSILON);
        assert_eq!(q.timestamp.timestamp(), 1_709_307_000);
        assert_eq!(q.currency.as_deref(), Some("USD"));
    }

    #[test]
    fn parse_quote_missing_price() {
        let body = chart(json!({ "meta": { "regularMarketTime": 1709307000 } }));
        assert_eq!(
            parse_quote(&body).unwrap_err(),
            DataError::missing("meta.regularMarketPrice")
        );
    }

    #[test]
    fn parse_quote_null_price_is_missing() {
        let body = chart(json!({
            "meta": { "regularMarketPrice": null, "regularMarketTime": 1709307000 }
        }));
        assert!(matches!(
            parse_quote(&body),
            Err(DataError::MissingField(_))
        ));
    }

    #[test]
    fn empty_result_is_empty_payload() {
        let body = json!({ "chart": { "result": [], "error": null } });
        assert_eq!(parse_quote(&body).unwrap_err(), DataError::EmptyPayload);
        assert_eq!(parse_history(&body).unwrap_err(), DataError::EmptyPayload);
    }

    #[test]
    fn upstream_error_is_reported() {
        let body = json!({
            "chart": {
                "result": null,
                "error": { "code": "Not Found", "description": "No data found, symbol may be delisted" }
            }
        });
        assert_eq!(
            parse_quote(&body).unwrap_err(),
            DataError::Parse("No data found, symbol may be delisted".into())
        );
    }

    #[test]
    fn missing_chart_is_missing_field() {
        assert_eq!(
            parse_quote(&json!({})).unwrap_err(),
            DataError::missing("chart")
        );
    }

    #[test]
    fn parse_history_skips_null_closes() {
        let body = chart(json!({
            "meta": {},
            "timestamp": [1709307000, 1709307060, 1709307120],
            "indicators": { "quote": [ { "close": [100.5, null, 101.0] } ] }
        }));
        let bars = parse_history(&body).unwrap();
        assert_eq!(bars.len(), 2);
        assert!((bars[1].price - 101.0).abs() < f64::EPSILON);
        assert_eq!(bars[1].timestamp.timestamp(), 1_709_307_120);
    }

    #[test]
    fn parse_history_length_mismatch() {
        let body = chart(json!({
            "timestamp": [1709307000],
            "indicators": { "quote": [ { "close": [1.0, 2.0] } ] }
        }));
        assert!(matches!(parse_history(&body), Err(DataError::Parse(_))));
    }

    #[test]
    fn parse_history_all_null_is_empty() {
        let body = chart(json!({
            "timestamp": [1709307000],
            "indicators": { "quote": [ { "close": [null] } ] }
        }));
        assert_eq!(parse_history(&body).unwrap_err(), DataError::EmptyPayload);
    }

    #[test]
    fn chart_url_trims_trailing_slash() {
        let client = ChartClient::new(
            "https://example.test/",
            Duration::from_secs(5),
            "1m",
            "1d",
        )
        .unwrap();
        assert_eq!(
            client.chart_url("AAPL"),
            "https://example.test/v8/finance/chart/AAPL"
        );
    }
}
