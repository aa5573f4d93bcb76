// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All endpoints live under `/api/v1/`. The service is read-mostly: the only
// mutation is registering a new ticker, which is handed to the supervisor
// for polling.
//
// CORS is configured permissively; the API carries no credentials.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    routing::get,
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::app_state::AppState;
use crate::error::RegistryError;
use crate::scheduler::ScheduleConfig;

type ApiError = (StatusCode, Json<serde_json::Value>);

fn api_error(status: StatusCode, message: impl Into<String>) -> ApiError {
    (
        status,
        Json(serde_json::json!({ "error": message.into() })),
    )
}

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/tickers", get(list_tickers).post(add_ticker))
        .route("/api/v1/tickers/:symbol", get(ticker_state))
        .route("/api/v1/tickers/:symbol/history", get(ticker_history))
        .route("/api/v1/errors", get(recent_errors))
        // ── WebSocket (handled in ws module but mounted here) ────────
        .route("/api/v1/ws", get(crate::api::ws::ws_handler))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

// =============================================================================
// Health
// =============================================================================

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
    uptime_secs: u64,
    tickers: usize,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let resp = HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
        uptime_secs: state.start_time.elapsed().as_secs(),
        tickers: state.registry.len(),
    };
    Json(resp)
}

// =============================================================================
// Tickers
// =============================================================================

async fn list_tickers(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.registry.snapshots())
}

async fn ticker_state(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = state
        .registry
        .get(&symbol)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown ticker: {symbol}")))?;
    let snapshot = ticker.read().state();
    Ok(Json(snapshot))
}

#[derive(Deserialize)]
struct HistoryQuery {
    n: Option<usize>,
}

#[derive(Serialize)]
struct HistoryResponse {
    symbol: String,
    prices: Vec<f64>,
}

async fn ticker_history(
    State(state): State<Arc<AppState>>,
    Path(symbol): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ticker = state
        .registry
        .get(&symbol)
        .ok_or_else(|| api_error(StatusCode::NOT_FOUND, format!("unknown ticker: {symbol}")))?;

    let guard = ticker.read();
    let n = query.n.unwrap_or(usize::MAX);
    Ok(Json(HistoryResponse {
        symbol: guard.symbol().to_string(),
        prices: guard.history(n),
    }))
}

#[derive(Deserialize)]
struct AddTickerRequest {
    symbol: String,
    #[serde(default)]
    currency: Option<String>,
    #[serde(default)]
    schedule: Option<ScheduleConfig>,
}

async fn add_ticker(
    State(state): State<Arc<AppState>>,
    Json(req): Json<AddTickerRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let currency = req.currency.unwrap_or_else(|| "USD".to_string());

    let ticker = state
        .register_ticker(&req.symbol, &currency, req.schedule)
        .map_err(|e| {
            warn!(symbol = %req.symbol, error = %e, "ticker registration rejected");
            let status = match e {
                RegistryError::DuplicateSymbol(_) => StatusCode::CONFLICT,
                RegistryError::InvalidSymbol(_) | RegistryError::InvalidSchedule(_) => {
                    StatusCode::BAD_REQUEST
                }
            };
            api_error(status, e.to_string())
        })?;

    let snapshot = ticker.read().state();
    info!(symbol = %snapshot.symbol, "ticker added via API");
    Ok((StatusCode::CREATED, Json(snapshot)))
}

// =============================================================================
// Error log
// =============================================================================

async fn recent_errors(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let errors = state.recent_errors.read().clone();
    Json(errors)
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::Request;
    use chrono::Utc;
    use serde_json::Value;
    use tower::ServiceExt;

    use crate::runtime_config::RuntimeConfig;

    fn app() -> (Arc<AppState>, Router) {
        let mut config = RuntimeConfig::default();
        config.tickers.clear();
        let (state, _rx) = AppState::new(config);
        let state = Arc::new(state);
        (state.clone(), router(state))
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap()
        };
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::builder().uri(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, body: Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    #[tokio::test]
    async fn health_reports_ok() {
        let (_state, app) = app();
        let (status, body) = send(app, get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert_eq!(body["tickers"], 0);
    }

    #[tokio::test]
    async fn post_ticker_creates_then_conflicts() {
        let (state, app) = app();

        let (status, body) = send(
            app.clone(),
            post_json("/api/v1/tickers", serde_json::json!({ "symbol": "nvda" })),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["symbol"], "NVDA");
        assert_eq!(body["signal"], "NEUTRAL");
        assert_eq!(state.registry.len(), 1);

        let (status, _) = send(
            app,
            post_json("/api/v1/tickers", serde_json::json!({ "symbol": "NVDA" })),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn post_ticker_rejects_invalid_input() {
        let (_state, app) = app();
        let (status, body) = send(
            app.clone(),
            post_json("/api/v1/tickers", serde_json::json!({ "symbol": "  " })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap().contains("invalid symbol"));

        let (status, _) = send(
            app,
            post_json(
                "/api/v1/tickers",
                serde_json::json!({ "symbol": "IBM", "schedule": { "kind": "daily", "hour": 25, "minute": 0 } }),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn ticker_state_and_history() {
        let (state, app) = app();
        let ticker = state.register_ticker("AAPL", "USD", None).unwrap();
        {
            let mut t = ticker.write();
            let now = Utc::now();
            for (i, p) in [190.0, 191.0, 192.5].into_iter().enumerate() {
                t.accept_sample(p, now + chrono::Duration::seconds(i as i64))
                    .unwrap();
            }
        }

        let (status, body) = send(app.clone(), get("/api/v1/tickers/aapl")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["current_price"], 192.5);
        assert_eq!(body["previous_price"], 191.0);

        let (status, body) = send(app.clone(), get("/api/v1/tickers/AAPL/history?n=2")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["prices"], serde_json::json!([191.0, 192.5]));

        let (_, body) = send(app.clone(), get("/api/v1/tickers/AAPL/history")).await;
        assert_eq!(body["prices"].as_array().unwrap().len(), 3);

        let (_, body) = send(app, get("/api/v1/tickers")).await;
        assert_eq!(body.as_array().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unknown_ticker_is_404() {
        let (_state, app) = app();
        let (status, _) = send(app.clone(), get("/api/v1/tickers/NOPE")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _) = send(app, get("/api/v1/tickers/NOPE/history")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn errors_endpoint_lists_recorded_errors() {
        let (state, app) = app();
        state.push_error("AAPL: upstream payload was empty".into());
        let (status, body) = send(app, get("/api/v1/errors")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["message"], "AAPL: upstream payload was empty");
    }
}
