// =============================================================================
// WebSocket Handler — push-based ticker events
// =============================================================================
//
// Clients connect to `/api/v1/ws` (optionally `?symbol=AAPL`) and receive:
//   1. A `snapshot` message with the current state of every matching ticker.
//   2. Every subsequent `TickerEvent` for matching tickers, as JSON, the
//      moment it is published on the event bus.
//
// The handler also:
//   - Responds to Ping frames with Pong frames.
//   - Tells the client how many events it missed when it falls behind the
//     broadcast buffer, then carries on.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    response::IntoResponse,
};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::app_state::AppState;
use crate::ticker::TickerState;

// =============================================================================
// Query parameters / outbound frames
// =============================================================================

#[derive(Deserialize)]
pub struct WsQuery {
    symbol: Option<String>,
}

/// Control frames. Events go out as-is; their own `type` tag tells them apart.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Frame {
    Snapshot { tickers: Vec<TickerState> },
    Lagged { skipped: u64 },
}

/// Case-insensitive symbol filter; `None` lets everything through.
fn wanted(filter: Option<&str>, symbol: &str) -> bool {
    filter.map_or(true, |f| f.eq_ignore_ascii_case(symbol))
}

// =============================================================================
// WebSocket upgrade handler
// =============================================================================

pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
    Query(query): Query<WsQuery>,
) -> impl IntoResponse {
    let filter = query
        .symbol
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty());
    info!(filter = ?filter, "WebSocket connection accepted — upgrading");
    ws.on_upgrade(move |socket| handle_ws_connection(socket, state, filter))
}

// =============================================================================
// Connection handler
// =============================================================================

/// Manages a single WebSocket connection lifecycle.
///
/// Runs two concurrent branches via `tokio::select!`:
///   1. **Push** — forward every matching event from the bus.
///   2. **Recv** — process incoming client messages (Ping, Close).
async fn handle_ws_connection(socket: WebSocket, state: Arc<AppState>, filter: Option<String>) {
    // Subscribe before the snapshot so nothing published in between is lost.
    let mut events = state.events.subscribe();
    let (mut sender, mut receiver) = socket.split();

    let tickers: Vec<TickerState> = state
        .registry
        .snapshots()
        .into_iter()
        .filter(|t| wanted(filter.as_deref(), &t.symbol))
        .collect();
    if let Err(e) = send_json(&mut sender, &Frame::Snapshot { tickers }).await {
        warn!(error = %e, "Failed to send initial WebSocket snapshot");
        return;
    }

    loop {
        tokio::select! {
            // ── Push: forward bus events ────────────────────────────────
            event = events.recv() => {
                let sent = match event {
                    Ok(ev) if wanted(filter.as_deref(), &ev.symbol) => {
                        send_json(&mut sender, &ev).await
                    }
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(skipped, "WebSocket client lagging — events dropped");
                        send_json(&mut sender, &Frame::Lagged { skipped }).await
                    }
                    Err(RecvError::Closed) => {
                        info!("event bus closed — disconnecting");
                        break;
                    }
                };
                if let Err(e) = sent {
                    debug!(error = %e, "WebSocket send failed — disconnecting");
                    break;
                }
            }

            // ── Recv: process incoming messages ─────────────────────────
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Ping(data))) => {
                        if let Err(e) = sender.send(Message::Pong(data)).await {
                            debug!(error = %e, "Failed to send Pong — disconnecting");
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) => {
                        info!("WebSocket Close frame received — disconnecting");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        warn!(error = %e, "WebSocket receive error — disconnecting");
                        break;
                    }
                    None => {
                        info!("WebSocket stream ended (None)");
                        break;
                    }
                }
            }
        }
    }

    info!("WebSocket connection closed");
}

// =============================================================================
// Helpers
// =============================================================================

async fn send_json<S, T>(sender: &mut S, payload: &T) -> Result<(), axum::Error>
where
    S: futures_util::Sink<Message, Error = axum::Error> + Unpin,
    T: Serialize,
{
    match serde_json::to_string(payload) {
        Ok(json) => sender.send(Message::Text(json)).await,
        Err(e) => {
            // Serialisation errors are not network errors; don't disconnect.
            warn!(error = %e, "Failed to serialize WebSocket frame");
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::rest::router;
    use crate::events::{TickerEvent, TickerEventKind};
    use crate::runtime_config::RuntimeConfig;
    use crate::types::Signal;
    use chrono::Utc;
    use serde_json::Value;
    use tokio::net::{TcpListener, TcpStream};
    use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

    type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

    async fn serve() -> (Arc<AppState>, std::net::SocketAddr) {
        let mut config = RuntimeConfig::default();
        config.tickers.clear();
        let (state, _rx) = AppState::new(config);
        let state = Arc::new(state);
        state.register_ticker("AAPL", "USD", None).unwrap();
        state.register_ticker("MSFT", "USD", None).unwrap();

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = router(state.clone());
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        (state, addr)
    }

    async fn next_json(ws: &mut Client) -> Value {
        let msg = ws.next().await.unwrap().unwrap();
        serde_json::from_str(msg.to_text().unwrap()).unwrap()
    }

    fn accepted(symbol: &str, price: f64) -> TickerEvent {
        TickerEvent::new(symbol, Utc::now(), TickerEventKind::SampleAccepted { price })
    }

    #[test]
    fn symbol_filter_is_case_insensitive() {
        assert!(wanted(None, "AAPL"));
        assert!(wanted(Some("AAPL"), "aapl"));
        assert!(!wanted(Some("MSFT"), "AAPL"));
    }

    #[test]
    fn events_are_sent_with_their_own_tag() {
        let ev = TickerEvent::new(
            "AAPL",
            Utc::now(),
            TickerEventKind::SignalChanged {
                from: Signal::Neutral,
                to: Signal::Buy,
            },
        );
        let json = serde_json::to_value(&ev).unwrap();
        assert_eq!(json["type"], "signal_changed");
        assert_eq!(json["symbol"], "AAPL");
        assert_eq!(json["to"], "BUY");
    }

    #[test]
    fn lagged_frame_shape() {
        let json = serde_json::to_value(Frame::Lagged { skipped: 7 }).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "lagged", "skipped": 7 }));
    }

    #[tokio::test]
    async fn connection_gets_snapshot_then_filtered_events() {
        let (state, addr) = serve().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/api/v1/ws?symbol=aapl"))
            .await
            .unwrap();

        let snapshot = next_json(&mut ws).await;
        assert_eq!(snapshot["type"], "snapshot");
        let tickers = snapshot["tickers"].as_array().unwrap();
        assert_eq!(tickers.len(), 1);
        assert_eq!(tickers[0]["symbol"], "AAPL");

        // The snapshot is sent after subscribing, so both of these reach the
        // connection and only the AAPL one passes the filter.
        state.events.publish(accepted("MSFT", 410.0));
        state.events.publish(accepted("AAPL", 190.0));

        let event = next_json(&mut ws).await;
        assert_eq!(event["type"], "sample_accepted");
        assert_eq!(event["symbol"], "AAPL");
        assert_eq!(event["price"], 190.0);
    }

    #[tokio::test]
    async fn slow_connection_is_told_how_many_events_it_missed() {
        let (state, addr) = serve().await;
        let (mut ws, _) = connect_async(format!("ws://{addr}/api/v1/ws"))
            .await
            .unwrap();
        let snapshot = next_json(&mut ws).await;
        assert_eq!(snapshot["tickers"].as_array().unwrap().len(), 2);

        // Single-threaded runtime: the connection task cannot drain the bus
        // until this loop yields, so the buffer overflows.
        for i in 0..1100 {
            state.events.publish(accepted("AAPL", 100.0 + i as f64));
        }

        let lagged = next_json(&mut ws).await;
        assert_eq!(lagged["type"], "lagged");
        assert!(lagged["skipped"].as_u64().unwrap() > 0);

        let resumed = next_json(&mut ws).await;
        assert_eq!(resumed["type"], "sample_accepted");
    }
}
