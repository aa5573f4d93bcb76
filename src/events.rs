// =============================================================================
// Ticker Events — structured notifications from the orchestrator
// =============================================================================
//
// Every accepted (or rejected) sample produces zero or more events. They are
// fanned out on a `tokio::sync::broadcast` channel; the WebSocket feed is one
// subscriber, tests are another. Publishing never blocks and never fails:
// with no subscribers the event is simply dropped.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::types::{LevelKind, Signal, TrendState};

/// Default broadcast buffer. Slow subscribers past this lag and skip events.
const EVENT_BUFFER: usize = 1024;

/// What happened.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TickerEventKind {
    SampleAccepted {
        price: f64,
    },
    SampleRejected {
        reason: String,
    },
    DayRollover {
        previous_low: Option<f64>,
        previous_high: Option<f64>,
    },
    LevelDiscovered {
        level: LevelKind,
        price: f64,
    },
    SignalChanged {
        from: Signal,
        to: Signal,
    },
    BreakOfStructure {
        direction: TrendState,
    },
    ChangeOfCharacter {
        from: TrendState,
    },
    HistoryRefilled {
        samples: usize,
    },
}

/// A single event, stamped with the instrument and the sample time.
#[derive(Debug, Clone, Serialize)]
pub struct TickerEvent {
    pub id: Uuid,
    pub symbol: String,
    pub at: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: TickerEventKind,
}

impl TickerEvent {
    pub fn new(symbol: impl Into<String>, at: DateTime<Utc>, kind: TickerEventKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            symbol: symbol.into(),
            at,
            kind,
        }
    }
}

/// Cloneable handle onto the shared event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<TickerEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(EVENT_BUFFER)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TickerEvent> {
        self.tx.subscribe()
    }

    pub fn publish(&self, event: TickerEvent) {
        // Err only means nobody is listening right now.
        let _ = self.tx.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
