use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;
use utoipa::ToSchema;

use super::order::OrderId;

/// Screen the kiosk should show after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum DisplayState {
    Ready,
    Accepted,
    MalformedScan,
    InvalidOrder,
    Unfulfillable,
    StationFault,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum StationEvent {
    OrderAccepted {
        order_id: OrderId,
        transaction_tag: String,
        total_minor: i64,
        item_count: i64,
    },
    OrderRejected {
        state: DisplayState,
        reason: String,
    },
    ScanMalformed {
        detail: String,
    },
    CatalogStale {
        last_fetched_at: Option<DateTime<Utc>>,
        error: String,
    },
    PrinterUnreachable {
        transaction_tag: String,
        error: String,
    },
    PersistenceFailed {
        error: String,
    },
    StationInfo {
        station: String,
        order_count: i64,
        unsynced_count: i64,
        printer_ready: bool,
    },
    /// The station could not act on a scan for reasons unrelated to the order.
    StationUnavailable {
        error: String,
    },
}

impl StationEvent {
    pub fn display_state(&self) -> DisplayState {
        match self {
            StationEvent::OrderAccepted { .. } => DisplayState::Accepted,
            StationEvent::OrderRejected { state, .. } => *state,
            StationEvent::ScanMalformed { .. } => DisplayState::MalformedScan,
            StationEvent::PersistenceFailed { .. } | StationEvent::StationUnavailable { .. } => {
                DisplayState::StationFault
            }
            StationEvent::CatalogStale { .. }
            | StationEvent::PrinterUnreachable { .. }
            | StationEvent::StationInfo { .. } => DisplayState::Ready,
        }
    }
}

/// Fan-out of status events to the display and anyone else listening.
#[derive(Debug, Clone)]
pub struct EventBus {
    sender: broadcast::Sender<StationEvent>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Events published while nobody is subscribed are dropped.
    pub fn publish(&self, event: StationEvent) {
        let _ = self.sender.send(event);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StationEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(64)
    }
}
