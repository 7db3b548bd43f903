pub mod station;

use std::sync::Arc;

use utoipa::OpenApi;

use crate::application::scan_queue::ScanQueue;
use crate::application::station::{StationController, StationStatus};
use crate::application::sync_engine::SyncEngine;
use crate::domain::events::DisplayState;
use crate::domain::order::{LineItem, Order, Receipt, ReceiptLine};
use crate::domain::ports::OrderLedger;

/// Shared by every worker of the HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub ledger: Arc<dyn OrderLedger>,
    pub controller: Arc<StationController>,
    pub scans: ScanQueue,
    pub sync: Arc<SyncEngine>,
}

#[derive(OpenApi)]
#[openapi(
    paths(
        station::get_status,
        station::list_unsynced,
        station::get_order,
        station::submit_scan,
        station::refresh_catalog,
        station::trigger_sync,
    ),
    components(schemas(
        StationStatus,
        Order,
        LineItem,
        Receipt,
        ReceiptLine,
        DisplayState,
        station::ScanResponse,
        station::SyncResponse,
    )),
    tags((name = "station", description = "Scan station ledger and sync"))
)]
pub struct ApiDoc;
