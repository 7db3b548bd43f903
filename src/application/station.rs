use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use utoipa::ToSchema;

use super::catalog_cache::CatalogCache;
use super::run_blocking;
use super::sync_engine::SyncEngine;
use crate::domain::errors::DomainError;
use crate::domain::events::{DisplayState, EventBus, StationEvent};
use crate::domain::order::{Order, Receipt, StationIdentity};
use crate::domain::ports::{OrderLedger, ReceiptPrinter};
use crate::domain::validation::{validate, OrderRequest};

/// Counters and health shown on the kiosk's info screen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct StationStatus {
    pub station: String,
    pub order_count: i64,
    pub unsynced_count: i64,
    pub printer_ready: bool,
    pub catalog_loaded: bool,
    pub catalog_fetched_at: Option<DateTime<Utc>>,
    pub catalog_items: usize,
    pub sync_in_flight: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanResult {
    Accepted {
        order: Order,
        receipt: Receipt,
        printed: bool,
    },
    Info(StationStatus),
}

/// Turns scans into recorded, printed and queued-for-sync orders.
///
/// Callers must feed scans one at a time (see `ScanQueue`); an order is
/// durably recorded before the next scan is looked at.
pub struct StationController {
    ledger: Arc<dyn OrderLedger>,
    catalog: Arc<CatalogCache>,
    sync: Arc<SyncEngine>,
    printer: Arc<dyn ReceiptPrinter>,
    identity: StationIdentity,
    events: EventBus,
}

impl StationController {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        catalog: Arc<CatalogCache>,
        sync: Arc<SyncEngine>,
        printer: Arc<dyn ReceiptPrinter>,
        identity: StationIdentity,
        events: EventBus,
    ) -> Self {
        Self {
            ledger,
            catalog,
            sync,
            printer,
            identity,
            events,
        }
    }

    pub async fn process_scan(&self, raw: &str) -> Result<ScanResult, DomainError> {
        let result = match OrderRequest::parse(raw) {
            Ok(request) if is_info_request(&request) => return self.show_info().await,
            Ok(request) => self.place_order(&request).await,
            Err(e) => Err(e),
        };
        self.report(raw, &result);
        result
    }

    async fn show_info(&self) -> Result<ScanResult, DomainError> {
        match self.status().await {
            Ok(status) => {
                self.events.publish(StationEvent::StationInfo {
                    station: status.station.clone(),
                    order_count: status.order_count,
                    unsynced_count: status.unsynced_count,
                    printer_ready: status.printer_ready,
                });
                Ok(ScanResult::Info(status))
            }
            Err(e) => {
                log::error!("station info unavailable: {e}");
                self.events.publish(StationEvent::StationUnavailable {
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    async fn place_order(&self, request: &OrderRequest) -> Result<ScanResult, DomainError> {
        let snapshot = self.catalog.current().ok_or(DomainError::CatalogUnavailable)?;
        let validated = validate(request, &snapshot)?;

        let ledger = Arc::clone(&self.ledger);
        let (order, validated) =
            run_blocking(move || ledger.insert(&validated).map(|order| (order, validated))).await?;

        let receipt = Receipt::new(&self.identity, order.id, &validated);
        let printed = self.print(&receipt).await;
        self.sync.schedule(order.clone());

        Ok(ScanResult::Accepted {
            order,
            receipt,
            printed,
        })
    }

    /// The sale is already recorded; a printer problem only gets reported.
    async fn print(&self, receipt: &Receipt) -> bool {
        let printer = Arc::clone(&self.printer);
        let job = receipt.clone();
        let error = match tokio::task::spawn_blocking(move || printer.print(&job)).await {
            Ok(Ok(())) => return true,
            Ok(Err(e)) => e.to_string(),
            Err(e) => e.to_string(),
        };

        log::error!("receipt {} was not printed: {}", receipt.transaction_tag, error);
        self.events.publish(StationEvent::PrinterUnreachable {
            transaction_tag: receipt.transaction_tag.clone(),
            error,
        });
        false
    }

    fn report(&self, raw: &str, result: &Result<ScanResult, DomainError>) {
        let event = match result {
            Ok(ScanResult::Accepted { order, receipt, .. }) => StationEvent::OrderAccepted {
                order_id: order.id,
                transaction_tag: receipt.transaction_tag.clone(),
                total_minor: order.total_minor,
                item_count: order.item_count,
            },
            // Published by `show_info`.
            Ok(ScanResult::Info(_)) => return,
            Err(DomainError::MalformedInput(detail)) => {
                log::warn!("unable to parse scan: {detail}");
                StationEvent::ScanMalformed {
                    detail: detail.clone(),
                }
            }
            Err(DomainError::ValidationRejection(reason)) => {
                log::warn!("order rejected: {reason}");
                StationEvent::OrderRejected {
                    state: reason.display_state(),
                    reason: reason.to_string(),
                }
            }
            Err(DomainError::CatalogUnavailable) => {
                log::warn!("order rejected: catalog not loaded");
                StationEvent::OrderRejected {
                    state: DisplayState::InvalidOrder,
                    reason: DomainError::CatalogUnavailable.to_string(),
                }
            }
            Err(e @ DomainError::PersistenceFailure(_)) => {
                log::error!(
                    "ORDER NOT RECORDED, sale must be handled manually: {e}; scan was {raw}"
                );
                StationEvent::PersistenceFailed {
                    error: e.to_string(),
                }
            }
            Err(e) => {
                log::warn!("scan not processed: {e}");
                StationEvent::StationUnavailable {
                    error: e.to_string(),
                }
            }
        };
        self.events.publish(event);
    }

    /// Operator-triggered catalog refresh outside the periodic schedule.
    pub async fn refresh_catalog(&self) -> Result<StationStatus, DomainError> {
        self.catalog.refresh().await?;
        self.status().await
    }

    pub async fn status(&self) -> Result<StationStatus, DomainError> {
        let ledger = Arc::clone(&self.ledger);
        let (order_count, unsynced_count) =
            run_blocking(move || Ok((ledger.count_all()?, ledger.count_unsynced()?))).await?;
        let snapshot = self.catalog.current();

        Ok(StationStatus {
            station: self.identity.station.clone(),
            order_count,
            unsynced_count,
            printer_ready: self.printer.is_online(),
            catalog_loaded: snapshot.is_some(),
            catalog_fetched_at: snapshot.as_ref().map(|s| s.fetched_at()),
            catalog_items: snapshot.as_ref().map_or(0, |s| s.len()),
            sync_in_flight: self.sync.in_flight_count(),
        })
    }
}

/// `{"control": "info"}` asks for the info screen instead of placing an order.
fn is_info_request(request: &OrderRequest) -> bool {
    let fields = request.fields();
    fields.len() == 1 && fields.get("control").and_then(Value::as_str) == Some("info")
}
