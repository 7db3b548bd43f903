use actix_web::{web, HttpResponse};
use serde::Serialize;
use utoipa::ToSchema;

use super::AppState;
use crate::application::station::{ScanResult, StationStatus};
use crate::domain::order::{Order, OrderId, Receipt};
use crate::errors::AppError;

#[derive(Debug, Serialize, ToSchema)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScanResponse {
    Accepted {
        order: Order,
        receipt: Receipt,
        printed: bool,
    },
    Info {
        status: StationStatus,
    },
}

impl From<ScanResult> for ScanResponse {
    fn from(result: ScanResult) -> Self {
        match result {
            ScanResult::Accepted {
                order,
                receipt,
                printed,
            } => ScanResponse::Accepted {
                order,
                receipt,
                printed,
            },
            ScanResult::Info(status) => ScanResponse::Info { status },
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct SyncResponse {
    /// Attempts started by this request; orders already in flight are skipped.
    pub scheduled: usize,
}

/// GET /status
#[utoipa::path(
    get,
    path = "/status",
    responses(
        (status = 200, description = "Station counters and health", body = StationStatus),
        (status = 500, description = "Internal server error"),
    ),
    tag = "station"
)]
pub async fn get_status(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let status = state.controller.status().await?;
    Ok(HttpResponse::Ok().json(status))
}

/// GET /orders/unsynced
///
/// Orders the remote service has not acknowledged yet, oldest first.
#[utoipa::path(
    get,
    path = "/orders/unsynced",
    responses(
        (status = 200, description = "Unsynced orders", body = Vec<Order>),
        (status = 500, description = "Internal server error"),
    ),
    tag = "station"
)]
pub async fn list_unsynced(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let ledger = state.ledger.clone();
    let orders = web::block(move || ledger.list_unsynced())
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    Ok(HttpResponse::Ok().json(orders))
}

/// GET /orders/{id}
#[utoipa::path(
    get,
    path = "/orders/{id}",
    params(
        ("id" = i64, Path, description = "Ledger order id"),
    ),
    responses(
        (status = 200, description = "Order found", body = Order),
        (status = 404, description = "Order not found"),
        (status = 500, description = "Internal server error"),
    ),
    tag = "station"
)]
pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<OrderId>,
) -> Result<HttpResponse, AppError> {
    let id = path.into_inner();
    let ledger = state.ledger.clone();
    let order = web::block(move || ledger.find_by_id(id))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    match order {
        Some(order) => Ok(HttpResponse::Ok().json(order)),
        None => Err(AppError::NotFound),
    }
}

/// POST /scans
///
/// Accepts the raw scanned text exactly as the barcode reader would type it.
/// The scan is queued behind any reader input and handled in turn.
#[utoipa::path(
    post,
    path = "/scans",
    request_body(content = String, content_type = "text/plain", description = "Scanned order JSON"),
    responses(
        (status = 201, description = "Order recorded", body = ScanResponse),
        (status = 200, description = "Station info requested", body = ScanResponse),
        (status = 400, description = "Scan is not a JSON object"),
        (status = 422, description = "Order rejected"),
        (status = 503, description = "Catalog not loaded or station shutting down"),
    ),
    tag = "station"
)]
pub async fn submit_scan(
    state: web::Data<AppState>,
    body: String,
) -> Result<HttpResponse, AppError> {
    let result = state.scans.submit(body).await?;
    let response = match result {
        ScanResult::Accepted { .. } => HttpResponse::Created(),
        ScanResult::Info(_) => HttpResponse::Ok(),
    }
    .json(ScanResponse::from(result));
    Ok(response)
}

/// POST /catalog/refresh
///
/// Fetches the catalog now instead of waiting for the next scheduled refresh.
/// On failure the previous snapshot stays in use.
#[utoipa::path(
    post,
    path = "/catalog/refresh",
    responses(
        (status = 200, description = "Catalog refreshed", body = StationStatus),
        (status = 503, description = "Inventory service unreachable"),
    ),
    tag = "station"
)]
pub async fn refresh_catalog(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let status = state.controller.refresh_catalog().await?;
    Ok(HttpResponse::Ok().json(status))
}

/// POST /sync
///
/// Schedules a delivery attempt for every unsynced order.
#[utoipa::path(
    post,
    path = "/sync",
    responses(
        (status = 202, description = "Sync attempts scheduled", body = SyncResponse),
        (status = 500, description = "Internal server error"),
    ),
    tag = "station"
)]
pub async fn trigger_sync(state: web::Data<AppState>) -> Result<HttpResponse, AppError> {
    let scheduled = state.sync.bulk_sync().await?;
    Ok(HttpResponse::Accepted().json(SyncResponse { scheduled }))
}
