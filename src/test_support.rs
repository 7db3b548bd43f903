//! Fakes and fixtures shared by the unit tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tempfile::TempDir;

use crate::db::create_pool;
use crate::domain::catalog::{CatalogItem, StockStatus, VariantId};
use crate::domain::order::{Receipt, StationIdentity, TransactionPayload};
use crate::domain::ports::{
    CatalogSource, FetchError, GatewayError, PrinterError, ReceiptPrinter, TransactionGateway,
};
use crate::infrastructure::order_repo::DieselOrderLedger;

pub fn catalog_item(variant_id: VariantId, unit_price_minor: i64) -> CatalogItem {
    CatalogItem {
        variant_id,
        sku: format!("SKU-{variant_id}"),
        description: format!("Variant {variant_id}"),
        size_label: "M".to_string(),
        unit_price_minor,
        stock_status: StockStatus::Available,
        restricted: false,
    }
}

pub fn identity() -> StationIdentity {
    StationIdentity {
        device_id: "device-1".to_string(),
        conference_id: "32".to_string(),
        passcode: "secret".to_string(),
        station: "S1".to_string(),
    }
}

pub fn temp_ledger() -> (TempDir, Arc<DieselOrderLedger>) {
    let dir = TempDir::new().expect("temp dir");
    let path = dir.path().join("ledger.db");
    let pool = create_pool(&path.to_string_lossy()).expect("pool");
    crate::run_migrations(&pool).expect("migrations");
    (dir, Arc::new(DieselOrderLedger::new(pool)))
}

#[derive(Default)]
pub struct FakeCatalogSource {
    responses: Mutex<VecDeque<Result<Vec<CatalogItem>, FetchError>>>,
    calls: AtomicUsize,
}

impl FakeCatalogSource {
    pub fn push_ok(&self, items: Vec<CatalogItem>) {
        self.responses.lock().expect("lock").push_back(Ok(items));
    }

    pub fn push_err(&self, err: FetchError) {
        self.responses.lock().expect("lock").push_back(Err(err));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CatalogSource for FakeCatalogSource {
    async fn fetch(&self) -> Result<Vec<CatalogItem>, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.responses
            .lock()
            .expect("lock")
            .pop_front()
            .unwrap_or_else(|| Err(FetchError::Transport("no scripted response".to_string())))
    }
}

/// Answers with scripted statuses; once the script runs out every call gets
/// `fallback` (200 with a JSON body when `None`).
#[derive(Default)]
pub struct FakeGateway {
    script: Mutex<VecDeque<u16>>,
    fallback: Mutex<Option<u16>>,
    submitted: Mutex<Vec<TransactionPayload>>,
}

impl FakeGateway {
    pub fn always(status: u16) -> Self {
        let gateway = Self::default();
        gateway.set_fallback(status);
        gateway
    }

    pub fn push_status(&self, status: u16) {
        self.script.lock().expect("lock").push_back(status);
    }

    pub fn set_fallback(&self, status: u16) {
        *self.fallback.lock().expect("lock") = Some(status);
    }

    pub fn submitted(&self) -> Vec<TransactionPayload> {
        self.submitted.lock().expect("lock").clone()
    }

    pub fn submitted_txns(&self) -> Vec<String> {
        self.submitted().into_iter().map(|p| p.txn_num).collect()
    }
}

#[async_trait]
impl TransactionGateway for FakeGateway {
    async fn submit(
        &self,
        payload: &TransactionPayload,
    ) -> Result<serde_json::Value, GatewayError> {
        self.submitted.lock().expect("lock").push(payload.clone());
        let status = self
            .script
            .lock()
            .expect("lock")
            .pop_front()
            .or(*self.fallback.lock().expect("lock"))
            .unwrap_or(200);
        match status {
            200 => Ok(serde_json::json!({ "status": "ok" })),
            // Stand-in for "200 with a body that is not JSON".
            299 => Err(GatewayError::UnreadableBody("expected value".to_string())),
            0 => Err(GatewayError::Transport("connection refused".to_string())),
            other => Err(GatewayError::Status(other)),
        }
    }
}

#[derive(Default)]
pub struct RecordingPrinter {
    offline: AtomicBool,
    printed: Mutex<Vec<Receipt>>,
}

impl RecordingPrinter {
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    pub fn printed(&self) -> Vec<Receipt> {
        self.printed.lock().expect("lock").clone()
    }
}

impl ReceiptPrinter for RecordingPrinter {
    fn is_online(&self) -> bool {
        !self.offline.load(Ordering::SeqCst)
    }

    fn print(&self, receipt: &Receipt) -> Result<(), PrinterError> {
        if !self.is_online() {
            return Err(PrinterError::Offline("paper out".to_string()));
        }
        self.printed.lock().expect("lock").push(receipt.clone());
        Ok(())
    }
}
