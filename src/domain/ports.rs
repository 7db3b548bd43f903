use async_trait::async_trait;
use thiserror::Error;

use super::catalog::CatalogItem;
use super::errors::DomainError;
use super::order::{Order, OrderId, Receipt, TransactionPayload, ValidatedOrder};

/// Durable store of every sale this station has made.
pub trait OrderLedger: Send + Sync + 'static {
    /// Records the order header and all of its lines atomically.
    fn insert(&self, order: &ValidatedOrder) -> Result<Order, DomainError>;
    fn find_by_id(&self, id: OrderId) -> Result<Option<Order>, DomainError>;
    /// Idempotent; marking an already-synced order is a no-op.
    fn mark_synced(&self, id: OrderId) -> Result<(), DomainError>;
    /// Oldest first.
    fn list_unsynced(&self) -> Result<Vec<Order>, DomainError>;
    fn count_all(&self) -> Result<i64, DomainError>;
    fn count_unsynced(&self) -> Result<i64, DomainError>;
}

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("catalog request failed: {0}")]
    Transport(String),
    #[error("catalog endpoint answered with status {0}")]
    Status(u16),
    #[error("catalog response is malformed: {0}")]
    Malformed(String),
}

#[async_trait]
pub trait CatalogSource: Send + Sync + 'static {
    async fn fetch(&self) -> Result<Vec<CatalogItem>, FetchError>;
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("transaction request failed: {0}")]
    Transport(String),
    #[error("transaction endpoint answered with status {0}")]
    Status(u16),
    #[error("transaction endpoint answered with an unreadable body: {0}")]
    UnreadableBody(String),
}

/// The remote conference-management service that accepts sales.
#[async_trait]
pub trait TransactionGateway: Send + Sync + 'static {
    /// Resolves to the JSON acknowledgement on HTTP 200.
    async fn submit(&self, payload: &TransactionPayload) -> Result<serde_json::Value, GatewayError>;
}

#[derive(Debug, Error)]
pub enum PrinterError {
    #[error("printer is offline: {0}")]
    Offline(String),
    #[error("failed to print receipt: {0}")]
    Io(#[from] std::io::Error),
}

pub trait ReceiptPrinter: Send + Sync + 'static {
    fn is_online(&self) -> bool;
    fn print(&self, receipt: &Receipt) -> Result<(), PrinterError>;
}
