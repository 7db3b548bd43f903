use thiserror::Error;

use super::order::OrderId;
use super::ports::FetchError;
use super::validation::RejectionReason;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("Malformed input: {0}")]
    MalformedInput(String),
    #[error("Order rejected: {0}")]
    ValidationRejection(RejectionReason),
    #[error("Catalog has not been loaded yet")]
    CatalogUnavailable,
    #[error("Network failure: {0}")]
    TransientNetworkFailure(String),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Persistence failure: {0}")]
    PersistenceFailure(String),
    #[error("Station is shutting down")]
    ShuttingDown,
}

impl From<FetchError> for DomainError {
    fn from(e: FetchError) -> Self {
        DomainError::TransientNetworkFailure(e.to_string())
    }
}

impl From<RejectionReason> for DomainError {
    fn from(reason: RejectionReason) -> Self {
        DomainError::ValidationRejection(reason)
    }
}
