pub mod catalog_cache;
pub mod scan_queue;
pub mod station;
pub mod sync_engine;

use crate::domain::errors::DomainError;

/// Runs a synchronous ledger call on the blocking pool.
pub(crate) async fn run_blocking<T, F>(f: F) -> Result<T, DomainError>
where
    F: FnOnce() -> Result<T, DomainError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| DomainError::PersistenceFailure(e.to_string()))?
}
