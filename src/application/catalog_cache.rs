use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::domain::catalog::CatalogSnapshot;
use crate::domain::events::{EventBus, StationEvent};
use crate::domain::ports::{CatalogSource, FetchError};

/// Latest successfully fetched catalog.
///
/// Readers get an `Arc` to a complete snapshot; a refresh swaps in a new one
/// and never touches a snapshot someone may still be validating against. A
/// failed refresh keeps whatever was there before.
pub struct CatalogCache {
    source: Arc<dyn CatalogSource>,
    snapshot: watch::Sender<Option<Arc<CatalogSnapshot>>>,
    events: EventBus,
}

impl CatalogCache {
    pub fn new(source: Arc<dyn CatalogSource>, events: EventBus) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            source,
            snapshot,
            events,
        }
    }

    /// `None` until the first refresh succeeds. Never waits on the network.
    pub fn current(&self) -> Option<Arc<CatalogSnapshot>> {
        self.snapshot.borrow().clone()
    }

    pub async fn refresh(&self) -> Result<Arc<CatalogSnapshot>, FetchError> {
        log::info!("syncing catalog");

        match self.source.fetch().await {
            Ok(items) => {
                let snapshot = Arc::new(CatalogSnapshot::new(items, Utc::now()));
                self.snapshot.send_replace(Some(Arc::clone(&snapshot)));
                log::info!("catalog refreshed with {} variants", snapshot.len());
                Ok(snapshot)
            }
            Err(e) => {
                let last_fetched_at = self.current().map(|s| s.fetched_at());
                match last_fetched_at {
                    Some(at) => {
                        log::warn!("catalog refresh failed, keeping snapshot from {at}: {e}")
                    }
                    None => log::warn!("catalog refresh failed and no catalog is loaded: {e}"),
                }
                self.events.publish(StationEvent::CatalogStale {
                    last_fetched_at,
                    error: e.to_string(),
                });
                Err(e)
            }
        }
    }

    /// Refreshes every `interval` until `shutdown` fires. The first refresh
    /// happens one interval after the call.
    pub async fn run(self: Arc<Self>, interval: Duration, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    log::info!("catalog refresh stopped");
                    break;
                }
                _ = ticker.tick() => {
                    // Failures are logged and reported inside `refresh`.
                    let _ = self.refresh().await;
                }
            }
        }
    }
}
