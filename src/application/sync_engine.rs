use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{Notify, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use super::run_blocking;
use crate::domain::errors::DomainError;
use crate::domain::order::{Order, OrderId, StationIdentity, TransactionPayload};
use crate::domain::ports::{GatewayError, OrderLedger, TransactionGateway};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// HTTP 200 with a JSON acknowledgement.
    Delivered,
    /// HTTP 200 whose body could not be read as an acknowledgement.
    Rejected,
    /// Any other status, or the request never completed.
    TransientFailure,
    /// The ledger already had the order as synced; nothing was sent.
    AlreadySynced,
}

/// Delay between retry sweeps: `base` doubled per consecutive failed attempt,
/// capped at `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    pub fn delay_after(&self, consecutive_failures: u32) -> Duration {
        let factor = 1u32 << consecutive_failures.min(16);
        self.base.saturating_mul(factor).min(self.max)
    }
}

/// Pushes unsynced orders to the remote service.
///
/// Every attempt runs as a task on the engine's own tracker so shutdown can
/// wait for, or abandon, whatever is still in flight. An order never has more
/// than one live attempt.
pub struct SyncEngine {
    ledger: Arc<dyn OrderLedger>,
    gateway: Arc<dyn TransactionGateway>,
    identity: StationIdentity,
    tracker: TaskTracker,
    shutdown: CancellationToken,
    permits: Semaphore,
    in_flight: Mutex<HashSet<OrderId>>,
    idle: Notify,
    consecutive_failures: AtomicU32,
}

impl SyncEngine {
    pub fn new(
        ledger: Arc<dyn OrderLedger>,
        gateway: Arc<dyn TransactionGateway>,
        identity: StationIdentity,
        max_in_flight: usize,
    ) -> Arc<Self> {
        Arc::new(Self {
            ledger,
            gateway,
            identity,
            tracker: TaskTracker::new(),
            shutdown: CancellationToken::new(),
            permits: Semaphore::new(max_in_flight.max(1)),
            in_flight: Mutex::new(HashSet::new()),
            idle: Notify::new(),
            consecutive_failures: AtomicU32::new(0),
        })
    }

    fn in_flight(&self) -> MutexGuard<'_, HashSet<OrderId>> {
        self.in_flight.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight().len()
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures.load(Ordering::Relaxed)
    }

    /// Delivers one order and, on success, marks it synced and sweeps the
    /// rest of the backlog while the connection is known to be up.
    pub async fn sync_one(self: &Arc<Self>, order: &Order) -> SyncOutcome {
        let payload = TransactionPayload::for_order(&self.identity, order);
        log::info!("attempting to sync order {} as {}", order.id, payload.txn_num);

        let outcome = match self.gateway.submit(&payload).await {
            Ok(ack) => {
                log::debug!("order {} acknowledged: {}", order.id, ack);
                SyncOutcome::Delivered
            }
            Err(GatewayError::UnreadableBody(e)) => {
                log::warn!("order {} got an unreadable acknowledgement: {}", order.id, e);
                SyncOutcome::Rejected
            }
            Err(e) => {
                log::warn!("failed to sync order {}: {}", order.id, e);
                SyncOutcome::TransientFailure
            }
        };

        if outcome != SyncOutcome::Delivered {
            self.consecutive_failures.fetch_add(1, Ordering::Relaxed);
            return outcome;
        }
        self.consecutive_failures.store(0, Ordering::Relaxed);

        let ledger = Arc::clone(&self.ledger);
        let id = order.id;
        match run_blocking(move || ledger.mark_synced(id)).await {
            Ok(()) => {
                log::info!("order {id} synced");
                if let Err(e) = self.bulk_sync().await {
                    log::error!("follow-up sync sweep failed: {e}");
                }
            }
            // The next sweep will deliver this order again.
            Err(e) => log::error!("order {id} was delivered but could not be marked synced: {e}"),
        }

        outcome
    }

    /// Schedules an attempt for every unsynced order without one in flight.
    /// Returns how many attempts were started.
    pub async fn bulk_sync(self: &Arc<Self>) -> Result<usize, DomainError> {
        let ledger = Arc::clone(&self.ledger);
        let orders = run_blocking(move || ledger.list_unsynced()).await?;

        let scheduled = orders
            .into_iter()
            .filter(|order| self.schedule(order.clone()))
            .count();
        if scheduled > 0 {
            log::info!("scheduled {scheduled} sync attempts");
        }
        Ok(scheduled)
    }

    /// Starts a background attempt for `order`. Returns `false` if the order
    /// already has one or the engine is shutting down.
    pub fn schedule(self: &Arc<Self>, order: Order) -> bool {
        if self.tracker.is_closed() || self.shutdown.is_cancelled() {
            return false;
        }
        if !self.in_flight().insert(order.id) {
            return false;
        }

        let engine = Arc::clone(self);
        self.tracker.spawn(async move {
            let id = order.id;
            tokio::select! {
                _ = engine.shutdown.cancelled() => {
                    log::info!("abandoning sync of order {id}; it stays unsynced");
                }
                _ = engine.attempt(&order) => {}
            }
            let now_idle = {
                let mut in_flight = engine.in_flight();
                in_flight.remove(&id);
                in_flight.is_empty()
            };
            if now_idle {
                engine.idle.notify_waiters();
            }
        });
        true
    }

    async fn attempt(self: &Arc<Self>, order: &Order) -> SyncOutcome {
        let Ok(_permit) = self.permits.acquire().await else {
            return SyncOutcome::TransientFailure;
        };

        // A sweep may have listed this order before another attempt marked it.
        let ledger = Arc::clone(&self.ledger);
        let id = order.id;
        match run_blocking(move || ledger.find_by_id(id)).await {
            Ok(Some(current)) if current.synced => {
                log::debug!("order {id} already synced, skipping");
                SyncOutcome::AlreadySynced
            }
            Ok(Some(current)) => self.sync_one(&current).await,
            Ok(None) => {
                log::warn!("order {id} vanished from the ledger before sync");
                SyncOutcome::AlreadySynced
            }
            Err(e) => {
                log::error!("could not re-read order {id} before sync: {e}");
                SyncOutcome::TransientFailure
            }
        }
    }

    /// Resolves once no attempt is in flight.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.in_flight().is_empty() {
                return;
            }
            notified.await;
        }
    }

    /// Periodic safety net for orders left behind by an outage. Sleeps for
    /// the policy delay, then sweeps if anything is still unsynced.
    pub async fn run_retry_sweeps(self: Arc<Self>, policy: RetryPolicy) {
        loop {
            let delay = policy.delay_after(self.consecutive_failures());
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = tokio::time::sleep(delay) => {}
            }

            let ledger = Arc::clone(&self.ledger);
            match run_blocking(move || ledger.count_unsynced()).await {
                Ok(0) => {}
                Ok(pending) => {
                    log::info!("retry sweep: {pending} orders unsynced");
                    if let Err(e) = self.bulk_sync().await {
                        log::error!("retry sweep failed: {e}");
                    }
                }
                Err(e) => log::error!("retry sweep could not read the ledger: {e}"),
            }
        }
        log::info!("retry sweeps stopped");
    }

    /// Stops scheduling, gives in-flight attempts `grace` to finish, then
    /// abandons the rest. Abandoned orders remain unsynced in the ledger.
    pub async fn shutdown(&self, grace: Duration) {
        self.tracker.close();
        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            log::warn!(
                "abandoning {} in-flight sync attempts",
                self.in_flight_count()
            );
            self.shutdown.cancel();
            self.tracker.wait().await;
        }
        self.shutdown.cancel();
    }
}
