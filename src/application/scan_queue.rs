use std::io::BufRead;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

use super::station::{ScanResult, StationController};
use crate::domain::errors::DomainError;

pub type ScanReply = oneshot::Sender<Result<ScanResult, DomainError>>;

#[derive(Debug)]
pub struct ScanJob {
    pub payload: String,
    pub reply: Option<ScanReply>,
}

/// Single-consumer queue in front of the station controller. Scans from the
/// hardware reader and from HTTP are handled strictly one after another.
#[derive(Debug, Clone)]
pub struct ScanQueue {
    sender: mpsc::Sender<ScanJob>,
}

impl ScanQueue {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<ScanJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueues a scan and waits for its outcome.
    pub async fn submit(&self, payload: String) -> Result<ScanResult, DomainError> {
        let (reply, outcome) = oneshot::channel();
        self.sender
            .send(ScanJob {
                payload,
                reply: Some(reply),
            })
            .await
            .map_err(|_| DomainError::ShuttingDown)?;
        outcome.await.map_err(|_| DomainError::ShuttingDown)?
    }

    /// For producers outside the runtime, such as the reader thread.
    pub fn blocking_push(&self, payload: String) -> Result<(), DomainError> {
        self.sender
            .blocking_send(ScanJob {
                payload,
                reply: None,
            })
            .map_err(|_| DomainError::ShuttingDown)
    }
}

/// Drains the queue until shutdown or until every sender is gone.
pub async fn run_scan_loop(
    controller: Arc<StationController>,
    mut jobs: mpsc::Receiver<ScanJob>,
    shutdown: CancellationToken,
) {
    loop {
        let job = tokio::select! {
            _ = shutdown.cancelled() => break,
            job = jobs.recv() => match job {
                Some(job) => job,
                None => break,
            },
        };

        let result = controller.process_scan(&job.payload).await;
        if let Some(reply) = job.reply {
            // The submitter may have gone away; the outcome is already logged.
            let _ = reply.send(result);
        }
    }
    log::info!("scan loop stopped");
}

/// Feeds newline-terminated scans from `reader` (the barcode reader's
/// keyboard stream) into `queue`. Blank lines are skipped. Blocks, so it
/// belongs on its own thread: a pending read on stdin cannot be cancelled.
pub fn read_scans<R: BufRead>(reader: R, queue: &ScanQueue) -> std::io::Result<()> {
    for line in reader.lines() {
        let line = line?;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if queue.blocking_push(line.to_string()).is_err() {
            break;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::catalog_cache::CatalogCache;
    use crate::application::sync_engine::SyncEngine;
    use crate::domain::events::EventBus;
    use crate::domain::ports::{CatalogSource, OrderLedger, TransactionGateway};
    use crate::infrastructure::order_repo::DieselOrderLedger;
    use crate::test_support::{
        catalog_item, identity, temp_ledger, FakeCatalogSource, FakeGateway, RecordingPrinter,
    };

    async fn controller(
        ledger: Arc<DieselOrderLedger>,
    ) -> (Arc<StationController>, Arc<SyncEngine>) {
        let events = EventBus::default();
        let source = Arc::new(FakeCatalogSource::default());
        source.push_ok(vec![catalog_item(7, 3500)]);
        let catalog = Arc::new(CatalogCache::new(
            source as Arc<dyn CatalogSource>,
            events.clone(),
        ));
        catalog.refresh().await.expect("catalog loads");

        let gateway = Arc::new(FakeGateway::always(503));
        let sync = SyncEngine::new(
            ledger.clone(),
            gateway as Arc<dyn TransactionGateway>,
            identity(),
            1,
        );
        let controller = StationController::new(
            ledger,
            catalog,
            Arc::clone(&sync),
            Arc::new(RecordingPrinter::default()),
            identity(),
            events,
        );
        (Arc::new(controller), sync)
    }

    #[tokio::test]
    async fn submitted_scans_get_their_own_outcome() {
        let (_dir, ledger) = temp_ledger();
        let (controller, sync) = controller(ledger.clone()).await;
        let (queue, jobs) = ScanQueue::new(8);
        let shutdown = CancellationToken::new();
        let worker = tokio::spawn(run_scan_loop(controller, jobs, shutdown.clone()));

        let accepted = queue
            .submit(r#"{"i":[{"v":7,"q":1}],"txn":""}"#.to_string())
            .await;
        let malformed = queue.submit("not json".to_string()).await;

        assert!(matches!(accepted, Ok(ScanResult::Accepted { .. })));
        assert!(matches!(malformed, Err(DomainError::MalformedInput(_))));

        shutdown.cancel();
        worker.await.expect("scan loop exits");
        sync.wait_idle().await;
        assert_eq!(ledger.count_all().expect("count"), 1);
    }

    #[tokio::test]
    async fn reader_lines_become_orders_in_arrival_order() {
        let (_dir, ledger) = temp_ledger();
        let (controller, sync) = controller(ledger.clone()).await;
        let (queue, jobs) = ScanQueue::new(8);
        let worker = tokio::spawn(run_scan_loop(controller, jobs, CancellationToken::new()));

        let input: &[u8] = concat!(
            r#"{"i":[{"v":7,"q":1}],"txn":""}"#,
            "\n\n   \n",
            r#"{"i":[{"v":7,"q":3}],"txn":""}"#,
            "\n"
        )
        .as_bytes();
        tokio::task::spawn_blocking(move || read_scans(input, &queue))
            .await
            .expect("reader thread")
            .expect("read");

        // The reader dropped the last sender, so the loop drains and exits.
        worker.await.expect("scan loop exits");
        sync.wait_idle().await;

        let orders = ledger.list_unsynced().expect("list");
        let counts: Vec<i64> = orders.iter().map(|o| o.item_count).collect();
        assert_eq!(counts, vec![1, 3]);
    }

    #[tokio::test]
    async fn submit_after_shutdown_reports_shutting_down() {
        let (queue, jobs) = ScanQueue::new(1);
        drop(jobs);

        let result = queue.submit("{}".to_string()).await;

        assert!(matches!(result, Err(DomainError::ShuttingDown)));
    }
}
