use std::error::Error;
use std::io::{self, BufReader};
use std::sync::Arc;

use scan_station::application::catalog_cache::CatalogCache;
use scan_station::application::scan_queue::{read_scans, run_scan_loop, ScanQueue};
use scan_station::application::station::StationController;
use scan_station::application::sync_engine::SyncEngine;
use scan_station::config::StationConfig;
use scan_station::domain::events::{EventBus, StationEvent};
use scan_station::domain::ports::{CatalogSource, OrderLedger, ReceiptPrinter, TransactionGateway};
use scan_station::handlers::AppState;
use scan_station::infrastructure::catalog_client::HttpCatalogSource;
use scan_station::infrastructure::order_repo::DieselOrderLedger;
use scan_station::infrastructure::printer::SpoolPrinter;
use scan_station::infrastructure::transaction_client::HttpTransactionGateway;
use scan_station::{build_server, create_pool, run_migrations};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio_util::sync::CancellationToken;

const SCAN_QUEUE_CAPACITY: usize = 32;

#[actix_web::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init_from_env(env_logger::Env::default().default_filter_or("info"));

    let config = StationConfig::from_env()?;
    log::info!("starting station {} with {:?}", config.identity.station, config);

    let pool = create_pool(&config.db_path)?;
    run_migrations(&pool)?;
    let ledger: Arc<dyn OrderLedger> = Arc::new(DieselOrderLedger::new(pool));

    let events = EventBus::default();
    let shutdown = CancellationToken::new();
    tokio::spawn(show_on_display(events.subscribe(), shutdown.clone()));

    let source: Arc<dyn CatalogSource> = Arc::new(HttpCatalogSource::new(
        config.inventory_url.clone(),
        config.http_timeout,
    )?);
    let catalog = Arc::new(CatalogCache::new(source, events.clone()));
    // A station without a catalog refuses scans until a later refresh succeeds.
    let _ = catalog.refresh().await;
    tokio::spawn(Arc::clone(&catalog).run(config.catalog_refresh, shutdown.clone()));

    let gateway: Arc<dyn TransactionGateway> = Arc::new(HttpTransactionGateway::new(
        config.sync_url.clone(),
        config.http_timeout,
    )?);
    let sync = SyncEngine::new(
        Arc::clone(&ledger),
        gateway,
        config.identity(),
        config.sync_max_in_flight,
    );
    match config.retry_policy() {
        Some(policy) => {
            tokio::spawn(Arc::clone(&sync).run_retry_sweeps(policy));
        }
        None => log::info!("periodic sync retries disabled"),
    }

    let printer: Arc<dyn ReceiptPrinter> =
        Arc::new(SpoolPrinter::new(config.receipt_spool_dir.clone()));
    if !printer.is_online() {
        log::warn!(
            "receipt spool {} is not available; receipts will not print",
            config.receipt_spool_dir.display()
        );
    }

    let controller = Arc::new(StationController::new(
        Arc::clone(&ledger),
        Arc::clone(&catalog),
        Arc::clone(&sync),
        printer,
        config.identity(),
        events.clone(),
    ));

    let (scans, jobs) = ScanQueue::new(SCAN_QUEUE_CAPACITY);
    let scan_loop = tokio::spawn(run_scan_loop(
        Arc::clone(&controller),
        jobs,
        shutdown.clone(),
    ));

    let reader_queue = scans.clone();
    std::thread::Builder::new()
        .name("scan-reader".to_string())
        .spawn(move || {
            if let Err(e) = read_scans(BufReader::new(io::stdin()), &reader_queue) {
                log::error!("scan reader stopped: {e}");
            }
        })?;

    match sync.bulk_sync().await {
        Ok(n) => log::info!("startup sync scheduled {n} orders"),
        Err(e) => log::error!("startup sync failed: {e}"),
    }

    let state = AppState {
        ledger,
        controller,
        scans,
        sync: Arc::clone(&sync),
    };
    let server = build_server(state, &config.host, config.port)?;
    let server_handle = server.handle();
    log::info!("Starting server at http://{}:{}", config.host, config.port);

    let served = tokio::select! {
        res = server => res,
        _ = tokio::signal::ctrl_c() => {
            log::info!("shutdown requested");
            server_handle.stop(true).await;
            Ok(())
        }
    };

    shutdown.cancel();
    if let Err(e) = scan_loop.await {
        log::error!("scan loop ended abnormally: {e}");
    }
    sync.shutdown(config.shutdown_grace).await;
    log::info!("station stopped");

    served.map_err(Into::into)
}

/// Stand-in for the kiosk screen: every event is logged with the screen it
/// would bring up.
async fn show_on_display(mut rx: broadcast::Receiver<StationEvent>, shutdown: CancellationToken) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = rx.recv() => match event {
                Ok(event) => log::info!("display {:?}: {:?}", event.display_state(), event),
                Err(RecvError::Lagged(n)) => {
                    log::warn!("display missed {n} events");
                }
                Err(RecvError::Closed) => break,
            },
        }
    }
}
