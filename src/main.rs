//! Process entry point: loads configuration, wires every component, and
//! runs the HTTP API, the sync/attachment worker pools, the watch
//! renewal sweep, and the metrics listeners concurrently until shutdown
//! is requested.

use std::sync::Arc;

use api::AppState;
use clap::Parser;
use mailboxclient::{ClientFactory, ClientSource};
use pipeline::runner::{spawn_attachment_workers, spawn_sync_workers};
use pipeline::{AttachmentWorker, SyncWorker};
use queue::Queue;
use tracing::{error, info};
use watch::WatchManager;

#[derive(Parser, Debug)]
#[command(name = "mailhook", author, version, about = "Mailbox ingestion and extraction service")]
struct Cli {
    /// Run pending migrations against DATABASE_URL and exit.
    #[arg(long)]
    migrate_only: bool,
}

#[tokio::main]
async fn main() -> Result<(), anyhow::Error> {
    let cli = Cli::parse();
    let settings = appconfig::settings();

    observability::init_tracing(settings)?;
    vault::init(&settings.encryption_key).map_err(|e| anyhow::anyhow!(e))?;

    info!("connecting to database");
    let store = store::Store::connect(&settings.database.url).await?;
    store.migrate().await?;

    if cli.migrate_only {
        info!("migrations applied, exiting (--migrate-only)");
        return Ok(());
    }

    let client_factory = ClientFactory::new(
        store.pool.clone(),
        settings.gmail.client_id.clone(),
        settings.gmail.client_secret.clone(),
    );
    let clients: Arc<dyn ClientSource> = Arc::new(client_factory.clone());

    let queue = Queue::new(store.pool.clone());

    let watch = Arc::new(WatchManager::new(
        store.pool.clone(),
        client_factory.clone(),
        settings.pubsub.topic_name.clone(),
    ));

    let ocr = ocr::OcrClient::from_env(settings.aws.s3_bucket.clone()).await;

    let sync_worker = Arc::new(SyncWorker::new(
        store.pool.clone(),
        client_factory.clone(),
        queue.clone(),
    ));
    let attachment_worker = Arc::new(AttachmentWorker::new(store.pool.clone(), ocr));

    let app_state = AppState {
        pool: store.pool.clone(),
        queue: queue.clone(),
        clients: clients.clone(),
        watch: watch.clone(),
        sync_worker: sync_worker.clone(),
        attachments: attachment_worker.clone(),
        use_queue: settings.use_queue,
        gmail_client_id: settings.gmail.client_id.clone(),
        gmail_client_secret: settings.gmail.client_secret.clone(),
        gmail_redirect_uri: settings.gmail.redirect_uri.clone(),
        frontend_url: settings.frontend_url.clone(),
        pubsub_topic: settings.pubsub.topic_name.clone(),
    };

    let router = api::build_router(app_state);
    let backend_addr = std::net::SocketAddr::from(([0, 0, 0, 0], settings.backend_port));

    let api_server = tokio::spawn(async move {
        info!(%backend_addr, "operator API listening");
        if let Err(e) = axum::Server::bind(&backend_addr)
            .serve(router.into_make_service())
            .await
        {
            error!(error = ?e, "operator API server exited");
        }
    });

    let metrics_server = tokio::spawn(observability::serve_metrics(settings.metrics.prometheus_port));
    let worker_metrics_server =
        tokio::spawn(observability::serve_metrics(settings.metrics.worker_metrics_port));

    if settings.use_queue {
        spawn_sync_workers(
            queue.clone(),
            sync_worker.clone(),
            settings.worker.email_worker_concurrency,
        );
        spawn_attachment_workers(
            queue.clone(),
            attachment_worker.clone(),
            settings.worker.attachment_worker_concurrency,
        );
    } else {
        info!("USE_QUEUE is false, skipping worker pools (direct webhook path only)");
    }

    let sweep_watch = watch.clone();
    tokio::spawn(async move { sweep_watch.run_sweep().await });

    let retention_queue = queue.clone();
    tokio::spawn(async move {
        loop {
            tokio::time::sleep(std::time::Duration::from_secs(6 * 60 * 60)).await;
            match retention_queue.purge_retained().await {
                Ok(n) if n > 0 => info!(purged = n, "queue retention sweep purged old jobs"),
                Ok(_) => {}
                Err(e) => error!(error = ?e, "queue retention sweep failed"),
            }
        }
    });

    shutdown_signal().await;
    info!("shutdown signal received, draining");
    tokio::time::timeout(std::time::Duration::from_secs(30), async {
        api_server.abort();
        metrics_server.abort();
        worker_metrics_server.abort();
    })
    .await
    .ok();

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
