//! Entry point: load config, wire dependencies, run the server and the
//! password-expiry notification worker.

use std::sync::Arc;

use authd::config::Config;
use authd::db;
use authd::notify::{PassExpiryWorker, PgNotifyStore};
use authd::services::{SessionsService, UsersService};
use authd::{create_app, AppState};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let config = Config::from_env().map_err(|e| anyhow::anyhow!("config: {}", e))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();

    let db_pool = db::create_pool(&config.database_url).await?;

    let state = AppState {
        db: db_pool.clone(),
        users: UsersService::new(db_pool.clone()),
        sessions: SessionsService::new(db_pool.clone(), config.session_ttl),
    };

    let cancel = CancellationToken::new();
    let worker = PassExpiryWorker::new(
        Arc::new(PgNotifyStore::new(db_pool)),
        config.notify_tick_interval,
        config.notify_worker_count,
    );
    let worker_cancel = cancel.clone();
    let worker_handle = tokio::spawn(async move { worker.run(worker_cancel).await });

    let app = create_app(state);
    tracing::info!(addr = %config.server_addr, "listening");
    let listener = tokio::net::TcpListener::bind(config.server_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(cancel.clone()))
        .await?;

    // The signal handler has already cancelled; wait for the worker to drain.
    cancel.cancel();
    let outcome = worker_handle.await?;
    tracing::info!(?outcome, "notification worker shut down");
    Ok(())
}

async fn shutdown_signal(cancel: CancellationToken) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
    cancel.cancel();
}
