mod api;
mod config;
mod db;
mod errors;
mod ledger;
mod models;
mod registry;
mod state;

use crate::config::Config;
use crate::errors::ApiError;
use crate::ledger::SqliteLedger;
use crate::state::AppState;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const PURGE_INTERVAL: Duration = Duration::from_secs(3600);

#[tokio::main]
async fn main() -> Result<(), ApiError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse().unwrap()))
        .init();

    let config = Config::from_env()?;

    // Store local state under backend/data (ignored by git).
    std::fs::create_dir_all(&config.data_dir).map_err(|_| ApiError::Internal)?;

    let db_path = config.data_dir.join("ledger.sqlite");
    let db_url = format!("sqlite:{}?mode=rwc", db_path.to_string_lossy());

    let db = db::connect(&db_url).await?;
    db::init_schema(&db).await?;

    if config.demo_mode {
        tracing::warn!("DEMO_MODE is on: access may be granted on the local proof alone");
    }

    tokio::spawn(purge_expired_results(SqliteLedger::new(db.clone())));

    let addr = config.addr.clone();
    let state = AppState::new(db, config);
    let app = api::router(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .map_err(|_| ApiError::Internal)?;

    tracing::info!(%addr, "backend listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|_| ApiError::Internal)?;

    Ok(())
}

async fn purge_expired_results(ledger: SqliteLedger) {
    let mut ticker = tokio::time::interval(PURGE_INTERVAL);
    loop {
        ticker.tick().await;
        match ledger.purge_expired().await {
            Ok(0) => {}
            Ok(n) => tracing::info!(removed = n, "expired entities purged"),
            Err(e) => tracing::warn!(error = %e, "purge failed"),
        }
    }
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_err() {
        tracing::warn!("failed to install ctrl-c handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}
