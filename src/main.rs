use std::sync::Arc;

use anyhow::Result;
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use edge_ingest_service::{
    api::{self, AppState},
    config::Config,
    db::{self, PgReadingStore},
    influx::InfluxClient,
    ingest::{sink, IngestService, PrometheusMetrics},
    registry::RegistryService,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env (ignore error if file absent; env vars may be set externally)
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = Config::from_env()?;

    // Recorder first, so the counters exist before the first request
    let metrics = sink::install_recorder()?;

    let pool = db::create_pool(&config.database).await?;
    db::run_migrations(&pool).await?;
    info!("Database ready");

    let influx = InfluxClient::new(&config.influx)?;
    info!(url = %config.influx.url, bucket = %config.influx.bucket, "InfluxDB client ready");

    let ingest = IngestService::new(
        Arc::new(PgReadingStore::new(pool.clone())),
        Arc::new(influx),
        Arc::new(PrometheusMetrics),
    );

    let state = AppState {
        ingest: Arc::new(ingest),
        registry: RegistryService::new(pool),
        metrics,
    };

    let addr = format!("{}:{}", config.server_host, config.server_port);
    let listener = TcpListener::bind(&addr).await?;
    info!(addr = %addr, "HTTP server listening");

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
}
