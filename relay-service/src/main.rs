use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod api;
mod completion;
mod config;
mod error;
mod ingestion;
mod relay;
mod service;

use crate::service::RelayService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // A missing .env is fine; the process environment is used as-is.
    dotenvy::dotenv().ok();

    init_logging();

    info!("Starting relay service v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config()?;
    info!(
        host = %config.server.host,
        port = config.server.port,
        cors_origin = config.server.cors_origin.as_deref().unwrap_or("*"),
        "Configuration loaded"
    );

    // Uploads are written here while they are extracted
    std::fs::create_dir_all(&config.storage.upload_dir)?;

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Failed to install metrics recorder; /metrics disabled");
            None
        }
    };

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let service = Arc::new(RelayService::new(config)?);
    let app = api::router(service, metrics)?;

    let listener = TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}

fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let format = fmt::format()
        .with_target(true)
        .with_thread_ids(true)
        .compact();

    // Use RUST_LOG if set, otherwise default to info level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("relay_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
