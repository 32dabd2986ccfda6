use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::net::TcpListener;
use tracing::{info, warn};

mod agent;
mod api;
mod config;
mod db;
mod embeddings;
mod error;
mod escalation;
mod i18n;
mod ingestion;
mod knowledge;
mod llm;
mod rerank;
mod service;
mod stt;
#[cfg(test)]
mod test_support;
mod tools;

use crate::service::AssistantService;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    init_logging();

    info!(
        "Starting factory assistant service v{}",
        env!("CARGO_PKG_VERSION")
    );

    let config = Arc::new(config::load_config()?);
    info!(
        host = %config.server.host,
        port = config.server.port,
        model = %config.model.model,
        locale = %config.agent.locale,
        "Configuration loaded"
    );

    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!(error = %e, "Metrics recorder unavailable, /metrics will be empty");
            None
        }
    };

    // Ensure storage directories exist
    let storage = &config.storage;
    for dir in [&storage.data_dir, &storage.upload_dir, &storage.images_dir] {
        std::fs::create_dir_all(dir)?;
    }
    if let Some(parent) = storage.escalation_log.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let service = Arc::new(AssistantService::new(config.clone())?);
    let app = api::router(service, metrics);

    // Start the server
    let addr = format!("{}:{}", config.server.host, config.server.port);
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
        .unwrap_or_else(|_| EnvFilter::new("factory_assist_service=info"));

    tracing_subscriber::registry()
        .with(fmt::layer().event_format(format))
        .with(filter)
        .init();
}
