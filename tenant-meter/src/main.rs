//! tenant-meter: usage metering and enforcement service
//!
//! Long-running HTTP service that:
//! - Evaluates tenant enforcement state lazily (cache-aside, no scheduler)
//! - Serves the effective policy to SDKs and ingestion paths
//! - Answers per-request throttle checks

use tenant_meter::config::{Config, LogFormat};
use tenant_meter::{AppState, build_app};

type BoxError = Box<dyn std::error::Error + Send + Sync>;

const DEFAULT_LOG_FILTER: &str = "tenant_meter=info,tower_http=info";

fn init_tracing(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    match format {
        LogFormat::Json => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_target(true)
            .with_current_span(true)
            .init(),
        LogFormat::Text => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    // Load .env file
    let _ = dotenvy::dotenv();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    tracing::info!("Starting tenant-meter (env: {})", config.environment);

    let state = AppState::new(&config).await?;
    let app = build_app(state);

    let http_addr = format!("0.0.0.0:{}", config.http_port);
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;
    tracing::info!("tenant-meter HTTP listening on {http_addr}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("tenant-meter stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
    }
}
