//! HTTP server entry point.

use std::net::SocketAddr;

use anyhow::{Context, Result};
use clap::Parser;
use datasentry_core::DetectionConfig;
use datasentry_server::{AppState, DEFAULT_BODY_LIMIT, create_router};
use dotenv::dotenv;
use tracing::info;

#[derive(Parser, Debug)]
#[command(
    author = "DataSentry Team",
    version,
    about = "HTTP API for data-quality anomaly detection"
)]
struct Args {
    /// Address to bind
    #[arg(long, env = "DATASENTRY_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on
    #[arg(short, long, env = "DATASENTRY_PORT", default_value = "8000")]
    port: u16,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Seed for label synthesis, splitting and bagging
    #[arg(long, env = "DATASENTRY_SEED", default_value = "42")]
    seed: u64,

    /// Findings below this confidence are dropped (0.0 - 1.0)
    #[arg(long, default_value = "0.3")]
    min_confidence: f64,

    /// Default contamination for the learned detector
    #[arg(long, default_value = "0.1")]
    contamination: f64,

    /// Maximum upload size in bytes
    #[arg(long, default_value_t = DEFAULT_BODY_LIMIT)]
    body_limit: usize,
}

/// Initialize the tracing subscriber for logging.
fn init_logging(level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},tower_http=debug")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    // .env first so clap sees DATASENTRY_* variables
    dotenv().ok();

    let args = Args::parse();
    init_logging(&args.log_level);

    let config = DetectionConfig::builder()
        .seed(args.seed)
        .min_confidence(args.min_confidence)
        .contamination(args.contamination)
        .build()?;

    let state = AppState::new(config);
    let app = create_router(state, args.body_limit);

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Could not bind {addr}"))?;

    info!("Server listening on http://{}", addr);
    axum::serve(listener, app).await?;
    Ok(())
}
