//! Airguard Service - Device gateway and HTTP API.
//!
//! Run with: `cargo run -p airguard-service`

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;

use airguard_service::{Aggregator, AppState, Config, api, ws};
use airguard_store::Store;

/// Airguard Service - Device gateway, event bus and HTTP REST API.
#[derive(Parser, Debug)]
#[command(name = "airguard-service")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Bind address (overrides config).
    #[arg(short, long)]
    bind: Option<String>,

    /// Database path (overrides config).
    #[arg(short, long)]
    database: Option<PathBuf>,

    /// Disable scheduled hourly and daily averages.
    #[arg(long)]
    no_aggregator: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("airguard_service=info".parse()?)
                .add_directive("tower_http=debug".parse()?),
        )
        .init();

    // Load configuration
    let mut config = match &args.config {
        Some(path) => Config::load(path)?,
        None => Config::load_default().unwrap_or_default(),
    };

    // Override config with CLI args
    if let Some(bind) = args.bind {
        config.server.bind = bind;
    }
    if let Some(db_path) = args.database {
        config.storage.path = db_path;
    }
    config.validate()?;

    if config.auth.tokens.is_empty() {
        tracing::warn!("No [[auth.tokens]] configured; every authenticated route will reject");
    }

    // Open the database
    info!("Opening database at {:?}", config.storage.path);
    let store = Store::open(&config.storage.path)?;

    let addr: SocketAddr = config.server.bind.parse()?;
    let gateway_path = config.gateway.path.clone();
    let aggregate = config.aggregation.enabled && !args.no_aggregator;

    let state = AppState::new(store, config);

    if aggregate {
        Aggregator::new(Arc::clone(&state)).start().await;
    } else {
        info!("Scheduled aggregation disabled");
    }

    // Build the router
    let app = Router::new()
        .merge(api::router())
        .merge(ws::router(&gateway_path))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    info!("Starting server on {} (device gateway at {})", addr, gateway_path);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
