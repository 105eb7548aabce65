mod config;
mod db;
mod insight;
mod models;
mod observability;
mod routes;
mod services;
mod warehouse;

use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::{cors::CorsLayer, limit::RequestBodyLimitLayer, trace::TraceLayer};

use crate::{
    config::AppConfig,
    db::DbPool,
    insight::GeminiClient,
    services::Services,
    warehouse::BigQueryClient,
};

#[derive(Debug, Parser)]
#[command(name = "finsight", version, about = "Cloud spend aggregation and insight service")]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long, default_value = "finsight.toml")]
    config: String,
}

/// Shared application state, cloned into every handler.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: Arc<DbPool>,
    pub services: Services,
}

pub fn build_app(config: &AppConfig, state: AppState) -> Router {
    Router::new()
        .route("/health", axum::routing::get(routes::health::health_check))
        .route("/health/live", axum::routing::get(routes::health::liveness))
        .route("/health/ready", axum::routing::get(routes::health::readiness))
        .nest("/api", routes::api_routes())
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .layer(RequestBodyLimitLayer::new(config.server.max_body_bytes))
        .with_state(state)
}

async fn run(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::from_file(&args.config)?;
    observability::init_tracing(&config.observability)?;

    let db = Arc::new(DbPool::from_config(&config.database).await?);
    if config.database.run_migrations() {
        db.run_migrations().await?;
    }

    let http = reqwest::Client::new();
    let warehouse = Arc::new(BigQueryClient::from_config(&config.warehouse, http.clone()));
    let generator = Arc::new(GeminiClient::from_config(&config.insight, http));

    let services = Services::new(&config, Arc::clone(&db), warehouse, generator);
    let state = AppState {
        config: Arc::new(config.clone()),
        db,
        services,
    };

    let addr = config.server.socket_addr();
    let app = build_app(&config, state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "finsight listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "Failed to install shutdown handler");
        return;
    }
    tracing::info!("Shutdown signal received");
}

#[tokio::main]
async fn main() {
    let args = Args::parse();
    if let Err(err) = run(args).await {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}
