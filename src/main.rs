use anyhow::{Context, Result};
use axum::Router;
use std::{io::ErrorKind, sync::Arc};
use tokio::net::TcpListener;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing_subscriber::EnvFilter;

mod config;
mod errors;
mod handlers;
mod models;
mod routes;
mod services;

use services::{gateway_service::GatewayService, s3_backend::S3Backend};

#[tokio::main]
async fn main() -> Result<()> {
    // --- Environment from .env, if present ---
    dotenvy::dotenv().ok();

    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    // --- Parse config ---
    let cfg = config::AppConfig::from_env_and_args().context("loading configuration")?;

    tracing::info!("Starting bucket gateway with config: {:?}", cfg);

    // --- Ensure staging directory exists ---
    if !cfg.staging_dir.exists() {
        std::fs::create_dir_all(&cfg.staging_dir)?;
        tracing::info!("Created staging directory at {}", cfg.staging_dir.display());
    }
    if !cfg.static_dir.join("index.html").exists() {
        tracing::warn!(
            "No index.html under {}; `/` will return 404",
            cfg.static_dir.display()
        );
    }

    // --- Initialize core service ---
    let backend = Arc::new(S3Backend::new(&cfg.s3));
    let gateway = GatewayService::new(backend, cfg.staging_dir.clone());

    // --- Build router ---
    let app: Router = routes::routes(&cfg.static_dir)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(gateway);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err.into()),
    };

    tracing::info!("Server listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
