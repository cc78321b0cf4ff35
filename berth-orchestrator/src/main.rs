use anyhow::Context;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

pub mod api;
pub mod config;
pub mod db;
pub mod engine;
pub mod proxy;
pub mod repository;
pub mod service;
pub mod source;

#[cfg(test)]
mod testing;

use config::Config;
use engine::PodmanEngine;
use proxy::NginxProxy;
use repository::Stores;
use service::Orchestrator;
use source::GitHubSource;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "berth_orchestrator=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("Starting Berth Orchestrator...");

    let config = Config::from_env().context("Failed to load configuration")?;
    config.validate().context("Invalid configuration")?;

    let stores = open_stores(&config).await?;

    let engine = PodmanEngine::new(
        config.container_bin.clone(),
        config.images_dir.clone(),
        config.data_dir.clone(),
        config.stop_timeout,
    );
    engine.check_available().await?;

    let proxy = NginxProxy::new(
        config.proxy_sites_dir.clone(),
        config.proxy_reload_cmd.clone(),
    );

    let source = GitHubSource::new(
        &config.source_api_url,
        &config.source_raw_url,
        &config.source_web_url,
        config.source_token.clone(),
        config.manifest_file.clone(),
    )
    .context("Failed to create source host client")?;

    if config.webhook_secret.is_none() {
        tracing::warn!("BERTH_WEBHOOK_SECRET is not set, all webhooks will be rejected");
    }

    let orchestrator = Arc::new(Orchestrator::new(
        config.service_settings(),
        stores,
        Arc::new(engine),
        Arc::new(proxy),
        Arc::new(source),
    ));

    // Bring containers back in line with stored state before serving
    let report = orchestrator
        .recover()
        .await
        .context("Failed to recover service state")?;
    if report.failed > 0 {
        tracing::warn!("{} service(s) could not be recovered", report.failed);
    }

    // Build router with all API endpoints
    let app = api::create_router(api::AppState {
        orchestrator: orchestrator.clone(),
        webhook_secret: config.webhook_secret.clone(),
    });

    tracing::info!("Listening on {}", config.bind_addr);

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("Failed to bind to {}", config.bind_addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Waiting for background builds to finish...");
    orchestrator.wait_for_background_builds().await;

    tracing::info!("Berth Orchestrator stopped");
    Ok(())
}

/// Postgres collections when DATABASE_URL is set, JSON snapshot files otherwise
async fn open_stores(config: &Config) -> anyhow::Result<Stores> {
    match &config.database_url {
        Some(database_url) => {
            tracing::info!("Connecting to database...");

            let pool = db::create_pool(database_url)
                .await
                .context("Failed to create database pool")?;
            db::run_migrations(&pool)
                .await
                .context("Failed to run database migrations")?;

            Ok(Stores::postgres(pool))
        }
        None => {
            tracing::info!("Using state directory {}", config.state_dir.display());

            Stores::open_files(&config.state_dir)
                .await
                .with_context(|| format!("Failed to open state in {}", config.state_dir.display()))
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
