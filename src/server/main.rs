// Main entry point for the flight HTTP server.

use anyhow::{Context, Result};
use flight_core::config::Config;
use flight_core::server::app::build_production_app;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,flight_core=debug,sqlx=warn".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("starting flight server");

    let config = Config::from_env().context("failed to load configuration")?;
    tracing::info!(
        max_workers = config.max_workers,
        bucket = %config.object_store.bucket,
        registry_path = %config.registry_path,
        "configuration loaded"
    );

    let (app, dispatcher) = build_production_app(&config)
        .await
        .context("failed to build application")?;

    let addr = format!("{}:{}", config.app_host, config.app_port);
    tracing::info!(%addr, "binding listener");
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .context("failed to bind to address")?;

    let shutdown_grace = config.shutdown_grace;
    let shutdown_dispatcher = dispatcher.clone();

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async move {
            let _ = tokio::signal::ctrl_c().await;
            tracing::info!("shutdown signal received, draining worker pool");
            shutdown_dispatcher.shutdown(shutdown_grace).await;
        })
        .await
        .context("server error")?;

    Ok(())
}
