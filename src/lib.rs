pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod oauth;
pub mod permission;
pub mod routes;
pub mod scheduler;
pub mod spotify;
pub mod telemetry;

use db::Stores;
use routes::AppState;
use scheduler::Scheduler;

pub async fn run(config: config::Config) -> anyhow::Result<()> {
    telemetry::init_tracing(&config.rust_log);

    let stores = match &config.database_url {
        Some(url) => Stores::postgres(db::init_pool(url).await?),
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store");
            Stores::memory()
        }
    };

    let state = AppState::new(&config, stores)?;

    let scheduler = Scheduler::new(
        state.stores.clone(),
        state.registry.clone(),
        config.scheduler_interval(),
    )
    .start();

    let addr = format!("{}:{}", config.host, config.port);
    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, routes::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.stop().await;
    tracing::info!("Server stopped");

    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
