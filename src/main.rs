use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use salonbook::api::{self, AppState};
use salonbook::catalog::InMemoryCatalog;
use salonbook::clock::system_clock;
use salonbook::config::Config;
use salonbook::salon::SalonManager;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt::init();

    let config = Config::from_env();
    salonbook::observability::init(config.metrics_port)?;

    let catalog = InMemoryCatalog::load(&config.catalog_path)?;
    let salon_count = catalog.salon_count();

    // Ensure data directory exists
    std::fs::create_dir_all(&config.data_dir)?;

    let salons = Arc::new(SalonManager::new(
        Arc::new(catalog),
        config.data_dir.clone(),
        system_clock(),
        config.engine.clone(),
        config.compact_threshold,
    ));
    if config.admin_token.is_none() {
        tracing::warn!("SALONBOOK_ADMIN_TOKEN not set, management API is disabled");
    }
    let state = AppState {
        salons,
        admin_token: config.admin_token.as_deref().map(Arc::from),
    };

    let addr = config.addr();
    let listener = TcpListener::bind(&addr).await?;
    info!("salonbook listening on {addr}");
    info!("  data_dir: {}", config.data_dir.display());
    info!("  catalog: {} ({salon_count} salons)", config.catalog_path.display());
    info!(
        "  metrics: {}",
        config
            .metrics_port
            .map_or("disabled".to_string(), |p| format!("http://0.0.0.0:{p}/metrics"))
    );

    axum::serve(listener, api::router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("salonbook stopped");
    Ok(())
}

/// Resolves on ctrl-c or SIGTERM. In-flight requests are drained by axum.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!("failed to register SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
    info!("shutdown signal received, draining requests");
}
