//! dockhand server entry point.

use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use dockhand_commit::UploadRegistry;
use dockhand_server::{AppState, Config, StaticContext, router};

fn main() -> anyhow::Result<()> {
    // Initialize structured logging.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        "starting dockhand server"
    );

    let config = Config::load()?;
    tracing::info!(bind = %config.bind, root = %config.root, "configuration loaded");

    let rt = tokio::runtime::Runtime::new()?;
    rt.block_on(run(config))?;

    tracing::info!("server shut down cleanly");
    Ok(())
}

async fn run(config: Config) -> anyhow::Result<()> {
    let registry = Arc::new(UploadRegistry::new());
    let state = AppState {
        context: Arc::new(StaticContext {
            user_id: 1,
            root: config.root.clone().into(),
        }),
        registry: registry.clone(),
        settings: config.uploads.clone(),
    };

    let listener = TcpListener::bind(&config.bind).await?;
    tracing::info!(addr = %listener.local_addr()?, "dockhand server listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Drain every user's in-flight completions before exiting.
    registry.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("shutdown signal received");
}
