//! # mcloud Daemon
//!
//! Thin wrapper binary standing up the ticketed-task engine as a
//! standalone process listening for websocket clients.
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin mcloud-server
//!
//! # Override the listen port
//! MCLOUD__BIND_PORT=9000 cargo run --bin mcloud-server
//! ```

use tokio::signal;
use tracing::info;

use mcloud_core::Settings;
use mcloud_server::ServerHandle;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    mcloud_shared::logging::init_tracing();

    info!("Starting mcloud daemon...");
    info!("   Version: {}", env!("CARGO_PKG_VERSION"));
    info!(
        "   Build Mode: {}",
        if cfg!(debug_assertions) { "Debug" } else { "Release" }
    );

    let settings = Settings::load()?;
    let bind_port = settings.bind_port;
    let shutdown_timeout_ms = settings.shutdown_timeout_ms;
    let handle = ServerHandle::bootstrap(settings).await?;

    info!(port = bind_port, "mcloud daemon started successfully");
    info!("   Press Ctrl+C to shutdown gracefully");

    shutdown_signal().await;
    info!("Shutdown signal received, initiating graceful shutdown...");

    match tokio::time::timeout(std::time::Duration::from_millis(shutdown_timeout_ms), handle.stop()).await {
        Ok(()) => info!("mcloud daemon stopped"),
        Err(_) => tracing::error!(timeout_ms = shutdown_timeout_ms, "graceful shutdown timed out, forcing exit"),
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C"),
        _ = terminate => info!("Received SIGTERM"),
    }
}
