//! Ephemeris registry binary.
//!
//! Serves the registration, discovery and heartbeat API and runs the
//! liveness sweep until interrupted.

use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use ephemeris_registry::{api, RegKey, RegistryConfig, RegistryService};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialise tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::from_default_env().add_directive("ephemeris_registry=info".parse()?),
        )
        .init();

    info!("Ephemeris registry starting");

    let config = RegistryConfig::load()?;
    info!(
        listen_addr = %config.api.listen_addr,
        heartbeat_timeout_secs = config.heartbeat.timeout.as_secs(),
        sweep_interval_secs = config.heartbeat.sweep_interval.as_secs(),
        "Configuration loaded"
    );

    let regkey = RegKey::from_env()?;
    let service = Arc::new(RegistryService::new(&config, regkey));

    let cancel = CancellationToken::new();

    // Start the liveness sweep
    let sweeper = tokio::spawn(service.clone().run_sweeps(cancel.clone()));

    let app = api::router(service);
    let listener = TcpListener::bind(config.api.listen_addr).await?;
    info!(addr = %config.api.listen_addr, "Registry API listening");

    let server_cancel = cancel.clone();
    tokio::spawn(async move {
        shutdown_signal().await;
        server_cancel.cancel();
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;

    sweeper.await?;
    info!("Registry stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!("Received Ctrl+C, shutting down"),
        () = terminate => info!("Received SIGTERM, shutting down"),
    }
}
