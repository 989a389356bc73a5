use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use delaywatch_monitor::{Collaborators, MonitorRegistry, MonitorSettings};
use delaywatch_providers::{GoogleMapsTraffic, TrafficConfig};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use delaywatch_api::config::ServerConfig;
use delaywatch_api::router::build_app_router;
use delaywatch_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "delaywatch_api=debug,delaywatch_monitor=debug,delaywatch_providers=debug,tower_http=debug"
                    .into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    let settings = MonitorSettings::from_env();
    tracing::info!(
        poll_interval_secs = settings.poll_interval.as_secs(),
        max_attempts = settings.retry.max_attempts,
        "Loaded monitor settings",
    );

    // --- Collaborators ---
    let traffic_config = TrafficConfig::from_env().expect("Traffic provider must be configured");
    let collaborators = Collaborators::new(
        Arc::new(GoogleMapsTraffic::new(traffic_config)),
        delaywatch_providers::message_writer_from_env(),
        delaywatch_providers::notifier_from_env().expect("Failed to configure SMTP notifier"),
    );

    // --- Monitor registry ---
    let registry = Arc::new(MonitorRegistry::new(collaborators, settings));
    tracing::info!("Monitor registry started");

    // --- App state ---
    let state = AppState {
        config: Arc::new(config.clone()),
        registry: Arc::clone(&registry),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    // --- Post-shutdown cleanup ---
    tracing::info!("Server stopped accepting connections, stopping monitors");

    let shutdown_timeout = Duration::from_secs(config.shutdown_timeout_secs);
    if tokio::time::timeout(shutdown_timeout, registry.shutdown())
        .await
        .is_err()
    {
        tracing::warn!(
            timeout_secs = config.shutdown_timeout_secs,
            "Monitor registry did not shut down in time",
        );
    }

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
