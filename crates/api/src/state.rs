use std::sync::Arc;

use delaywatch_monitor::MonitorRegistry;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; everything inside is behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    /// Every monitor instance started by this process.
    pub registry: Arc<MonitorRegistry>,
}
