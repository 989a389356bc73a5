//! Route definitions for delivery monitors.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::monitors;
use crate::state::AppState;

/// Routes mounted at `/monitors`.
///
/// ```text
/// POST /                       -> start_monitor
/// GET  /                       -> list_monitors
/// GET  /{id}                   -> get_monitor
/// POST /{id}/snooze            -> snooze
/// POST /{id}/route-restarted   -> route_restarted
/// POST /{id}/check-now         -> check_now
/// POST /{id}/cancel            -> cancel_monitor
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            post(monitors::start_monitor).get(monitors::list_monitors),
        )
        .route("/{id}", get(monitors::get_monitor))
        .route("/{id}/snooze", post(monitors::snooze))
        .route("/{id}/route-restarted", post(monitors::route_restarted))
        .route("/{id}/check-now", post(monitors::check_now))
        .route("/{id}/cancel", post(monitors::cancel_monitor))
}
