pub mod health;
pub mod monitors;

use axum::Router;

use crate::state::AppState;

/// Build the `/api/v1` route tree.
///
/// ```text
/// /monitors                          start (POST), list (GET)
/// /monitors/{id}                     status snapshot (GET)
/// /monitors/{id}/snooze              snooze signal (POST)
/// /monitors/{id}/route-restarted     route restart signal (POST)
/// /monitors/{id}/check-now           check-now signal (POST)
/// /monitors/{id}/cancel              cancel instance (POST)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new().nest("/monitors", monitors::router())
}
