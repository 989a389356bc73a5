//! Handlers for delivery monitor endpoints.
//!
//! Signal endpoints answer `202 Accepted`: the signal is queued in the
//! instance's mailbox and applied before its next step.

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use chrono::Utc;
use delaywatch_core::{InstanceId, MonitorConfig, Signal};
use serde::{Deserialize, Serialize};

use crate::error::AppResult;
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Request / response types
// ---------------------------------------------------------------------------

/// Request body for the snooze endpoint.
#[derive(Debug, Deserialize)]
pub struct SnoozeRequest {
    /// Minutes to wait before the next check. Fractions are floored;
    /// negative values snooze for zero.
    pub minutes: f64,
}

/// Acknowledgement returned by signal endpoints.
#[derive(Debug, Serialize)]
pub struct SignalAccepted {
    pub instance_id: InstanceId,
    pub signal: &'static str,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// POST /monitors
///
/// Start monitoring a delivery. The instance id is derived from the
/// delivery id and today's date.
pub async fn start_monitor(
    State(state): State<AppState>,
    Json(config): Json<MonitorConfig>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state
        .registry
        .start(config, Utc::now().date_naive())
        .await?;

    tracing::info!(
        instance_id = %snapshot.instance_id,
        delivery_id = %snapshot.config.delivery_id,
        "Monitor started via API",
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: snapshot })))
}

/// GET /monitors
pub async fn list_monitors(State(state): State<AppState>) -> AppResult<impl IntoResponse> {
    let snapshots = state.registry.list().await;
    Ok(Json(DataResponse { data: snapshots }))
}

/// GET /monitors/{id}
pub async fn get_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.registry.status(&InstanceId::from(id)).await?;
    Ok(Json(DataResponse { data: snapshot }))
}

/// POST /monitors/{id}/snooze
pub async fn snooze(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<SnoozeRequest>,
) -> AppResult<impl IntoResponse> {
    send_signal(
        &state,
        id,
        Signal::Snooze {
            minutes: input.minutes,
        },
    )
    .await
}

/// POST /monitors/{id}/route-restarted
pub async fn route_restarted(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    send_signal(&state, id, Signal::RouteRestarted).await
}

/// POST /monitors/{id}/check-now
pub async fn check_now(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    send_signal(&state, id, Signal::CheckNow).await
}

/// POST /monitors/{id}/cancel
///
/// Stops the instance at its next suspension point and returns its final
/// snapshot.
pub async fn cancel_monitor(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<impl IntoResponse> {
    let snapshot = state.registry.cancel(&InstanceId::from(id)).await?;
    tracing::info!(instance_id = %snapshot.instance_id, status = ?snapshot.status, "Monitor cancelled via API");
    Ok((StatusCode::ACCEPTED, Json(DataResponse { data: snapshot })))
}

// ---- private helpers ----

async fn send_signal(
    state: &AppState,
    id: String,
    signal: Signal,
) -> AppResult<(StatusCode, Json<DataResponse<SignalAccepted>>)> {
    let instance_id = InstanceId::from(id);
    state.registry.signal(&instance_id, signal).await?;

    tracing::info!(instance_id = %instance_id, signal = signal.name(), "Signal accepted");

    Ok((
        StatusCode::ACCEPTED,
        Json(DataResponse {
            data: SignalAccepted {
                instance_id,
                signal: signal.name(),
            },
        }),
    ))
}
