use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::routes::InspectState;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub workers: WorkerHealth,
}

#[derive(Serialize)]
pub struct WorkerHealth {
    pub configured: usize,
    pub live: usize,
}

/// GET /health: worker pool liveness.
pub async fn health_check(State(state): State<InspectState>) -> (StatusCode, Json<HealthResponse>) {
    let configured = state.monitor.configured();
    let live = state.monitor.live();

    let (status_code, status) = if live == 0 {
        (StatusCode::SERVICE_UNAVAILABLE, "down")
    } else if live < configured {
        (StatusCode::OK, "degraded")
    } else {
        (StatusCode::OK, "ok")
    };

    let response = HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        workers: WorkerHealth { configured, live },
    };

    (status_code, Json(response))
}
