use crate::api::AppState;
use crate::api::schemas::health::HealthResponse;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

/// Liveness probe: returns 200 OK as long as the server is running.
pub async fn livez() -> impl IntoResponse {
    StatusCode::OK
}

/// Readiness probe: fails while the message list cannot be written to disk.
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let persisted = state.store.is_persisted();
    if !persisted {
        tracing::warn!(component = "store", "Readiness probe failed");
    }

    let response = HealthResponse {
        status: if persisted { "ok" } else { "error" }.to_string(),
        store: if persisted { "ok" } else { "error" }.to_string(),
        dispatch: if state.dispatch.status().running { "running" } else { "idle" }.to_string(),
    };
    let status_code = if persisted { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (status_code, Json(response))
}
