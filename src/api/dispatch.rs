use crate::api::AppState;
use crate::api::schemas::dispatch::{CancelResponse, DispatchRequest};
use crate::error::Result;
use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};

pub async fn dispatch_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.dispatch.status())
}

/// Starts a background bulk dispatch.
///
/// # Errors
/// Returns `AppError::BadRequest` for a malformed selection and `AppError::Conflict`
/// if a dispatch is already running.
pub async fn start_dispatch(
    State(state): State<AppState>,
    request: Option<Json<DispatchRequest>>,
) -> Result<impl IntoResponse> {
    let selection = request.map(|Json(r)| r).unwrap_or_default().into_selection()?;
    let status = state.dispatch.start(selection)?;
    Ok((StatusCode::ACCEPTED, Json(status)))
}

pub async fn cancel_dispatch(State(state): State<AppState>) -> impl IntoResponse {
    Json(CancelResponse { cancelled: state.dispatch.cancel() })
}
