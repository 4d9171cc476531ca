use crate::api::AppState;
use crate::api::schemas::messages::LastTimestampResponse;
use crate::services::conversation_clock::ClockReading;
use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};

pub async fn lookup_identity(State(state): State<AppState>, Path(handle): Path<String>) -> impl IntoResponse {
    Json(state.identities.validate(&handle).await)
}

pub async fn last_timestamp(
    State(state): State<AppState>,
    Path((sender, receiver)): Path<(String, String)>,
) -> impl IntoResponse {
    let reading = state.clock.last_timestamp(&sender, &receiver).await;
    Json(LastTimestampResponse {
        last_timestamp: reading.last_timestamp(),
        available: !matches!(reading, ClockReading::Unavailable(_)),
    })
}
