use crate::api::AppState;
use crate::api::schemas::messages::{CountResponse, SendResponse};
use crate::domain::message::MessageDraft;
use crate::error::{AppError, Result};
use axum::{
    Json,
    extract::{Path, State},
    http::{StatusCode, header},
    response::IntoResponse,
};

pub async fn list_messages(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.store.list().await)
}

/// Adds a message composed by the operator.
///
/// # Errors
/// Returns `AppError::BadRequest` if a field is blank or the scheduled time is invalid.
pub async fn create_message(
    State(state): State<AppState>,
    Json(draft): Json<MessageDraft>,
) -> Result<impl IntoResponse> {
    let message = state.store.add(draft).await?;
    Ok((StatusCode::CREATED, Json(message)))
}

/// Replaces a message's fields and resets it to `pending`.
///
/// # Errors
/// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` while it is
/// being sent or once it has been sent.
pub async fn update_message(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(draft): Json<MessageDraft>,
) -> Result<impl IntoResponse> {
    Ok(Json(state.store.edit(&id, draft).await?))
}

/// # Errors
/// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` while it is being sent.
pub async fn delete_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    state.store.delete(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// # Errors
/// Returns `AppError::Conflict` while a message is being sent.
pub async fn clear_messages(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let count = state.store.clear().await?;
    Ok(Json(CountResponse { count }))
}

/// Replaces the whole list with an exported JSON array.
///
/// # Errors
/// Returns `AppError::BadRequest` if the body is not an array or holds no valid record.
pub async fn import_messages(State(state): State<AppState>, body: String) -> Result<impl IntoResponse> {
    let count = state.store.import_json(&body).await?;
    Ok(Json(CountResponse { count }))
}

/// # Errors
/// Returns `AppError::Serialization` if the list cannot be encoded.
pub async fn export_messages(State(state): State<AppState>) -> Result<impl IntoResponse> {
    let body = state.store.export_json().await?;
    Ok((
        [
            (header::CONTENT_TYPE, "application/json"),
            (header::CONTENT_DISPOSITION, "attachment; filename=\"messages.json\""),
        ],
        body,
    ))
}

/// Sends one message now, bypassing any batch.
///
/// # Errors
/// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` if a dispatch
/// is running or the message cannot be sent.
pub async fn send_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    let outcome = state.dispatch.send_one(&id).await?;
    SendResponse::from_outcome(outcome)
        .map(Json)
        .ok_or_else(|| AppError::Conflict("message is not available for sending".to_string()))
}

/// Checks a sent message against the relay's update feed.
///
/// # Errors
/// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` if the message
/// is not sent or has no receipt.
pub async fn verify_message(State(state): State<AppState>, Path(id): Path<String>) -> Result<impl IntoResponse> {
    Ok(Json(state.verification.verify_message(&id).await?))
}
