use crate::services::conversation_clock::ConversationClock;
use crate::services::dispatch_service::DispatchService;
use crate::services::identity_service::IdentityService;
use crate::services::verification_service::VerificationService;
use crate::storage::MessageStore;
use axum::body::Body;
use axum::http::{HeaderName, Request};
use axum::{
    Router,
    routing::{get, post, put},
};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub mod dispatch;
pub mod health;
pub mod lookups;
pub mod messages;
pub mod schemas;

const REQUEST_ID_HEADER: &str = "x-request-id";

#[derive(Clone, Debug)]
pub struct AppState {
    pub store: MessageStore,
    pub dispatch: DispatchService,
    pub verification: VerificationService,
    pub identities: IdentityService,
    pub clock: Arc<dyn ConversationClock>,
}

/// Configures and returns the operator API router.
pub fn app_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .route(
            "/messages",
            get(messages::list_messages).post(messages::create_message).delete(messages::clear_messages),
        )
        .route("/messages/import", post(messages::import_messages))
        .route("/messages/export", get(messages::export_messages))
        .route("/messages/{id}", put(messages::update_message).delete(messages::delete_message))
        .route("/messages/{id}/send", post(messages::send_message))
        .route("/messages/{id}/verify", post(messages::verify_message))
        .route(
            "/dispatch",
            get(dispatch::dispatch_status).post(dispatch::start_dispatch).delete(dispatch::cancel_dispatch),
        )
        .route("/identities/{handle}", get(lookups::lookup_identity))
        .route("/conversations/{sender}/{receiver}/last-timestamp", get(lookups::last_timestamp));

    Router::new()
        .route("/livez", get(health::livez))
        .route("/readyz", get(health::readyz))
        .nest("/api/v1", api_routes)
        .layer(PropagateRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER)))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(|request: &Request<Body>| {
                    let request_id = request
                        .extensions()
                        .get::<tower_http::request_id::RequestId>()
                        .and_then(|id| id.header_value().to_str().ok())
                        .unwrap_or_default()
                        .to_string();

                    tracing::info_span!(
                        "request",
                        "request_id" = %request_id,
                        "http.request.method" = %request.method(),
                        "url.path" = %request.uri().path(),
                        "http.response.status_code" = tracing::field::Empty,
                        "otel.kind" = "server",
                    )
                })
                .on_response(
                    |response: &axum::http::Response<_>, latency: std::time::Duration, _span: &tracing::Span| {
                        let status = response.status();
                        tracing::Span::current().record("http.response.status_code", status.as_u16());

                        tracing::info!(
                            latency_ms = %latency.as_millis(),
                            status = %status.as_u16(),
                            "request completed"
                        );
                    },
                )
                .on_failure(|error, _latency, _span: &tracing::Span| {
                    tracing::error!(error = %error, "request failed");
                }),
        )
        .layer(SetRequestIdLayer::new(HeaderName::from_static(REQUEST_ID_HEADER), MakeRequestUuid))
        .with_state(state)
}
