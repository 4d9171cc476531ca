#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, missing_debug_implementations, unreachable_pub)]
use axum::http::StatusCode;
mod common;

#[tokio::test]
async fn test_livez() {
    let relay = mockito::Server::new_async().await;
    let app = common::TestApp::spawn(&relay.url()).await;

    let resp = app.client.get(format!("{}/livez", app.root_url())).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers().contains_key("x-request-id"));
}

#[tokio::test]
async fn test_readyz_happy_path() {
    let relay = mockito::Server::new_async().await;
    let app = common::TestApp::spawn(&relay.url()).await;

    let resp = app.client.get(format!("{}/readyz", app.root_url())).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert_eq!(body["store"], "ok");
    assert_eq!(body["dispatch"], "idle");
}

#[tokio::test]
async fn test_readyz_store_error() {
    let relay = mockito::Server::new_async().await;
    let store_dir = tempfile::tempdir().unwrap();
    // Parent directory never exists, so every save fails
    let path = store_dir.path().join("missing").join("messages.json");
    let config = common::get_test_config(&relay.url(), path);
    let app = common::TestApp::spawn_with_config(config, store_dir).await;

    // The operation itself still succeeds in memory
    app.add_message("alice", "bob", "2024-01-01T10:00", "hi").await;

    let resp = app.client.get(format!("{}/readyz", app.root_url())).send().await.unwrap();

    assert_eq!(resp.status(), StatusCode::SERVICE_UNAVAILABLE);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["store"], "error");
    assert_eq!(app.messages().await.len(), 1);
}
