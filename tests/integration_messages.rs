#![allow(clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, missing_debug_implementations, unreachable_pub)]
use reqwest::StatusCode;
use serde_json::{Value, json};
mod common;

#[tokio::test]
async fn test_create_list_edit_delete() {
    let relay = mockito::Server::new_async().await;
    let app = common::TestApp::spawn(&relay.url()).await;

    let created = app.add_message("alice", "bob", "2024-01-01T00:00", "hello").await;
    assert_eq!(created["status"], "pending");
    assert_eq!(created["unixTimestamp"], 1_704_067_200);
    let id = created["id"].as_str().unwrap().to_string();

    let resp = app
        .client
        .put(format!("{}/messages/{id}", app.url))
        .json(&json!({ "sender": "alice", "receiver": "bob", "scheduledTime": "2024-01-01T00:01", "content": "edited" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let edited: Value = resp.json().await.unwrap();
    assert_eq!(edited["content"], "edited");
    assert_eq!(edited["unixTimestamp"], 1_704_067_260);

    let resp = app.client.delete(format!("{}/messages/{id}", app.url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    assert!(app.messages().await.is_empty());

    let resp = app.client.delete(format!("{}/messages/{id}", app.url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_rejects_invalid_drafts() {
    let relay = mockito::Server::new_async().await;
    let app = common::TestApp::spawn(&relay.url()).await;

    for body in [
        json!({ "sender": " ", "receiver": "bob", "scheduledTime": "2024-01-01T00:00", "content": "x" }),
        json!({ "sender": "alice", "receiver": "bob", "scheduledTime": "tomorrow", "content": "x" }),
        json!({ "sender": "alice", "receiver": "bob", "scheduledTime": "2024-01-01T00:00", "content": "" }),
    ] {
        let resp = app.client.post(format!("{}/messages", app.url)).json(&body).send().await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST, "{body}");
    }
    assert!(app.messages().await.is_empty());
}

#[tokio::test]
async fn test_export_import_round_trip_and_persistence() {
    let relay = mockito::Server::new_async().await;
    let app = common::TestApp::spawn(&relay.url()).await;
    app.add_message("alice", "bob", "2024-01-01T00:00", "one").await;
    app.add_message("carol", "dave", "2024-01-02 08:30", "two").await;

    let resp = app.client.get(format!("{}/messages/export", app.url)).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(resp.headers()["content-disposition"].to_str().unwrap().contains("messages.json"));
    let exported = resp.text().await.unwrap();

    // The saved file uses the export format
    let on_disk = std::fs::read_to_string(&app.config.store.path).unwrap();
    assert_eq!(
        serde_json::from_str::<Value>(&on_disk).unwrap(),
        serde_json::from_str::<Value>(&exported).unwrap()
    );

    let resp = app.client.delete(format!("{}/messages", app.url)).send().await.unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap()["count"], 2);

    let resp = app.client.post(format!("{}/messages/import", app.url)).body(exported.clone()).send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.json::<Value>().await.unwrap()["count"], 2);

    let again = app.client.get(format!("{}/messages/export", app.url)).send().await.unwrap().text().await.unwrap();
    assert_eq!(again, exported);
}

#[tokio::test]
async fn test_import_filters_malformed_records() {
    let relay = mockito::Server::new_async().await;
    let app = common::TestApp::spawn(&relay.url()).await;

    let payload = json!([
        { "id": "a", "sender": "alice", "receiver": "bob", "time": "2024-01-01T00:00", "content": "legacy", "status": "sent", "sentMessageId": 9 },
        { "id": "b", "sender": "", "receiver": "bob", "scheduledTime": "2024-01-01T00:00", "content": "blank sender" },
        { "id": "c", "sender": "alice" }
    ]);
    let resp = app.client.post(format!("{}/messages/import", app.url)).json(&payload).send().await.unwrap();
    assert_eq!(resp.json::<Value>().await.unwrap()["count"], 1);

    let message = app.message_by_content("legacy").await;
    assert_eq!(message["status"], "sent");
    assert_eq!(message["deliveryReceiptId"], 9);
    assert_eq!(message["unixTimestamp"], 1_704_067_200);

    let resp = app.client.post(format!("{}/messages/import", app.url)).body("{\"not\":\"a list\"}").send().await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    assert_eq!(app.messages().await.len(), 1);
}

#[tokio::test]
async fn test_messages_survive_restart() {
    let relay = mockito::Server::new_async().await;
    let app = common::TestApp::spawn(&relay.url()).await;
    app.add_message("alice", "bob", "2024-01-01T00:00", "kept").await;

    let restarted = common::TestApp::spawn_with_config(app.config.clone(), tempfile::tempdir().unwrap()).await;

    assert_eq!(restarted.message_by_content("kept").await["status"], "pending");
}
