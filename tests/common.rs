#![allow(dead_code, clippy::unwrap_used, clippy::panic, clippy::missing_panics_doc, unreachable_pub)]
use relay_dispatch::api::AppState;
use relay_dispatch::config::{Config, DispatchConfig, RelayConfig, ServerConfig, StoreConfig, TelemetryConfig};
use relay_dispatch::{AppBuilder, api};
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Once;
use std::time::Duration;
use tempfile::TempDir;
use time::UtcOffset;
use tokio::sync::watch;

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "warn".into())
            .add_directive("relay_dispatch=debug".parse().unwrap())
            .add_directive("tower=warn".parse().unwrap())
            .add_directive("hyper=warn".parse().unwrap())
            .add_directive("reqwest=warn".parse().unwrap());

        tracing_subscriber::fmt().with_env_filter(filter).init();
    });
}

pub fn get_test_config(relay_url: &str, store_path: PathBuf) -> Config {
    Config {
        server: ServerConfig { port: 0, ..ServerConfig::default() },
        store: StoreConfig { path: store_path, utc_offset: UtcOffset::UTC },
        relay: RelayConfig {
            api_base_url: relay_url.to_string(),
            bot_base_url: Some(relay_url.to_string()),
            timeout_secs: 5,
            connect_timeout_secs: 2,
            ..RelayConfig::default()
        },
        dispatch: DispatchConfig { inter_message_delay_ms: 0, ..DispatchConfig::default() },
        telemetry: TelemetryConfig::default(),
    }
}

pub struct TestApp {
    pub url: String,
    pub client: reqwest::Client,
    pub state: AppState,
    pub config: Config,
    pub shutdown_tx: watch::Sender<bool>,
    pub store_dir: TempDir,
}

impl TestApp {
    pub async fn spawn(relay_url: &str) -> Self {
        let store_dir = tempfile::tempdir().unwrap();
        let config = get_test_config(relay_url, store_dir.path().join("messages.json"));
        Self::spawn_with_config(config, store_dir).await
    }

    pub async fn spawn_with_config(config: Config, store_dir: TempDir) -> Self {
        setup_tracing();

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let state = AppBuilder::new(config.clone()).with_shutdown_rx(shutdown_rx.clone()).build().await.unwrap();

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let router = api::app_router(state.clone());
        let mut server_rx = shutdown_rx;
        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = server_rx.wait_for(|&s| s).await;
                })
                .await
                .unwrap();
        });

        Self {
            url: format!("http://{addr}/api/v1"),
            client: reqwest::Client::new(),
            state,
            config,
            shutdown_tx,
            store_dir,
        }
    }

    pub fn root_url(&self) -> String {
        self.url.trim_end_matches("/api/v1").to_string()
    }

    pub async fn add_message(&self, sender: &str, receiver: &str, time: &str, content: &str) -> Value {
        let resp = self
            .client
            .post(format!("{}/messages", self.url))
            .json(&serde_json::json!({
                "sender": sender,
                "receiver": receiver,
                "scheduledTime": time,
                "content": content,
            }))
            .send()
            .await
            .unwrap();
        assert_eq!(resp.status(), reqwest::StatusCode::CREATED);
        resp.json().await.unwrap()
    }

    pub async fn messages(&self) -> Vec<Value> {
        self.client.get(format!("{}/messages", self.url)).send().await.unwrap().json().await.unwrap()
    }

    pub async fn message_by_content(&self, content: &str) -> Value {
        self.messages().await.into_iter().find(|m| m["content"] == content).unwrap()
    }

    /// Polls the dispatch status until the background run is over.
    pub async fn wait_for_dispatch(&self) -> Value {
        for _ in 0..250 {
            let status: Value =
                self.client.get(format!("{}/dispatch", self.url)).send().await.unwrap().json().await.unwrap();
            if status["running"] == false {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("dispatch did not finish in time");
    }
}

/// Relay double: an empty conversation clock plus an import endpoint that accepts everything.
pub async fn relay_accepting_all(server: &mut mockito::ServerGuard) -> (mockito::Mock, mockito::Mock) {
    let clock = server
        .mock("POST", "/getdialoglastdate")
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true,"data":null}"#)
        .create_async()
        .await;
    let import = server
        .mock("POST", "/import/message")
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":true,"data":{"message_id":500}}"#)
        .create_async()
        .await;
    (clock, import)
}
