use super::{ApiEnvelope, RelayEndpoints, as_integer};
use crate::services::identity_service::{IdentityLookup, IdentityValidator};
use async_trait::async_trait;
use serde_json::{Value, json};

/// Identity validator backed by the relay's user search endpoint.
#[derive(Clone, Debug)]
pub struct HttpDirectory {
    endpoints: RelayEndpoints,
}

impl HttpDirectory {
    #[must_use]
    pub const fn new(endpoints: RelayEndpoints) -> Self {
        Self { endpoints }
    }

    async fn search(&self, handle: &str) -> Result<ApiEnvelope, String> {
        let response = self
            .endpoints
            .http()
            .post(self.endpoints.api("search/user"))
            .json(&json!({ "content": handle }))
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        response.json::<ApiEnvelope>().await.map_err(|e| e.to_string())
    }
}

fn display_name(data: &Value, handle: &str) -> String {
    ["first_name", "original_first_name"]
        .iter()
        .filter_map(|field| data.get(field).and_then(Value::as_str))
        .find(|name| !name.trim().is_empty())
        .unwrap_or(handle)
        .to_string()
}

#[async_trait]
impl IdentityValidator for HttpDirectory {
    #[tracing::instrument(skip(self))]
    async fn validate(&self, handle: &str) -> IdentityLookup {
        match self.search(handle).await {
            Ok(ApiEnvelope { ok: true, data: Some(data), .. }) if data.is_object() => {
                let external_id = data.get("user_id").and_then(as_integer);
                IdentityLookup::found(display_name(&data, handle), external_id)
            }
            Ok(envelope) => {
                tracing::debug!(reason = ?envelope.err_message, "Handle not found in directory");
                IdentityLookup::not_found()
            }
            Err(reason) => {
                tracing::warn!(%reason, "Directory lookup failed");
                IdentityLookup::not_found()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use mockito::Matcher;

    fn directory(server: &mockito::ServerGuard) -> HttpDirectory {
        let config = RelayConfig { api_base_url: server.url(), ..RelayConfig::default() };
        HttpDirectory::new(RelayEndpoints::new(&config).expect("client"))
    }

    #[tokio::test]
    async fn test_found_user() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/search/user")
            .match_body(Matcher::Json(json!({ "content": "alice" })))
            .with_header("content-type", "application/json")
            .with_body(r#"{"ok":true,"data":{"user_id":"42","first_name":"","original_first_name":"Alice"}}"#)
            .create_async()
            .await;

        let lookup = directory(&server).validate("alice").await;

        assert_eq!(lookup, IdentityLookup::found("Alice".to_string(), Some(42)));
    }

    #[tokio::test]
    async fn test_missing_user_and_errors_fail_closed() {
        let mut server = mockito::Server::new_async().await;
        let _missing = server
            .mock("POST", "/search/user")
            .match_body(Matcher::PartialJson(json!({ "content": "ghost" })))
            .with_body(r#"{"ok":false,"errMessage":"no such user"}"#)
            .create_async()
            .await;
        let _broken = server
            .mock("POST", "/search/user")
            .match_body(Matcher::PartialJson(json!({ "content": "bob" })))
            .with_status(503)
            .create_async()
            .await;

        let directory = directory(&server);

        assert!(!directory.validate("ghost").await.exists);
        assert!(!directory.validate("bob").await.exists);
    }

    #[tokio::test]
    async fn test_name_falls_back_to_handle() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("POST", "/search/user")
            .with_body(r#"{"ok":true,"data":{"user_id":7}}"#)
            .create_async()
            .await;

        let lookup = directory(&server).validate("carol").await;

        assert_eq!(lookup.display_name.as_deref(), Some("carol"));
        assert_eq!(lookup.external_id, Some(7));
    }
}
