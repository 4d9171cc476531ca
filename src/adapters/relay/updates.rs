use super::{RelayEndpoints, as_integer};
use crate::services::verification_service::VerificationReconciler;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    ok: bool,
    #[serde(default)]
    result: Vec<Update>,
}

#[derive(Debug, Deserialize)]
struct Update {
    #[serde(default)]
    message: Option<Value>,
}

impl Update {
    fn message_id(&self) -> Option<i64> {
        self.message.as_ref()?.get("message_id").and_then(as_integer)
    }
}

/// Verification reconciler that scans the relay's recent update feed.
#[derive(Clone, Debug)]
pub struct HttpUpdateFeed {
    endpoints: RelayEndpoints,
}

impl HttpUpdateFeed {
    #[must_use]
    pub const fn new(endpoints: RelayEndpoints) -> Self {
        Self { endpoints }
    }

    async fn fetch(&self) -> Result<UpdatesResponse, String> {
        let response =
            self.endpoints.http().get(self.endpoints.bot("getUpdates")).send().await.map_err(|e| e.to_string())?;
        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {status}"));
        }
        response.json().await.map_err(|e| e.to_string())
    }
}

#[async_trait]
impl VerificationReconciler for HttpUpdateFeed {
    #[tracing::instrument(skip(self))]
    async fn verify(&self, receipt_id: i64) -> bool {
        match self.fetch().await {
            Ok(feed) if feed.ok => {
                let found = feed.result.iter().any(|update| update.message_id() == Some(receipt_id));
                tracing::debug!(updates = feed.result.len(), found, "Scanned relay update feed");
                found
            }
            Ok(_) => {
                tracing::warn!("Update feed reported failure");
                false
            }
            Err(reason) => {
                tracing::warn!(%reason, "Update feed request failed");
                false
            }
        }
    }
}
