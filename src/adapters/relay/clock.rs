use super::{ApiEnvelope, RelayEndpoints, as_integer};
use crate::services::conversation_clock::{ClockReading, ConversationClock};
use async_trait::async_trait;
use serde_json::json;

/// Values above this are millisecond timestamps.
const MILLIS_THRESHOLD: i64 = 100_000_000_000;

/// Conversation clock backed by the relay's last-dialog-date endpoint.
#[derive(Clone, Debug)]
pub struct HttpConversationClock {
    endpoints: RelayEndpoints,
}

impl HttpConversationClock {
    #[must_use]
    pub const fn new(endpoints: RelayEndpoints) -> Self {
        Self { endpoints }
    }
}

const fn normalize_seconds(raw: i64) -> i64 {
    if raw > MILLIS_THRESHOLD { raw / 1000 } else { raw }
}

#[async_trait]
impl ConversationClock for HttpConversationClock {
    #[tracing::instrument(skip(self))]
    async fn last_timestamp(&self, sender: &str, receiver: &str) -> ClockReading {
        if sender.trim().is_empty() || receiver.trim().is_empty() {
            return ClockReading::Empty;
        }

        let response = match self
            .endpoints
            .http()
            .post(self.endpoints.api("getdialoglastdate"))
            .json(&json!({ "from": sender, "to": receiver }))
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                tracing::warn!(error = %e, "Conversation clock request failed");
                return ClockReading::Unavailable(e.to_string());
            }
        };

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(%status, "Conversation clock returned an error status");
            return ClockReading::Unavailable(format!("HTTP {status}"));
        }

        let envelope = match response.json::<ApiEnvelope>().await {
            Ok(envelope) => envelope,
            Err(e) => {
                tracing::warn!(error = %e, "Conversation clock returned a malformed body");
                return ClockReading::Unavailable(e.to_string());
            }
        };

        if !envelope.ok {
            let reason = envelope.err_message.unwrap_or_else(|| "relay reported failure".to_string());
            tracing::warn!(%reason, "Conversation clock lookup rejected");
            return ClockReading::Unavailable(reason);
        }

        match envelope.data.as_ref().and_then(as_integer) {
            Some(raw) if raw > 0 => ClockReading::Known(normalize_seconds(raw)),
            _ => ClockReading::Empty,
        }
    }
}
