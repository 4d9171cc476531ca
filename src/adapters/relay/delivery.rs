use super::{ApiEnvelope, BotEnvelope, RelayEndpoints, as_integer, is_ordering_rejection, relay_error_text};
use crate::config::{RelayConfig, RelayVariant};
use crate::domain::message::{DeliveryError, Message};
use crate::services::delivery::{DeliveryClient, DeliveryReceipt};
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use time::macros::format_description;

#[derive(Debug, Serialize)]
struct ImportRequest<'a> {
    from: &'a str,
    to: &'a str,
    msg: &'a str,
    dateunix: i64,
    date: String,
}

#[derive(Debug, Serialize)]
struct BotCommand {
    chat_id: i64,
    chat_type: i32,
    text: String,
}

/// Delivery client for both relay variants.
#[derive(Clone, Debug)]
pub struct HttpDeliveryClient {
    endpoints: RelayEndpoints,
    variant: RelayVariant,
    chat_id: i64,
    chat_type: i32,
}

impl HttpDeliveryClient {
    #[must_use]
    pub const fn new(endpoints: RelayEndpoints, config: &RelayConfig) -> Self {
        Self { endpoints, variant: config.variant, chat_id: config.chat_id, chat_type: config.chat_type }
    }

    async fn post<T: Serialize + Sync>(&self, url: String, body: &T) -> Result<String, DeliveryError> {
        let response = self
            .endpoints
            .http()
            .post(url)
            .json(body)
            .send()
            .await
            .map_err(|e| DeliveryError::transport(e.to_string()))?;

        let status = response.status();
        let text = response.text().await.map_err(|e| DeliveryError::transport(e.to_string()))?;
        if status.is_success() {
            return Ok(text);
        }
        if let Some(reason) = relay_error_text(&text)
            && is_ordering_rejection(&reason)
        {
            return Err(DeliveryError::order_violation(reason));
        }
        Err(DeliveryError::transport(format!("HTTP {status}: {}", text.trim())))
    }

    async fn send_import(&self, message: &Message) -> Result<DeliveryReceipt, DeliveryError> {
        let request = ImportRequest {
            from: message.sender(),
            to: message.receiver(),
            msg: message.content(),
            dateunix: message.unix_timestamp(),
            date: today(),
        };
        let body = self.post(self.endpoints.api("import/message"), &request).await?;
        let envelope: ApiEnvelope = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::exception(format!("malformed relay response: {e}")))?;

        if !envelope.ok {
            return Err(rejection(envelope.err_message));
        }
        Ok(DeliveryReceipt { receipt_id: envelope.data.as_ref().and_then(receipt_id) })
    }

    async fn send_bot(&self, message: &Message) -> Result<DeliveryReceipt, DeliveryError> {
        let command = BotCommand {
            chat_id: self.chat_id,
            chat_type: self.chat_type,
            text: format!(
                "#sendmessage\nfrom:{}\nto:{}\ndateunix:{}\nmsg:{}",
                message.sender(),
                message.receiver(),
                message.unix_timestamp(),
                message.content()
            ),
        };
        let body = self.post(self.endpoints.bot("sendTextMessage"), &command).await?;
        let envelope: BotEnvelope = serde_json::from_str(&body)
            .map_err(|e| DeliveryError::exception(format!("malformed relay response: {e}")))?;

        if !envelope.ok {
            return Err(rejection(envelope.description));
        }
        Ok(DeliveryReceipt { receipt_id: envelope.result.as_ref().and_then(receipt_id) })
    }
}

/// Today's UTC date, as the relay expects alongside each import.
fn today() -> String {
    OffsetDateTime::now_utc().date().format(format_description!("[year]-[month]-[day]")).unwrap_or_default()
}

fn rejection(reason: Option<String>) -> DeliveryError {
    let reason = reason.unwrap_or_else(|| "relay rejected the message".to_string());
    if is_ordering_rejection(&reason) {
        DeliveryError::order_violation(reason)
    } else {
        DeliveryError::protocol(reason)
    }
}

/// The relay returns either a bare id or an object carrying `message_id`.
fn receipt_id(data: &Value) -> Option<i64> {
    as_integer(data).or_else(|| ["message_id", "id"].iter().find_map(|key| data.get(key).and_then(as_integer)))
}

#[async_trait]
impl DeliveryClient for HttpDeliveryClient {
    #[tracing::instrument(skip_all, fields(message_id = %message.id(), variant = ?self.variant))]
    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, DeliveryError> {
        match self.variant {
            RelayVariant::Import => self.send_import(message).await,
            RelayVariant::Bot => self.send_bot(message).await,
        }
    }
}
