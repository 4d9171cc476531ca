use crate::domain::schedule;
use crate::error::{AppError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use time::UtcOffset;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Sending,
    Sent,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerificationStatus {
    Verified,
    Unverified,
    Pending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// The message timestamp is not after the conversation's last recorded one.
    OrderViolation,
    /// Non-2xx status or connection failure.
    TransportError,
    /// 2xx response carrying a relay-level rejection.
    ProtocolError,
    /// Unexpected local fault.
    Exception,
    /// Never attempted because an earlier message of its conversation hit an ordering failure.
    Skipped,
}

impl ErrorKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OrderViolation => "ORDER_VIOLATION",
            Self::TransportError => "TRANSPORT_ERROR",
            Self::ProtocolError => "PROTOCOL_ERROR",
            Self::Exception => "EXCEPTION",
            Self::Skipped => "SKIPPED",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a delivery attempt ended in `failed`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
#[error("{kind}: {detail}")]
pub struct DeliveryError {
    pub kind: ErrorKind,
    pub detail: String,
}

impl DeliveryError {
    pub fn new(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self { kind, detail: detail.into() }
    }

    pub fn order_violation(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::OrderViolation, detail)
    }

    pub fn transport(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransportError, detail)
    }

    pub fn protocol(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::ProtocolError, detail)
    }

    pub fn exception(detail: impl Into<String>) -> Self {
        Self::new(ErrorKind::Exception, detail)
    }

    #[must_use]
    pub fn skipped() -> Self {
        Self::new(ErrorKind::Skipped, "skipped due to prior ordering failure in this conversation")
    }
}

/// Operator input for creating or editing a message.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageDraft {
    pub sender: String,
    pub receiver: String,
    #[serde(alias = "time")]
    pub scheduled_time: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub(crate) id: String,
    pub(crate) sender: String,
    pub(crate) receiver: String,
    #[serde(alias = "time")]
    pub(crate) scheduled_time: String,
    #[serde(default)]
    pub(crate) unix_timestamp: i64,
    pub(crate) content: String,
    #[serde(default)]
    pub(crate) status: DeliveryStatus,
    #[serde(default, skip_serializing_if = "Option::is_none", alias = "sentMessageId")]
    pub(crate) delivery_receipt_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) verification_status: Option<VerificationStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(crate) last_error: Option<DeliveryError>,
}

impl Message {
    /// Builds a fresh `pending` message from operator input.
    ///
    /// # Errors
    /// Returns `AppError::BadRequest` if a field is blank or the scheduled time cannot be parsed.
    pub fn from_draft(id: String, draft: MessageDraft, offset: UtcOffset) -> Result<Self> {
        let draft = draft.normalized()?;
        let unix_timestamp = schedule::to_unix_timestamp(&draft.scheduled_time, offset)
            .ok_or_else(|| AppError::BadRequest(format!("Unrecognized scheduled time: {}", draft.scheduled_time)))?;

        Ok(Self {
            id,
            sender: draft.sender,
            receiver: draft.receiver,
            scheduled_time: draft.scheduled_time,
            unix_timestamp,
            content: draft.content,
            status: DeliveryStatus::Pending,
            delivery_receipt_id: None,
            verification_status: None,
            last_error: None,
        })
    }

    /// Validates an imported or persisted record and re-derives its timestamp.
    ///
    /// Returns `None` for records missing a required field.
    #[must_use]
    pub(crate) fn normalize_record(mut self, offset: UtcOffset) -> Option<Self> {
        let required = [&self.id, &self.sender, &self.receiver, &self.scheduled_time, &self.content];
        if required.iter().any(|field| field.trim().is_empty()) {
            return None;
        }
        self.unix_timestamp = schedule::to_unix_timestamp(&self.scheduled_time, offset)?;
        Some(self)
    }

    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn sender(&self) -> &str {
        &self.sender
    }

    #[must_use]
    pub fn receiver(&self) -> &str {
        &self.receiver
    }

    #[must_use]
    pub fn scheduled_time(&self) -> &str {
        &self.scheduled_time
    }

    #[must_use]
    pub const fn unix_timestamp(&self) -> i64 {
        self.unix_timestamp
    }

    #[must_use]
    pub fn content(&self) -> &str {
        &self.content
    }

    #[must_use]
    pub const fn status(&self) -> DeliveryStatus {
        self.status
    }

    #[must_use]
    pub const fn delivery_receipt_id(&self) -> Option<i64> {
        self.delivery_receipt_id
    }

    #[must_use]
    pub const fn verification_status(&self) -> Option<VerificationStatus> {
        self.verification_status
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&DeliveryError> {
        self.last_error.as_ref()
    }

    #[must_use]
    pub fn is_sent(&self) -> bool {
        self.status == DeliveryStatus::Sent
    }
}

impl MessageDraft {
    fn normalized(self) -> Result<Self> {
        let sender = self.sender.trim().to_string();
        let receiver = self.receiver.trim().to_string();
        let scheduled_time = self.scheduled_time.trim().to_string();

        if sender.is_empty() || receiver.is_empty() || scheduled_time.is_empty() {
            return Err(AppError::BadRequest("sender, receiver and scheduledTime are required".to_string()));
        }
        if self.content.trim().is_empty() {
            return Err(AppError::BadRequest("content must not be empty".to_string()));
        }

        Ok(Self { sender, receiver, scheduled_time, content: self.content })
    }
}
