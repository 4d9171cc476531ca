use crate::domain::message::Message;
use crate::services::dispatcher::StepOutcome;
use serde::Serialize;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountResponse {
    pub count: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SendOutcome {
    Sent,
    Failed,
    AlreadySent,
}

/// Result of a single-message send.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendResponse {
    pub outcome: SendOutcome,
    pub message: Message,
}

impl SendResponse {
    /// `None` when the step never reached the relay because the message was unavailable.
    #[must_use]
    pub fn from_outcome(outcome: StepOutcome) -> Option<Self> {
        let (outcome, message) = match outcome {
            StepOutcome::Sent(message) => (SendOutcome::Sent, message),
            StepOutcome::Failed(message) => (SendOutcome::Failed, message),
            StepOutcome::AlreadySent(message) => (SendOutcome::AlreadySent, message),
            StepOutcome::Unavailable(_) => return None,
        };
        Some(Self { outcome, message })
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LastTimestampResponse {
    pub last_timestamp: Option<i64>,
    /// `false` when the relay could not be asked; `lastTimestamp` is then null.
    pub available: bool,
}
