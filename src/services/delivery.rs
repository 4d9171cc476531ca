use crate::domain::message::{DeliveryError, Message};
use async_trait::async_trait;

/// Relay acknowledgment of an accepted send.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DeliveryReceipt {
    /// Relay-assigned message id, when the relay variant returns one.
    pub receipt_id: Option<i64>,
}

/// Executes one send against the relay.
///
/// Calling it twice for the same message creates two relay records; callers
/// are responsible for never resending a `sent` message.
#[async_trait]
pub trait DeliveryClient: Send + Sync + std::fmt::Debug {
    /// # Errors
    /// Returns a [`DeliveryError`] classifying why the relay did not accept the message.
    async fn send(&self, message: &Message) -> Result<DeliveryReceipt, DeliveryError>;
}
