use async_trait::async_trait;

/// What the relay reports about a conversation's most recent message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClockReading {
    /// Epoch seconds of the latest recorded message.
    Known(i64),
    /// No prior message, or sender/receiver was blank.
    Empty,
    /// The lookup failed; carries the reason for logs.
    Unavailable(String),
}

impl ClockReading {
    /// The fail-open view of the reading: an unavailable clock counts as "no prior message".
    #[must_use]
    pub const fn last_timestamp(&self) -> Option<i64> {
        match self {
            Self::Known(ts) => Some(*ts),
            Self::Empty | Self::Unavailable(_) => None,
        }
    }
}

/// Source of truth for cross-session conversation history.
#[async_trait]
pub trait ConversationClock: Send + Sync + std::fmt::Debug {
    async fn last_timestamp(&self, sender: &str, receiver: &str) -> ClockReading;
}
