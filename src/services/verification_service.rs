use crate::domain::message::{DeliveryStatus, Message, VerificationStatus};
use crate::error::{AppError, Result};
use crate::storage::MessageStore;
use async_trait::async_trait;
use opentelemetry::{KeyValue, global, metrics::Counter};
use std::sync::Arc;

/// Confirms that a relay-acknowledged send shows up in the relay's own update feed.
///
/// Fails closed: transport errors and absent entries both return `false`.
#[async_trait]
pub trait VerificationReconciler: Send + Sync + std::fmt::Debug {
    async fn verify(&self, receipt_id: i64) -> bool;
}

#[derive(Clone, Debug)]
struct Metrics {
    verifications: Counter<u64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("relay-dispatch");
        Self {
            verifications: meter
                .u64_counter("relay_dispatch_verifications_total")
                .with_description("Verification checks against the relay update feed")
                .build(),
        }
    }
}

#[derive(Clone, Debug)]
pub struct VerificationService {
    store: MessageStore,
    reconciler: Arc<dyn VerificationReconciler>,
    metrics: Metrics,
}

impl VerificationService {
    #[must_use]
    pub fn new(store: MessageStore, reconciler: Arc<dyn VerificationReconciler>) -> Self {
        Self { store, reconciler, metrics: Metrics::new() }
    }

    /// Checks a sent message against the update feed and records the result.
    ///
    /// Usable right after a send or any time later as a manual check.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` if the
    /// message is not sent or has no receipt id to look for.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn verify_message(&self, id: &str) -> Result<Message> {
        let message = self.store.get(id).await.ok_or(AppError::NotFound)?;
        if message.status() != DeliveryStatus::Sent {
            return Err(AppError::Conflict("only sent messages can be verified".to_string()));
        }
        let Some(receipt_id) = message.delivery_receipt_id() else {
            return Err(AppError::Conflict("message has no delivery receipt to verify".to_string()));
        };

        let status = self.check(receipt_id).await;
        self.store.set_verification(id, status).await
    }

    pub(crate) async fn check(&self, receipt_id: i64) -> VerificationStatus {
        let found = self.reconciler.verify(receipt_id).await;
        let status = if found { VerificationStatus::Verified } else { VerificationStatus::Unverified };

        self.metrics
            .verifications
            .add(1, &[KeyValue::new("result", if found { "verified" } else { "unverified" })]);
        tracing::info!(receipt_id, found, "Verification check finished");
        status
    }
}
