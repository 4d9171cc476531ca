use crate::config::{ClockFailurePolicy, DispatchConfig};
use crate::domain::conversation::{ConversationKey, group_by_conversation};
use crate::domain::message::{DeliveryError, DeliveryStatus, ErrorKind, Message, VerificationStatus};
use crate::error::{AppError, Result};
use crate::services::conversation_clock::{ClockReading, ConversationClock};
use crate::services::delivery::DeliveryClient;
use crate::services::progress::{Progress, ProgressObserver};
use crate::services::verification_service::VerificationService;
use crate::storage::MessageStore;
use futures::FutureExt;
use opentelemetry::{
    KeyValue, global,
    metrics::{Counter, Histogram},
};
use serde::Serialize;
use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Mutex, OwnedMutexGuard};
use tokio_util::sync::CancellationToken;

#[derive(Clone, Debug)]
struct Metrics {
    messages: Counter<u64>,
    batch_size: Histogram<u64>,
    send_duration: Histogram<f64>,
}

impl Metrics {
    fn new() -> Self {
        let meter = global::meter("relay-dispatch");
        Self {
            messages: meter
                .u64_counter("relay_dispatch_messages_total")
                .with_description("Messages processed by the dispatcher, by outcome")
                .build(),
            batch_size: meter
                .u64_histogram("relay_dispatch_batch_size")
                .with_description("Number of messages selected for a bulk run")
                .build(),
            send_duration: meter
                .f64_histogram("relay_dispatch_send_duration_seconds")
                .with_description("Latency of a single relay send")
                .build(),
        }
    }
}

/// Which not-yet-sent messages a bulk run picks up.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Selection {
    #[default]
    AllUnsent,
    Ids(HashSet<String>),
    Conversation(ConversationKey),
}

impl Selection {
    #[must_use]
    pub fn matches(&self, message: &Message) -> bool {
        if matches!(message.status(), DeliveryStatus::Sent | DeliveryStatus::Sending) {
            return false;
        }
        match self {
            Self::AllUnsent => true,
            Self::Ids(ids) => ids.contains(message.id()),
            Self::Conversation(key) => key.matches(message),
        }
    }
}

/// Result of one dispatch step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepOutcome {
    Sent(Message),
    Failed(Message),
    /// The message was already `sent`; nothing was sent again.
    AlreadySent(Message),
    /// The message disappeared or could not be moved into `sending`.
    Unavailable(String),
}

impl StepOutcome {
    fn is_order_violation(&self) -> bool {
        matches!(self, Self::Failed(m) if m.last_error().is_some_and(|e| e.kind == ErrorKind::OrderViolation))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchReport {
    pub total: usize,
    pub processed: usize,
    pub sent: usize,
    pub failed: usize,
    pub skipped: usize,
    pub cancelled: bool,
}

impl DispatchReport {
    fn record(&mut self, outcome: &StepOutcome) {
        self.processed += 1;
        match outcome {
            StepOutcome::Sent(_) => self.sent += 1,
            StepOutcome::Failed(_) => self.failed += 1,
            StepOutcome::AlreadySent(_) | StepOutcome::Unavailable(_) => {}
        }
    }
}

/// Exclusive right to dispatch. Only one run, bulk or single, holds it at a time.
#[derive(Debug)]
pub struct RunPermit(#[allow(dead_code)] OwnedMutexGuard<()>);

/// Last timestamp known to be delivered for one conversation during a run.
#[derive(Debug, Default)]
struct Watermark {
    last_timestamp: Option<i64>,
    checked_at: Option<Instant>,
}

impl Watermark {
    fn observe(&mut self, timestamp: i64) {
        self.last_timestamp = Some(self.last_timestamp.map_or(timestamp, |last| last.max(timestamp)));
    }

    fn is_stale(&self, max_age: Duration) -> bool {
        self.checked_at.is_none_or(|at| at.elapsed() > max_age)
    }
}

/// Sends messages one at a time in per-conversation timestamp order.
#[derive(Clone, Debug)]
pub struct Dispatcher {
    store: MessageStore,
    delivery: Arc<dyn DeliveryClient>,
    clock: Arc<dyn ConversationClock>,
    verification: VerificationService,
    config: DispatchConfig,
    run_lock: Arc<Mutex<()>>,
    metrics: Metrics,
}

impl Dispatcher {
    #[must_use]
    pub fn new(
        store: MessageStore,
        delivery: Arc<dyn DeliveryClient>,
        clock: Arc<dyn ConversationClock>,
        verification: VerificationService,
        config: DispatchConfig,
    ) -> Self {
        Self {
            store,
            delivery,
            clock,
            verification,
            config,
            run_lock: Arc::new(Mutex::new(())),
            metrics: Metrics::new(),
        }
    }

    /// Claims the dispatcher without waiting.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` while another run holds it.
    pub fn try_acquire(&self) -> Result<RunPermit> {
        Arc::clone(&self.run_lock)
            .try_lock_owned()
            .map(RunPermit)
            .map_err(|_| AppError::Conflict("a dispatch is already in progress".to_string()))
    }

    /// Runs a bulk dispatch over the selected messages.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if another dispatch is running.
    pub async fn send_all(
        &self,
        selection: &Selection,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> Result<DispatchReport> {
        let permit = self.try_acquire()?;
        Ok(self.run_batch(&permit, selection, observer, cancel).await)
    }

    /// Sends one message through the same step as a bulk run.
    ///
    /// A message that is already `sent` is returned untouched.
    ///
    /// # Errors
    /// Returns `AppError::NotFound` for an unknown id and `AppError::Conflict` if a
    /// dispatch is running.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub async fn send_one(&self, id: &str) -> Result<StepOutcome> {
        let _permit = self.try_acquire()?;
        let message = self.store.get(id).await.ok_or(AppError::NotFound)?;
        if message.is_sent() {
            tracing::info!("Message already sent, not resending");
            return Ok(StepOutcome::AlreadySent(message));
        }

        let key = ConversationKey::of(&message);
        let mut watermark = self.seed_watermark(&key).await;
        Ok(self.step(id, &key, &mut watermark).await)
    }

    /// Runs a bulk dispatch while holding `permit`.
    ///
    /// Cancellation is honored between messages; an in-flight send always completes.
    #[tracing::instrument(skip_all, fields(total = tracing::field::Empty))]
    pub async fn run_batch(
        &self,
        _permit: &RunPermit,
        selection: &Selection,
        observer: &dyn ProgressObserver,
        cancel: &CancellationToken,
    ) -> DispatchReport {
        let candidates: Vec<Message> =
            self.store.list().await.into_iter().filter(|m| selection.matches(m)).collect();
        let groups = group_by_conversation(candidates);
        let total = groups.iter().map(|group| group.messages().len()).sum();

        tracing::Span::current().record("total", total);
        self.metrics.batch_size.record(total as u64, &[]);
        tracing::info!(total, conversations = groups.len(), "Starting bulk dispatch");

        let mut report = DispatchReport { total, ..DispatchReport::default() };
        let mut position = 0;
        observer.report(Progress { current: 0, total });

        'groups: for group in groups {
            let key = group.key().clone();
            let mut watermark = self.seed_watermark(&key).await;
            let messages = group.into_messages();
            let mut remaining = messages.iter();

            while let Some(message) = remaining.next() {
                if cancel.is_cancelled() || (position > 0 && !self.pause(cancel).await) {
                    report.cancelled = true;
                    break 'groups;
                }

                position += 1;
                observer.report(Progress { current: position, total });

                let outcome = self.step(message.id(), &key, &mut watermark).await;
                report.record(&outcome);

                if outcome.is_order_violation() {
                    for sibling in remaining.by_ref() {
                        self.skip(sibling.id()).await;
                        report.skipped += 1;
                        position += 1;
                    }
                    observer.report(Progress { current: position, total });
                }
            }
        }

        if report.cancelled {
            tracing::info!(processed = position, total, "Bulk dispatch cancelled");
        } else {
            tracing::info!(
                sent = report.sent,
                failed = report.failed,
                skipped = report.skipped,
                "Bulk dispatch finished"
            );
        }
        report
    }

    /// Sleeps the inter-message delay; returns `false` if cancelled meanwhile.
    async fn pause(&self, cancel: &CancellationToken) -> bool {
        let delay = Duration::from_millis(self.config.inter_message_delay_ms);
        if delay.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            () = tokio::time::sleep(delay) => true,
            () = cancel.cancelled() => false,
        }
    }

    async fn seed_watermark(&self, key: &ConversationKey) -> Watermark {
        Watermark { last_timestamp: self.store.last_sent_timestamp(key).await, checked_at: None }
    }

    #[tracing::instrument(skip(self, watermark), fields(conversation = %key))]
    async fn step(&self, id: &str, key: &ConversationKey, watermark: &mut Watermark) -> StepOutcome {
        let message = match self.store.begin_sending(id, key).await {
            Ok(message) => message,
            Err(AppError::Conflict(reason)) => {
                tracing::debug!(%reason, "Message not claimed for sending");
                return match self.store.get(id).await {
                    Some(message) if message.is_sent() => StepOutcome::AlreadySent(message),
                    _ => StepOutcome::Unavailable(reason),
                };
            }
            Err(e) => {
                tracing::warn!(error = %e, "Message could not be moved into sending");
                return StepOutcome::Unavailable(e.to_string());
            }
        };

        if let Err(error) = self.check_ordering(&message, key, watermark).await {
            return self.fail(id, error).await;
        }

        let started = Instant::now();
        let result = AssertUnwindSafe(self.delivery.send(&message))
            .catch_unwind()
            .await
            .unwrap_or_else(|_| Err(DeliveryError::exception("delivery client panicked")));
        self.metrics.send_duration.record(started.elapsed().as_secs_f64(), &[]);

        let receipt = match result {
            Ok(receipt) => receipt,
            Err(error) => return self.fail(id, error).await,
        };

        watermark.observe(message.unix_timestamp());
        let verification = self.config.verify_after_send.then_some(VerificationStatus::Pending);
        let sent = match self.store.mark_sent(id, receipt.receipt_id, verification).await {
            Ok(sent) => sent,
            Err(e) => {
                tracing::error!(error = %e, "Relay accepted a message that can no longer be recorded");
                return StepOutcome::Unavailable(e.to_string());
            }
        };
        self.metrics.messages.add(1, &[KeyValue::new("outcome", "sent")]);
        tracing::info!(receipt_id = ?receipt.receipt_id, "Message sent");

        if !self.config.verify_after_send {
            return StepOutcome::Sent(sent);
        }

        let status = match receipt.receipt_id {
            Some(receipt_id) => self.verification.check(receipt_id).await,
            None => {
                tracing::warn!("Relay returned no receipt id, message cannot be verified");
                VerificationStatus::Unverified
            }
        };
        match self.store.set_verification(id, status).await {
            Ok(verified) => StepOutcome::Sent(verified),
            Err(e) => {
                tracing::warn!(error = %e, "Could not record verification result");
                StepOutcome::Sent(sent)
            }
        }
    }

    /// Rejects a send whose timestamp does not come after the conversation's last one.
    async fn check_ordering(
        &self,
        message: &Message,
        key: &ConversationKey,
        watermark: &mut Watermark,
    ) -> std::result::Result<(), DeliveryError> {
        let max_age = Duration::from_secs(self.config.clock_max_age_secs);
        if self.config.ordering_precheck && watermark.is_stale(max_age) {
            match self.clock.last_timestamp(&key.sender, &key.receiver).await {
                ClockReading::Known(timestamp) => {
                    watermark.observe(timestamp);
                    watermark.checked_at = Some(Instant::now());
                }
                ClockReading::Empty => watermark.checked_at = Some(Instant::now()),
                ClockReading::Unavailable(reason) => match self.config.clock_failure_policy {
                    ClockFailurePolicy::Open => {
                        tracing::warn!(%reason, "Conversation clock unavailable, sending without remote ordering check");
                    }
                    ClockFailurePolicy::Closed => {
                        return Err(DeliveryError::transport(format!("conversation clock unavailable: {reason}")));
                    }
                },
            }
        }

        if let Some(last) = watermark.last_timestamp
            && message.unix_timestamp() <= last
        {
            return Err(DeliveryError::order_violation(format!(
                "timestamp {} is not after the conversation's last recorded timestamp {last}",
                message.unix_timestamp()
            )));
        }
        Ok(())
    }

    async fn fail(&self, id: &str, error: DeliveryError) -> StepOutcome {
        tracing::warn!(kind = %error.kind, detail = %error.detail, "Message delivery failed");
        self.metrics
            .messages
            .add(1, &[KeyValue::new("outcome", "failed"), KeyValue::new("kind", error.kind.as_str())]);

        match self.store.mark_failed(id, error).await {
            Ok(message) => StepOutcome::Failed(message),
            Err(e) => {
                tracing::error!(error = %e, "Could not record delivery failure");
                StepOutcome::Unavailable(e.to_string())
            }
        }
    }

    async fn skip(&self, id: &str) {
        self.metrics.messages.add(1, &[KeyValue::new("outcome", "skipped")]);
        if let Err(e) = self.store.mark_failed(id, DeliveryError::skipped()).await {
            tracing::warn!(message_id = %id, error = %e, "Could not mark conversation sibling as skipped");
        }
    }
}
