use crate::error::Result;
use crate::services::dispatcher::{DispatchReport, Dispatcher, Selection, StepOutcome};
use crate::services::progress::{Progress, ProgressObserver};
use serde::Serialize;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Snapshot of the background dispatch run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchStatus {
    pub running: bool,
    pub current: usize,
    pub total: usize,
    pub last_report: Option<DispatchReport>,
}

struct StatusObserver<'a>(&'a watch::Sender<DispatchStatus>);

impl ProgressObserver for StatusObserver<'_> {
    fn report(&self, progress: Progress) {
        self.0.send_modify(|status| {
            status.current = progress.current;
            status.total = progress.total;
        });
    }
}

/// Runs bulk dispatches in the background and exposes their progress.
#[derive(Clone, Debug)]
pub struct DispatchService {
    dispatcher: Dispatcher,
    status: Arc<watch::Sender<DispatchStatus>>,
    cancel: Arc<Mutex<Option<CancellationToken>>>,
    shutdown_rx: watch::Receiver<bool>,
}

impl DispatchService {
    #[must_use]
    pub fn new(dispatcher: Dispatcher, shutdown_rx: watch::Receiver<bool>) -> Self {
        let (status, _) = watch::channel(DispatchStatus::default());
        Self { dispatcher, status: Arc::new(status), cancel: Arc::new(Mutex::new(None)), shutdown_rx }
    }

    #[must_use]
    pub fn status(&self) -> DispatchStatus {
        *self.status.borrow()
    }

    /// Starts a bulk run in the background and returns immediately.
    ///
    /// # Errors
    /// Returns `AppError::Conflict` if a dispatch is already running.
    #[tracing::instrument(err(level = "warn"), skip(self))]
    pub fn start(&self, selection: Selection) -> Result<DispatchStatus> {
        let permit = self.dispatcher.try_acquire()?;
        let token = CancellationToken::new();
        self.set_cancel(Some(token.clone()));
        self.status.send_modify(|status| {
            status.running = true;
            status.current = 0;
            status.total = 0;
        });

        let mut shutdown = self.shutdown_rx.clone();
        let watcher = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = shutdown.wait_for(|&s| s) => watcher.cancel(),
                () = watcher.cancelled() => {}
            }
        });

        let service = self.clone();
        tokio::spawn(
            async move {
                let report =
                    service.dispatcher.run_batch(&permit, &selection, &StatusObserver(&service.status), &token).await;
                service.set_cancel(None);
                service.status.send_modify(|status| {
                    status.running = false;
                    status.last_report = Some(report);
                });
                drop(permit);
                // Releases the shutdown watcher
                token.cancel();
            }
            .instrument(tracing::info_span!("dispatch_run")),
        );

        Ok(self.status())
    }

    /// Asks the running batch to stop after its in-flight message. Returns `false` when idle.
    pub fn cancel(&self) -> bool {
        let Some(token) = self.cancel.lock().ok().and_then(|guard| guard.clone()) else {
            return false;
        };
        tracing::info!("Cancelling dispatch run");
        token.cancel();
        true
    }

    /// Sends a single message outside of any batch.
    ///
    /// # Errors
    /// See [`Dispatcher::send_one`].
    pub async fn send_one(&self, id: &str) -> Result<StepOutcome> {
        self.dispatcher.send_one(id).await
    }

    /// Waits until no batch is running, up to `timeout`. Returns whether the run finished.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let mut rx = self.status.subscribe();
        tokio::time::timeout(timeout, rx.wait_for(|status| !status.running)).await.is_ok()
    }

    fn set_cancel(&self, token: Option<CancellationToken>) {
        if let Ok(mut guard) = self.cancel.lock() {
            *guard = token;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DispatchConfig;
    use crate::domain::message::{DeliveryError, DeliveryStatus, Message, MessageDraft};
    use crate::error::AppError;
    use crate::services::conversation_clock::{ClockReading, ConversationClock};
    use crate::services::delivery::{DeliveryClient, DeliveryReceipt};
    use crate::services::verification_service::{VerificationReconciler, VerificationService};
    use crate::storage::MessageStore;
    use async_trait::async_trait;
    use time::UtcOffset;

    #[derive(Debug)]
    struct AcceptAll;

    #[async_trait]
    impl DeliveryClient for AcceptAll {
        async fn send(&self, _message: &Message) -> std::result::Result<DeliveryReceipt, DeliveryError> {
            Ok(DeliveryReceipt { receipt_id: Some(1) })
        }
    }

    #[derive(Debug)]
    struct NoHistory;

    #[async_trait]
    impl ConversationClock for NoHistory {
        async fn last_timestamp(&self, _sender: &str, _receiver: &str) -> ClockReading {
            ClockReading::Empty
        }
    }

    #[derive(Debug)]
    struct EmptyFeed;

    #[async_trait]
    impl VerificationReconciler for EmptyFeed {
        async fn verify(&self, _receipt_id: i64) -> bool {
            false
        }
    }

    async fn service(delay_ms: u64, count: u8) -> (MessageStore, DispatchService, watch::Sender<bool>) {
        let store = MessageStore::in_memory(UtcOffset::UTC);
        for minute in 0..count {
            let draft = MessageDraft {
                sender: "alice".to_string(),
                receiver: "bob".to_string(),
                scheduled_time: format!("2024-01-01T09:{minute:02}"),
                content: format!("message {minute}"),
            };
            store.add(draft).await.expect("add");
        }
        let verification = VerificationService::new(store.clone(), Arc::new(EmptyFeed));
        let config = DispatchConfig { inter_message_delay_ms: delay_ms, ..DispatchConfig::default() };
        let dispatcher =
            Dispatcher::new(store.clone(), Arc::new(AcceptAll), Arc::new(NoHistory), verification, config);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        (store, DispatchService::new(dispatcher, shutdown_rx), shutdown_tx)
    }

    #[tokio::test]
    async fn test_background_run_reports_completion() {
        let (store, service, _shutdown) = service(0, 3).await;

        assert!(service.start(Selection::AllUnsent).expect("start").running);
        assert!(service.wait_idle(Duration::from_secs(5)).await);

        let status = service.status();
        assert!(!status.running);
        assert_eq!((status.current, status.total), (3, 3));
        assert_eq!(status.last_report.map(|r| r.sent), Some(3));
        assert!(store.list().await.iter().all(Message::is_sent));
    }

    #[tokio::test]
    async fn test_second_start_conflicts_and_cancel_stops_run() {
        let (store, service, _shutdown) = service(60_000, 3).await;

        service.start(Selection::AllUnsent).expect("start");
        assert!(matches!(service.start(Selection::AllUnsent), Err(AppError::Conflict(_))));

        // First message goes out immediately, the rest wait on the delay
        assert!(service.cancel());
        assert!(service.wait_idle(Duration::from_secs(5)).await);

        let report = service.status().last_report.expect("report");
        assert!(report.cancelled);
        assert!(report.processed <= 1);
        let pending = store.list().await.iter().filter(|m| m.status() == DeliveryStatus::Pending).count();
        assert!(pending >= 2);
        assert!(!service.cancel());
    }

    #[tokio::test]
    async fn test_shutdown_cancels_run() {
        let (_store, service, shutdown) = service(60_000, 2).await;

        service.start(Selection::AllUnsent).expect("start");
        shutdown.send_replace(true);

        assert!(service.wait_idle(Duration::from_secs(5)).await);
        assert!(service.status().last_report.is_some_and(|r| r.cancelled));
    }
}
