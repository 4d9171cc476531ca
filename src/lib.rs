#![forbid(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::todo)]
#![warn(clippy::panic)]
#![warn(clippy::dbg_macro)]
#![warn(clippy::print_stdout)]
#![warn(clippy::print_stderr)]
#![warn(clippy::clone_on_ref_ptr)]
#![warn(unreachable_pub)]
#![warn(missing_debug_implementations)]
#![warn(unused_qualifications)]
#![deny(unused_must_use)]

use crate::adapters::relay::{
    HttpConversationClock, HttpDeliveryClient, HttpDirectory, HttpUpdateFeed, RelayEndpoints,
};
use crate::api::AppState;
use crate::config::Config;
use crate::services::conversation_clock::ConversationClock;
use crate::services::delivery::DeliveryClient;
use crate::services::dispatch_service::DispatchService;
use crate::services::dispatcher::Dispatcher;
use crate::services::identity_service::{IdentityService, IdentityValidator};
use crate::services::verification_service::{VerificationReconciler, VerificationService};
use crate::storage::{JsonFilePersistence, MessageStore, Persistence};
use std::sync::Arc;
use tokio::sync::watch;

pub mod adapters;
pub mod api;
pub mod config;
pub mod domain;
pub mod error;
pub mod services;
pub mod storage;
pub mod telemetry;

/// Wires the store, relay adapters and services into the API state.
///
/// Relay seams default to the HTTP adapters built from `config.relay`.
#[derive(Debug)]
pub struct AppBuilder {
    config: Config,
    persistence: Option<Arc<dyn Persistence>>,
    delivery: Option<Arc<dyn DeliveryClient>>,
    clock: Option<Arc<dyn ConversationClock>>,
    directory: Option<Arc<dyn IdentityValidator>>,
    reconciler: Option<Arc<dyn VerificationReconciler>>,
    shutdown_rx: Option<watch::Receiver<bool>>,
}

impl AppBuilder {
    #[must_use]
    pub const fn new(config: Config) -> Self {
        Self {
            config,
            persistence: None,
            delivery: None,
            clock: None,
            directory: None,
            reconciler: None,
            shutdown_rx: None,
        }
    }

    #[must_use]
    pub fn with_persistence(mut self, persistence: Arc<dyn Persistence>) -> Self {
        self.persistence = Some(persistence);
        self
    }

    #[must_use]
    pub fn with_delivery(mut self, delivery: Arc<dyn DeliveryClient>) -> Self {
        self.delivery = Some(delivery);
        self
    }

    #[must_use]
    pub fn with_clock(mut self, clock: Arc<dyn ConversationClock>) -> Self {
        self.clock = Some(clock);
        self
    }

    #[must_use]
    pub fn with_directory(mut self, directory: Arc<dyn IdentityValidator>) -> Self {
        self.directory = Some(directory);
        self
    }

    #[must_use]
    pub fn with_reconciler(mut self, reconciler: Arc<dyn VerificationReconciler>) -> Self {
        self.reconciler = Some(reconciler);
        self
    }

    #[must_use]
    pub fn with_shutdown_rx(mut self, shutdown_rx: watch::Receiver<bool>) -> Self {
        self.shutdown_rx = Some(shutdown_rx);
        self
    }

    /// Loads the message list and builds every service.
    ///
    /// # Errors
    /// Returns an error if the store file is unreadable or the relay HTTP client cannot be built.
    pub async fn build(self) -> anyhow::Result<AppState> {
        let persistence = self
            .persistence
            .unwrap_or_else(|| Arc::new(JsonFilePersistence::new(self.config.store.path.clone())));
        let store = MessageStore::open(persistence, self.config.store.utc_offset).await?;

        let endpoints = RelayEndpoints::new(&self.config.relay)?;
        let delivery = self
            .delivery
            .unwrap_or_else(|| Arc::new(HttpDeliveryClient::new(endpoints.clone(), &self.config.relay)));
        let clock = self.clock.unwrap_or_else(|| Arc::new(HttpConversationClock::new(endpoints.clone())));
        let directory = self.directory.unwrap_or_else(|| Arc::new(HttpDirectory::new(endpoints.clone())));
        let reconciler = self.reconciler.unwrap_or_else(|| Arc::new(HttpUpdateFeed::new(endpoints)));

        let verification = VerificationService::new(store.clone(), reconciler);
        let dispatcher = Dispatcher::new(
            store.clone(),
            delivery,
            Arc::clone(&clock),
            verification.clone(),
            self.config.dispatch.clone(),
        );
        let shutdown_rx = self.shutdown_rx.unwrap_or_else(|| watch::channel(false).1);

        Ok(AppState {
            store,
            dispatch: DispatchService::new(dispatcher, shutdown_rx),
            verification,
            identities: IdentityService::new(directory),
            clock,
        })
    }
}

/// Flips `shutdown_tx` to `true` on SIGINT or SIGTERM.
pub fn spawn_signal_handler(shutdown_tx: watch::Sender<bool>) {
    tokio::spawn(async move {
        let ctrl_c = async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for Ctrl+C");
                std::future::pending::<()>().await;
            }
        };

        #[cfg(unix)]
        let terminate = async {
            match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
                Ok(mut signal) => {
                    signal.recv().await;
                }
                Err(e) => {
                    tracing::error!(error = %e, "Failed to listen for SIGTERM");
                    std::future::pending::<()>().await;
                }
            }
        };

        #[cfg(not(unix))]
        let terminate = std::future::pending::<()>();

        tokio::select! {
            () = ctrl_c => {},
            () = terminate => {},
        }

        tracing::info!("Shutdown signal received, starting graceful shutdown...");
        let _ = shutdown_tx.send(true);
    });
}
