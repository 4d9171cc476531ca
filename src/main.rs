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

use relay_dispatch::config::Config;
use relay_dispatch::{AppBuilder, telemetry};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::sync::watch;
use tracing::Instrument;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::load();
    let telemetry_guard = telemetry::init_telemetry(&config.telemetry)?;

    let boot_span = tracing::info_span!("boot_server");
    let (listener, state, shutdown_tx, shutdown_rx) = async {
        // Phase 1: Shutdown signalling
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        relay_dispatch::spawn_signal_handler(shutdown_tx.clone());

        // Phase 2: Component wiring
        let state = AppBuilder::new(config.clone()).with_shutdown_rx(shutdown_rx.clone()).build().await?;
        tracing::info!(
            path = %config.store.path.display(),
            messages = state.store.list().await.len(),
            variant = ?config.relay.variant,
            "Message store loaded"
        );

        // Phase 3: Listener
        let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
        let listener = tokio::net::TcpListener::bind(addr).await?;
        tracing::info!(address = %addr, "listening");

        Ok::<_, anyhow::Error>((listener, state, shutdown_tx, shutdown_rx))
    }
    .instrument(boot_span)
    .await?;

    // Phase 4: Serve until a shutdown signal
    let dispatch = state.dispatch.clone();
    let router = relay_dispatch::api::app_router(state);
    let mut server_rx = shutdown_rx.clone();
    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(async move {
            let _ = server_rx.wait_for(|&s| s).await;
        })
        .await
    {
        tracing::error!(error = %e, "Server error");
    }

    // Phase 5: Stop the dispatch run between messages
    let _ = shutdown_tx.send(true);
    dispatch.cancel();
    if dispatch.wait_idle(Duration::from_secs(config.server.shutdown_timeout_secs)).await {
        tracing::info!("Dispatch run finished.");
    } else {
        tracing::warn!("Timeout waiting for the dispatch run to finish.");
    }

    telemetry_guard.shutdown();
    Ok(())
}
