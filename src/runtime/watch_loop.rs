//! # Watch Loop
//!
//! Controller watch loop that monitors `Declaration` resources and triggers
//! reconciliation when changes are detected.
//!
//! `kube_runtime::Controller` guarantees at most one in-flight reconciliation
//! per object and coalesces triggers that arrive while one is running.

use crate::config::ControllerConfig;
use crate::controller::reconciler::{Outcome, Reconcilable, Reconciler, ReconcilerError};
use crate::controller::server::ServerState;
use crate::crd::Declaration;
use crate::runtime::error_policy::{
    handle_reconciliation_error, handle_watch_stream_error, stream_failure,
};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::{controller, controller::Action, watcher, Controller};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop
///
/// Handles graceful shutdown and automatic restart on watch stream errors.
///
/// # Errors
/// Currently never fails; the signature leaves room for fatal setup errors
pub async fn run_watch_loop(
    declarations: Api<Declaration>,
    reconciler: Arc<Reconciler<Declaration>>,
    server_state: Arc<ServerState>,
    config: &ControllerConfig,
) -> Result<(), anyhow::Error> {
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.watch_backoff_start_ms));

    // Mark the server not ready as soon as SIGTERM/SIGINT arrives
    let shutdown_server_state = server_state.clone();
    tokio::spawn(async move {
        let signal = shutdown_signal().await;
        info!("Received shutdown signal ({signal}), initiating graceful shutdown...");
        shutdown_server_state.is_ready.store(false, Ordering::Relaxed);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let backoff = backoff_duration_ms.clone();
        let backoff_start_ms = config.watch_backoff_start_ms;
        let backoff_max_ms = config.watch_backoff_max_ms;
        let restart_delay = config.watch_restart_delay_duration();
        let watch_span = tracing::span!(
            tracing::Level::INFO,
            "controller.watch",
            operation = "watch_loop"
        );

        info!(parent: &watch_span, "Starting controller watch loop...");
        Controller::new(declarations.clone(), watcher::Config::default().any_semantic())
            .with_config(
                controller::Config::default().concurrency(config.max_concurrent_reconciliations),
            )
            .shutdown_on_signal()
            .run(reconcile_declaration, handle_reconciliation_error, reconciler.clone())
            .filter_map(move |x| {
                let backoff = backoff.clone();
                async move {
                    match &x {
                        Ok((object, action)) => {
                            backoff.store(backoff_start_ms, Ordering::Relaxed);
                            debug!(resource.name = object.name.as_str(), action = ?action, "watch.event.reconciled");
                            Some(x)
                        }
                        Err(e) => {
                            let error_string = stream_failure(e)?;
                            handle_watch_stream_error(
                                &error_string,
                                &backoff,
                                backoff_max_ms,
                                restart_delay,
                            )
                            .await
                            .map(|()| x)
                        }
                    }
                }
            })
            .for_each(|_| futures::future::ready(()))
            .instrument(watch_span)
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

/// Wait for SIGTERM or SIGINT and name the one that arrived
#[cfg(unix)]
async fn shutdown_signal() -> &'static str {
    use tokio::signal::unix::{signal, SignalKind};
    match signal(SignalKind::terminate()) {
        Ok(mut terminate) => tokio::select! {
            _ = terminate.recv() => "SIGTERM",
            _ = tokio::signal::ctrl_c() => "SIGINT",
        },
        Err(e) => {
            warn!("Failed to install SIGTERM handler, listening for SIGINT only: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            "SIGINT"
        }
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> &'static str {
    let _ = tokio::signal::ctrl_c().await;
    "Ctrl-C"
}

/// Reconcile one watched object
///
/// The object only identifies what to reconcile; the reconciler reads the
/// current record itself.
async fn reconcile_declaration(
    obj: Arc<Declaration>,
    ctx: Arc<Reconciler<Declaration>>,
) -> Result<Action, ReconcilerError> {
    let key = obj.key();
    debug!(
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        generation = obj.metadata.generation.unwrap_or(0),
        "watch.event.received"
    );
    ctx.reconcile(&key).await.map(Outcome::into_action)
}
