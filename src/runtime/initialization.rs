//! # Initialization
//!
//! Controller initialization logic including rustls setup, tracing, metrics,
//! server startup, target provider selection and Kubernetes client setup.

use crate::config::{ControllerConfig, TargetBackend};
use crate::constants::{
    DEFAULT_SERVER_POLL_INTERVAL_MS, DEFAULT_SERVER_STARTUP_TIMEOUT_SECS, FIELD_MANAGER,
};
use crate::controller::reconciler::{Reconcilable, Reconciler, ResourceKey};
use crate::controller::server::{start_server, ServerState};
use crate::crd::Declaration;
use crate::observability;
use crate::provider::{HttpTargetProvider, InMemoryTarget, TargetProvider};
use crate::store::KubeStore;
use anyhow::{Context, Result};
use kube::{api::Api, api::ListParams, Client};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};

/// Initialization result containing all necessary components for the controller
pub struct InitializationResult {
    /// Kubernetes client
    pub client: Client,
    /// API for the watched `Declaration` resources
    pub declarations: Api<Declaration>,
    /// Reconciler context
    pub reconciler: Arc<Reconciler<Declaration>>,
    /// Server state for health checks
    pub server_state: Arc<ServerState>,
    pub config: ControllerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field(
                "server_ready",
                &self.server_state.is_ready.load(Ordering::Relaxed),
            )
            .field("reconciler", &self.reconciler)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller runtime
///
/// This function handles:
/// - rustls crypto provider setup
/// - Tracing subscriber setup
/// - Metrics registration
/// - HTTP server startup
/// - Kubernetes client creation
/// - Target provider and reconciler setup
/// - Startup summary of existing resources
///
/// # Errors
/// Returns an error if any step fails
pub async fn initialize() -> Result<InitializationResult> {
    // Must run before anything opens a TLS connection
    if rustls::crypto::ring::default_provider()
        .install_default()
        .is_err()
    {
        anyhow::bail!("Failed to install rustls crypto provider");
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "declaration_controller=info".into()),
        )
        .init();

    info!("Starting Declaration Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    let config = ControllerConfig::from_env().context("Invalid controller configuration")?;
    info!(
        finalizer = config.finalizer_name.as_str(),
        namespace = config.watch_namespace.as_deref().unwrap_or("<all>"),
        backoff_base_secs = config.backoff_base_secs,
        backoff_cap_secs = config.backoff_cap_secs,
        deadline_secs = config.reconcile_deadline_secs,
        "Loaded controller configuration"
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState {
        is_ready: Arc::new(AtomicBool::new(false)),
        validator: crate::controller::reconciler::Validator::new(config.validation_limits()),
    });

    // Start the HTTP server and wait for it to bind so probes pass before reconciling
    let server_state_clone = server_state.clone();
    let server_port = config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let declarations: Api<Declaration> = match &config.watch_namespace {
        Some(namespace) => Api::namespaced(client.clone(), namespace),
        None => Api::all(client.clone()),
    };

    let provider = build_provider(&config.target)?;
    info!("Using target provider: {}", provider.name());

    let store = Arc::new(KubeStore::new(client.clone(), FIELD_MANAGER));
    let reconciler = Arc::new(Reconciler::new(store, provider, &config));

    // The watch loop's initial list triggers every one of these
    log_existing_resources(&declarations).await;

    info!("Controller initialized, starting watch loop...");

    Ok(InitializationResult {
        client,
        declarations,
        reconciler,
        server_state,
        config,
    })
}

/// Build the target provider selected by configuration
///
/// # Errors
/// Returns an error if the HTTP endpoint is not a usable base URL
pub fn build_provider(target: &TargetBackend) -> Result<Arc<dyn TargetProvider>> {
    match target {
        TargetBackend::Http {
            endpoint,
            token,
            request_timeout_secs,
        } => {
            let provider = HttpTargetProvider::new(
                endpoint,
                token.clone(),
                Duration::from_secs(*request_timeout_secs),
            )
            .context("Failed to create HTTP target provider")?;
            Ok(Arc::new(provider))
        }
        TargetBackend::Memory => {
            warn!("Using the in-memory target: entries do not outlive the controller process");
            Ok(Arc::new(InMemoryTarget::new()))
        }
    }
}

/// Wait for the HTTP server to become ready
async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
) -> Result<()> {
    let startup_timeout = Duration::from_secs(DEFAULT_SERVER_STARTUP_TIMEOUT_SECS);
    let poll_interval = Duration::from_millis(DEFAULT_SERVER_POLL_INTERVAL_MS);
    let start_time = Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            break;
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }

    Ok(())
}

/// Log a summary of the `Declaration` resources present at startup
///
/// Also checks that the CRD is queryable. Nothing is reconciled here: the
/// controller's initial list queues every resource under its concurrency
/// limit.
async fn log_existing_resources(declarations: &Api<Declaration>) {
    let list = match declarations.list(&ListParams::default()).await {
        Ok(list) => list,
        Err(e) => {
            error!("CRD is not queryable; {:?}. Is the CRD installed?", e);
            error!("Installation: cargo run --bin crdgen | kubectl apply -f -");
            warn!("Continuing despite CRD queryability check failure - controller will retry");
            return;
        }
    };

    if list.items.is_empty() {
        info!("No existing Declaration resources found, watch will pick up new resources");
        return;
    }

    let summary = summarize_by_namespace(list.items.iter().map(Reconcilable::key));
    info!("Declaration Controller - Startup Resource Summary");
    info!("Total Resources: {}", list.items.len());
    info!("Namespaces: {}", summary.len());
    for (namespace, shown) in &summary {
        info!("  {}: {}", namespace, shown);
    }
}

/// One line per namespace listing at most three resource names
fn summarize_by_namespace(
    keys: impl IntoIterator<Item = ResourceKey>,
) -> BTreeMap<String, String> {
    let mut by_namespace: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for key in keys {
        by_namespace.entry(key.namespace).or_default().push(key.name);
    }

    by_namespace
        .into_iter()
        .map(|(namespace, mut names)| {
            names.sort();
            let shown = if names.len() <= 3 {
                names.join(", ")
            } else {
                format!("{}, ... ({} total)", names[..3].join(", "), names.len())
            };
            (namespace, shown)
        })
        .collect()
}
