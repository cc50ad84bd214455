//! # Controller Configuration
//!
//! Controller-level settings loaded from environment variables.

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::validation::{parse_kubernetes_duration, ValidationLimits};
use std::time::Duration;

/// Which target environment the controller drives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetBackend {
    /// REST key/value API reached over HTTP
    Http {
        endpoint: String,
        token: Option<String>,
        request_timeout_secs: u64,
    },
    /// In-process store, useful for local runs and demos
    ///
    /// Only selected by an explicit `TARGET_BACKEND=memory`.
    Memory,
}

/// Controller-level configuration
///
/// All settings have sensible defaults and can be overridden via environment variables.
/// Environment variables are populated from a ConfigMap using `envFrom` in the deployment.
#[derive(Debug, Clone)]
pub struct ControllerConfig {
    /// Base retry interval after the first failure (seconds)
    pub backoff_base_secs: u64,
    /// Maximum retry interval (seconds)
    pub backoff_cap_secs: u64,
    /// Deadline for all target calls within one reconciliation (seconds)
    pub reconcile_deadline_secs: u64,
    /// Controller-wide periodic re-verification interval, used when a
    /// declaration does not set its own. `None` disables periodic requeue.
    pub drift_check_interval: Option<Duration>,
    /// Obligation token registered on every managed resource
    pub finalizer_name: String,
    /// Restrict the watch to one namespace; `None` watches all namespaces
    pub watch_namespace: Option<String>,
    /// Port for the metrics/probe/admission HTTP server
    pub metrics_port: u16,
    /// Maximum concurrent reconciliations across distinct resources
    pub max_concurrent_reconciliations: u16,
    /// Maximum entries in one declaration
    pub max_entries_per_resource: usize,
    /// Maximum entry value size in bytes
    pub max_value_size_bytes: usize,
    /// Watch stream restart delay after unknown errors (seconds)
    pub watch_restart_delay_secs: u64,
    /// Watch stream restart delay after stream ends (seconds)
    pub watch_restart_delay_after_end_secs: u64,
    /// Watch stream backoff start value (milliseconds)
    pub watch_backoff_start_ms: u64,
    /// Watch stream backoff maximum value (milliseconds)
    pub watch_backoff_max_ms: u64,
    /// Target environment selection
    pub target: TargetBackend,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        use crate::constants::*;
        Self {
            backoff_base_secs: DEFAULT_BACKOFF_BASE_SECS,
            backoff_cap_secs: DEFAULT_BACKOFF_CAP_SECS,
            reconcile_deadline_secs: DEFAULT_RECONCILE_DEADLINE_SECS,
            drift_check_interval: None,
            finalizer_name: DEFAULT_FINALIZER_NAME.to_string(),
            watch_namespace: None,
            metrics_port: DEFAULT_METRICS_PORT,
            max_concurrent_reconciliations: 10,
            max_entries_per_resource: DEFAULT_MAX_ENTRIES_PER_RESOURCE,
            max_value_size_bytes: DEFAULT_MAX_VALUE_SIZE_BYTES,
            watch_restart_delay_secs: DEFAULT_WATCH_RESTART_DELAY_SECS,
            watch_restart_delay_after_end_secs: DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            watch_backoff_start_ms: DEFAULT_WATCH_BACKOFF_START_MS,
            watch_backoff_max_ms: DEFAULT_WATCH_BACKOFF_MAX_MS,
            // In-process runs and tests; `from_env` defaults to HTTP
            target: TargetBackend::Memory,
        }
    }
}

impl ControllerConfig {
    /// Load configuration from environment variables with defaults
    ///
    /// # Errors
    /// Returns an error if the target backend is unknown or the HTTP
    /// backend has no `TARGET_ENDPOINT`
    pub fn from_env() -> anyhow::Result<Self> {
        use crate::constants::*;
        Ok(Self {
            backoff_base_secs: env_var_or_default("BACKOFF_BASE_SECS", DEFAULT_BACKOFF_BASE_SECS)
                .max(1),
            backoff_cap_secs: env_var_or_default("BACKOFF_CAP_SECS", DEFAULT_BACKOFF_CAP_SECS),
            reconcile_deadline_secs: env_var_or_default(
                "RECONCILE_DEADLINE_SECS",
                DEFAULT_RECONCILE_DEADLINE_SECS,
            ),
            drift_check_interval: std::env::var("DRIFT_CHECK_INTERVAL")
                .ok()
                .and_then(|v| parse_kubernetes_duration(&v).ok()),
            finalizer_name: env_var_or_default_str("FINALIZER_NAME", DEFAULT_FINALIZER_NAME),
            watch_namespace: std::env::var("WATCH_NAMESPACE")
                .ok()
                .filter(|ns| !ns.trim().is_empty()),
            metrics_port: env_var_or_default("METRICS_PORT", DEFAULT_METRICS_PORT),
            max_concurrent_reconciliations: env_var_or_default(
                "MAX_CONCURRENT_RECONCILIATIONS",
                10,
            ),
            max_entries_per_resource: env_var_or_default(
                "MAX_ENTRIES_PER_RESOURCE",
                DEFAULT_MAX_ENTRIES_PER_RESOURCE,
            ),
            max_value_size_bytes: env_var_or_default(
                "MAX_VALUE_SIZE_BYTES",
                DEFAULT_MAX_VALUE_SIZE_BYTES,
            ),
            watch_restart_delay_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_SECS",
                DEFAULT_WATCH_RESTART_DELAY_SECS,
            ),
            watch_restart_delay_after_end_secs: env_var_or_default(
                "WATCH_RESTART_DELAY_AFTER_END_SECS",
                DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS,
            ),
            watch_backoff_start_ms: env_var_or_default(
                "WATCH_BACKOFF_START_MS",
                DEFAULT_WATCH_BACKOFF_START_MS,
            ),
            watch_backoff_max_ms: env_var_or_default(
                "WATCH_BACKOFF_MAX_MS",
                DEFAULT_WATCH_BACKOFF_MAX_MS,
            ),
            target: target_backend(|key| std::env::var(key).ok())?,
        })
    }

    /// Backoff policy for failed reconciliations
    #[must_use]
    pub fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoff::new(
            Duration::from_secs(self.backoff_base_secs),
            Duration::from_secs(self.backoff_cap_secs.max(self.backoff_base_secs)),
        )
    }

    /// Get reconcile deadline duration
    pub fn reconcile_deadline(&self) -> Duration {
        Duration::from_secs(self.reconcile_deadline_secs)
    }

    /// Limits handed to the validator
    pub fn validation_limits(&self) -> ValidationLimits {
        ValidationLimits {
            max_entries: self.max_entries_per_resource,
            max_value_bytes: self.max_value_size_bytes,
            min_drift_check_interval: Duration::from_secs(
                crate::constants::MIN_DRIFT_CHECK_INTERVAL_SECS,
            ),
        }
    }

    /// Get watch restart delay duration
    pub fn watch_restart_delay_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_secs)
    }

    /// Get watch restart delay after end duration
    pub fn watch_restart_delay_after_end_duration(&self) -> Duration {
        Duration::from_secs(self.watch_restart_delay_after_end_secs)
    }
}

/// Select the target backend from `TARGET_*` settings
///
/// HTTP is the default; the in-memory target loses every entry on restart
/// and has to be asked for by name.
fn target_backend(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<TargetBackend> {
    let backend = lookup("TARGET_BACKEND")
        .map(|b| b.trim().to_lowercase())
        .filter(|b| !b.is_empty())
        .unwrap_or_else(|| "http".to_string());

    match backend.as_str() {
        "http" => {
            let Some(endpoint) = lookup("TARGET_ENDPOINT").filter(|e| !e.trim().is_empty())
            else {
                anyhow::bail!("TARGET_ENDPOINT must be set for the http target backend");
            };
            Ok(TargetBackend::Http {
                endpoint,
                token: lookup("TARGET_TOKEN").filter(|t| !t.is_empty()),
                request_timeout_secs: lookup("TARGET_REQUEST_TIMEOUT_SECS")
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(crate::constants::DEFAULT_TARGET_REQUEST_TIMEOUT_SECS),
            })
        }
        "memory" => Ok(TargetBackend::Memory),
        other => anyhow::bail!("Unknown TARGET_BACKEND '{other}', expected 'http' or 'memory'"),
    }
}

/// Read environment variable or return default value
fn env_var_or_default<T: std::str::FromStr>(key: &str, default: T) -> T
where
    <T as std::str::FromStr>::Err: std::fmt::Debug,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Read environment variable as string or return default
fn env_var_or_default_str(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
