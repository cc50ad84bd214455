//! # Constants
//!
//! Shared constants used throughout the controller.
//!
//! These values represent reasonable defaults and can be overridden via
//! configuration or environment variables where applicable.

/// API group of the `Declaration` custom resource
pub const API_GROUP: &str = "reconcile.octopilot.io";

/// Default obligation token this controller registers on every `Declaration`
pub const DEFAULT_FINALIZER_NAME: &str = "reconcile.octopilot.io/target-cleanup";

/// Field manager used for writes to the Kubernetes API
pub const FIELD_MANAGER: &str = "declaration-controller";

/// Default HTTP server port for metrics, probes and the admission endpoint
pub const DEFAULT_METRICS_PORT: u16 = 5000;

/// Default HTTP server startup timeout (how long to wait for server to be ready)
pub const DEFAULT_SERVER_STARTUP_TIMEOUT_SECS: u64 = 10;

/// Default HTTP server readiness poll interval
pub const DEFAULT_SERVER_POLL_INTERVAL_MS: u64 = 50;

/// Base retry interval after the first failure of a sequence (seconds)
pub const DEFAULT_BACKOFF_BASE_SECS: u64 = 1;

/// Ceiling for the exponential retry interval (seconds)
pub const DEFAULT_BACKOFF_CAP_SECS: u64 = 6 * 3600;

/// Per-invocation deadline covering all target provider calls (seconds)
pub const DEFAULT_RECONCILE_DEADLINE_SECS: u64 = 30;

/// Default delay before restarting watch stream after unknown errors (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_SECS: u64 = 5;

/// Default delay before restarting watch stream after it ends (seconds)
pub const DEFAULT_WATCH_RESTART_DELAY_AFTER_END_SECS: u64 = 1;

/// Default exponential backoff starting value for watch stream restarts (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_START_MS: u64 = 1000;

/// Default exponential backoff maximum value for watch stream restarts (milliseconds)
pub const DEFAULT_WATCH_BACKOFF_MAX_MS: u64 = 30_000;

/// Minimum drift check interval (seconds)
/// Shorter intervals hammer the target environment for no benefit
pub const MIN_DRIFT_CHECK_INTERVAL_SECS: u64 = 60;

/// Default maximum number of entries in a single declaration
pub const DEFAULT_MAX_ENTRIES_PER_RESOURCE: usize = 1000;

/// Default maximum entry value size in bytes (64KB)
pub const DEFAULT_MAX_VALUE_SIZE_BYTES: usize = 65536;

/// Maximum length of a scope or entry key
pub const MAX_NAME_LENGTH: usize = 253;

/// Default timeout for a single HTTP request to the target environment (seconds)
pub const DEFAULT_TARGET_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Condition kind recording the validator verdict
pub const CONDITION_VALIDATED: &str = "Validated";

/// Condition kind recording the overall reconciliation outcome
pub const CONDITION_READY: &str = "Ready";
