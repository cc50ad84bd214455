//! # Runtime
//!
//! Process wiring around the reconciler.
//!
//! - `initialization.rs`: tracing, metrics, HTTP server, client and reconciler setup
//! - `watch_loop.rs`: `kube_runtime::Controller` dispatch loop with restart handling
//! - `error_policy.rs`: requeue decisions for failed reconciliations and watch errors

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;
