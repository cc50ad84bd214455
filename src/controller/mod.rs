//! # Controller
//!
//! Core controller modules for the Declaration Controller.
//!
//! - `backoff`: Exponential backoff used for retries and watch restarts
//! - `reconciler`: Core reconciliation logic
//! - `server`: HTTP server for metrics, health checks and admission

pub mod backoff;
pub mod reconciler;
pub mod server;
