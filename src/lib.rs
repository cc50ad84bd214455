//! Declaration Controller Library
//!
//! Reconciles `Declaration` resources into an external key/value target
//! environment: registers a cleanup obligation, validates, converges
//! incrementally, records status and cleans up on deletion.
//!
//! ## Quick Start
//!
//! ```rust
//! use declaration_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provider;
pub mod runtime;
pub mod store;
