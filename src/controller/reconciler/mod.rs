//! # Reconciler
//!
//! Core reconciliation logic for `Declaration` resources.
//!
//! The reconciler:
//! - Registers a cleanup obligation before touching the target environment
//! - Validates the desired state against the last applied snapshot
//! - Converges the target incrementally (never destroy and recreate)
//! - Records conditions, observed attributes and failure history in status
//! - Cleans up owned entries and releases the obligation on deletion
//!
//! ## Reconciliation Flow
//!
//! 1. Fetch the resource record
//! 2. Choose branch:
//!    - **Deletion**: clean up the target, discharge the finalizer
//!    - **Normal**: register finalizer, validate, converge
//! 3. Update status in a single write
//! 4. Return an [`Outcome`] for the requeue scheduler

pub mod cache;
pub mod finalizer;
pub mod reconcile;
pub mod status;
pub mod types;
pub mod validation;

// Re-export public API
pub use reconcile::{CleanupSet, ConvergencePlan, Reconciler};
pub use status::RequeueScheduler;
pub use types::{Outcome, Reconcilable, ReconcilerError, ResourceKey};
pub use validation::{ValidationError, ValidationLimits, Validator};
