//! # Custom Resource Definitions
//!
//! CRD types for the Declaration Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Declaration` CRD and its desired state
//! - `status.rs` - Status types: conditions, last-applied snapshot, backoff history

mod spec;
mod status;

pub use spec::{default_false, Declaration, DeclarationSpec};
pub use status::{AppliedSnapshot, Condition, ConditionStatus, DeclarationStatus};
