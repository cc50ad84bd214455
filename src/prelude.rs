//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use declaration_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (Declaration, DeclarationSpec, DeclarationStatus, etc.)
//! - The target provider trait and its implementations
//! - Reconciler types (Reconciler, Outcome, ReconcilerError, etc.)
//! - Resource storage trait and implementations
//! - Controller configuration

// CRD types - most commonly used
pub use crate::crd::*;

// Target providers
pub use crate::provider::{
    HttpTargetProvider, InMemoryTarget, Observation, ProviderError, TargetOperation,
    TargetProvider,
};

// Reconciler types - core controller functionality
pub use crate::controller::reconciler::{
    Outcome, Reconcilable, Reconciler, ReconcilerError, ResourceKey, ValidationError, Validator,
};

// Resource storage
pub use crate::store::{InMemoryStore, KubeStore, ResourceStore, StoreError};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, TargetBackend};
