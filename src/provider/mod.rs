//! # Target Providers
//!
//! Adapters for the external environment a declaration is converged into.
//!
//! Every provider implements [`TargetProvider`], which exposes four
//! operations over `(scope, key, value)` triples. Convergence logic is
//! expressed purely in terms of these operations.
//!
//! - `http.rs`: REST key/value API reached over HTTP
//! - `memory.rs`: in-process target for tests and local runs

use async_trait::async_trait;
use std::collections::BTreeMap;
use thiserror::Error;

pub mod http;
pub mod memory;

pub use http::HttpTargetProvider;
pub use memory::{InMemoryTarget, TargetOperation};

/// Failure reported by a target provider
///
/// Providers tag failures explicitly so the orchestrator can stop retrying
/// requests that will never succeed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProviderError {
    /// Network errors, timeouts, throttling, 5xx responses
    #[error("{0}")]
    Transient(String),
    /// Rejected input or a dependency that will never exist
    #[error("{0}")]
    Permanent(String),
}

impl ProviderError {
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        matches!(self, ProviderError::Permanent(_))
    }

    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            ProviderError::Transient(message) | ProviderError::Permanent(message) => message,
        }
    }
}

/// Current content of one scope in the target environment
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Observation {
    /// Key/value items currently present in the scope
    pub items: BTreeMap<String, String>,
    /// Stable descriptive attributes (endpoint URL, scope URL)
    pub attributes: BTreeMap<String, String>,
}

/// Operations against the target environment
#[async_trait]
pub trait TargetProvider: Send + Sync {
    /// Short provider name used in logs and metric labels
    fn name(&self) -> &'static str;

    /// Create an entry; an entry that already exists is overwritten
    async fn create(&self, scope: &str, key: &str, value: &str) -> Result<(), ProviderError>;

    /// Update an entry; an entry that does not exist is created
    async fn update(&self, scope: &str, key: &str, value: &str) -> Result<(), ProviderError>;

    /// Delete an entry; deleting an absent entry succeeds
    async fn delete(&self, scope: &str, key: &str) -> Result<(), ProviderError>;

    /// Read the current content of a scope
    async fn observe(&self, scope: &str) -> Result<Observation, ProviderError>;
}
