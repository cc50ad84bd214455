//! # Resource Storage
//!
//! Persistence seam for resource records.
//!
//! The controller only ever reads a record and writes it back with the
//! resource version it read. A stale version is rejected with
//! [`StoreError::Conflict`]. The controller never deletes a record itself;
//! the storage layer purges it once the deletion marker is set and the
//! obligation set is empty.
//!
//! - `k8s.rs`: Kubernetes API backed store
//! - `memory.rs`: in-process store for tests and local runs

use crate::controller::reconciler::types::ResourceKey;
use async_trait::async_trait;
use thiserror::Error;

mod k8s;
mod memory;

pub use self::k8s::KubeStore;
pub use self::memory::InMemoryStore;

#[derive(Debug, Error)]
pub enum StoreError {
    /// The write was based on a stale read
    #[error("conflicting write to {0}: resource version is stale")]
    Conflict(ResourceKey),
    /// The record disappeared between read and write
    #[error("resource {0} not found")]
    NotFound(ResourceKey),
    #[error("storage backend error: {0}")]
    Backend(String),
}

/// Storage of resource records with optimistic concurrency
#[async_trait]
pub trait ResourceStore<K>: Send + Sync {
    /// Fetch the current record, `None` once it has been purged
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError>;

    /// Write metadata and spec (including the obligation set)
    /// Returns the stored record with its new resource version
    async fn update(&self, resource: &K) -> Result<K, StoreError>;

    /// Write the status block only
    /// Returns the stored record with its new resource version
    async fn update_status(&self, resource: &K) -> Result<K, StoreError>;
}
