//! # In-Memory Store
//!
//! Versioned in-process `ResourceStore`.
//!
//! Mirrors the API server behaviours the controller relies on: every write
//! bumps the resource version, writes carrying a stale version fail with
//! `Conflict`, `update` never touches status and `update_status` never
//! touches anything else, and a record marked for deletion is purged as soon
//! as its obligation set is empty.

use super::{ResourceStore, StoreError};
use crate::controller::reconciler::types::{Reconcilable, ResourceKey};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

#[derive(Debug)]
pub struct InMemoryStore<K> {
    records: Mutex<HashMap<ResourceKey, K>>,
    next_version: AtomicU64,
    controller_writes: AtomicU64,
}

impl<K> Default for InMemoryStore<K> {
    fn default() -> Self {
        Self {
            records: Mutex::new(HashMap::new()),
            next_version: AtomicU64::new(1),
            controller_writes: AtomicU64::new(0),
        }
    }
}

impl<K: Reconcilable> InMemoryStore<K> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn records(&self) -> MutexGuard<'_, HashMap<ResourceKey, K>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bump(&self, resource: &mut K) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        resource.set_resource_version(version.to_string());
    }

    /// Create a record as an author would
    pub fn insert(&self, mut resource: K) -> K {
        self.bump(&mut resource);
        self.records().insert(resource.key(), resource.clone());
        resource
    }

    /// Mutate a record as an author would (spec edits, deletion requests)
    ///
    /// Returns the stored record, or `None` if it does not exist or was
    /// purged by this change.
    pub fn modify(&self, key: &ResourceKey, change: impl FnOnce(&mut K)) -> Option<K> {
        let mut records = self.records();
        let mut resource = records.get(key)?.clone();
        change(&mut resource);
        self.bump(&mut resource);
        if resource.deletion_requested() && resource.obligations().is_empty() {
            records.remove(key);
            return None;
        }
        records.insert(key.clone(), resource.clone());
        Some(resource)
    }

    /// Current record without going through the async trait
    pub fn snapshot(&self, key: &ResourceKey) -> Option<K> {
        self.records().get(key).cloned()
    }

    /// Number of successful writes issued through `ResourceStore`
    pub fn controller_writes(&self) -> u64 {
        self.controller_writes.load(Ordering::SeqCst)
    }

    fn check_version(stored: &K, incoming: &K) -> Result<(), StoreError> {
        if stored.resource_version() == incoming.resource_version() {
            Ok(())
        } else {
            Err(StoreError::Conflict(incoming.key()))
        }
    }
}

#[async_trait]
impl<K: Reconcilable> ResourceStore<K> for InMemoryStore<K> {
    async fn get(&self, key: &ResourceKey) -> Result<Option<K>, StoreError> {
        Ok(self.snapshot(key))
    }

    async fn update(&self, resource: &K) -> Result<K, StoreError> {
        let key = resource.key();
        let mut records = self.records();
        let stored = records
            .get(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        Self::check_version(stored, resource)?;

        let mut next = resource.clone();
        next.replace_status(stored.status().cloned());
        self.bump(&mut next);
        self.controller_writes.fetch_add(1, Ordering::SeqCst);

        if next.deletion_requested() && next.obligations().is_empty() {
            records.remove(&key);
        } else {
            records.insert(key, next.clone());
        }
        Ok(next)
    }

    async fn update_status(&self, resource: &K) -> Result<K, StoreError> {
        let key = resource.key();
        let mut records = self.records();
        let stored = records
            .get_mut(&key)
            .ok_or_else(|| StoreError::NotFound(key.clone()))?;
        Self::check_version(stored, resource)?;

        stored.replace_status(resource.status().cloned());
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        stored.set_resource_version(version.to_string());
        self.controller_writes.fetch_add(1, Ordering::SeqCst);
        Ok(stored.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Declaration, DeclarationSpec};

    fn deletion_time() -> k8s_openapi::apimachinery::pkg::apis::meta::v1::Time {
        serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap()
    }

    fn declaration(name: &str) -> Declaration {
        let mut declaration = Declaration::new(
            name,
            DeclarationSpec {
                scope: "team-a".to_string(),
                entries: [("A".to_string(), "1".to_string())].into(),
                drift_check_interval: None,
                suspend: false,
            },
        );
        declaration.metadata.namespace = Some("default".to_string());
        declaration
    }

    #[tokio::test]
    async fn test_update_with_stale_version_conflicts() {
        let store = InMemoryStore::new();
        let stored = store.insert(declaration("a"));
        store.modify(&stored.key(), |d| d.spec.scope = "team-b".to_string());

        let result = store.update(&stored).await;
        assert!(matches!(result, Err(StoreError::Conflict(_))));
        assert_eq!(store.controller_writes(), 0);
    }

    #[tokio::test]
    async fn test_update_does_not_touch_status() {
        let store = InMemoryStore::new();
        let stored = store.insert(declaration("a"));

        let mut working = stored.clone();
        working.obligations_mut().push("token".to_string());
        working.status_mut().unwrap().failure_count = 7;
        let written = store.update(&working).await.unwrap();

        assert_eq!(written.obligations(), ["token".to_string()]);
        assert_eq!(written.status().map(|s| s.failure_count), Some(0));
    }

    #[tokio::test]
    async fn test_update_status_only_touches_status() {
        let store = InMemoryStore::new();
        let stored = store.insert(declaration("a"));

        let mut working = stored.clone();
        working.spec.scope = "changed".to_string();
        working.status_mut().unwrap().failure_count = 2;
        let written = store.update_status(&working).await.unwrap();

        assert_eq!(written.spec.scope, "team-a");
        assert_eq!(written.status().map(|s| s.failure_count), Some(2));
        assert_ne!(written.resource_version(), stored.resource_version());
    }

    #[tokio::test]
    async fn test_record_purged_once_obligations_cleared() {
        let store = InMemoryStore::new();
        let mut initial = declaration("a");
        initial.obligations_mut().push("token".to_string());
        let stored = store.insert(initial);
        let key = stored.key();

        let marked = store
            .modify(&key, |d| {
                d.metadata.deletion_timestamp = Some(deletion_time());
            })
            .unwrap();

        let mut working = marked.clone();
        working.obligations_mut().clear();
        store.update(&working).await.unwrap();

        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_deletion_without_obligations_purges_immediately() {
        let store = InMemoryStore::new();
        let stored = store.insert(declaration("a"));
        let purged = store.modify(&stored.key(), |d| {
            d.metadata.deletion_timestamp = Some(deletion_time());
        });
        assert!(purged.is_none());
        assert!(store.snapshot(&stored.key()).is_none());
    }
}
