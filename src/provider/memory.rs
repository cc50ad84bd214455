//! # In-Memory Target
//!
//! In-process target environment.
//!
//! Keeps every scope in a map, records each successful mutating call in an
//! operation log and supports failure injection, which makes it the target
//! of choice for tests and for running the controller without an external
//! system (`TARGET_BACKEND=memory`).

use super::{Observation, ProviderError, TargetProvider};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::debug;

/// One successful call against the in-memory target
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TargetOperation {
    Create {
        scope: String,
        key: String,
        value: String,
    },
    Update {
        scope: String,
        key: String,
        value: String,
    },
    Delete {
        scope: String,
        key: String,
    },
    Observe {
        scope: String,
    },
}

impl TargetOperation {
    /// Whether the call changed the target
    #[must_use]
    pub fn is_mutation(&self) -> bool {
        !matches!(self, TargetOperation::Observe { .. })
    }
}

#[derive(Debug, Default)]
pub struct InMemoryTarget {
    scopes: Mutex<BTreeMap<String, BTreeMap<String, String>>>,
    log: Mutex<Vec<TargetOperation>>,
    failures: Mutex<VecDeque<Option<ProviderError>>>,
    latency: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl InMemoryTarget {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next call fail with `error`
    ///
    /// Calls queue up: injecting three errors fails the next three calls.
    pub fn fail_next(&self, error: ProviderError) {
        lock(&self.failures).push_back(Some(error));
    }

    /// Let the next `passing` calls through, then fail the one after with `error`
    pub fn fail_after(&self, passing: usize, error: ProviderError) {
        let mut failures = lock(&self.failures);
        failures.extend(std::iter::repeat_n(None, passing));
        failures.push_back(Some(error));
    }

    /// Delay every call by `latency`
    pub fn set_latency(&self, latency: Option<Duration>) {
        *lock(&self.latency) = latency;
    }

    /// Write an entry directly, bypassing the operation log (out-of-band change)
    pub fn seed(&self, scope: &str, key: &str, value: &str) {
        lock(&self.scopes)
            .entry(scope.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Remove an entry directly, bypassing the operation log (out-of-band change)
    pub fn remove(&self, scope: &str, key: &str) {
        if let Some(entries) = lock(&self.scopes).get_mut(scope) {
            entries.remove(key);
        }
    }

    /// Current entries of `scope`
    pub fn entries(&self, scope: &str) -> BTreeMap<String, String> {
        lock(&self.scopes).get(scope).cloned().unwrap_or_default()
    }

    /// Every successful call so far, in order
    pub fn operations(&self) -> Vec<TargetOperation> {
        lock(&self.log).clone()
    }

    /// Successful calls that changed the target
    pub fn mutations(&self) -> Vec<TargetOperation> {
        lock(&self.log)
            .iter()
            .filter(|operation| operation.is_mutation())
            .cloned()
            .collect()
    }

    pub fn clear_operations(&self) {
        lock(&self.log).clear();
    }

    /// Apply latency and injected failures shared by every call
    async fn before_call(&self) -> Result<(), ProviderError> {
        let latency = *lock(&self.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        match lock(&self.failures).pop_front().flatten() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn record(&self, operation: TargetOperation) {
        debug!("In-memory target: {:?}", operation);
        lock(&self.log).push(operation);
    }

    fn put(&self, scope: &str, key: &str, value: &str) {
        self.seed(scope, key, value);
    }
}

#[async_trait]
impl TargetProvider for InMemoryTarget {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn create(&self, scope: &str, key: &str, value: &str) -> Result<(), ProviderError> {
        self.before_call().await?;
        self.put(scope, key, value);
        self.record(TargetOperation::Create {
            scope: scope.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn update(&self, scope: &str, key: &str, value: &str) -> Result<(), ProviderError> {
        self.before_call().await?;
        self.put(scope, key, value);
        self.record(TargetOperation::Update {
            scope: scope.to_string(),
            key: key.to_string(),
            value: value.to_string(),
        });
        Ok(())
    }

    async fn delete(&self, scope: &str, key: &str) -> Result<(), ProviderError> {
        self.before_call().await?;
        self.remove(scope, key);
        self.record(TargetOperation::Delete {
            scope: scope.to_string(),
            key: key.to_string(),
        });
        Ok(())
    }

    async fn observe(&self, scope: &str) -> Result<Observation, ProviderError> {
        self.before_call().await?;
        let items = self.entries(scope);
        self.record(TargetOperation::Observe {
            scope: scope.to_string(),
        });
        let mut attributes = BTreeMap::new();
        attributes.insert("endpoint".to_string(), "memory://".to_string());
        attributes.insert("scopeUrl".to_string(), format!("memory://{scope}"));
        Ok(Observation { items, attributes })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_create_update_delete_roundtrip() {
        let target = InMemoryTarget::new();
        target.create("team-a", "A", "1").await.unwrap();
        target.update("team-a", "A", "2").await.unwrap();
        assert_eq!(target.entries("team-a").get("A").map(String::as_str), Some("2"));

        target.delete("team-a", "A").await.unwrap();
        assert!(target.entries("team-a").is_empty());
        assert_eq!(target.mutations().len(), 3);
    }

    #[tokio::test]
    async fn test_delete_absent_entry_succeeds() {
        let target = InMemoryTarget::new();
        assert!(target.delete("team-a", "missing").await.is_ok());
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed_in_order() {
        let target = InMemoryTarget::new();
        target.fail_next(ProviderError::Transient("first".to_string()));
        target.fail_next(ProviderError::Permanent("second".to_string()));

        let first = target.create("team-a", "A", "1").await.unwrap_err();
        let second = target.create("team-a", "A", "1").await.unwrap_err();
        assert_eq!(first, ProviderError::Transient("first".to_string()));
        assert!(second.is_permanent());
        assert!(target.create("team-a", "A", "1").await.is_ok());
        assert_eq!(target.mutations().len(), 1);
    }

    #[tokio::test]
    async fn test_failure_after_passing_calls() {
        let target = InMemoryTarget::new();
        target.fail_after(2, ProviderError::Transient("third call".to_string()));

        assert!(target.observe("team-a").await.is_ok());
        assert!(target.create("team-a", "A", "1").await.is_ok());
        assert!(target.update("team-a", "A", "2").await.is_err());
        assert!(target.update("team-a", "A", "2").await.is_ok());
    }

    #[tokio::test]
    async fn test_observe_reports_seeded_entries() {
        let target = InMemoryTarget::new();
        target.seed("team-a", "manual", "x");
        let observation = target.observe("team-a").await.unwrap();
        assert_eq!(observation.items.get("manual").map(String::as_str), Some("x"));
        assert_eq!(
            observation.attributes.get("scopeUrl").map(String::as_str),
            Some("memory://team-a")
        );
        assert!(target.mutations().is_empty());
    }
}
