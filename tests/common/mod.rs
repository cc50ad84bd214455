//! Common test utilities for reconciliation and Pact tests
//!
//! Provides an in-process harness (in-memory store, in-memory target,
//! reconciler) plus rustls crypto provider setup.

#![allow(dead_code)]

use async_trait::async_trait;
use declaration_controller::config::ControllerConfig;
use declaration_controller::controller::reconciler::{Reconcilable, Reconciler, ResourceKey};
use declaration_controller::crd::{Declaration, DeclarationSpec, DeclarationStatus};
use declaration_controller::provider::InMemoryTarget;
use declaration_controller::store::{InMemoryStore, ResourceStore, StoreError};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};

static RUSTLS_INIT: Once = Once::new();

/// Initialize rustls crypto provider for tests
///
/// Uses a `Once` to ensure it's only called once across all tests.
pub fn init_rustls() {
    RUSTLS_INIT.call_once(|| {
        let _ = rustls::crypto::ring::default_provider().install_default();
    });
}

pub const NAMESPACE: &str = "default";

pub fn entries(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
        .collect()
}

pub fn spec(scope: &str, pairs: &[(&str, &str)]) -> DeclarationSpec {
    DeclarationSpec {
        scope: scope.to_string(),
        entries: entries(pairs),
        drift_check_interval: None,
        suspend: false,
    }
}

pub fn declaration(name: &str, spec: DeclarationSpec) -> Declaration {
    let mut declaration = Declaration::new(name, spec);
    declaration.metadata.namespace = Some(NAMESPACE.to_string());
    declaration
}

pub fn deletion_time() -> Time {
    serde_json::from_value(serde_json::json!("2024-01-01T00:00:00Z")).unwrap()
}

pub fn config() -> ControllerConfig {
    ControllerConfig::default()
}

/// Store, target and reconciler wired together in-process
pub struct Harness<K: Reconcilable> {
    pub store: Arc<InMemoryStore<K>>,
    pub target: Arc<InMemoryTarget>,
    pub reconciler: Reconciler<K>,
}

impl<K: Reconcilable> Harness<K> {
    pub fn with_config(config: &ControllerConfig) -> Self {
        let store = Arc::new(InMemoryStore::new());
        let target = Arc::new(InMemoryTarget::new());
        let reconciler = Reconciler::new(store.clone(), target.clone(), config);
        Self {
            store,
            target,
            reconciler,
        }
    }
}

impl Harness<Declaration> {
    pub fn new() -> Self {
        Self::with_config(&config())
    }

    pub fn stored(&self, key: &ResourceKey) -> Declaration {
        self.store.snapshot(key).expect("resource should exist")
    }

    pub fn status(&self, key: &ResourceKey) -> DeclarationStatus {
        self.stored(key).status.unwrap_or_default()
    }
}

/// Which write the racing store interferes with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaceOn {
    Update,
    UpdateStatus,
}

/// Store that lets an author edit land right before one controller write
///
/// The edit bumps the resource version, so the controller write that
/// follows is based on a stale read and conflicts.
pub struct RacingStore {
    pub inner: Arc<InMemoryStore<Declaration>>,
    race_on: RaceOn,
    remaining: AtomicUsize,
    edit: Mutex<Box<dyn FnMut(&mut Declaration) + Send>>,
}

impl RacingStore {
    pub fn new(
        inner: Arc<InMemoryStore<Declaration>>,
        race_on: RaceOn,
        edit: impl FnMut(&mut Declaration) + Send + 'static,
    ) -> Self {
        Self {
            inner,
            race_on,
            remaining: AtomicUsize::new(1),
            edit: Mutex::new(Box::new(edit)),
        }
    }

    fn maybe_race(&self, key: &ResourceKey, write: RaceOn) {
        if write != self.race_on {
            return;
        }
        let claimed = self
            .remaining
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if claimed {
            let mut edit = self.edit.lock().unwrap();
            self.inner.modify(key, |d| (*edit)(d));
        }
    }
}

#[async_trait]
impl ResourceStore<Declaration> for RacingStore {
    async fn get(&self, key: &ResourceKey) -> Result<Option<Declaration>, StoreError> {
        self.inner.get(key).await
    }

    async fn update(&self, resource: &Declaration) -> Result<Declaration, StoreError> {
        self.maybe_race(&resource.key(), RaceOn::Update);
        self.inner.update(resource).await
    }

    async fn update_status(&self, resource: &Declaration) -> Result<Declaration, StoreError> {
        self.maybe_race(&resource.key(), RaceOn::UpdateStatus);
        self.inner.update_status(resource).await
    }
}
