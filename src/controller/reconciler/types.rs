//! # Types
//!
//! Core types for the reconciler.

use crate::crd::{Declaration, DeclarationSpec, DeclarationStatus};
use crate::store::StoreError;
use kube_runtime::controller::Action;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Identifier of a resource record (namespace + name)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub namespace: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// What the dispatcher should do after a successful invocation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Run again after the given interval (periodic drift check)
    RequeueAfter(Duration),
    /// Run again right away, e.g. after a stale-read conflict
    RequeueNow,
    /// Steady state, wait for the next change
    Done,
}

impl Outcome {
    /// Convert into the kube runtime action
    #[must_use]
    pub fn into_action(self) -> Action {
        match self {
            Outcome::RequeueAfter(interval) => Action::requeue(interval),
            Outcome::RequeueNow => Action::requeue(Duration::ZERO),
            Outcome::Done => Action::await_change(),
        }
    }

    /// Label used for the requeue metric
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::RequeueAfter(_) => "drift-check",
            Outcome::RequeueNow => "conflict",
            Outcome::Done => "none",
        }
    }
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    /// Target environment failure worth retrying; already recorded on the status
    #[error("target environment failure: {message}")]
    Transient { message: String, retry_after: Duration },
    /// Target environment failure that will not heal by retrying
    #[error("permanent target environment failure: {0}")]
    Permanent(String),
    /// Persistence failed for a reason other than a stale read
    #[error("resource storage failure: {0}")]
    Store(#[source] StoreError),
}

impl ReconcilerError {
    /// Requeue action for the dispatcher
    ///
    /// Permanent failures wait for a new desired state; storage failures
    /// retry after `fallback`.
    #[must_use]
    pub fn requeue_action(&self, fallback: Duration) -> Action {
        match self {
            ReconcilerError::Transient { retry_after, .. } => Action::requeue(*retry_after),
            ReconcilerError::Permanent(_) => Action::await_change(),
            ReconcilerError::Store(_) => Action::requeue(fallback),
        }
    }

    /// Label used for the error metric
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            ReconcilerError::Transient { .. } => "transient",
            ReconcilerError::Permanent(_) => "permanent",
            ReconcilerError::Store(_) => "store",
        }
    }
}

/// A resource record the orchestrator can drive
///
/// `status`/`status_mut` returning `None` means the kind has no status block;
/// such kinds get a fixed base retry interval instead of history-based backoff.
pub trait Reconcilable: Clone + Send + Sync + 'static {
    fn key(&self) -> ResourceKey;
    fn generation(&self) -> Option<i64>;
    fn resource_version(&self) -> Option<&str>;
    fn set_resource_version(&mut self, version: String);
    /// Whether the deletion marker is set
    fn deletion_requested(&self) -> bool;
    fn obligations(&self) -> &[String];
    fn obligations_mut(&mut self) -> &mut Vec<String>;
    fn desired(&self) -> &DeclarationSpec;
    fn status(&self) -> Option<&DeclarationStatus>;
    fn status_mut(&mut self) -> Option<&mut DeclarationStatus>;
    /// Overwrite the whole status block; a no-op for kinds without one
    fn replace_status(&mut self, status: Option<DeclarationStatus>);
}

impl Reconcilable for Declaration {
    fn key(&self) -> ResourceKey {
        ResourceKey::new(
            self.metadata.namespace.as_deref().unwrap_or("default"),
            self.metadata.name.as_deref().unwrap_or("unknown"),
        )
    }

    fn generation(&self) -> Option<i64> {
        self.metadata.generation
    }

    fn resource_version(&self) -> Option<&str> {
        self.metadata.resource_version.as_deref()
    }

    fn set_resource_version(&mut self, version: String) {
        self.metadata.resource_version = Some(version);
    }

    fn deletion_requested(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    fn obligations(&self) -> &[String] {
        self.metadata.finalizers.as_deref().unwrap_or_default()
    }

    fn obligations_mut(&mut self) -> &mut Vec<String> {
        self.metadata.finalizers.get_or_insert_with(Vec::new)
    }

    fn desired(&self) -> &DeclarationSpec {
        &self.spec
    }

    fn status(&self) -> Option<&DeclarationStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> Option<&mut DeclarationStatus> {
        Some(self.status.get_or_insert_with(DeclarationStatus::default))
    }

    fn replace_status(&mut self, status: Option<DeclarationStatus>) {
        self.status = status;
    }
}
