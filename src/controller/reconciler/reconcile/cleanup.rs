//! # Deletion Branch
//!
//! Runs target cleanup for a resource carrying the deletion marker, then
//! discharges this controller's obligation token. No creation-path code is
//! reachable from here.

use super::{call_provider, handle_store_error, Reconciler};
use crate::controller::reconciler::status::now_rfc3339;
use crate::controller::reconciler::types::{Outcome, Reconcilable, ReconcilerError};
use crate::controller::reconciler::{cache, finalizer};
use crate::observability::metrics;
use crate::provider::{ProviderError, TargetProvider};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Entries to remove from the target, grouped by scope
pub type CleanupSet = BTreeMap<String, BTreeSet<String>>;

impl<K: Reconcilable> Reconciler<K> {
    pub(super) async fn finalize(&self, resource: K) -> Result<Outcome, ReconcilerError> {
        let key = resource.key();
        if !finalizer::has_pending(&resource, &[self.finalizer_name.as_str()]) {
            debug!("No cleanup obligation of ours on {}, nothing to do", key);
            return Ok(Outcome::Done);
        }

        let targets = self.cleanup_set(&resource);
        info!(
            "Cleaning up {} entries for deleted resource {}",
            targets.values().map(BTreeSet::len).sum::<usize>(),
            key
        );

        let provider = self.provider.as_ref();
        if let Err(e) = self.within_deadline(remove_entries(provider, &targets)).await {
            let working = resource.clone();
            return self
                .record_failure(&resource, working, e, &now_rfc3339())
                .await;
        }

        // Discharge only after every delete is confirmed
        let mut working = resource;
        finalizer::discharge(&mut working, &self.finalizer_name);
        match self.store.update(&working).await {
            Ok(_) => {
                metrics::increment_cleanups();
                info!("Cleanup complete, released finalizer {} on {}", self.finalizer_name, key);
                Ok(Outcome::Done)
            }
            Err(e) => handle_store_error(e),
        }
    }

    /// Union of the last applied entries, the pending keys and the current
    /// desired entries
    ///
    /// Pending keys were written by passes that failed part way. The desired
    /// entries cover a first pass that was interrupted before it could record
    /// anything. They are only included when the desired state is valid; an
    /// invalid one was never applied.
    #[must_use]
    pub fn cleanup_set(&self, resource: &K) -> CleanupSet {
        let mut targets = CleanupSet::new();
        let previous = cache::previous_spec(resource);

        if let Some(applied) = previous {
            targets
                .entry(applied.scope.clone())
                .or_default()
                .extend(applied.entries.keys().cloned());
        }

        for (scope, keys) in cache::pending(resource).into_iter().flatten() {
            targets
                .entry(scope.clone())
                .or_default()
                .extend(keys.iter().cloned());
        }

        let desired = resource.desired();
        if self.validator.validate(desired, previous, false).is_ok() {
            targets
                .entry(desired.scope.clone())
                .or_default()
                .extend(desired.entries.keys().cloned());
        }

        targets.retain(|_, keys| !keys.is_empty());
        targets
    }
}

async fn remove_entries(
    provider: &dyn TargetProvider,
    targets: &CleanupSet,
) -> Result<(), ProviderError> {
    for (scope, keys) in targets {
        for key in keys {
            call_provider(provider, "delete", provider.delete(scope, key)).await?;
        }
    }
    Ok(())
}
