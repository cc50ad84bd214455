//! # Convergence
//!
//! Incremental plan that moves the target toward the desired state.

use super::call_provider;
use crate::crd::DeclarationSpec;
use crate::provider::{ProviderError, TargetProvider};
use std::collections::{BTreeMap, BTreeSet};
use tracing::{debug, info};

/// Operations needed to bring one scope to the desired state
///
/// Built from the last applied snapshot and the desired spec:
/// - keys absent from the snapshot are created
/// - keys whose value changed are updated
/// - keys present only in the snapshot are deleted
///
/// With an observation of the target, desired keys that are missing or
/// hold another value are repaired as well, and planned operations that
/// the target already reflects are dropped. Pending keys of the desired
/// scope, written by an earlier pass that failed, are owned like snapshot
/// keys. Keys that are neither are never deleted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergencePlan {
    pub creates: BTreeMap<String, String>,
    pub updates: BTreeMap<String, String>,
    pub deletes: BTreeSet<String>,
}

impl ConvergencePlan {
    #[must_use]
    pub fn compute(
        previous: Option<&DeclarationSpec>,
        pending: Option<&BTreeSet<String>>,
        desired: &DeclarationSpec,
        observed: Option<&BTreeMap<String, String>>,
    ) -> Self {
        // A snapshot of another scope owns nothing in this one
        let owned = previous
            .filter(|previous| previous.scope == desired.scope)
            .map(|previous| &previous.entries);

        let mut plan = Self::default();

        for (key, value) in &desired.entries {
            let applied = owned.and_then(|entries| entries.get(key));
            let current = observed.map(|items| items.get(key));
            match (applied, current) {
                // Target already holds the desired value
                (_, Some(Some(actual))) if actual == value => {}
                // Observed missing: create regardless of history
                (_, Some(None)) | (None, None) => {
                    plan.creates.insert(key.clone(), value.clone());
                }
                (Some(applied), None) if applied == value => {}
                (Some(_), _) | (None, Some(Some(_))) => {
                    plan.updates.insert(key.clone(), value.clone());
                }
            }
        }

        let owned_keys = owned
            .into_iter()
            .flat_map(BTreeMap::keys)
            .chain(pending.into_iter().flatten());
        for key in owned_keys {
            if desired.entries.contains_key(key) {
                continue;
            }
            let present = observed.is_none_or(|items| items.contains_key(key));
            if present {
                plan.deletes.insert(key.clone());
            }
        }

        plan
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.creates.is_empty() && self.updates.is_empty() && self.deletes.is_empty()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.creates.len() + self.updates.len() + self.deletes.len()
    }

    /// Keys this plan writes
    pub fn written_keys(&self) -> impl Iterator<Item = &String> {
        self.creates.keys().chain(self.updates.keys())
    }

    /// Apply the plan: creates, then updates, then deletes
    ///
    /// Stops at the first failure; everything applied before it stays
    /// applied and is picked up by the next pass.
    pub async fn execute(
        &self,
        provider: &dyn TargetProvider,
        scope: &str,
    ) -> Result<(), ProviderError> {
        if self.is_empty() {
            debug!("Scope {} already converged", scope);
            return Ok(());
        }
        info!(
            "Converging scope {}: {} create(s), {} update(s), {} delete(s)",
            scope,
            self.creates.len(),
            self.updates.len(),
            self.deletes.len()
        );

        for (key, value) in &self.creates {
            call_provider(provider, "create", provider.create(scope, key, value)).await?;
        }
        for (key, value) in &self.updates {
            call_provider(provider, "update", provider.update(scope, key, value)).await?;
        }
        for key in &self.deletes {
            call_provider(provider, "delete", provider.delete(scope, key)).await?;
        }
        Ok(())
    }
}
