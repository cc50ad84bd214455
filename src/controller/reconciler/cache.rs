//! # Declaration Cache
//!
//! Last successfully applied desired state, stored in the status block.
//!
//! There is no separate persistence: the snapshot travels with the
//! resource and is written in the same status update as the conditions.

use crate::controller::reconciler::types::Reconcilable;
use crate::crd::{AppliedSnapshot, DeclarationSpec};
use std::collections::{BTreeMap, BTreeSet};

/// Last applied snapshot, `None` before the first success or for kinds without status
#[must_use]
pub fn get<K: Reconcilable>(resource: &K) -> Option<&AppliedSnapshot> {
    resource.status().and_then(|s| s.last_applied.as_ref())
}

/// Spec part of the last applied snapshot
#[must_use]
pub fn previous_spec<K: Reconcilable>(resource: &K) -> Option<&DeclarationSpec> {
    get(resource).map(|snapshot| &snapshot.spec)
}

/// Record `spec` as successfully applied at `applied_at`
///
/// An identical spec keeps its original timestamp so that repeated passes
/// over an unchanged declaration leave the status untouched.
/// Returns `true` if the snapshot changed.
pub fn set<K: Reconcilable>(resource: &mut K, spec: &DeclarationSpec, applied_at: &str) -> bool {
    let Some(status) = resource.status_mut() else {
        return false;
    };
    if status
        .last_applied
        .as_ref()
        .is_some_and(|snapshot| &snapshot.spec == spec)
    {
        return false;
    }
    status.last_applied = Some(AppliedSnapshot {
        spec: spec.clone(),
        applied_at: applied_at.to_string(),
    });
    true
}

/// Keys written by incomplete passes, grouped by scope
#[must_use]
pub fn pending<K: Reconcilable>(resource: &K) -> Option<&BTreeMap<String, BTreeSet<String>>> {
    resource.status().map(|s| &s.pending_keys)
}

/// Pending keys of one scope
#[must_use]
pub fn pending_in<'a, K: Reconcilable>(
    resource: &'a K,
    scope: &str,
) -> Option<&'a BTreeSet<String>> {
    pending(resource).and_then(|pending| pending.get(scope))
}

/// Add `keys` to the pending keys of `scope`
pub fn mark_pending<K: Reconcilable>(
    resource: &mut K,
    scope: &str,
    keys: impl IntoIterator<Item = String>,
) {
    let Some(status) = resource.status_mut() else {
        return;
    };
    let mut keys = keys.into_iter().peekable();
    if keys.peek().is_none() {
        return;
    }
    status
        .pending_keys
        .entry(scope.to_string())
        .or_default()
        .extend(keys);
}

/// Forget the pending keys of `scope` once a pass over it has completed
pub fn clear_pending<K: Reconcilable>(resource: &mut K, scope: &str) {
    if let Some(status) = resource.status_mut() {
        status.pending_keys.remove(scope);
    }
}

/// Whether the desired state equals the last applied snapshot
#[must_use]
pub fn is_current<K: Reconcilable>(resource: &K) -> bool {
    previous_spec(resource).is_some_and(|previous| previous == resource.desired())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::Declaration;

    fn declaration(entries: &[(&str, &str)]) -> Declaration {
        Declaration::new(
            "config",
            DeclarationSpec {
                scope: "team-a".to_string(),
                entries: entries
                    .iter()
                    .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                    .collect(),
                drift_check_interval: None,
                suspend: false,
            },
        )
    }

    #[test]
    fn test_empty_before_first_success() {
        let resource = declaration(&[("A", "1")]);
        assert!(get(&resource).is_none());
        assert!(!is_current(&resource));
    }

    #[test]
    fn test_set_then_current() {
        let mut resource = declaration(&[("A", "1")]);
        let spec = resource.spec.clone();
        assert!(set(&mut resource, &spec, "2024-01-01T00:00:00Z"));
        assert!(is_current(&resource));

        resource.spec.entries.insert("B".to_string(), "2".to_string());
        assert!(!is_current(&resource));
    }

    #[test]
    fn test_pending_keys_per_scope() {
        let mut resource = declaration(&[("A", "1")]);
        mark_pending(&mut resource, "team-a", ["X".to_string()]);
        mark_pending(&mut resource, "team-a", ["Y".to_string()]);
        mark_pending(&mut resource, "team-b", Vec::<String>::new());
        assert_eq!(
            pending_in(&resource, "team-a").map(|keys| keys.len()),
            Some(2)
        );
        assert!(pending_in(&resource, "team-b").is_none());

        clear_pending(&mut resource, "team-a");
        assert!(pending(&resource).is_some_and(BTreeMap::is_empty));
    }

    #[test]
    fn test_unchanged_spec_keeps_timestamp() {
        let mut resource = declaration(&[("A", "1")]);
        let spec = resource.spec.clone();
        set(&mut resource, &spec, "2024-01-01T00:00:00Z");
        assert!(!set(&mut resource, &spec, "2024-06-01T00:00:00Z"));
        assert_eq!(
            get(&resource).map(|s| s.applied_at.as_str()),
            Some("2024-01-01T00:00:00Z")
        );
    }
}
