//! # Finalizer Management
//!
//! Tracks cleanup obligations on a resource's finalizer list.
//!
//! These helpers only edit the in-memory record. The orchestrator persists
//! the change: registration before any target write, discharge only after
//! cleanup has been confirmed.

use crate::controller::reconciler::types::Reconcilable;

/// Add `token` to the obligation set
///
/// Returns `true` if the set changed; registering twice is a no-op.
pub fn register<K: Reconcilable>(resource: &mut K, token: &str) -> bool {
    if is_registered(resource, token) {
        return false;
    }
    resource.obligations_mut().push(token.to_string());
    true
}

/// Remove `token` from the obligation set
///
/// Returns `true` if the set changed; discharging an absent token is a no-op.
pub fn discharge<K: Reconcilable>(resource: &mut K, token: &str) -> bool {
    if !is_registered(resource, token) {
        return false;
    }
    resource.obligations_mut().retain(|f| f != token);
    true
}

#[must_use]
pub fn is_registered<K: Reconcilable>(resource: &K, token: &str) -> bool {
    resource.obligations().iter().any(|f| f == token)
}

/// Whether any of the `owned` tokens is still outstanding
#[must_use]
pub fn has_pending<K: Reconcilable>(resource: &K, owned: &[&str]) -> bool {
    owned.iter().any(|token| is_registered(resource, token))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Declaration, DeclarationSpec};

    const TOKEN: &str = "reconcile.octopilot.io/target-cleanup";

    fn declaration() -> Declaration {
        Declaration::new(
            "config",
            DeclarationSpec {
                scope: "team-a".to_string(),
                entries: Default::default(),
                drift_check_interval: None,
                suspend: false,
            },
        )
    }

    #[test]
    fn test_register_is_idempotent() {
        let mut resource = declaration();
        assert!(register(&mut resource, TOKEN));
        assert!(!register(&mut resource, TOKEN));
        assert_eq!(resource.obligations(), [TOKEN.to_string()]);
    }

    #[test]
    fn test_discharge_is_idempotent() {
        let mut resource = declaration();
        assert!(!discharge(&mut resource, TOKEN));
        register(&mut resource, TOKEN);
        assert!(discharge(&mut resource, TOKEN));
        assert!(!discharge(&mut resource, TOKEN));
        assert!(resource.obligations().is_empty());
    }

    #[test]
    fn test_discharge_keeps_foreign_tokens() {
        let mut resource = declaration();
        resource.obligations_mut().push("other.io/cleanup".to_string());
        register(&mut resource, TOKEN);
        discharge(&mut resource, TOKEN);
        assert_eq!(resource.obligations(), ["other.io/cleanup".to_string()]);
    }

    #[test]
    fn test_has_pending() {
        let mut resource = declaration();
        assert!(!has_pending(&resource, &[TOKEN]));
        resource.obligations_mut().push("other.io/cleanup".to_string());
        assert!(!has_pending(&resource, &[TOKEN]));
        register(&mut resource, TOKEN);
        assert!(has_pending(&resource, &[TOKEN, "unused"]));
    }
}
