//! # Status Management
//!
//! Condition tracking, observed attributes and failure history.
//!
//! Every helper edits the in-memory status block only. The orchestrator
//! persists the whole block in a single write at the end of a pass, and
//! skips the write when nothing changed.

mod backoff;

pub use backoff::RequeueScheduler;

use crate::controller::reconciler::types::Reconcilable;
use crate::crd::{Condition, ConditionStatus};
use std::collections::BTreeMap;

pub const REASON_VALID: &str = "Valid";
pub const REASON_RECONCILED: &str = "Reconciled";
pub const REASON_SUSPENDED: &str = "Suspended";
pub const REASON_TRANSIENT_FAILURE: &str = "TargetUnavailable";
pub const REASON_PERMANENT_FAILURE: &str = "TargetRejected";
pub const REASON_VALIDATION_FAILED: &str = "ValidationFailed";

/// Current UTC time in RFC3339, the format used for every status timestamp
#[must_use]
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Set the condition of type `kind`, replacing any existing entry of that type
///
/// `lastTransitionTime` only moves when the status value changes.
/// Returns `true` if the condition changed. Kinds without a status block
/// ignore the call.
pub fn set_condition<K: Reconcilable>(
    resource: &mut K,
    kind: &str,
    status: ConditionStatus,
    reason: &str,
    message: &str,
    now: &str,
) -> bool {
    let Some(block) = resource.status_mut() else {
        return false;
    };

    let last_transition_time = match block.condition(kind) {
        Some(existing) if existing.status == status => existing.last_transition_time.clone(),
        _ => Some(now.to_string()),
    };
    let condition = Condition {
        r#type: kind.to_string(),
        status,
        last_transition_time,
        reason: Some(reason.to_string()),
        message: Some(message.to_string()),
    };

    match block.conditions.iter_mut().find(|c| c.r#type == kind) {
        Some(existing) if *existing == condition => false,
        Some(existing) => {
            *existing = condition;
            true
        }
        None => {
            block.conditions.push(condition);
            true
        }
    }
}

/// Replace the observed target attributes
pub fn set_observed_attributes<K: Reconcilable>(
    resource: &mut K,
    attributes: BTreeMap<String, String>,
) {
    if let Some(block) = resource.status_mut() {
        block.observed = attributes;
    }
}

/// Record that the conditions describe the current generation
pub fn set_observed_generation<K: Reconcilable>(resource: &mut K) {
    let generation = resource.generation();
    if let Some(block) = resource.status_mut() {
        block.observed_generation = generation;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::{CONDITION_READY, CONDITION_VALIDATED};
    use crate::crd::{Declaration, DeclarationSpec};

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

    fn ready(resource: &Declaration) -> Condition {
        resource
            .status
            .as_ref()
            .and_then(|s| s.condition(CONDITION_READY))
            .cloned()
            .unwrap()
    }

    #[test]
    fn test_condition_replaces_existing_kind() {
        let mut resource = declaration();
        set_condition(&mut resource, CONDITION_READY, ConditionStatus::False, "A", "a", "t1");
        set_condition(&mut resource, CONDITION_VALIDATED, ConditionStatus::True, "B", "b", "t1");
        set_condition(&mut resource, CONDITION_READY, ConditionStatus::True, "C", "c", "t2");

        let conditions = &resource.status.as_ref().unwrap().conditions;
        assert_eq!(conditions.len(), 2);
        assert_eq!(ready(&resource).reason.as_deref(), Some("C"));
    }

    #[test]
    fn test_transition_time_moves_only_on_status_change() {
        let mut resource = declaration();
        set_condition(&mut resource, CONDITION_READY, ConditionStatus::False, "Failing", "x", "t1");
        set_condition(&mut resource, CONDITION_READY, ConditionStatus::False, "Failing", "y", "t2");
        assert_eq!(ready(&resource).last_transition_time.as_deref(), Some("t1"));
        assert_eq!(ready(&resource).message.as_deref(), Some("y"));

        set_condition(&mut resource, CONDITION_READY, ConditionStatus::True, "Ok", "z", "t3");
        assert_eq!(ready(&resource).last_transition_time.as_deref(), Some("t3"));
    }

    #[test]
    fn test_identical_condition_reports_no_change() {
        let mut resource = declaration();
        assert!(set_condition(&mut resource, CONDITION_READY, ConditionStatus::True, "Ok", "m", "t1"));
        assert!(!set_condition(&mut resource, CONDITION_READY, ConditionStatus::True, "Ok", "m", "t2"));
    }

    #[test]
    fn test_observed_attributes_and_generation() {
        let mut resource = declaration();
        resource.metadata.generation = Some(4);
        set_observed_generation(&mut resource);
        set_observed_attributes(
            &mut resource,
            [("endpoint".to_string(), "memory://".to_string())].into(),
        );
        let status = resource.status.as_ref().unwrap();
        assert_eq!(status.observed_generation, Some(4));
        assert_eq!(status.observed.get("endpoint").map(String::as_str), Some("memory://"));
    }
}
