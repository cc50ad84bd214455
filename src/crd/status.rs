//! # Declaration Status
//!
//! Status types for tracking reconciliation state and conditions.

use crate::crd::DeclarationSpec;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Status of the Declaration resource
///
/// Owned by the controller. Written once per reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, Default, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationStatus {
    /// Conditions represent the latest available observations, one per type
    #[serde(default)]
    pub conditions: Vec<Condition>,
    /// Generation of the spec the conditions refer to
    #[serde(default)]
    pub observed_generation: Option<i64>,
    /// Last desired state that was fully and successfully applied
    #[serde(default)]
    pub last_applied: Option<AppliedSnapshot>,
    /// Free-form attributes observed in the target environment
    /// Examples: endpoint URL, scope URL, entry count
    #[serde(default)]
    pub observed: BTreeMap<String, String>,
    /// Consecutive failed reconciliations since the last success
    #[serde(default)]
    pub failure_count: u32,
    /// Time of the most recent failed reconciliation (RFC3339)
    #[serde(default)]
    pub last_failure_time: Option<String>,
    /// Keys written by passes that failed before completing, grouped by scope
    ///
    /// They are owned like applied keys until a successful pass over their
    /// scope folds them into `lastApplied`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub pending_keys: BTreeMap<String, BTreeSet<String>>,
}

/// Snapshot of a successfully applied desired state
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct AppliedSnapshot {
    /// The applied spec
    pub spec: DeclarationSpec,
    /// When the snapshot was applied (RFC3339)
    pub applied_at: String,
}

/// Tri-state condition value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

impl ConditionStatus {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionStatus::True => "True",
            ConditionStatus::False => "False",
            ConditionStatus::Unknown => "Unknown",
        }
    }
}

impl From<bool> for ConditionStatus {
    fn from(value: bool) -> Self {
        if value {
            ConditionStatus::True
        } else {
            ConditionStatus::False
        }
    }
}

/// Condition represents a condition of a resource
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition
    pub r#type: String,
    /// Status of the condition (True, False, Unknown)
    pub status: ConditionStatus,
    /// Last time the status value changed (RFC3339)
    #[serde(default)]
    pub last_transition_time: Option<String>,
    /// Machine-readable reason for the condition
    #[serde(default)]
    pub reason: Option<String>,
    /// Message describing the condition
    #[serde(default)]
    pub message: Option<String>,
}

impl DeclarationStatus {
    /// Look up the condition of the given type
    #[must_use]
    pub fn condition(&self, kind: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == kind)
    }
}
