//! # Declaration Spec
//!
//! Main CRD specification types and default values.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Declaration Custom Resource Definition
///
/// Declares a set of key/value entries that must exist under `scope` in the
/// target environment. The controller converges the target toward this set
/// and removes everything it created once the resource is deleted.
///
/// # Example
///
/// ```yaml
/// apiVersion: reconcile.octopilot.io/v1beta1
/// kind: Declaration
/// metadata:
///   name: payments-config
///   namespace: default
/// spec:
///   scope: payments/prod
///   entries:
///     DATABASE_HOST: db.internal
///     FEATURE_FLAGS: "checkout,refunds"
///   driftCheckInterval: 10m
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Declaration",
    group = "reconcile.octopilot.io",
    version = "v1beta1",
    namespaced,
    status = "crate::crd::DeclarationStatus",
    shortname = "decl",
    derive = "PartialEq",
    printcolumn = r#"{"name":"Scope", "type":"string", "jsonPath":".spec.scope"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeclarationSpec {
    /// Scope inside the target environment owning every entry of this declaration
    /// Path-like, lowercase (e.g., "payments/prod")
    /// Immutable once the declaration has been applied successfully
    pub scope: String,
    /// Declared key/value entries
    #[serde(default)]
    pub entries: BTreeMap<String, String>,
    /// Periodic re-verification interval
    /// Format: Kubernetes duration string (e.g., "1m", "5m", "1h")
    /// Minimum: 1m. When unset the controller-wide default applies.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_check_interval: Option<String>,
    /// Suspend reconciliation
    /// When true, no convergence happens. Deletion is still processed.
    #[serde(default = "default_false")]
    pub suspend: bool,
}

#[must_use]
pub fn default_false() -> bool {
    false
}
