//! # Declaration Validation
//!
//! Field and transition rules for `DeclarationSpec`.

use super::duration::validate_duration_interval;
use crate::constants::{
    DEFAULT_MAX_ENTRIES_PER_RESOURCE, DEFAULT_MAX_VALUE_SIZE_BYTES, MAX_NAME_LENGTH,
    MIN_DRIFT_CHECK_INTERVAL_SECS,
};
use crate::crd::DeclarationSpec;
use regex::Regex;
use std::sync::LazyLock;
use std::time::Duration;
use thiserror::Error;

// Lowercase alphanumeric segments joined by '/', '-', '_' or '.'
static SCOPE_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-z0-9]+([/._-][a-z0-9]+)*$")
        .expect("Failed to compile SCOPE_PATTERN - this should never happen")
});

static KEY_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9._-]+$")
        .expect("Failed to compile KEY_PATTERN - this should never happen")
});

/// Why a desired state was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("spec.scope is required but is empty")]
    EmptyScope,
    #[error("spec.scope '{scope}' must be lowercase alphanumeric segments separated by '/', '-', '_' or '.'")]
    InvalidScope { scope: String },
    #[error("spec.scope exceeds maximum length of {max} characters (got {length})")]
    ScopeTooLong { length: usize, max: usize },
    #[error("spec.scope cannot change from '{previous}' to '{candidate}' after it has been applied")]
    ScopeChanged { previous: String, candidate: String },
    #[error("spec.entries key '{key}' must contain only letters, digits, '.', '_' or '-'")]
    InvalidKey { key: String },
    #[error("spec.entries key '{key}...' exceeds maximum length of {max} characters")]
    KeyTooLong { key: String, max: usize },
    #[error("spec.entries has {count} entries, maximum is {max}")]
    TooManyEntries { count: usize, max: usize },
    #[error("spec.entries value for '{key}' is {size} bytes, maximum is {max}")]
    ValueTooLarge { key: String, size: usize, max: usize },
    #[error("invalid spec.driftCheckInterval: {0}")]
    InvalidDriftCheckInterval(String),
}

impl ValidationError {
    /// Condition reason recorded on the resource
    #[must_use]
    pub fn reason(&self) -> &'static str {
        match self {
            ValidationError::ScopeChanged { .. } => "ImmutableFieldChanged",
            ValidationError::TooManyEntries { .. } | ValidationError::ValueTooLarge { .. } => {
                "LimitExceeded"
            }
            _ => "InvalidSpec",
        }
    }
}

/// Size limits enforced on a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationLimits {
    pub max_entries: usize,
    pub max_value_bytes: usize,
    pub min_drift_check_interval: Duration,
}

impl Default for ValidationLimits {
    fn default() -> Self {
        Self {
            max_entries: DEFAULT_MAX_ENTRIES_PER_RESOURCE,
            max_value_bytes: DEFAULT_MAX_VALUE_SIZE_BYTES,
            min_drift_check_interval: Duration::from_secs(MIN_DRIFT_CHECK_INTERVAL_SECS),
        }
    }
}

/// Pure predicate over (candidate, previous, deleting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Validator {
    limits: ValidationLimits,
}

impl Validator {
    #[must_use]
    pub fn new(limits: ValidationLimits) -> Self {
        Self { limits }
    }

    #[must_use]
    pub fn limits(&self) -> ValidationLimits {
        self.limits
    }

    /// Accept or reject `candidate`
    ///
    /// `previous` is the last successfully applied desired state, if any.
    /// A candidate that is being deleted is always accepted so cleanup can
    /// never be blocked.
    ///
    /// # Errors
    /// Returns the first rule the candidate violates
    pub fn validate(
        &self,
        candidate: &DeclarationSpec,
        previous: Option<&DeclarationSpec>,
        deleting: bool,
    ) -> Result<(), ValidationError> {
        if deleting {
            return Ok(());
        }

        validate_scope(&candidate.scope)?;
        self.validate_entries(candidate)?;

        if let Some(interval) = &candidate.drift_check_interval {
            validate_duration_interval(
                interval,
                "driftCheckInterval",
                self.limits.min_drift_check_interval.as_secs(),
            )
            .map_err(|e| ValidationError::InvalidDriftCheckInterval(e.to_string()))?;
        }

        if let Some(previous) = previous {
            if previous.scope != candidate.scope {
                return Err(ValidationError::ScopeChanged {
                    previous: previous.scope.clone(),
                    candidate: candidate.scope.clone(),
                });
            }
        }

        Ok(())
    }

    fn validate_entries(&self, candidate: &DeclarationSpec) -> Result<(), ValidationError> {
        if candidate.entries.len() > self.limits.max_entries {
            return Err(ValidationError::TooManyEntries {
                count: candidate.entries.len(),
                max: self.limits.max_entries,
            });
        }

        for (key, value) in &candidate.entries {
            if key.len() > MAX_NAME_LENGTH {
                return Err(ValidationError::KeyTooLong {
                    key: key.chars().take(32).collect(),
                    max: MAX_NAME_LENGTH,
                });
            }
            if !KEY_PATTERN.is_match(key) {
                return Err(ValidationError::InvalidKey { key: key.clone() });
            }
            if value.len() > self.limits.max_value_bytes {
                return Err(ValidationError::ValueTooLarge {
                    key: key.clone(),
                    size: value.len(),
                    max: self.limits.max_value_bytes,
                });
            }
        }

        Ok(())
    }
}

fn validate_scope(scope: &str) -> Result<(), ValidationError> {
    if scope.is_empty() {
        return Err(ValidationError::EmptyScope);
    }
    if scope.len() > MAX_NAME_LENGTH {
        return Err(ValidationError::ScopeTooLong {
            length: scope.len(),
            max: MAX_NAME_LENGTH,
        });
    }
    if !SCOPE_PATTERN.is_match(scope) {
        return Err(ValidationError::InvalidScope {
            scope: scope.to_string(),
        });
    }
    Ok(())
}
