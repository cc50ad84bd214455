//! # Metrics
//!
//! Prometheus metrics for monitoring the controller.
//!
//! ## Metrics Exposed
//!
//! - `declaration_controller_reconciliations_total` - Total number of reconciliations
//! - `declaration_controller_reconciliation_errors_total` - Reconciliation errors by kind
//! - `declaration_controller_reconciliation_duration_seconds` - Duration of reconciliation operations
//! - `declaration_controller_requeues_total` - Requeues by reason
//! - `declaration_controller_validation_rejections_total` - Desired states rejected by the validator
//! - `declaration_controller_store_conflicts_total` - Stale-read write conflicts
//! - `declaration_controller_cleanups_total` - Completed deletion cleanups
//! - `declaration_controller_duration_parsing_errors_total` - Invalid driftCheckInterval values
//! - `declaration_controller_provider_operations_total` - Target operations by provider and operation
//! - `declaration_controller_provider_operation_duration_seconds` - Duration of target operations
//! - `declaration_controller_provider_operation_errors_total` - Failed target operations

use anyhow::Result;
use prometheus::{Histogram, HistogramVec, IntCounter, IntCounterVec, Registry};
use std::sync::LazyLock;

// Metrics
pub(crate) static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

static RECONCILIATIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "declaration_controller_reconciliations_total",
        "Total number of reconciliations",
    )
    .expect("Failed to create RECONCILIATIONS_TOTAL metric - this should never happen")
});

static RECONCILIATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "declaration_controller_reconciliation_errors_total",
            "Total number of reconciliation errors by error kind",
        ),
        &["kind"],
    )
    .expect("Failed to create RECONCILIATION_ERRORS_TOTAL metric - this should never happen")
});

static RECONCILIATION_DURATION: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        prometheus::HistogramOpts::new(
            "declaration_controller_reconciliation_duration_seconds",
            "Duration of reconciliation in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0, 30.0]),
    )
    .expect("Failed to create RECONCILIATION_DURATION metric - this should never happen")
});

static REQUEUES_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "declaration_controller_requeues_total",
            "Total number of requeues by reason",
        ),
        &["reason"],
    )
    .expect("Failed to create REQUEUES_TOTAL metric - this should never happen")
});

static VALIDATION_REJECTIONS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "declaration_controller_validation_rejections_total",
        "Total number of desired states rejected by validation",
    )
    .expect("Failed to create VALIDATION_REJECTIONS_TOTAL metric - this should never happen")
});

static STORE_CONFLICTS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "declaration_controller_store_conflicts_total",
        "Total number of writes rejected because the read was stale",
    )
    .expect("Failed to create STORE_CONFLICTS_TOTAL metric - this should never happen")
});

static CLEANUPS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "declaration_controller_cleanups_total",
        "Total number of completed deletion cleanups",
    )
    .expect("Failed to create CLEANUPS_TOTAL metric - this should never happen")
});

static DURATION_PARSING_ERRORS_TOTAL: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "declaration_controller_duration_parsing_errors_total",
        "Total number of duration parsing errors (driftCheckInterval parsing failures)",
    )
    .expect("Failed to create DURATION_PARSING_ERRORS_TOTAL metric - this should never happen")
});

// Provider-specific metrics with provider and operation labels
static PROVIDER_OPERATIONS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "declaration_controller_provider_operations_total",
            "Total number of target provider operations",
        ),
        &["provider", "operation"],
    )
    .expect("Failed to create PROVIDER_OPERATIONS_TOTAL metric - this should never happen")
});

static PROVIDER_OPERATION_DURATION: LazyLock<HistogramVec> = LazyLock::new(|| {
    HistogramVec::new(
        prometheus::HistogramOpts::new(
            "declaration_controller_provider_operation_duration_seconds",
            "Duration of target provider operations in seconds",
        )
        .buckets(vec![0.1, 0.5, 1.0, 2.0, 5.0, 10.0]),
        &["provider", "operation"],
    )
    .expect("Failed to create PROVIDER_OPERATION_DURATION metric - this should never happen")
});

static PROVIDER_OPERATION_ERRORS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        prometheus::Opts::new(
            "declaration_controller_provider_operation_errors_total",
            "Total number of failed target provider operations",
        ),
        &["provider", "operation"],
    )
    .expect("Failed to create PROVIDER_OPERATION_ERRORS_TOTAL metric - this should never happen")
});

#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn register_metrics() -> Result<()> {
    REGISTRY.register(Box::new(RECONCILIATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(RECONCILIATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(REQUEUES_TOTAL.clone()))?;
    REGISTRY.register(Box::new(VALIDATION_REJECTIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(STORE_CONFLICTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CLEANUPS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(DURATION_PARSING_ERRORS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATIONS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_DURATION.clone()))?;
    REGISTRY.register(Box::new(PROVIDER_OPERATION_ERRORS_TOTAL.clone()))?;

    Ok(())
}

/// Render every registered metric in the Prometheus text format
#[allow(
    clippy::missing_errors_doc,
    reason = "Error documentation is provided in doc comments"
)]
pub fn gather_metrics() -> Result<String> {
    use prometheus::Encoder;

    let encoder = prometheus::TextEncoder::new();
    let mut buffer = Vec::new();
    encoder.encode(&REGISTRY.gather(), &mut buffer)?;
    Ok(String::from_utf8(buffer)?)
}

pub fn increment_reconciliations() {
    RECONCILIATIONS_TOTAL.inc();
}

pub fn increment_reconciliation_errors(kind: &str) {
    RECONCILIATION_ERRORS_TOTAL.with_label_values(&[kind]).inc();
}

pub fn observe_reconciliation_duration(duration: f64) {
    RECONCILIATION_DURATION.observe(duration);
}

pub fn increment_requeues(reason: &str) {
    REQUEUES_TOTAL.with_label_values(&[reason]).inc();
}

pub fn increment_validation_rejections() {
    VALIDATION_REJECTIONS_TOTAL.inc();
}

pub fn increment_store_conflicts() {
    STORE_CONFLICTS_TOTAL.inc();
}

pub fn increment_cleanups() {
    CLEANUPS_TOTAL.inc();
}

pub fn increment_duration_parsing_errors() {
    DURATION_PARSING_ERRORS_TOTAL.inc();
}

/// Record a completed target provider operation
pub fn record_provider_operation(provider: &str, operation: &str, duration: f64) {
    PROVIDER_OPERATIONS_TOTAL
        .with_label_values(&[provider, operation])
        .inc();
    PROVIDER_OPERATION_DURATION
        .with_label_values(&[provider, operation])
        .observe(duration);
}

/// Increment provider operation errors counter
pub fn increment_provider_operation_errors(provider: &str, operation: &str) {
    PROVIDER_OPERATION_ERRORS_TOTAL
        .with_label_values(&[provider, operation])
        .inc();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_metrics() {
        // This should not panic - metrics should register successfully
        assert!(register_metrics().is_ok());
        let rendered = gather_metrics().unwrap();
        assert!(rendered.contains("declaration_controller_reconciliations_total"));
    }

    #[test]
    fn test_increment_reconciliations() {
        let before = RECONCILIATIONS_TOTAL.get();
        increment_reconciliations();
        let after = RECONCILIATIONS_TOTAL.get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_reconciliation_errors_by_kind() {
        let before = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["permanent"])
            .get();
        increment_reconciliation_errors("permanent");
        let after = RECONCILIATION_ERRORS_TOTAL
            .with_label_values(&["permanent"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_observe_reconciliation_duration() {
        observe_reconciliation_duration(1.5);
        // Just verify it doesn't panic - histogram observation doesn't return a value
    }

    #[test]
    fn test_increment_requeues() {
        let before = REQUEUES_TOTAL.with_label_values(&["backoff"]).get();
        increment_requeues("backoff");
        let after = REQUEUES_TOTAL.with_label_values(&["backoff"]).get();
        assert!(after > before);
    }

    #[test]
    fn test_record_provider_operation() {
        let before = PROVIDER_OPERATIONS_TOTAL
            .with_label_values(&["http", "create"])
            .get();
        record_provider_operation("http", "create", 0.3);
        let after = PROVIDER_OPERATIONS_TOTAL
            .with_label_values(&["http", "create"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_provider_operation_errors() {
        let before = PROVIDER_OPERATION_ERRORS_TOTAL
            .with_label_values(&["http", "delete"])
            .get();
        increment_provider_operation_errors("http", "delete");
        let after = PROVIDER_OPERATION_ERRORS_TOTAL
            .with_label_values(&["http", "delete"])
            .get();
        assert!(after > before);
    }

    #[test]
    fn test_increment_duration_parsing_errors() {
        let before = DURATION_PARSING_ERRORS_TOTAL.get();
        increment_duration_parsing_errors();
        let after = DURATION_PARSING_ERRORS_TOTAL.get();
        assert!(after > before);
    }
}
