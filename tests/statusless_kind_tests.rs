//! # Statusless Kind Tests
//!
//! Resource kinds without a status block cannot persist failure history,
//! so every failure waits the base interval.

mod common;

use common::{declaration, deletion_time, spec, Harness};
use declaration_controller::config::ControllerConfig;
use declaration_controller::constants::DEFAULT_FINALIZER_NAME;
use declaration_controller::controller::reconciler::{
    Outcome, Reconcilable, ReconcilerError, ResourceKey,
};
use declaration_controller::crd::{Declaration, DeclarationSpec, DeclarationStatus};
use declaration_controller::provider::ProviderError;
use std::time::Duration;

/// A kind that only carries metadata and desired state
#[derive(Debug, Clone)]
struct Bare(Declaration);

impl Reconcilable for Bare {
    fn key(&self) -> ResourceKey {
        self.0.key()
    }

    fn generation(&self) -> Option<i64> {
        self.0.generation()
    }

    fn resource_version(&self) -> Option<&str> {
        self.0.resource_version()
    }

    fn set_resource_version(&mut self, version: String) {
        self.0.set_resource_version(version);
    }

    fn deletion_requested(&self) -> bool {
        self.0.deletion_requested()
    }

    fn obligations(&self) -> &[String] {
        self.0.obligations()
    }

    fn obligations_mut(&mut self) -> &mut Vec<String> {
        self.0.obligations_mut()
    }

    fn desired(&self) -> &DeclarationSpec {
        &self.0.spec
    }

    fn status(&self) -> Option<&DeclarationStatus> {
        None
    }

    fn status_mut(&mut self) -> Option<&mut DeclarationStatus> {
        None
    }

    fn replace_status(&mut self, _status: Option<DeclarationStatus>) {}
}

fn harness() -> Harness<Bare> {
    let config = ControllerConfig {
        backoff_base_secs: 2,
        ..ControllerConfig::default()
    };
    Harness::with_config(&config)
}

#[tokio::test]
async fn test_failures_use_fixed_base_interval() {
    let harness = harness();
    let key = harness
        .store
        .insert(Bare(declaration("payments", spec("payments/prod", &[("A", "1")]))))
        .key();

    for _ in 0..3 {
        harness
            .target
            .fail_next(ProviderError::Transient("timeout".to_string()));
        match harness.reconciler.reconcile(&key).await {
            Err(ReconcilerError::Transient { retry_after, .. }) => {
                assert_eq!(retry_after, Duration::from_secs(2));
            }
            other => panic!("expected transient failure, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn test_statusless_kind_converges_and_cleans_up() {
    let harness = harness();
    let key = harness
        .store
        .insert(Bare(declaration(
            "payments",
            spec("payments/prod", &[("A", "1"), ("B", "2")]),
        )))
        .key();

    let outcome = harness.reconciler.reconcile(&key).await.unwrap();
    assert_eq!(outcome, Outcome::Done);
    assert_eq!(harness.target.entries("payments/prod").len(), 2);
    assert_eq!(
        harness.store.snapshot(&key).unwrap().obligations(),
        [DEFAULT_FINALIZER_NAME.to_string()]
    );

    harness
        .store
        .modify(&key, |b| b.0.metadata.deletion_timestamp = Some(deletion_time()));
    harness.reconciler.reconcile(&key).await.unwrap();

    // Without a snapshot the current desired entries are what gets removed
    assert!(harness.target.entries("payments/prod").is_empty());
    assert!(harness.store.snapshot(&key).is_none());
}
