//! # Reconciliation Logic
//!
//! Orchestrator that drives one resource toward its desired state.
//!
//! Each invocation works from the current snapshot only:
//!
//! 1. Fetch the record; an absent record is already gone
//! 2. Deletion marker set: run cleanup and discharge the finalizer (`cleanup.rs`)
//! 3. Register the finalizer before any target write
//! 4. Validate against the last applied snapshot
//! 5. Converge the target incrementally (`converge.rs`)
//! 6. Record the outcome in the status block with a single write
//!
//! A stale read is never an error: the write is rejected, the pass ends,
//! and the resource is requeued immediately.

mod cleanup;
mod converge;

pub use cleanup::CleanupSet;
pub use converge::ConvergencePlan;

use crate::config::ControllerConfig;
use crate::constants::{CONDITION_READY, CONDITION_VALIDATED};
use crate::controller::reconciler::status::{
    self, now_rfc3339, RequeueScheduler, REASON_PERMANENT_FAILURE, REASON_RECONCILED,
    REASON_SUSPENDED, REASON_TRANSIENT_FAILURE, REASON_VALID, REASON_VALIDATION_FAILED,
};
use crate::controller::reconciler::types::{Outcome, Reconcilable, ReconcilerError, ResourceKey};
use crate::controller::reconciler::validation::{parse_kubernetes_duration, Validator};
use crate::controller::reconciler::{cache, finalizer};
use crate::crd::{ConditionStatus, DeclarationSpec};
use crate::observability::metrics;
use crate::provider::{ProviderError, TargetProvider};
use crate::store::{ResourceStore, StoreError};
use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Reconciler context
///
/// One instance per (resource kind, target provider) pair, built at startup
/// and shared by every reconciliation.
pub struct Reconciler<K> {
    store: Arc<dyn ResourceStore<K>>,
    provider: Arc<dyn TargetProvider>,
    validator: Validator,
    scheduler: RequeueScheduler,
    finalizer_name: String,
    deadline: Duration,
    drift_check_interval: Option<Duration>,
}

impl<K> std::fmt::Debug for Reconciler<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("provider", &self.provider.name())
            .field("finalizer_name", &self.finalizer_name)
            .field("deadline", &self.deadline)
            .field("drift_check_interval", &self.drift_check_interval)
            .finish_non_exhaustive()
    }
}

impl<K: Reconcilable> Reconciler<K> {
    #[must_use]
    pub fn new(
        store: Arc<dyn ResourceStore<K>>,
        provider: Arc<dyn TargetProvider>,
        config: &ControllerConfig,
    ) -> Self {
        Self {
            store,
            provider,
            validator: Validator::new(config.validation_limits()),
            scheduler: RequeueScheduler::new(config.backoff()),
            finalizer_name: config.finalizer_name.clone(),
            deadline: config.reconcile_deadline(),
            drift_check_interval: config.drift_check_interval,
        }
    }

    #[must_use]
    pub fn validator(&self) -> &Validator {
        &self.validator
    }

    #[must_use]
    pub fn finalizer_name(&self) -> &str {
        &self.finalizer_name
    }

    /// Retry interval for failures that carry no delay of their own
    #[must_use]
    pub fn base_interval(&self) -> Duration {
        self.scheduler.base_interval()
    }

    /// Reconcile the resource identified by `key`
    ///
    /// # Errors
    /// Returns a [`ReconcilerError`] after the failure has been recorded in
    /// the status block (storage failures excepted, they cannot be recorded)
    pub async fn reconcile(&self, key: &ResourceKey) -> Result<Outcome, ReconcilerError> {
        let start = Instant::now();
        let span = info_span!(
            "reconcile",
            resource.namespace = key.namespace.as_str(),
            resource.name = key.name.as_str(),
            provider = self.provider.name()
        );

        metrics::increment_reconciliations();
        let result = self.reconcile_once(key).instrument(span).await;
        metrics::observe_reconciliation_duration(start.elapsed().as_secs_f64());

        match &result {
            Ok(Outcome::Done) => debug!("Reconciliation of {} complete", key),
            Ok(outcome) => metrics::increment_requeues(outcome.as_str()),
            Err(e) => {
                metrics::increment_reconciliation_errors(e.kind());
                if matches!(e, ReconcilerError::Transient { .. }) {
                    metrics::increment_requeues("backoff");
                }
            }
        }
        result
    }

    async fn reconcile_once(&self, key: &ResourceKey) -> Result<Outcome, ReconcilerError> {
        let resource = match self.store.get(key).await {
            Ok(Some(resource)) => resource,
            Ok(None) => {
                debug!("Resource {} no longer exists, nothing to do", key);
                return Ok(Outcome::Done);
            }
            Err(e) => return handle_store_error(e),
        };

        if resource.deletion_requested() {
            return self.finalize(resource).await;
        }
        self.apply(resource).await
    }

    /// Normal branch: converge the target toward the desired state
    async fn apply(&self, resource: K) -> Result<Outcome, ReconcilerError> {
        let key = resource.key();

        // The obligation must be durable before anything is created
        let resource = if finalizer::is_registered(&resource, &self.finalizer_name) {
            resource
        } else {
            let mut working = resource;
            finalizer::register(&mut working, &self.finalizer_name);
            info!("Registering finalizer {} on {}", self.finalizer_name, key);
            match self.store.update(&working).await {
                Ok(stored) => stored,
                Err(e) => return handle_store_error(e),
            }
        };

        let mut working = resource.clone();
        let desired = working.desired().clone();
        let previous = cache::previous_spec(&working).cloned();
        let now = now_rfc3339();
        status::set_observed_generation(&mut working);

        if let Err(e) = self.validator.validate(&desired, previous.as_ref(), false) {
            warn!("Desired state of {} rejected: {}", key, e);
            metrics::increment_validation_rejections();
            let message = e.to_string();
            status::set_condition(
                &mut working,
                CONDITION_VALIDATED,
                ConditionStatus::False,
                e.reason(),
                &message,
                &now,
            );
            status::set_condition(
                &mut working,
                CONDITION_READY,
                ConditionStatus::False,
                REASON_VALIDATION_FAILED,
                "Desired state is invalid and will not be applied until it is corrected",
                &now,
            );
            // Not retried: only a new desired state can fix it
            return self
                .persist_status(&resource, &working)
                .await
                .map(|()| Outcome::Done)
                .or_else(handle_store_error);
        }
        status::set_condition(
            &mut working,
            CONDITION_VALIDATED,
            ConditionStatus::True,
            REASON_VALID,
            "Desired state is valid",
            &now,
        );

        if desired.suspend {
            info!("Reconciliation suspended for {}", key);
            status::set_condition(
                &mut working,
                CONDITION_READY,
                ConditionStatus::False,
                REASON_SUSPENDED,
                "Reconciliation is suspended, the target is not being converged",
                &now,
            );
            return self
                .persist_status(&resource, &working)
                .await
                .map(|()| Outcome::Done)
                .or_else(handle_store_error);
        }

        if cache::is_current(&working) {
            debug!("Desired state of {} unchanged since last apply, checking for drift", key);
        }

        let pending = cache::pending_in(&working, &desired.scope).cloned();
        let mut written = BTreeSet::new();
        let converged = self
            .within_deadline(self.converge(
                previous.as_ref(),
                pending.as_ref(),
                &desired,
                &mut written,
            ))
            .await;

        match converged {
            Ok(attributes) => {
                cache::set(&mut working, &desired, &now);
                cache::clear_pending(&mut working, &desired.scope);
                self.scheduler.record_success(&mut working);
                status::set_observed_attributes(&mut working, attributes);
                status::set_condition(
                    &mut working,
                    CONDITION_READY,
                    ConditionStatus::True,
                    REASON_RECONCILED,
                    &format!(
                        "Applied {} entries to scope {}",
                        desired.entries.len(),
                        desired.scope
                    ),
                    &now,
                );
                if let Err(e) = self.persist_status(&resource, &working).await {
                    return handle_store_error(e);
                }
                Ok(RequeueScheduler::after_success(
                    self.drift_check_interval(&desired),
                ))
            }
            Err(e) => {
                // Keys this pass may have written stay owned until a pass completes
                cache::mark_pending(&mut working, &desired.scope, written);
                self.record_failure(&resource, working, e, &now).await
            }
        }
    }

    /// Observe the scope, then apply the incremental plan
    ///
    /// Keys the plan writes are added to `written` before the first write.
    /// Returns the observed target attributes on success.
    async fn converge(
        &self,
        previous: Option<&DeclarationSpec>,
        pending: Option<&BTreeSet<String>>,
        desired: &DeclarationSpec,
        written: &mut BTreeSet<String>,
    ) -> Result<BTreeMap<String, String>, ProviderError> {
        let provider = self.provider.as_ref();
        let observation =
            call_provider(provider, "observe", provider.observe(&desired.scope)).await?;
        let plan =
            ConvergencePlan::compute(previous, pending, desired, Some(&observation.items));
        written.extend(plan.written_keys().cloned());
        plan.execute(provider, &desired.scope).await?;

        let mut attributes = observation.attributes;
        attributes.insert(
            "managedEntries".to_string(),
            desired.entries.len().to_string(),
        );
        Ok(attributes)
    }

    /// Record a provider failure and turn it into the matching error
    async fn record_failure(
        &self,
        original: &K,
        mut working: K,
        failure: ProviderError,
        now: &str,
    ) -> Result<Outcome, ReconcilerError> {
        let retry_after = self.scheduler.record_failure(&mut working, now);
        let (reason, error) = if failure.is_permanent() {
            error!("Permanent target failure for {}: {}", original.key(), failure);
            (
                REASON_PERMANENT_FAILURE,
                ReconcilerError::Permanent(failure.message().to_string()),
            )
        } else {
            warn!(
                "Target failure for {}: {} (retrying in {}s)",
                original.key(),
                failure,
                retry_after.as_secs()
            );
            (
                REASON_TRANSIENT_FAILURE,
                ReconcilerError::Transient {
                    message: failure.message().to_string(),
                    retry_after,
                },
            )
        };
        status::set_condition(
            &mut working,
            CONDITION_READY,
            ConditionStatus::False,
            reason,
            failure.message(),
            now,
        );

        if let Err(e) = self.persist_status(original, &working).await {
            return handle_store_error(e);
        }
        Err(error)
    }

    /// Write the status block if it changed
    async fn persist_status(&self, original: &K, working: &K) -> Result<(), StoreError> {
        if original.status() == working.status() {
            debug!("Status of {} unchanged, skipping update", original.key());
            return Ok(());
        }
        self.store.update_status(working).await.map(|_| ())
    }

    /// Run target calls under the per-invocation deadline
    ///
    /// An elapsed deadline counts as a transient failure.
    async fn within_deadline<T>(
        &self,
        work: impl Future<Output = Result<T, ProviderError>>,
    ) -> Result<T, ProviderError> {
        tokio::time::timeout(self.deadline, work)
            .await
            .unwrap_or_else(|_| {
                Err(ProviderError::Transient(format!(
                    "Target calls did not finish within the {}s deadline",
                    self.deadline.as_secs()
                )))
            })
    }

    /// Periodic re-verification interval for `desired`
    fn drift_check_interval(&self, desired: &DeclarationSpec) -> Option<Duration> {
        match &desired.drift_check_interval {
            Some(interval) => match parse_kubernetes_duration(interval) {
                Ok(duration) => Some(duration),
                Err(e) => {
                    metrics::increment_duration_parsing_errors();
                    warn!("Ignoring driftCheckInterval '{}': {}", interval, e);
                    self.drift_check_interval
                }
            },
            None => self.drift_check_interval,
        }
    }
}

/// Map a storage failure to the pass outcome
///
/// Conflicts mean the read was stale: retry right away without backoff.
/// A record purged between read and write needs nothing more.
fn handle_store_error(error: StoreError) -> Result<Outcome, ReconcilerError> {
    match error {
        StoreError::Conflict(key) => {
            info!("Write to {} conflicted with a newer version, requeueing", key);
            metrics::increment_store_conflicts();
            Ok(Outcome::RequeueNow)
        }
        StoreError::NotFound(key) => {
            debug!("Resource {} disappeared during reconciliation", key);
            Ok(Outcome::Done)
        }
        other => Err(ReconcilerError::Store(other)),
    }
}

/// Call the target provider, recording duration and errors
pub(super) async fn call_provider<T>(
    provider: &dyn TargetProvider,
    operation: &str,
    call: impl Future<Output = Result<T, ProviderError>>,
) -> Result<T, ProviderError> {
    let start = Instant::now();
    let result = call.await;
    metrics::record_provider_operation(
        provider.name(),
        operation,
        start.elapsed().as_secs_f64(),
    );
    if result.is_err() {
        metrics::increment_provider_operation_errors(provider.name(), operation);
    }
    result
}
