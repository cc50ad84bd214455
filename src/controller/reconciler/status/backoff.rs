//! # Requeue Scheduling
//!
//! Turns the failure history on the status block into a retry delay.

use crate::controller::backoff::ExponentialBackoff;
use crate::controller::reconciler::types::{Outcome, Reconcilable};
use std::time::Duration;

/// Decides when a resource is reconciled again
///
/// The consecutive failure count lives in the status block, so the delay
/// survives controller restarts. Kinds without a status block always wait
/// the base interval.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequeueScheduler {
    backoff: ExponentialBackoff,
}

impl RequeueScheduler {
    #[must_use]
    pub fn new(backoff: ExponentialBackoff) -> Self {
        Self { backoff }
    }

    #[must_use]
    pub fn base_interval(&self) -> Duration {
        self.backoff.base()
    }

    /// Record one more consecutive failure and return the delay before the retry
    pub fn record_failure<K: Reconcilable>(&self, resource: &mut K, now: &str) -> Duration {
        match resource.status_mut() {
            Some(status) => {
                status.failure_count = status.failure_count.saturating_add(1);
                status.last_failure_time = Some(now.to_string());
                self.backoff.delay_for(status.failure_count)
            }
            None => self.backoff.base(),
        }
    }

    /// Clear the failure history after a successful pass
    pub fn record_success<K: Reconcilable>(&self, resource: &mut K) {
        if let Some(status) = resource.status_mut() {
            status.failure_count = 0;
            status.last_failure_time = None;
        }
    }

    /// Outcome of a successful pass
    ///
    /// Steady state waits for the next change unless periodic
    /// re-verification is configured.
    #[must_use]
    pub fn after_success(drift_check_interval: Option<Duration>) -> Outcome {
        drift_check_interval.map_or(Outcome::Done, Outcome::RequeueAfter)
    }
}
