//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use crate::controller::reconciler::{Reconcilable, Reconciler, ReconcilerError};
use crate::crd::Declaration;
use kube_runtime::controller::{self, Action};
use kube_runtime::watcher;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Turn a failed reconciliation into a requeue action
///
/// The delay was already decided by the reconciler (failure history on the
/// status block); this only maps it and logs. Permanent failures wait for
/// the next change of the resource.
pub fn handle_reconciliation_error(
    obj: Arc<Declaration>,
    error: &ReconcilerError,
    ctx: Arc<Reconciler<Declaration>>,
) -> Action {
    let key = obj.key();

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.name = key.name.as_str(),
        resource.namespace = key.namespace.as_str(),
        error.kind = error.kind(),
        error = %error
    );
    let _error_guard = error_span.enter();

    let action = error.requeue_action(ctx.base_interval());
    match error {
        ReconcilerError::Permanent(_) => {
            error!(
                "Reconciliation of {} failed permanently, waiting for the declaration to change: {}",
                key, error
            );
        }
        ReconcilerError::Transient { retry_after, .. } => {
            let next_trigger_time = chrono::Utc::now()
                + chrono::Duration::from_std(*retry_after).unwrap_or(chrono::Duration::zero());
            info!(
                "Retrying {} in {}s (next attempt at {})",
                key,
                retry_after.as_secs(),
                next_trigger_time.to_rfc3339()
            );
        }
        ReconcilerError::Store(_) => {
            warn!(
                "Storage failure for {}, retrying in {}s: {}",
                key,
                ctx.base_interval().as_secs(),
                error
            );
        }
    }
    action
}

/// Error item yielded by the `Declaration` controller stream
pub type ControllerStreamError = controller::Error<ReconcilerError, watcher::Error>;

/// Extract the watch stream failure from a controller stream error
///
/// Reconcile failures were already turned into a requeue by
/// `handle_reconciliation_error` and objects that vanished from the cache
/// are retried by the next event, so neither is a stream failure and
/// both yield `None`. Queue and runner errors are rendered for
/// `classify_watch_error`.
#[must_use]
pub fn stream_failure(error: &ControllerStreamError) -> Option<String> {
    match error {
        controller::Error::ReconcilerFailed(err, object) => {
            debug!(
                resource.name = object.name.as_str(),
                error = %err,
                "watch.event.reconcile_failed"
            );
            None
        }
        controller::Error::ObjectNotFound(object) => {
            debug!(
                resource.name = object.name.as_str(),
                "watch.event.object_gone"
            );
            None
        }
        other => Some(format!("{other:?}")),
    }
}

/// Classification of a watch stream error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// 401: RBAC revoked or token expired
    Unauthorized,
    /// 410: resource version too old, normal during restarts
    Expired,
    /// 429: API server storage reinitializing
    Throttled,
    /// 404: resource deleted or CRD missing
    NotFound,
    Other,
}

/// Classify a watch error from its debug rendering
///
/// 404 is checked before 401 since a plain-text 404 body surfaces as a
/// deserialization error that mentions `WatchFailed`.
#[must_use]
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 =
        (error_string.contains("401") || error_string.contains("Unauthorized")) && !is_not_found;
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_401 {
        WatchErrorKind::Unauthorized
    } else if is_410 {
        WatchErrorKind::Expired
    } else if is_429 {
        WatchErrorKind::Throttled
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized): RBAC may have been revoked or the token expired");
            error!("Check that the controller ServiceAccount can still list and watch declarations:");
            error!("  kubectl auth can-i watch declarations.reconcile.octopilot.io --as=system:serviceaccount:<namespace>:declaration-controller --all-namespaces");
            warn!(
                "Waiting {}s before retrying watch (RBAC may need time to propagate)...",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!("Watch resource version expired (410), watch will restart");
            None
        }
        WatchErrorKind::Throttled => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            let new_backoff = current_backoff.saturating_mul(2).min(max_backoff_ms);
            backoff.store(new_backoff, Ordering::Relaxed);
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404), normal if a declaration was deleted; check the CRD is installed if this persists. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use kube_runtime::reflector::ObjectRef;

    #[test]
    fn test_reconcile_failure_is_not_a_stream_failure() {
        let object = ObjectRef::<Declaration>::new("payments")
            .within("default")
            .erase();
        let error = ControllerStreamError::ReconcilerFailed(
            ReconcilerError::Transient {
                message: "HTTP 401 Unauthorized from target".to_string(),
                retry_after: Duration::from_secs(4),
            },
            object.clone(),
        );
        assert_eq!(stream_failure(&error), None);

        let gone = ControllerStreamError::ObjectNotFound(object);
        assert_eq!(stream_failure(&gone), None);
    }

    #[test]
    fn test_queue_error_is_a_stream_failure() {
        let error = ControllerStreamError::QueueError(watcher::Error::NoResourceVersion);
        let rendered = stream_failure(&error).expect("queue errors reach the watch classifier");
        assert!(rendered.contains("NoResourceVersion"));
        assert_eq!(classify_watch_error(&rendered), WatchErrorKind::Other);
    }

    #[test]
    fn test_classify_watch_errors() {
        assert_eq!(
            classify_watch_error("Api(ErrorResponse { code: 401, reason: \"Unauthorized\" })"),
            WatchErrorKind::Unauthorized
        );
        assert_eq!(
            classify_watch_error("WatchError: too old resource version: 123 (456)"),
            WatchErrorKind::Expired
        );
        assert_eq!(
            classify_watch_error("storage is (re)initializing"),
            WatchErrorKind::Throttled
        );
        assert_eq!(
            classify_watch_error("WatchFailed(SerdeError(invalid type: integer `404`))"),
            WatchErrorKind::NotFound
        );
        assert_eq!(
            classify_watch_error("connection reset by peer"),
            WatchErrorKind::Other
        );
    }

    #[tokio::test]
    async fn test_throttled_watch_doubles_backoff_up_to_max() {
        let backoff = Arc::new(AtomicU64::new(1));
        let result =
            handle_watch_stream_error("429 TooManyRequests", &backoff, 3, Duration::ZERO).await;
        assert!(result.is_none());
        assert_eq!(backoff.load(Ordering::Relaxed), 2);

        handle_watch_stream_error("429 TooManyRequests", &backoff, 3, Duration::ZERO).await;
        assert_eq!(backoff.load(Ordering::Relaxed), 3);
    }

    #[tokio::test]
    async fn test_not_found_keeps_stream_running() {
        let backoff = Arc::new(AtomicU64::new(1));
        let result =
            handle_watch_stream_error("ObjectNotFound", &backoff, 10, Duration::ZERO).await;
        assert!(result.is_some());
    }
}
