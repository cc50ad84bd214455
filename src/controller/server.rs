//! # HTTP Server
//!
//! HTTP server for metrics, health checks, Kubernetes probes and admission.
//!
//! Provides endpoints:
//! - `/metrics` - Prometheus metrics in text format
//! - `/healthz` - Liveness probe (always returns 200)
//! - `/readyz` - Readiness probe (returns 200 when controller is ready)
//! - `/validate` - Validating admission webhook for `Declaration` resources
//!
//! The server runs on port 5000 by default (configurable via `METRICS_PORT` environment variable).
//! TLS for the admission endpoint is terminated in front of the controller.

use crate::controller::reconciler::validation::Validator;
use crate::crd::Declaration;
use crate::observability::metrics;
use anyhow::Context;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use kube::core::DynamicObject;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};

#[derive(Debug)]
pub struct ServerState {
    pub is_ready: Arc<AtomicBool>,
    /// Same validator the reconciler runs, so admission and reconciliation agree
    pub validator: Validator,
}

/// Build the router serving all endpoints
pub fn router(state: Arc<ServerState>) -> Router {
    Router::new()
        .route("/metrics", get(metrics_handler))
        .route("/healthz", get(healthz_handler))
        .route("/readyz", get(readyz_handler))
        .route("/validate", post(validate_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Bind and serve until the process exits
///
/// Marks the server ready once the listener is bound.
///
/// # Errors
/// Returns an error if the port cannot be bound or the server fails
pub async fn start_server(port: u16, state: Arc<ServerState>) -> Result<(), anyhow::Error> {
    let app = router(state.clone());

    let addr = format!("0.0.0.0:{port}");
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind HTTP server to {addr}"))?;

    info!("HTTP server listening on {}", addr);
    state.is_ready.store(true, Ordering::Relaxed);

    axum::serve(listener, app)
        .await
        .context("HTTP server terminated")?;

    Ok(())
}

async fn metrics_handler() -> impl IntoResponse {
    match metrics::gather_metrics() {
        Ok(body) => (
            StatusCode::OK,
            [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
            body,
        ),
        Err(e) => {
            error!("Failed to encode metrics: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                [("content-type", "text/plain")],
                format!("Failed to encode metrics: {e}"),
            )
        }
    }
}

async fn healthz_handler() -> impl IntoResponse {
    StatusCode::OK
}

async fn readyz_handler(State(state): State<Arc<ServerState>>) -> impl IntoResponse {
    if state.is_ready.load(Ordering::Relaxed) {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn validate_handler(
    State(state): State<Arc<ServerState>>,
    Json(review): Json<AdmissionReview<Declaration>>,
) -> Json<AdmissionReview<DynamicObject>> {
    let request: AdmissionRequest<Declaration> = match review.try_into() {
        Ok(request) => request,
        Err(e) => {
            warn!("Malformed admission review: {}", e);
            return Json(AdmissionResponse::invalid(e.to_string()).into_review());
        }
    };
    Json(admit(&state.validator, &request).into_review())
}

/// Run the validator over an admission request
///
/// The previous state is the last applied snapshot of the old object, the
/// same input the reconciler validates against.
#[must_use]
pub fn admit(validator: &Validator, request: &AdmissionRequest<Declaration>) -> AdmissionResponse {
    let response = AdmissionResponse::from(request);
    let deleting = request.operation == Operation::Delete;

    let Some(candidate) = request.object.as_ref().or(request.old_object.as_ref()) else {
        return response;
    };
    let previous = request
        .old_object
        .as_ref()
        .and_then(|old| old.status.as_ref())
        .and_then(|status| status.last_applied.as_ref())
        .map(|snapshot| &snapshot.spec);

    match validator.validate(&candidate.spec, previous, deleting) {
        Ok(()) => {
            debug!(
                resource.name = request.name.as_str(),
                operation = ?request.operation,
                "admission.allowed"
            );
            response
        }
        Err(e) => {
            info!(
                "Rejecting {:?} of Declaration {}: {}",
                request.operation, request.name, e
            );
            metrics::increment_validation_rejections();
            response.deny(e.to_string())
        }
    }
}
