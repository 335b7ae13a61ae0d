//! Operational endpoints: service health and Prometheus metrics.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use gateway::{AppointmentsClient, LawyersClient, UsersClient};
use metrics_exporter_prometheus::PrometheusHandle;
use saga_store::SagaStore;
use serde::Serialize;

use crate::routes::sagas::AppState;

/// Health payload. `active_sagas` counts records short of a terminal
/// state, the same set a recovery pass would scan.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub active_sagas: usize,
}

/// GET /health — checks the saga store and reports in-flight sagas.
#[tracing::instrument(skip(state))]
pub async fn health<S, U, L, A>(State(state): State<Arc<AppState<S, U, L, A>>>) -> Response
where
    S: SagaStore + 'static,
    U: UsersClient + 'static,
    L: LawyersClient + 'static,
    A: AppointmentsClient + 'static,
{
    match state.store.list_incomplete().await {
        Ok(incomplete) => Json(HealthResponse {
            status: "ok",
            active_sagas: incomplete.len(),
        })
        .into_response(),
        Err(err) => {
            tracing::error!(error = %err, "saga store unreachable");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(serde_json::json!({ "status": "unavailable" })),
            )
                .into_response()
        }
    }
}

/// GET /metrics — Prometheus exposition of the saga counters and
/// histograms.
pub async fn metrics(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    (
        [(
            header::CONTENT_TYPE,
            "text/plain; version=0.0.4; charset=utf-8",
        )],
        handle.render(),
    )
}
