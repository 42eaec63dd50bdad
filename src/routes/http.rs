// Handlers: health, version, ingest, labs, series and averages

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use super::AppState;
use crate::models::Metric;
use crate::query::QueryError;
use crate::version::{NAME, VERSION};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct MetricsQuery {
    pc_id: Option<String>,
    lab_id: Option<String>,
    limit: Option<u32>,
}

impl IntoResponse for QueryError {
    fn into_response(self) -> Response {
        let status = match &self {
            QueryError::MissingParameter(_) | QueryError::InvalidMetric(_) => {
                StatusCode::BAD_REQUEST
            }
            QueryError::Store(e) => {
                tracing::warn!(error = %e, operation = "query", "store query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// GET /api/health
pub(super) async fn health_handler() -> impl IntoResponse {
    Json(serde_json::json!({ "ok": true }))
}

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// POST /api/metrics: persists one Metric sent by an agent's http store.
pub(super) async fn ingest_handler(
    State(state): State<AppState>,
    Json(metric): Json<Metric>,
) -> Result<StatusCode, QueryError> {
    metric
        .validate()
        .map_err(|e| QueryError::InvalidMetric(e.to_string()))?;
    state.store.insert(&metric).await?;
    tracing::debug!(
        machine_id = %metric.machine_id,
        lab_id = %metric.lab_id,
        sample_count = metric.sample_count,
        "metric ingested"
    );
    Ok(StatusCode::CREATED)
}

pub(super) async fn labs_handler(State(state): State<AppState>) -> Result<Response, QueryError> {
    Ok(Json(state.aggregator.labs().await?).into_response())
}

pub(super) async fn lab_machines_handler(
    State(state): State<AppState>,
    Path(lab_id): Path<String>,
) -> Result<Response, QueryError> {
    Ok(Json(state.aggregator.machines(Some(&lab_id)).await?).into_response())
}

pub(super) async fn series_handler(
    State(state): State<AppState>,
    Query(q): Query<MetricsQuery>,
) -> Result<Response, QueryError> {
    let series = state
        .aggregator
        .series(q.pc_id.as_deref(), q.lab_id.as_deref(), q.limit)
        .await?;
    Ok(Json(series).into_response())
}

/// GET /api/avg/pc: `null` when the machine has no Metrics.
pub(super) async fn machine_average_handler(
    State(state): State<AppState>,
    Query(q): Query<MetricsQuery>,
) -> Result<Response, QueryError> {
    let avg = state
        .aggregator
        .machine_average(q.pc_id.as_deref(), q.lab_id.as_deref(), q.limit)
        .await?;
    Ok(Json(avg).into_response())
}

pub(super) async fn lab_series_handler(
    State(state): State<AppState>,
    Query(q): Query<MetricsQuery>,
) -> Result<Response, QueryError> {
    let buckets = state
        .aggregator
        .lab_series(q.lab_id.as_deref(), q.limit)
        .await?;
    Ok(Json(buckets).into_response())
}

/// GET /api/avg/lab: `null` when the lab has no Metrics.
pub(super) async fn lab_average_handler(
    State(state): State<AppState>,
    Query(q): Query<MetricsQuery>,
) -> Result<Response, QueryError> {
    let avg = state
        .aggregator
        .lab_average(q.lab_id.as_deref(), q.limit)
        .await?;
    Ok(Json(avg).into_response())
}
