// HTTP routes: dashboard JSON API and agent ingest

mod http;

use axum::{
    Router,
    routing::{get, post},
};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::query::QueryAggregator;
use crate::store::MetricStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<dyn MetricStore>,
    pub(crate) aggregator: Arc<QueryAggregator>,
}

pub fn app(store: Arc<dyn MetricStore>, aggregator: Arc<QueryAggregator>) -> Router {
    let state = AppState { store, aggregator };
    Router::new()
        .route("/api/health", get(http::health_handler)) // GET /api/health
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/metrics", post(http::ingest_handler)) // POST /api/metrics (agents)
        .route("/api/labs", get(http::labs_handler)) // GET /api/labs
        .route("/api/labs/{lab_id}/pcs", get(http::lab_machines_handler)) // GET /api/labs/{labId}/pcs
        .route("/api/series", get(http::series_handler)) // GET /api/series?pcId&labId&limit
        .route("/api/avg/pc", get(http::machine_average_handler)) // GET /api/avg/pc?pcId&labId&limit
        .route("/api/lab/series", get(http::lab_series_handler)) // GET /api/lab/series?labId&limit
        .route("/api/avg/lab", get(http::lab_average_handler)) // GET /api/avg/lab?labId&limit
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
