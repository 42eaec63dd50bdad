// Integration tests: dashboard HTTP endpoints

mod common;

use std::sync::Arc;

use axum_test::TestServer;
use common::{metric, process, readings_with_cpu};
use labmon::config::QueryConfig;
use labmon::models::Metric;
use labmon::query::QueryAggregator;
use labmon::routes;
use labmon::store::{HttpStore, MemoryStore, MetricFilter, MetricStore};

async fn test_server(metrics: &[Metric]) -> TestServer {
    let store = common::memory_store_with(metrics).await;
    let aggregator = Arc::new(QueryAggregator::new(store.clone(), QueryConfig::default()));
    TestServer::new(routes::app(store, aggregator))
}

fn seeded() -> Vec<Metric> {
    let mut first = metric("1", "L", 10_000, readings_with_cpu(10.0));
    first.processes = vec![process("A", 50.0, 2.0), process("B", 50.0, 1.0)];
    vec![
        first,
        metric("1", "L", 11_000, readings_with_cpu(20.0)),
        metric("2", "L", 12_000, readings_with_cpu(30.0)),
    ]
}

#[tokio::test]
async fn test_health_endpoint() {
    let server = test_server(&[]).await;
    let response = server.get("/api/health").await;
    response.assert_status_ok();
    response.assert_json(&serde_json::json!({ "ok": true }));
}

#[tokio::test]
async fn test_version_endpoint() {
    let server = test_server(&[]).await;
    let response = server.get("/version").await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert_eq!(json.get("name").and_then(|v| v.as_str()), Some("labmon"));
    assert!(json.get("version").and_then(|v| v.as_str()).is_some());
}

#[tokio::test]
async fn test_labs_empty_then_populated() {
    let store = Arc::new(MemoryStore::new());
    let aggregator = Arc::new(QueryAggregator::new(store.clone(), QueryConfig::default()));
    let server = TestServer::new(routes::app(store.clone(), aggregator));

    let labs: Vec<String> = server.get("/api/labs").await.json();
    assert!(labs.is_empty());

    store
        .insert(&metric("1", "L", 1_000, readings_with_cpu(1.0)))
        .await
        .unwrap();
    let labs: Vec<String> = server.get("/api/labs").await.json();
    assert_eq!(labs, vec!["L"]);
}

#[tokio::test]
async fn test_lab_machines() {
    let server = test_server(&seeded()).await;
    let response = server.get("/api/labs/L/pcs").await;
    response.assert_status_ok();
    let pcs: Vec<String> = response.json();
    assert_eq!(pcs, vec!["1", "2"]);
}

#[tokio::test]
async fn test_series_uses_wire_names() {
    let server = test_server(&seeded()).await;
    let response = server
        .get("/api/series")
        .add_query_param("pcId", "1")
        .add_query_param("labId", "L")
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    let rows = json.as_array().unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0]["timestamp"], 10_000);
    assert_eq!(rows[1]["cpuLoadPercent"], 20.0);
    assert_eq!(rows[0]["sampleCount"], 1);
    assert_eq!(rows[0]["processes"][0]["name"], "A");
}

#[tokio::test]
async fn test_missing_ids_return_400() {
    let server = test_server(&seeded()).await;

    let response = server.get("/api/series").add_query_param("labId", "L").await;
    response.assert_status_bad_request();
    response.assert_json(&serde_json::json!({ "error": "pcId required" }));

    let response = server.get("/api/avg/pc").add_query_param("pcId", "1").await;
    response.assert_status_bad_request();
    response.assert_json(&serde_json::json!({ "error": "labId required" }));

    server.get("/api/lab/series").await.assert_status_bad_request();
    server.get("/api/avg/lab").await.assert_status_bad_request();
}

#[tokio::test]
async fn test_machine_average_null_when_empty() {
    let server = test_server(&[]).await;
    let response = server
        .get("/api/avg/pc")
        .add_query_param("pcId", "1")
        .add_query_param("labId", "L")
        .await;
    response.assert_status_ok();
    let json: serde_json::Value = response.json();
    assert!(json.is_null());
}

#[tokio::test]
async fn test_machine_average() {
    let server = test_server(&seeded()).await;
    let json: serde_json::Value = server
        .get("/api/avg/pc")
        .add_query_param("pcId", "1")
        .add_query_param("labId", "L")
        .await
        .json();
    assert_eq!(json["machineId"], "1");
    assert_eq!(json["count"], 2);
    assert_eq!(json["cpuLoadPercent"], 15.0);
    assert_eq!(json["timestamp"], 11_000);
}

#[tokio::test]
async fn test_lab_series_buckets() {
    let server = test_server(&seeded()).await;
    let json: serde_json::Value = server
        .get("/api/lab/series")
        .add_query_param("labId", "L")
        .await
        .json();
    let buckets = json.as_array().unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0]["timestamp"], 10_000);
    assert_eq!(buckets[0]["count"], 3);
    assert_eq!(buckets[0]["cpuLoadPercent"], 20.0);
}

#[tokio::test]
async fn test_lab_average_rankings() {
    let server = test_server(&seeded()).await;
    let json: serde_json::Value = server
        .get("/api/avg/lab")
        .add_query_param("labId", "L")
        .add_query_param("limit", "100")
        .await
        .json();
    assert_eq!(json["labId"], "L");
    assert_eq!(json["count"], 3);
    assert_eq!(json["processes"]["topByCpu"][0]["name"], "A");
    assert_eq!(json["processes"]["topByCpu"][1]["name"], "B");
    assert_eq!(json["processes"]["topByNet"], serde_json::json!([]));
    assert_eq!(json["topPcsByCpu"][0]["machineId"], "2");
}

#[tokio::test]
async fn test_lab_average_null_when_empty() {
    let server = test_server(&[]).await;
    let json: serde_json::Value = server
        .get("/api/avg/lab")
        .add_query_param("labId", "L")
        .await
        .json();
    assert!(json.is_null());
}

#[tokio::test]
async fn test_ingest_persists_metric() {
    let server = test_server(&[]).await;
    let mut m = metric("pc-9", "L2", 42_000, readings_with_cpu(12.5));
    m.sample_count = 10;
    m.processes = vec![process("sshd", 1.0, 0.5)];

    let response = server.post("/api/metrics").json(&m).await;
    response.assert_status(axum::http::StatusCode::CREATED);

    let labs: Vec<String> = server.get("/api/labs").await.json();
    assert_eq!(labs, vec!["L2"]);
    let series: Vec<Metric> = server
        .get("/api/series")
        .add_query_param("pcId", "pc-9")
        .add_query_param("labId", "L2")
        .await
        .json();
    assert_eq!(series, vec![m]);
}

#[tokio::test]
async fn test_ingest_rejects_invalid_metric() {
    let server = test_server(&[]).await;
    let mut m = metric("pc-9", "L2", 42_000, readings_with_cpu(12.5));
    m.sample_count = 0;
    let response = server.post("/api/metrics").json(&m).await;
    response.assert_status_bad_request();
    let json: serde_json::Value = response.json();
    assert!(json["error"].as_str().unwrap().contains("invalid metric"));

    let labs: Vec<String> = server.get("/api/labs").await.json();
    assert!(labs.is_empty());
}

#[tokio::test]
async fn test_http_store_delivers_to_server_store() {
    let shared = Arc::new(MemoryStore::new());
    let aggregator = Arc::new(QueryAggregator::new(shared.clone(), QueryConfig::default()));
    let server = TestServer::builder()
        .http_transport()
        .build(routes::app(shared.clone(), aggregator));
    let base_url = server.server_address().unwrap().to_string();

    let agent_store = HttpStore::new(&base_url, 5).unwrap();
    let mut m = metric("pc-1", "L", 7_000, readings_with_cpu(33.0));
    m.sample_count = 3;
    agent_store.insert(&m).await.unwrap();

    let got = shared.recent(MetricFilter::lab("L"), 10).await.unwrap();
    assert_eq!(got, vec![m]);

    let mut bad = metric("pc-1", "", 8_000, readings_with_cpu(1.0));
    bad.sample_count = 1;
    assert!(agent_store.insert(&bad).await.is_err());
    assert!(agent_store.lab_ids().await.is_err());
}
