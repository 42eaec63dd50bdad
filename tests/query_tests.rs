// QueryAggregator tests: series, averages, buckets and rankings

mod common;

use common::{memory_store_with, metric, process, readings_with_cpu};
use labmon::config::QueryConfig;
use labmon::models::{Metric, Readings};
use labmon::query::{QueryAggregator, QueryError};

fn aggregator(store: std::sync::Arc<dyn labmon::store::MetricStore>) -> QueryAggregator {
    QueryAggregator::new(store, QueryConfig::default())
}

fn with_processes(ts: i64, processes: Vec<labmon::models::ProcessSample>) -> Metric {
    let mut m = metric("1", "L", ts, Readings::default());
    m.processes = processes;
    m
}

#[tokio::test]
async fn test_machine_average_over_limit() {
    let store = memory_store_with(&[
        metric("1", "L", 1_000, readings_with_cpu(10.0)),
        metric("1", "L", 2_000, readings_with_cpu(20.0)),
        metric("1", "L", 3_000, readings_with_cpu(30.0)),
    ])
    .await;
    let avg = aggregator(store)
        .machine_average(Some("1"), Some("L"), Some(3))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(avg.readings.cpu_load_percent, 20.0);
    assert_eq!(avg.count, 3);
    assert_eq!(avg.timestamp, 3_000);
}

#[tokio::test]
async fn test_machine_average_limit_takes_newest() {
    let store = memory_store_with(&[
        metric("1", "L", 1_000, readings_with_cpu(10.0)),
        metric("1", "L", 2_000, readings_with_cpu(20.0)),
        metric("1", "L", 3_000, readings_with_cpu(30.0)),
    ])
    .await;
    let avg = aggregator(store)
        .machine_average(Some("1"), Some("L"), Some(2))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(avg.readings.cpu_load_percent, 25.0);
}

#[tokio::test]
async fn test_empty_scope_is_none() {
    let store = memory_store_with(&[]).await;
    let agg = aggregator(store);
    assert!(agg.machine_average(Some("1"), Some("L"), None).await.unwrap().is_none());
    assert!(agg.lab_average(Some("L"), None).await.unwrap().is_none());
    assert!(agg.series(Some("1"), Some("L"), None).await.unwrap().is_empty());
    assert!(agg.lab_series(Some("L"), None).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_series_ascending() {
    let store = memory_store_with(&[
        metric("1", "L", 3_000, readings_with_cpu(3.0)),
        metric("1", "L", 1_000, readings_with_cpu(1.0)),
        metric("2", "L", 1_500, readings_with_cpu(9.0)),
        metric("1", "L", 2_000, readings_with_cpu(2.0)),
    ])
    .await;
    let series = aggregator(store)
        .series(Some("1"), Some("L"), None)
        .await
        .unwrap();
    let ts: Vec<i64> = series.iter().map(|m| m.timestamp).collect();
    assert_eq!(ts, vec![1_000, 2_000, 3_000]);
}

#[tokio::test]
async fn test_series_zero_limit_clamps_to_newest() {
    let store = memory_store_with(&[
        metric("1", "L", 3_000, readings_with_cpu(3.0)),
        metric("1", "L", 1_000, readings_with_cpu(1.0)),
        metric("1", "L", 2_000, readings_with_cpu(2.0)),
    ])
    .await;
    let series = aggregator(store)
        .series(Some("1"), Some("L"), Some(0))
        .await
        .unwrap();
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].timestamp, 3_000);
}

#[tokio::test]
async fn test_lab_series_buckets() {
    let store = memory_store_with(&[
        metric("1", "L", 10_500, readings_with_cpu(10.0)),
        metric("2", "L", 11_500, readings_with_cpu(30.0)),
        metric("1", "L", 19_999, readings_with_cpu(50.0)),
    ])
    .await;
    let buckets = aggregator(store).lab_series(Some("L"), None).await.unwrap();
    assert_eq!(buckets.len(), 1);
    assert_eq!(buckets[0].timestamp, 10_000);
    assert_eq!(buckets[0].count, 3);
    assert_eq!(buckets[0].readings.cpu_load_percent, 30.0);
}

#[tokio::test]
async fn test_top_by_cpu_stable_ties() {
    let store = memory_store_with(&[with_processes(
        1_000,
        vec![
            process("A", 50.0, 1.0),
            process("B", 50.0, 1.0),
            process("C", 10.0, 1.0),
            process("D", 5.0, 1.0),
        ],
    )])
    .await;
    let avg = aggregator(store)
        .lab_average(Some("L"), None)
        .await
        .unwrap()
        .unwrap();
    let names: Vec<&str> = avg
        .processes
        .top_by_cpu
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn test_net_and_disk_rankings_need_positive_values() {
    let mut quiet = process("A", 5.0, 1.0);
    quiet.net_kbps = Some(0.0);
    let store = memory_store_with(&[with_processes(1_000, vec![quiet, process("B", 1.0, 1.0)])]).await;
    let avg = aggregator(store)
        .lab_average(Some("L"), None)
        .await
        .unwrap()
        .unwrap();
    assert!(avg.processes.top_by_net.is_empty());
    assert!(avg.processes.top_by_disk.is_empty());
    assert_eq!(avg.processes.top_by_cpu.len(), 2);

    let mut busy = process("A", 5.0, 1.0);
    busy.disk_kbps = Some(3.0);
    let store = memory_store_with(&[with_processes(1_000, vec![process("B", 1.0, 1.0), busy])]).await;
    let avg = aggregator(store)
        .lab_average(Some("L"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(avg.processes.top_by_disk[0].name, "A");
    assert_eq!(avg.processes.top_by_disk[0].avg_disk_kbps, 3.0);
}

#[tokio::test]
async fn test_process_identity_fallbacks() {
    let mut by_cmd = process("", 3.0, 1.0);
    by_cmd.command = Some("/usr/bin/worker".into());
    let mut by_pid = process("", 2.0, 1.0);
    by_pid.pid = Some(7);
    let anonymous = process("", 1.0, 1.0);
    let store = memory_store_with(&[with_processes(1_000, vec![by_cmd, by_pid, anonymous])]).await;
    let avg = aggregator(store)
        .lab_average(Some("L"), None)
        .await
        .unwrap()
        .unwrap();
    let names: Vec<&str> = avg
        .processes
        .top_by_cpu
        .iter()
        .map(|p| p.name.as_str())
        .collect();
    assert_eq!(names, vec!["/usr/bin/worker", "7", "unknown"]);
}

#[tokio::test]
async fn test_machine_rankings_always_present() {
    let mut busy = metric("2", "L", 2_000, readings_with_cpu(80.0));
    busy.readings.net_kbps = 500.0;
    let store = memory_store_with(&[
        metric("1", "L", 1_000, readings_with_cpu(20.0)),
        busy,
        metric("1", "L", 3_000, readings_with_cpu(40.0)),
    ])
    .await;
    let avg = aggregator(store)
        .lab_average(Some("L"), None)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(avg.count, 3);
    assert_eq!(avg.timestamp, 3_000);
    let cpu = &avg.machines.top_pcs_by_cpu;
    assert_eq!(cpu[0].machine_id, "2");
    assert_eq!(cpu[1].machine_id, "1");
    assert_eq!(cpu[1].avg_cpu_load_percent, 30.0);
    assert_eq!(cpu[1].samples, 2);
    assert_eq!(avg.machines.top_pcs_by_net[0].machine_id, "2");
    // All zeros still rank.
    assert_eq!(avg.machines.top_pcs_by_disk.len(), 2);
}

#[tokio::test]
async fn test_missing_ids_are_rejected() {
    let agg = aggregator(memory_store_with(&[]).await);
    let err = agg.series(None, Some("L"), None).await.unwrap_err();
    assert!(matches!(err, QueryError::MissingParameter("pcId")));
    let err = agg.machine_average(Some("1"), None, None).await.unwrap_err();
    assert_eq!(err.to_string(), "labId required");
    assert!(agg.lab_average(Some(""), None).await.is_err());
    assert!(agg.machines(None).await.is_err());
}
