// Shared test helpers

#![allow(dead_code)]

use std::sync::Arc;

use labmon::models::*;
use labmon::store::{MemoryStore, MetricStore};

pub fn readings_with_cpu(cpu: f64) -> Readings {
    Readings {
        cpu_load_percent: cpu,
        ..Readings::default()
    }
}

pub fn process(name: &str, cpu: f64, mem: f64) -> ProcessSample {
    ProcessSample {
        pid: None,
        name: name.to_string(),
        command: None,
        cpu,
        mem,
        net_kbps: None,
        disk_kbps: None,
    }
}

pub fn sample(timestamp: i64, readings: Readings) -> Sample {
    Sample {
        machine_id: "1".into(),
        lab_id: "L".into(),
        timestamp,
        readings,
        uptime_seconds: 100,
        processes: vec![],
    }
}

pub fn metric(machine_id: &str, lab_id: &str, timestamp: i64, readings: Readings) -> Metric {
    Metric {
        machine_id: machine_id.into(),
        lab_id: lab_id.into(),
        timestamp,
        sample_count: 1,
        readings,
        uptime_seconds: 100,
        processes: vec![],
    }
}

pub async fn memory_store_with(metrics: &[Metric]) -> Arc<dyn MetricStore> {
    let store = MemoryStore::new();
    for m in metrics {
        store.insert(m).await.unwrap();
    }
    Arc::new(store)
}
