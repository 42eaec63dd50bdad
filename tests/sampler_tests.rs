// Sampler and agent loop tests with scripted providers

mod common;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::process;
use labmon::agent::{self, AgentConfig, AgentDeps, AgentStats};
use labmon::buffer::LocalBuffer;
use labmon::flusher::Flusher;
use labmon::models::ProcessSample;
use labmon::sampler::{DiskIoReading, MetricsProvider, NetworkReading, Sampler};
use labmon::store::{MemoryStore, MetricFilter, MetricStore};
use tempfile::TempDir;

struct FixedProvider;

#[async_trait]
impl MetricsProvider for FixedProvider {
    async fn cpu_load_percent(&self) -> anyhow::Result<f64> {
        Ok(25.0)
    }
    async fn mem_used_percent(&self) -> anyhow::Result<f64> {
        Ok(50.0)
    }
    async fn disk_used_percent(&self) -> anyhow::Result<f64> {
        Ok(75.0)
    }
    async fn network(&self) -> anyhow::Result<NetworkReading> {
        Ok(NetworkReading {
            rx_kbps: 3.0,
            tx_kbps: 1.0,
            used_percent: 0.5,
        })
    }
    async fn disk_io(&self) -> anyhow::Result<DiskIoReading> {
        Ok(DiskIoReading {
            read_kbps: 8.0,
            write_kbps: 2.0,
        })
    }
    async fn uptime_seconds(&self) -> anyhow::Result<u64> {
        Ok(3600)
    }
    async fn processes(&self) -> anyhow::Result<Vec<ProcessSample>> {
        Ok(vec![process("sshd", 1.0, 0.2)])
    }
}

struct BrokenProvider;

#[async_trait]
impl MetricsProvider for BrokenProvider {
    async fn cpu_load_percent(&self) -> anyhow::Result<f64> {
        anyhow::bail!("no cpu")
    }
    async fn mem_used_percent(&self) -> anyhow::Result<f64> {
        Ok(50.0)
    }
    async fn disk_used_percent(&self) -> anyhow::Result<f64> {
        anyhow::bail!("no disks")
    }
    async fn network(&self) -> anyhow::Result<NetworkReading> {
        anyhow::bail!("no interfaces")
    }
    async fn disk_io(&self) -> anyhow::Result<DiskIoReading> {
        anyhow::bail!("no io counters")
    }
    async fn uptime_seconds(&self) -> anyhow::Result<u64> {
        anyhow::bail!("no uptime")
    }
    async fn processes(&self) -> anyhow::Result<Vec<ProcessSample>> {
        anyhow::bail!("no process table")
    }
}

struct NanProvider;

#[async_trait]
impl MetricsProvider for NanProvider {
    async fn cpu_load_percent(&self) -> anyhow::Result<f64> {
        Ok(f64::NAN)
    }
    async fn mem_used_percent(&self) -> anyhow::Result<f64> {
        Ok(40.0)
    }
    async fn disk_used_percent(&self) -> anyhow::Result<f64> {
        Ok(f64::INFINITY)
    }
    async fn network(&self) -> anyhow::Result<NetworkReading> {
        Ok(NetworkReading {
            rx_kbps: f64::NAN,
            tx_kbps: 2.0,
            used_percent: f64::NEG_INFINITY,
        })
    }
    async fn disk_io(&self) -> anyhow::Result<DiskIoReading> {
        Ok(DiskIoReading {
            read_kbps: 4.0,
            write_kbps: f64::NAN,
        })
    }
    async fn uptime_seconds(&self) -> anyhow::Result<u64> {
        Ok(10)
    }
    async fn processes(&self) -> anyhow::Result<Vec<ProcessSample>> {
        let mut p = process("java", f64::NAN, 3.0);
        p.net_kbps = Some(f64::NAN);
        p.disk_kbps = Some(1.0);
        Ok(vec![p])
    }
}

#[tokio::test]
async fn test_sample_maps_provider_readings() {
    let sampler = Sampler::new(Arc::new(FixedProvider), "pc-1".into(), "L".into());
    let s = sampler.sample().await;
    assert_eq!(s.machine_id, "pc-1");
    assert_eq!(s.lab_id, "L");
    assert!(s.timestamp > 0);
    assert_eq!(s.readings.cpu_load_percent, 25.0);
    assert_eq!(s.readings.net_kbps, 4.0);
    assert_eq!(s.readings.net_rx_kbps, 3.0);
    assert_eq!(s.readings.net_used_percent, 0.5);
    assert_eq!(s.readings.disk_read_kbps, 8.0);
    assert_eq!(s.uptime_seconds, 3600);
    assert_eq!(s.processes.len(), 1);
    s.validate().unwrap();
}

#[tokio::test]
async fn test_failing_provider_fields_become_zero() {
    let sampler = Sampler::new(Arc::new(BrokenProvider), "pc-1".into(), "L".into());
    let s = sampler.sample().await;
    assert_eq!(s.readings.cpu_load_percent, 0.0);
    assert_eq!(s.readings.mem_used_percent, 50.0);
    assert_eq!(s.readings.disk_used_percent, 0.0);
    assert_eq!(s.readings.net_kbps, 0.0);
    assert_eq!(s.readings.disk_write_kbps, 0.0);
    assert_eq!(s.uptime_seconds, 0);
    assert!(s.processes.is_empty());
}

#[tokio::test]
async fn test_agent_shutdown_runs_final_flush() {
    let dir = TempDir::new().unwrap();
    let buffer = Arc::new(LocalBuffer::open(dir.path().join("buf.jsonl")).await.unwrap());
    let store = Arc::new(MemoryStore::new());
    let sampler = Arc::new(Sampler::new(Arc::new(FixedProvider), "pc-1".into(), "L".into()));
    let flusher = Arc::new(Flusher::new(
        buffer.clone(),
        store.clone(),
        "pc-1".into(),
        "L".into(),
    ));
    let stats = Arc::new(AgentStats::default());
    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();

    let handle = agent::spawn(
        AgentDeps {
            sampler,
            buffer: buffer.clone(),
            flusher,
            stats: stats.clone(),
            shutdown_rx,
        },
        AgentConfig {
            sample_interval_secs: 1,
            batch_interval_secs: 3600,
            stats_log_interval_secs: 3600,
        },
    );

    // The first sample tick fires immediately.
    tokio::time::sleep(Duration::from_millis(300)).await;
    shutdown_tx.send(()).unwrap();
    handle.await.unwrap();

    let stored = store.recent(MetricFilter::machine("pc-1", "L"), 10).await.unwrap();
    assert_eq!(stored.len(), 1);
    assert!(stored[0].sample_count >= 1);
    assert_eq!(stored[0].readings.cpu_load_percent, 25.0);
    assert_eq!(
        stored[0].sample_count,
        stats
            .samples_flushed
            .load(std::sync::atomic::Ordering::Relaxed)
    );
    assert!(buffer.read_all().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_non_finite_readings_become_zero_and_stay_buffered() {
    let sampler = Sampler::new(Arc::new(NanProvider), "pc-1".into(), "L".into());
    let s = sampler.sample().await;
    assert_eq!(s.readings.cpu_load_percent, 0.0);
    assert_eq!(s.readings.mem_used_percent, 40.0);
    assert_eq!(s.readings.disk_used_percent, 0.0);
    assert_eq!(s.readings.net_rx_kbps, 0.0);
    assert_eq!(s.readings.net_kbps, 2.0);
    assert_eq!(s.readings.net_used_percent, 0.0);
    assert_eq!(s.readings.disk_read_kbps, 4.0);
    assert_eq!(s.readings.disk_write_kbps, 0.0);
    assert_eq!(s.processes[0].cpu, 0.0);
    assert_eq!(s.processes[0].net_kbps, None);
    assert_eq!(s.processes[0].disk_kbps, Some(1.0));

    let dir = TempDir::new().unwrap();
    let buffer = LocalBuffer::open(dir.path().join("buf.jsonl")).await.unwrap();
    buffer.append(&s).await.unwrap();
    assert_eq!(buffer.read_all().await.unwrap(), vec![s]);
}
