// Sampler: one best-effort Sample per tick. Provider failures and non-finite values become
// zeros and a warning, never an error, so the scheduling loop keeps running.

use std::sync::Arc;

use async_trait::async_trait;

use crate::models::{ProcessSample, Readings, Sample, now_ms};

/// Network throughput for one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NetworkReading {
    pub rx_kbps: f64,
    pub tx_kbps: f64,
    /// Throughput relative to link capacity.
    pub used_percent: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DiskIoReading {
    pub read_kbps: f64,
    pub write_kbps: f64,
}

/// Source of raw machine readings. Every field is fetched independently and may fail.
#[async_trait]
pub trait MetricsProvider: Send + Sync {
    async fn cpu_load_percent(&self) -> anyhow::Result<f64>;
    async fn mem_used_percent(&self) -> anyhow::Result<f64>;
    async fn disk_used_percent(&self) -> anyhow::Result<f64>;
    async fn network(&self) -> anyhow::Result<NetworkReading>;
    async fn disk_io(&self) -> anyhow::Result<DiskIoReading>;
    async fn uptime_seconds(&self) -> anyhow::Result<u64>;
    async fn processes(&self) -> anyhow::Result<Vec<ProcessSample>>;
}

pub struct Sampler {
    provider: Arc<dyn MetricsProvider>,
    machine_id: String,
    lab_id: String,
}

impl Sampler {
    pub fn new(provider: Arc<dyn MetricsProvider>, machine_id: String, lab_id: String) -> Self {
        Self {
            provider,
            machine_id,
            lab_id,
        }
    }

    pub fn machine_id(&self) -> &str {
        &self.machine_id
    }

    pub fn lab_id(&self) -> &str {
        &self.lab_id
    }

    /// Reads every provider field concurrently, substituting defaults for failures.
    pub async fn sample(&self) -> Sample {
        let p = &self.provider;
        let (cpu, mem, disk, network, disk_io, uptime, processes) = tokio::join!(
            p.cpu_load_percent(),
            p.mem_used_percent(),
            p.disk_used_percent(),
            p.network(),
            p.disk_io(),
            p.uptime_seconds(),
            p.processes(),
        );
        let network = or_default(network, "network");
        let disk_io = or_default(disk_io, "disk_io");
        let rx_kbps = finite_or_zero(network.rx_kbps, "net_rx_kbps");
        let tx_kbps = finite_or_zero(network.tx_kbps, "net_tx_kbps");

        Sample {
            machine_id: self.machine_id.clone(),
            lab_id: self.lab_id.clone(),
            timestamp: now_ms(),
            readings: Readings {
                cpu_load_percent: finite_or_zero(
                    or_default(cpu, "cpu_load_percent"),
                    "cpu_load_percent",
                ),
                mem_used_percent: finite_or_zero(
                    or_default(mem, "mem_used_percent"),
                    "mem_used_percent",
                ),
                disk_used_percent: finite_or_zero(
                    or_default(disk, "disk_used_percent"),
                    "disk_used_percent",
                ),
                net_used_percent: finite_or_zero(network.used_percent, "net_used_percent"),
                net_kbps: rx_kbps + tx_kbps,
                net_rx_kbps: rx_kbps,
                net_tx_kbps: tx_kbps,
                disk_read_kbps: finite_or_zero(disk_io.read_kbps, "disk_read_kbps"),
                disk_write_kbps: finite_or_zero(disk_io.write_kbps, "disk_write_kbps"),
            },
            uptime_seconds: or_default(uptime, "uptime_seconds"),
            processes: or_default(processes, "processes")
                .into_iter()
                .map(sanitize_process)
                .collect(),
        }
    }
}

fn or_default<T: Default>(result: anyhow::Result<T>, operation: &'static str) -> T {
    result.unwrap_or_else(|e| {
        tracing::warn!(error = %e, operation, "provider read failed; using default");
        T::default()
    })
}

/// NaN and infinities would serialize as JSON `null` and make the whole buffered record
/// unreadable, so they are replaced like any other failed read.
fn finite_or_zero(value: f64, field: &'static str) -> f64 {
    if value.is_finite() {
        value
    } else {
        tracing::warn!(field, value, "non-finite provider reading; using 0");
        0.0
    }
}

fn sanitize_process(mut p: ProcessSample) -> ProcessSample {
    p.cpu = finite_or_zero(p.cpu, "process.cpu");
    p.mem = finite_or_zero(p.mem, "process.mem");
    // Optional rates that are not finite count as not reported.
    p.net_kbps = p.net_kbps.filter(|v| v.is_finite());
    p.disk_kbps = p.disk_kbps.filter(|v| v.is_finite());
    p
}
