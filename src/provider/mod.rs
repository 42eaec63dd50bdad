// MetricsProvider backed by sysinfo

mod linux;

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use async_trait::async_trait;
use sysinfo::{Disks, Networks, ProcessesToUpdate, System};
use tracing::instrument;

use crate::models::ProcessSample;
use crate::sampler::{DiskIoReading, MetricsProvider, NetworkReading};

/// Processes kept per sample, highest CPU first.
const TOP_PROCESSES: usize = 5;

type RateBaseline<T> = Arc<Mutex<Option<(T, Instant)>>>;

pub struct SysinfoProvider {
    sys: Arc<Mutex<System>>,
    disks: Arc<Mutex<Disks>>,
    networks: Arc<Mutex<Networks>>,
    last_cpu_refresh: Arc<Mutex<Option<(Instant, f64)>>>,
    /// Per-interface (total rx, total tx) bytes at the previous read.
    last_network: RateBaseline<HashMap<String, (u64, u64)>>,
    /// Summed process (total read, total written) bytes at the previous read.
    last_disk_io: RateBaseline<(u64, u64)>,
    /// Per-pid total read+written bytes at the previous process listing.
    last_process_io: RateBaseline<HashMap<u32, u64>>,
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

/// Host name used as the machine id when none is configured.
pub fn host_name() -> Option<String> {
    System::host_name().filter(|h| !h.is_empty())
}

fn lock<'a, T>(m: &'a Mutex<T>, what: &str) -> anyhow::Result<std::sync::MutexGuard<'a, T>> {
    m.lock()
        .map_err(|e| anyhow::anyhow!("sysinfo {} lock poisoned: {}", what, e))
}

fn per_sec(delta_bytes: u64, dt_secs: f64) -> f64 {
    if dt_secs > 0.0 {
        delta_bytes as f64 / 1024.0 / dt_secs
    } else {
        0.0
    }
}

impl SysinfoProvider {
    pub fn new() -> Self {
        let mut sys = System::new_all();
        sys.refresh_all();
        let disks = Disks::new_with_refreshed_list();
        let networks = Networks::new_with_refreshed_list();
        Self {
            sys: Arc::new(Mutex::new(sys)),
            disks: Arc::new(Mutex::new(disks)),
            networks: Arc::new(Mutex::new(networks)),
            last_cpu_refresh: Arc::new(Mutex::new(None)),
            last_network: Arc::new(Mutex::new(None)),
            last_disk_io: Arc::new(Mutex::new(None)),
            last_process_io: Arc::new(Mutex::new(None)),
        }
    }
}

#[async_trait]
impl MetricsProvider for SysinfoProvider {
    #[instrument(skip(self), fields(provider = "sysinfo", operation = "cpu_load_percent"))]
    async fn cpu_load_percent(&self) -> anyhow::Result<f64> {
        let sys = self.sys.clone();
        let last_cpu_refresh = self.last_cpu_refresh.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = lock(&sys, "system")?;
            let mut guard = lock(&last_cpu_refresh, "cpu")?;
            let now = Instant::now();
            let usage = match *guard {
                // Too soon for a meaningful delta: reuse the cached value without blocking.
                Some((prev_ts, prev_usage))
                    if now.duration_since(prev_ts) < sysinfo::MINIMUM_CPU_UPDATE_INTERVAL =>
                {
                    prev_usage
                }
                Some(_) => {
                    sys.refresh_cpu_all();
                    let usage = sys.global_cpu_usage() as f64;
                    *guard = Some((now, usage));
                    usage
                }
                None => {
                    // Usage is a delta between two refreshes; wait once for a real first reading.
                    sys.refresh_cpu_all();
                    std::thread::sleep(sysinfo::MINIMUM_CPU_UPDATE_INTERVAL);
                    sys.refresh_cpu_all();
                    let usage = sys.global_cpu_usage() as f64;
                    *guard = Some((Instant::now(), usage));
                    usage
                }
            };
            Ok(usage)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(provider = "sysinfo", operation = "mem_used_percent"))]
    async fn mem_used_percent(&self) -> anyhow::Result<f64> {
        let sys = self.sys.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = lock(&sys, "system")?;
            sys.refresh_memory();
            let total = sys.total_memory();
            anyhow::ensure!(total > 0, "total memory reported as 0");
            let used = total.saturating_sub(sys.available_memory());
            Ok((used as f64 / total as f64) * 100.0)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    /// Mean usage across mounted disks.
    #[instrument(skip(self), fields(provider = "sysinfo", operation = "disk_used_percent"))]
    async fn disk_used_percent(&self) -> anyhow::Result<f64> {
        let disks = self.disks.clone();
        tokio::task::spawn_blocking(move || {
            let mut disks = lock(&disks, "disks")?;
            disks.refresh(false);
            let uses: Vec<f64> = disks
                .list()
                .iter()
                .filter(|d| d.total_space() > 0)
                .map(|d| {
                    let total = d.total_space();
                    let used = total.saturating_sub(d.available_space());
                    (used as f64 / total as f64) * 100.0
                })
                .collect();
            anyhow::ensure!(!uses.is_empty(), "no disks with non-zero capacity");
            Ok(uses.iter().sum::<f64>() / uses.len() as f64)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    /// Mean rx/tx KB/s across interfaces since the previous read; percent of the fastest link.
    #[instrument(skip(self), fields(provider = "sysinfo", operation = "network"))]
    async fn network(&self) -> anyhow::Result<NetworkReading> {
        let networks = self.networks.clone();
        let last_network = self.last_network.clone();
        tokio::task::spawn_blocking(move || {
            let mut networks = lock(&networks, "networks")?;
            networks.refresh(true);
            let totals: HashMap<String, (u64, u64)> = networks
                .list()
                .iter()
                .map(|(name, data)| {
                    (
                        name.clone(),
                        (data.total_received(), data.total_transmitted()),
                    )
                })
                .collect();

            let now = Instant::now();
            let mut guard = lock(&last_network, "network baseline")?;
            let mut reading = NetworkReading::default();
            if let Some((prev, prev_ts)) = guard.as_ref() {
                let dt = now.duration_since(*prev_ts).as_secs_f64();
                let rates: Vec<(f64, f64)> = totals
                    .iter()
                    .filter_map(|(name, (rx, tx))| {
                        let (prx, ptx) = prev.get(name)?;
                        Some((
                            per_sec(rx.saturating_sub(*prx), dt),
                            per_sec(tx.saturating_sub(*ptx), dt),
                        ))
                    })
                    .collect();
                if !rates.is_empty() {
                    let n = rates.len() as f64;
                    reading.rx_kbps = rates.iter().map(|r| r.0).sum::<f64>() / n;
                    reading.tx_kbps = rates.iter().map(|r| r.1).sum::<f64>() / n;
                    let capacity = linux::max_link_kbps(totals.keys().map(String::as_str));
                    reading.used_percent = (reading.rx_kbps + reading.tx_kbps) / capacity * 100.0;
                }
            }
            *guard = Some((totals, now));
            Ok(reading)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    /// System-wide read/write KB/s from summed per-process I/O counters. Uses the process
    /// table as last refreshed by `processes()` so per-process CPU deltas stay intact.
    #[instrument(skip(self), fields(provider = "sysinfo", operation = "disk_io"))]
    async fn disk_io(&self) -> anyhow::Result<DiskIoReading> {
        let sys = self.sys.clone();
        let last_disk_io = self.last_disk_io.clone();
        tokio::task::spawn_blocking(move || {
            let sys = lock(&sys, "system")?;
            let (read, written) = sys.processes().values().fold((0u64, 0u64), |(r, w), p| {
                let u = p.disk_usage();
                (
                    r.saturating_add(u.total_read_bytes),
                    w.saturating_add(u.total_written_bytes),
                )
            });
            let now = Instant::now();
            let mut guard = lock(&last_disk_io, "disk io baseline")?;
            let reading = match guard.as_ref() {
                Some(((pr, pw), prev_ts)) => {
                    let dt = now.duration_since(*prev_ts).as_secs_f64();
                    DiskIoReading {
                        read_kbps: per_sec(read.saturating_sub(*pr), dt),
                        write_kbps: per_sec(written.saturating_sub(*pw), dt),
                    }
                }
                None => DiskIoReading::default(),
            };
            *guard = Some(((read, written), now));
            Ok(reading)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }

    #[instrument(skip(self), fields(provider = "sysinfo", operation = "uptime_seconds"))]
    async fn uptime_seconds(&self) -> anyhow::Result<u64> {
        Ok(System::uptime())
    }

    /// Top processes by CPU. CPU is normalised to whole-machine percent; disk KB/s is the
    /// per-process I/O delta since the previous listing.
    #[instrument(skip(self), fields(provider = "sysinfo", operation = "processes"))]
    async fn processes(&self) -> anyhow::Result<Vec<ProcessSample>> {
        let sys = self.sys.clone();
        let last_process_io = self.last_process_io.clone();
        tokio::task::spawn_blocking(move || {
            let mut sys = lock(&sys, "system")?;
            sys.refresh_processes(ProcessesToUpdate::All, true);
            let cpus = sys.cpus().len().max(1) as f64;
            let total_mem = sys.total_memory();

            let now = Instant::now();
            let mut guard = lock(&last_process_io, "process io baseline")?;
            let prev = guard.take();
            let dt = prev
                .as_ref()
                .map(|(_, ts)| now.duration_since(*ts).as_secs_f64());

            let mut io_totals: HashMap<u32, u64> = HashMap::with_capacity(sys.processes().len());
            let mut list: Vec<ProcessSample> = sys
                .processes()
                .iter()
                .map(|(pid, p)| {
                    let pid = pid.as_u32();
                    let u = p.disk_usage();
                    let io_total = u.total_read_bytes.saturating_add(u.total_written_bytes);
                    io_totals.insert(pid, io_total);
                    let disk_kbps = match (&prev, dt) {
                        (Some((prev_io, _)), Some(dt)) => prev_io
                            .get(&pid)
                            .map(|before| per_sec(io_total.saturating_sub(*before), dt)),
                        _ => None,
                    };
                    ProcessSample {
                        pid: Some(pid),
                        name: p.name().to_string_lossy().into_owned(),
                        command: p.exe().map(|e| e.to_string_lossy().into_owned()),
                        cpu: p.cpu_usage() as f64 / cpus,
                        mem: if total_mem > 0 {
                            (p.memory() as f64 / total_mem as f64) * 100.0
                        } else {
                            0.0
                        },
                        net_kbps: None,
                        disk_kbps,
                    }
                })
                .collect();
            *guard = Some((io_totals, now));

            list.sort_by(|a, b| b.cpu.total_cmp(&a.cpu));
            list.truncate(TOP_PROCESSES);
            Ok(list)
        })
        .await
        .map_err(|e| anyhow::anyhow!("sysinfo task join: {}", e))?
    }
}
