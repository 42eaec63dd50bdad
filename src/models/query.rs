// Query-time outputs: buckets, average snapshots and rankings. Never persisted.

use serde::{Deserialize, Serialize};

use super::Readings;

/// Per-field means over the Metrics that fell into one fixed-width window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bucket {
    /// Bucket start, epoch ms (aligned to the bucket width).
    pub timestamp: i64,
    pub count: u64,
    #[serde(flatten)]
    pub readings: Readings,
}

/// Mean over a machine's last N Metrics. Timestamp and uptime come from the newest one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineAverage {
    pub machine_id: String,
    pub lab_id: String,
    pub count: u64,
    pub timestamp: i64,
    #[serde(flatten)]
    pub readings: Readings,
    pub uptime_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRank {
    pub name: String,
    pub avg_cpu: f64,
    pub avg_mem: f64,
    pub avg_net: f64,
    #[serde(rename = "avgDiskKBps")]
    pub avg_disk_kbps: f64,
    pub samples: u64,
}

/// Top-3 process lists. Net and disk lists stay empty unless some process reported a
/// positive mean for that field.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessRankings {
    pub top_by_cpu: Vec<ProcessRank>,
    pub top_by_mem: Vec<ProcessRank>,
    pub top_by_net: Vec<ProcessRank>,
    pub top_by_disk: Vec<ProcessRank>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRank {
    pub machine_id: String,
    pub avg_cpu_load_percent: f64,
    pub avg_mem_used_percent: f64,
    pub avg_disk_used_percent: f64,
    #[serde(rename = "avgNetKBps")]
    pub avg_net_kbps: f64,
    pub samples: u64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MachineRankings {
    pub top_pcs_by_disk: Vec<MachineRank>,
    pub top_pcs_by_net: Vec<MachineRank>,
    pub top_pcs_by_cpu: Vec<MachineRank>,
    pub top_pcs_by_mem: Vec<MachineRank>,
}

/// Lab-wide mean over the last N Metrics plus process and machine rankings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LabAverage {
    pub lab_id: String,
    pub count: u64,
    pub timestamp: i64,
    #[serde(flatten)]
    pub readings: Readings,
    pub uptime_seconds: u64,
    pub processes: ProcessRankings,
    #[serde(flatten)]
    pub machines: MachineRankings,
}
