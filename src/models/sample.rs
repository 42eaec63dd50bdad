// Sample (one tick on the collecting host), Metric (one persisted record) and process entries.

use serde::{Deserialize, Serialize};
use wincode::{SchemaRead, SchemaWrite};

use super::Readings;

/// One process as seen by the provider. Net/disk are only present when the provider
/// reports them; absence is distinct from a reported zero.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, SchemaRead, SchemaWrite)]
#[serde(rename_all = "camelCase")]
pub struct ProcessSample {
    #[serde(default)]
    pub pid: Option<u32>,
    #[serde(default)]
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,
    #[serde(default)]
    pub cpu: f64,
    #[serde(default)]
    pub mem: f64,
    #[serde(
        rename = "netKBps",
        alias = "netKB",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub net_kbps: Option<f64>,
    #[serde(
        rename = "diskKBps",
        alias = "io",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub disk_kbps: Option<f64>,
}

impl ProcessSample {
    /// Grouping key: name, else command, else pid, else "unknown".
    pub fn identity(&self) -> String {
        if !self.name.is_empty() {
            return self.name.clone();
        }
        if let Some(cmd) = self.command.as_deref().filter(|c| !c.is_empty()) {
            return cmd.to_string();
        }
        match self.pid {
            Some(pid) => pid.to_string(),
            None => "unknown".to_string(),
        }
    }
}

/// One instantaneous reading from a machine; the unit the local buffer stores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    pub machine_id: String,
    pub lab_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    #[serde(flatten)]
    pub readings: Readings,
    pub uptime_seconds: u64,
    #[serde(default)]
    pub processes: Vec<ProcessSample>,
}

impl Sample {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_ids(&self.machine_id, &self.lab_id)
    }
}

/// A persisted record. `sample_count == 1` is a raw passthrough, `> 1` a flushed average.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Metric {
    pub machine_id: String,
    pub lab_id: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
    pub sample_count: u64,
    #[serde(flatten)]
    pub readings: Readings,
    pub uptime_seconds: u64,
    #[serde(default)]
    pub processes: Vec<ProcessSample>,
}

impl Metric {
    pub fn validate(&self) -> anyhow::Result<()> {
        validate_ids(&self.machine_id, &self.lab_id)?;
        anyhow::ensure!(
            self.sample_count >= 1,
            "metric sampleCount must be >= 1, got {}",
            self.sample_count
        );
        Ok(())
    }
}

impl From<Sample> for Metric {
    fn from(s: Sample) -> Self {
        Metric {
            machine_id: s.machine_id,
            lab_id: s.lab_id,
            timestamp: s.timestamp,
            sample_count: 1,
            readings: s.readings,
            uptime_seconds: s.uptime_seconds,
            processes: s.processes,
        }
    }
}

fn validate_ids(machine_id: &str, lab_id: &str) -> anyhow::Result<()> {
    anyhow::ensure!(!machine_id.trim().is_empty(), "machineId must be non-empty");
    anyhow::ensure!(!lab_id.trim().is_empty(), "labId must be non-empty");
    Ok(())
}
