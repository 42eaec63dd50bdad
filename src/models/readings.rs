// Numeric reading fields shared by samples, metrics, buckets and averages.

use serde::{Deserialize, Serialize};

/// The gauge fields every Sample and Metric carries. Means are computed field-by-field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Readings {
    pub cpu_load_percent: f64,
    pub mem_used_percent: f64,
    pub disk_used_percent: f64,
    pub net_used_percent: f64,
    #[serde(rename = "netKBps")]
    pub net_kbps: f64,
    #[serde(rename = "netRxKBps")]
    pub net_rx_kbps: f64,
    #[serde(rename = "netTxKBps")]
    pub net_tx_kbps: f64,
    #[serde(rename = "diskReadKBps")]
    pub disk_read_kbps: f64,
    #[serde(rename = "diskWriteKBps")]
    pub disk_write_kbps: f64,
}

impl Readings {
    /// Unweighted mean of each field. An empty input yields all zeros.
    pub fn mean<'a, I>(items: I) -> Self
    where
        I: IntoIterator<Item = &'a Readings>,
    {
        let mut acc = ReadingsAccumulator::default();
        for r in items {
            acc.add(r);
        }
        acc.mean()
    }
}

/// Running per-field sums plus a count; `mean()` divides by the count (0 when empty).
#[derive(Debug, Clone, Copy, Default)]
pub struct ReadingsAccumulator {
    sum: Readings,
    count: u64,
}

impl ReadingsAccumulator {
    pub fn add(&mut self, r: &Readings) {
        let s = &mut self.sum;
        s.cpu_load_percent += r.cpu_load_percent;
        s.mem_used_percent += r.mem_used_percent;
        s.disk_used_percent += r.disk_used_percent;
        s.net_used_percent += r.net_used_percent;
        s.net_kbps += r.net_kbps;
        s.net_rx_kbps += r.net_rx_kbps;
        s.net_tx_kbps += r.net_tx_kbps;
        s.disk_read_kbps += r.disk_read_kbps;
        s.disk_write_kbps += r.disk_write_kbps;
        self.count += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> Readings {
        if self.count == 0 {
            return Readings::default();
        }
        let n = self.count as f64;
        let s = &self.sum;
        Readings {
            cpu_load_percent: s.cpu_load_percent / n,
            mem_used_percent: s.mem_used_percent / n,
            disk_used_percent: s.disk_used_percent / n,
            net_used_percent: s.net_used_percent / n,
            net_kbps: s.net_kbps / n,
            net_rx_kbps: s.net_rx_kbps / n,
            net_tx_kbps: s.net_tx_kbps / n,
            disk_read_kbps: s.disk_read_kbps / n,
            disk_write_kbps: s.disk_write_kbps / n,
        }
    }
}
