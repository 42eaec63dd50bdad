// In-memory metric store for tests and local runs. Selected explicitly via config.

use std::collections::BTreeSet;
use std::sync::RwLock;

use async_trait::async_trait;

use super::{MetricFilter, MetricStore};
use crate::aggregation;
use crate::models::{Bucket, Metric};

#[derive(Default)]
pub struct MemoryStore {
    metrics: RwLock<Vec<Metric>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> anyhow::Result<std::sync::RwLockReadGuard<'_, Vec<Metric>>> {
        self.metrics
            .read()
            .map_err(|e| anyhow::anyhow!("memory store lock poisoned: {}", e))
    }

    fn write(&self) -> anyhow::Result<std::sync::RwLockWriteGuard<'_, Vec<Metric>>> {
        self.metrics
            .write()
            .map_err(|e| anyhow::anyhow!("memory store lock poisoned: {}", e))
    }

    fn recent_sync(&self, filter: MetricFilter<'_>, limit: u32) -> anyhow::Result<Vec<Metric>> {
        let metrics = self.read()?;
        // Newest insert first, then a stable sort by time: ties resolve like `id DESC`.
        let mut matched: Vec<&Metric> = metrics
            .iter()
            .rev()
            .filter(|m| filter.machine_id.is_none_or(|id| m.machine_id == id))
            .filter(|m| filter.lab_id.is_none_or(|id| m.lab_id == id))
            .collect();
        matched.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(matched
            .into_iter()
            .take(limit as usize)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl MetricStore for MemoryStore {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn insert(&self, metric: &Metric) -> anyhow::Result<()> {
        metric.validate()?;
        self.write()?.push(metric.clone());
        Ok(())
    }

    async fn recent(&self, filter: MetricFilter<'_>, limit: u32) -> anyhow::Result<Vec<Metric>> {
        self.recent_sync(filter, limit)
    }

    async fn machine_ids(&self, lab_id: Option<&str>) -> anyhow::Result<Vec<String>> {
        let metrics = self.read()?;
        let ids: BTreeSet<&str> = metrics
            .iter()
            .filter(|m| lab_id.is_none_or(|id| m.lab_id == id))
            .map(|m| m.machine_id.as_str())
            .collect();
        Ok(ids.into_iter().map(String::from).collect())
    }

    async fn lab_ids(&self) -> anyhow::Result<Vec<String>> {
        let metrics = self.read()?;
        let ids: BTreeSet<&str> = metrics.iter().map(|m| m.lab_id.as_str()).collect();
        Ok(ids.into_iter().map(String::from).collect())
    }

    async fn lab_buckets(
        &self,
        lab_id: &str,
        limit: u32,
        width_ms: i64,
    ) -> anyhow::Result<Vec<Bucket>> {
        anyhow::ensure!(width_ms > 0, "bucket width must be > 0, got {}", width_ms);
        let newest = self.recent_sync(MetricFilter::lab(lab_id), limit)?;
        Ok(aggregation::bucket_metrics(&newest, width_ms))
    }

    async fn prune_older_than(&self, cutoff_ms: i64) -> anyhow::Result<u64> {
        let mut metrics = self.write()?;
        let before = metrics.len();
        metrics.retain(|m| m.timestamp >= cutoff_ms);
        Ok((before - metrics.len()) as u64)
    }
}
