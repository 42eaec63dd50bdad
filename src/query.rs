// Dashboard query engine. Stateless: every call re-reads Metrics from the store
// and recomputes series, averages and rankings.

use std::sync::Arc;

use crate::aggregation::{self, LAB_BUCKET_WIDTH_MS};
use crate::config::QueryConfig;
use crate::models::{Bucket, LabAverage, MachineAverage, Metric, Readings};
use crate::store::{MetricFilter, MetricStore};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("{0} required")]
    MissingParameter(&'static str),
    /// An ingested Metric failed validation.
    #[error("invalid metric: {0}")]
    InvalidMetric(String),
    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

pub type QueryResult<T> = Result<T, QueryError>;

/// Clamps a requested limit to [1, max], using `default` when absent.
pub fn clamp_limit(requested: Option<u32>, default: u32, max: u32) -> u32 {
    requested.unwrap_or(default).clamp(1, max.max(1))
}

fn required<'a>(value: Option<&'a str>, name: &'static str) -> QueryResult<&'a str> {
    value
        .filter(|v| !v.is_empty())
        .ok_or(QueryError::MissingParameter(name))
}

pub struct QueryAggregator {
    store: Arc<dyn MetricStore>,
    limits: QueryConfig,
}

impl QueryAggregator {
    pub fn new(store: Arc<dyn MetricStore>, limits: QueryConfig) -> Self {
        Self { store, limits }
    }

    pub async fn labs(&self) -> QueryResult<Vec<String>> {
        Ok(self.store.lab_ids().await?)
    }

    pub async fn machines(&self, lab_id: Option<&str>) -> QueryResult<Vec<String>> {
        let lab_id = required(lab_id, "labId")?;
        Ok(self.store.machine_ids(Some(lab_id)).await?)
    }

    /// Last N Metrics of one machine, oldest first.
    pub async fn series(
        &self,
        machine_id: Option<&str>,
        lab_id: Option<&str>,
        limit: Option<u32>,
    ) -> QueryResult<Vec<Metric>> {
        let machine_id = required(machine_id, "pcId")?;
        let lab_id = required(lab_id, "labId")?;
        let limit = clamp_limit(
            limit,
            self.limits.series_default_limit,
            self.limits.series_max_limit,
        );
        let mut metrics = self
            .store
            .recent(MetricFilter::machine(machine_id, lab_id), limit)
            .await?;
        metrics.reverse();
        Ok(metrics)
    }

    /// Mean of one machine's last N Metrics. Timestamp and uptime come from the newest.
    pub async fn machine_average(
        &self,
        machine_id: Option<&str>,
        lab_id: Option<&str>,
        limit: Option<u32>,
    ) -> QueryResult<Option<MachineAverage>> {
        let machine_id = required(machine_id, "pcId")?;
        let lab_id = required(lab_id, "labId")?;
        let limit = clamp_limit(
            limit,
            self.limits.machine_avg_default_limit,
            self.limits.machine_avg_max_limit,
        );
        let metrics = self
            .store
            .recent(MetricFilter::machine(machine_id, lab_id), limit)
            .await?;
        let Some(newest) = metrics.first() else {
            return Ok(None);
        };
        Ok(Some(MachineAverage {
            machine_id: machine_id.to_string(),
            lab_id: lab_id.to_string(),
            count: metrics.len() as u64,
            timestamp: newest.timestamp,
            readings: Readings::mean(metrics.iter().map(|m| &m.readings)),
            uptime_seconds: newest.uptime_seconds,
        }))
    }

    /// The lab's last N Metrics in 10 s buckets, oldest bucket first.
    pub async fn lab_series(
        &self,
        lab_id: Option<&str>,
        limit: Option<u32>,
    ) -> QueryResult<Vec<Bucket>> {
        let lab_id = required(lab_id, "labId")?;
        let limit = clamp_limit(
            limit,
            self.limits.lab_series_default_limit,
            self.limits.lab_series_max_limit,
        );
        Ok(self
            .store
            .lab_buckets(lab_id, limit, LAB_BUCKET_WIDTH_MS)
            .await?)
    }

    /// Mean of the lab's last N Metrics plus top process and machine rankings.
    pub async fn lab_average(
        &self,
        lab_id: Option<&str>,
        limit: Option<u32>,
    ) -> QueryResult<Option<LabAverage>> {
        let lab_id = required(lab_id, "labId")?;
        let limit = clamp_limit(
            limit,
            self.limits.lab_avg_default_limit,
            self.limits.lab_avg_max_limit,
        );
        let metrics = self.store.recent(MetricFilter::lab(lab_id), limit).await?;
        let Some(newest) = metrics.first() else {
            return Ok(None);
        };
        Ok(Some(LabAverage {
            lab_id: lab_id.to_string(),
            count: metrics.len() as u64,
            timestamp: newest.timestamp,
            readings: Readings::mean(metrics.iter().map(|m| &m.readings)),
            uptime_seconds: newest.uptime_seconds,
            processes: aggregation::rank_processes(&metrics),
            machines: aggregation::rank_machines(&metrics),
        }))
    }
}
