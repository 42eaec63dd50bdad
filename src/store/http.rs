// Write-only store for agents: each insert is one POST to a labmon-server's ingest route.
// Reads belong to the server, which owns the shared store.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use tracing::instrument;

use super::{MetricFilter, MetricStore};
use crate::models::{Bucket, Metric};

pub struct HttpStore {
    client: Client,
    ingest_url: String,
}

impl HttpStore {
    pub fn new(base_url: &str, request_timeout_secs: u64) -> anyhow::Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(request_timeout_secs))
            .build()?;
        Ok(Self {
            client,
            ingest_url: format!("{}/api/metrics", base_url.trim_end_matches('/')),
        })
    }

    fn write_only(operation: &str) -> anyhow::Error {
        anyhow::anyhow!(
            "http store is write-only; {} must be served by labmon-server",
            operation
        )
    }
}

#[async_trait]
impl MetricStore for HttpStore {
    fn name(&self) -> &'static str {
        "http"
    }

    #[instrument(skip(self, metric), fields(store = "http", operation = "insert", machine_id = %metric.machine_id, sample_count = metric.sample_count))]
    async fn insert(&self, metric: &Metric) -> anyhow::Result<()> {
        metric.validate()?;
        self.client
            .post(&self.ingest_url)
            .json(metric)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }

    async fn recent(&self, _filter: MetricFilter<'_>, _limit: u32) -> anyhow::Result<Vec<Metric>> {
        Err(Self::write_only("recent"))
    }

    async fn machine_ids(&self, _lab_id: Option<&str>) -> anyhow::Result<Vec<String>> {
        Err(Self::write_only("machine_ids"))
    }

    async fn lab_ids(&self) -> anyhow::Result<Vec<String>> {
        Err(Self::write_only("lab_ids"))
    }

    async fn lab_buckets(
        &self,
        _lab_id: &str,
        _limit: u32,
        _width_ms: i64,
    ) -> anyhow::Result<Vec<Bucket>> {
        Err(Self::write_only("lab_buckets"))
    }

    async fn prune_older_than(&self, _cutoff_ms: i64) -> anyhow::Result<u64> {
        Err(Self::write_only("prune_older_than"))
    }
}
