// Persisted-record backends. One implementation is picked from config at startup and
// shared as Arc<dyn MetricStore> by the flusher (writes) and the query engine (reads).
// Agents on other machines reach the server's store through the http backend.

mod blob;
pub mod http;
pub mod memory;
pub mod sqlite;

use std::sync::Arc;

use async_trait::async_trait;

use crate::config::{StoreBackend, StoreConfig};
use crate::models::{Bucket, Metric};

pub use http::HttpStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Equality scope for `recent`. `None` matches any value.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricFilter<'a> {
    pub machine_id: Option<&'a str>,
    pub lab_id: Option<&'a str>,
}

impl<'a> MetricFilter<'a> {
    pub fn machine(machine_id: &'a str, lab_id: &'a str) -> Self {
        Self {
            machine_id: Some(machine_id),
            lab_id: Some(lab_id),
        }
    }

    pub fn lab(lab_id: &'a str) -> Self {
        Self {
            machine_id: None,
            lab_id: Some(lab_id),
        }
    }
}

#[async_trait]
pub trait MetricStore: Send + Sync {
    /// Backend name for logs.
    fn name(&self) -> &'static str;

    /// Persists exactly one Metric. Rejects records that fail validation.
    async fn insert(&self, metric: &Metric) -> anyhow::Result<()>;

    /// Up to `limit` Metrics matching `filter`, newest first.
    async fn recent(&self, filter: MetricFilter<'_>, limit: u32) -> anyhow::Result<Vec<Metric>>;

    /// Distinct machine ids, optionally scoped to a lab. Sorted ascending.
    async fn machine_ids(&self, lab_id: Option<&str>) -> anyhow::Result<Vec<String>>;

    /// Distinct lab ids. Sorted ascending.
    async fn lab_ids(&self) -> anyhow::Result<Vec<String>>;

    /// The lab's newest `limit` Metrics grouped into `width_ms` windows
    /// (count + per-field means), ascending by window start.
    async fn lab_buckets(
        &self,
        lab_id: &str,
        limit: u32,
        width_ms: i64,
    ) -> anyhow::Result<Vec<Bucket>>;

    /// Deletes Metrics with timestamp < cutoff_ms. Returns rows removed.
    async fn prune_older_than(&self, cutoff_ms: i64) -> anyhow::Result<u64>;

    /// Reclaims space after pruning, where the backend supports it.
    async fn compact(&self) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Builds the configured backend. The choice is made once and logged; there is no fallback.
pub async fn connect(config: &StoreConfig) -> anyhow::Result<Arc<dyn MetricStore>> {
    let store: Arc<dyn MetricStore> = match config.backend {
        StoreBackend::Sqlite => {
            let store = SqliteStore::connect(&config.path, config.max_pool_size).await?;
            store.init().await?;
            Arc::new(store)
        }
        StoreBackend::Memory => Arc::new(MemoryStore::new()),
        StoreBackend::Http => Arc::new(HttpStore::new(&config.url, config.request_timeout_secs)?),
    };
    tracing::info!(
        backend = store.name(),
        path = %config.path,
        url = %config.url,
        "metric store ready"
    );
    Ok(store)
}
