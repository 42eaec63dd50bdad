// Flusher: drains the local buffer, averages it into one Metric and persists it.
// The buffer is cleared only after the store confirms the write.

use std::sync::Arc;

use tracing::instrument;

use crate::aggregation;
use crate::buffer::LocalBuffer;
use crate::models::now_ms;
use crate::store::MetricStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushOutcome {
    /// Nothing buffered; the store was not touched.
    Empty,
    Flushed { sample_count: u64 },
}

pub struct Flusher {
    buffer: Arc<LocalBuffer>,
    store: Arc<dyn MetricStore>,
    machine_id: String,
    lab_id: String,
}

impl Flusher {
    pub fn new(
        buffer: Arc<LocalBuffer>,
        store: Arc<dyn MetricStore>,
        machine_id: String,
        lab_id: String,
    ) -> Self {
        Self {
            buffer,
            store,
            machine_id,
            lab_id,
        }
    }

    /// One batch window. On any error the buffer is left as it was.
    #[instrument(skip(self), fields(store = self.store.name(), operation = "flush"))]
    pub async fn flush_once(&self) -> anyhow::Result<FlushOutcome> {
        let samples = self.buffer.read_all().await?;
        let Some(metric) =
            aggregation::average_samples(&samples, &self.machine_id, &self.lab_id, now_ms())
        else {
            return Ok(FlushOutcome::Empty);
        };
        self.store.insert(&metric).await?;
        self.buffer.clear().await?;
        tracing::debug!(
            sample_count = metric.sample_count,
            timestamp = metric.timestamp,
            "batch flushed"
        );
        Ok(FlushOutcome::Flushed {
            sample_count: metric.sample_count,
        })
    }
}
