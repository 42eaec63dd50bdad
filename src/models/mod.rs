// Domain models: buffered samples, persisted metrics and query outputs

mod query;
mod readings;
mod sample;

pub use query::{
    Bucket, LabAverage, MachineAverage, MachineRank, MachineRankings, ProcessRank,
    ProcessRankings,
};
pub use readings::{Readings, ReadingsAccumulator};
pub use sample::{Metric, ProcessSample, Sample};

/// Current wall-clock time as epoch milliseconds.
pub fn now_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_else(|e| {
            tracing::warn!(error = %e, operation = "get_timestamp", "system time error");
            0
        })
}
