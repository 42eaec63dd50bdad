// Agent loop: sample ticks append to the local buffer, batch ticks flush it to the store.
// Both run in one task so a drain-and-clear never races an append.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::time::{Duration, interval};
use tracing::Instrument;

use crate::buffer::LocalBuffer;
use crate::flusher::{FlushOutcome, Flusher};
use crate::sampler::Sampler;

/// Counters reported by the stats log. Shared so callers can read them after shutdown.
#[derive(Debug, Default)]
pub struct AgentStats {
    pub samples_appended: AtomicU64,
    pub append_failures: AtomicU64,
    pub flushes: AtomicU64,
    pub flush_failures: AtomicU64,
    pub samples_flushed: AtomicU64,
}

/// Sampler, buffer, flusher and shutdown for the agent.
pub struct AgentDeps {
    pub sampler: Arc<Sampler>,
    pub buffer: Arc<LocalBuffer>,
    pub flusher: Arc<Flusher>,
    pub stats: Arc<AgentStats>,
    pub shutdown_rx: tokio::sync::oneshot::Receiver<()>,
}

/// Agent timing. Sampling and batching are independent real-time intervals.
pub struct AgentConfig {
    pub sample_interval_secs: u64,
    pub batch_interval_secs: u64,
    pub stats_log_interval_secs: u64,
}

pub fn spawn(deps: AgentDeps, config: AgentConfig) -> tokio::task::JoinHandle<()> {
    let AgentDeps {
        sampler,
        buffer,
        flusher,
        stats,
        mut shutdown_rx,
    } = deps;
    let AgentConfig {
        sample_interval_secs,
        batch_interval_secs,
        stats_log_interval_secs,
    } = config;

    let agent_span = tracing::span!(
        tracing::Level::DEBUG,
        "agent",
        machine_id = sampler.machine_id(),
        lab_id = sampler.lab_id()
    );

    let task = async move {
        let mut sample_tick = interval(Duration::from_secs(sample_interval_secs));
        sample_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let mut flush_tick = interval(Duration::from_secs(batch_interval_secs));
        flush_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        // The first tick of an interval fires immediately; skip it so a batch spans a full window.
        flush_tick.reset();
        let mut stats_log_tick = interval(Duration::from_secs(stats_log_interval_secs));
        stats_log_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        stats_log_tick.reset();

        loop {
            tokio::select! {
                _ = sample_tick.tick() => {
                    let sample = sampler.sample().await;
                    match buffer.append(&sample).await {
                        Ok(()) => {
                            stats.samples_appended.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            stats.append_failures.fetch_add(1, Ordering::Relaxed);
                            tracing::warn!(error = %e, operation = "append", "sample dropped");
                        }
                    }
                }
                _ = flush_tick.tick() => {
                    flush(&flusher, &stats).await;
                }
                _ = stats_log_tick.tick() => {
                    tracing::info!(
                        samples_appended = stats.samples_appended.load(Ordering::Relaxed),
                        append_failures = stats.append_failures.load(Ordering::Relaxed),
                        flushes = stats.flushes.load(Ordering::Relaxed),
                        flush_failures = stats.flush_failures.load(Ordering::Relaxed),
                        samples_flushed = stats.samples_flushed.load(Ordering::Relaxed),
                        "agent stats"
                    );
                }
                _ = &mut shutdown_rx => {
                    tracing::debug!("Agent shutting down");
                    break;
                }
            }
        }

        // Best effort; on failure the buffer stays on disk for the next run.
        flush(&flusher, &stats).await;
    };
    tokio::spawn(task.instrument(agent_span))
}

async fn flush(flusher: &Flusher, stats: &AgentStats) {
    match flusher.flush_once().await {
        Ok(FlushOutcome::Empty) => {}
        Ok(FlushOutcome::Flushed { sample_count }) => {
            stats.flushes.fetch_add(1, Ordering::Relaxed);
            stats
                .samples_flushed
                .fetch_add(sample_count, Ordering::Relaxed);
        }
        Err(e) => {
            stats.flush_failures.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(error = %e, operation = "flush", "flush failed; buffer kept for retry");
        }
    }
}
