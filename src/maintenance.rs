// Background maintenance: prune Metrics past retention, compact the store.
// Compaction runs on a configurable schedule (cron expression or fixed interval).

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, instrument, warn};

use crate::models::now_ms;
use crate::store::MetricStore;

const MS_PER_DAY: i64 = 86_400_000;

/// Config for the maintenance worker.
#[derive(Debug, Clone)]
pub struct MaintenanceWorkerConfig {
    pub prune_interval_secs: u64,
    pub retention_days: u32,
    /// Optional cron expression for compaction (e.g. "0 0 3 * * *" = 03:00 daily). Uses local time.
    pub vacuum_schedule: Option<String>,
    /// Compact every N seconds when vacuum_schedule is not set.
    pub vacuum_interval_secs: u64,
}

/// Spawns the maintenance worker. Returns a join handle.
pub fn spawn(
    store: Arc<dyn MetricStore>,
    config: MaintenanceWorkerConfig,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        run(store, config).await;
    })
}

#[instrument(skip(store), fields(store = store.name(), interval_secs = config.prune_interval_secs))]
async fn run(store: Arc<dyn MetricStore>, config: MaintenanceWorkerConfig) {
    let mut prune_interval = tokio::time::interval(Duration::from_secs(config.prune_interval_secs));
    prune_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let (vacuum_tx, mut vacuum_rx) = tokio::sync::mpsc::channel::<()>(1);
    tokio::spawn(vacuum_scheduler(config.clone(), vacuum_tx));

    loop {
        tokio::select! {
            _ = prune_interval.tick() => {
                match run_one_tick(store.as_ref(), &config, now_ms()).await {
                    Ok(0) => {}
                    Ok(pruned) => info!(pruned, "pruned metrics past retention"),
                    Err(e) => warn!(error = %e, operation = "prune", "prune tick failed"),
                }
            }
            // Disabled once the scheduler exits and drops its sender.
            Some(()) = vacuum_rx.recv() => {
                if let Err(e) = store.compact().await {
                    warn!(error = %e, operation = "compact", "compact failed");
                } else {
                    info!("compact complete");
                }
            }
        }
    }
}

/// Sends a message on `tx` at each compaction time (cron or fixed interval). Uses local time for cron.
async fn vacuum_scheduler(config: MaintenanceWorkerConfig, tx: tokio::sync::mpsc::Sender<()>) {
    if let Some(ref cron_str) = config.vacuum_schedule {
        let Ok(schedule) = cron::Schedule::from_str(cron_str) else {
            warn!(cron = %cron_str, "invalid vacuum_schedule; compaction will not run");
            return;
        };
        loop {
            let now = chrono::Local::now();
            let next = schedule.after(&now).next();
            if let Some(next) = next {
                let delay = (next - now).to_std().unwrap_or(Duration::from_secs(1));
                tokio::time::sleep(delay).await;
                if tx.send(()).await.is_err() {
                    break;
                }
            } else {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        }
    } else {
        let interval = Duration::from_secs(config.vacuum_interval_secs);
        loop {
            tokio::time::sleep(interval).await;
            if tx.send(()).await.is_err() {
                break;
            }
        }
    }
}

/// Deletes Metrics older than the retention window relative to `now_ms`. Returns rows removed.
pub async fn run_one_tick(
    store: &dyn MetricStore,
    config: &MaintenanceWorkerConfig,
    now_ms: i64,
) -> anyhow::Result<u64> {
    let cutoff = now_ms - (config.retention_days as i64) * MS_PER_DAY;
    store.prune_older_than(cutoff).await
}
