use anyhow::Result;
use labmon::*;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let app_config = config::AppConfig::load()?;
    let agent_config = app_config.agent()?;
    let machine_id = if agent_config.machine_id.trim().is_empty() {
        provider::host_name()
            .ok_or_else(|| anyhow::anyhow!("agent.machine_id unset and host name unavailable"))?
    } else {
        agent_config.machine_id.clone()
    };
    let lab_id = agent_config.lab_id.clone();

    let store = store::connect(&app_config.store).await?;
    let buffer = Arc::new(buffer::LocalBuffer::open(&agent_config.buffer_path).await?);
    let sampler = Arc::new(sampler::Sampler::new(
        Arc::new(provider::SysinfoProvider::new()),
        machine_id.clone(),
        lab_id.clone(),
    ));
    let flusher = Arc::new(flusher::Flusher::new(
        buffer.clone(),
        store,
        machine_id.clone(),
        lab_id.clone(),
    ));
    tracing::info!(
        machine_id = %machine_id,
        lab_id = %lab_id,
        buffer = %buffer.path().display(),
        "agent started"
    );

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let agent_handle = agent::spawn(
        agent::AgentDeps {
            sampler,
            buffer,
            flusher,
            stats: Arc::new(agent::AgentStats::default()),
            shutdown_rx,
        },
        agent::AgentConfig {
            sample_interval_secs: agent_config.sample_interval_secs,
            batch_interval_secs: agent_config.batch_interval_secs,
            stats_log_interval_secs: agent_config.stats_log_interval_secs,
        },
    );

    logging::shutdown_signal().await;
    tracing::info!("Received shutdown signal");
    let _ = shutdown_tx.send(());
    let _ = agent_handle.await;

    Ok(())
}
