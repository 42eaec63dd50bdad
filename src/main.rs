use anyhow::Result;
use labmon::*;
use std::sync::Arc;

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

#[tokio::main]
async fn main() -> Result<()> {
    logging::init();

    let app_config = config::AppConfig::load()?;
    let server_config = app_config.server()?.clone();

    let store = store::connect(&app_config.store).await?;
    let aggregator = Arc::new(query::QueryAggregator::new(
        store.clone(),
        app_config.query.clone(),
    ));

    let maintenance_handle = maintenance::spawn(
        store.clone(),
        maintenance::MaintenanceWorkerConfig {
            prune_interval_secs: app_config.maintenance.prune_interval_secs,
            retention_days: app_config.store.retention_days,
            vacuum_schedule: app_config.maintenance.vacuum_schedule.clone(),
            vacuum_interval_secs: app_config.maintenance.vacuum_interval_secs,
        },
    );

    let app = routes::app(store, aggregator);
    let addr = format!("{}:{}", server_config.host, server_config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            logging::shutdown_signal().await;
            tracing::info!("Received shutdown signal");
        })
        .await?;
    maintenance_handle.abort();

    Ok(())
}
