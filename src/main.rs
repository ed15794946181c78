//! `clusterflowd`: runs the cluster workflows over a durable SQLite store.

mod config;

use anyhow::{Context, Result};
use clusterflow_cluster::{
    register_cluster_flows, ClusterFlowDeps, ClusterManager, ClusterRepository,
    InMemoryClusterRepository, LocalOperationExecutor, LocalResourceAllocator,
};
use clusterflow_core::{FlowEngine, FlowRegistry, FlowRuntime};
use clusterflow_state_sqlite::SqliteStateStoreProvider;
use std::sync::Arc;
use tracing::{error, info};

use crate::config::DaemonConfig;

#[tokio::main]
async fn main() -> Result<()> {
    let config = DaemonConfig::load().context("Failed to load configuration")?;

    clusterflow_monitoring::init_logging(&config.logging)
        .context("Failed to initialize logging")?;

    let store = SqliteStateStoreProvider::with_config(config.storage.clone())
        .await
        .context("Failed to open state store")?;

    let clusters: Arc<dyn ClusterRepository> = Arc::new(InMemoryClusterRepository::new());
    let deps = ClusterFlowDeps::new(
        clusters.clone(),
        Arc::new(LocalResourceAllocator::new(config.local.host_capacity)),
        Arc::new(LocalOperationExecutor::new(config.local.operation_checks)),
    )
    .with_polling(config.operations.policy())
    .with_transport_dir(config.transport.work_dir.clone());

    let mut registry = FlowRegistry::new();
    register_cluster_flows(&mut registry, &deps).context("Failed to register cluster workflows")?;
    info!(templates = ?registry.names(), "Registered workflows");

    let runtime = FlowRuntime::new(Arc::new(registry), store.gateway(), config.engine.clone());
    let engine = Arc::new(FlowEngine::new(runtime));

    let report = engine.recover().await.context("Failed to recover flow instances")?;
    info!(
        rearmed = report.rearmed,
        resumed = report.resumed,
        skipped = report.skipped,
        "Recovered flow instances"
    );

    engine.start_scheduler().await;

    let manager = ClusterManager::new(engine.clone(), clusters);
    for request in config.bootstrap_clusters.iter().cloned() {
        let name = request.name.clone();
        match manager.create_cluster(request).await {
            Ok(started) => info!(
                cluster = %name,
                cluster_id = %started.cluster_id,
                workflow_id = %started.workflow_id,
                "Bootstrap cluster requested"
            ),
            Err(e) => error!(cluster = %name, error = %e, "Bootstrap cluster rejected"),
        }
    }

    info!(service = %config.logging.service_name, "clusterflowd running; press ctrl-c to stop");
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for shutdown signal")?;

    info!("Shutting down");
    engine.shutdown().await;
    store.connection().close().await;
    Ok(())
}
