//! Node executors of the cluster workflows.
//!
//! Steps that call external tooling are polling nodes. They invoke the
//! operation once, keep the handle in the flow context, and only check its
//! status on later attempts, so a re-invocation after a restart never
//! starts the operation twice.

use async_trait::async_trait;
use clusterflow_core::{
    ContextKey, CoreError, FlowContext, NodeExecutor, NodeOutcome, NodeState, OperationExecutor,
    OperationHandle, OperationKind, OperationParams, OperationStatus, ResourceAllocator,
    TopologyDemand,
};
use serde_json::{json, Value};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::context::{
    ALLOCATION, BACKUP_RECORD, CLUSTER_ID, IMPORT_CONFIG, SCALE_OUT_DEMANDS, TOPOLOGY,
    TRANSPORT_RECORD,
};
use crate::domain::cluster::{BackupRecord, Cluster, ClusterStatus, DataTransportRecord};
use crate::domain::repository::ClusterRepository;
use crate::error::ClusterError;
use crate::topology::TopologyConfig;
use crate::transport::{ImportConfig, IMPORT_CONFIG_FILE};

async fn load_cluster(clusters: &dyn ClusterRepository, ctx: &FlowContext) -> Result<Cluster, CoreError> {
    let cluster_id = ctx.fetch(CLUSTER_ID)?;
    match clusters.load(&cluster_id).await? {
        Some(cluster) => Ok(cluster),
        None => Err(ClusterError::ClusterNotFound(cluster_id).into()),
    }
}

async fn load_backup_record(clusters: &dyn ClusterRepository, ctx: &FlowContext) -> Result<BackupRecord, CoreError> {
    let record_id = ctx.fetch(BACKUP_RECORD)?;
    match clusters.load_backup_record(&record_id).await? {
        Some(record) => Ok(record),
        None => Err(ClusterError::BackupRecordNotFound(record_id).into()),
    }
}

async fn load_transport_record(
    clusters: &dyn ClusterRepository,
    ctx: &FlowContext,
) -> Result<DataTransportRecord, CoreError> {
    let record_id = ctx.fetch(TRANSPORT_RECORD)?;
    match clusters.load_transport_record(&record_id).await? {
        Some(record) => Ok(record),
        None => Err(ClusterError::TransportRecordNotFound(record_id).into()),
    }
}

/// Reserve hosts for the cluster's demands, or for the scale-out demands
/// when the flow carries them
pub struct PrepareResource {
    clusters: Arc<dyn ClusterRepository>,
    allocator: Arc<dyn ResourceAllocator>,
}

impl PrepareResource {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>, allocator: Arc<dyn ResourceAllocator>) -> Self {
        Self { clusters, allocator }
    }
}

#[async_trait]
impl NodeExecutor for PrepareResource {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        if ctx.find(ALLOCATION)?.is_some() {
            return Ok(NodeOutcome::Success);
        }

        let cluster = load_cluster(self.clusters.as_ref(), ctx).await?;
        let components = match ctx.find(SCALE_OUT_DEMANDS)? {
            Some(extra) => extra,
            None => cluster.demands.clone(),
        };
        let demand = TopologyDemand {
            cluster_id: cluster.id.clone(),
            components,
        };

        match self.allocator.allocate(&demand).await {
            Ok(allocation) => {
                info!(cluster_id = %cluster.id, hosts = allocation.hosts.len(), "Resources allocated");
                ctx.put(ALLOCATION, &allocation)?;
                Ok(NodeOutcome::Success)
            }
            Err(CoreError::AllocationError(reason)) => {
                warn!(cluster_id = %cluster.id, error = %reason, "Resource allocation refused");
                Ok(NodeOutcome::Failed(format!("allocation refused: {}", reason)))
            }
            Err(e) => Err(e),
        }
    }
}

/// Render the deploy or scale-out topology from the allocation
#[derive(Debug, Default, Clone, Copy)]
pub struct BuildConfig;

#[async_trait]
impl NodeExecutor for BuildConfig {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let allocation = ctx.fetch(ALLOCATION)?;
        let topology = if ctx.find(SCALE_OUT_DEMANDS)?.is_some() {
            TopologyConfig::for_scale_out(&allocation)
        } else {
            TopologyConfig::for_deploy(&allocation)
        };

        match topology {
            Ok(topology) => {
                ctx.put(TOPOLOGY, &topology)?;
                Ok(NodeOutcome::Success)
            }
            Err(ClusterError::InvalidTopology(reason)) => Ok(NodeOutcome::Failed(reason)),
            Err(e) => Err(e.into()),
        }
    }
}

/// Start an external operation and poll it to completion
pub struct RunOperation {
    kind: OperationKind,
    handle: ContextKey<OperationHandle>,
    clusters: Arc<dyn ClusterRepository>,
    operations: Arc<dyn OperationExecutor>,
}

impl RunOperation {
    /// Create the step; `handle` is where the running operation is remembered
    pub fn new(
        kind: OperationKind,
        handle: ContextKey<OperationHandle>,
        clusters: Arc<dyn ClusterRepository>,
        operations: Arc<dyn OperationExecutor>,
    ) -> Self {
        Self {
            kind,
            handle,
            clusters,
            operations,
        }
    }

    async fn payload(&self, cluster: &Cluster, ctx: &FlowContext) -> Result<Value, CoreError> {
        let payload = match self.kind {
            OperationKind::Deploy => json!({
                "name": cluster.name,
                "cluster_type": cluster.cluster_type,
                "version": cluster.version,
                "topology": ctx.fetch(TOPOLOGY)?.to_yaml()?,
            }),
            OperationKind::ScaleOut => json!({
                "name": cluster.name,
                "topology": ctx.fetch(TOPOLOGY)?.to_yaml()?,
            }),
            OperationKind::Backup | OperationKind::Restore => {
                let record = load_backup_record(self.clusters.as_ref(), ctx).await?;
                json!({
                    "name": cluster.name,
                    "record_id": record.id,
                    "storage_type": record.storage_type,
                    "file_path": record.file_path,
                })
            }
            OperationKind::Export => {
                let record = load_transport_record(self.clusters.as_ref(), ctx).await?;
                json!({
                    "name": cluster.name,
                    "record_id": record.id,
                    "storage_type": record.storage_type,
                    "file_type": record.file_type,
                    "file_path": record.file_path,
                    "filter": record.filter,
                })
            }
            OperationKind::Import => {
                let record = load_transport_record(self.clusters.as_ref(), ctx).await?;
                json!({
                    "name": cluster.name,
                    "record_id": record.id,
                    "storage_type": record.storage_type,
                    "file_path": record.file_path,
                    "config_path": ctx.fetch(IMPORT_CONFIG)?,
                })
            }
            OperationKind::Start
            | OperationKind::Stop
            | OperationKind::Destroy
            | OperationKind::DestroyTasks => json!({
                "name": cluster.name,
            }),
        };
        Ok(payload)
    }
}

#[async_trait]
impl NodeExecutor for RunOperation {
    async fn run(&self, node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        if let Some(handle) = ctx.find(self.handle)? {
            return match self.operations.check_status(&handle).await? {
                OperationStatus::Pending => Ok(NodeOutcome::Pending),
                OperationStatus::Success => {
                    info!(operation = %self.kind, handle = %handle, attempt = node.attempt, "Operation finished");
                    Ok(NodeOutcome::Success)
                }
                OperationStatus::Failed(reason) => {
                    Ok(NodeOutcome::Failed(format!("{} failed: {}", self.kind, reason)))
                }
            };
        }

        let cluster = load_cluster(self.clusters.as_ref(), ctx).await?;
        let params = OperationParams {
            kind: self.kind,
            cluster_id: cluster.id.clone(),
            payload: self.payload(&cluster, ctx).await?,
        };

        let handle = self.operations.invoke(&params).await?;
        info!(cluster_id = %cluster.id, operation = %self.kind, handle = %handle, "Operation started");
        node.result = Some(json!({ "handle": handle.0 }));
        ctx.put(self.handle, &handle)?;
        Ok(NodeOutcome::Pending)
    }
}

/// Record the allocated hosts and mark the cluster online
pub struct SetClusterOnline {
    clusters: Arc<dyn ClusterRepository>,
}

impl SetClusterOnline {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for SetClusterOnline {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut cluster = load_cluster(self.clusters.as_ref(), ctx).await?;
        let allocation = ctx.fetch(ALLOCATION)?;

        // A re-run after a restart must not count the added components twice.
        let already_recorded = allocation.hosts.iter().all(|host| {
            cluster
                .instances
                .iter()
                .any(|i| i.host_id == host.host_id && i.component_type == host.component_type)
        });
        if !already_recorded {
            if let Some(extra) = ctx.find(SCALE_OUT_DEMANDS)? {
                cluster.demands.extend(extra);
            }
        }

        cluster.bring_online(allocation.hosts);
        self.clusters.persist(&cluster).await?;
        info!(cluster_id = %cluster.id, instances = cluster.instances.len(), "Cluster online");
        Ok(NodeOutcome::Success)
    }
}

/// Mark the cluster deleted
pub struct DeleteCluster {
    clusters: Arc<dyn ClusterRepository>,
}

impl DeleteCluster {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for DeleteCluster {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut cluster = load_cluster(self.clusters.as_ref(), ctx).await?;
        cluster.mark_deleted();
        self.clusters.persist(&cluster).await?;
        Ok(NodeOutcome::Success)
    }
}

/// Return the cluster's hosts to the allocator
pub struct FreeResource {
    allocator: Arc<dyn ResourceAllocator>,
}

impl FreeResource {
    /// Create the step
    pub fn new(allocator: Arc<dyn ResourceAllocator>) -> Self {
        Self { allocator }
    }
}

#[async_trait]
impl NodeExecutor for FreeResource {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let cluster_id = ctx.fetch(CLUSTER_ID)?;
        self.allocator.release(&cluster_id).await?;
        info!(cluster_id = %cluster_id, "Resources released");
        Ok(NodeOutcome::Success)
    }
}

/// Mark the backup record finished
pub struct UpdateBackupRecord {
    clusters: Arc<dyn ClusterRepository>,
}

impl UpdateBackupRecord {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for UpdateBackupRecord {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut record = load_backup_record(self.clusters.as_ref(), ctx).await?;
        record.finish();
        self.clusters.save_backup_record(&record).await?;
        Ok(NodeOutcome::Success)
    }
}

/// Render the import tool config into `{work_dir}/{record_id}/`
pub struct BuildImportConfig {
    clusters: Arc<dyn ClusterRepository>,
    work_dir: PathBuf,
}

impl BuildImportConfig {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            clusters,
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl NodeExecutor for BuildImportConfig {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut record = load_transport_record(self.clusters.as_ref(), ctx).await?;
        let cluster = load_cluster(self.clusters.as_ref(), ctx).await?;

        let config = match ImportConfig::for_cluster(&cluster, &record) {
            Ok(config) => config,
            Err(ClusterError::InvalidTopology(reason)) => return Ok(NodeOutcome::Failed(reason)),
            Err(e) => return Err(e.into()),
        };

        let dir = self.work_dir.join(&record.id);
        tokio::fs::create_dir_all(&dir).await?;
        let path = dir.join(IMPORT_CONFIG_FILE);
        tokio::fs::write(&path, config.to_yaml()?).await?;

        let path = path.display().to_string();
        info!(cluster_id = %cluster.id, record_id = %record.id, path = %path, "Import config written");
        record.config_path = Some(path.clone());
        self.clusters.save_transport_record(&record).await?;
        ctx.put(IMPORT_CONFIG, &path)?;
        Ok(NodeOutcome::Success)
    }
}

/// Mark the transport record finished
pub struct UpdateTransportRecord {
    clusters: Arc<dyn ClusterRepository>,
}

impl UpdateTransportRecord {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for UpdateTransportRecord {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut record = load_transport_record(self.clusters.as_ref(), ctx).await?;
        record.finish();
        self.clusters.save_transport_record(&record).await?;
        info!(record_id = %record.id, transport = ?record.transport_type, "Data transport finished");
        Ok(NodeOutcome::Success)
    }
}

/// Remove the working directory of a transport record
///
/// Succeeds when there is nothing to remove, so a re-run is harmless.
pub struct CleanTransportTempfile {
    clusters: Arc<dyn ClusterRepository>,
}

impl CleanTransportTempfile {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for CleanTransportTempfile {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let record = load_transport_record(self.clusters.as_ref(), ctx).await?;
        let Some(dir) = record.config_path.as_deref().and_then(|p| Path::new(p).parent()) else {
            return Ok(NodeOutcome::Success);
        };

        match tokio::fs::remove_dir_all(dir).await {
            Ok(()) => info!(record_id = %record.id, dir = %dir.display(), "Transport files removed"),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!(record_id = %record.id, dir = %dir.display(), "Transport files already gone")
            }
            Err(e) => return Err(e.into()),
        }
        Ok(NodeOutcome::Success)
    }
}

/// Terminal step that hands the cluster back
pub struct FinishMaintenance {
    clusters: Arc<dyn ClusterRepository>,
}

impl FinishMaintenance {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for FinishMaintenance {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut cluster = load_cluster(self.clusters.as_ref(), ctx).await?;
        cluster.end_maintenance();
        self.clusters.persist(&cluster).await?;
        Ok(NodeOutcome::Success)
    }
}

/// Cleanup after a failed create, scale-out or delete
///
/// Hosts reserved for a cluster that never came online are released.
pub struct ClusterFail {
    clusters: Arc<dyn ClusterRepository>,
    allocator: Arc<dyn ResourceAllocator>,
}

impl ClusterFail {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>, allocator: Arc<dyn ResourceAllocator>) -> Self {
        Self { clusters, allocator }
    }
}

#[async_trait]
impl NodeExecutor for ClusterFail {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut cluster = load_cluster(self.clusters.as_ref(), ctx).await?;

        if cluster.status == ClusterStatus::Initializing && ctx.find(ALLOCATION)?.is_some() {
            self.allocator.release(&cluster.id).await?;
            info!(cluster_id = %cluster.id, "Released resources of failed cluster");
        }

        warn!(cluster_id = %cluster.id, maintenance = ?cluster.maintenance, "Cluster workflow failed");
        cluster.end_maintenance();
        self.clusters.persist(&cluster).await?;
        Ok(NodeOutcome::Success)
    }
}

/// Cleanup after a failed backup
pub struct BackupFail {
    clusters: Arc<dyn ClusterRepository>,
}

impl BackupFail {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for BackupFail {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut record = load_backup_record(self.clusters.as_ref(), ctx).await?;
        record.fail();
        self.clusters.save_backup_record(&record).await?;

        let mut cluster = load_cluster(self.clusters.as_ref(), ctx).await?;
        cluster.end_maintenance();
        self.clusters.persist(&cluster).await?;
        Ok(NodeOutcome::Success)
    }
}

/// Cleanup after a failed export or import
pub struct TransportFail {
    clusters: Arc<dyn ClusterRepository>,
}

impl TransportFail {
    /// Create the step
    pub fn new(clusters: Arc<dyn ClusterRepository>) -> Self {
        Self { clusters }
    }
}

#[async_trait]
impl NodeExecutor for TransportFail {
    async fn run(&self, _node: &mut NodeState, ctx: &mut FlowContext) -> Result<NodeOutcome, CoreError> {
        let mut record = load_transport_record(self.clusters.as_ref(), ctx).await?;
        record.fail();
        self.clusters.save_transport_record(&record).await?;
        warn!(record_id = %record.id, transport = ?record.transport_type, "Data transport failed");

        let mut cluster = load_cluster(self.clusters.as_ref(), ctx).await?;
        cluster.end_maintenance();
        self.clusters.persist(&cluster).await?;
        Ok(NodeOutcome::Success)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::cluster::Maintenance;
    use crate::domain::repository::InMemoryClusterRepository;
    use clusterflow_core::FlowInstanceId;
    use clusterflow_test_utils::{FakeOperationExecutor, FakeResourceAllocator};

    use crate::context::DEPLOY_HANDLE;

    fn node(name: &str, attempt: u32) -> NodeState {
        NodeState::new(FlowInstanceId::generate(), name, attempt)
    }

    async fn seeded() -> (Arc<InMemoryClusterRepository>, Cluster, FlowContext) {
        let repo = Arc::new(InMemoryClusterRepository::new());
        let mut cluster = Cluster::new("orders", "TiDB", "v5.0.0", "tenant-1", vec![]);
        cluster.begin_maintenance(Maintenance::Creating).unwrap();
        repo.persist(&cluster).await.unwrap();

        let mut ctx = FlowContext::new();
        ctx.put(CLUSTER_ID, &cluster.id).unwrap();
        (repo, cluster, ctx)
    }

    #[tokio::test]
    async fn test_run_operation_invokes_once() {
        let (repo, _cluster, mut ctx) = seeded().await;
        let operations = Arc::new(FakeOperationExecutor::new().pending_for(OperationKind::Start, 1));
        let step = RunOperation::new(OperationKind::Start, crate::context::START_HANDLE, repo, operations.clone());

        let mut first = node("start_cluster", 1);
        assert_eq!(step.run(&mut first, &mut ctx).await.unwrap(), NodeOutcome::Pending);
        assert!(first.result.is_some());

        assert_eq!(step.run(&mut node("start_cluster", 2), &mut ctx).await.unwrap(), NodeOutcome::Pending);
        assert_eq!(step.run(&mut node("start_cluster", 3), &mut ctx).await.unwrap(), NodeOutcome::Success);

        assert_eq!(operations.invocations_of(OperationKind::Start), 1);
        assert_eq!(operations.checks(), 2);
    }

    #[tokio::test]
    async fn test_run_operation_failure_is_business_failure() {
        let (repo, _cluster, mut ctx) = seeded().await;
        let operations = Arc::new(FakeOperationExecutor::new().script(
            OperationKind::Destroy,
            vec![OperationStatus::Failed("ssh timeout".to_string())],
        ));
        let step = RunOperation::new(OperationKind::Destroy, crate::context::DESTROY_HANDLE, repo, operations);

        step.run(&mut node("destroy_cluster", 1), &mut ctx).await.unwrap();
        let outcome = step.run(&mut node("destroy_cluster", 2), &mut ctx).await.unwrap();
        assert_eq!(outcome, NodeOutcome::Failed("Destroy failed: ssh timeout".to_string()));
    }

    #[tokio::test]
    async fn test_deploy_without_topology_is_an_error() {
        let (repo, _cluster, mut ctx) = seeded().await;
        let operations = Arc::new(FakeOperationExecutor::new());
        let step = RunOperation::new(OperationKind::Deploy, DEPLOY_HANDLE, repo, operations.clone());

        let err = step.run(&mut node("deploy_cluster", 1), &mut ctx).await.unwrap_err();
        assert_eq!(err, CoreError::ContextValueMissing("topology".to_string()));
        assert!(operations.invocations().is_empty());
    }

    #[tokio::test]
    async fn test_prepare_resource_refused() {
        let (repo, _cluster, mut ctx) = seeded().await;
        let allocator = Arc::new(FakeResourceAllocator::exhausted("no hosts in zone-a"));
        let step = PrepareResource::new(repo, allocator);

        let outcome = step.run(&mut node("prepare_resource", 1), &mut ctx).await.unwrap();
        assert_eq!(
            outcome,
            NodeOutcome::Failed("allocation refused: no hosts in zone-a".to_string())
        );
        assert!(ctx.find(ALLOCATION).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_cluster_fail_releases_unborn_cluster() {
        let (repo, cluster, mut ctx) = seeded().await;
        let allocator = Arc::new(FakeResourceAllocator::new());
        ctx.put(ALLOCATION, &Default::default()).unwrap();

        let step = ClusterFail::new(repo.clone(), allocator.clone());
        step.run(&mut node("fail", 1), &mut ctx).await.unwrap();

        assert_eq!(allocator.released(), vec![cluster.id.clone()]);
        let stored = repo.load(&cluster.id).await.unwrap().unwrap();
        assert!(stored.maintenance.is_none());
    }

    async fn seeded_import(repo: &InMemoryClusterRepository, cluster: &mut Cluster, ctx: &mut FlowContext) -> DataTransportRecord {
        cluster.bring_online(vec![
            clusterflow_core::HostAssignment {
                component_type: "PD".to_string(),
                host_id: "h1".to_string(),
                ip: "10.0.0.1".to_string(),
                ports: vec![2379, 2380],
                zone_code: "zone-a".to_string(),
                spec_code: "4C8G".to_string(),
                disk_path: "/data".to_string(),
            },
            clusterflow_core::HostAssignment {
                component_type: "TiDB".to_string(),
                host_id: "h2".to_string(),
                ip: "10.0.0.2".to_string(),
                ports: vec![4000, 10080],
                zone_code: "zone-a".to_string(),
                spec_code: "4C8G".to_string(),
                disk_path: "/data".to_string(),
            },
        ]);
        repo.persist(cluster).await.unwrap();

        let record = DataTransportRecord::import(cluster.id.clone(), crate::domain::cluster::StorageType::Local, "/srv/orders");
        repo.save_transport_record(&record).await.unwrap();
        ctx.put(TRANSPORT_RECORD, &record.id).unwrap();
        record
    }

    #[tokio::test]
    async fn test_import_config_written_then_cleaned() {
        let (repo, mut cluster, mut ctx) = seeded().await;
        let record = seeded_import(&repo, &mut cluster, &mut ctx).await;
        let work_dir = tempfile::tempdir().unwrap();

        let build = BuildImportConfig::new(repo.clone(), work_dir.path());
        assert_eq!(build.run(&mut node("build_import_config", 1), &mut ctx).await.unwrap(), NodeOutcome::Success);

        let path = ctx.fetch(IMPORT_CONFIG).unwrap();
        assert!(path.starts_with(&work_dir.path().join(&record.id).display().to_string()));
        let rendered = tokio::fs::read_to_string(&path).await.unwrap();
        assert!(rendered.contains("10.0.0.2"));

        let stored = repo.load_transport_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.config_path.as_deref(), Some(path.as_str()));

        let clean = CleanTransportTempfile::new(repo.clone());
        clean.run(&mut node("clean_import_tempfile", 1), &mut ctx).await.unwrap();
        assert!(!work_dir.path().join(&record.id).exists());

        // Nothing left to remove
        assert_eq!(clean.run(&mut node("clean_import_tempfile", 2), &mut ctx).await.unwrap(), NodeOutcome::Success);
    }

    #[tokio::test]
    async fn test_import_config_needs_tidb_instance() {
        let (repo, cluster, mut ctx) = seeded().await;
        let record = DataTransportRecord::import(cluster.id.clone(), crate::domain::cluster::StorageType::S3, "/bucket/orders");
        repo.save_transport_record(&record).await.unwrap();
        ctx.put(TRANSPORT_RECORD, &record.id).unwrap();
        let work_dir = tempfile::tempdir().unwrap();

        let outcome = BuildImportConfig::new(repo, work_dir.path())
            .run(&mut node("build_import_config", 1), &mut ctx)
            .await
            .unwrap();
        assert!(matches!(outcome, NodeOutcome::Failed(reason) if reason.contains("no TiDB instance")));
        assert!(ctx.find(IMPORT_CONFIG).unwrap().is_none());
    }

    #[tokio::test]
    async fn test_transport_fail_releases_cluster() {
        let (repo, cluster, mut ctx) = seeded().await;
        let record = DataTransportRecord::export(cluster.id.clone(), crate::domain::cluster::StorageType::Local, "csv", None);
        repo.save_transport_record(&record).await.unwrap();
        ctx.put(TRANSPORT_RECORD, &record.id).unwrap();

        TransportFail::new(repo.clone())
            .run(&mut node("transport_fail", 1), &mut ctx)
            .await
            .unwrap();

        let stored = repo.load_transport_record(&record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, crate::domain::cluster::TransportStatus::Failed);
        assert!(repo.load(&cluster.id).await.unwrap().unwrap().maintenance.is_none());
    }
}
