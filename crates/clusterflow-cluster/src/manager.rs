//! Entry points that start cluster workflows.

use clusterflow_core::{ComponentDemand, FlowContext, FlowEngine, FlowInstanceId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::context::{BACKUP_RECORD, CLUSTER_ID, SCALE_OUT_DEMANDS, TRANSPORT_RECORD};
use crate::domain::cluster::{
    validate_demands, BackupRecord, BackupStatus, Cluster, ClusterStatus, DataTransportRecord,
    Maintenance, StorageType,
};
use crate::domain::repository::ClusterRepository;
use crate::error::{ClusterError, ClusterResult};
use crate::flows::{
    BACKUP_CLUSTER, CREATE_CLUSTER, DELETE_CLUSTER, EXPORT_DATA, IMPORT_DATA, RESTORE_CLUSTER,
    SCALE_OUT_CLUSTER,
};

/// Request to create a cluster
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateClusterRequest {
    /// Display name
    pub name: String,
    /// Database type
    pub cluster_type: String,
    /// Database version
    pub version: String,
    /// Owning tenant
    pub tenant_id: String,
    /// Requested components
    pub demands: Vec<ComponentDemand>,
}

/// Request to dump a cluster's data
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataExportRequest {
    /// Where the files are written
    pub storage_type: StorageType,
    /// Data file format
    #[serde(default = "default_file_type")]
    pub file_type: String,
    /// Table filter, e.g. `orders.*`
    #[serde(default)]
    pub filter: Option<String>,
}

/// Request to load data files into a cluster
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataImportRequest {
    /// Where the files are read from
    pub storage_type: StorageType,
    /// Directory of the data files
    pub file_path: String,
}

fn default_file_type() -> String {
    "csv".to_string()
}

/// Returned once a workflow has been started
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterOperationResponse {
    /// Target cluster
    pub cluster_id: String,
    /// Started workflow
    pub workflow_id: String,
    /// Backup record written by a backup workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backup_record_id: Option<String>,
    /// Transport record written by an export or import workflow
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transport_record_id: Option<String>,
}

/// Starts cluster workflows and guards each cluster against concurrent ones
pub struct ClusterManager {
    engine: Arc<FlowEngine>,
    clusters: Arc<dyn ClusterRepository>,
    admission: Mutex<()>,
}

impl ClusterManager {
    /// Create a manager over an engine with the cluster flows registered
    pub fn new(engine: Arc<FlowEngine>, clusters: Arc<dyn ClusterRepository>) -> Self {
        Self {
            engine,
            clusters,
            admission: Mutex::new(()),
        }
    }

    /// Current state of a cluster
    pub async fn cluster(&self, cluster_id: &str) -> ClusterResult<Cluster> {
        self.clusters
            .load(cluster_id)
            .await?
            .ok_or_else(|| ClusterError::ClusterNotFound(cluster_id.to_string()))
    }

    /// Current state of a backup record
    pub async fn backup_record(&self, record_id: &str) -> ClusterResult<BackupRecord> {
        self.clusters
            .load_backup_record(record_id)
            .await?
            .ok_or_else(|| ClusterError::BackupRecordNotFound(record_id.to_string()))
    }

    /// Current state of a data transport record
    pub async fn transport_record(&self, record_id: &str) -> ClusterResult<DataTransportRecord> {
        self.clusters
            .load_transport_record(record_id)
            .await?
            .ok_or_else(|| ClusterError::TransportRecordNotFound(record_id.to_string()))
    }

    /// Create a cluster and start deploying it
    pub async fn create_cluster(&self, request: CreateClusterRequest) -> ClusterResult<ClusterOperationResponse> {
        validate_demands(&request.demands)?;

        let _admission = self.admission.lock().await;
        let mut cluster = Cluster::new(
            request.name,
            request.cluster_type,
            request.version,
            request.tenant_id,
            request.demands,
        );
        info!(cluster_id = %cluster.id, name = %cluster.name, "Creating cluster");

        self.launch(&mut cluster, Maintenance::Creating, CREATE_CLUSTER, FlowContext::new())
            .await
    }

    /// Add components to an online cluster
    pub async fn scale_out(
        &self,
        cluster_id: &str,
        demands: Vec<ComponentDemand>,
    ) -> ClusterResult<ClusterOperationResponse> {
        validate_demands(&demands)?;

        let _admission = self.admission.lock().await;
        let mut cluster = self.cluster(cluster_id).await?;
        ensure_idle(&cluster)?;
        cluster.ensure_online()?;

        let mut ctx = FlowContext::new();
        ctx.put(SCALE_OUT_DEMANDS, &demands)?;
        self.launch(&mut cluster, Maintenance::ScalingOut, SCALE_OUT_CLUSTER, ctx)
            .await
    }

    /// Tear a cluster down
    pub async fn delete_cluster(&self, cluster_id: &str) -> ClusterResult<ClusterOperationResponse> {
        let _admission = self.admission.lock().await;
        let mut cluster = self.cluster(cluster_id).await?;
        ensure_idle(&cluster)?;
        if cluster.status == ClusterStatus::Deleted {
            return Err(ClusterError::InvalidState(format!(
                "cluster {} is already deleted",
                cluster.id
            )));
        }

        self.launch(&mut cluster, Maintenance::Deleting, DELETE_CLUSTER, FlowContext::new())
            .await
    }

    /// Back up an online cluster to `/{cluster_id}/{record_id}`
    pub async fn backup(
        &self,
        cluster_id: &str,
        storage_type: StorageType,
    ) -> ClusterResult<ClusterOperationResponse> {
        let _admission = self.admission.lock().await;
        let mut cluster = self.cluster(cluster_id).await?;
        ensure_idle(&cluster)?;
        cluster.ensure_online()?;

        let record = BackupRecord::new(cluster.id.clone(), storage_type);
        self.clusters.save_backup_record(&record).await?;

        let mut ctx = FlowContext::new();
        ctx.put(BACKUP_RECORD, &record.id)?;
        let mut response = self
            .launch(&mut cluster, Maintenance::BackingUp, BACKUP_CLUSTER, ctx)
            .await?;
        response.backup_record_id = Some(record.id);
        Ok(response)
    }

    /// Restore an online cluster from one of its finished backups
    pub async fn restore(&self, cluster_id: &str, record_id: &str) -> ClusterResult<ClusterOperationResponse> {
        let _admission = self.admission.lock().await;
        let mut cluster = self.cluster(cluster_id).await?;
        ensure_idle(&cluster)?;
        cluster.ensure_online()?;

        let record = self.backup_record(record_id).await?;
        if record.cluster_id != cluster.id {
            return Err(ClusterError::InvalidState(format!(
                "backup {} belongs to cluster {}",
                record.id, record.cluster_id
            )));
        }
        if record.status != BackupStatus::Finished {
            return Err(ClusterError::InvalidState(format!(
                "backup {} is {:?}",
                record.id, record.status
            )));
        }

        let mut ctx = FlowContext::new();
        ctx.put(BACKUP_RECORD, &record.id)?;
        self.launch(&mut cluster, Maintenance::Restoring, RESTORE_CLUSTER, ctx)
            .await
    }

    /// Dump an online cluster's data to `/{cluster_id}/export/{record_id}`
    pub async fn export_data(
        &self,
        cluster_id: &str,
        request: DataExportRequest,
    ) -> ClusterResult<ClusterOperationResponse> {
        if request.file_type.trim().is_empty() {
            return Err(ClusterError::InvalidTransport("file type is empty".to_string()));
        }

        let _admission = self.admission.lock().await;
        let mut cluster = self.cluster(cluster_id).await?;
        ensure_idle(&cluster)?;
        cluster.ensure_online()?;

        let record = DataTransportRecord::export(
            cluster.id.clone(),
            request.storage_type,
            request.file_type,
            request.filter,
        );
        self.transport(&mut cluster, record, Maintenance::Exporting, EXPORT_DATA)
            .await
    }

    /// Load data files into an online cluster
    pub async fn import_data(
        &self,
        cluster_id: &str,
        request: DataImportRequest,
    ) -> ClusterResult<ClusterOperationResponse> {
        if request.file_path.trim().is_empty() {
            return Err(ClusterError::InvalidTransport("file path is empty".to_string()));
        }

        let _admission = self.admission.lock().await;
        let mut cluster = self.cluster(cluster_id).await?;
        ensure_idle(&cluster)?;
        cluster.ensure_online()?;

        let record = DataTransportRecord::import(cluster.id.clone(), request.storage_type, request.file_path);
        self.transport(&mut cluster, record, Maintenance::Importing, IMPORT_DATA)
            .await
    }

    async fn transport(
        &self,
        cluster: &mut Cluster,
        mut record: DataTransportRecord,
        maintenance: Maintenance,
        template: &str,
    ) -> ClusterResult<ClusterOperationResponse> {
        self.clusters.save_transport_record(&record).await?;
        info!(cluster_id = %cluster.id, record_id = %record.id, transport = ?record.transport_type, "Data transport requested");

        let mut ctx = FlowContext::new();
        ctx.put(TRANSPORT_RECORD, &record.id)?;
        let mut response = match self.launch(cluster, maintenance, template, ctx).await {
            Ok(response) => response,
            Err(e) => {
                record.fail();
                if let Err(save) = self.clusters.save_transport_record(&record).await {
                    warn!(record_id = %record.id, error = %save, "Could not mark transport record failed");
                }
                return Err(e);
            }
        };
        response.transport_record_id = Some(record.id);
        Ok(response)
    }

    /// Claim the cluster, create the instance, record its id, then start it
    ///
    /// The workflow id is stored before the instance starts so the flow's
    /// own writes to the cluster are never overwritten here.
    async fn launch(
        &self,
        cluster: &mut Cluster,
        maintenance: Maintenance,
        template: &str,
        mut ctx: FlowContext,
    ) -> ClusterResult<ClusterOperationResponse> {
        ctx.put(CLUSTER_ID, &cluster.id)?;
        cluster.begin_maintenance(maintenance)?;

        let runtime = self.engine.runtime();
        let flow_id = match runtime.create_instance(template, &cluster.id, ctx).await {
            Ok(flow_id) => flow_id,
            Err(e) => {
                warn!(cluster_id = %cluster.id, template = %template, error = %e, "Workflow not created");
                return Err(e.into());
            }
        };

        cluster.workflow_id = Some(flow_id.to_string());
        if let Err(e) = self.clusters.persist(cluster).await {
            self.discard(&flow_id).await;
            return Err(e.into());
        }

        if let Err(e) = runtime.start(&flow_id).await {
            warn!(cluster_id = %cluster.id, flow_id = %flow_id, error = %e, "Workflow not started");
            self.discard(&flow_id).await;
            cluster.end_maintenance();
            if let Err(e) = self.clusters.persist(cluster).await {
                warn!(cluster_id = %cluster.id, error = %e, "Could not release cluster");
            }
            return Err(e.into());
        }

        info!(cluster_id = %cluster.id, flow_id = %flow_id, template = %template, "Cluster workflow started");
        Ok(ClusterOperationResponse {
            cluster_id: cluster.id.clone(),
            workflow_id: flow_id.to_string(),
            backup_record_id: None,
            transport_record_id: None,
        })
    }

    async fn discard(&self, flow_id: &FlowInstanceId) {
        if let Err(e) = self.engine.abort(flow_id, "workflow could not be started").await {
            warn!(flow_id = %flow_id, error = %e, "Could not cancel unstarted workflow");
        }
    }
}

fn ensure_idle(cluster: &Cluster) -> ClusterResult<()> {
    match cluster.maintenance {
        Some(maintenance) => Err(ClusterError::ClusterBusy {
            cluster_id: cluster.id.clone(),
            maintenance,
        }),
        None => Ok(()),
    }
}
