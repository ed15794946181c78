//! Flow templates of the cluster workflows.

use clusterflow_core::{
    ContextKey, CoreError, FlowRegistry, FlowTemplate, OperationExecutor, OperationHandle,
    OperationKind, PollingPolicy, ResourceAllocator,
};
use std::path::PathBuf;
use std::sync::Arc;

use crate::context::{
    BACKUP_HANDLE, DEPLOY_HANDLE, DESTROY_HANDLE, DESTROY_TASKS_HANDLE, EXPORT_HANDLE,
    IMPORT_HANDLE, RESTORE_HANDLE, SCALE_OUT_HANDLE, START_HANDLE,
};
use crate::domain::repository::ClusterRepository;
use crate::steps::{
    BackupFail, BuildConfig, BuildImportConfig, CleanTransportTempfile, ClusterFail, DeleteCluster,
    FinishMaintenance, FreeResource, PrepareResource, RunOperation, SetClusterOnline,
    TransportFail, UpdateBackupRecord, UpdateTransportRecord,
};

/// Create and start a new cluster
pub const CREATE_CLUSTER: &str = "CreateCluster";
/// Add components to an online cluster
pub const SCALE_OUT_CLUSTER: &str = "ScaleOutCluster";
/// Tear a cluster down
pub const DELETE_CLUSTER: &str = "DeleteCluster";
/// Take a backup
pub const BACKUP_CLUSTER: &str = "BackupCluster";
/// Restore from a backup
pub const RESTORE_CLUSTER: &str = "RestoreCluster";
/// Dump a cluster's data to files
pub const EXPORT_DATA: &str = "ExportData";
/// Load data files into a cluster
pub const IMPORT_DATA: &str = "ImportData";

/// Collaborators the cluster steps call
#[derive(Clone)]
pub struct ClusterFlowDeps {
    /// Cluster aggregate storage
    pub clusters: Arc<dyn ClusterRepository>,
    /// Host allocation
    pub allocator: Arc<dyn ResourceAllocator>,
    /// Deploy/backup tooling
    pub operations: Arc<dyn OperationExecutor>,
    /// Budget of every operation polling node
    pub polling: PollingPolicy,
    /// Where import configs are rendered
    pub transport_dir: PathBuf,
}

impl ClusterFlowDeps {
    /// Collaborators with the engine's default polling budget
    pub fn new(
        clusters: Arc<dyn ClusterRepository>,
        allocator: Arc<dyn ResourceAllocator>,
        operations: Arc<dyn OperationExecutor>,
    ) -> Self {
        Self {
            clusters,
            allocator,
            operations,
            polling: PollingPolicy::default(),
            transport_dir: std::env::temp_dir().join("clusterflow-transport"),
        }
    }

    /// Override the polling budget
    pub fn with_polling(mut self, polling: PollingPolicy) -> Self {
        self.polling = polling;
        self
    }

    /// Override the import config directory
    pub fn with_transport_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.transport_dir = dir.into();
        self
    }

    fn operation(&self, kind: OperationKind, handle: ContextKey<OperationHandle>) -> Arc<RunOperation> {
        Arc::new(RunOperation::new(
            kind,
            handle,
            self.clusters.clone(),
            self.operations.clone(),
        ))
    }
}

/// CreateCluster template
pub fn create_cluster_flow(deps: &ClusterFlowDeps) -> Result<FlowTemplate, CoreError> {
    FlowTemplate::builder(CREATE_CLUSTER)
        .status_alias("Creating")
        .immediate(
            "prepare_resource",
            "build_config",
            "fail",
            Arc::new(PrepareResource::new(deps.clusters.clone(), deps.allocator.clone())),
        )
        .immediate("build_config", "deploy_cluster", "fail", Arc::new(BuildConfig))
        .polling(
            "deploy_cluster",
            "start_cluster",
            "fail",
            deps.polling,
            deps.operation(OperationKind::Deploy, DEPLOY_HANDLE),
        )
        .polling(
            "start_cluster",
            "set_cluster_online",
            "fail",
            deps.polling,
            deps.operation(OperationKind::Start, START_HANDLE),
        )
        .immediate(
            "set_cluster_online",
            "end",
            "fail",
            Arc::new(SetClusterOnline::new(deps.clusters.clone())),
        )
        .terminal("end", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .terminal(
            "fail",
            Arc::new(ClusterFail::new(deps.clusters.clone(), deps.allocator.clone())),
        )
        .build()
}

/// ScaleOutCluster template
pub fn scale_out_cluster_flow(deps: &ClusterFlowDeps) -> Result<FlowTemplate, CoreError> {
    FlowTemplate::builder(SCALE_OUT_CLUSTER)
        .status_alias("ScalingOut")
        .immediate(
            "prepare_resource",
            "build_config",
            "fail",
            Arc::new(PrepareResource::new(deps.clusters.clone(), deps.allocator.clone())),
        )
        .immediate("build_config", "scale_out_cluster", "fail", Arc::new(BuildConfig))
        .polling(
            "scale_out_cluster",
            "set_cluster_online",
            "fail",
            deps.polling,
            deps.operation(OperationKind::ScaleOut, SCALE_OUT_HANDLE),
        )
        .immediate(
            "set_cluster_online",
            "end",
            "fail",
            Arc::new(SetClusterOnline::new(deps.clusters.clone())),
        )
        .terminal("end", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .terminal(
            "fail",
            Arc::new(ClusterFail::new(deps.clusters.clone(), deps.allocator.clone())),
        )
        .build()
}

/// DeleteCluster template
pub fn delete_cluster_flow(deps: &ClusterFlowDeps) -> Result<FlowTemplate, CoreError> {
    FlowTemplate::builder(DELETE_CLUSTER)
        .status_alias("Deleting")
        .polling(
            "destroy_tasks",
            "destroy_cluster",
            "fail",
            deps.polling,
            deps.operation(OperationKind::DestroyTasks, DESTROY_TASKS_HANDLE),
        )
        .polling(
            "destroy_cluster",
            "delete_cluster",
            "fail",
            deps.polling,
            deps.operation(OperationKind::Destroy, DESTROY_HANDLE),
        )
        .immediate(
            "delete_cluster",
            "free_resource",
            "fail",
            Arc::new(DeleteCluster::new(deps.clusters.clone())),
        )
        .immediate(
            "free_resource",
            "end",
            "fail",
            Arc::new(FreeResource::new(deps.allocator.clone())),
        )
        .terminal("end", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .terminal(
            "fail",
            Arc::new(ClusterFail::new(deps.clusters.clone(), deps.allocator.clone())),
        )
        .build()
}

/// BackupCluster template
pub fn backup_cluster_flow(deps: &ClusterFlowDeps) -> Result<FlowTemplate, CoreError> {
    FlowTemplate::builder(BACKUP_CLUSTER)
        .status_alias("BackingUp")
        .polling(
            "backup_cluster",
            "update_backup_record",
            "backup_fail",
            deps.polling,
            deps.operation(OperationKind::Backup, BACKUP_HANDLE),
        )
        .immediate(
            "update_backup_record",
            "end",
            "backup_fail",
            Arc::new(UpdateBackupRecord::new(deps.clusters.clone())),
        )
        .terminal("end", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .terminal("backup_fail", Arc::new(BackupFail::new(deps.clusters.clone())))
        .build()
}

/// RestoreCluster template
pub fn restore_cluster_flow(deps: &ClusterFlowDeps) -> Result<FlowTemplate, CoreError> {
    FlowTemplate::builder(RESTORE_CLUSTER)
        .status_alias("Restoring")
        .polling(
            "restore_cluster",
            "end",
            "restore_fail",
            deps.polling,
            deps.operation(OperationKind::Restore, RESTORE_HANDLE),
        )
        .terminal("end", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .terminal("restore_fail", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .build()
}

/// ExportData template
pub fn export_data_flow(deps: &ClusterFlowDeps) -> Result<FlowTemplate, CoreError> {
    FlowTemplate::builder(EXPORT_DATA)
        .status_alias("Exporting")
        .polling(
            "export_data",
            "update_transport_record",
            "transport_fail",
            deps.polling,
            deps.operation(OperationKind::Export, EXPORT_HANDLE),
        )
        .immediate(
            "update_transport_record",
            "clean_transport_tempfile",
            "transport_fail",
            Arc::new(UpdateTransportRecord::new(deps.clusters.clone())),
        )
        .immediate(
            "clean_transport_tempfile",
            "end",
            "transport_fail",
            Arc::new(CleanTransportTempfile::new(deps.clusters.clone())),
        )
        .terminal("end", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .terminal("transport_fail", Arc::new(TransportFail::new(deps.clusters.clone())))
        .build()
}

/// ImportData template
pub fn import_data_flow(deps: &ClusterFlowDeps) -> Result<FlowTemplate, CoreError> {
    FlowTemplate::builder(IMPORT_DATA)
        .status_alias("Importing")
        .immediate(
            "build_import_config",
            "import_data",
            "transport_fail",
            Arc::new(BuildImportConfig::new(deps.clusters.clone(), deps.transport_dir.clone())),
        )
        .polling(
            "import_data",
            "update_transport_record",
            "transport_fail",
            deps.polling,
            deps.operation(OperationKind::Import, IMPORT_HANDLE),
        )
        .immediate(
            "update_transport_record",
            "clean_transport_tempfile",
            "transport_fail",
            Arc::new(UpdateTransportRecord::new(deps.clusters.clone())),
        )
        .immediate(
            "clean_transport_tempfile",
            "end",
            "transport_fail",
            Arc::new(CleanTransportTempfile::new(deps.clusters.clone())),
        )
        .terminal("end", Arc::new(FinishMaintenance::new(deps.clusters.clone())))
        .terminal("transport_fail", Arc::new(TransportFail::new(deps.clusters.clone())))
        .build()
}

/// Register every cluster workflow
pub fn register_cluster_flows(registry: &mut FlowRegistry, deps: &ClusterFlowDeps) -> Result<(), CoreError> {
    registry.register(create_cluster_flow(deps)?)?;
    registry.register(scale_out_cluster_flow(deps)?)?;
    registry.register(delete_cluster_flow(deps)?)?;
    registry.register(backup_cluster_flow(deps)?)?;
    registry.register(restore_cluster_flow(deps)?)?;
    registry.register(export_data_flow(deps)?)?;
    registry.register(import_data_flow(deps)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::repository::InMemoryClusterRepository;
    use clusterflow_core::ExecutionMode;
    use clusterflow_test_utils::{FakeOperationExecutor, FakeResourceAllocator};

    fn deps() -> ClusterFlowDeps {
        ClusterFlowDeps::new(
            Arc::new(InMemoryClusterRepository::new()),
            Arc::new(FakeResourceAllocator::new()),
            Arc::new(FakeOperationExecutor::new()),
        )
    }

    #[test]
    fn test_register_all_flows() {
        let mut registry = FlowRegistry::new();
        register_cluster_flows(&mut registry, &deps()).unwrap();

        let mut names = registry.names();
        names.sort();
        assert_eq!(
            names,
            vec![
                BACKUP_CLUSTER,
                CREATE_CLUSTER,
                DELETE_CLUSTER,
                EXPORT_DATA,
                IMPORT_DATA,
                RESTORE_CLUSTER,
                SCALE_OUT_CLUSTER
            ]
        );

        assert!(matches!(
            register_cluster_flows(&mut registry, &deps()),
            Err(CoreError::DuplicateTemplate(_))
        ));
    }

    #[test]
    fn test_create_cluster_shape() {
        let template = create_cluster_flow(&deps()).unwrap();
        assert_eq!(template.start_node(), "prepare_resource");
        assert_eq!(template.status_alias(), Some("Creating"));

        let deploy = template.node("deploy_cluster").unwrap();
        assert_eq!(deploy.mode, ExecutionMode::Polling);
        assert_eq!(deploy.next(true), Some("start_cluster"));
        assert_eq!(deploy.next(false), Some("fail"));

        assert!(template.node("end").unwrap().is_terminal());
        assert!(template.node("fail").unwrap().is_terminal());
    }

    #[test]
    fn test_polling_budget_applies_to_operations() {
        let deps = deps().with_polling(PollingPolicy::max_attempts(30));
        let template = backup_cluster_flow(&deps).unwrap();
        assert_eq!(template.node("backup_cluster").unwrap().polling.max_attempts, Some(30));
        assert_eq!(template.node("update_backup_record").unwrap().mode, ExecutionMode::Immediate);
    }

    #[test]
    fn test_delete_stops_tasks_first() {
        let template = delete_cluster_flow(&deps()).unwrap();
        assert_eq!(template.start_node(), "destroy_tasks");

        let tasks = template.node("destroy_tasks").unwrap();
        assert_eq!(tasks.mode, ExecutionMode::Polling);
        assert_eq!(tasks.next(true), Some("destroy_cluster"));
        assert_eq!(tasks.next(false), Some("fail"));
    }

    #[test]
    fn test_transport_shapes() {
        let export = export_data_flow(&deps()).unwrap();
        assert_eq!(export.start_node(), "export_data");
        assert_eq!(export.status_alias(), Some("Exporting"));
        assert_eq!(export.node("export_data").unwrap().mode, ExecutionMode::Polling);
        assert_eq!(
            export.node("update_transport_record").unwrap().next(true),
            Some("clean_transport_tempfile")
        );

        let import = import_data_flow(&deps()).unwrap();
        assert_eq!(import.start_node(), "build_import_config");
        assert_eq!(import.node("build_import_config").unwrap().mode, ExecutionMode::Immediate);
        assert_eq!(import.node("build_import_config").unwrap().next(true), Some("import_data"));
        assert_eq!(import.node("import_data").unwrap().next(false), Some("transport_fail"));
        assert!(import.node("transport_fail").unwrap().is_terminal());
    }
}
