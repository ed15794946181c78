//! Storage for cluster aggregates, backup records and data transport records.

use async_trait::async_trait;
use clusterflow_core::CoreError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::domain::cluster::{BackupRecord, Cluster, DataTransportRecord};

/// Repository for the cluster aggregate
#[async_trait]
pub trait ClusterRepository: Send + Sync {
    /// Load a cluster, `None` when unknown
    async fn load(&self, cluster_id: &str) -> Result<Option<Cluster>, CoreError>;

    /// Insert or replace a cluster
    async fn persist(&self, cluster: &Cluster) -> Result<(), CoreError>;

    /// Insert or replace a backup record
    async fn save_backup_record(&self, record: &BackupRecord) -> Result<(), CoreError>;

    /// Load a backup record, `None` when unknown
    async fn load_backup_record(&self, record_id: &str) -> Result<Option<BackupRecord>, CoreError>;

    /// Insert or replace a data transport record
    async fn save_transport_record(&self, record: &DataTransportRecord) -> Result<(), CoreError>;

    /// Load a data transport record, `None` when unknown
    async fn load_transport_record(&self, record_id: &str) -> Result<Option<DataTransportRecord>, CoreError>;
}

/// In-memory cluster repository
#[derive(Clone, Default)]
pub struct InMemoryClusterRepository {
    clusters: Arc<RwLock<HashMap<String, Cluster>>>,
    backups: Arc<RwLock<HashMap<String, BackupRecord>>>,
    transports: Arc<RwLock<HashMap<String, DataTransportRecord>>>,
}

impl InMemoryClusterRepository {
    /// Create an empty repository
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ClusterRepository for InMemoryClusterRepository {
    async fn load(&self, cluster_id: &str) -> Result<Option<Cluster>, CoreError> {
        Ok(self.clusters.read().await.get(cluster_id).cloned())
    }

    async fn persist(&self, cluster: &Cluster) -> Result<(), CoreError> {
        self.clusters
            .write()
            .await
            .insert(cluster.id.clone(), cluster.clone());
        Ok(())
    }

    async fn save_backup_record(&self, record: &BackupRecord) -> Result<(), CoreError> {
        self.backups
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_backup_record(&self, record_id: &str) -> Result<Option<BackupRecord>, CoreError> {
        Ok(self.backups.read().await.get(record_id).cloned())
    }

    async fn save_transport_record(&self, record: &DataTransportRecord) -> Result<(), CoreError> {
        self.transports
            .write()
            .await
            .insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn load_transport_record(&self, record_id: &str) -> Result<Option<DataTransportRecord>, CoreError> {
        Ok(self.transports.read().await.get(record_id).cloned())
    }
}
