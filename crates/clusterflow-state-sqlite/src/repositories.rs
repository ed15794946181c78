use async_trait::async_trait;
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use tracing::trace;

use clusterflow_core::{
    CoreError, FlowInstance, FlowInstanceId, FlowInstanceRepository, FlowStatus, NodeState,
    NodeStateRepository,
};

use crate::SqliteConnection;

fn decode<T: serde::de::DeserializeOwned>(row: &SqliteRow, what: &str) -> Result<T, CoreError> {
    let data: String = row
        .try_get("data")
        .map_err(|e| CoreError::PersistenceError(format!("Error getting {} data: {}", what, e)))?;

    serde_json::from_str(&data)
        .map_err(|e| CoreError::SerializationError(format!("Error deserializing {}: {}", what, e)))
}

/// SQLite implementation of the FlowInstanceRepository
#[derive(Clone)]
pub struct SqliteFlowInstanceRepository {
    conn: SqliteConnection,
}

impl SqliteFlowInstanceRepository {
    /// Create a new SQLite flow instance repository
    pub fn new(conn: SqliteConnection) -> Self {
        Self { conn }
    }

    async fn query_instances(&self, sql: &str, bind: &str) -> Result<Vec<FlowInstance>, CoreError> {
        let rows = sqlx::query(sql)
            .bind(bind)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to query flow instances: {}", e)))?;

        rows.iter().map(|row| decode(row, "flow instance")).collect()
    }
}

#[async_trait]
impl FlowInstanceRepository for SqliteFlowInstanceRepository {
    async fn save(&self, instance: &FlowInstance) -> Result<(), CoreError> {
        let data = serde_json::to_string(instance)
            .map_err(|e| CoreError::SerializationError(format!("Error serializing flow instance: {}", e)))?;

        trace!(flow_id = %instance.id, status = ?instance.status, "Saving flow instance");

        let query = "
            INSERT INTO flow_instances (id, template_name, biz_id, status, data, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                data = excluded.data,
                updated_at = excluded.updated_at
        ";

        sqlx::query(query)
            .bind(&instance.id.0)
            .bind(&instance.template_name)
            .bind(&instance.biz_id)
            .bind(instance.status.as_str())
            .bind(&data)
            .bind(instance.created_at)
            .bind(instance.updated_at)
            .execute(self.conn.pool())
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to save flow instance: {}", e)))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &FlowInstanceId) -> Result<Option<FlowInstance>, CoreError> {
        let row = sqlx::query("SELECT data FROM flow_instances WHERE id = ?1")
            .bind(&id.0)
            .fetch_optional(self.conn.pool())
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to load flow instance: {}", e)))?;

        row.map(|row| decode(&row, "flow instance")).transpose()
    }

    async fn find_active(&self) -> Result<Vec<FlowInstance>, CoreError> {
        self.query_instances(
            "SELECT data FROM flow_instances WHERE status = ?1 ORDER BY created_at",
            FlowStatus::Processing.as_str(),
        )
        .await
    }

    async fn find_by_biz_id(&self, biz_id: &str) -> Result<Vec<FlowInstance>, CoreError> {
        self.query_instances(
            "SELECT data FROM flow_instances WHERE biz_id = ?1 ORDER BY created_at",
            biz_id,
        )
        .await
    }
}

/// SQLite implementation of the NodeStateRepository
#[derive(Clone)]
pub struct SqliteNodeStateRepository {
    conn: SqliteConnection,
}

impl SqliteNodeStateRepository {
    /// Create a new SQLite node state repository
    pub fn new(conn: SqliteConnection) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl NodeStateRepository for SqliteNodeStateRepository {
    async fn save(&self, state: &NodeState) -> Result<(), CoreError> {
        let data = serde_json::to_string(state)
            .map_err(|e| CoreError::SerializationError(format!("Error serializing node state: {}", e)))?;

        // Updates keep the original seq, so history order is first-save order
        let query = "
            INSERT INTO node_states (id, flow_id, node_name, attempt, status, data)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT (id) DO UPDATE SET
                status = excluded.status,
                data = excluded.data
        ";

        sqlx::query(query)
            .bind(&state.id)
            .bind(&state.flow_id.0)
            .bind(&state.node_name)
            .bind(state.attempt as i64)
            .bind(format!("{:?}", state.status))
            .bind(&data)
            .execute(self.conn.pool())
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to save node state: {}", e)))?;

        Ok(())
    }

    async fn find_for_flow(&self, flow_id: &FlowInstanceId) -> Result<Vec<NodeState>, CoreError> {
        let rows = sqlx::query("SELECT data FROM node_states WHERE flow_id = ?1 ORDER BY seq")
            .bind(&flow_id.0)
            .fetch_all(self.conn.pool())
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to load node states: {}", e)))?;

        rows.iter().map(|row| decode(row, "node state")).collect()
    }
}
