//! SQLite state store for the clusterflow engine
//!
//! Durable implementations of the persistence gateway traits. Flow instances
//! and node execution records are stored as JSON documents next to the
//! columns the engine queries on, so a restarted process can reload every
//! in-flight instance.

use serde::{Deserialize, Serialize};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

pub mod migrations;
pub mod repositories;

pub use repositories::{SqliteFlowInstanceRepository, SqliteNodeStateRepository};

use clusterflow_core::{CoreError, FlowInstanceRepository, NodeStateRepository, PersistenceGateway};

/// Configuration for the SQLite connection
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SqliteConfig {
    /// Database URL, e.g. `sqlite://clusterflow.db` or `sqlite::memory:`
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Maximum number of connections in the pool
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,

    /// Timeout for acquiring a connection from the pool (in seconds)
    #[serde(default = "default_acquire_timeout_secs")]
    pub acquire_timeout_secs: u64,

    /// Whether to run migrations on startup
    #[serde(default = "default_run_migrations")]
    pub run_migrations: bool,
}

fn default_database_url() -> String {
    "sqlite://clusterflow.db".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_acquire_timeout_secs() -> u64 {
    30
}

fn default_run_migrations() -> bool {
    true
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            max_connections: default_max_connections(),
            acquire_timeout_secs: default_acquire_timeout_secs(),
            run_migrations: default_run_migrations(),
        }
    }
}

impl SqliteConfig {
    /// Configuration for a database file
    pub fn file(path: impl AsRef<std::path::Path>) -> Self {
        Self {
            database_url: format!("sqlite://{}", path.as_ref().display()),
            ..Self::default()
        }
    }

    /// Configuration for a private in-memory database
    pub fn in_memory() -> Self {
        Self {
            database_url: "sqlite::memory:".to_string(),
            max_connections: 1,
            ..Self::default()
        }
    }

    fn is_memory(&self) -> bool {
        self.database_url.contains(":memory:")
    }
}

/// SQLite connection wrapper
#[derive(Clone)]
pub struct SqliteConnection {
    pool: SqlitePool,
}

impl SqliteConnection {
    /// Open the database, creating the file if needed
    pub async fn new(config: &SqliteConfig) -> Result<Self, CoreError> {
        let options = SqliteConnectOptions::from_str(&config.database_url)
            .map_err(|e| CoreError::ConfigurationError(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true);

        // Every connection to `:memory:` opens a separate database
        let pool_options = if config.is_memory() {
            SqlitePoolOptions::new()
                .max_connections(1)
                .min_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
        } else {
            SqlitePoolOptions::new().max_connections(config.max_connections)
        };

        let pool = pool_options
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_secs))
            .connect_with(options)
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to connect to SQLite: {}", e)))?;

        debug!(url = %config.database_url, "Connected to SQLite database");

        let conn = Self { pool };
        if config.run_migrations {
            conn.run_migrations().await?;
        }

        Ok(conn)
    }

    /// Apply pending migrations
    pub async fn run_migrations(&self) -> Result<(), CoreError> {
        debug!("Running database migrations...");
        let applied = migrations::apply(&self.pool).await?;
        if applied > 0 {
            info!(applied, "Applied database migrations");
        }
        Ok(())
    }

    /// The connection pool
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Close every connection
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

/// Provider for SQLite state store repositories
pub struct SqliteStateStoreProvider {
    connection: SqliteConnection,
}

impl SqliteStateStoreProvider {
    /// Open a database with default settings
    pub async fn new(database_url: &str) -> Result<Self, CoreError> {
        let config = SqliteConfig {
            database_url: database_url.to_string(),
            ..Default::default()
        };

        Self::with_config(config).await
    }

    /// Open a database with custom settings
    pub async fn with_config(config: SqliteConfig) -> Result<Self, CoreError> {
        let connection = SqliteConnection::new(&config).await?;

        Ok(Self { connection })
    }

    /// Create all repositories
    pub fn create_repositories(
        &self,
    ) -> (Arc<dyn FlowInstanceRepository>, Arc<dyn NodeStateRepository>) {
        let conn = self.connection.clone();

        let flow_instance_repo = Arc::new(SqliteFlowInstanceRepository::new(conn.clone()));
        let node_state_repo = Arc::new(SqliteNodeStateRepository::new(conn));

        (flow_instance_repo, node_state_repo)
    }

    /// Gateway over this database
    pub fn gateway(&self) -> PersistenceGateway {
        let (instances, nodes) = self.create_repositories();
        PersistenceGateway::new(instances, nodes)
    }

    /// The underlying connection
    pub fn connection(&self) -> &SqliteConnection {
        &self.connection
    }
}
