//! Schema migrations, applied in order and recorded in `schema_migrations`.

use sqlx::{Row, SqlitePool};
use tracing::debug;

use clusterflow_core::CoreError;

/// Named migrations in application order
pub fn generate_migrations() -> Vec<(&'static str, &'static str)> {
    vec![
        (
            "20240401000000_initial_schema",
            r#"
            CREATE TABLE IF NOT EXISTS flow_instances (
                id TEXT PRIMARY KEY,
                template_name TEXT NOT NULL,
                biz_id TEXT NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS node_states (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                id TEXT NOT NULL UNIQUE,
                flow_id TEXT NOT NULL,
                node_name TEXT NOT NULL,
                attempt INTEGER NOT NULL,
                status TEXT NOT NULL,
                data TEXT NOT NULL
            );
            "#,
        ),
        (
            "20240402000000_lookup_indexes",
            r#"
            CREATE INDEX IF NOT EXISTS idx_flow_instances_status ON flow_instances(status);
            CREATE INDEX IF NOT EXISTS idx_flow_instances_biz_id ON flow_instances(biz_id);
            CREATE INDEX IF NOT EXISTS idx_node_states_flow_id ON node_states(flow_id, seq);
            "#,
        ),
    ]
}

/// Apply migrations not yet recorded; returns how many ran
pub async fn apply(pool: &SqlitePool) -> Result<usize, CoreError> {
    sqlx::query(
        "CREATE TABLE IF NOT EXISTS schema_migrations (name TEXT PRIMARY KEY, applied_at TEXT NOT NULL)",
    )
    .execute(pool)
    .await
    .map_err(|e| CoreError::PersistenceError(format!("Failed to create migrations table: {}", e)))?;

    let rows = sqlx::query("SELECT name FROM schema_migrations")
        .fetch_all(pool)
        .await
        .map_err(|e| CoreError::PersistenceError(format!("Failed to read migrations: {}", e)))?;
    let done: Vec<String> = rows
        .iter()
        .map(|row| row.try_get::<String, _>("name"))
        .collect::<Result<_, _>>()
        .map_err(|e| CoreError::PersistenceError(format!("Failed to read migrations: {}", e)))?;

    let mut applied = 0;
    for (name, sql) in generate_migrations() {
        if done.iter().any(|d| d == name) {
            continue;
        }

        debug!("Applying migration: {}", name);
        let mut tx = pool
            .begin()
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to begin migration: {}", e)))?;

        sqlx::raw_sql(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Migration {} failed: {}", name, e)))?;

        sqlx::query("INSERT INTO schema_migrations (name, applied_at) VALUES (?1, ?2)")
            .bind(name)
            .bind(chrono::Utc::now())
            .execute(&mut *tx)
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to record migration {}: {}", name, e)))?;

        tx.commit()
            .await
            .map_err(|e| CoreError::PersistenceError(format!("Failed to commit migration {}: {}", name, e)))?;
        applied += 1;
    }

    Ok(applied)
}
