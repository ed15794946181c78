use clusterflow_core::{
    CoreError, FlowContext, FlowInstance, FlowInstanceId, FlowRegistry, FlowRuntime, FlowEngine,
    FlowStatus, FlowTemplate, NodeOutcome, NodeState, NodeStatus, PollingPolicy,
};
use clusterflow_state_sqlite::{SqliteConfig, SqliteStateStoreProvider};
use clusterflow_test_utils::{test_config, wait_for_parked, wait_for_status, ScriptedExecutor};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_test::assert_ok;

const WAIT: Duration = Duration::from_secs(5);

fn instance(biz_id: &str) -> FlowInstance {
    let mut ctx = FlowContext::new();
    ctx.set("cluster_id", json!(biz_id));
    FlowInstance::new("CreateCluster", biz_id, "prepare_resource", ctx)
}

#[tokio::test]
async fn test_flow_instance_round_trip() -> Result<(), CoreError> {
    let provider = SqliteStateStoreProvider::with_config(SqliteConfig::in_memory()).await?;
    let gateway = provider.gateway();

    let mut created = instance("c-1");
    gateway.save_flow_instance(&created).await?;

    let loaded = gateway.load_instance(&created.id).await?.unwrap();
    assert_eq!(loaded.status, FlowStatus::Init);
    assert_eq!(loaded.context.get("cluster_id"), Some(&json!("c-1")));

    created.start()?;
    created.current_attempt = 2;
    gateway.save_flow_instance(&created).await?;

    let loaded = gateway.load_instance(&created.id).await?.unwrap();
    assert_eq!(loaded.status, FlowStatus::Processing);
    assert_eq!(loaded.current_attempt, 2);
    assert_eq!(loaded.created_at, created.created_at);

    assert!(gateway
        .load_instance(&FlowInstanceId("missing".to_string()))
        .await?
        .is_none());
    Ok(())
}

#[tokio::test]
async fn test_active_and_biz_queries() -> Result<(), CoreError> {
    let provider = SqliteStateStoreProvider::with_config(SqliteConfig::in_memory()).await?;
    let gateway = provider.gateway();

    let waiting = instance("c-1");
    let mut running = instance("c-1");
    running.start()?;
    let mut finished = instance("c-2");
    finished.start()?;
    finished.fail("deploy_cluster: timeout")?;

    for i in [&waiting, &running, &finished] {
        gateway.save_flow_instance(i).await?;
    }

    let active = gateway.load_active_instances().await?;
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].id, running.id);

    let for_biz = gateway.load_instances_for_biz("c-1").await?;
    assert_eq!(for_biz.len(), 2);

    let failed = gateway.load_instances_for_biz("c-2").await?;
    assert_eq!(failed[0].last_error.as_deref(), Some("deploy_cluster: timeout"));
    Ok(())
}

#[tokio::test]
async fn test_node_state_upsert_keeps_order() -> Result<(), CoreError> {
    let provider = SqliteStateStoreProvider::with_config(SqliteConfig::in_memory()).await?;
    let gateway = provider.gateway();
    let flow_id = FlowInstanceId("flow-1".to_string());

    let mut first = NodeState::new(flow_id.clone(), "deploy_cluster", 1);
    first.begin()?;
    gateway.save_node_state(&first).await?;

    let mut second = NodeState::new(flow_id.clone(), "deploy_cluster", 2);
    second.begin()?;
    gateway.save_node_state(&second).await?;

    first.suspend()?;
    gateway.save_node_state(&first).await?;
    second.succeed()?;
    gateway.save_node_state(&second).await?;

    let history = gateway.load_node_states(&flow_id).await?;
    assert_eq!(history.len(), 2);
    assert_eq!(history[0].attempt, 1);
    assert!(history[0].finished_at.is_some());
    assert_eq!(history[1].attempt, 2);
    assert_eq!(history[1].status, NodeStatus::Success);
    Ok(())
}

#[tokio::test]
async fn test_migrations_are_idempotent() -> Result<(), CoreError> {
    let dir = tempfile::tempdir().map_err(CoreError::from)?;
    let path = dir.path().join("state.db");

    let provider = SqliteStateStoreProvider::with_config(SqliteConfig::file(&path)).await?;
    let saved = instance("c-1");
    provider.gateway().save_flow_instance(&saved).await?;
    assert_ok!(provider.connection().run_migrations().await);
    provider.connection().close().await;

    let reopened = SqliteStateStoreProvider::with_config(SqliteConfig::file(&path)).await?;
    assert!(reopened.gateway().load_instance(&saved.id).await?.is_some());
    Ok(())
}

#[tokio::test]
async fn test_engine_restart_over_database_file() -> Result<(), CoreError> {
    let dir = tempfile::tempdir().map_err(CoreError::from)?;
    let path = dir.path().join("engine.db");

    let deploy = ScriptedExecutor::pending_then(1, NodeOutcome::Success).shared();
    let registry = Arc::new(FlowRegistry::new().with(
        FlowTemplate::builder("Deploy")
            .polling("deploy", "done", "fail", PollingPolicy::max_attempts(5), deploy.clone())
            .end("done")
            .end("fail")
            .build()?,
    )?);

    let id = {
        let provider = SqliteStateStoreProvider::with_config(SqliteConfig::file(&path)).await?;
        let engine = FlowEngine::new(FlowRuntime::new(
            registry.clone(),
            provider.gateway(),
            test_config(),
        ));
        let id = engine.create_and_start("Deploy", "c-1", FlowContext::new()).await?;
        wait_for_parked(&engine, &id, "deploy", WAIT).await?;
        provider.connection().close().await;
        id
    };

    let provider = SqliteStateStoreProvider::with_config(SqliteConfig::file(&path)).await?;
    let engine = FlowEngine::new(FlowRuntime::new(registry, provider.gateway(), test_config()));

    let report = engine.recover().await?;
    assert_eq!(report.rearmed, 1);
    engine.scheduler().poll_due().await;

    wait_for_status(&engine, &id, FlowStatus::Success, WAIT).await?;
    assert_eq!(deploy.attempts(), vec![1, 2]);

    let history = engine.node_history(&id).await?;
    let attempts: Vec<u32> = history
        .iter()
        .filter(|s| s.node_name == "deploy")
        .map(|s| s.attempt)
        .collect();
    assert_eq!(attempts, vec![1, 2]);
    Ok(())
}
