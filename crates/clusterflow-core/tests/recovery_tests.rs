use clusterflow_core::{
    CoreError, EngineConfig, FlowContext, FlowInstance, FlowRegistry, FlowStatus, FlowTemplate,
    NodeExecutor, NodeOutcome, PollKey, PollingPolicy, RecoveryReport,
};
use clusterflow_test_utils::{
    assert_attempts_increasing, assert_node_sequence, test_config, wait_for_parked,
    wait_for_status, ScriptedExecutor, TestEngineBuilder,
};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn registry(deploy: Arc<dyn NodeExecutor>, prepare: Arc<dyn NodeExecutor>) -> Result<FlowRegistry, CoreError> {
    FlowRegistry::new()
        .with(
            FlowTemplate::builder("Deploy")
                .polling("deploy", "done", "fail", PollingPolicy::max_attempts(5), deploy)
                .end("done")
                .end("fail")
                .build()?,
        )?
        .with(
            FlowTemplate::builder("Provision")
                .immediate("prepare", "done", "fail", prepare)
                .end("done")
                .end("fail")
                .build()?,
        )
}

#[tokio::test]
async fn test_restart_resumes_polling_from_persisted_attempt() -> Result<(), CoreError> {
    let deploy = ScriptedExecutor::pending_then(2, NodeOutcome::Success).shared();
    let prepare = ScriptedExecutor::success().shared();
    let registry = registry(deploy.clone(), prepare)?;

    let before = TestEngineBuilder::new().registry(registry.clone()).build();
    let id = before
        .engine
        .create_and_start("Deploy", "c-1", FlowContext::new())
        .await?;
    wait_for_parked(&before.engine, &id, "deploy", WAIT).await?;
    before.engine.scheduler().poll_due().await;
    assert_eq!(deploy.attempts(), vec![1, 2]);

    let after = before.restart(registry, test_config());
    let report = after.recover().await?;
    assert_eq!(
        report,
        RecoveryReport {
            rearmed: 1,
            resumed: 0,
            skipped: 0
        }
    );
    assert!(after
        .runtime()
        .queue()
        .contains(&PollKey::new(id.clone(), "deploy")));

    assert_eq!(after.scheduler().poll_due().await, 1);
    let instance = wait_for_status(&after, &id, FlowStatus::Success, WAIT).await?;
    assert_eq!(instance.current_node, "done");

    assert_eq!(deploy.attempts(), vec![1, 2, 3]);
    let history = after.node_history(&id).await?;
    assert_node_sequence(&history, &["deploy", "deploy", "deploy", "done"]);
    assert_attempts_increasing(&history, "deploy");
    Ok(())
}

#[tokio::test]
async fn test_recover_resumes_immediate_and_skips_unknown() -> Result<(), CoreError> {
    let prepare = ScriptedExecutor::success().shared();
    let test = TestEngineBuilder::new()
        .registry(registry(ScriptedExecutor::success().shared(), prepare.clone())?)
        .build();
    let gateway = test.store.gateway();

    let mut parked = FlowInstance::new("Provision", "c-1", "prepare", FlowContext::new());
    parked.start()?;
    gateway.save_flow_instance(&parked).await?;

    let mut orphan = FlowInstance::new("Retired", "c-2", "gone", FlowContext::new());
    orphan.start()?;
    gateway.save_flow_instance(&orphan).await?;

    let report = test.engine.recover().await?;
    assert_eq!(report.resumed, 1);
    assert_eq!(report.skipped, 1);
    assert_eq!(report.rearmed, 0);

    wait_for_status(&test.engine, &parked.id, FlowStatus::Success, WAIT).await?;
    assert_eq!(prepare.attempts(), vec![1]);

    let orphan = test.engine.instance(&orphan.id).await?;
    assert_eq!(orphan.status, FlowStatus::Processing);
    Ok(())
}

#[tokio::test]
async fn test_recover_leaves_immediate_nodes_when_disabled() -> Result<(), CoreError> {
    let prepare = ScriptedExecutor::success().shared();
    let config = EngineConfig {
        resume_immediate_on_recovery: false,
        ..test_config()
    };
    let test = TestEngineBuilder::new()
        .registry(registry(ScriptedExecutor::success().shared(), prepare.clone())?)
        .config(config)
        .build();

    let mut parked = FlowInstance::new("Provision", "c-1", "prepare", FlowContext::new());
    parked.start()?;
    test.store.gateway().save_flow_instance(&parked).await?;

    let report = test.engine.recover().await?;
    assert_eq!(report.skipped, 1);
    assert_eq!(prepare.calls(), 0);
    assert_eq!(test.engine.runtime().live_instances(), 0);
    Ok(())
}

#[tokio::test]
async fn test_recover_ignores_finished_and_unstarted_instances() -> Result<(), CoreError> {
    let test = TestEngineBuilder::new()
        .registry(registry(
            ScriptedExecutor::success().shared(),
            ScriptedExecutor::success().shared(),
        )?)
        .build();

    let id = test
        .engine
        .create_and_start("Provision", "c-1", FlowContext::new())
        .await?;
    test.engine.runtime().drive(&id).await?;
    test.engine
        .runtime()
        .create_instance("Provision", "c-2", FlowContext::new())
        .await?;

    let report = test.engine.recover().await?;
    assert_eq!(report, RecoveryReport::default());
    Ok(())
}

#[tokio::test]
async fn test_persistence_failure_halts_then_resumes() -> Result<(), CoreError> {
    let deploy = ScriptedExecutor::pending_then(1, NodeOutcome::Success).shared();
    let test = TestEngineBuilder::new()
        .registry(registry(deploy.clone(), ScriptedExecutor::success().shared())?)
        .build();
    let engine = &test.engine;

    let id = engine.create_and_start("Deploy", "c-1", FlowContext::new()).await?;
    wait_for_parked(engine, &id, "deploy", WAIT).await?;

    test.faults.fail_always();
    assert_eq!(engine.scheduler().poll_due().await, 1);

    assert!(engine.runtime().is_halted(&id));
    let halted = engine.halted_instances();
    assert_eq!(halted.len(), 1);
    assert_eq!(halted[0].0, id);
    assert!(halted[0].1.contains("injected failure"));
    assert!(engine.runtime().queue().is_empty());
    assert!(matches!(
        engine.runtime().drive(&id).await,
        Err(CoreError::InstanceHalted(_))
    ));

    let durable = engine.instance(&id).await?;
    assert_eq!(durable.status, FlowStatus::Processing);
    assert_eq!(durable.current_node, "deploy");
    assert_eq!(durable.current_attempt, 1);

    test.faults.clear();
    engine.resume_instance(&id).await?;
    assert!(!engine.runtime().is_halted(&id));
    assert_eq!(engine.scheduler().poll_due().await, 1);

    wait_for_status(engine, &id, FlowStatus::Success, WAIT).await?;
    let history = engine.node_history(&id).await?;
    assert_node_sequence(&history, &["deploy", "deploy", "done"]);
    assert_attempts_increasing(&history, "deploy");
    Ok(())
}

#[tokio::test]
async fn test_transient_persistence_failure_is_retried() -> Result<(), CoreError> {
    let test = TestEngineBuilder::new()
        .registry(registry(
            ScriptedExecutor::success().shared(),
            ScriptedExecutor::success().shared(),
        )?)
        .build();
    let engine = &test.engine;

    let id = engine.create_and_start("Provision", "c-1", FlowContext::new()).await?;
    test.faults.fail_next(1);
    engine.runtime().drive(&id).await?;

    assert_eq!(test.faults.failures(), 1);
    assert!(engine.halted_instances().is_empty());
    assert_eq!(engine.instance(&id).await?.status, FlowStatus::Success);
    Ok(())
}

#[tokio::test]
async fn test_failed_start_reports_error() -> Result<(), CoreError> {
    let test = TestEngineBuilder::new()
        .registry(registry(
            ScriptedExecutor::success().shared(),
            ScriptedExecutor::success().shared(),
        )?)
        .build();

    test.faults.fail_always();
    let result = test
        .engine
        .create_and_start("Provision", "c-1", FlowContext::new())
        .await;
    assert!(matches!(result, Err(CoreError::PersistenceError(_))));
    Ok(())
}

#[tokio::test]
async fn test_failed_start_cancels_the_created_instance() -> Result<(), CoreError> {
    let test = TestEngineBuilder::new()
        .registry(registry(
            ScriptedExecutor::success().shared(),
            ScriptedExecutor::success().shared(),
        )?)
        .build();

    // The create save goes through; both tries of the start save fail
    test.faults.fail_after(1, 2);
    let result = test
        .engine
        .create_and_start("Provision", "c-1", FlowContext::new())
        .await;
    assert!(matches!(result, Err(CoreError::PersistenceError(_))));
    assert_eq!(test.faults.failures(), 2);

    let created = test.engine.instances_for_biz("c-1").await?;
    assert_eq!(created.len(), 1);
    assert_eq!(created[0].status, FlowStatus::Canceled);
    assert_eq!(test.engine.runtime().live_instances(), 0);
    assert!(test.engine.halted_instances().is_empty());
    assert_eq!(test.engine.recover().await?, RecoveryReport::default());
    Ok(())
}

#[tokio::test]
async fn test_resume_after_lost_instance_save_keeps_attempts_increasing() -> Result<(), CoreError> {
    let deploy = ScriptedExecutor::always(NodeOutcome::Pending).shared();
    let test = TestEngineBuilder::new()
        .registry(registry(deploy.clone(), ScriptedExecutor::success().shared())?)
        .build();
    let engine = &test.engine;

    let id = engine.create_and_start("Deploy", "c-1", FlowContext::new()).await?;
    wait_for_parked(engine, &id, "deploy", WAIT).await?;

    test.instance_faults.fail_always();
    assert_eq!(engine.scheduler().poll_due().await, 1);
    assert!(engine.runtime().is_halted(&id));
    assert_eq!(engine.instance(&id).await?.current_attempt, 1);
    let attempts: Vec<u32> = engine.node_history(&id).await?.iter().map(|s| s.attempt).collect();
    assert_eq!(attempts, vec![1, 2]);

    test.instance_faults.clear();
    engine.resume_instance(&id).await?;
    assert_eq!(engine.scheduler().poll_due().await, 1);

    let history = engine.node_history(&id).await?;
    let attempts: Vec<u32> = history.iter().map(|s| s.attempt).collect();
    assert_eq!(attempts, vec![1, 2, 3]);
    assert_attempts_increasing(&history, "deploy");
    assert_eq!(deploy.attempts(), vec![1, 2, 3]);
    assert_eq!(engine.instance(&id).await?.current_attempt, 3);
    Ok(())
}

#[tokio::test]
async fn test_recover_continues_after_recorded_attempts() -> Result<(), CoreError> {
    let deploy = ScriptedExecutor::pending_then(2, NodeOutcome::Success).shared();
    let registry = registry(deploy.clone(), ScriptedExecutor::success().shared())?;
    let before = TestEngineBuilder::new().registry(registry.clone()).build();

    let id = before
        .engine
        .create_and_start("Deploy", "c-1", FlowContext::new())
        .await?;
    wait_for_parked(&before.engine, &id, "deploy", WAIT).await?;
    before.instance_faults.fail_always();
    before.engine.scheduler().poll_due().await;

    let after = before.restart(registry, test_config());
    assert_eq!(after.recover().await?.rearmed, 1);
    after.scheduler().poll_due().await;

    wait_for_status(&after, &id, FlowStatus::Success, WAIT).await?;
    let history = after.node_history(&id).await?;
    assert_node_sequence(&history, &["deploy", "deploy", "deploy", "done"]);
    assert_attempts_increasing(&history, "deploy");
    Ok(())
}

#[tokio::test]
async fn test_future_entry_time_does_not_trip_deadline() -> Result<(), CoreError> {
    let deploy = ScriptedExecutor::pending_then(1, NodeOutcome::Success).shared();
    let template = FlowTemplate::builder("Timed")
        .polling(
            "deploy",
            "done",
            "fail",
            PollingPolicy::max_attempts(10).with_deadline(Duration::from_secs(1)),
            deploy.clone(),
        )
        .end("done")
        .end("fail")
        .build()?;
    let test = TestEngineBuilder::new().template(template)?.build();

    // Written by a host whose clock ran an hour ahead
    let mut parked = FlowInstance::new("Timed", "c-1", "deploy", FlowContext::new());
    parked.start()?;
    parked.node_entered_at = chrono::Utc::now() + chrono::Duration::hours(1);
    test.store.gateway().save_flow_instance(&parked).await?;

    assert_eq!(test.engine.recover().await?.rearmed, 1);
    test.engine.scheduler().poll_due().await;
    test.engine.scheduler().poll_due().await;

    let instance = wait_for_status(&test.engine, &parked.id, FlowStatus::Success, WAIT).await?;
    assert_eq!(instance.current_node, "done");
    assert_eq!(deploy.calls(), 2);
    Ok(())
}
