//! Recipes driven through the poller, plus budget overrides from config.

mod common;

use common::{backend_timeout, ok, ScriptedOperation};
use control_plane_converge::budget::BudgetConfig;
use control_plane_converge::poller::Poller;
use control_plane_converge::recipes::{self, NodeAction, RecipeKind, RecipeRegistry};
use control_plane_converge::transport::RawResponse;
use control_plane_converge::Error;
use serde_json::json;
use std::io::Write;
use std::time::Duration;
use tokio::time::Instant;

fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
}

#[tokio::test(start_paused = true)]
async fn test_node_actions_wait_for_running_flag() {
    let stop = ScriptedOperation::responses(
        "GET /instances/42/nodes/node-1",
        vec![
            ok(json!({"name": "node-1", "running": true})),
            ok(json!({"name": "node-1", "running": false})),
        ],
    );
    let node = Poller::new()
        .run(&recipes::node_action(NodeAction::Stop), &stop)
        .await
        .unwrap();
    assert!(!node.running);
    assert_eq!(stop.calls(), 2);

    let restart = ScriptedOperation::responses(
        "GET /instances/42/nodes/node-1",
        vec![ok(json!({"name": "node-1", "running": true}))],
    );
    let node = Poller::new()
        .run(&recipes::node_action(NodeAction::Restart), &restart)
        .await
        .unwrap();
    assert!(node.running);
    assert_eq!(restart.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_private_link_unexpected_status_is_fatal() {
    let op = ScriptedOperation::responses(
        "GET /instances/42/privatelink",
        vec![
            ok(json!({"status": "pending"})),
            ok(json!({"status": "error"})),
        ],
    );
    let err = Poller::new()
        .run(&recipes::private_link(), &op)
        .await
        .unwrap_err();
    match err {
        Error::FatalRemote {
            status,
            code,
            message,
        } => {
            assert_eq!(status, 200);
            assert_eq!(code, None);
            assert_eq!(message, "unexpected status: error");
        }
        other => panic!("expected fatal, got {other}"),
    }
    assert_eq!(op.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_vpc_connect_enabled() {
    let op = ScriptedOperation::responses(
        "GET /instances/42/vpc-connect",
        vec![ok(json!({"status": "enabled", "service_name": "svc-1"}))],
    );
    let state = Poller::new().run(&recipes::vpc_connect(), &op).await.unwrap();
    assert_eq!(state.service_name.as_deref(), Some("svc-1"));
}

#[tokio::test(start_paused = true)]
async fn test_peering_waits_for_acceptance() {
    let op = ScriptedOperation::responses(
        "GET /vpcs/9/peering/pcx-1",
        vec![
            ok(json!({"status": "initiating-request"})),
            ok(json!({"status": "pending-acceptance", "peering_id": "pcx-1"})),
        ],
    );
    let state = Poller::new()
        .run(&recipes::peering_accepted(), &op)
        .await
        .unwrap();
    assert_eq!(state.status, "pending-acceptance");
    assert_eq!(op.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_plugin_install_and_removal() {
    let install = ScriptedOperation::responses(
        "GET /instances/42/plugins",
        vec![
            ok(json!([{"name": "rabbitmq_shovel", "enabled": false}])),
            ok(json!([{"name": "rabbitmq_shovel", "enabled": true, "version": "3.12"}])),
        ],
    );
    let plugins = Poller::new()
        .run(&recipes::plugin_enabled("rabbitmq_shovel"), &install)
        .await
        .unwrap();
    assert_eq!(plugins[0].version.as_deref(), Some("3.12"));
    assert_eq!(install.calls(), 2);

    let remove = ScriptedOperation::responses(
        "GET /instances/42/plugins",
        vec![
            ok(json!([{"name": "rabbitmq_shovel", "enabled": true}])),
            ok(json!([])),
        ],
    );
    let plugins = Poller::new()
        .run(&recipes::plugins_removed(), &remove)
        .await
        .unwrap();
    assert!(plugins.is_empty());
    assert_eq!(remove.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_upgrade_waits_for_every_node() {
    let op = ScriptedOperation::responses(
        "GET /instances/42/nodes",
        vec![
            ok(json!([
                {"name": "node-1", "configured": true, "rabbitmq_version": "3.13.1"},
                {"name": "node-2", "configured": false, "rabbitmq_version": "3.12.6"}
            ])),
            ok(json!([
                {"name": "node-1", "configured": true, "rabbitmq_version": "3.13.1"},
                {"name": "node-2", "configured": true, "rabbitmq_version": "3.13.1"}
            ])),
        ],
    );
    let start = Instant::now();
    let nodes = Poller::new()
        .run(&recipes::rabbitmq_upgrade(), &op)
        .await
        .unwrap();
    assert!(nodes
        .iter()
        .all(|n| n.rabbitmq_version.as_deref() == Some("3.13.1")));
    assert_eq!(start.elapsed(), secs(10));
}

#[tokio::test(start_paused = true)]
async fn test_lavinmq_upgrade_retries_backend_timeouts() {
    let op = ScriptedOperation::responses(
        "GET /instances/42/nodes",
        vec![
            backend_timeout(),
            ok(json!([{"name": "node-1", "configured": true}])),
        ],
    );
    let (nodes, stats) = Poller::new()
        .run_with_stats(&recipes::lavinmq_upgrade(), &op)
        .await
        .unwrap();
    assert_eq!(nodes.len(), 1);
    assert_eq!(stats.resource, "lavinmq_upgrade");
    assert_eq!(stats.transient_failures, 1);
    assert_eq!(stats.attempts, 2);
}

#[tokio::test(start_paused = true)]
async fn test_vpc_ready() {
    let op = ScriptedOperation::responses(
        "GET /vpcs/9",
        vec![ok(json!({"id": 9, "ready": false})), ok(json!({"id": 9, "ready": true}))],
    );
    let vpc = Poller::new().run(&recipes::vpc_ready(), &op).await.unwrap();
    assert_eq!(vpc.id, Some(9));
}

#[tokio::test(start_paused = true)]
async fn test_configuration_read_returns_first_success() {
    let op = ScriptedOperation::responses(
        "GET /instances/42/config",
        vec![
            backend_timeout(),
            backend_timeout(),
            ok(json!({"heartbeat": 120, "channel_max": 0})),
        ],
    );
    let config: serde_json::Value = Poller::new()
        .run(&recipes::configuration_read(), &op)
        .await
        .unwrap();
    assert_eq!(config["heartbeat"], 120);
    assert_eq!(op.gaps(), vec![secs(20), secs(40)]);
}

#[tokio::test(start_paused = true)]
async fn test_empty_success_body_reads_as_null() {
    let op = ScriptedOperation::responses(
        "GET /instances/42/config",
        vec![RawResponse::success(204, None)],
    );
    let config: Option<serde_json::Value> = Poller::new()
        .run(&recipes::configuration_read(), &op)
        .await
        .unwrap();
    assert!(config.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_overridden_budget_is_used() {
    let registry = RecipeRegistry::from_yaml(
        "configuration_read:\n  kind: attempts\n  max_attempts: 2\n  initial_delay_secs: 1\n",
    )
    .unwrap();
    let recipe = registry.configure(recipes::configuration_read::<serde_json::Value>());

    let op = ScriptedOperation::responses("GET /instances/42/config", vec![backend_timeout()]);
    let err = Poller::new().run(&recipe, &op).await.unwrap_err();

    assert!(matches!(err, Error::TimeoutExceeded { attempts: 2, .. }));
    assert_eq!(op.calls(), 2);
    assert_eq!(op.gaps(), vec![secs(1)]);
}

#[tokio::test(start_paused = true)]
async fn test_job_under_attempt_budget_is_rejected_before_any_call() {
    let op = ScriptedOperation::responses("GET /jobs/7", vec![ok(json!({"status": "completed"}))]);
    let recipe = recipes::job().with_budget(BudgetConfig::attempts(5, secs(1)));

    let err = Poller::new().run(&recipe, &op).await.unwrap_err();

    assert!(matches!(err, Error::Configuration { .. }));
    assert_eq!(op.calls(), 0);
}

#[test]
fn test_registry_rejects_attempt_budget_for_jobs() {
    let err = RecipeRegistry::from_yaml(
        "job:\n  kind: attempts\n  max_attempts: 3\n  initial_delay_secs: 1\n",
    )
    .unwrap_err();
    assert_eq!(
        err.context().and_then(|c| c.field_path.as_deref()),
        Some("job.kind")
    );
}

#[test]
fn test_registry_from_file() {
    let mut file = tempfile_in_target("recipes.yaml");
    writeln!(
        file.1,
        "job:\n  kind: deadline\n  timeout_secs: 7200\n  interval_secs: 30"
    )
    .unwrap();
    drop(file.1);

    let registry = RecipeRegistry::from_file(&file.0).unwrap();
    assert!(registry.is_overridden(RecipeKind::Job));
    assert_eq!(
        registry.budget_for(RecipeKind::Job),
        BudgetConfig::deadline(secs(7200), secs(30))
    );
    std::fs::remove_file(&file.0).unwrap();

    assert!(RecipeRegistry::from_file(&file.0).is_err());
}

#[test]
fn test_registry_env_overrides() {
    std::env::set_var("CPC_IT_RECIPES_INSTANCE_READY_TIMEOUT_SECS", "90");
    std::env::set_var("CPC_IT_RECIPES_INSTANCE_READY_INTERVAL_SECS", "3");
    let registry = RecipeRegistry::new()
        .with_env_overrides("CPC_IT_RECIPES")
        .unwrap();
    assert_eq!(
        registry.budget_for(RecipeKind::InstanceReady),
        BudgetConfig::deadline(secs(90), secs(3))
    );
    assert!(!registry.is_overridden(RecipeKind::VpcReady));
}

fn tempfile_in_target(name: &str) -> (std::path::PathBuf, std::fs::File) {
    let path = std::env::temp_dir().join(format!("cpc-{}-{}", std::process::id(), name));
    let file = std::fs::File::create(&path).unwrap();
    (path, file)
}
