// Copyright (c) 2025 - Cowboy AI, Inc.
//! Whole-platform runs through the composition layers

mod fixtures;

use std::sync::Arc;

use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use cim_provisioning::convergence::Action;
use cim_provisioning::domain::ResourceKind;
use cim_provisioning::graph::EdgeKind;
use cim_provisioning::provider::{CallMethod, ResourceProvider};
use cim_provisioning::stack::{application, ci_identity};
use cim_provisioning::state_machine::NodeState;
use cim_provisioning::{
    build_platform, Executor, MemoryStateStore, NodeOutcome, PlatformParams, ProvisionError,
    RoutingProvider, SimulatedProvider, StaticSecrets,
};

use fixtures::*;

struct Harness {
    cloud: Arc<SimulatedProvider>,
    workload: Arc<SimulatedProvider>,
    store: Arc<MemoryStateStore>,
    executor: Executor,
}

fn engine_versions_key() -> cim_provisioning::domain::ResourceKey {
    key(ResourceKind::EngineVersions, "demo-engine-versions")
}

fn harness(secrets: StaticSecrets) -> Harness {
    let cloud = Arc::new(SimulatedProvider::new("cloud"));
    let workload = Arc::new(SimulatedProvider::new("workload"));
    let provider: Arc<dyn ResourceProvider> =
        Arc::new(RoutingProvider::new(cloud.clone(), workload.clone()));
    let store = Arc::new(MemoryStateStore::new());
    let executor = Executor::new(provider, store.clone(), Arc::new(secrets), fast_config());
    Harness {
        cloud,
        workload,
        store,
        executor,
    }
}

#[test]
fn test_platform_graph_shape() {
    let params = PlatformParams::default();
    let graph = build_platform(&params).unwrap();

    assert_eq!(graph.composition_layers().len(), 6);
    assert_eq!(
        graph.nodes_in_layer(ci_identity::LAYER).len(),
        params.ci_roles.len() + 4
    );
    assert_eq!(
        graph.secret_names().into_iter().collect::<Vec<_>>(),
        vec!["db-password".to_string(), "db-user".to_string()]
    );
    assert_eq!(graph.cross_layer_edges(EdgeKind::Ordering).len(), 0);
    let db = key(ResourceKind::SqlDatabaseInstance, "demo-db");
    let peering = key(ResourceKind::ServiceNetworkingConnection, "demo-private-services");
    assert!(graph.dependencies(&db).contains(&(peering, EdgeKind::Ordering)));
}

#[test]
fn test_platform_names_follow_params() {
    let params = PlatformParams {
        name: "edu".to_string(),
        ..PlatformParams::default()
    };
    let graph = build_platform(&params).unwrap();
    assert!(graph.contains(&key(ResourceKind::Network, "edu-vpc")));
    assert!(graph.contains(&key(ResourceKind::Firewall, "edu-bastion-allow-ingress-from-iap")));
    assert!(!graph.contains(&key(ResourceKind::Network, "demo-vpc")));
}

#[tokio::test]
async fn test_platform_apply_and_reapply() {
    let graph = build_platform(&PlatformParams::default()).unwrap();
    let h = harness(database_secrets());

    let report = h
        .executor
        .apply(&graph, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{report}");
    assert_eq!(report.count(NodeOutcome::Created), graph.len() - 1);
    assert_eq!(report.outcome(&engine_versions_key()), Some(NodeOutcome::Read));

    // Workload objects go to the orchestrator, everything else to the cloud.
    // The version lookup creates nothing.
    let workload_objects = graph
        .nodes()
        .filter(|n| n.key().kind().is_workload())
        .count();
    assert_eq!(h.workload.resource_count().await, workload_objects);
    assert_eq!(h.cloud.resource_count().await, graph.len() - workload_objects - 1);

    let latest = serde_json::json!("1.29.6-gke.1038");
    assert_eq!(
        report.exports.get("latest_engine_version").and_then(|v| v.as_value()),
        Some(&latest)
    );
    let cluster_fields = h
        .cloud
        .fields_of(&key(ResourceKind::Cluster, "demo-cluster"))
        .await
        .unwrap();
    assert_eq!(cluster_fields["min_master_version"], latest);

    let app_url = report.exports.get("app_url").and_then(|v| v.as_str()).unwrap();
    assert!(app_url.starts_with("http://35.190."), "{app_url}");
    assert!(app_url != application::PENDING_URL);
    assert!(report.exports.get("cluster_access").unwrap().is_redacted());
    assert!(report.exports.get("cluster_ca_certificate").unwrap().is_redacted());
    assert_eq!(
        report.exports.get("redis_port").and_then(|v| v.as_value()),
        Some(&serde_json::json!(6379))
    );

    let peering_ready = report
        .node(&key(ResourceKind::ServiceNetworkingConnection, "demo-private-services"))
        .and_then(|n| n.entered(NodeState::Ready))
        .unwrap();
    let db_creating = report
        .node(&key(ResourceKind::SqlDatabaseInstance, "demo-db"))
        .and_then(|n| n.entered(NodeState::Creating))
        .unwrap();
    assert!(db_creating.sequence > peering_ready.sequence);

    let rendered = serde_json::to_string(&report).unwrap();
    assert!(!rendered.contains("correct-horse-battery-staple"));

    h.cloud.clear_calls().await;
    h.workload.clear_calls().await;
    let again = h
        .executor
        .apply(&graph, &CancellationToken::new())
        .await
        .unwrap();
    assert!(again.is_success(), "{again}");
    assert_eq!(again.count(NodeOutcome::Unchanged), graph.len() - 1);
    assert_eq!(again.count(NodeOutcome::Read), 1);
    assert!(h.cloud.mutating_calls().await.is_empty());
    assert!(h.workload.mutating_calls().await.is_empty());

    let lookups = h.cloud.calls_for(&engine_versions_key()).await;
    assert!(!lookups.is_empty());
    assert!(lookups.iter().all(|c| c.method == CallMethod::Read));
}

#[tokio::test]
async fn test_new_engine_release_updates_cluster_in_place() {
    let graph = build_platform(&PlatformParams::default()).unwrap();
    let h = harness(database_secrets());
    h.executor
        .apply(&graph, &CancellationToken::new())
        .await
        .unwrap();

    h.cloud.publish_release("REGULAR", "1.29.8-gke.1200").await;
    // Other lines and channels do not move the cluster.
    h.cloud.publish_release("REGULAR", "1.30.4-gke.1348").await;
    h.cloud.publish_release("RAPID", "1.29.9-gke.1001").await;
    h.cloud.clear_calls().await;

    let cluster = key(ResourceKind::Cluster, "demo-cluster");
    let plan = h.executor.plan(&graph).await.unwrap();
    assert_eq!(plan.action(&engine_versions_key()), Some(&Action::Read));
    assert_eq!(
        plan.action(&cluster),
        Some(&Action::Update {
            changed: vec!["min_master_version".to_string()]
        })
    );

    let report = h
        .executor
        .apply(&graph, &CancellationToken::new())
        .await
        .unwrap();
    assert!(report.is_success(), "{report}");
    assert_eq!(report.outcome(&cluster), Some(NodeOutcome::Updated));
    assert_eq!(
        report.exports.get("latest_engine_version").and_then(|v| v.as_value()),
        Some(&serde_json::json!("1.29.8-gke.1200"))
    );

    let mutated: Vec<_> = h
        .cloud
        .mutating_calls()
        .await
        .into_iter()
        .map(|c| (c.method, c.resource))
        .collect();
    assert_eq!(mutated, vec![(CallMethod::Update, cluster)]);
    assert!(h.workload.mutating_calls().await.is_empty());
}

#[tokio::test]
async fn test_failed_version_lookup_blocks_the_cluster() {
    let graph = build_platform(&PlatformParams {
        control_plane_version: "1.12".to_string(),
        ..PlatformParams::default()
    })
    .unwrap();
    let h = harness(database_secrets());

    let report = h
        .executor
        .apply(&graph, &CancellationToken::new())
        .await
        .unwrap();
    assert!(!report.is_success());

    let lookup = report.node(&engine_versions_key()).unwrap();
    assert_eq!(lookup.outcome, NodeOutcome::Failed);
    assert_eq!(lookup.final_state(), NodeState::Failed);
    assert!(lookup.error_chain.iter().any(|line| line.contains("1.12")), "{:?}", lookup.error_chain);

    let cluster = key(ResourceKind::Cluster, "demo-cluster");
    assert_eq!(report.outcome(&cluster), Some(NodeOutcome::Blocked));
    assert!(h.cloud.calls_for(&cluster).await.is_empty());
    assert!(h
        .cloud
        .calls_for(&engine_versions_key())
        .await
        .iter()
        .all(|c| c.method == CallMethod::Read));
}

#[tokio::test]
async fn test_rotated_password_updates_in_place() {
    let graph = build_platform(&PlatformParams::default()).unwrap();
    let h = harness(database_secrets());
    h.executor
        .apply(&graph, &CancellationToken::new())
        .await
        .unwrap();

    let rotated = Executor::new(
        Arc::new(RoutingProvider::new(h.cloud.clone(), h.workload.clone())),
        h.store.clone(),
        Arc::new(
            StaticSecrets::new()
                .with("db-user", "moodle")
                .with("db-password", "tr0ub4dor&3"),
        ),
        fast_config(),
    );
    let sql_user = key(ResourceKind::SqlUser, "demo-db-user");
    let deployment = key(ResourceKind::Deployment, "moodle");

    let plan = rotated.plan(&graph).await.unwrap();
    assert_eq!(
        plan.action(&sql_user),
        Some(&Action::Update {
            changed: vec!["password".to_string()]
        })
    );
    assert_eq!(
        plan.action(&deployment),
        Some(&Action::Update {
            changed: vec!["containers".to_string()]
        })
    );
    assert_eq!(plan.summary().update, 2);

    let report = rotated.apply(&graph, &CancellationToken::new()).await.unwrap();
    assert!(report.is_success(), "{report}");
    assert_eq!(report.outcome(&sql_user), Some(NodeOutcome::Updated));
    assert_eq!(report.outcome(&deployment), Some(NodeOutcome::Updated));
    assert_eq!(report.count(NodeOutcome::Unchanged), graph.len() - 3);
    assert_eq!(report.count(NodeOutcome::Read), 1);
    assert!(!serde_json::to_string(&report).unwrap().contains("tr0ub4dor"));
}

#[tokio::test]
async fn test_platform_without_secrets_is_refused() {
    let graph = build_platform(&PlatformParams::default()).unwrap();
    let h = harness(StaticSecrets::new());
    let result = h.executor.apply(&graph, &CancellationToken::new()).await;
    assert!(matches!(result, Err(ProvisionError::SecretMissing(ref name)) if name == "db-password"));
    assert!(h.cloud.calls().await.is_empty());
}

#[tokio::test]
async fn test_platform_destroy_removes_everything() {
    let graph = build_platform(&PlatformParams::default()).unwrap();
    let h = harness(database_secrets());
    h.executor
        .apply(&graph, &CancellationToken::new())
        .await
        .unwrap();

    let report = h.executor.destroy(&CancellationToken::new()).await.unwrap();
    assert!(report.is_success(), "{report}");
    // The version lookup was never recorded, so nothing deletes it.
    assert_eq!(report.count(NodeOutcome::Deleted), graph.len() - 1);
    assert!(report.node(&engine_versions_key()).is_none());
    assert_eq!(h.cloud.resource_count().await, 0);
    assert_eq!(h.workload.resource_count().await, 0);

    // Dependents go first: the cluster outlives every workload object.
    let cluster_deleting = report
        .node(&key(ResourceKind::Cluster, "demo-cluster"))
        .and_then(|n| n.entered(NodeState::Deleting))
        .unwrap()
        .sequence;
    for node in report.nodes.values().filter(|n| n.key.kind().is_workload()) {
        let deleted = node.entered(NodeState::Deleted).unwrap().sequence;
        assert!(deleted < cluster_deleting, "{} deleted after the cluster", node.key);
    }
}
