// Copyright (c) 2025 - Cowboy AI, Inc.
//! Test Fixtures for cim-provisioning
//!
//! Small hand-built graphs with fixed names and CIDRs, plus an executor
//! configuration with millisecond polling so runs finish quickly.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use cim_provisioning::domain::{Cidr, ResourceKey, ResourceKind, ResourceSpec};
use cim_provisioning::graph::{GraphBuilder, ResourceGraph};
use cim_provisioning::provider::{PollConfig, RetryConfig, SimulatedProvider};
use cim_provisioning::{Executor, ExecutorConfig, MemoryStateStore, StaticSecrets};

pub const REGION: &str = "europe-west1";
pub const PRIVATE_CIDR: &str = "10.0.32.0/19";
pub const PUBLIC_CIDR: &str = "10.0.64.0/19";

/// Executor settings with short poll and retry intervals
pub fn fast_config() -> ExecutorConfig {
    ExecutorConfig {
        concurrency: 4,
        poll: PollConfig {
            initial_interval: Duration::from_millis(1),
            max_interval: Duration::from_millis(5),
            multiplier: 2.0,
            timeout: Duration::from_secs(5),
        },
        retry: RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
            backoff_multiplier: 2.0,
        },
        refresh: false,
    }
}

/// Secrets read by the platform's database user
pub fn database_secrets() -> StaticSecrets {
    StaticSecrets::new()
        .with("db-user", "moodle")
        .with("db-password", "correct-horse-battery-staple")
}

pub fn key(kind: ResourceKind, name: &str) -> ResourceKey {
    ResourceKey::parse_name(kind, name).expect("fixture names are valid")
}

pub fn vpc_key() -> ResourceKey {
    key(ResourceKind::Network, "demo-vpc")
}

pub fn private_subnet_key() -> ResourceKey {
    key(ResourceKind::Subnetwork, "demo-private-subnet")
}

pub fn cluster_key() -> ResourceKey {
    key(ResourceKind::Cluster, "demo-cluster")
}

pub fn node_pool_key() -> ResourceKey {
    key(ResourceKind::NodePool, "demo-node-pool")
}

/// Network, control-plane and node-pool layers
///
/// The cluster names its network by literal, so exactly two data edges
/// cross layer boundaries: private subnet → cluster and cluster → node pool.
pub fn three_layer_graph(private_cidr: &str) -> ResourceGraph {
    let cidr = Cidr::new(private_cidr).expect("fixture CIDR is valid");
    let mut builder = GraphBuilder::new();

    builder.enter_layer("network");
    let vpc = builder
        .declare(
            "demo-vpc",
            ResourceSpec::builder(ResourceKind::Network)
                .set("auto_create_subnetworks", false)
                .build()
                .unwrap(),
        )
        .unwrap();
    builder
        .declare(
            "demo-public-subnet",
            ResourceSpec::builder(ResourceKind::Subnetwork)
                .set("network", &vpc.id())
                .set("region", REGION)
                .set("ip_cidr_range", PUBLIC_CIDR)
                .build()
                .unwrap(),
        )
        .unwrap();
    let private = builder
        .declare(
            "demo-private-subnet",
            ResourceSpec::builder(ResourceKind::Subnetwork)
                .set("network", &vpc.id())
                .set("region", REGION)
                .set("ip_cidr_range", cidr)
                .build()
                .unwrap(),
        )
        .unwrap();

    builder.enter_layer("control-plane");
    let cluster = builder
        .declare(
            "demo-cluster",
            ResourceSpec::builder(ResourceKind::Cluster)
                .set("location", REGION)
                .set("network", "demo-vpc")
                .set("subnetwork", &private.id())
                .set("remove_default_node_pool", true)
                .build()
                .unwrap(),
        )
        .unwrap();

    builder.enter_layer("node-pool");
    builder
        .declare(
            "demo-node-pool",
            ResourceSpec::builder(ResourceKind::NodePool)
                .set("cluster", &cluster.name())
                .set("location", REGION)
                .set(
                    "node_config",
                    serde_json::json!({ "machine_type": "n1-standard-1", "preemptible": true }),
                )
                .build()
                .unwrap(),
        )
        .unwrap();

    builder.export("vpc_id", &vpc.id()).unwrap();
    builder
        .export("cluster_endpoint", &cluster.output::<String>("endpoint"))
        .unwrap();
    builder
        .export(
            "cluster_ca_certificate",
            &cluster.output::<String>("ca_certificate"),
        )
        .unwrap();
    builder.freeze().unwrap()
}

/// Peering connection and a database instance that waits for it
pub fn peering_graph() -> ResourceGraph {
    let mut builder = GraphBuilder::new();
    builder.enter_layer("application");

    let vpc = builder
        .declare(
            "demo-vpc",
            ResourceSpec::builder(ResourceKind::Network)
                .set("auto_create_subnetworks", false)
                .build()
                .unwrap(),
        )
        .unwrap();
    let range = builder
        .declare(
            "demo-private-services-range",
            ResourceSpec::builder(ResourceKind::GlobalAddress)
                .set("network", &vpc.id())
                .set("purpose", "VPC_PEERING")
                .set("address_type", "INTERNAL")
                .set("prefix_length", 16u32)
                .build()
                .unwrap(),
        )
        .unwrap();
    let peering = builder
        .declare(
            "demo-private-services",
            ResourceSpec::builder(ResourceKind::ServiceNetworkingConnection)
                .set("network", &vpc.id())
                .set("service", "servicenetworking.googleapis.com")
                .set("reserved_peering_ranges", range.name().map(|name: String| vec![name]))
                .build()
                .unwrap(),
        )
        .unwrap();
    let db = builder
        .declare(
            "demo-db",
            ResourceSpec::builder(ResourceKind::SqlDatabaseInstance)
                .set("region", REGION)
                .set("database_version", "MYSQL_8_0")
                .set("tier", "db-n1-standard-1")
                .set("private_network", &vpc.self_link())
                .build()
                .unwrap(),
        )
        .unwrap();
    builder.depends_on(&db, peering.key()).unwrap();
    builder.freeze().unwrap()
}

pub fn peering_key() -> ResourceKey {
    key(ResourceKind::ServiceNetworkingConnection, "demo-private-services")
}

pub fn database_key() -> ResourceKey {
    key(ResourceKind::SqlDatabaseInstance, "demo-db")
}

pub fn executor_with(
    provider: Arc<SimulatedProvider>,
    store: Arc<MemoryStateStore>,
    secrets: StaticSecrets,
) -> Executor {
    Executor::new(provider, store, Arc::new(secrets), fast_config())
}

pub fn executor(provider: Arc<SimulatedProvider>, store: Arc<MemoryStateStore>) -> Executor {
    executor_with(provider, store, StaticSecrets::new())
}
