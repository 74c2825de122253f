// Copyright (c) 2025 - Cowboy AI, Inc.
//! Properties of randomly shaped graphs
//!
//! Graphs are generated as a network followed by routers. Each router reads
//! the name of one earlier node (a data edge) and may additionally wait for
//! another earlier node (an ordering edge), so every generated graph is
//! acyclic by construction.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use proptest::prelude::*;
use tokio_util::sync::CancellationToken;

use cim_provisioning::domain::{ResourceKey, ResourceKind, ResourceSpec};
use cim_provisioning::graph::{GraphBuilder, GraphError, ResourceGraph, ResourceRef};
use cim_provisioning::output::Output;
use cim_provisioning::provider::{Fault, PollConfig, RetryConfig, SimulatedProvider};
use cim_provisioning::state_machine::NodeState;
use cim_provisioning::{
    Executor, ExecutorConfig, MemoryStateStore, NodeOutcome, RunReport, StaticSecrets,
};

const REGION: &str = "us-central1";

/// Shape of one router: the earlier node it reads, and one it waits for
#[derive(Debug, Clone)]
struct RouterShape {
    reads: usize,
    waits_for: Option<usize>,
}

/// Seeds are reduced modulo the router's position so every edge points back
fn graph_shape() -> impl Strategy<Value = Vec<RouterShape>> {
    prop::collection::vec((any::<usize>(), prop::option::of(any::<usize>())), 0..12).prop_map(
        |seeds| {
            seeds
                .into_iter()
                .enumerate()
                .map(|(i, (reads, waits_for))| RouterShape {
                    reads: reads % (i + 1),
                    waits_for: waits_for.map(|w| w % (i + 1)),
                })
                .collect()
        },
    )
}

fn node_name(index: usize) -> String {
    if index == 0 {
        "net-0".to_string()
    } else {
        format!("router-{index}")
    }
}

fn node_key(index: usize) -> ResourceKey {
    let kind = if index == 0 {
        ResourceKind::Network
    } else {
        ResourceKind::Router
    };
    ResourceKey::parse_name(kind, &node_name(index)).unwrap()
}

fn build(shape: &[RouterShape]) -> ResourceGraph {
    let mut builder = GraphBuilder::new();
    let mut refs: Vec<ResourceRef> = Vec::with_capacity(shape.len() + 1);
    refs.push(
        builder
            .declare(
                &node_name(0),
                ResourceSpec::builder(ResourceKind::Network)
                    .set("auto_create_subnetworks", false)
                    .build()
                    .unwrap(),
            )
            .unwrap(),
    );

    for (i, router) in shape.iter().enumerate() {
        let index = i + 1;
        let declared = builder
            .declare(
                &node_name(index),
                ResourceSpec::builder(ResourceKind::Router)
                    .set("network", &refs[router.reads].name())
                    .set("region", REGION)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        if let Some(earlier) = router.waits_for {
            builder
                .depends_on(&declared, refs[earlier].key())
                .unwrap();
        }
        refs.push(declared);
    }
    builder.freeze().unwrap()
}

/// Indexes of every node that transitively depends on `root`
fn dependents_of(shape: &[RouterShape], root: usize) -> BTreeSet<usize> {
    let mut found = BTreeSet::new();
    for (i, router) in shape.iter().enumerate() {
        let index = i + 1;
        let upstream = std::iter::once(router.reads).chain(router.waits_for);
        if upstream
            .into_iter()
            .any(|u| u == root || found.contains(&u))
        {
            found.insert(index);
        }
    }
    found
}

fn quick_executor(provider: Arc<SimulatedProvider>, concurrency: usize) -> Executor {
    Executor::new(
        provider,
        Arc::new(MemoryStateStore::new()),
        Arc::new(StaticSecrets::new()),
        ExecutorConfig {
            concurrency,
            poll: PollConfig {
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(2),
                multiplier: 2.0,
                timeout: Duration::from_secs(5),
            },
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay: Duration::from_millis(1),
                max_delay: Duration::from_millis(1),
                backoff_multiplier: 1.0,
            },
            refresh: false,
        },
    )
}

fn run(executor: &Executor, graph: &ResourceGraph) -> RunReport {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
        .block_on(executor.apply(graph, &CancellationToken::new()))
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Every node of an acyclic graph ends ready, after all its dependencies
    #[test]
    fn prop_acyclic_graph_converges(shape in graph_shape(), concurrency in 1usize..5) {
        let graph = build(&shape);
        let provider = Arc::new(SimulatedProvider::new("sim"));
        let report = run(&quick_executor(provider, concurrency), &graph);

        prop_assert!(report.is_success());
        prop_assert_eq!(report.count(NodeOutcome::Created), shape.len() + 1);
        for node in report.nodes.values() {
            prop_assert_eq!(node.final_state(), NodeState::Ready);
        }
        for edge in graph.edges() {
            let ready = report.node(&edge.from).and_then(|n| n.entered(NodeState::Ready));
            let creating = report.node(&edge.to).and_then(|n| n.entered(NodeState::Creating));
            match (ready, creating) {
                (Some(ready), Some(creating)) => prop_assert!(ready.sequence < creating.sequence),
                _ => prop_assert!(false, "edge {} -> {} not carried out", edge.from, edge.to),
            }
        }
    }

    /// A rejected node blocks exactly its transitive dependents
    #[test]
    fn prop_failure_blocks_only_dependents(shape in graph_shape(), seed in any::<usize>()) {
        let failing = seed % (shape.len() + 1);
        let graph = build(&shape);
        let provider = Arc::new(
            SimulatedProvider::new("sim")
                .with_fault(&node_key(failing), Fault::RejectCreate("quota exceeded".to_string())),
        );
        let report = run(&quick_executor(provider.clone(), 4), &graph);
        let blocked = dependents_of(&shape, failing);

        prop_assert!(!report.is_success());
        prop_assert_eq!(report.outcome(&node_key(failing)), Some(NodeOutcome::Failed));
        for index in 0..=shape.len() {
            let expected = if index == failing {
                NodeOutcome::Failed
            } else if blocked.contains(&index) {
                NodeOutcome::Blocked
            } else {
                NodeOutcome::Created
            };
            prop_assert_eq!(report.outcome(&node_key(index)), Some(expected));
        }

        let rt = tokio::runtime::Builder::new_current_thread().build().unwrap();
        for index in &blocked {
            let calls = rt.block_on(provider.calls_for(&node_key(*index)));
            prop_assert!(calls.is_empty(), "blocked {} was called", node_key(*index));
        }
    }

    /// A reference cycle of any length is refused at declaration
    #[test]
    fn prop_reference_cycle_is_refused(length in 2usize..7) {
        let mut builder = GraphBuilder::new();
        let router = |i: usize| ResourceKey::parse_name(ResourceKind::Router, &format!("loop-{i}")).unwrap();

        let mut refused = None;
        for i in 0..length {
            let next = Output::<String>::reference(router((i + 1) % length), "name");
            let result = builder.declare(
                &format!("loop-{i}"),
                ResourceSpec::builder(ResourceKind::Router)
                    .set("network", &next)
                    .set("region", REGION)
                    .build()
                    .unwrap(),
            );
            if let Err(error) = result {
                refused = Some((i, error));
                break;
            }
        }

        match refused {
            Some((at, GraphError::CycleDetected { path })) => {
                prop_assert_eq!(at, length - 1);
                prop_assert_eq!(path.first(), path.last());
                prop_assert!(path.len() > length);
            }
            other => prop_assert!(false, "cycle accepted: {:?}", other),
        }
    }
}
