// Copyright (c) 2025 - Cowboy AI, Inc.
//! Scheduler / Executor
//!
//! Carries a frozen [`ResourceGraph`] to its desired remote state.
//!
//! # Apply phases
//!
//! ```text
//! secrets ─► load state ─► (refresh) ─► plan ─► deletion pass ─► apply pass ─► exports
//! ```
//!
//! 1. Every secret the graph reads must be available, otherwise the run
//!    fails with [`ProvisionError::SecretMissing`] before any remote call.
//! 2. Recorded state is loaded (and optionally refreshed from the provider).
//! 3. A [`Plan`] decides one action per node.
//! 4. Replaced and orphaned resources are deleted, dependents first.
//! 5. Topological layers run one after another; operations within a layer
//!    run concurrently up to [`ExecutorConfig::concurrency`].
//! 6. Published outputs are evaluated into the run's [`ExportMap`](crate::output::ExportMap).
//!
//! A failed node blocks every node that transitively depends on it; blocked
//! nodes issue no remote call. State is persisted each time a node settles,
//! so a later run resumes from where this one stopped.
//!
//! Cancellation is honoured between layers: operations already in flight run
//! to a terminal state, the rest are reported `not_attempted`.

pub mod report;
mod run;
mod task;
mod tracker;

pub use report::{NodeOutcome, NodeReport, RunReport};

use chrono::Utc;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::config::ExecutorConfig;
use crate::convergence::{refresh, Plan, PlanSummary, StateSnapshot, StateStore};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::ResourceGraph;
use crate::provider::ResourceProvider;
use crate::secrets::SecretStore;
use run::Run;

/// Applies resource graphs through a provider
pub struct Executor {
    provider: Arc<dyn ResourceProvider>,
    store: Arc<dyn StateStore>,
    secrets: Arc<dyn SecretStore>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(
        provider: Arc<dyn ResourceProvider>,
        store: Arc<dyn StateStore>,
        secrets: Arc<dyn SecretStore>,
        config: ExecutorConfig,
    ) -> Self {
        Self {
            provider,
            store,
            secrets,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Compute the plan without mutating anything
    pub async fn plan(&self, graph: &ResourceGraph) -> ProvisionResult<Plan> {
        self.check_secrets(graph)?;
        let mut snapshot = self.store.load().await?;
        if self.config.refresh {
            self.refresh(&mut snapshot).await;
        }
        self.build_plan(graph, &snapshot).await
    }

    /// Converge remote state to `graph`
    #[instrument(skip_all, fields(provider = self.provider.name(), nodes = graph.len()))]
    pub async fn apply(
        &self,
        graph: &ResourceGraph,
        cancel: &CancellationToken,
    ) -> ProvisionResult<RunReport> {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();

        self.check_secrets(graph)?;
        let mut snapshot = self.store.load().await?;
        if self.config.refresh {
            self.refresh(&mut snapshot).await;
            self.store.save(&snapshot).await?;
        }

        let plan = self.build_plan(graph, &snapshot).await?;
        let planned = plan.summary();
        info!(%run_id, %planned, "Applying plan");

        let removals = plan.removals();
        let mut run = Run::new(
            self.provider.clone(),
            self.store.as_ref(),
            self.secrets.clone(),
            &self.config,
            snapshot,
        )
        .for_plan(graph, &plan);

        run.delete_pass(&removals, cancel).await?;
        run.apply_pass(cancel).await?;
        let output = run.finish();

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            planned,
            nodes: output.tracker.into_reports(),
            exports: output.exports,
            cancelled: output.cancelled,
        };
        log_report(&report);
        Ok(report)
    }

    /// Delete every recorded resource, dependents first
    #[instrument(skip_all, fields(provider = self.provider.name()))]
    pub async fn destroy(&self, cancel: &CancellationToken) -> ProvisionResult<RunReport> {
        if cancel.is_cancelled() {
            return Err(ProvisionError::Cancelled);
        }
        let run_id = Uuid::now_v7();
        let started_at = Utc::now();

        let snapshot = self.store.load().await?;
        let planned = PlanSummary {
            create: 0,
            update: 0,
            replace: 0,
            delete: snapshot.len(),
            no_change: 0,
            read: 0,
        };
        info!(%run_id, %planned, "Destroying recorded resources");

        let mut run = Run::new(
            self.provider.clone(),
            self.store.as_ref(),
            self.secrets.clone(),
            &self.config,
            snapshot,
        )
        .for_destroy();
        let removals = run.recorded_keys();
        run.delete_pass(&removals, cancel).await?;
        let output = run.finish();

        let report = RunReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            planned,
            nodes: output.tracker.into_reports(),
            exports: output.exports,
            cancelled: output.cancelled,
        };
        log_report(&report);
        Ok(report)
    }

    fn check_secrets(&self, graph: &ResourceGraph) -> ProvisionResult<()> {
        match graph
            .secret_names()
            .into_iter()
            .find(|name| !self.secrets.contains(name))
        {
            Some(missing) => Err(ProvisionError::SecretMissing(missing)),
            None => Ok(()),
        }
    }

    async fn refresh(&self, snapshot: &mut StateSnapshot) {
        let report = refresh(
            snapshot,
            self.provider.as_ref(),
            &self.config.retry,
            self.config.concurrency,
        )
        .await;
        info!(
            vanished = report.vanished.len(),
            drifted = report.drifted.len(),
            unreachable = report.unreachable.len(),
            "Refreshed recorded state"
        );
    }

    async fn build_plan(
        &self,
        graph: &ResourceGraph,
        snapshot: &StateSnapshot,
    ) -> ProvisionResult<Plan> {
        Plan::build(
            graph,
            snapshot,
            self.provider.as_ref(),
            self.secrets.clone(),
            &self.config.retry,
        )
        .await
    }
}

impl std::fmt::Debug for Executor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Executor")
            .field("provider", &self.provider.name())
            .field("config", &self.config)
            .finish()
    }
}

fn log_report(report: &RunReport) {
    if report.is_success() {
        info!(%report, "Run finished");
    } else {
        for node in report.nodes.values().filter(|n| !n.error_chain.is_empty()) {
            warn!(resource = %node.key, chain = ?node.error_chain, "Node failed");
        }
        warn!(%report, "Run finished with unsettled resources");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convergence::MemoryStateStore;
    use crate::domain::{ResourceKey, ResourceKind, ResourceSpec};
    use crate::graph::GraphBuilder;
    use crate::output::Output;
    use crate::provider::{Fault, PollConfig, RetryConfig, SimulatedProvider};
    use crate::secrets::StaticSecrets;
    use crate::state_machine::NodeState;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn fast_config() -> ExecutorConfig {
        ExecutorConfig {
            concurrency: 4,
            poll: PollConfig {
                initial_interval: Duration::from_millis(1),
                max_interval: Duration::from_millis(2),
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

    fn key(kind: ResourceKind, name: &str) -> ResourceKey {
        ResourceKey::parse_name(kind, name).unwrap()
    }

    fn chain() -> ResourceGraph {
        let mut builder = GraphBuilder::new();
        let vpc = builder
            .declare(
                "vpc",
                ResourceSpec::builder(ResourceKind::Network)
                    .set("auto_create_subnetworks", false)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let subnet = builder
            .declare(
                "private",
                ResourceSpec::builder(ResourceKind::Subnetwork)
                    .set("network", &vpc.id())
                    .set("region", "europe-west1")
                    .set("ip_cidr_range", "10.0.32.0/19")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .declare(
                "router",
                ResourceSpec::builder(ResourceKind::Router)
                    .set("network", &vpc.id())
                    .set("region", "europe-west1")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder.export("subnet_id", &subnet.id()).unwrap();
        builder.freeze().unwrap()
    }

    fn executor(provider: Arc<SimulatedProvider>, store: Arc<MemoryStateStore>) -> Executor {
        Executor::new(provider, store, Arc::new(StaticSecrets::new()), fast_config())
    }

    #[tokio::test]
    async fn test_apply_creates_every_node_and_records_state() {
        let provider = Arc::new(SimulatedProvider::new("sim"));
        let store = Arc::new(MemoryStateStore::new());
        let report = executor(provider.clone(), store.clone())
            .apply(&chain(), &CancellationToken::new())
            .await
            .unwrap();

        assert!(report.is_success(), "{report}");
        assert_eq!(report.count(NodeOutcome::Created), 3);
        assert_eq!(store.snapshot().await.len(), 3);
        assert_eq!(
            report.exports.get("subnet_id").and_then(|v| v.as_str()),
            Some("projects/simulated-project/subnetwork/private")
        );
    }

    #[tokio::test]
    async fn test_second_apply_is_a_no_op() {
        let provider = Arc::new(SimulatedProvider::new("sim"));
        let store = Arc::new(MemoryStateStore::new());
        let executor = executor(provider.clone(), store);
        executor.apply(&chain(), &CancellationToken::new()).await.unwrap();
        provider.clear_calls().await;

        let report = executor.apply(&chain(), &CancellationToken::new()).await.unwrap();
        assert_eq!(report.count(NodeOutcome::Unchanged), 3);
        assert!(!report.mutated());
        assert!(provider.mutating_calls().await.is_empty());
        assert!(report.exports.get("subnet_id").unwrap().as_str().is_some());
    }

    #[tokio::test]
    async fn test_failure_blocks_dependents_only() {
        let vpc = key(ResourceKind::Network, "vpc");
        let provider = Arc::new(
            SimulatedProvider::new("sim").with_fault(&vpc, Fault::RejectCreate("quota".into())),
        );
        let report = executor(provider.clone(), Arc::new(MemoryStateStore::new()))
            .apply(&chain(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(report.outcome(&vpc), Some(NodeOutcome::Failed));
        let subnet = report.node(&key(ResourceKind::Subnetwork, "private")).unwrap();
        assert_eq!(subnet.outcome, NodeOutcome::Blocked);
        assert_eq!(subnet.blocked_by.as_ref(), Some(&vpc));
        assert_eq!(subnet.final_state(), NodeState::Blocked);
        assert_eq!(
            report.outcome(&key(ResourceKind::Router, "router")),
            Some(NodeOutcome::Blocked)
        );
        assert!(!report.node(&vpc).unwrap().error_chain.is_empty());
        assert_eq!(provider.mutating_calls().await.len(), 1);
        assert!(report.exports.get("subnet_id").unwrap().as_str().is_none());
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_before_any_call() {
        let provider = Arc::new(SimulatedProvider::new("sim"));
        let cancel = CancellationToken::new();
        cancel.cancel();

        let result = executor(provider.clone(), Arc::new(MemoryStateStore::new()))
            .apply(&chain(), &cancel)
            .await;
        assert!(matches!(result, Err(ProvisionError::Cancelled)));
        assert!(provider.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_missing_secret_fails_before_any_call() {
        let mut builder = GraphBuilder::new();
        builder
            .declare(
                "app",
                ResourceSpec::builder(ResourceKind::SqlUser)
                    .set("instance", "db")
                    .set("user_name", "app")
                    .set("password", Output::<String>::secret("db-password"))
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let graph = builder.freeze().unwrap();
        let provider = Arc::new(SimulatedProvider::new("sim"));

        let result = executor(provider.clone(), Arc::new(MemoryStateStore::new()))
            .apply(&graph, &CancellationToken::new())
            .await;
        assert!(matches!(result, Err(ProvisionError::SecretMissing(name)) if name == "db-password"));
        assert!(provider.calls().await.is_empty());
    }

    #[tokio::test]
    async fn test_destroy_removes_everything() {
        let provider = Arc::new(SimulatedProvider::new("sim"));
        let store = Arc::new(MemoryStateStore::new());
        let executor = executor(provider.clone(), store.clone());
        executor.apply(&chain(), &CancellationToken::new()).await.unwrap();

        let report = executor.destroy(&CancellationToken::new()).await.unwrap();
        assert_eq!(report.count(NodeOutcome::Deleted), 3);
        assert!(store.snapshot().await.is_empty());
        assert_eq!(provider.resource_count().await, 0);

        let vpc = report.node(&key(ResourceKind::Network, "vpc")).unwrap();
        let subnet = report.node(&key(ResourceKind::Subnetwork, "private")).unwrap();
        assert!(
            subnet.entered(NodeState::Deleted).unwrap().sequence
                < vpc.entered(NodeState::Deleting).unwrap().sequence
        );
    }
}
