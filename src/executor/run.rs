// Copyright (c) 2025 - Cowboy AI, Inc.
//! One apply or destroy run
//!
//! The coordinator walks layers in order. Within a layer it materializes
//! each node against the run's resolution table, decides its action, and
//! spawns the remote operations on a [`JoinSet`] gated by a [`Semaphore`].
//! The next layer starts only once every operation of the current one has
//! settled, so a node enters `Creating` strictly after its dependencies
//! entered `Ready`.
//!
//! Lookups are adopted straight to `Ready` with the answer the plan already
//! obtained, or queried in their layer when the plan could not. They are
//! never recorded in state.

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::report::NodeOutcome;
use super::task::{Completed, NodeOperation, OperationTask};
use super::tracker::NodeTracker;
use crate::config::ExecutorConfig;
use crate::convergence::{
    converge, Action, Plan, RecordedResource, StateSnapshot, StateStore, StateStoreError,
};
use crate::domain::ResourceKey;
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::ResourceGraph;
use crate::output::{ExportMap, ResolutionTable};
use crate::provider::{ProviderError, ResourceProvider};
use crate::secrets::SecretStore;
use crate::state_machine::LifecycleCommand;

pub(crate) struct Run<'a> {
    provider: Arc<dyn ResourceProvider>,
    store: &'a dyn StateStore,
    config: &'a ExecutorConfig,
    graph: Option<&'a ResourceGraph>,
    plan: Option<&'a Plan>,
    table: ResolutionTable,
    snapshot: StateSnapshot,
    tracker: NodeTracker,
    semaphore: Arc<Semaphore>,
    replacements: BTreeSet<ResourceKey>,
    persist_error: Option<StateStoreError>,
    cancelled: bool,
}

pub(crate) struct RunOutput {
    pub tracker: NodeTracker,
    pub exports: ExportMap,
    pub cancelled: bool,
}

impl<'a> Run<'a> {
    pub(crate) fn new(
        provider: Arc<dyn ResourceProvider>,
        store: &'a dyn StateStore,
        secrets: Arc<dyn SecretStore>,
        config: &'a ExecutorConfig,
        snapshot: StateSnapshot,
    ) -> Self {
        Self {
            provider,
            store,
            config,
            graph: None,
            plan: None,
            table: ResolutionTable::new(secrets),
            snapshot,
            tracker: NodeTracker::new(),
            semaphore: Arc::new(Semaphore::new(config.concurrency.max(1))),
            replacements: BTreeSet::new(),
            persist_error: None,
            cancelled: false,
        }
    }

    /// Carry out `plan` for `graph`
    pub(crate) fn for_plan(mut self, graph: &'a ResourceGraph, plan: &'a Plan) -> Self {
        for change in &plan.changes {
            self.tracker.track(&change.key, change.layer.as_deref());
        }
        self.replacements = plan.replacements();
        self.graph = Some(graph);
        self.plan = Some(plan);
        self
    }

    /// Track every recorded resource for removal
    pub(crate) fn for_destroy(mut self) -> Self {
        for record in self.snapshot.resources.values() {
            self.tracker.track(&record.key, record.layer.as_deref());
        }
        self
    }

    pub(crate) fn recorded_keys(&self) -> BTreeSet<ResourceKey> {
        self.snapshot.keys().cloned().collect()
    }

    /// Delete `removals`, dependents before their dependencies
    pub(crate) async fn delete_pass(
        &mut self,
        removals: &BTreeSet<ResourceKey>,
        cancel: &CancellationToken,
    ) -> ProvisionResult<()> {
        for layer in deletion_layers(&self.snapshot, removals) {
            if self.stop_requested(cancel) {
                return Ok(());
            }

            let mut batch = Vec::with_capacity(layer.len());
            for key in layer {
                if self.tracker.outcome(&key).is_some() {
                    continue;
                }
                if let Some(root) = self.held_by(&key, removals) {
                    self.block(&key, &root)?;
                    continue;
                }
                let Some(record) = self.snapshot.get(&key) else {
                    continue;
                };
                let handle = record.handle.clone();
                self.tracker.transition(&key, LifecycleCommand::Adopt)?;
                batch.push((key, NodeOperation::Delete { handle }));
            }
            self.execute_batch(batch).await?;
        }
        Ok(())
    }

    /// Create and update declared resources layer by layer
    pub(crate) async fn apply_pass(&mut self, cancel: &CancellationToken) -> ProvisionResult<()> {
        let Some(graph) = self.graph else {
            return Ok(());
        };

        for (index, layer) in graph.layers().into_iter().enumerate() {
            if self.stop_requested(cancel) {
                return Ok(());
            }
            info!(layer = index, nodes = layer.len(), "Applying layer");

            let mut batch = Vec::with_capacity(layer.len());
            for key in layer {
                if self.tracker.outcome(&key).is_some() {
                    continue;
                }
                if let Some(operation) = self.prepare(graph, &key)? {
                    batch.push((key, operation));
                }
            }
            self.execute_batch(batch).await?;
        }
        Ok(())
    }

    pub(crate) fn finish(self) -> RunOutput {
        let exports = match self.graph {
            Some(graph) => ExportMap::collect(graph.exports(), &self.table),
            None => ExportMap::default(),
        };
        RunOutput {
            tracker: self.tracker,
            exports,
            cancelled: self.cancelled,
        }
    }

    /// Materialize a node and decide what to do with it
    ///
    /// Kept resources are adopted here; unchanged ones publish their
    /// current attributes and need no operation. Answered lookups are
    /// published the same way.
    fn prepare(
        &mut self,
        graph: &ResourceGraph,
        key: &ResourceKey,
    ) -> ProvisionResult<Option<NodeOperation>> {
        let Some(node) = graph.node(key) else {
            return Ok(None);
        };
        let spec = match node.spec().materialize(&self.table) {
            Ok(spec) => spec,
            Err(source) => {
                let error = ProvisionError::Materialize {
                    resource: key.clone(),
                    source,
                };
                self.fail_before_call(key, error)?;
                return Ok(None);
            }
        };

        if key.kind().is_lookup() {
            let answered = self
                .plan
                .and_then(|p| p.change(key))
                .and_then(|c| c.known_attributes())
                .cloned();
            return match answered {
                Some(attributes) => {
                    self.settle_lookup(key, attributes)?;
                    Ok(None)
                }
                None => Ok(Some(NodeOperation::Lookup { spec })),
            };
        }

        let recorded = self.snapshot.get(key);
        let handle = recorded.map(|r| r.handle.clone());
        let attributes = self
            .plan
            .and_then(|p| p.change(key))
            .and_then(|c| c.known_attributes())
            .or(recorded.map(|r| &r.attributes))
            .cloned()
            .unwrap_or_default();

        match (converge(key, &spec, recorded), handle) {
            (Action::NoOp, Some(_)) => {
                self.tracker.transition(key, LifecycleCommand::Adopt)?;
                self.table.publish(key, attributes)?;
                self.tracker.settle(key, NodeOutcome::Unchanged);
                Ok(None)
            }
            (Action::Update { changed }, Some(handle)) => {
                info!(resource = %key, changed = ?changed, "Updating in place");
                self.tracker.transition(key, LifecycleCommand::Adopt)?;
                Ok(Some(NodeOperation::Update { handle, spec }))
            }
            (Action::ReplaceRequired { changed, .. }, Some(_)) => {
                let error = ProvisionError::UnplannedReplacement {
                    resource: key.clone(),
                    changed,
                };
                self.fail_before_call(key, error)?;
                Ok(None)
            }
            _ => Ok(Some(NodeOperation::Create { spec })),
        }
    }

    /// Run one layer's operations and settle each of them
    async fn execute_batch(&mut self, batch: Vec<(ResourceKey, NodeOperation)>) -> ProvisionResult<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut tasks = JoinSet::new();
        let mut dispatched: HashMap<ResourceKey, NodeOperation> = HashMap::new();

        for (key, operation) in batch {
            let permit = self
                .semaphore
                .clone()
                .acquire_owned()
                .await
                .map_err(|e| ProvisionError::Aborted {
                    resource: key.clone(),
                    reason: e.to_string(),
                })?;

            let command = match operation {
                NodeOperation::Create { .. } => Some(LifecycleCommand::BeginCreate),
                NodeOperation::Update { .. } => Some(LifecycleCommand::BeginUpdate),
                NodeOperation::Delete { .. } => Some(LifecycleCommand::BeginDelete),
                NodeOperation::Lookup { .. } => None,
            };
            if let Some(command) = command {
                self.tracker.transition(&key, command)?;
            }

            let task = OperationTask {
                provider: self.provider.clone(),
                key: key.clone(),
                operation: operation.clone(),
                poll: self.config.poll.clone(),
                retry: self.config.retry.clone(),
            };
            dispatched.insert(key, operation);
            tasks.spawn(task.run(permit));
        }

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok((key, result)) => {
                    if let Some(operation) = dispatched.remove(&key) {
                        self.settle(&key, operation, result).await?;
                    }
                }
                Err(e) => warn!(error = %e, "Operation task ended abnormally"),
            }
        }

        for (key, operation) in dispatched {
            let error = ProvisionError::Aborted {
                resource: key.clone(),
                reason: format!("{} task did not report", operation.name()),
            };
            if matches!(operation, NodeOperation::Lookup { .. }) {
                self.fail_before_call(&key, error)?;
            } else {
                self.fail_node(&key, error)?;
            }
        }

        match self.persist_error.take() {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }

    async fn settle(
        &mut self,
        key: &ResourceKey,
        operation: NodeOperation,
        result: Result<Completed, ProviderError>,
    ) -> ProvisionResult<()> {
        if let NodeOperation::Lookup { .. } = operation {
            return match result {
                Ok(completed) => self.settle_lookup(key, completed.attributes),
                Err(e) => self.fail_before_call(key, ProvisionError::from_provider(key, e)),
            };
        }

        let completed = match result {
            Ok(completed) => completed,
            Err(e) => return self.fail_node(key, ProvisionError::from_provider(key, e)),
        };
        self.tracker
            .transition(key, LifecycleCommand::OperationSucceeded)?;

        match &operation {
            NodeOperation::Delete { .. } => {
                self.snapshot.remove(key);
                if !self.replacements.contains(key) {
                    self.tracker.settle(key, NodeOutcome::Deleted);
                }
            }
            NodeOperation::Lookup { .. } => {}
            NodeOperation::Create { spec } | NodeOperation::Update { spec, .. } => {
                self.table.publish(key, completed.attributes.clone())?;

                let (dependencies, layer) =
                    match self.graph.and_then(|g| g.node(key).map(|n| (g, n))) {
                        Some((graph, node)) => (
                            graph.dependencies(key).into_iter().map(|(d, _)| d).collect(),
                            node.layer(),
                        ),
                        None => (Vec::new(), None),
                    };
                let record =
                    RecordedResource::new(key.clone(), completed.handle, spec, &completed.attributes)
                        .with_dependencies(dependencies)
                        .with_layer(layer);
                self.snapshot.record(record);

                let outcome = if matches!(operation, NodeOperation::Update { .. }) {
                    NodeOutcome::Updated
                } else if self.replacements.contains(key) {
                    NodeOutcome::Replaced
                } else {
                    NodeOutcome::Created
                };
                self.tracker.settle(key, outcome);
            }
        }

        self.persist().await;
        Ok(())
    }

    /// Publish a lookup's answer; nothing is recorded
    fn settle_lookup(
        &mut self,
        key: &ResourceKey,
        attributes: BTreeMap<String, Value>,
    ) -> ProvisionResult<()> {
        self.tracker.transition(key, LifecycleCommand::Adopt)?;
        self.table.publish(key, attributes)?;
        self.tracker.settle(key, NodeOutcome::Read);
        Ok(())
    }

    /// Fail a node that never went in flight and block its dependents
    fn fail_before_call(&mut self, key: &ResourceKey, error: ProvisionError) -> ProvisionResult<()> {
        self.tracker.fail_before_call(key, &error)?;
        self.propagate_failure(key, &error)
    }

    fn fail_node(&mut self, key: &ResourceKey, error: ProvisionError) -> ProvisionResult<()> {
        self.tracker.fail(key, &error)?;
        self.propagate_failure(key, &error)
    }

    fn propagate_failure(&mut self, key: &ResourceKey, error: &ProvisionError) -> ProvisionResult<()> {
        error!(resource = %key, error = %error, "Node failed");
        if let Err(e) = self.table.fail(key, error.to_string()) {
            warn!(resource = %key, error = %e, "Failure recorded after resolution");
        }

        let dependents = self
            .graph
            .map(|g| g.transitive_dependents(key))
            .unwrap_or_default();
        self.block_all(dependents, key)
    }

    /// Block a node and everything that depends on it
    fn block(&mut self, key: &ResourceKey, root: &ResourceKey) -> ProvisionResult<()> {
        let mut targets = self
            .graph
            .map(|g| g.transitive_dependents(key))
            .unwrap_or_default();
        targets.insert(key.clone());
        self.block_all(targets, root)
    }

    fn block_all(&mut self, targets: BTreeSet<ResourceKey>, root: &ResourceKey) -> ProvisionResult<()> {
        for target in targets {
            if !self.tracker.block(&target, root)? {
                continue;
            }
            warn!(resource = %target, blocked_by = %root, "Blocked by failed dependency");
            if let Err(e) = self.table.fail(&target, format!("blocked by {root}")) {
                warn!(resource = %target, error = %e, "Block recorded after resolution");
            }
        }
        Ok(())
    }

    /// Failed or blocked dependent still holding a removal in place
    fn held_by(&self, key: &ResourceKey, removals: &BTreeSet<ResourceKey>) -> Option<ResourceKey> {
        removals
            .iter()
            .filter(|other| {
                self.snapshot
                    .get(other)
                    .is_some_and(|r| r.dependencies.contains(key))
            })
            .find_map(|other| self.tracker.failure_root(other))
    }

    async fn persist(&mut self) {
        if let Err(e) = self.store.save(&self.snapshot).await {
            error!(error = %e, "Could not persist state");
            self.persist_error.get_or_insert(e);
        }
    }

    fn stop_requested(&mut self, cancel: &CancellationToken) -> bool {
        if cancel.is_cancelled() && !self.cancelled {
            warn!("Cancellation requested; stopping before the next layer");
            self.cancelled = true;
        }
        self.cancelled
    }
}

/// Removal keys grouped so each group only holds resources whose recorded
/// dependents were removed by earlier groups
pub(crate) fn deletion_layers(
    snapshot: &StateSnapshot,
    removals: &BTreeSet<ResourceKey>,
) -> Vec<Vec<ResourceKey>> {
    let mut remaining: BTreeSet<ResourceKey> = removals
        .iter()
        .filter(|k| snapshot.contains(k))
        .cloned()
        .collect();

    let mut layers = Vec::new();
    while !remaining.is_empty() {
        let ready: Vec<ResourceKey> = remaining
            .iter()
            .filter(|key| {
                !remaining.iter().any(|other| {
                    snapshot
                        .get(other)
                        .is_some_and(|r| r.dependencies.contains(key))
                })
            })
            .cloned()
            .collect();
        if ready.is_empty() {
            layers.push(std::mem::take(&mut remaining).into_iter().collect());
            break;
        }
        for key in &ready {
            remaining.remove(key);
        }
        layers.push(ready);
    }
    layers
}
