// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node-state table owned by the run coordinator
//!
//! Only the coordinator mutates this table; operation tasks report back
//! through their join results. Every transition gets a UTC timestamp and
//! the next run-wide sequence number.

use chrono::Utc;
use std::collections::BTreeMap;
use tracing::debug;

use super::report::{NodeOutcome, NodeReport};
use crate::domain::ResourceKey;
use crate::errors::{ProvisionError, ProvisionResult};
use crate::state_machine::{LifecycleCommand, NodeState, StateMachineWithHistory};

struct TrackedNode {
    machine: StateMachineWithHistory<NodeState>,
    layer: Option<String>,
    outcome: Option<NodeOutcome>,
    error_chain: Vec<String>,
    blocked_by: Option<ResourceKey>,
}

impl TrackedNode {
    fn new(layer: Option<String>) -> Self {
        Self {
            machine: StateMachineWithHistory::new(NodeState::Planned),
            layer,
            outcome: None,
            error_chain: Vec::new(),
            blocked_by: None,
        }
    }
}

#[derive(Default)]
pub(crate) struct NodeTracker {
    nodes: BTreeMap<ResourceKey, TrackedNode>,
    sequence: u64,
}

impl NodeTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Start tracking a node in `Planned`
    pub(crate) fn track(&mut self, key: &ResourceKey, layer: Option<&str>) {
        self.nodes
            .entry(key.clone())
            .or_insert_with(|| TrackedNode::new(layer.map(str::to_string)));
    }

    pub(crate) fn state(&self, key: &ResourceKey) -> NodeState {
        self.nodes
            .get(key)
            .map_or(NodeState::Planned, |n| *n.machine.current_state())
    }

    pub(crate) fn outcome(&self, key: &ResourceKey) -> Option<NodeOutcome> {
        self.nodes.get(key).and_then(|n| n.outcome)
    }

    /// Root failure behind a failed or blocked node
    pub(crate) fn failure_root(&self, key: &ResourceKey) -> Option<ResourceKey> {
        let node = self.nodes.get(key)?;
        match node.machine.current_state() {
            NodeState::Failed => Some(key.clone()),
            NodeState::Blocked => node.blocked_by.clone(),
            _ => None,
        }
    }

    /// Apply a lifecycle command to a node
    pub(crate) fn transition(
        &mut self,
        key: &ResourceKey,
        command: LifecycleCommand,
    ) -> ProvisionResult<()> {
        self.track(key, None);
        let sequence = self.sequence + 1;
        let node = self
            .nodes
            .get_mut(key)
            .ok_or_else(|| ProvisionError::Aborted {
                resource: key.clone(),
                reason: "node is not tracked".to_string(),
            })?;

        node.machine
            .transition_with_history(command, Utc::now(), sequence)?;
        self.sequence = sequence;
        debug!(resource = %key, ?command, state = %node.machine.current_state(), sequence, "Node transition");
        Ok(())
    }

    pub(crate) fn settle(&mut self, key: &ResourceKey, outcome: NodeOutcome) {
        if let Some(node) = self.nodes.get_mut(key) {
            node.outcome = Some(outcome);
        }
    }

    /// Mark an in-flight node failed with its error chain
    pub(crate) fn fail(&mut self, key: &ResourceKey, error: &ProvisionError) -> ProvisionResult<()> {
        if self.state(key).is_in_flight() {
            self.transition(key, LifecycleCommand::OperationFailed)?;
        }
        if let Some(node) = self.nodes.get_mut(key) {
            node.outcome = Some(NodeOutcome::Failed);
            node.error_chain = error.chain();
        }
        Ok(())
    }

    /// Mark a node failed that never went in flight
    pub(crate) fn fail_before_call(
        &mut self,
        key: &ResourceKey,
        error: &ProvisionError,
    ) -> ProvisionResult<()> {
        if matches!(self.state(key), NodeState::Planned | NodeState::Deleted) {
            self.transition(key, LifecycleCommand::Reject)?;
        }
        self.fail(key, error)
    }

    /// Block a node that has not been attempted
    ///
    /// Returns false when the node already settled.
    pub(crate) fn block(&mut self, key: &ResourceKey, root: &ResourceKey) -> ProvisionResult<bool> {
        let unattempted = matches!(self.state(key), NodeState::Planned | NodeState::Deleted);
        if !unattempted || self.outcome(key).is_some() {
            return Ok(false);
        }
        self.transition(key, LifecycleCommand::Block)?;
        if let Some(node) = self.nodes.get_mut(key) {
            node.outcome = Some(NodeOutcome::Blocked);
            node.blocked_by = Some(root.clone());
        }
        Ok(true)
    }

    /// Final per-node reports; unsettled nodes were never attempted
    pub(crate) fn into_reports(self) -> BTreeMap<ResourceKey, NodeReport> {
        self.nodes
            .into_iter()
            .map(|(key, node)| {
                let report = NodeReport {
                    key: key.clone(),
                    outcome: node.outcome.unwrap_or(NodeOutcome::NotAttempted),
                    layer: node.layer,
                    error_chain: node.error_chain,
                    blocked_by: node.blocked_by,
                    transitions: node.machine.history,
                };
                (key, report)
            })
            .collect()
    }
}
