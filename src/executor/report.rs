// Copyright (c) 2025 - Cowboy AI, Inc.
//! Run reports

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

use crate::convergence::PlanSummary;
use crate::domain::ResourceKey;
use crate::output::ExportMap;
use crate::state_machine::{LifecycleCommand, NodeState, Transition};

/// What a run did to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeOutcome {
    Created,
    Updated,
    /// Deleted and created again
    Replaced,
    Unchanged,
    /// Lookup answered
    Read,
    Deleted,
    Failed,
    /// A dependency failed; never attempted
    Blocked,
    /// The run was cancelled before reaching the resource
    NotAttempted,
}

impl NodeOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Updated => "updated",
            Self::Replaced => "replaced",
            Self::Unchanged => "unchanged",
            Self::Read => "read",
            Self::Deleted => "deleted",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::NotAttempted => "not_attempted",
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed | Self::Blocked | Self::NotAttempted)
    }
}

impl fmt::Display for NodeOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-resource result of a run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NodeReport {
    pub key: ResourceKey,
    pub outcome: NodeOutcome,
    pub layer: Option<String>,
    /// Failure message and its causes, outermost first
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub error_chain: Vec<String>,
    /// The failed resource that blocked this one
    #[serde(skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<ResourceKey>,
    pub transitions: Vec<Transition<NodeState, LifecycleCommand>>,
}

impl NodeReport {
    /// When the node last entered a state
    pub fn entered(&self, state: NodeState) -> Option<&Transition<NodeState, LifecycleCommand>> {
        self.transitions.iter().rev().find(|t| t.to == state)
    }

    pub fn final_state(&self) -> NodeState {
        self.transitions
            .last()
            .map_or(NodeState::Planned, |t| t.to)
    }
}

/// Result of a whole `apply` or `destroy`
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Summary of the plan the run carried out
    pub planned: PlanSummary,
    pub nodes: BTreeMap<ResourceKey, NodeReport>,
    pub exports: ExportMap,
    pub cancelled: bool,
}

impl RunReport {
    pub fn node(&self, key: &ResourceKey) -> Option<&NodeReport> {
        self.nodes.get(key)
    }

    pub fn outcome(&self, key: &ResourceKey) -> Option<NodeOutcome> {
        self.nodes.get(key).map(|n| n.outcome)
    }

    pub fn count(&self, outcome: NodeOutcome) -> usize {
        self.nodes.values().filter(|n| n.outcome == outcome).count()
    }

    pub fn with_outcome(&self, outcome: NodeOutcome) -> Vec<&ResourceKey> {
        self.nodes
            .values()
            .filter(|n| n.outcome == outcome)
            .map(|n| &n.key)
            .collect()
    }

    /// Every resource reached its desired state
    pub fn is_success(&self) -> bool {
        !self.cancelled && self.nodes.values().all(|n| n.outcome.is_success())
    }

    /// Whether any remote mutation was carried out
    pub fn mutated(&self) -> bool {
        self.nodes.values().any(|n| {
            n.transitions
                .iter()
                .any(|t| t.to.is_in_flight())
        })
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: Vec<String> = [
            NodeOutcome::Created,
            NodeOutcome::Updated,
            NodeOutcome::Replaced,
            NodeOutcome::Unchanged,
            NodeOutcome::Read,
            NodeOutcome::Deleted,
            NodeOutcome::Failed,
            NodeOutcome::Blocked,
            NodeOutcome::NotAttempted,
        ]
        .into_iter()
        .filter_map(|outcome| match self.count(outcome) {
            0 => None,
            n => Some(format!("{n} {outcome}")),
        })
        .collect();

        write!(f, "run {}: ", self.run_id)?;
        if counts.is_empty() {
            f.write_str("nothing to do")?;
        } else {
            f.write_str(&counts.join(", "))?;
        }
        if self.cancelled {
            f.write_str(" (cancelled)")?;
        }
        Ok(())
    }
}
