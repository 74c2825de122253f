// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node Lifecycle State Machine
//!
//! Lifecycle of one resource node within a provisioning run.
//!
//! # States
//!
//! - Planned: initial, nothing issued yet
//! - Creating / Updating / Deleting: a remote operation is in flight
//! - Ready: stable success
//! - Failed: stable error
//! - Blocked: a dependency failed; never attempted in this run
//! - Deleted: removed by a deletion pass
//!
//! # Inputs (Lifecycle Commands)
//!
//! - BeginCreate: Planned | Deleted → Creating
//! - Adopt: Planned → Ready (resource already exists as desired, or a lookup was answered)
//! - BeginUpdate: Ready → Updating
//! - OperationSucceeded: Creating | Updating → Ready, Deleting → Deleted
//! - OperationFailed: Creating | Updating | Deleting → Failed
//! - Block: Planned | Deleted → Blocked
//! - Reject: Planned | Deleted → Failed without going in flight
//! - BeginDelete: Ready | Failed → Deleting
//!
//! A replacement walks `Ready → Deleting → Deleted → Creating → Ready`.

use serde::{Deserialize, Serialize};
use std::fmt;

use super::{StateMachine, TransitionError, TransitionResult};

/// Execution state of a resource node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeState {
    Planned,
    Creating,
    Updating,
    Ready,
    Failed,
    Blocked,
    Deleting,
    Deleted,
}

impl NodeState {
    /// No further transition happens in this run without a new command
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ready | Self::Failed | Self::Blocked | Self::Deleted)
    }

    /// A remote operation is in flight
    pub fn is_in_flight(&self) -> bool {
        matches!(self, Self::Creating | Self::Updating | Self::Deleting)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Planned => "planned",
            Self::Creating => "creating",
            Self::Updating => "updating",
            Self::Ready => "ready",
            Self::Failed => "failed",
            Self::Blocked => "blocked",
            Self::Deleting => "deleting",
            Self::Deleted => "deleted",
        }
    }
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle command (FSM input)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleCommand {
    BeginCreate,
    Adopt,
    BeginUpdate,
    OperationSucceeded,
    OperationFailed,
    Block,
    Reject,
    BeginDelete,
}

/// Transition output
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionOutput {
    /// The transition requires a remote call to be issued
    pub issues_remote_call: bool,

    /// The new state is terminal for this run
    pub is_terminal: bool,
}

impl TransitionOutput {
    fn remote() -> Self {
        Self {
            issues_remote_call: true,
            is_terminal: false,
        }
    }

    fn settled() -> Self {
        Self {
            issues_remote_call: false,
            is_terminal: true,
        }
    }
}

impl StateMachine for NodeState {
    type Input = LifecycleCommand;
    type Output = TransitionOutput;

    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)> {
        use LifecycleCommand::*;
        use NodeState::*;

        match (self, input) {
            (Planned | Deleted, BeginCreate) => Ok((Creating, TransitionOutput::remote())),
            (Planned, Adopt) => Ok((Ready, TransitionOutput::settled())),
            (Planned | Deleted, Block) => Ok((Blocked, TransitionOutput::settled())),
            (Planned | Deleted, Reject) => Ok((Failed, TransitionOutput::settled())),

            (Ready, BeginUpdate) => Ok((Updating, TransitionOutput::remote())),
            (Ready | Failed, BeginDelete) => Ok((Deleting, TransitionOutput::remote())),

            (Creating | Updating, OperationSucceeded) => Ok((Ready, TransitionOutput::settled())),
            (Deleting, OperationSucceeded) => Ok((Deleted, TransitionOutput::settled())),
            (Creating | Updating | Deleting, OperationFailed) => {
                Ok((Failed, TransitionOutput::settled()))
            }

            (from, input) => Err(TransitionError::InvalidTransition {
                from: from.to_string(),
                input: format!("{input:?}"),
            }),
        }
    }

    fn valid_inputs(&self) -> Vec<Self::Input> {
        use LifecycleCommand::*;
        use NodeState::*;

        match self {
            Planned => vec![BeginCreate, Adopt, Block, Reject],
            Creating | Updating | Deleting => vec![OperationSucceeded, OperationFailed],
            Ready => vec![BeginUpdate, BeginDelete],
            Failed => vec![BeginDelete],
            Deleted => vec![BeginCreate, Block, Reject],
            Blocked => vec![],
        }
    }
}
