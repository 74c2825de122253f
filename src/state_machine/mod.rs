// Copyright (c) 2025 - Cowboy AI, Inc.
//! Finite State Machine Abstractions
//!
//! Generic state machine types used to model the lifecycle of every node in a
//! provisioning run. Transitions are pure functions; recording them (with a
//! timestamp and a run-wide sequence number) is the caller's job.
//!
//! # State Machine Type
//!
//! Machines here are **Mealy machines**: the output depends on both the
//! current state and the input.
//!
//! ```text
//! (State, Input) → (State, Output)
//! ```
//!
//! # Example
//!
//! ```rust
//! use cim_provisioning::state_machine::{
//!     LifecycleCommand, NodeState, StateMachine, StateMachineWithHistory,
//! };
//!
//! let mut node = StateMachineWithHistory::new(NodeState::Planned);
//! node.transition_with_history(LifecycleCommand::BeginCreate, chrono::Utc::now(), 1)
//!     .unwrap();
//! node.transition_with_history(LifecycleCommand::OperationSucceeded, chrono::Utc::now(), 2)
//!     .unwrap();
//!
//! assert_eq!(*node.current_state(), NodeState::Ready);
//! assert!(!NodeState::Ready.can_transition(&LifecycleCommand::BeginCreate));
//! ```

pub mod node_lifecycle;

pub use node_lifecycle::{LifecycleCommand, NodeState, TransitionOutput};

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Result of a state transition
pub type TransitionResult<S> = Result<S, TransitionError>;

/// Errors that can occur during state transitions
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    /// Transition from current state to target state is not allowed
    #[error("Invalid transition from {from} via {input}")]
    InvalidTransition { from: String, input: String },

    /// Sequence numbers must strictly increase within one history
    #[error("Transition sequence {next} does not follow {last}")]
    OutOfOrder { last: u64, next: u64 },
}

/// Trait for finite state machines
///
/// Implement this trait to define a state machine with typed states,
/// inputs, and outputs.
pub trait StateMachine: Sized + Clone {
    /// Input type that triggers transitions
    type Input;

    /// Output type produced by transitions (use () if none)
    type Output;

    /// Attempt to transition to a new state given an input
    fn transition(&self, input: &Self::Input) -> TransitionResult<(Self, Self::Output)>;

    /// Check if a transition is valid without performing it
    fn can_transition(&self, input: &Self::Input) -> bool {
        self.transition(input).is_ok()
    }

    /// Inputs accepted from the current state
    fn valid_inputs(&self) -> Vec<Self::Input>
    where
        Self::Input: Clone,
    {
        Vec::new()
    }
}

/// One recorded transition
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transition<S, I> {
    pub from: S,
    pub to: S,
    pub input: I,
    pub timestamp: DateTime<Utc>,
    /// Position in the run-wide order of transitions
    pub sequence: u64,
}

impl<S, I> Transition<S, I> {
    pub fn new(from: S, to: S, input: I, timestamp: DateTime<Utc>, sequence: u64) -> Self {
        Self {
            from,
            to,
            input,
            timestamp,
            sequence,
        }
    }
}

/// State machine with history
///
/// Wraps a state machine and records every accepted transition.
#[derive(Debug, Clone)]
pub struct StateMachineWithHistory<FSM: StateMachine> {
    pub current: FSM,
    pub history: Vec<Transition<FSM, FSM::Input>>,
}

impl<FSM: StateMachine> StateMachineWithHistory<FSM> {
    pub fn new(initial: FSM) -> Self {
        Self {
            current: initial,
            history: Vec::new(),
        }
    }

    /// Transition with history recording
    ///
    /// Rejected transitions leave both state and history untouched.
    pub fn transition_with_history(
        &mut self,
        input: FSM::Input,
        timestamp: DateTime<Utc>,
        sequence: u64,
    ) -> TransitionResult<FSM::Output>
    where
        FSM::Input: Clone,
    {
        if let Some(last) = self.history.last() {
            if sequence <= last.sequence {
                return Err(TransitionError::OutOfOrder {
                    last: last.sequence,
                    next: sequence,
                });
            }
        }

        let from = self.current.clone();
        let (to, output) = self.current.transition(&input)?;

        self.history
            .push(Transition::new(from, to.clone(), input, timestamp, sequence));

        self.current = to;
        Ok(output)
    }

    pub fn get_history(&self) -> &[Transition<FSM, FSM::Input>] {
        &self.history
    }

    pub fn current_state(&self) -> &FSM {
        &self.current
    }

    /// Most recent transition into a given state
    pub fn last_entry_into(&self, state: &FSM) -> Option<&Transition<FSM, FSM::Input>>
    where
        FSM: PartialEq,
    {
        self.history.iter().rev().find(|t| &t.to == state)
    }
}
