// Copyright (c) 2025 - Cowboy AI, Inc.
//! Convergence Engine
//!
//! Compares desired resources against their last recorded remote state and
//! decides one [`Action`] per resource:
//!
//! | Recorded | Changed fields         | Action            |
//! |----------|------------------------|-------------------|
//! | no       | -                      | `Create`          |
//! | yes      | none                   | `NoOp`            |
//! | yes      | mutable only           | `Update`          |
//! | yes      | at least one immutable | `ReplaceRequired` |
//! | orphan   | -                      | `Delete`          |
//!
//! Lookup kinds always plan `Read`: they are queried again each run, so a
//! newly published value reaches their dependents as an ordinary change.
//!
//! Applying an unchanged declaration set a second time plans `NoOp` for every
//! resource, so the run issues no remote mutation.
//!
//! A replaced resource takes its existing dependents with it: they are
//! deleted before it, and recreated after it.

pub mod action;
pub mod plan;
pub mod refresh;
pub mod state;

pub use action::{converge, Action};
pub use plan::{Plan, PlanSummary, PlannedChange, KNOWN_AFTER_APPLY};
pub use refresh::{refresh, RefreshReport};
pub use state::{
    FileStateStore, MemoryStateStore, RecordedField, RecordedResource, StateSnapshot, StateStore,
    StateStoreError,
};
