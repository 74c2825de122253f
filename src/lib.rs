// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency-aware resource provisioning for a private container platform
//!
//! This crate declares cloud and workload resources as a directed acyclic
//! graph, plans the difference against recorded state and applies it through
//! a provider interface with bounded concurrency.
//!
//! - [`output`]: attribute futures (`Output<T>`) resolved as resources settle
//! - [`graph`]: the dependency graph with data and ordering edges
//! - [`convergence`]: recorded state, refresh and the NoOp/Update/Replace/Create/Delete plan
//! - [`executor`]: layer-by-layer execution with failure propagation and cancellation
//! - [`provider`]: the provider interface, operation polling and a simulated provider
//! - [`stack`]: the platform's composition layers

pub mod config;
pub mod convergence;
pub mod domain;
pub mod errors;
pub mod executor;
pub mod graph;
pub mod output;
pub mod provider;
pub mod secrets;
pub mod stack;
pub mod state_machine;

// Re-export commonly used types
pub use config::{ConfigError, ExecutorConfig, PlatformParams};
pub use convergence::{Action, FileStateStore, MemoryStateStore, Plan, StateSnapshot, StateStore};
pub use domain::{Cidr, ResourceKey, ResourceKind, ResourceSpec};
pub use errors::{ProvisionError, ProvisionResult};
pub use executor::{Executor, NodeOutcome, RunReport};
pub use graph::{EdgeKind, GraphBuilder, GraphError, ResourceGraph, ResourceRef};
pub use output::{ExportMap, Output, Resolution, ResolutionTable};
pub use provider::{ResourceProvider, RoutingProvider, SimulatedProvider};
pub use secrets::{EnvSecrets, SecretStore, StaticSecrets};
pub use stack::{build_platform, declare_platform, PlatformOutputs};
