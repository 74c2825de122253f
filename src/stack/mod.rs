// Copyright (c) 2025 - Cowboy AI, Inc.
//! Composition Layers
//!
//! Each layer is a function that declares a group of resources into a
//! [`GraphBuilder`](crate::graph::GraphBuilder) and returns the outputs later
//! layers read. Layers never touch a provider; they only describe desired
//! state, so the whole platform is one graph planned and applied as a unit.
//!
//! ```text
//! network ──► control-plane ──► node-pool
//!    │              │
//!    ├──► bastion   └──► application ◄── network
//!    │
//! ci-identity (independent)
//! ```
//!
//! [`platform::declare_platform`] wires the layers together and registers
//! the flat export map.

pub mod application;
pub mod bastion;
pub mod ci_identity;
pub mod control_plane;
pub mod network;
pub mod node_pool;
pub mod platform;

pub use application::{declare_application, ApplicationOutputs};
pub use bastion::{declare_bastion, BastionOutputs};
pub use ci_identity::{declare_ci_identity, CiIdentityOutputs};
pub use control_plane::{declare_control_plane, ControlPlaneOutputs};
pub use network::{declare_network, NetworkOutputs};
pub use node_pool::{declare_node_pool, NodePoolOutputs};
pub use platform::{build_platform, declare_platform, PlatformOutputs};

use crate::config::PlatformParams;

/// Name of a platform resource: `<platform name>-<suffix>`
pub(crate) fn resource_name(params: &PlatformParams, suffix: &str) -> String {
    format!("{}-{suffix}", params.name)
}
