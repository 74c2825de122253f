// Copyright (c) 2025 - Cowboy AI, Inc.
//! Dependency Graph
//!
//! Resource nodes and the directed acyclic graph between them.
//!
//! # Phases
//!
//! ```text
//! GraphBuilder (declaration, synchronous, no remote calls)
//!     │  declare / depends_on / export
//!     ▼
//! freeze()  ──►  ResourceGraph (immutable, shared with the executor)
//! ```
//!
//! Edges point from a dependency to its dependent. `Data` edges are inferred
//! from the outputs embedded in a node's spec; `Ordering` edges are declared
//! explicitly for constraints that carry no data. The executor treats both
//! kinds identically when gating work.
//!
//! Cycles are rejected when the offending edge is inserted, with the full
//! path in the error.

pub mod builder;
pub mod resource_graph;

pub use builder::{GraphBuilder, ResourceRef};
pub use resource_graph::{ResourceGraph, ResourceNode};

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::domain::{ResourceKey, ResourceNameError, SpecError};
use crate::output::AttributeRef;

/// Kind of dependency edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// The dependent reads an output of the dependency
    Data,
    /// Explicit ordering constraint without data flow
    Ordering,
}

/// Edge between two resource nodes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DependencyEdge {
    pub from: ResourceKey,
    pub to: ResourceKey,
    pub kind: EdgeKind,
}

fn render_path(path: &[ResourceKey]) -> String {
    path.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Graph declaration and validation errors
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GraphError {
    #[error("Dependency cycle detected: {}", render_path(.path))]
    CycleDetected { path: Vec<ResourceKey> },

    #[error("{referenced_by} references undeclared resource {missing}")]
    UnknownReference {
        missing: ResourceKey,
        referenced_by: String,
    },

    #[error("{referenced_by} references unknown attribute {reference}")]
    UnknownAttribute {
        reference: AttributeRef,
        referenced_by: String,
    },

    #[error("Resource {0} declared twice")]
    DuplicateResource(ResourceKey),

    #[error("Export {0} declared twice")]
    DuplicateExport(String),

    #[error(transparent)]
    InvalidName(#[from] ResourceNameError),

    #[error(transparent)]
    InvalidSpec(#[from] SpecError),
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Data => f.write_str("data"),
            Self::Ordering => f.write_str("ordering"),
        }
    }
}
