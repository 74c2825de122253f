// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for provisioning runs

use std::error::Error as StdError;
use thiserror::Error;

use crate::convergence::StateStoreError;
use crate::domain::{MaterializeError, ResourceKey, SpecError};
use crate::graph::GraphError;
use crate::output::ResolutionError;
use crate::provider::ProviderError;
use crate::state_machine::TransitionError;

/// Errors that can occur while planning or applying a resource graph
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// Graph validation failed; nothing was sent to a provider
    #[error("Dependency unresolved: {0}")]
    DependencyUnresolved(GraphError),

    /// Spec invalid per provider schema
    #[error("Provider rejected {resource}: {reason}")]
    ProviderRejected { resource: ResourceKey, reason: String },

    /// Transient failure that outlived its retry budget
    #[error("Transient provider failure on {resource}: {reason}")]
    ProviderTransient { resource: ResourceKey, reason: String },

    /// Concurrent external mutation, needs manual reconciliation
    #[error("Conflicting remote change on {resource}: {reason}")]
    ProviderConflict { resource: ResourceKey, reason: String },

    /// A required sensitive input is absent
    #[error("Secret missing: {0}")]
    SecretMissing(String),

    #[error(transparent)]
    InvalidSpec(#[from] SpecError),

    /// A spec could not be materialized from resolved outputs
    #[error("Cannot materialize {resource}: {source}")]
    Materialize {
        resource: ResourceKey,
        #[source]
        source: MaterializeError,
    },

    #[error(transparent)]
    StateStore(#[from] StateStoreError),

    /// A long-running operation exceeded its poll deadline
    #[error("Operation on {resource} timed out: {reason}")]
    Timeout { resource: ResourceKey, reason: String },

    /// Resolved values changed an immutable field the plan could not foresee
    #[error("{resource} needs replacement ({}); plan and apply again", .changed.join(", "))]
    UnplannedReplacement {
        resource: ResourceKey,
        changed: Vec<String>,
    },

    /// The operation task ended without reporting a result
    #[error("Operation on {resource} aborted: {reason}")]
    Aborted { resource: ResourceKey, reason: String },

    #[error("Run cancelled")]
    Cancelled,

    #[error(transparent)]
    Transition(#[from] TransitionError),

    #[error(transparent)]
    Resolution(#[from] ResolutionError),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

/// Result type for provisioning operations
pub type ProvisionResult<T> = Result<T, ProvisionError>;

impl ProvisionError {
    /// Classify a provider error raised while working on one resource
    pub fn from_provider(resource: &ResourceKey, error: ProviderError) -> Self {
        let resource = resource.clone();
        match error {
            ProviderError::Rejected(reason) | ProviderError::NotFound(reason) => {
                Self::ProviderRejected { resource, reason }
            }
            ProviderError::Transient(reason) => Self::ProviderTransient { resource, reason },
            ProviderError::Conflict(reason) => Self::ProviderConflict { resource, reason },
            ProviderError::Timeout(reason) => Self::Timeout { resource, reason },
        }
    }

    /// Whether the error was raised before any remote call
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::DependencyUnresolved(_) | Self::SecretMissing(_) | Self::InvalidSpec(_)
        )
    }

    /// Error message followed by every source, outermost first
    pub fn chain(&self) -> Vec<String> {
        let mut chain = vec![self.to_string()];
        let mut source = StdError::source(self);
        while let Some(error) = source {
            chain.push(error.to_string());
            source = error.source();
        }
        chain
    }
}

impl From<GraphError> for ProvisionError {
    fn from(error: GraphError) -> Self {
        match error {
            GraphError::InvalidSpec(spec) => Self::InvalidSpec(spec),
            other => Self::DependencyUnresolved(other),
        }
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        ProvisionError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;

    fn key() -> ResourceKey {
        ResourceKey::parse_name(ResourceKind::SqlDatabaseInstance, "db").unwrap()
    }

    #[test]
    fn test_provider_errors_map_to_taxonomy() {
        assert!(matches!(
            ProvisionError::from_provider(&key(), ProviderError::Rejected("tier".into())),
            ProvisionError::ProviderRejected { .. }
        ));
        assert!(matches!(
            ProvisionError::from_provider(&key(), ProviderError::Conflict("etag".into())),
            ProvisionError::ProviderConflict { .. }
        ));
        assert!(matches!(
            ProvisionError::from_provider(&key(), ProviderError::Timeout("op".into())),
            ProvisionError::Timeout { .. }
        ));
    }

    #[test]
    fn test_graph_errors_are_validation_errors() {
        let cycle = GraphError::CycleDetected { path: vec![key(), key()] };
        let err = ProvisionError::from(cycle);
        assert!(matches!(err, ProvisionError::DependencyUnresolved(_)));
        assert!(err.is_validation());

        let spec = GraphError::InvalidSpec(SpecError::Invalid {
            kind: ResourceKind::Network,
            problems: vec!["missing auto_create_subnetworks".into()],
        });
        assert!(matches!(ProvisionError::from(spec), ProvisionError::InvalidSpec(_)));
    }

    #[test]
    fn test_chain_includes_sources() {
        let err = ProvisionError::Materialize {
            resource: key(),
            source: MaterializeError::Pending {
                field: "private_network".into(),
            },
        };
        let chain = err.chain();
        assert_eq!(chain.len(), 2);
        assert!(chain[1].contains("private_network"));
    }
}
