// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Provider Interface
//!
//! The executor talks to the outside world only through [`ResourceProvider`].
//! Every call is keyed by resource kind and takes a fully materialized spec.
//! Mutating calls return an [`OperationToken`] for a long-running operation
//! that is polled until it reports a terminal status.
//!
//! ```text
//! create(key, spec) ──► (handle, token) ──► poll(token)* ──► Succeeded { attributes }
//! update(handle, spec) ──► token ──► poll(token)* ──► Succeeded { attributes }
//! delete(handle) ──► token ──► poll(token)* ──► Succeeded
//! read(handle) ──► RemoteState { fields, attributes }
//! lookup(key, spec) ──► RemoteState { fields, attributes }
//! ```
//!
//! `lookup` serves read-only kinds (see [`ResourceKind::is_lookup`]); it
//! queries the provider and never changes remote state.
//!
//! Workload objects are served by the same interface; [`RoutingProvider`]
//! dispatches each call to the provider of the kind's [`Plane`](crate::domain::Plane).

pub mod operation;
pub mod routing;
pub mod simulated;

pub use operation::{await_operation, with_retry, Backoff, PollConfig, RetryConfig};
pub use routing::RoutingProvider;
pub use simulated::{CallMethod, Fault, ProviderCall, SimulatedProvider};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

use crate::domain::{MaterializedSpec, ResourceKey, ResourceKind};

/// Provider-assigned identifier of a created resource
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RemoteHandle {
    pub kind: ResourceKind,
    pub id: String,
}

impl fmt::Display for RemoteHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Token of a long-running operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OperationToken {
    pub kind: ResourceKind,
    pub id: String,
}

impl fmt::Display for OperationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Status reported by a poll
#[derive(Debug, Clone, PartialEq)]
pub enum OperationStatus {
    Running,
    /// Terminal success with the resource's current attributes
    Succeeded {
        attributes: BTreeMap<String, Value>,
    },
    Failed(ProviderError),
}

/// Current remote state returned by `read`
#[derive(Debug, Clone, PartialEq)]
pub struct RemoteState {
    pub fields: BTreeMap<String, Value>,
    pub attributes: BTreeMap<String, Value>,
}

/// Errors reported by a provider
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Spec invalid for the provider; never retried
    #[error("Rejected by provider: {0}")]
    Rejected(String),

    /// Rate limit, quota or a dropped connection
    #[error("Transient provider error: {0}")]
    Transient(String),

    /// Concurrent external mutation detected
    #[error("Conflicting remote change: {0}")]
    Conflict(String),

    #[error("Remote resource not found: {0}")]
    NotFound(String),

    /// A long-running operation exceeded its poll deadline
    #[error("Operation timed out: {0}")]
    Timeout(String),
}

impl ProviderError {
    /// Whether the failed request may be reissued
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Resource provider abstraction
///
/// Implementations must be safe to call concurrently for distinct resources.
#[async_trait]
pub trait ResourceProvider: Send + Sync {
    /// Provider name for logs
    fn name(&self) -> &str;

    /// Request creation of a resource
    async fn create(
        &self,
        key: &ResourceKey,
        spec: &MaterializedSpec,
    ) -> Result<(RemoteHandle, OperationToken), ProviderError>;

    /// Check a long-running operation
    async fn poll(&self, token: &OperationToken) -> Result<OperationStatus, ProviderError>;

    /// Request an in-place update
    async fn update(
        &self,
        handle: &RemoteHandle,
        spec: &MaterializedSpec,
    ) -> Result<OperationToken, ProviderError>;

    /// Request deletion
    async fn delete(&self, handle: &RemoteHandle) -> Result<OperationToken, ProviderError>;

    /// Read the current remote state
    async fn read(&self, handle: &RemoteHandle) -> Result<RemoteState, ProviderError>;

    /// Query a read-only data source
    async fn lookup(
        &self,
        key: &ResourceKey,
        spec: &MaterializedSpec,
    ) -> Result<RemoteState, ProviderError>;
}
