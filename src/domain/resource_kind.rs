// Copyright (c) 2025 - Cowboy AI, Inc.
//! Resource Kind Taxonomy
//!
//! Defines the set of infrastructure and workload objects a provisioning graph
//! can declare. Every kind belongs to a [`Plane`]: cloud objects are created by
//! the cloud resource provider, workload objects by the workload orchestrator
//! running inside a provisioned control plane.
//!
//! Lookup kinds are read-only data sources: they are queried on every run and
//! publish attributes, but are never created, updated or deleted.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Provisioning plane a resource kind is served by
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Plane {
    /// Cloud control APIs (network fabric, managed services, compute)
    Cloud,
    /// Workload orchestrator API reached through a control-plane endpoint
    Workload,
}

/// Resource kind taxonomy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    // Network fabric
    /// VPC network
    Network,
    /// Regional subnetwork
    Subnetwork,
    /// Cloud router
    Router,
    /// NAT attached to a router
    RouterNat,
    /// Reserved internal address range
    GlobalAddress,
    /// Private service networking peering
    ServiceNetworkingConnection,
    /// Firewall rule
    Firewall,

    // Container orchestration
    /// Managed control plane
    Cluster,
    /// Worker node pool
    NodePool,
    /// Control-plane versions offered in a location (lookup)
    EngineVersions,

    // Compute and identity
    /// Compute instance
    Instance,
    /// Service account
    ServiceAccount,
    /// Project IAM membership
    IamMember,
    /// Workload identity pool
    WorkloadIdentityPool,
    /// OIDC provider within a workload identity pool
    WorkloadIdentityPoolProvider,

    // Managed data services
    /// Managed SQL instance
    SqlDatabaseInstance,
    /// Database inside a SQL instance
    SqlDatabase,
    /// User of a SQL instance
    SqlUser,
    /// Managed Redis cache
    RedisInstance,
    /// Managed NFS file share
    FilestoreInstance,
    /// Edge security policy
    SecurityPolicy,

    // Workload objects
    /// Orchestrator namespace
    Namespace,
    /// Replicated workload
    Deployment,
    /// Service exposing a workload
    Service,
    /// Load-balancer backend configuration
    BackendConfig,
    /// HTTP ingress
    Ingress,
}

impl ResourceKind {
    /// Every kind, in declaration order
    pub const ALL: [ResourceKind; 26] = [
        Self::Network,
        Self::Subnetwork,
        Self::Router,
        Self::RouterNat,
        Self::GlobalAddress,
        Self::ServiceNetworkingConnection,
        Self::Firewall,
        Self::Cluster,
        Self::NodePool,
        Self::EngineVersions,
        Self::Instance,
        Self::ServiceAccount,
        Self::IamMember,
        Self::WorkloadIdentityPool,
        Self::WorkloadIdentityPoolProvider,
        Self::SqlDatabaseInstance,
        Self::SqlDatabase,
        Self::SqlUser,
        Self::RedisInstance,
        Self::FilestoreInstance,
        Self::SecurityPolicy,
        Self::Namespace,
        Self::Deployment,
        Self::Service,
        Self::BackendConfig,
        Self::Ingress,
    ];

    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Subnetwork => "subnetwork",
            Self::Router => "router",
            Self::RouterNat => "router_nat",
            Self::GlobalAddress => "global_address",
            Self::ServiceNetworkingConnection => "service_networking_connection",
            Self::Firewall => "firewall",
            Self::Cluster => "cluster",
            Self::NodePool => "node_pool",
            Self::EngineVersions => "engine_versions",
            Self::Instance => "instance",
            Self::ServiceAccount => "service_account",
            Self::IamMember => "iam_member",
            Self::WorkloadIdentityPool => "workload_identity_pool",
            Self::WorkloadIdentityPoolProvider => "workload_identity_pool_provider",
            Self::SqlDatabaseInstance => "sql_database_instance",
            Self::SqlDatabase => "sql_database",
            Self::SqlUser => "sql_user",
            Self::RedisInstance => "redis_instance",
            Self::FilestoreInstance => "filestore_instance",
            Self::SecurityPolicy => "security_policy",
            Self::Namespace => "namespace",
            Self::Deployment => "deployment",
            Self::Service => "service",
            Self::BackendConfig => "backend_config",
            Self::Ingress => "ingress",
        }
    }

    /// Plane that serves this kind
    pub fn plane(&self) -> Plane {
        match self {
            Self::Namespace
            | Self::Deployment
            | Self::Service
            | Self::BackendConfig
            | Self::Ingress => Plane::Workload,
            _ => Plane::Cloud,
        }
    }

    /// Check if this kind is a workload object
    pub fn is_workload(&self) -> bool {
        self.plane() == Plane::Workload
    }

    /// Check if this kind is a read-only lookup
    pub fn is_lookup(&self) -> bool {
        matches!(self, Self::EngineVersions)
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| format!("Unknown resource kind: {s}"))
    }
}
