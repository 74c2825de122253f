// Copyright (c) 2025 - Cowboy AI, Inc.
//! Control-plane layer: private container-orchestration cluster
//!
//! Nodes get private addresses only; the control-plane endpoint stays
//! public so the workload objects of later layers can be applied. The
//! default node pool is removed in favour of the node-pool layer.
//!
//! The cluster version is looked up at run time: the newest release of the
//! configured channel within the `control_plane_version` line.

use serde_json::{json, Value};

use crate::config::PlatformParams;
use crate::domain::{ResourceKind, ResourceSpec};
use crate::graph::{GraphBuilder, GraphError};
use crate::output::{combine3, Output};

use super::network::NetworkOutputs;
use super::resource_name;

pub const LAYER: &str = "control-plane";

/// Outputs published by the control-plane layer
#[derive(Debug, Clone)]
pub struct ControlPlaneOutputs {
    /// Newest control-plane version of the configured channel and line
    pub latest_engine_version: Output<String>,
    pub cluster_name: Output<String>,
    pub endpoint: Output<String>,
    /// Cluster CA certificate; sensitive
    pub ca_certificate: Output<String>,
    /// Access configuration for the workload orchestrator; sensitive
    pub cluster_access: Output<Value>,
}

pub fn declare_control_plane(
    builder: &mut GraphBuilder,
    params: &PlatformParams,
    network: &NetworkOutputs,
) -> Result<ControlPlaneOutputs, GraphError> {
    builder.enter_layer(LAYER);

    let versions = builder.declare(
        &resource_name(params, "engine-versions"),
        ResourceSpec::builder(ResourceKind::EngineVersions)
            .set("location", params.region.as_str())
            .set("release_channel", params.release_channel.as_str())
            .set("version_prefix", params.control_plane_version.as_str())
            .build()?,
    )?;
    let latest_engine_version: Output<String> = versions.output("latest_version");

    let cluster = builder.declare(
        &resource_name(params, "cluster"),
        ResourceSpec::builder(ResourceKind::Cluster)
            .set("location", params.region.as_str())
            .set("network", &network.vpc_id)
            .set("subnetwork", &network.private_subnet_id)
            .set("min_master_version", &latest_engine_version)
            .set("remove_default_node_pool", true)
            .set("initial_node_count", 1u32)
            .set("deletion_protection", false)
            .set(
                "private_cluster_config",
                json!({
                    "enable_private_nodes": true,
                    "enable_private_endpoint": false,
                    "master_ipv4_cidr_block": params.master_cidr.as_cidr(),
                }),
            )
            .build()?,
    )?;

    let cluster_name = cluster.name();
    let endpoint: Output<String> = cluster.output("endpoint");
    let ca_certificate: Output<String> = cluster.output("ca_certificate");
    let cluster_access = access_config(&cluster_name, &endpoint, &ca_certificate);

    Ok(ControlPlaneOutputs {
        latest_engine_version,
        cluster_name,
        endpoint,
        ca_certificate,
        cluster_access,
    })
}

/// Orchestrator access document built from the cluster's published values
pub fn access_config(
    cluster_name: &Output<String>,
    endpoint: &Output<String>,
    ca_certificate: &Output<String>,
) -> Output<Value> {
    combine3(cluster_name, endpoint, ca_certificate, |name, endpoint, ca| {
        json!({
            "cluster_name": name,
            "endpoint": endpoint,
            "server": format!("https://{endpoint}"),
            "certificate_authority_data": ca,
        })
    })
}
