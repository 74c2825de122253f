// Copyright (c) 2025 - Cowboy AI, Inc.
//! Node-pool layer: autoscaled worker pool attached to the cluster

use serde_json::json;

use crate::config::PlatformParams;
use crate::domain::{ResourceKind, ResourceSpec};
use crate::graph::{GraphBuilder, GraphError};
use crate::output::Output;

use super::control_plane::ControlPlaneOutputs;
use super::resource_name;

pub const LAYER: &str = "node-pool";

const OAUTH_SCOPES: &[&str] = &[
    "https://www.googleapis.com/auth/cloud-platform",
    "https://www.googleapis.com/auth/compute",
    "https://www.googleapis.com/auth/devstorage.read_only",
    "https://www.googleapis.com/auth/logging.write",
    "https://www.googleapis.com/auth/monitoring",
];

#[derive(Debug, Clone)]
pub struct NodePoolOutputs {
    pub node_pool_name: Output<String>,
}

pub fn declare_node_pool(
    builder: &mut GraphBuilder,
    params: &PlatformParams,
    control_plane: &ControlPlaneOutputs,
) -> Result<NodePoolOutputs, GraphError> {
    builder.enter_layer(LAYER);

    let pool = builder.declare(
        &resource_name(params, "node-pool"),
        ResourceSpec::builder(ResourceKind::NodePool)
            .set("cluster", &control_plane.cluster_name)
            .set("location", params.region.as_str())
            .set("initial_node_count", params.initial_node_count)
            .set(
                "autoscaling",
                json!({
                    "min_node_count": params.initial_node_count,
                    "max_node_count": params.max_node_count,
                }),
            )
            .set(
                "node_config",
                json!({
                    "machine_type": params.node_machine_type,
                    "preemptible": params.preemptible,
                    "oauth_scopes": OAUTH_SCOPES,
                }),
            )
            .build()?,
    )?;

    Ok(NodePoolOutputs {
        node_pool_name: pool.name(),
    })
}
