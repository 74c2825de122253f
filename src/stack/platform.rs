// Copyright (c) 2025 - Cowboy AI, Inc.
//! Whole-platform composition and its export map

use tracing::debug;

use crate::config::PlatformParams;
use crate::graph::{GraphBuilder, GraphError, ResourceGraph};

use super::application::{declare_application, ApplicationOutputs};
use super::bastion::{declare_bastion, BastionOutputs};
use super::ci_identity::{declare_ci_identity, CiIdentityOutputs};
use super::control_plane::{declare_control_plane, ControlPlaneOutputs};
use super::network::{declare_network, NetworkOutputs};
use super::node_pool::{declare_node_pool, NodePoolOutputs};

/// Outputs of every layer
#[derive(Debug, Clone)]
pub struct PlatformOutputs {
    pub network: NetworkOutputs,
    pub control_plane: ControlPlaneOutputs,
    pub node_pool: NodePoolOutputs,
    pub bastion: BastionOutputs,
    pub application: ApplicationOutputs,
    pub ci_identity: CiIdentityOutputs,
}

/// Declare every layer and register the flat exports
pub fn declare_platform(
    builder: &mut GraphBuilder,
    params: &PlatformParams,
) -> Result<PlatformOutputs, GraphError> {
    let network = declare_network(builder, params)?;
    let control_plane = declare_control_plane(builder, params, &network)?;
    let node_pool = declare_node_pool(builder, params, &control_plane)?;
    let bastion = declare_bastion(builder, params, &network)?;
    let application = declare_application(builder, params, &network, &control_plane)?;
    let ci_identity = declare_ci_identity(builder, params)?;

    builder.export("vpc_id", &network.vpc_id)?;
    builder.export("vpc_self_link", &network.vpc_self_link)?;
    builder.export("public_subnet_id", &network.public_subnet_id)?;
    builder.export("private_subnet_id", &network.private_subnet_id)?;

    builder.export("latest_engine_version", &control_plane.latest_engine_version)?;
    builder.export("cluster_name", &control_plane.cluster_name)?;
    builder.export("cluster_endpoint", &control_plane.endpoint)?;
    builder.export("cluster_ca_certificate", &control_plane.ca_certificate)?;
    builder.export("cluster_access", &control_plane.cluster_access)?;

    builder.export("node_pool_name", &node_pool.node_pool_name)?;

    builder.export("bastion_name", &bastion.bastion_name)?;
    builder.export("bastion_internal_ip", &bastion.bastion_internal_ip)?;
    builder.export("bastion_service_account_email", &bastion.service_account_email)?;

    builder.export("filestore_ip", &application.filestore_ip)?;
    builder.export("redis_host", &application.redis_host)?;
    builder.export("redis_port", &application.redis_port)?;
    builder.export("db_connection_name", &application.db_connection_name)?;
    builder.export("app_url", &application.app_url)?;

    builder.export("workload_pool_id", &ci_identity.workload_pool_id)?;
    builder.export("oidc_provider_id", &ci_identity.oidc_provider_id)?;
    builder.export("ci_service_account_email", &ci_identity.ci_service_account_email)?;

    Ok(PlatformOutputs {
        network,
        control_plane,
        node_pool,
        bastion,
        application,
        ci_identity,
    })
}

/// Declare the platform into a fresh builder and freeze it
pub fn build_platform(params: &PlatformParams) -> Result<ResourceGraph, GraphError> {
    let mut builder = GraphBuilder::new();
    declare_platform(&mut builder, params)?;
    let graph = builder.freeze()?;
    debug!(
        resources = graph.len(),
        layers = graph.composition_layers().len(),
        "Declared platform"
    );
    Ok(graph)
}
