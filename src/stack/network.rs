// Copyright (c) 2025 - Cowboy AI, Inc.
//! Network layer: VPC, public and private subnets, router and NAT

use crate::config::PlatformParams;
use crate::domain::{ResourceKind, ResourceSpec};
use crate::graph::{GraphBuilder, GraphError};
use crate::output::Output;

use super::resource_name;

pub const LAYER: &str = "network";

/// Outputs published by the network layer
#[derive(Debug, Clone)]
pub struct NetworkOutputs {
    pub vpc_id: Output<String>,
    pub vpc_name: Output<String>,
    pub vpc_self_link: Output<String>,
    pub public_subnet_id: Output<String>,
    pub private_subnet_id: Output<String>,
}

pub fn declare_network(
    builder: &mut GraphBuilder,
    params: &PlatformParams,
) -> Result<NetworkOutputs, GraphError> {
    builder.enter_layer(LAYER);

    let vpc = builder.declare(
        &resource_name(params, "vpc"),
        ResourceSpec::builder(ResourceKind::Network)
            .set("auto_create_subnetworks", false)
            .set("routing_mode", "REGIONAL")
            .build()?,
    )?;

    let public = builder.declare(
        &resource_name(params, "public-subnet"),
        ResourceSpec::builder(ResourceKind::Subnetwork)
            .set("network", &vpc.id())
            .set("region", params.region.as_str())
            .set("ip_cidr_range", params.public_subnet_cidr)
            .set("description", "Public subnet")
            .build()?,
    )?;

    let private = builder.declare(
        &resource_name(params, "private-subnet"),
        ResourceSpec::builder(ResourceKind::Subnetwork)
            .set("network", &vpc.id())
            .set("region", params.region.as_str())
            .set("ip_cidr_range", params.private_subnet_cidr)
            .set("private_ip_google_access", true)
            .set("description", "Private subnet for cluster nodes")
            .build()?,
    )?;

    let router = builder.declare(
        &resource_name(params, "router"),
        ResourceSpec::builder(ResourceKind::Router)
            .set("network", &vpc.id())
            .set("region", params.region.as_str())
            .build()?,
    )?;

    // Private nodes reach the internet only through NAT.
    builder.declare(
        &resource_name(params, "nat"),
        ResourceSpec::builder(ResourceKind::RouterNat)
            .set("router", &router.name())
            .set("region", params.region.as_str())
            .set("nat_ip_allocate_option", "AUTO_ONLY")
            .set(
                "source_subnetwork_ip_ranges_to_nat",
                "ALL_SUBNETWORKS_ALL_IP_RANGES",
            )
            .set("nat_ips", Vec::<String>::new())
            .build()?,
    )?;

    Ok(NetworkOutputs {
        vpc_id: vpc.id(),
        vpc_name: vpc.name(),
        vpc_self_link: vpc.self_link(),
        public_subnet_id: public.id(),
        private_subnet_id: private.id(),
    })
}
