// Copyright (c) 2025 - Cowboy AI, Inc.
//! Bastion layer: private jump host reachable through identity-aware proxy
//!
//! The host has no external address. SSH arrives from the proxy range only,
//! and tinyproxy on port 8888 forwards control-plane traffic for operators.

use serde_json::json;

use crate::config::PlatformParams;
use crate::domain::{ResourceKind, ResourceSpec};
use crate::graph::{GraphBuilder, GraphError};
use crate::output::Output;

use super::network::NetworkOutputs;
use super::resource_name;

pub const LAYER: &str = "bastion";

/// Source range of identity-aware proxy TCP forwarding
pub const IAP_SOURCE_RANGE: &str = "35.235.240.0/20";

const STARTUP_SCRIPT: &str = r#"#!/bin/bash
apt-get update
apt-get install -y tinyproxy
grep -qxF 'Allow localhost' /etc/tinyproxy/tinyproxy.conf || echo 'Allow localhost' >> /etc/tinyproxy/tinyproxy.conf
sed -i 's/^Port .*/Port 8888/' /etc/tinyproxy/tinyproxy.conf
systemctl restart tinyproxy
"#;

#[derive(Debug, Clone)]
pub struct BastionOutputs {
    pub bastion_name: Output<String>,
    pub bastion_internal_ip: Output<String>,
    pub service_account_email: Output<String>,
}

pub fn declare_bastion(
    builder: &mut GraphBuilder,
    params: &PlatformParams,
    network: &NetworkOutputs,
) -> Result<BastionOutputs, GraphError> {
    builder.enter_layer(LAYER);
    let tag = resource_name(params, "bastion");

    let account = builder.declare(
        &resource_name(params, "bastion-sa"),
        ResourceSpec::builder(ResourceKind::ServiceAccount)
            .set("account_id", resource_name(params, "bastion-sa"))
            .set("display_name", "Bastion host service account")
            .set("project", params.project.as_str())
            .build()?,
    )?;
    let service_account_email: Output<String> = account.output("email");

    let instance = builder.declare(
        &resource_name(params, "bastion"),
        ResourceSpec::builder(ResourceKind::Instance)
            .set("zone", params.zone.as_str())
            .set("machine_type", params.bastion_machine_type.as_str())
            .set("boot_image", params.bastion_image.as_str())
            .set(
                "network_interfaces",
                network
                    .private_subnet_id
                    .map(|subnetwork| json!([{ "subnetwork": subnetwork }])),
            )
            .set(
                "service_account",
                service_account_email.map(|email| {
                    json!({
                        "email": email,
                        "scopes": ["https://www.googleapis.com/auth/cloud-platform"],
                    })
                }),
            )
            .set("metadata_startup_script", STARTUP_SCRIPT)
            .set("tags", vec![tag.clone()])
            .build()?,
    )?;

    builder.declare(
        &resource_name(params, "bastion-allow-ingress-from-iap"),
        ResourceSpec::builder(ResourceKind::Firewall)
            .set("network", &network.vpc_id)
            .set("direction", "INGRESS")
            .set("source_ranges", vec![IAP_SOURCE_RANGE])
            .set("allows", json!([{ "protocol": "tcp", "ports": ["22"] }]))
            .set("target_tags", vec![tag.clone()])
            .build()?,
    )?;

    builder.declare(
        &resource_name(params, "bastion-allow-egress"),
        ResourceSpec::builder(ResourceKind::Firewall)
            .set("network", &network.vpc_id)
            .set("direction", "EGRESS")
            .set("destination_ranges", vec!["0.0.0.0/0"])
            .set(
                "allows",
                json!([
                    { "protocol": "tcp", "ports": ["0-65535"] },
                    { "protocol": "udp", "ports": ["0-65535"] },
                    { "protocol": "icmp" },
                ]),
            )
            .set("target_tags", vec![tag])
            .build()?,
    )?;

    Ok(BastionOutputs {
        bastion_name: instance.name(),
        bastion_internal_ip: instance.output("internal_ip"),
        service_account_email,
    })
}
