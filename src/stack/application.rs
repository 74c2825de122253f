// Copyright (c) 2025 - Cowboy AI, Inc.
//! Application layer: managed data services and the web workload
//!
//! The database, cache and file share live on private addresses reached
//! through service-networking peering. The database must wait for that
//! peering even though it reads none of its attributes, so the dependency is
//! declared as an ordering edge.
//!
//! Workload objects (namespace, deployment, service, backend config and
//! ingress) are applied through the cluster's access configuration.

use serde_json::{json, Value};

use crate::config::PlatformParams;
use crate::domain::{ResourceKind, ResourceSpec};
use crate::graph::{GraphBuilder, GraphError};
use crate::output::{all, record, Output};

use super::control_plane::ControlPlaneOutputs;
use super::network::NetworkOutputs;
use super::resource_name;

pub const LAYER: &str = "application";

/// Shown while the load balancer has no address yet
pub const PENDING_URL: &str = "Provisioning...";

const HTTP_PORT: u32 = 80;
const SHARE_MOUNT: &str = "/share";

#[derive(Debug, Clone)]
pub struct ApplicationOutputs {
    pub filestore_ip: Output<String>,
    pub redis_host: Output<String>,
    pub redis_port: Output<i64>,
    pub db_connection_name: Output<String>,
    pub db_private_ip: Output<String>,
    pub app_url: Output<String>,
}

pub fn declare_application(
    builder: &mut GraphBuilder,
    params: &PlatformParams,
    network: &NetworkOutputs,
    control_plane: &ControlPlaneOutputs,
) -> Result<ApplicationOutputs, GraphError> {
    builder.enter_layer(LAYER);
    let app = params.app_name.as_str();

    // Private service access
    let range = builder.declare(
        &resource_name(params, "private-services-range"),
        ResourceSpec::builder(ResourceKind::GlobalAddress)
            .set("network", &network.vpc_id)
            .set("purpose", "VPC_PEERING")
            .set("address_type", "INTERNAL")
            .set("prefix_length", 16u32)
            .build()?,
    )?;

    let peering = builder.declare(
        &resource_name(params, "private-services"),
        ResourceSpec::builder(ResourceKind::ServiceNetworkingConnection)
            .set("network", &network.vpc_id)
            .set("service", "servicenetworking.googleapis.com")
            .set("reserved_peering_ranges", all(&[range.name()]))
            .build()?,
    )?;

    let files = builder.declare(
        &resource_name(params, "files"),
        ResourceSpec::builder(ResourceKind::FilestoreInstance)
            .set("location", params.zone.as_str())
            .set("tier", params.file_share_tier.as_str())
            .set("share_name", app)
            .set("capacity_gb", params.file_share_capacity_gb)
            .set("network", &network.vpc_name)
            .set("reserved_ip_range", params.file_share_cidr)
            .build()?,
    )?;
    let filestore_ip: Output<String> = files.output("ip_address");

    let cache = builder.declare(
        &resource_name(params, "cache"),
        ResourceSpec::builder(ResourceKind::RedisInstance)
            .set("region", params.region.as_str())
            .set("tier", params.cache_tier.as_str())
            .set("memory_size_gb", params.cache_memory_gb)
            .set("redis_version", params.cache_version.as_str())
            .set("transit_encryption_mode", "SERVER_AUTHENTICATION")
            .set("authorized_network", &network.vpc_id)
            .build()?,
    )?;
    let redis_host: Output<String> = cache.output("host");
    let redis_port: Output<i64> = cache.output("port");

    let db = builder.declare(
        &resource_name(params, "db"),
        ResourceSpec::builder(ResourceKind::SqlDatabaseInstance)
            .set("region", params.region.as_str())
            .set("database_version", params.database_version.as_str())
            .set("tier", params.database_tier.as_str())
            .set("ipv4_enabled", false)
            .set("private_network", &network.vpc_self_link)
            .set("deletion_protection", false)
            .build()?,
    )?;
    builder.depends_on(&db, peering.key())?;
    let db_connection_name: Output<String> = db.output("connection_name");
    let db_private_ip: Output<String> = db.output("private_ip_address");

    let database = builder.declare(
        &format!("{app}db"),
        ResourceSpec::builder(ResourceKind::SqlDatabase)
            .set("instance", &db.name())
            .set("charset", "utf8mb4")
            .build()?,
    )?;

    let db_user: Output<String> = Output::secret(params.db_user_secret.as_str());
    let db_password: Output<String> = Output::secret(params.db_password_secret.as_str());
    builder.declare(
        &resource_name(params, "db-user"),
        ResourceSpec::builder(ResourceKind::SqlUser)
            .set("instance", &db.name())
            .set("user_name", &db_user)
            .set("password", &db_password)
            .build()?,
    )?;

    // Workload objects
    let access = &control_plane.cluster_access;
    let labels = json!({ "app": app });

    let namespace = builder.declare(
        app,
        ResourceSpec::builder(ResourceKind::Namespace)
            .set("cluster_access", access)
            .set("labels", labels.clone())
            .build()?,
    )?;

    let environment = record([
        ("MOODLE_DATABASE_HOST", db_private_ip.untyped().clone()),
        ("MOODLE_DATABASE_CONNECTION", db_connection_name.untyped().clone()),
        ("MOODLE_DATABASE_NAME", database.name().into_untyped()),
        ("MOODLE_DATABASE_USER", db_user.into_untyped()),
        ("MOODLE_DATABASE_PASSWORD", db_password.into_untyped()),
        ("REDIS_HOST", redis_host.untyped().clone()),
        ("REDIS_PORT", redis_port.untyped().clone()),
    ]);
    let image = params.app_image.clone();
    let containers = environment.map(move |env| container(&image, env));
    let volumes = filestore_ip.map(|server| {
        json!([{
            "name": "share",
            "nfs": { "server": server, "path": SHARE_MOUNT },
        }])
    });

    builder.declare(
        app,
        ResourceSpec::builder(ResourceKind::Deployment)
            .set("cluster_access", access)
            .set("namespace", &namespace.name())
            .set("replicas", params.app_replicas)
            .set("labels", labels.clone())
            .set("containers", containers)
            .set("volumes", volumes)
            .build()?,
    )?;

    let service = builder.declare(
        app,
        ResourceSpec::builder(ResourceKind::Service)
            .set("cluster_access", access)
            .set("namespace", &namespace.name())
            .set("service_type", "NodePort")
            .set("selector", labels)
            .set(
                "ports",
                json!([{ "name": "http", "port": HTTP_PORT, "targetPort": "http" }]),
            )
            .build()?,
    )?;

    let policy = builder.declare(
        &resource_name(params, "app-policy"),
        ResourceSpec::builder(ResourceKind::SecurityPolicy)
            .set("description", "Edge policy for the application load balancer")
            .set(
                "rules",
                json!([{
                    "action": "allow",
                    "priority": 2147483647,
                    "match": { "versioned_expr": "SRC_IPS_V1", "src_ip_ranges": ["*"] },
                    "description": "default rule",
                }]),
            )
            .build()?,
    )?;

    let backend = builder.declare(
        &format!("{app}-backend"),
        ResourceSpec::builder(ResourceKind::BackendConfig)
            .set("cluster_access", access)
            .set("namespace", &namespace.name())
            .set("security_policy", &policy.name())
            .set("cdn_enabled", true)
            .build()?,
    )?;

    let annotations = backend.name().map(|backend| {
        json!({
            "kubernetes.io/ingress.class": "gce",
            "cloud.google.com/backend-config": json!({ "default": backend }).to_string(),
        })
    });
    let rules = service.name().map(|service| {
        json!([{
            "http": {
                "paths": [{
                    "path": "/*",
                    "pathType": "ImplementationSpecific",
                    "backend": { "service": { "name": service, "port": { "number": HTTP_PORT } } },
                }],
            },
        }])
    });

    let ingress = builder.declare(
        &format!("{app}-ingress"),
        ResourceSpec::builder(ResourceKind::Ingress)
            .set("cluster_access", access)
            .set("namespace", &namespace.name())
            .set("annotations", annotations)
            .set("rules", rules)
            .build()?,
    )?;
    let url = ingress
        .output::<Option<String>>("load_balancer_ip")
        .map(|ip| app_url(ip.as_deref()));

    Ok(ApplicationOutputs {
        filestore_ip,
        redis_host,
        redis_port,
        db_connection_name,
        db_private_ip,
        app_url: url,
    })
}

/// Public URL for a load-balancer address that may not be assigned yet
pub fn app_url(ip: Option<&str>) -> String {
    match ip {
        Some(ip) if !ip.is_empty() => format!("http://{ip}"),
        _ => PENDING_URL.to_string(),
    }
}

fn container(image: &str, env: Value) -> Value {
    let env: Vec<Value> = env
        .as_object()
        .map(|fields| {
            fields
                .iter()
                .map(|(name, value)| match value {
                    Value::String(s) => json!({ "name": name, "value": s }),
                    other => json!({ "name": name, "value": other.to_string() }),
                })
                .collect()
        })
        .unwrap_or_default();

    json!([{
        "name": "app",
        "image": image,
        "ports": [{ "name": "http", "containerPort": HTTP_PORT }],
        "env": env,
        "volumeMounts": [{ "name": "share", "mountPath": SHARE_MOUNT }],
    }])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKey;
    use crate::graph::EdgeKind;
    use crate::stack::control_plane::declare_control_plane;
    use crate::stack::network::declare_network;
    use test_case::test_case;

    #[test_case(Some("35.190.7.1"), "http://35.190.7.1" ; "assigned")]
    #[test_case(None, PENDING_URL ; "not yet assigned")]
    #[test_case(Some(""), PENDING_URL ; "empty address")]
    fn test_app_url(ip: Option<&str>, expected: &str) {
        assert_eq!(app_url(ip), expected);
    }

    #[test]
    fn test_database_waits_for_peering() {
        let params = PlatformParams::default();
        let mut builder = GraphBuilder::new();
        let network = declare_network(&mut builder, &params).unwrap();
        let plane = declare_control_plane(&mut builder, &params, &network).unwrap();
        declare_application(&mut builder, &params, &network, &plane).unwrap();
        let graph = builder.freeze().unwrap();

        let db: ResourceKey = "sql_database_instance/demo-db".parse().unwrap();
        let peering: ResourceKey = "service_networking_connection/demo-private-services"
            .parse()
            .unwrap();
        assert!(graph
            .dependencies(&db)
            .contains(&(peering, EdgeKind::Ordering)));
    }

    #[test]
    fn test_sql_user_reads_secrets() {
        let params = PlatformParams::default();
        let mut builder = GraphBuilder::new();
        let network = declare_network(&mut builder, &params).unwrap();
        let plane = declare_control_plane(&mut builder, &params, &network).unwrap();
        declare_application(&mut builder, &params, &network, &plane).unwrap();
        let graph = builder.freeze().unwrap();

        let secrets = graph.secret_names();
        assert!(secrets.contains("db-user"));
        assert!(secrets.contains("db-password"));
    }

    #[test]
    fn test_container_env_is_flattened() {
        let containers = container(
            "bitnami/moodle:latest",
            json!({ "REDIS_HOST": "10.0.0.3", "REDIS_PORT": 6379 }),
        );
        let env = &containers[0]["env"];
        assert_eq!(env[0], json!({ "name": "REDIS_HOST", "value": "10.0.0.3" }));
        assert_eq!(env[1], json!({ "name": "REDIS_PORT", "value": "6379" }));
    }
}
