// Copyright (c) 2025 - Cowboy AI, Inc.
//! Per-Kind Field Schemas
//!
//! Each [`ResourceKind`] has a fixed, validated set of input fields and a fixed
//! set of provider-assigned attributes it publishes once created.
//!
//! Field flags drive three engine behaviors:
//!
//! - `required`: declaration fails when the field is absent
//! - `mutable`: a change can be applied in place; a change to an immutable
//!   field forces replacement
//! - `sensitive`: the value never appears in logs, reports, exports or
//!   persisted state

use serde_json::Value;

use super::network::Cidr;
use super::resource_kind::ResourceKind;

/// Value shape accepted by a field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    String,
    Integer,
    Bool,
    StringList,
    Object,
    /// IP range in CIDR notation
    Cidr,
    /// Arbitrary JSON (nested workload documents, rule lists)
    Json,
}

impl FieldType {
    /// Check that a concrete value has this shape
    pub fn check(&self, value: &Value) -> Result<(), String> {
        let ok = match self {
            Self::String => value.is_string(),
            Self::Integer => value.is_i64() || value.is_u64(),
            Self::Bool => value.is_boolean(),
            Self::StringList => value
                .as_array()
                .is_some_and(|items| items.iter().all(Value::is_string)),
            Self::Object => value.is_object(),
            Self::Cidr => {
                return match value.as_str() {
                    Some(s) => Cidr::new(s).map(|_| ()).map_err(|e| e.to_string()),
                    None => Err(format!("expected CIDR string, got {value}")),
                }
            }
            Self::Json => true,
        };

        if ok {
            Ok(())
        } else {
            Err(format!("expected {self:?}, got {}", type_name(value)))
        }
    }
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Schema of one input field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSchema {
    pub name: &'static str,
    pub ty: FieldType,
    pub required: bool,
    pub mutable: bool,
    pub sensitive: bool,
}

impl FieldSchema {
    /// Required, immutable, non-sensitive field
    pub const fn new(name: &'static str, ty: FieldType) -> Self {
        Self {
            name,
            ty,
            required: true,
            mutable: false,
            sensitive: false,
        }
    }

    pub const fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub const fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    pub const fn sensitive(mut self) -> Self {
        self.sensitive = true;
        self
    }
}

/// Schema of one published attribute
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributeSchema {
    pub name: &'static str,
    pub sensitive: bool,
}

impl AttributeSchema {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            sensitive: false,
        }
    }

    pub const fn sensitive(name: &'static str) -> Self {
        Self {
            name,
            sensitive: true,
        }
    }
}

/// Attributes every kind publishes
pub const COMMON_ATTRIBUTES: &[AttributeSchema] = &[
    AttributeSchema::new("id"),
    AttributeSchema::new("name"),
    AttributeSchema::new("self_link"),
];

/// Complete schema for one resource kind
#[derive(Debug, Clone, Copy)]
pub struct KindSchema {
    pub kind: ResourceKind,
    pub fields: &'static [FieldSchema],
    pub attributes: &'static [AttributeSchema],
}

impl KindSchema {
    /// Look up a field by name
    pub fn field(&self, name: &str) -> Option<&'static FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Look up a published attribute by name (common attributes included)
    pub fn attribute(&self, name: &str) -> Option<&'static AttributeSchema> {
        COMMON_ATTRIBUTES
            .iter()
            .chain(self.attributes.iter())
            .find(|a| a.name == name)
    }

    /// Names of all published attributes
    pub fn attribute_names(&self) -> impl Iterator<Item = &'static str> {
        COMMON_ATTRIBUTES
            .iter()
            .chain(self.attributes.iter())
            .map(|a| a.name)
    }
}

use FieldType as T;

const CLUSTER_ACCESS: FieldSchema = FieldSchema::new("cluster_access", T::Object)
    .mutable()
    .sensitive();

const NETWORK: &[FieldSchema] = &[
    FieldSchema::new("auto_create_subnetworks", T::Bool),
    FieldSchema::new("routing_mode", T::String).optional().mutable(),
    FieldSchema::new("description", T::String).optional(),
];

const SUBNETWORK: &[FieldSchema] = &[
    FieldSchema::new("network", T::String),
    FieldSchema::new("region", T::String),
    FieldSchema::new("ip_cidr_range", T::Cidr),
    FieldSchema::new("private_ip_google_access", T::Bool).optional().mutable(),
    FieldSchema::new("description", T::String).optional().mutable(),
    FieldSchema::new("purpose", T::String).optional(),
];

const ROUTER: &[FieldSchema] = &[
    FieldSchema::new("network", T::String),
    FieldSchema::new("region", T::String),
];

const ROUTER_NAT: &[FieldSchema] = &[
    FieldSchema::new("router", T::String),
    FieldSchema::new("region", T::String),
    FieldSchema::new("nat_ip_allocate_option", T::String).optional().mutable(),
    FieldSchema::new("source_subnetwork_ip_ranges_to_nat", T::String).mutable(),
    FieldSchema::new("nat_ips", T::StringList).optional().mutable(),
];

const GLOBAL_ADDRESS: &[FieldSchema] = &[
    FieldSchema::new("network", T::String),
    FieldSchema::new("purpose", T::String),
    FieldSchema::new("address_type", T::String),
    FieldSchema::new("prefix_length", T::Integer),
];

const SERVICE_NETWORKING_CONNECTION: &[FieldSchema] = &[
    FieldSchema::new("network", T::String),
    FieldSchema::new("service", T::String),
    FieldSchema::new("reserved_peering_ranges", T::StringList).mutable(),
];

const FIREWALL: &[FieldSchema] = &[
    FieldSchema::new("network", T::String),
    FieldSchema::new("direction", T::String),
    FieldSchema::new("allows", T::Json).mutable(),
    FieldSchema::new("source_ranges", T::StringList).optional().mutable(),
    FieldSchema::new("destination_ranges", T::StringList).optional().mutable(),
    FieldSchema::new("target_tags", T::StringList).optional().mutable(),
    FieldSchema::new("description", T::String).optional().mutable(),
];

const CLUSTER: &[FieldSchema] = &[
    FieldSchema::new("location", T::String),
    FieldSchema::new("network", T::String),
    FieldSchema::new("subnetwork", T::String),
    FieldSchema::new("min_master_version", T::String).optional().mutable(),
    FieldSchema::new("remove_default_node_pool", T::Bool).optional(),
    FieldSchema::new("initial_node_count", T::Integer).optional(),
    FieldSchema::new("deletion_protection", T::Bool).optional().mutable(),
    FieldSchema::new("private_cluster_config", T::Object).optional(),
    FieldSchema::new("master_authorized_networks", T::Object).optional().mutable(),
    FieldSchema::new("node_config", T::Object).optional(),
];

const ENGINE_VERSIONS: &[FieldSchema] = &[
    FieldSchema::new("location", T::String),
    FieldSchema::new("release_channel", T::String).mutable(),
    // Empty selects the newest release of the channel.
    FieldSchema::new("version_prefix", T::String).optional().mutable(),
];

const NODE_POOL: &[FieldSchema] = &[
    FieldSchema::new("cluster", T::String),
    FieldSchema::new("location", T::String),
    FieldSchema::new("initial_node_count", T::Integer).optional(),
    FieldSchema::new("autoscaling", T::Object).optional().mutable(),
    FieldSchema::new("node_config", T::Object),
    FieldSchema::new("version", T::String).optional().mutable(),
];

const INSTANCE: &[FieldSchema] = &[
    FieldSchema::new("zone", T::String),
    FieldSchema::new("machine_type", T::String).mutable(),
    FieldSchema::new("boot_image", T::String),
    FieldSchema::new("network_interfaces", T::Json),
    FieldSchema::new("service_account", T::Object).optional().mutable(),
    FieldSchema::new("metadata_startup_script", T::String).optional().mutable(),
    FieldSchema::new("tags", T::StringList).optional().mutable(),
];

const SERVICE_ACCOUNT: &[FieldSchema] = &[
    FieldSchema::new("account_id", T::String),
    FieldSchema::new("display_name", T::String).optional().mutable(),
    FieldSchema::new("project", T::String).optional(),
];

const IAM_MEMBER: &[FieldSchema] = &[
    FieldSchema::new("project", T::String),
    FieldSchema::new("role", T::String),
    FieldSchema::new("member", T::String),
];

const WORKLOAD_IDENTITY_POOL: &[FieldSchema] = &[
    FieldSchema::new("project", T::String),
    FieldSchema::new("location", T::String),
    FieldSchema::new("display_name", T::String).optional().mutable(),
];

const WORKLOAD_IDENTITY_POOL_PROVIDER: &[FieldSchema] = &[
    FieldSchema::new("project", T::String),
    FieldSchema::new("location", T::String),
    FieldSchema::new("workload_identity_pool_id", T::String),
    FieldSchema::new("display_name", T::String).optional().mutable(),
    FieldSchema::new("issuer_uri", T::String).mutable(),
    FieldSchema::new("attribute_mapping", T::Object).mutable(),
    FieldSchema::new("attribute_condition", T::String).optional().mutable(),
];

const SQL_DATABASE_INSTANCE: &[FieldSchema] = &[
    FieldSchema::new("region", T::String),
    FieldSchema::new("database_version", T::String),
    FieldSchema::new("tier", T::String).mutable(),
    FieldSchema::new("ipv4_enabled", T::Bool).optional().mutable(),
    FieldSchema::new("private_network", T::String),
    FieldSchema::new("deletion_protection", T::Bool).optional().mutable(),
];

const SQL_DATABASE: &[FieldSchema] = &[
    FieldSchema::new("instance", T::String),
    FieldSchema::new("charset", T::String).optional(),
];

const SQL_USER: &[FieldSchema] = &[
    FieldSchema::new("instance", T::String),
    FieldSchema::new("user_name", T::String).sensitive(),
    FieldSchema::new("password", T::String).mutable().sensitive(),
];

const REDIS_INSTANCE: &[FieldSchema] = &[
    FieldSchema::new("region", T::String),
    FieldSchema::new("tier", T::String),
    FieldSchema::new("memory_size_gb", T::Integer).mutable(),
    FieldSchema::new("redis_version", T::String).mutable(),
    FieldSchema::new("transit_encryption_mode", T::String).optional(),
    FieldSchema::new("authorized_network", T::String),
];

const FILESTORE_INSTANCE: &[FieldSchema] = &[
    FieldSchema::new("location", T::String),
    FieldSchema::new("tier", T::String),
    FieldSchema::new("share_name", T::String),
    FieldSchema::new("capacity_gb", T::Integer).mutable(),
    FieldSchema::new("network", T::String),
    FieldSchema::new("reserved_ip_range", T::Cidr).optional(),
];

const SECURITY_POLICY: &[FieldSchema] = &[
    FieldSchema::new("description", T::String).optional().mutable(),
    FieldSchema::new("rules", T::Json).optional().mutable(),
];

const NAMESPACE: &[FieldSchema] = &[
    CLUSTER_ACCESS,
    FieldSchema::new("labels", T::Object).optional().mutable(),
];

const DEPLOYMENT: &[FieldSchema] = &[
    CLUSTER_ACCESS,
    FieldSchema::new("namespace", T::String),
    FieldSchema::new("replicas", T::Integer).mutable(),
    FieldSchema::new("labels", T::Object).optional().mutable(),
    FieldSchema::new("containers", T::Json).mutable(),
    FieldSchema::new("volumes", T::Json).optional().mutable(),
];

const SERVICE: &[FieldSchema] = &[
    CLUSTER_ACCESS,
    FieldSchema::new("namespace", T::String),
    FieldSchema::new("service_type", T::String).mutable(),
    FieldSchema::new("selector", T::Object).mutable(),
    FieldSchema::new("ports", T::Json).mutable(),
];

const BACKEND_CONFIG: &[FieldSchema] = &[
    CLUSTER_ACCESS,
    FieldSchema::new("namespace", T::String),
    FieldSchema::new("security_policy", T::String).optional().mutable(),
    FieldSchema::new("cdn_enabled", T::Bool).optional().mutable(),
];

const INGRESS: &[FieldSchema] = &[
    CLUSTER_ACCESS,
    FieldSchema::new("namespace", T::String),
    FieldSchema::new("annotations", T::Object).optional().mutable(),
    FieldSchema::new("rules", T::Json).mutable(),
];

const NO_ATTRIBUTES: &[AttributeSchema] = &[];
const SUBNETWORK_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("gateway_address")];
const GLOBAL_ADDRESS_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("address")];
const PEERING_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("peering")];
const CLUSTER_ATTRIBUTES: &[AttributeSchema] = &[
    AttributeSchema::new("endpoint"),
    AttributeSchema::sensitive("ca_certificate"),
    AttributeSchema::new("master_version"),
];
const ENGINE_VERSIONS_ATTRIBUTES: &[AttributeSchema] = &[
    AttributeSchema::new("latest_version"),
    AttributeSchema::new("valid_versions"),
];
const NODE_POOL_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("version")];
const INSTANCE_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("internal_ip")];
const SERVICE_ACCOUNT_ATTRIBUTES: &[AttributeSchema] = &[
    AttributeSchema::new("email"),
    AttributeSchema::new("unique_id"),
];
const IAM_MEMBER_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("etag")];
const POOL_ATTRIBUTES: &[AttributeSchema] =
    &[AttributeSchema::new("workload_identity_pool_id")];
const POOL_PROVIDER_ATTRIBUTES: &[AttributeSchema] =
    &[AttributeSchema::new("workload_identity_pool_provider_id")];
const SQL_INSTANCE_ATTRIBUTES: &[AttributeSchema] = &[
    AttributeSchema::new("connection_name"),
    AttributeSchema::new("private_ip_address"),
];
const REDIS_ATTRIBUTES: &[AttributeSchema] = &[
    AttributeSchema::new("host"),
    AttributeSchema::new("port"),
    AttributeSchema::sensitive("auth_string"),
];
const FILESTORE_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("ip_address")];
const SECURITY_POLICY_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("fingerprint")];
const UID_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("uid")];
const SERVICE_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("cluster_ip")];
const INGRESS_ATTRIBUTES: &[AttributeSchema] = &[AttributeSchema::new("load_balancer_ip")];

/// Schema for a resource kind
pub fn schema_for(kind: ResourceKind) -> KindSchema {
    use ResourceKind as K;

    let (fields, attributes) = match kind {
        K::Network => (NETWORK, NO_ATTRIBUTES),
        K::Subnetwork => (SUBNETWORK, SUBNETWORK_ATTRIBUTES),
        K::Router => (ROUTER, NO_ATTRIBUTES),
        K::RouterNat => (ROUTER_NAT, NO_ATTRIBUTES),
        K::GlobalAddress => (GLOBAL_ADDRESS, GLOBAL_ADDRESS_ATTRIBUTES),
        K::ServiceNetworkingConnection => (SERVICE_NETWORKING_CONNECTION, PEERING_ATTRIBUTES),
        K::Firewall => (FIREWALL, NO_ATTRIBUTES),
        K::Cluster => (CLUSTER, CLUSTER_ATTRIBUTES),
        K::NodePool => (NODE_POOL, NODE_POOL_ATTRIBUTES),
        K::EngineVersions => (ENGINE_VERSIONS, ENGINE_VERSIONS_ATTRIBUTES),
        K::Instance => (INSTANCE, INSTANCE_ATTRIBUTES),
        K::ServiceAccount => (SERVICE_ACCOUNT, SERVICE_ACCOUNT_ATTRIBUTES),
        K::IamMember => (IAM_MEMBER, IAM_MEMBER_ATTRIBUTES),
        K::WorkloadIdentityPool => (WORKLOAD_IDENTITY_POOL, POOL_ATTRIBUTES),
        K::WorkloadIdentityPoolProvider => {
            (WORKLOAD_IDENTITY_POOL_PROVIDER, POOL_PROVIDER_ATTRIBUTES)
        }
        K::SqlDatabaseInstance => (SQL_DATABASE_INSTANCE, SQL_INSTANCE_ATTRIBUTES),
        K::SqlDatabase => (SQL_DATABASE, NO_ATTRIBUTES),
        K::SqlUser => (SQL_USER, NO_ATTRIBUTES),
        K::RedisInstance => (REDIS_INSTANCE, REDIS_ATTRIBUTES),
        K::FilestoreInstance => (FILESTORE_INSTANCE, FILESTORE_ATTRIBUTES),
        K::SecurityPolicy => (SECURITY_POLICY, SECURITY_POLICY_ATTRIBUTES),
        K::Namespace => (NAMESPACE, UID_ATTRIBUTES),
        K::Deployment => (DEPLOYMENT, UID_ATTRIBUTES),
        K::Service => (SERVICE, SERVICE_ATTRIBUTES),
        K::BackendConfig => (BACKEND_CONFIG, UID_ATTRIBUTES),
        K::Ingress => (INGRESS, INGRESS_ATTRIBUTES),
    };

    KindSchema {
        kind,
        fields,
        attributes,
    }
}
