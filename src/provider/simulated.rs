// Copyright (c) 2025 - Cowboy AI, Inc.
//! In-memory resource provider
//!
//! [`SimulatedProvider`] behaves like a cloud control API: requests return
//! operation tokens, operations complete after a configurable latency, and
//! every resource gets deterministic provider-assigned attributes. Faults can
//! be injected per resource, and every call is logged so tests can assert on
//! exactly which remote mutations a run issued.
//!
//! It serves workload objects too; those require a `cluster_access`
//! document naming the control-plane endpoint, as a real orchestrator would.
//!
//! Lookups answer from a release catalogue: each channel lists its
//! control-plane versions in publication order, newest last.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::debug;

use super::{
    OperationStatus, OperationToken, ProviderError, RemoteHandle, RemoteState, ResourceProvider,
};
use crate::domain::{fingerprint, schema_for, Cidr, MaterializedSpec, ResourceKey, ResourceKind};

/// Fault injected for one resource
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// `create` is refused outright
    RejectCreate(String),
    /// Create, update and delete operations are accepted but end in failure;
    /// lookups are refused
    FailOperation(String),
    /// The next `n` mutating requests fail with a transient error
    TransientErrors(u32),
    /// `update` reports a concurrent external change
    ConflictOnUpdate(String),
    /// Operations stay running forever
    NeverCompletes,
}

/// Provider method recorded in the call log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CallMethod {
    Create,
    Update,
    Delete,
    Poll,
    Read,
}

impl CallMethod {
    /// Whether the call changes remote state
    pub fn is_mutating(&self) -> bool {
        matches!(self, Self::Create | Self::Update | Self::Delete)
    }
}

/// One logged provider call
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProviderCall {
    pub method: CallMethod,
    pub resource: ResourceKey,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OperationKind {
    Create,
    Update,
    Delete,
}

#[derive(Debug)]
struct SimResource {
    key: ResourceKey,
    fields: BTreeMap<String, Value>,
    attributes: BTreeMap<String, Value>,
    ready: bool,
}

#[derive(Debug)]
struct SimOperation {
    handle: String,
    key: ResourceKey,
    kind: OperationKind,
    ready_at: Instant,
    pending_fields: Option<BTreeMap<String, Value>>,
}

#[derive(Debug, Default)]
struct SimState {
    resources: HashMap<String, SimResource>,
    operations: HashMap<String, SimOperation>,
    calls: Vec<ProviderCall>,
    faults: HashMap<ResourceKey, Fault>,
    transient_left: HashMap<ResourceKey, u32>,
    latency: HashMap<ResourceKey, Duration>,
    releases: BTreeMap<String, Vec<String>>,
    serial: u64,
}

impl SimState {
    fn record(&mut self, method: CallMethod, resource: &ResourceKey) {
        self.calls.push(ProviderCall {
            method,
            resource: resource.clone(),
            at: Utc::now(),
        });
    }

    fn take_transient(&mut self, key: &ResourceKey) -> Result<(), ProviderError> {
        match self.transient_left.get_mut(key) {
            Some(left) if *left > 0 => {
                *left -= 1;
                Err(ProviderError::Transient(format!("rate limit exceeded for {key}")))
            }
            _ => Ok(()),
        }
    }

    fn next_serial(&mut self) -> u64 {
        self.serial += 1;
        self.serial
    }
}

fn default_releases() -> BTreeMap<String, Vec<String>> {
    let channel = |versions: &[&str]| versions.iter().map(|v| v.to_string()).collect();
    BTreeMap::from([
        (
            "STABLE".to_string(),
            channel(&["1.28.9-gke.1000", "1.29.4-gke.1043"]),
        ),
        (
            "REGULAR".to_string(),
            channel(&["1.28.9-gke.1000", "1.29.4-gke.1043", "1.29.6-gke.1038", "1.30.2-gke.1023"]),
        ),
        (
            "RAPID".to_string(),
            channel(&["1.29.6-gke.1038", "1.30.3-gke.1225", "1.31.0-gke.1058"]),
        ),
    ])
}

/// Whether `version` belongs to the minor (or patch) line `prefix`
fn in_version_line(version: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || version == prefix
        || version
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('.') || rest.starts_with('-'))
}

/// Deterministic in-memory provider for both planes
#[derive(Debug)]
pub struct SimulatedProvider {
    name: String,
    project: String,
    default_latency: Duration,
    state: Mutex<SimState>,
}

impl SimulatedProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            project: "simulated-project".to_string(),
            default_latency: Duration::ZERO,
            state: Mutex::new(SimState {
                releases: default_releases(),
                ..SimState::default()
            }),
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Latency applied to operations of resources without their own
    pub fn with_default_latency(mut self, latency: Duration) -> Self {
        self.default_latency = latency;
        self
    }

    /// Latency of operations on one resource
    pub fn with_latency(mut self, key: &ResourceKey, latency: Duration) -> Self {
        self.state.get_mut().latency.insert(key.clone(), latency);
        self
    }

    /// Append a control-plane version to a release channel
    pub fn with_release(mut self, channel: &str, version: &str) -> Self {
        Self::store_release(self.state.get_mut(), channel, version);
        self
    }

    /// Publish a new release while the provider is running
    pub async fn publish_release(&self, channel: &str, version: &str) {
        Self::store_release(&mut *self.state.lock().await, channel, version);
    }

    pub fn with_fault(mut self, key: &ResourceKey, fault: Fault) -> Self {
        Self::store_fault(self.state.get_mut(), key, fault);
        self
    }

    /// Inject a fault into a running provider
    pub async fn inject(&self, key: &ResourceKey, fault: Fault) {
        Self::store_fault(&mut *self.state.lock().await, key, fault);
    }

    pub async fn clear_faults(&self) {
        let mut state = self.state.lock().await;
        state.faults.clear();
        state.transient_left.clear();
    }

    /// Full call log
    pub async fn calls(&self) -> Vec<ProviderCall> {
        self.state.lock().await.calls.clone()
    }

    /// Calls that changed remote state
    pub async fn mutating_calls(&self) -> Vec<ProviderCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| c.method.is_mutating())
            .cloned()
            .collect()
    }

    pub async fn calls_for(&self, key: &ResourceKey) -> Vec<ProviderCall> {
        self.state
            .lock()
            .await
            .calls
            .iter()
            .filter(|c| &c.resource == key)
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.state.lock().await.calls.clear();
    }

    /// Whether a resource currently exists remotely
    pub async fn contains(&self, key: &ResourceKey) -> bool {
        self.state
            .lock()
            .await
            .resources
            .values()
            .any(|r| &r.key == key && r.ready)
    }

    pub async fn resource_count(&self) -> usize {
        self.state
            .lock()
            .await
            .resources
            .values()
            .filter(|r| r.ready)
            .count()
    }

    /// Current remote fields of a resource
    pub async fn fields_of(&self, key: &ResourceKey) -> Option<BTreeMap<String, Value>> {
        self.state
            .lock()
            .await
            .resources
            .values()
            .find(|r| &r.key == key && r.ready)
            .map(|r| r.fields.clone())
    }

    /// Delete a resource behind the engine's back
    pub async fn remove_externally(&self, key: &ResourceKey) -> bool {
        let mut state = self.state.lock().await;
        let before = state.resources.len();
        state.resources.retain(|_, r| &r.key != key);
        state.resources.len() != before
    }

    /// Change a remote field behind the engine's back
    pub async fn mutate_externally(&self, key: &ResourceKey, field: &str, value: Value) -> bool {
        let mut state = self.state.lock().await;
        match state.resources.values_mut().find(|r| &r.key == key) {
            Some(resource) => {
                resource.fields.insert(field.to_string(), value);
                true
            }
            None => false,
        }
    }

    fn store_fault(state: &mut SimState, key: &ResourceKey, fault: Fault) {
        match fault {
            Fault::TransientErrors(n) => {
                state.transient_left.insert(key.clone(), n);
            }
            other => {
                state.faults.insert(key.clone(), other);
            }
        }
    }

    fn store_release(state: &mut SimState, channel: &str, version: &str) {
        state
            .releases
            .entry(channel.to_string())
            .or_default()
            .push(version.to_string());
    }

    fn handle_id(&self, key: &ResourceKey) -> String {
        format!("projects/{}/{}/{}", self.project, key.kind(), key.name())
    }

    fn start_operation(
        &self,
        state: &mut SimState,
        key: &ResourceKey,
        handle: String,
        kind: OperationKind,
        pending_fields: Option<BTreeMap<String, Value>>,
    ) -> OperationToken {
        let latency = state
            .latency
            .get(key)
            .copied()
            .unwrap_or(self.default_latency);
        let id = format!("operation-{}", state.next_serial());
        state.operations.insert(
            id.clone(),
            SimOperation {
                handle,
                key: key.clone(),
                kind,
                ready_at: Instant::now() + latency,
                pending_fields,
            },
        );
        OperationToken {
            kind: key.kind(),
            id,
        }
    }

    fn synthesize(
        &self,
        key: &ResourceKey,
        fields: &BTreeMap<String, Value>,
        serial: u64,
    ) -> BTreeMap<String, Value> {
        let name = key.name().as_str();
        let octet = serial % 250 + 2;
        let text = |field: &str| fields.get(field).and_then(Value::as_str).map(str::to_string);

        let mut attributes = self.identity(key);

        let specific: Vec<(&str, Value)> = match key.kind() {
            ResourceKind::Subnetwork => {
                let gateway = text("ip_cidr_range")
                    .and_then(|c| Cidr::new(c).ok())
                    .and_then(|c| c.host(0))
                    .map(|ip| ip.to_string());
                vec![("gateway_address", json!(gateway))]
            }
            ResourceKind::GlobalAddress => vec![("address", json!(format!("10.100.{octet}.0")))],
            ResourceKind::ServiceNetworkingConnection => {
                vec![("peering", json!("servicenetworking-googleapis-com"))]
            }
            ResourceKind::Cluster => vec![
                ("endpoint", json!(format!("34.118.{octet}.10"))),
                (
                    "ca_certificate",
                    json!(format!("LS0tLS1CRUdJTiBDRVJUSUZJQ0FURS0tLS0t{}", &fingerprint(&json!(name))[..16])),
                ),
                (
                    "master_version",
                    json!(text("min_master_version").unwrap_or_else(|| "1.29.4-gke.1043".to_string())),
                ),
            ],
            ResourceKind::NodePool => vec![(
                "version",
                json!(text("version").unwrap_or_else(|| "1.29.4-gke.1043".to_string())),
            )],
            ResourceKind::Instance => vec![("internal_ip", json!(format!("10.0.32.{octet}")))],
            ResourceKind::ServiceAccount => {
                let account = text("account_id").unwrap_or_else(|| name.to_string());
                vec![
                    (
                        "email",
                        json!(format!("{account}@{}.iam.gserviceaccount.com", self.project)),
                    ),
                    ("unique_id", json!(format!("{}", 100_000_000 + serial))),
                ]
            }
            ResourceKind::IamMember => vec![("etag", json!(format!("BwY{serial:08}")))],
            ResourceKind::WorkloadIdentityPool => vec![("workload_identity_pool_id", json!(name))],
            ResourceKind::WorkloadIdentityPoolProvider => {
                vec![("workload_identity_pool_provider_id", json!(name))]
            }
            ResourceKind::SqlDatabaseInstance => {
                let region = text("region").unwrap_or_default();
                vec![
                    (
                        "connection_name",
                        json!(format!("{}:{region}:{name}", self.project)),
                    ),
                    ("private_ip_address", json!(format!("10.100.0.{octet}"))),
                ]
            }
            ResourceKind::RedisInstance => vec![
                ("host", json!(format!("10.100.1.{octet}"))),
                ("port", json!(6379)),
                ("auth_string", json!(fingerprint(&json!([name, serial])))),
            ],
            ResourceKind::FilestoreInstance => {
                let ip = text("reserved_ip_range")
                    .and_then(|c| Cidr::new(c).ok())
                    .and_then(|c| c.host(1))
                    .map(|ip| ip.to_string())
                    .unwrap_or_else(|| format!("10.2.{octet}.2"));
                vec![("ip_address", json!(ip))]
            }
            ResourceKind::SecurityPolicy => {
                let rules = fields.get("rules").cloned().unwrap_or(Value::Null);
                vec![("fingerprint", json!(&fingerprint(&rules)[..12]))]
            }
            ResourceKind::Namespace | ResourceKind::Deployment | ResourceKind::BackendConfig => {
                vec![("uid", json!(uuid::Uuid::now_v7().to_string()))]
            }
            ResourceKind::Service => vec![("cluster_ip", json!(format!("10.3.0.{octet}")))],
            ResourceKind::Ingress => vec![("load_balancer_ip", json!(format!("35.190.{octet}.1")))],
            ResourceKind::Network
            | ResourceKind::Router
            | ResourceKind::RouterNat
            | ResourceKind::Firewall
            | ResourceKind::SqlDatabase
            | ResourceKind::SqlUser
            | ResourceKind::EngineVersions => vec![],
        };

        attributes.extend(specific.into_iter().map(|(k, v)| (k.to_string(), v)));
        attributes
    }

    /// Attributes every kind publishes
    fn identity(&self, key: &ResourceKey) -> BTreeMap<String, Value> {
        let id = self.handle_id(key);
        BTreeMap::from([
            ("self_link".to_string(), json!(format!("https://simulated.local/{id}"))),
            ("id".to_string(), json!(id)),
            ("name".to_string(), json!(key.name().as_str())),
        ])
    }

    /// Versions of the requested channel and line, oldest first
    fn engine_versions(
        state: &SimState,
        spec: &MaterializedSpec,
    ) -> Result<Vec<String>, ProviderError> {
        let text = |field: &str| spec.get(field).and_then(Value::as_str).unwrap_or_default();
        let channel = text("release_channel");
        let prefix = text("version_prefix");

        let Some(released) = state.releases.get(channel) else {
            return Err(ProviderError::NotFound(format!("release channel {channel:?}")));
        };
        let valid: Vec<String> = released
            .iter()
            .filter(|version| in_version_line(version, prefix))
            .cloned()
            .collect();
        if valid.is_empty() {
            return Err(ProviderError::NotFound(format!(
                "no {channel} release in version line {prefix}"
            )));
        }
        Ok(valid)
    }

    fn check_cluster_access(spec: &MaterializedSpec) -> Result<(), ProviderError> {
        if !spec.kind().is_workload() {
            return Ok(());
        }
        let endpoint = spec
            .get("cluster_access")
            .and_then(|access| access.get("endpoint"))
            .and_then(Value::as_str)
            .filter(|e| !e.is_empty());
        match endpoint {
            Some(_) => Ok(()),
            None => Err(ProviderError::Rejected(format!(
                "{} objects need a control-plane endpoint",
                spec.kind()
            ))),
        }
    }

    fn check_immutable(
        key: &ResourceKey,
        current: &BTreeMap<String, Value>,
        desired: &BTreeMap<String, Value>,
    ) -> Result<(), ProviderError> {
        for field in schema_for(key.kind()).fields.iter().filter(|f| !f.mutable) {
            if current.get(field.name) != desired.get(field.name) {
                return Err(ProviderError::Rejected(format!(
                    "field {} of {key} cannot be changed in place",
                    field.name
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ResourceProvider for SimulatedProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn create(
        &self,
        key: &ResourceKey,
        spec: &MaterializedSpec,
    ) -> Result<(RemoteHandle, OperationToken), ProviderError> {
        let mut state = self.state.lock().await;
        state.record(CallMethod::Create, key);
        state.take_transient(key)?;

        if let Some(Fault::RejectCreate(reason)) = state.faults.get(key) {
            return Err(ProviderError::Rejected(reason.clone()));
        }
        if key.kind().is_lookup() {
            return Err(ProviderError::Rejected(format!("{key} is read-only")));
        }
        Self::check_cluster_access(spec)?;

        let handle = self.handle_id(key);
        if state.resources.contains_key(&handle) {
            return Err(ProviderError::Conflict(format!("{key} already exists")));
        }

        let serial = state.next_serial();
        let attributes = self.synthesize(key, spec.fields(), serial);
        state.resources.insert(
            handle.clone(),
            SimResource {
                key: key.clone(),
                fields: spec.fields().clone(),
                attributes,
                ready: false,
            },
        );
        let token = self.start_operation(&mut state, key, handle.clone(), OperationKind::Create, None);
        debug!(provider = %self.name, resource = %key, %token, "Create accepted");

        Ok((
            RemoteHandle {
                kind: key.kind(),
                id: handle,
            },
            token,
        ))
    }

    async fn poll(&self, token: &OperationToken) -> Result<OperationStatus, ProviderError> {
        let mut state = self.state.lock().await;
        let (key, ready_at) = match state.operations.get(&token.id) {
            Some(op) => (op.key.clone(), op.ready_at),
            None => return Err(ProviderError::NotFound(format!("operation {token}"))),
        };
        state.record(CallMethod::Poll, &key);

        match state.faults.get(&key) {
            Some(Fault::NeverCompletes) => return Ok(OperationStatus::Running),
            _ if Instant::now() < ready_at => return Ok(OperationStatus::Running),
            _ => {}
        }

        let Some(op) = state.operations.remove(&token.id) else {
            return Err(ProviderError::NotFound(format!("operation {token}")));
        };

        if let Some(Fault::FailOperation(reason)) = state.faults.get(&key).cloned() {
            if op.kind == OperationKind::Create {
                state.resources.remove(&op.handle);
            }
            return Ok(OperationStatus::Failed(ProviderError::Rejected(reason)));
        }

        let status = match op.kind {
            OperationKind::Create => match state.resources.get_mut(&op.handle) {
                Some(resource) => {
                    resource.ready = true;
                    OperationStatus::Succeeded {
                        attributes: resource.attributes.clone(),
                    }
                }
                None => OperationStatus::Failed(ProviderError::NotFound(op.handle)),
            },
            OperationKind::Update => {
                let serial = state.next_serial();
                match state.resources.get(&op.handle) {
                    Some(resource) => {
                        let fields = op.pending_fields.unwrap_or_else(|| resource.fields.clone());
                        let mut attributes = self.synthesize(&key, &fields, serial);
                        // Identity survives an in-place update.
                        for stable in ["id", "uid", "unique_id", "auth_string", "endpoint"] {
                            if let Some(v) = resource.attributes.get(stable) {
                                attributes.insert(stable.to_string(), v.clone());
                            }
                        }
                        if let Some(resource) = state.resources.get_mut(&op.handle) {
                            resource.fields = fields;
                            resource.attributes = attributes.clone();
                        }
                        OperationStatus::Succeeded { attributes }
                    }
                    None => OperationStatus::Failed(ProviderError::NotFound(op.handle)),
                }
            }
            OperationKind::Delete => {
                state.resources.remove(&op.handle);
                OperationStatus::Succeeded {
                    attributes: BTreeMap::new(),
                }
            }
        };
        Ok(status)
    }

    async fn update(
        &self,
        handle: &RemoteHandle,
        spec: &MaterializedSpec,
    ) -> Result<OperationToken, ProviderError> {
        let mut state = self.state.lock().await;
        let (key, current) = match state.resources.get(&handle.id).filter(|r| r.ready) {
            Some(resource) => (resource.key.clone(), resource.fields.clone()),
            None => return Err(ProviderError::NotFound(handle.to_string())),
        };
        state.record(CallMethod::Update, &key);
        state.take_transient(&key)?;

        if let Some(Fault::ConflictOnUpdate(reason)) = state.faults.get(&key) {
            return Err(ProviderError::Conflict(reason.clone()));
        }
        Self::check_cluster_access(spec)?;
        Self::check_immutable(&key, &current, spec.fields())?;

        Ok(self.start_operation(
            &mut state,
            &key,
            handle.id.clone(),
            OperationKind::Update,
            Some(spec.fields().clone()),
        ))
    }

    async fn delete(&self, handle: &RemoteHandle) -> Result<OperationToken, ProviderError> {
        let mut state = self.state.lock().await;
        let key = match state.resources.get(&handle.id) {
            Some(resource) => resource.key.clone(),
            None => return Err(ProviderError::NotFound(handle.to_string())),
        };
        state.record(CallMethod::Delete, &key);
        state.take_transient(&key)?;

        Ok(self.start_operation(&mut state, &key, handle.id.clone(), OperationKind::Delete, None))
    }

    async fn read(&self, handle: &RemoteHandle) -> Result<RemoteState, ProviderError> {
        let mut state = self.state.lock().await;
        let found = state
            .resources
            .get(&handle.id)
            .filter(|r| r.ready)
            .map(|r| {
                (
                    r.key.clone(),
                    RemoteState {
                        fields: r.fields.clone(),
                        attributes: r.attributes.clone(),
                    },
                )
            });

        match found {
            Some((key, remote)) => {
                state.record(CallMethod::Read, &key);
                Ok(remote)
            }
            None => Err(ProviderError::NotFound(handle.to_string())),
        }
    }

    async fn lookup(
        &self,
        key: &ResourceKey,
        spec: &MaterializedSpec,
    ) -> Result<RemoteState, ProviderError> {
        let mut state = self.state.lock().await;
        state.record(CallMethod::Read, key);
        state.take_transient(key)?;

        if !key.kind().is_lookup() {
            return Err(ProviderError::Rejected(format!("{} is not a lookup kind", key.kind())));
        }
        if let Some(Fault::FailOperation(reason)) = state.faults.get(key) {
            return Err(ProviderError::Rejected(reason.clone()));
        }

        let valid = Self::engine_versions(&state, spec)?;
        let mut attributes = self.identity(key);
        attributes.insert("latest_version".to_string(), json!(valid.last()));
        attributes.insert("valid_versions".to_string(), json!(valid));
        debug!(provider = %self.name, resource = %key, latest = ?valid.last(), "Lookup answered");

        Ok(RemoteState {
            fields: spec.fields().clone(),
            attributes,
        })
    }
}
