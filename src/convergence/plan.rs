// Copyright (c) 2025 - Cowboy AI, Inc.
//! Whole-graph plan

use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

use super::action::{changed_fields, classify, Action};
use super::state::{RecordedResource, StateSnapshot};
use crate::domain::{Input, ResourceKey, ResourceSpec};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::graph::ResourceGraph;
use crate::output::{Resolution, ResolutionTable, REDACTED};
use crate::provider::{with_retry, ProviderError, ResourceProvider, RetryConfig};
use crate::secrets::SecretStore;

/// Marker for field values that depend on a resource still to be created
pub const KNOWN_AFTER_APPLY: &str = "(known after apply)";

/// Planned action for one resource
#[derive(Debug, Clone, Serialize)]
pub struct PlannedChange {
    pub key: ResourceKey,
    pub action: Action,
    pub layer: Option<String>,
    /// Desired fields as known at plan time, sensitive values redacted
    pub desired: BTreeMap<String, Value>,
    #[serde(skip)]
    attributes: Option<BTreeMap<String, Value>>,
}

impl PlannedChange {
    /// Attributes of the existing resource, for kept resources
    pub fn known_attributes(&self) -> Option<&BTreeMap<String, Value>> {
        self.attributes.as_ref()
    }
}

/// Actions for every declared and every orphaned resource
///
/// Declared resources come first in dependency order, followed by orphans
/// in deletion order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct Plan {
    pub changes: Vec<PlannedChange>,
}

impl Plan {
    /// Compute the plan of a graph against recorded state
    ///
    /// Walks the graph in dependency order, previewing outputs from recorded
    /// attributes. Kept resources whose record lacks sensitive attributes
    /// are read from the provider so their dependents can be compared, and
    /// lookups are queried whenever their inputs are already known.
    /// Existing resources that depend on a replaced resource are replaced
    /// as well.
    pub async fn build(
        graph: &ResourceGraph,
        snapshot: &StateSnapshot,
        provider: &dyn ResourceProvider,
        secrets: Arc<dyn SecretStore>,
        retry: &RetryConfig,
    ) -> ProvisionResult<Self> {
        let preview = ResolutionTable::new(secrets);
        let mut replaced: BTreeSet<ResourceKey> = BTreeSet::new();
        let mut changes = Vec::with_capacity(graph.len());

        for key in graph.topological_order() {
            let Some(node) = graph.node(&key) else {
                continue;
            };
            let recorded = snapshot.get(&key);
            let (known, unknown) = preview_fields(node.spec(), &preview);

            if key.kind().is_lookup() {
                let attributes = preview_lookup(&key, node.spec(), &preview, provider, retry).await;
                if let Some(current) = &attributes {
                    preview.publish(&key, current.clone())?;
                }
                debug!(resource = %key, "Planned lookup");
                changes.push(PlannedChange {
                    desired: display_fields(node.spec(), &known, &unknown),
                    key,
                    action: Action::Read,
                    layer: node.layer().map(str::to_string),
                    attributes,
                });
                continue;
            }

            let action = match recorded {
                None => Action::Create,
                Some(record) => {
                    let cause = graph
                        .dependencies(&key)
                        .into_iter()
                        .map(|(dependency, _)| dependency)
                        .find(|dependency| replaced.contains(dependency));
                    match cause {
                        Some(cause) => Action::ReplaceRequired {
                            changed: Vec::new(),
                            cascaded_from: Some(cause),
                        },
                        None => classify(&key, changed_fields(record, &known, &unknown)),
                    }
                }
            };

            let mut attributes = None;
            match (&action, recorded) {
                (Action::NoOp | Action::Update { .. }, Some(record)) => {
                    let current = current_attributes(record, provider, retry).await?;
                    preview.publish(&key, current.clone())?;
                    attributes = Some(current);
                }
                (Action::ReplaceRequired { .. }, _) => {
                    replaced.insert(key.clone());
                }
                _ => {}
            }

            debug!(resource = %key, action = %action, "Planned");
            changes.push(PlannedChange {
                desired: display_fields(node.spec(), &known, &unknown),
                key,
                action,
                layer: node.layer().map(str::to_string),
                attributes,
            });
        }

        for key in snapshot.deletion_order() {
            if graph.contains(&key) {
                continue;
            }
            let layer = snapshot.get(&key).and_then(|r| r.layer.clone());
            debug!(resource = %key, "Planned deletion of undeclared resource");
            changes.push(PlannedChange {
                key,
                action: Action::Delete,
                layer,
                desired: BTreeMap::new(),
                attributes: None,
            });
        }

        Ok(Self { changes })
    }

    pub fn change(&self, key: &ResourceKey) -> Option<&PlannedChange> {
        self.changes.iter().find(|c| &c.key == key)
    }

    pub fn action(&self, key: &ResourceKey) -> Option<&Action> {
        self.change(key).map(|c| &c.action)
    }

    pub fn has_changes(&self) -> bool {
        self.changes.iter().any(|c| c.action.is_mutation())
    }

    /// Changes with a given action label
    pub fn changes_by(&self, label: &str) -> Vec<&PlannedChange> {
        self.changes
            .iter()
            .filter(|c| c.action.label() == label)
            .collect()
    }

    /// Existing resources removed before the apply pass
    pub fn removals(&self) -> BTreeSet<ResourceKey> {
        self.changes
            .iter()
            .filter(|c| c.action.deletes_existing())
            .map(|c| c.key.clone())
            .collect()
    }

    /// Resources deleted and recreated
    pub fn replacements(&self) -> BTreeSet<ResourceKey> {
        self.changes
            .iter()
            .filter(|c| matches!(c.action, Action::ReplaceRequired { .. }))
            .map(|c| c.key.clone())
            .collect()
    }

    pub fn summary(&self) -> PlanSummary {
        let count = |label: &str| self.changes_by(label).len();
        PlanSummary {
            create: count("create"),
            update: count("update"),
            replace: count("replace"),
            delete: count("delete"),
            no_change: count("no-op"),
            read: count("read"),
        }
    }
}

/// Counts of planned actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PlanSummary {
    pub create: usize,
    pub update: usize,
    pub replace: usize,
    pub delete: usize,
    pub no_change: usize,
    /// Lookups queried
    pub read: usize,
}

impl fmt::Display for PlanSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} to create, {} to update, {} to replace, {} to delete, {} unchanged",
            self.create, self.update, self.replace, self.delete, self.no_change
        )?;
        if self.read > 0 {
            write!(f, ", {} to read", self.read)?;
        }
        Ok(())
    }
}

/// Split a spec into values known now and fields that are not
fn preview_fields(
    spec: &ResourceSpec,
    table: &ResolutionTable,
) -> (BTreeMap<String, Value>, BTreeSet<String>) {
    let mut known = BTreeMap::new();
    let mut unknown = BTreeSet::new();
    for (name, input) in spec.fields() {
        match input {
            Input::Literal(value) => {
                known.insert(name.to_string(), value.clone());
            }
            Input::Output(output) => match table.evaluate(output) {
                Resolution::Resolved(value) => {
                    known.insert(name.to_string(), value);
                }
                Resolution::Pending | Resolution::Failed(_) => {
                    unknown.insert(name.to_string());
                }
            },
        }
    }
    (known, unknown)
}

fn display_fields(
    spec: &ResourceSpec,
    known: &BTreeMap<String, Value>,
    unknown: &BTreeSet<String>,
) -> BTreeMap<String, Value> {
    let mut shown: BTreeMap<String, Value> = known
        .iter()
        .map(|(name, value)| {
            let value = if spec.is_sensitive(name) {
                Value::String(REDACTED.to_string())
            } else {
                value.clone()
            };
            (name.clone(), value)
        })
        .collect();
    for name in unknown {
        shown.insert(name.clone(), Value::String(KNOWN_AFTER_APPLY.to_string()));
    }
    shown
}

/// Current answer of a lookup whose inputs are known
///
/// A failed query leaves the answer unknown; the apply pass queries again
/// and fails the node there.
async fn preview_lookup(
    key: &ResourceKey,
    spec: &ResourceSpec,
    preview: &ResolutionTable,
    provider: &dyn ResourceProvider,
    retry: &RetryConfig,
) -> Option<BTreeMap<String, Value>> {
    let materialized = spec.materialize(preview).ok()?;
    match with_retry(retry, "lookup", || provider.lookup(key, &materialized)).await {
        Ok(remote) => Some(remote.attributes),
        Err(error) => {
            warn!(resource = %key, %error, "Lookup failed while planning");
            None
        }
    }
}

/// Recorded attributes, completed from the provider when some are missing
async fn current_attributes(
    record: &RecordedResource,
    provider: &dyn ResourceProvider,
    retry: &RetryConfig,
) -> ProvisionResult<BTreeMap<String, Value>> {
    if !record.has_unrecorded_attributes() {
        return Ok(record.attributes.clone());
    }

    match with_retry(retry, "read", || provider.read(&record.handle)).await {
        Ok(remote) => {
            let mut attributes = record.attributes.clone();
            attributes.extend(remote.attributes);
            Ok(attributes)
        }
        Err(ProviderError::NotFound(reason)) => {
            warn!(resource = %record.key, %reason, "Recorded resource not found; refresh state to recreate it");
            Ok(record.attributes.clone())
        }
        Err(error) => Err(ProvisionError::from_provider(&record.key, error)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{MaterializedSpec, ResourceKind};
    use crate::graph::GraphBuilder;
    use crate::provider::{RemoteHandle, SimulatedProvider};
    use crate::secrets::StaticSecrets;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn graph(cidr: &str) -> ResourceGraph {
        let mut builder = GraphBuilder::new();
        let vpc = builder
            .declare(
                "vpc",
                ResourceSpec::builder(ResourceKind::Network)
                    .set("auto_create_subnetworks", false)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let subnet = builder
            .declare(
                "private",
                ResourceSpec::builder(ResourceKind::Subnetwork)
                    .set("network", &vpc.id())
                    .set("region", "us-central1")
                    .set("ip_cidr_range", cidr)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .declare(
                "router",
                ResourceSpec::builder(ResourceKind::Router)
                    .set("network", &vpc.id())
                    .set("region", "us-central1")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder
            .declare(
                "nat",
                ResourceSpec::builder(ResourceKind::RouterNat)
                    .set("router", &subnet.name())
                    .set("region", "us-central1")
                    .set("source_subnetwork_ip_ranges_to_nat", "ALL_SUBNETWORKS_ALL_IP_RANGES")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        builder.freeze().unwrap()
    }

    fn key(kind: ResourceKind, name: &str) -> ResourceKey {
        ResourceKey::parse_name(kind, name).unwrap()
    }

    fn record(key: &ResourceKey, fields: Value, dependencies: Vec<ResourceKey>) -> RecordedResource {
        let fields = fields
            .as_object()
            .map(|o| o.iter().map(|(k, v)| (k.clone(), v.clone())).collect())
            .unwrap_or_default();
        let spec = MaterializedSpec::from_values(key.kind(), fields);
        let id = format!("projects/p/{}/{}", key.kind(), key.name());
        let attributes = BTreeMap::from([
            ("id".to_string(), json!(id)),
            ("name".to_string(), json!(key.name().as_str())),
            ("self_link".to_string(), json!(format!("https://x/{id}"))),
            ("gateway_address".to_string(), json!("10.0.32.1")),
        ]);
        RecordedResource::new(
            key.clone(),
            RemoteHandle {
                kind: key.kind(),
                id,
            },
            &spec,
            &attributes,
        )
        .with_dependencies(dependencies)
    }

    fn applied_state() -> StateSnapshot {
        let vpc = key(ResourceKind::Network, "vpc");
        let subnet = key(ResourceKind::Subnetwork, "private");
        let mut snapshot = StateSnapshot::new();
        snapshot.record(record(&vpc, json!({"auto_create_subnetworks": false}), vec![]));
        snapshot.record(record(
            &subnet,
            json!({
                "network": "projects/p/network/vpc",
                "region": "us-central1",
                "ip_cidr_range": "10.0.32.0/19"
            }),
            vec![vpc.clone()],
        ));
        snapshot.record(record(
            &key(ResourceKind::RouterNat, "nat"),
            json!({
                "router": "private",
                "region": "us-central1",
                "source_subnetwork_ip_ranges_to_nat": "ALL_SUBNETWORKS_ALL_IP_RANGES"
            }),
            vec![subnet],
        ));
        snapshot.record(record(
            &key(ResourceKind::Router, "router"),
            json!({"network": "projects/p/network/vpc", "region": "us-central1"}),
            vec![vpc],
        ));
        snapshot
    }

    async fn plan(graph: &ResourceGraph, snapshot: &StateSnapshot) -> Plan {
        let provider = SimulatedProvider::new("sim");
        Plan::build(
            graph,
            snapshot,
            &provider,
            Arc::new(StaticSecrets::new()),
            &RetryConfig::default(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_fresh_state_plans_creates_with_unknown_values() {
        let graph = graph("10.0.32.0/19");
        let plan = plan(&graph, &StateSnapshot::new()).await;

        assert_eq!(plan.summary().create, 4);
        let subnet = plan.change(&key(ResourceKind::Subnetwork, "private")).unwrap();
        assert_eq!(subnet.desired["network"], json!(KNOWN_AFTER_APPLY));
    }

    #[tokio::test]
    async fn test_unchanged_state_plans_nothing() {
        let graph = graph("10.0.32.0/19");
        let plan = plan(&graph, &applied_state()).await;

        assert!(!plan.has_changes(), "{}", plan.summary());
        assert_eq!(plan.summary().no_change, 4);
    }

    #[tokio::test]
    async fn test_replacement_cascades_to_existing_dependents() {
        let graph = graph("10.0.96.0/19");
        let plan = plan(&graph, &applied_state()).await;

        assert_eq!(
            plan.action(&key(ResourceKind::Subnetwork, "private")),
            Some(&Action::ReplaceRequired {
                changed: vec!["ip_cidr_range".into()],
                cascaded_from: None,
            })
        );
        assert_eq!(
            plan.action(&key(ResourceKind::RouterNat, "nat")),
            Some(&Action::ReplaceRequired {
                changed: vec![],
                cascaded_from: Some(key(ResourceKind::Subnetwork, "private")),
            })
        );
        assert_eq!(plan.action(&key(ResourceKind::Router, "router")), Some(&Action::NoOp));
        assert_eq!(
            plan.summary().to_string(),
            "0 to create, 0 to update, 2 to replace, 0 to delete, 2 unchanged"
        );
    }

    #[tokio::test]
    async fn test_lookup_plans_read_and_feeds_dependents() {
        let mut builder = GraphBuilder::new();
        let versions = builder
            .declare(
                "versions",
                ResourceSpec::builder(ResourceKind::EngineVersions)
                    .set("location", "europe-west1")
                    .set("release_channel", "REGULAR")
                    .set("version_prefix", "1.29")
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let latest: crate::output::Output<String> = versions.output("latest_version");
        builder
            .declare(
                "cluster",
                ResourceSpec::builder(ResourceKind::Cluster)
                    .set("location", "europe-west1")
                    .set("network", "projects/p/network/vpc")
                    .set("subnetwork", "projects/p/subnetwork/private")
                    .set("min_master_version", &latest)
                    .build()
                    .unwrap(),
            )
            .unwrap();
        let graph = builder.freeze().unwrap();

        let provider = SimulatedProvider::new("sim");
        let plan = Plan::build(
            &graph,
            &StateSnapshot::new(),
            &provider,
            Arc::new(StaticSecrets::new()),
            &RetryConfig::default(),
        )
        .await
        .unwrap();

        assert_eq!(plan.action(&key(ResourceKind::EngineVersions, "versions")), Some(&Action::Read));
        let cluster = plan.change(&key(ResourceKind::Cluster, "cluster")).unwrap();
        assert_eq!(cluster.desired["min_master_version"], json!("1.29.6-gke.1038"));
        assert_eq!(
            plan.summary().to_string(),
            "1 to create, 0 to update, 0 to replace, 0 to delete, 0 unchanged, 1 to read"
        );
        assert!(provider.mutating_calls().await.is_empty());
        assert_eq!(provider.calls().await.len(), 1);
    }

    #[tokio::test]
    async fn test_orphans_are_deleted() {
        let graph = graph("10.0.32.0/19");
        let mut snapshot = applied_state();
        let orphan = key(ResourceKind::Firewall, "old-rule");
        snapshot.record(record(&orphan, json!({}), vec![]));

        let plan = plan(&graph, &snapshot).await;
        assert_eq!(plan.action(&orphan), Some(&Action::Delete));
        assert_eq!(plan.removals(), BTreeSet::from([orphan]));
    }
}
