// Copyright (c) 2025 - Cowboy AI, Inc.
//! Declaration-phase graph builder

use petgraph::algo::{all_simple_paths, has_path_connecting, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{BTreeMap, HashMap};
use tracing::debug;

use super::resource_graph::{ResourceGraph, ResourceNode};
use super::{EdgeKind, GraphError};
use crate::domain::{schema_for, ResourceKey, ResourceSpec};
use crate::output::{AttributeRef, Output, UntypedOutput};

/// Handle to a declared resource, used to read its outputs
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceRef {
    key: ResourceKey,
}

impl ResourceRef {
    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    /// A provider-assigned attribute of this resource
    pub fn output<T>(&self, attribute: &str) -> Output<T> {
        Output::reference(self.key.clone(), attribute)
    }

    pub fn id(&self) -> Output<String> {
        self.output("id")
    }

    pub fn name(&self) -> Output<String> {
        self.output("name")
    }

    pub fn self_link(&self) -> Output<String> {
        self.output("self_link")
    }
}

/// Reference to a resource that has not been declared yet
#[derive(Debug, Clone)]
struct PendingEdge {
    dependency: ResourceKey,
    dependent: NodeIndex,
    kind: EdgeKind,
}

/// Builds a resource graph during the declaration phase
///
/// Declarations may arrive in any order: a spec may reference a resource by
/// key before that resource is declared. Every edge insertion is checked for
/// cycles immediately; unresolved references are reported by
/// [`validate`](Self::validate) and [`freeze`](Self::freeze).
#[derive(Debug, Default)]
pub struct GraphBuilder {
    graph: DiGraph<ResourceNode, EdgeKind>,
    index: HashMap<ResourceKey, NodeIndex>,
    pending: Vec<PendingEdge>,
    exports: BTreeMap<String, UntypedOutput>,
    current_layer: Option<String>,
    layer_order: Vec<String>,
}

impl GraphBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Label subsequent declarations with a composition layer
    pub fn enter_layer(&mut self, layer: &str) {
        if !self.layer_order.iter().any(|l| l == layer) {
            self.layer_order.push(layer.to_string());
        }
        self.current_layer = Some(layer.to_string());
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Declare a resource; data edges are inferred from its spec
    pub fn declare(&mut self, name: &str, spec: ResourceSpec) -> Result<ResourceRef, GraphError> {
        let key = ResourceKey::parse_name(spec.kind(), name)?;
        if self.index.contains_key(&key) {
            return Err(GraphError::DuplicateResource(key));
        }

        for reference in spec.attribute_refs() {
            check_attribute(&reference, &key.to_string())?;
        }

        let owners = spec.referenced_owners();
        if owners.contains(&key) {
            return Err(GraphError::CycleDetected {
                path: vec![key.clone(), key],
            });
        }

        let incoming: Vec<NodeIndex> = owners
            .iter()
            .filter_map(|owner| self.index.get(owner).copied())
            .collect();
        let outgoing: Vec<PendingEdge> = self
            .pending
            .iter()
            .filter(|p| p.dependency == key)
            .cloned()
            .collect();

        // A new node closes a cycle when one of its waiting dependents
        // already reaches one of its dependencies.
        for waiting in &outgoing {
            for &dependency in &incoming {
                if let Some(path) = self.find_path(waiting.dependent, dependency) {
                    let mut cycle = vec![key.clone()];
                    cycle.extend(path.into_iter().map(|i| self.graph[i].key().clone()));
                    cycle.push(key.clone());
                    return Err(GraphError::CycleDetected { path: cycle });
                }
            }
        }

        let node = ResourceNode::new(key.clone(), spec, self.current_layer.clone());
        let index = self.graph.add_node(node);
        self.index.insert(key.clone(), index);

        for dependency in incoming {
            self.insert_edge(dependency, index, EdgeKind::Data);
        }
        let undeclared: Vec<ResourceKey> = owners
            .into_iter()
            .filter(|o| !self.index.contains_key(o))
            .collect();
        self.pending
            .extend(undeclared.into_iter().map(|dependency| PendingEdge {
                dependency,
                dependent: index,
                kind: EdgeKind::Data,
            }));
        self.pending.retain(|p| p.dependency != key);
        for waiting in outgoing {
            self.insert_edge(index, waiting.dependent, waiting.kind);
        }

        debug!(resource = %key, layer = ?self.current_layer, "Declared resource");
        Ok(ResourceRef { key })
    }

    /// Declare an ordering edge: `dependent` waits for `dependency`
    ///
    /// The dependency may be declared later.
    pub fn depends_on(
        &mut self,
        dependent: &ResourceRef,
        dependency: &ResourceKey,
    ) -> Result<(), GraphError> {
        let to = self.index.get(&dependent.key).copied().ok_or_else(|| {
            GraphError::UnknownReference {
                missing: dependent.key.clone(),
                referenced_by: "ordering constraint".to_string(),
            }
        })?;

        let Some(&from) = self.index.get(dependency) else {
            self.pending.push(PendingEdge {
                dependency: dependency.clone(),
                dependent: to,
                kind: EdgeKind::Ordering,
            });
            return Ok(());
        };

        if let Some(path) = self.find_path(to, from) {
            let mut cycle = vec![dependency.clone()];
            cycle.extend(path.into_iter().map(|i| self.graph[i].key().clone()));
            return Err(GraphError::CycleDetected { path: cycle });
        }

        self.insert_edge(from, to, EdgeKind::Ordering);
        Ok(())
    }

    /// Publish an output under a flat export name
    pub fn export<T>(&mut self, name: &str, output: &Output<T>) -> Result<(), GraphError> {
        if self.exports.contains_key(name) {
            return Err(GraphError::DuplicateExport(name.to_string()));
        }
        for reference in output.untyped().attribute_refs() {
            check_attribute(&reference, &format!("export {name}"))?;
        }
        self.exports
            .insert(name.to_string(), output.untyped().clone());
        Ok(())
    }

    /// Check that every reference resolves and the graph is acyclic
    pub fn validate(&self) -> Result<(), GraphError> {
        if let Some(p) = self.pending.first() {
            return Err(GraphError::UnknownReference {
                missing: p.dependency.clone(),
                referenced_by: self.graph[p.dependent].key().to_string(),
            });
        }

        for (name, output) in &self.exports {
            if let Some(missing) = output.owners().into_iter().find(|o| !self.contains(o)) {
                return Err(GraphError::UnknownReference {
                    missing,
                    referenced_by: format!("export {name}"),
                });
            }
        }

        toposort(&self.graph, None).map_err(|cycle| GraphError::CycleDetected {
            path: vec![self.graph[cycle.node_id()].key().clone()],
        })?;
        Ok(())
    }

    /// Validate and freeze; nothing can be added afterwards
    pub fn freeze(self) -> Result<ResourceGraph, GraphError> {
        self.validate()?;
        Ok(ResourceGraph::new(
            self.graph,
            self.index,
            self.exports,
            self.layer_order,
        ))
    }

    fn insert_edge(&mut self, from: NodeIndex, to: NodeIndex, kind: EdgeKind) {
        match self.graph.find_edge(from, to) {
            Some(edge) if kind == EdgeKind::Data => self.graph[edge] = EdgeKind::Data,
            Some(_) => {}
            None => {
                self.graph.add_edge(from, to, kind);
            }
        }
    }

    fn find_path(&self, from: NodeIndex, to: NodeIndex) -> Option<Vec<NodeIndex>> {
        if from == to {
            return Some(vec![from]);
        }
        if !has_path_connecting(&self.graph, from, to, None) {
            return None;
        }
        all_simple_paths::<Vec<_>, _>(&self.graph, from, to, 0, None).next()
    }
}

fn check_attribute(reference: &AttributeRef, referenced_by: &str) -> Result<(), GraphError> {
    let schema = schema_for(reference.owner.kind());
    if schema.attribute(&reference.attribute).is_none() {
        return Err(GraphError::UnknownAttribute {
            reference: reference.clone(),
            referenced_by: referenced_by.to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::ResourceKind;
    use pretty_assertions::assert_eq;

    fn network() -> ResourceSpec {
        ResourceSpec::builder(ResourceKind::Network)
            .set("auto_create_subnetworks", false)
            .build()
            .unwrap()
    }

    fn subnet(network: &Output<String>, cidr: &str) -> ResourceSpec {
        ResourceSpec::builder(ResourceKind::Subnetwork)
            .set("network", network)
            .set("region", "us-central1")
            .set("ip_cidr_range", cidr)
            .build()
            .unwrap()
    }

    fn router(network: impl Into<crate::domain::Input>) -> ResourceSpec {
        ResourceSpec::builder(ResourceKind::Router)
            .set("network", network)
            .set("region", "us-central1")
            .build()
            .unwrap()
    }

    #[test]
    fn test_data_edges_are_inferred() {
        let mut builder = GraphBuilder::new();
        let vpc = builder.declare("vpc", network()).unwrap();
        let private = builder.declare("private", subnet(&vpc.id(), "10.0.32.0/19")).unwrap();

        let graph = builder.freeze().unwrap();
        assert_eq!(
            graph.dependencies(private.key()),
            vec![(vpc.key().clone(), EdgeKind::Data)]
        );
    }

    #[test]
    fn test_out_of_order_declaration() {
        let vpc_key = ResourceKey::parse_name(ResourceKind::Network, "vpc").unwrap();
        let vpc_id: Output<String> = Output::reference(vpc_key.clone(), "id");

        let mut builder = GraphBuilder::new();
        builder.declare("private", subnet(&vpc_id, "10.0.32.0/19")).unwrap();
        assert!(matches!(
            builder.validate(),
            Err(GraphError::UnknownReference { .. })
        ));

        builder.declare("vpc", network()).unwrap();
        let graph = builder.freeze().unwrap();
        assert_eq!(graph.layers()[0], vec![vpc_key]);
    }

    #[test]
    fn test_undeclared_reference_fails_freeze() {
        let ghost = ResourceKey::parse_name(ResourceKind::Network, "ghost").unwrap();
        let mut builder = GraphBuilder::new();
        builder
            .declare("r", router(&Output::<String>::reference(ghost.clone(), "id")))
            .unwrap();

        assert_eq!(
            builder.freeze().unwrap_err(),
            GraphError::UnknownReference {
                missing: ghost,
                referenced_by: "router/r".to_string(),
            }
        );
    }

    #[test]
    fn test_unknown_attribute_rejected_at_declaration() {
        let mut builder = GraphBuilder::new();
        let vpc = builder.declare("vpc", network()).unwrap();
        let err = builder
            .declare("r", router(&vpc.output::<String>("endpoint")))
            .unwrap_err();
        assert!(matches!(err, GraphError::UnknownAttribute { .. }));
    }

    #[test]
    fn test_duplicate_resource_rejected() {
        let mut builder = GraphBuilder::new();
        builder.declare("vpc", network()).unwrap();
        assert!(matches!(
            builder.declare("vpc", network()),
            Err(GraphError::DuplicateResource(_))
        ));
    }

    #[test]
    fn test_ordering_cycle_rejected_with_path() {
        let mut builder = GraphBuilder::new();
        let vpc = builder.declare("vpc", network()).unwrap();
        let a = builder.declare("a", router(&vpc.id())).unwrap();
        let b = builder.declare("b", router(&vpc.id())).unwrap();

        builder.depends_on(&b, a.key()).unwrap();
        let err = builder.depends_on(&a, b.key()).unwrap_err();

        assert_eq!(
            err,
            GraphError::CycleDetected {
                path: vec![b.key().clone(), a.key().clone(), b.key().clone()],
            }
        );
    }

    #[test]
    fn test_deferred_reference_cycle_rejected() {
        let b_key = ResourceKey::parse_name(ResourceKind::Router, "b").unwrap();

        let mut builder = GraphBuilder::new();
        let a = builder
            .declare("a", router(&Output::<String>::reference(b_key, "id")))
            .unwrap();
        let err = builder.declare("b", router(&a.id())).unwrap_err();

        assert!(matches!(err, GraphError::CycleDetected { .. }));
        assert!(err.to_string().contains("router/a"));
    }

    #[test]
    fn test_self_reference_rejected() {
        let me = ResourceKey::parse_name(ResourceKind::Router, "me").unwrap();
        let mut builder = GraphBuilder::new();
        let err = builder
            .declare("me", router(&Output::<String>::reference(me.clone(), "id")))
            .unwrap_err();
        assert_eq!(err, GraphError::CycleDetected { path: vec![me.clone(), me] });
    }

    #[test]
    fn test_exports_validated() {
        let mut builder = GraphBuilder::new();
        let vpc = builder.declare("vpc", network()).unwrap();
        builder.export("vpc_id", &vpc.id()).unwrap();

        assert!(matches!(
            builder.export("vpc_id", &vpc.id()),
            Err(GraphError::DuplicateExport(_))
        ));
        assert!(matches!(
            builder.export("bad", &vpc.output::<String>("nope")),
            Err(GraphError::UnknownAttribute { .. })
        ));
    }
}
