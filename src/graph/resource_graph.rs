// Copyright (c) 2025 - Cowboy AI, Inc.
//! Frozen resource graph

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::{Bfs, EdgeRef};
use petgraph::Direction;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use super::{DependencyEdge, EdgeKind};
use crate::domain::{ResourceKey, ResourceSpec};
use crate::output::UntypedOutput;

/// One declared resource
#[derive(Debug, Clone)]
pub struct ResourceNode {
    key: ResourceKey,
    spec: ResourceSpec,
    layer: Option<String>,
}

impl ResourceNode {
    pub(crate) fn new(key: ResourceKey, spec: ResourceSpec, layer: Option<String>) -> Self {
        Self { key, spec, layer }
    }

    pub fn key(&self) -> &ResourceKey {
        &self.key
    }

    pub fn spec(&self) -> &ResourceSpec {
        &self.spec
    }

    /// Composition layer that declared this node
    pub fn layer(&self) -> Option<&str> {
        self.layer.as_deref()
    }
}

/// Immutable, validated dependency graph
///
/// Produced by [`GraphBuilder::freeze`](super::GraphBuilder::freeze). Queries
/// return keys in a deterministic order.
#[derive(Debug, Clone)]
pub struct ResourceGraph {
    graph: DiGraph<ResourceNode, EdgeKind>,
    index: HashMap<ResourceKey, NodeIndex>,
    exports: BTreeMap<String, UntypedOutput>,
    layer_order: Vec<String>,
}

impl ResourceGraph {
    pub(crate) fn new(
        graph: DiGraph<ResourceNode, EdgeKind>,
        index: HashMap<ResourceKey, NodeIndex>,
        exports: BTreeMap<String, UntypedOutput>,
        layer_order: Vec<String>,
    ) -> Self {
        Self {
            graph,
            index,
            exports,
            layer_order,
        }
    }

    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    pub fn contains(&self, key: &ResourceKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn node(&self, key: &ResourceKey) -> Option<&ResourceNode> {
        self.index.get(key).map(|&i| &self.graph[i])
    }

    /// Nodes in declaration order
    pub fn nodes(&self) -> impl Iterator<Item = &ResourceNode> {
        self.graph.node_weights()
    }

    pub fn keys(&self) -> BTreeSet<ResourceKey> {
        self.index.keys().cloned().collect()
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        let mut edges: Vec<_> = self
            .graph
            .edge_references()
            .map(|e| DependencyEdge {
                from: self.graph[e.source()].key.clone(),
                to: self.graph[e.target()].key.clone(),
                kind: *e.weight(),
            })
            .collect();
        edges.sort_by(|a, b| (&a.from, &a.to).cmp(&(&b.from, &b.to)));
        edges
    }

    /// Direct dependencies of a node
    pub fn dependencies(&self, key: &ResourceKey) -> Vec<(ResourceKey, EdgeKind)> {
        self.neighbours(key, Direction::Incoming)
    }

    /// Direct dependents of a node
    pub fn dependents(&self, key: &ResourceKey) -> Vec<(ResourceKey, EdgeKind)> {
        self.neighbours(key, Direction::Outgoing)
    }

    /// Every node reachable from `key` by either edge kind
    pub fn transitive_dependents(&self, key: &ResourceKey) -> BTreeSet<ResourceKey> {
        let Some(&start) = self.index.get(key) else {
            return BTreeSet::new();
        };
        let mut reached = BTreeSet::new();
        let mut bfs = Bfs::new(&self.graph, start);
        while let Some(i) = bfs.next(&self.graph) {
            if i != start {
                reached.insert(self.graph[i].key.clone());
            }
        }
        reached
    }

    /// Topological levels: each level only depends on earlier levels
    pub fn layers(&self) -> Vec<Vec<ResourceKey>> {
        let mut remaining: HashMap<NodeIndex, usize> = self
            .graph
            .node_indices()
            .map(|i| (i, self.graph.neighbors_directed(i, Direction::Incoming).count()))
            .collect();

        let mut levels = Vec::new();
        while !remaining.is_empty() {
            let mut ready: Vec<NodeIndex> = remaining
                .iter()
                .filter(|(_, &waiting)| waiting == 0)
                .map(|(&i, _)| i)
                .collect();
            if ready.is_empty() {
                // Frozen graphs are acyclic.
                break;
            }
            ready.sort_by(|a, b| self.graph[*a].key.cmp(&self.graph[*b].key));

            for i in &ready {
                remaining.remove(i);
                for next in self.graph.neighbors_directed(*i, Direction::Outgoing) {
                    if let Some(waiting) = remaining.get_mut(&next) {
                        *waiting = waiting.saturating_sub(1);
                    }
                }
            }
            levels.push(ready.into_iter().map(|i| self.graph[i].key.clone()).collect());
        }
        levels
    }

    /// Keys in a dependency-respecting order
    pub fn topological_order(&self) -> Vec<ResourceKey> {
        self.layers().into_iter().flatten().collect()
    }

    /// Composition layers in the order they were entered
    pub fn composition_layers(&self) -> &[String] {
        &self.layer_order
    }

    pub fn nodes_in_layer(&self, layer: &str) -> Vec<&ResourceNode> {
        self.nodes().filter(|n| n.layer() == Some(layer)).collect()
    }

    /// Edges of one kind whose ends belong to different composition layers
    pub fn cross_layer_edges(&self, kind: EdgeKind) -> Vec<DependencyEdge> {
        self.edges()
            .into_iter()
            .filter(|e| e.kind == kind)
            .filter(|e| {
                let from = self.node(&e.from).and_then(ResourceNode::layer);
                let to = self.node(&e.to).and_then(ResourceNode::layer);
                from != to
            })
            .collect()
    }

    pub fn exports(&self) -> &BTreeMap<String, UntypedOutput> {
        &self.exports
    }

    /// Secrets read by any node spec or export
    pub fn secret_names(&self) -> BTreeSet<String> {
        self.nodes()
            .flat_map(|n| n.spec.secret_names())
            .chain(self.exports.values().flat_map(UntypedOutput::secret_names))
            .collect()
    }

    fn neighbours(&self, key: &ResourceKey, direction: Direction) -> Vec<(ResourceKey, EdgeKind)> {
        let Some(&i) = self.index.get(key) else {
            return Vec::new();
        };
        let mut found: Vec<_> = self
            .graph
            .edges_directed(i, direction)
            .map(|e| {
                let other = match direction {
                    Direction::Incoming => e.source(),
                    Direction::Outgoing => e.target(),
                };
                (self.graph[other].key.clone(), *e.weight())
            })
            .collect();
        found.sort();
        found
    }
}
