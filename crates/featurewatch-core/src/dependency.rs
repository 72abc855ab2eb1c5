//! Dependency graph between feature views and features
//!
//! Nodes are feature views, features qualified by their view
//! (`view.feature`), and bare dependency names. Edges:
//! - view → each of its qualified features
//! - qualified feature → each declared dependency
//! - bare name → every qualified feature with that name, in any view
//!
//! The last kind is what lets a bare `dependencies: [ORDERS]` reach whichever
//! view defines `ORDERS`. A dependency written as `view.feature` points at that
//! one qualified node only.
//!
//! Nodes are never removed. Re-registering a view replaces the dependency
//! edges of the features it declares; features dropped from the config keep
//! their old nodes and edges.

use crate::config::FeatureViewConfig;
use crate::{Error, Result};
use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::Dfs;
use petgraph::Direction;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Separator between view and feature in qualified names
pub const QUALIFIER: char = '.';

/// A node of the dependency graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum DependencyNode {
    View(String),
    Feature { view: String, feature: String },
    Name(String),
}

impl DependencyNode {
    /// Parse a declared dependency: `view.feature` or a bare name
    pub fn dependency(name: &str) -> Self {
        match name.split_once(QUALIFIER) {
            Some((view, feature)) if !view.is_empty() && !feature.is_empty() => Self::Feature {
                view: view.to_string(),
                feature: feature.to_string(),
            },
            _ => Self::Name(name.to_string()),
        }
    }
}

impl fmt::Display for DependencyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::View(name) | Self::Name(name) => write!(f, "{}", name),
            Self::Feature { view, feature } => write!(f, "{}{}{}", view, QUALIFIER, feature),
        }
    }
}

/// Directed graph of feature-level dependencies
#[derive(Debug, Default)]
pub struct DependencyGraph {
    graph: DiGraph<DependencyNode, ()>,
    nodes: HashMap<DependencyNode, NodeIndex>,
}

impl DependencyGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or refresh) a view, its features and their declared dependencies
    pub fn update(&mut self, config: &FeatureViewConfig) {
        let view = self.node(DependencyNode::View(config.name.clone()));

        for feature in config.features.values() {
            let qualified = self.node(DependencyNode::Feature {
                view: config.name.clone(),
                feature: feature.name.clone(),
            });
            self.graph.update_edge(view, qualified, ());

            self.graph.retain_edges(|g, edge| {
                g.edge_endpoints(edge)
                    .map_or(true, |(source, _)| source != qualified)
            });

            for dependency in &feature.dependencies {
                let target = self.node(DependencyNode::dependency(dependency));
                if target != qualified {
                    self.graph.update_edge(qualified, target, ());
                }
            }
        }
    }

    /// Distinct views owning a feature reachable from `view_name`
    ///
    /// The view itself is included whenever it has features.
    pub fn descendants(&self, view_name: &str) -> Result<BTreeSet<String>> {
        let start = self
            .nodes
            .get(&DependencyNode::View(view_name.to_string()))
            .copied()
            .ok_or_else(|| {
                Error::feature_view(format!(
                    "Feature view {} not found in dependency graph",
                    view_name
                ))
            })?;

        let mut views = BTreeSet::new();
        let mut dfs = Dfs::new(&self.graph, start);
        while let Some(index) = dfs.next(&self.graph) {
            if let DependencyNode::Feature { view, .. } = &self.graph[index] {
                views.insert(view.clone());
            }
        }
        Ok(views)
    }

    pub fn contains_view(&self, view_name: &str) -> bool {
        self.nodes
            .contains_key(&DependencyNode::View(view_name.to_string()))
    }

    /// Registered view names, sorted
    pub fn views(&self) -> Vec<String> {
        let mut views: Vec<String> = self
            .nodes
            .keys()
            .filter_map(|n| match n {
                DependencyNode::View(name) => Some(name.clone()),
                _ => None,
            })
            .collect();
        views.sort();
        views
    }

    /// Direct dependencies declared by `view.feature`
    pub fn dependencies_of(&self, view: &str, feature: &str) -> Vec<DependencyNode> {
        let key = DependencyNode::Feature {
            view: view.to_string(),
            feature: feature.to_string(),
        };
        let mut deps: Vec<DependencyNode> = match self.nodes.get(&key) {
            Some(&index) => self
                .graph
                .neighbors_directed(index, Direction::Outgoing)
                .map(|n| self.graph[n].clone())
                .collect(),
            None => Vec::new(),
        };
        deps.sort();
        deps
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Get or create a node, wiring bare names to qualified features
    fn node(&mut self, node: DependencyNode) -> NodeIndex {
        if let Some(&index) = self.nodes.get(&node) {
            return index;
        }
        let index = self.graph.add_node(node.clone());
        self.nodes.insert(node.clone(), index);

        match &node {
            DependencyNode::Name(name) => {
                let matching: Vec<NodeIndex> = self
                    .nodes
                    .iter()
                    .filter_map(|(n, &i)| match n {
                        DependencyNode::Feature { feature, .. } if feature == name => Some(i),
                        _ => None,
                    })
                    .collect();
                for qualified in matching {
                    self.graph.update_edge(index, qualified, ());
                }
            }
            DependencyNode::Feature { feature, .. } => {
                if let Some(&bare) = self.nodes.get(&DependencyNode::Name(feature.clone())) {
                    self.graph.update_edge(bare, index, ());
                }
            }
            DependencyNode::View(_) => {}
        }
        index
    }
}
