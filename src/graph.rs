//! Causal diagram for a column selection, rendered as Graphviz DOT.
//!
//! Every confounder points at both the treatment and the outcome, and the
//! treatment points at the outcome.
//!
//! ```
//! use u_attribution::estimator::ColumnSelection;
//! use u_attribution::graph::CausalGraph;
//!
//! let g = CausalGraph::from_selection(&ColumnSelection::new("Ad", "Sales", ["Season"]));
//! assert_eq!(g.node_count(), 3);
//! assert_eq!(g.edge_count(), 3);
//! assert!(g.to_dot().contains("fillcolor=skyblue"));
//! ```

use std::collections::HashMap;
use std::fmt;

use petgraph::algo::is_cyclic_directed;
use petgraph::dot::{Config, Dot};
use petgraph::graph::{DiGraph, NodeIndex};

use crate::estimator::ColumnSelection;

/// What a variable is in the diagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeRole {
    Treatment,
    Outcome,
    Confounder,
}

impl NodeRole {
    /// Fill color used when rendering.
    pub fn color(self) -> &'static str {
        match self {
            Self::Treatment => "skyblue",
            Self::Outcome => "lightgreen",
            Self::Confounder => "lightgrey",
        }
    }
}

/// A named variable in the diagram.
#[derive(Debug, Clone, PartialEq)]
pub struct CausalNode {
    pub name: String,
    pub role: NodeRole,
}

impl fmt::Display for CausalNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Why an edge exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EdgeKind {
    /// Confounder → treatment or confounder → outcome.
    Backdoor,
    /// Treatment → outcome.
    Effect,
}

impl fmt::Display for EdgeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Backdoor => f.write_str("backdoor"),
            Self::Effect => f.write_str("effect"),
        }
    }
}

/// Directed acyclic diagram of treatment, outcome, and confounders.
#[derive(Debug, Clone)]
pub struct CausalGraph {
    graph: DiGraph<CausalNode, EdgeKind>,
}

impl CausalGraph {
    /// Builds the diagram. Confounders naming the treatment or outcome are
    /// ignored, as are duplicates.
    pub fn from_selection(selection: &ColumnSelection) -> Self {
        let selection = selection.clone().sanitized();
        let mut graph = DiGraph::new();
        let mut index: HashMap<String, NodeIndex> = HashMap::new();

        let mut node = |graph: &mut DiGraph<CausalNode, EdgeKind>, name: &str, role| {
            *index.entry(name.to_string()).or_insert_with(|| {
                graph.add_node(CausalNode {
                    name: name.to_string(),
                    role,
                })
            })
        };

        let t = node(&mut graph, &selection.treatment, NodeRole::Treatment);
        let y = node(&mut graph, &selection.outcome, NodeRole::Outcome);
        for c in &selection.confounders {
            let c = node(&mut graph, c, NodeRole::Confounder);
            graph.add_edge(c, t, EdgeKind::Backdoor);
            graph.add_edge(c, y, EdgeKind::Backdoor);
        }
        if t != y {
            graph.add_edge(t, y, EdgeKind::Effect);
        }
        Self { graph }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }

    /// Returns `true` when the diagram has no directed cycle.
    pub fn is_acyclic(&self) -> bool {
        !is_cyclic_directed(&self.graph)
    }

    /// `(from, to)` variable names for every edge, in insertion order.
    pub fn edges(&self) -> Vec<(&str, &str)> {
        self.graph
            .edge_indices()
            .filter_map(|e| self.graph.edge_endpoints(e))
            .map(|(a, b)| (self.graph[a].name.as_str(), self.graph[b].name.as_str()))
            .collect()
    }

    /// Renders the diagram as a Graphviz DOT document with filled nodes.
    pub fn to_dot(&self) -> String {
        format!(
            "{}",
            Dot::with_attr_getters(
                &self.graph,
                &[Config::EdgeNoLabel],
                &|_, _| String::new(),
                &|_, (_, node)| format!("style=filled, fillcolor={}", node.role.color()),
            )
        )
    }
}
