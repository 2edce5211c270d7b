pub mod edge;
pub mod node;

use std::collections::HashMap;

use petgraph::Directed;
use petgraph::Direction;
use petgraph::stable_graph::{NodeIndex, StableGraph};
use petgraph::visit::EdgeRef;

use edge::EdgeKind;

/// Identity of a Definition inside a run: file position in the sorted file
/// list, then position in that file's Definition list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DefinitionKey {
    pub file: usize,
    pub index: usize,
}

/// Weight of a linked dependency edge (source uses target).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GraphEdge {
    pub kind: EdgeKind,
    /// Line of the usage in the source Definition's file.
    pub line: usize,
}

/// The project-wide graph: one node per Definition of every successfully
/// extracted file, one edge per forward edge linked to a specific Definition.
pub struct KnowledgeGraph {
    pub graph: StableGraph<DefinitionKey, GraphEdge, Directed>,
    node_index: HashMap<DefinitionKey, NodeIndex>,
}

impl KnowledgeGraph {
    pub fn new() -> Self {
        Self {
            graph: StableGraph::new(),
            node_index: HashMap::new(),
        }
    }

    /// Add a Definition node. Adding the same key twice returns the existing node.
    pub fn add_definition(&mut self, key: DefinitionKey) -> NodeIndex {
        if let Some(&existing) = self.node_index.get(&key) {
            return existing;
        }
        let idx = self.graph.add_node(key);
        self.node_index.insert(key, idx);
        idx
    }

    pub fn node(&self, key: DefinitionKey) -> Option<NodeIndex> {
        self.node_index.get(&key).copied()
    }

    /// Add a `source uses target` edge. Returns `false` when either end is unknown.
    pub fn add_dependency(&mut self, source: DefinitionKey, target: DefinitionKey, edge: GraphEdge) -> bool {
        match (self.node(source), self.node(target)) {
            (Some(s), Some(t)) => {
                self.graph.add_edge(s, t, edge);
                true
            }
            _ => false,
        }
    }

    /// Definitions that use `target`, with the edge weight.
    pub fn dependents(&self, target: DefinitionKey) -> Vec<(DefinitionKey, GraphEdge)> {
        let Some(idx) = self.node(target) else {
            return Vec::new();
        };
        self.graph
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (self.graph[e.source()], *e.weight()))
            .collect()
    }

    pub fn definition_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn edge_count(&self) -> usize {
        self.graph.edge_count()
    }
}

impl Default for KnowledgeGraph {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(file: usize, index: usize) -> DefinitionKey {
        DefinitionKey { file, index }
    }

    #[test]
    fn test_add_definition_is_idempotent() {
        let mut graph = KnowledgeGraph::new();
        let a = graph.add_definition(key(0, 0));
        let b = graph.add_definition(key(0, 0));
        assert_eq!(a, b);
        assert_eq!(graph.definition_count(), 1);
    }

    #[test]
    fn test_dependents() {
        let mut graph = KnowledgeGraph::new();
        graph.add_definition(key(0, 0));
        graph.add_definition(key(1, 0));
        let edge = GraphEdge {
            kind: EdgeKind::MarkupElement,
            line: 4,
        };
        assert!(graph.add_dependency(key(1, 0), key(0, 0), edge));
        assert!(!graph.add_dependency(key(1, 0), key(5, 5), edge));

        assert_eq!(graph.dependents(key(0, 0)), vec![(key(1, 0), edge)]);
        assert_eq!(graph.edge_count(), 1);
    }
}
