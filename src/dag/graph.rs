// src/dag/graph.rs

use std::collections::{BTreeSet, HashMap, HashSet, VecDeque};

use crate::errors::{BatchdagError, Result};

/// Anything the scheduler can order: a name plus the names it waits for.
pub trait DagNode {
    fn name(&self) -> &str;

    /// Names of nodes that must complete before this one may start.
    fn prerequisites(&self) -> &[String];

    /// True iff every prerequisite is in `completed`.
    fn can_start(&self, completed: &HashSet<&str>) -> bool {
        self.prerequisites()
            .iter()
            .all(|p| completed.contains(p.as_str()))
    }
}

/// Internal node structure: stores immediate deps and dependents by index.
#[derive(Debug, Clone)]
struct GraphNode {
    name: String,
    /// Direct dependencies: nodes that must complete before this one can run.
    deps: Vec<usize>,
    /// Direct dependents: nodes that depend on this one.
    dependents: Vec<usize>,
}

/// Dependency graph over a slice of nodes, keyed by their position.
///
/// Index `i` in the graph is element `i` of the slice it was built from, so
/// callers can keep the nodes themselves in place and address them by index.
#[derive(Debug, Clone)]
pub struct DagGraph {
    nodes: Vec<GraphNode>,
    index: HashMap<String, usize>,
}

impl DagGraph {
    /// Build the graph, rejecting duplicate names and unknown prerequisites.
    ///
    /// Cycles are not detected here; see [`DagGraph::topological_order`].
    pub fn build<N: DagNode>(nodes: &[N]) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if index.insert(node.name().to_string(), i).is_some() {
                return Err(BatchdagError::DuplicateNode(node.name().to_string()));
            }
        }

        let mut graph: Vec<GraphNode> = nodes
            .iter()
            .map(|n| GraphNode {
                name: n.name().to_string(),
                deps: Vec::new(),
                dependents: Vec::new(),
            })
            .collect();

        for (i, node) in nodes.iter().enumerate() {
            for prerequisite in node.prerequisites() {
                let Some(&dep) = index.get(prerequisite) else {
                    return Err(BatchdagError::UnknownPrerequisite {
                        node: node.name().to_string(),
                        prerequisite: prerequisite.clone(),
                    });
                };
                if graph[i].deps.contains(&dep) {
                    continue;
                }
                graph[i].deps.push(dep);
                graph[dep].dependents.push(i);
            }
        }

        Ok(Self {
            nodes: graph,
            index,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn name_of(&self, idx: usize) -> &str {
        &self.nodes[idx].name
    }

    /// Immediate dependencies of a node.
    pub fn dependencies_of(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].deps
    }

    /// Immediate dependents of a node.
    pub fn dependents_of(&self, idx: usize) -> &[usize] {
        &self.nodes[idx].dependents
    }

    /// Kahn's algorithm.
    ///
    /// Ties are broken by input position, so the order is deterministic.
    /// Fails with [`BatchdagError::DagCycle`] naming every node that sits on
    /// or behind a cycle.
    pub fn topological_order(&self) -> Result<Vec<usize>> {
        let mut in_degree: Vec<usize> = self.nodes.iter().map(|n| n.deps.len()).collect();
        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(idx) = ready.pop_front() {
            order.push(idx);
            for &dependent in &self.nodes[idx].dependents {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    ready.push_back(dependent);
                }
            }
        }

        if order.len() < self.nodes.len() {
            let stuck: Vec<String> = (0..self.nodes.len())
                .filter(|&i| in_degree[i] > 0)
                .map(|i| format!("'{}'", self.nodes[i].name))
                .collect();
            return Err(BatchdagError::DagCycle(format!(
                "cycle detected involving {}",
                stuck.join(", ")
            )));
        }

        Ok(order)
    }

    /// `roots` plus everything they transitively depend on.
    pub fn with_prerequisites(&self, roots: &[usize]) -> BTreeSet<usize> {
        let mut stack: Vec<usize> = roots.to_vec();
        let mut visited = BTreeSet::new();

        while let Some(idx) = stack.pop() {
            if !visited.insert(idx) {
                continue;
            }
            stack.extend(self.nodes[idx].deps.iter().copied());
        }

        visited
    }
}
