//! Evaluation order.
//!
//! The order is a depth-first topological sort over connected inputs. Nodes
//! are marked visited on entry, so every node is appended exactly once even
//! when the graph has a cycle; the order is then simply not valid for the
//! edges of that cycle. [`unordered_connections`] reports those edges.
//!
//! [`EvaluationOrder`] caches the last sort and is invalidated through the
//! listener interface whenever the graph structure changes.

use crate::graph::id::{LayerId, NodeId};
use crate::graph::listener::{Connection, NodeGraphListener};
use std::collections::{BTreeMap, HashMap};

/// One node as seen by the sort.
#[derive(Debug, Clone)]
pub struct SortNode {
    pub id: NodeId,
    pub layer: LayerId,
    /// Nodes this node reads from.
    pub inputs: Vec<NodeId>,
}

/// Sort `nodes` so that inputs come before the nodes that read them.
///
/// With `global == false` each layer is sorted on its own (ascending layer
/// id) and edges into other layers are ignored. With `global == true` one
/// order over all nodes follows every edge.
pub fn topological_sort(nodes: &[SortNode], global: bool) -> Vec<NodeId> {
    let index: HashMap<NodeId, usize> = nodes.iter().enumerate().map(|(i, n)| (n.id, i)).collect();
    let mut visited = vec![false; nodes.len()];
    let mut order = Vec::with_capacity(nodes.len());

    if global {
        let all: Vec<usize> = (0..nodes.len()).collect();
        visit_all(nodes, &index, &all, None, &mut visited, &mut order);
    } else {
        let mut layers: BTreeMap<LayerId, Vec<usize>> = BTreeMap::new();
        for (i, node) in nodes.iter().enumerate() {
            layers.entry(node.layer).or_default().push(i);
        }
        for (layer, members) in &layers {
            visit_all(nodes, &index, members, Some(*layer), &mut visited, &mut order);
        }
    }

    order
}

fn visit_all(
    nodes: &[SortNode],
    index: &HashMap<NodeId, usize>,
    roots: &[usize],
    layer: Option<LayerId>,
    visited: &mut [bool],
    order: &mut Vec<NodeId>,
) {
    // (node, next input to look at)
    let mut stack: Vec<(usize, usize)> = Vec::new();

    for &root in roots {
        if visited[root] {
            continue;
        }
        visited[root] = true;
        stack.push((root, 0));

        while let Some(&(current, next)) = stack.last() {
            let inputs = &nodes[current].inputs;
            if next < inputs.len() {
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                let Some(&dep) = index.get(&inputs[next]) else {
                    continue;
                };
                if layer.is_some_and(|l| nodes[dep].layer != l) {
                    continue;
                }
                if !visited[dep] {
                    visited[dep] = true;
                    stack.push((dep, 0));
                }
            } else {
                order.push(nodes[current].id);
                stack.pop();
            }
        }
    }
}

/// Connections whose source is not evaluated before their destination.
///
/// `skip` filters out edges that are not ordering constraints (edges
/// through a cycle-breaking node, edges between independently sorted
/// layers).
pub fn unordered_connections<'c>(
    order: &[NodeId],
    connections: impl IntoIterator<Item = &'c Connection>,
    skip: impl Fn(&Connection) -> bool,
) -> Vec<Connection> {
    let position: HashMap<NodeId, usize> = order.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    connections
        .into_iter()
        .filter(|c| !skip(c))
        .filter(|c| match (position.get(&c.src), position.get(&c.dst)) {
            (Some(src), Some(dst)) => src >= dst,
            _ => false,
        })
        .cloned()
        .collect()
}

/// Cached evaluation order.
#[derive(Debug)]
pub struct EvaluationOrder {
    sequence: Vec<NodeId>,
    dirty: bool,
    rebuilds: u64,
}

impl EvaluationOrder {
    pub fn new() -> Self {
        Self {
            sequence: Vec::new(),
            dirty: true,
            rebuilds: 0,
        }
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn invalidate(&mut self) {
        self.dirty = true;
    }

    pub fn sequence(&self) -> &[NodeId] {
        &self.sequence
    }

    /// Number of times the order has been recomputed.
    pub fn rebuilds(&self) -> u64 {
        self.rebuilds
    }

    pub fn store(&mut self, sequence: Vec<NodeId>) {
        self.sequence = sequence;
        self.dirty = false;
        self.rebuilds += 1;
    }
}

impl Default for EvaluationOrder {
    fn default() -> Self {
        Self::new()
    }
}

impl NodeGraphListener for EvaluationOrder {
    fn created_node(&mut self, _node: NodeId, _type_name: &str) {
        self.invalidate();
    }

    fn removed_node(&mut self, _node: NodeId) {
        self.invalidate();
    }

    fn created_connection(&mut self, _connection: &Connection) {
        self.invalidate();
    }

    fn removed_connection(&mut self, _connection: &Connection) {
        self.invalidate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::id::PortId;

    fn node(id: u32, inputs: &[u32]) -> SortNode {
        SortNode {
            id: NodeId(id),
            layer: LayerId::ROOT,
            inputs: inputs.iter().map(|&i| NodeId(i)).collect(),
        }
    }

    fn pos(order: &[NodeId], id: u32) -> usize {
        order.iter().position(|n| *n == NodeId(id)).unwrap()
    }

    fn edge(src: u32, dst: u32) -> Connection {
        Connection::new(NodeId(src), PortId::output("v"), NodeId(dst), PortId::input("v"))
    }

    #[test]
    fn test_topological_sort_linear() {
        // 2 reads 1 reads 0, listed in reverse
        let nodes = vec![node(2, &[1]), node(1, &[0]), node(0, &[])];
        let order = topological_sort(&nodes, false);
        assert_eq!(order, vec![NodeId(0), NodeId(1), NodeId(2)]);
    }

    #[test]
    fn test_topological_sort_diamond() {
        //     0
        //    / \
        //   1   2
        //    \ /
        //     3
        let nodes = vec![node(3, &[1, 2]), node(1, &[0]), node(2, &[0]), node(0, &[])];
        let order = topological_sort(&nodes, false);
        assert_eq!(order.len(), 4);
        assert!(pos(&order, 0) < pos(&order, 1));
        assert!(pos(&order, 0) < pos(&order, 2));
        assert!(pos(&order, 1) < pos(&order, 3));
        assert!(pos(&order, 2) < pos(&order, 3));
    }

    #[test]
    fn test_cycle_appends_each_node_once() {
        let nodes = vec![node(0, &[1]), node(1, &[0])];
        let order = topological_sort(&nodes, false);
        assert_eq!(order, vec![NodeId(1), NodeId(0)]);

        let edges = [edge(0, 1), edge(1, 0)];
        let unordered = unordered_connections(&order, &edges, |_| false);
        assert_eq!(unordered, vec![edge(0, 1)]);
        assert!(unordered_connections(&order, &edges, |c| c.src == NodeId(0)).is_empty());
    }

    #[test]
    fn test_layers_sorted_independently() {
        let nodes = vec![
            SortNode {
                id: NodeId(0),
                layer: LayerId(1),
                inputs: vec![NodeId(1)],
            },
            SortNode {
                id: NodeId(1),
                layer: LayerId(2),
                inputs: vec![],
            },
            SortNode {
                id: NodeId(2),
                layer: LayerId(1),
                inputs: vec![],
            },
        ];
        // Layer 1 first, cross-layer edge ignored
        let order = topological_sort(&nodes, false);
        assert_eq!(order, vec![NodeId(0), NodeId(2), NodeId(1)]);

        let order = topological_sort(&nodes, true);
        assert!(pos(&order, 1) < pos(&order, 0));
    }

    #[test]
    fn test_missing_inputs_ignored() {
        let nodes = vec![node(0, &[42])];
        assert_eq!(topological_sort(&nodes, false), vec![NodeId(0)]);
    }

    #[test]
    fn test_cache_invalidation() {
        let mut cache = EvaluationOrder::new();
        assert!(cache.is_dirty());
        cache.store(vec![NodeId(0)]);
        assert!(!cache.is_dirty());
        cache.changed_ui_data(None);
        assert!(!cache.is_dirty());
        cache.created_connection(&edge(0, 1));
        assert!(cache.is_dirty());
        assert_eq!(cache.rebuilds(), 1);
    }
}
