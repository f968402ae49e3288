//! Graph executor: node storage, connections and the evaluation pass.
//!
//! The graph owns every node instance in an arena indexed by [`NodeId`].
//! Connections are kept twice, indexed by source and by destination.
//! Each evaluation pass:
//! 1. Recompute the cached topological order if structure changed.
//! 2. Evaluate nodes in that order. Each node recomputes only if it is
//!    dirty (or always evaluates).
//! 3. Apply custom-port changes requested by node hooks.
//! 4. Optionally reset `evaluated` marks and change flags.
//!
//! While a node evaluates it is taken out of its slot, so it can read the
//! outputs of every other node through the arena.

use crate::config::GraphConfig;
use crate::graph::dtype::Value;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::id::{LayerId, NodeId, PortId};
use crate::graph::listener::{Connection, NodeGraphListener};
use crate::graph::node::{AnyNode, GraphEnv, NamedNodes, Node, NodePlugin, TickInfo};
use crate::graph::node_type::NodeTypeRegistry;
use crate::graph::order::{topological_sort, unordered_connections, EvaluationOrder, SortNode};
use crate::graph::port::{PortDescriptor, PortDiff};
use crate::graph::value::{Link, OutputLookup, SettableValue, ValueHolder};
use serde_json::Value as JsonValue;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

/// Arena of node instances addressed by id.
///
/// Ids come from saved documents as well as from allocation, so they can be
/// sparse. Iteration is in ascending id order.
#[derive(Default)]
pub struct NodeSlots(BTreeMap<NodeId, Node>);

impl NodeSlots {
    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.0.get(&id)
    }

    fn get_mut(&mut self, id: NodeId) -> Option<&mut Node> {
        self.0.get_mut(&id)
    }

    fn take(&mut self, id: NodeId) -> Option<Node> {
        self.0.remove(&id)
    }

    fn put(&mut self, node: Node) {
        self.0.insert(node.id(), node);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Node> {
        self.0.values()
    }

    fn iter_mut(&mut self) -> impl Iterator<Item = &mut Node> {
        self.0.values_mut()
    }

    fn ids(&self) -> Vec<NodeId> {
        self.0.keys().copied().collect()
    }
}

impl OutputLookup for NodeSlots {
    fn output(&self, node: NodeId, port: &PortId) -> Option<&SettableValue> {
        self.get(node)?.holder(port)?.as_output()
    }
}

/// Everything needed to create one node.
#[derive(Debug, Clone)]
pub struct NodeSpec {
    pub type_name: String,
    /// Requested id. `None` allocates the next free id.
    pub id: Option<NodeId>,
    pub layer: LayerId,
    pub custom_ports: Option<Vec<PortDescriptor>>,
    pub initial_values: Vec<(PortId, Value)>,
    pub ui_data: JsonValue,
    pub state: Option<JsonValue>,
}

impl NodeSpec {
    pub fn new(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            id: None,
            layer: LayerId::ROOT,
            custom_ports: None,
            initial_values: Vec::new(),
            ui_data: JsonValue::Null,
            state: None,
        }
    }

    pub fn with_id(mut self, id: NodeId) -> Self {
        self.id = Some(id);
        self
    }

    pub fn in_layer(mut self, layer: LayerId) -> Self {
        self.layer = layer;
        self
    }

    pub fn with_custom_ports(mut self, ports: Vec<PortDescriptor>) -> Self {
        self.custom_ports = Some(ports);
        self
    }

    pub fn with_value(mut self, port: PortId, value: Value) -> Self {
        self.initial_values.push((port, value));
        self
    }

    pub fn with_ui_data(mut self, data: JsonValue) -> Self {
        self.ui_data = data;
        self
    }

    pub fn with_state(mut self, state: JsonValue) -> Self {
        self.state = Some(state);
        self
    }
}

/// Outcome of one evaluation pass.
#[derive(Debug, Clone, Default)]
pub struct EvaluationReport {
    pub tick: TickInfo,
    /// Nodes whose recompute hook ran, in evaluation order.
    pub recomputed: Vec<NodeId>,
}

impl EvaluationReport {
    pub fn was_recomputed(&self, node: NodeId) -> bool {
        self.recomputed.contains(&node)
    }
}

/// Wall clock driving [`Graph::evaluate`].
#[derive(Debug, Default)]
struct Clock {
    start_time: Option<Instant>,
    last_tick_time: Option<Instant>,
    tick: u64,
}

impl Clock {
    fn next(&mut self) -> TickInfo {
        let now = Instant::now();
        let start = *self.start_time.get_or_insert(now);
        let dt = self
            .last_tick_time
            .map(|last| now.duration_since(last))
            .unwrap_or_default();
        self.last_tick_time = Some(now);
        let info = TickInfo {
            time: now.duration_since(start),
            dt,
            tick: self.tick,
        };
        self.tick += 1;
        info
    }
}

/// A graph of node instances and the connections between them.
pub struct Graph {
    registry: Arc<NodeTypeRegistry>,
    config: GraphConfig,
    nodes: NodeSlots,
    /// Connections by source node.
    forward: HashMap<NodeId, BTreeSet<Connection>>,
    /// Connections by destination node.
    reverse: HashMap<NodeId, BTreeSet<Connection>>,
    order: EvaluationOrder,
    /// Connections the last computed order does not respect.
    unordered: Vec<Connection>,
    listeners: Vec<Box<dyn NodeGraphListener>>,
    named: NamedNodes,
    ui_data: JsonValue,
    clock: Clock,
    next_id: u32,
}

impl Graph {
    pub fn new(registry: Arc<NodeTypeRegistry>, config: GraphConfig) -> Self {
        Self {
            registry,
            config,
            nodes: NodeSlots::default(),
            forward: HashMap::new(),
            reverse: HashMap::new(),
            order: EvaluationOrder::new(),
            unordered: Vec::new(),
            listeners: Vec::new(),
            named: NamedNodes::new(),
            ui_data: JsonValue::Null,
            clock: Clock::default(),
            next_id: 0,
        }
    }

    /// Graph over the built-in node types with default configuration.
    pub fn with_builtins() -> Self {
        Self::new(NodeTypeRegistry::global(), GraphConfig::default())
    }

    pub fn registry(&self) -> &Arc<NodeTypeRegistry> {
        &self.registry
    }

    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    pub fn set_evaluate_globally(&mut self, global: bool) {
        if self.config.evaluate_globally != global {
            self.config.evaluate_globally = global;
            self.order.invalidate();
        }
    }

    pub fn add_listener(&mut self, listener: Box<dyn NodeGraphListener>) {
        self.listeners.push(listener);
    }

    fn notify(&mut self, event: impl Fn(&mut dyn NodeGraphListener)) {
        event(&mut self.order);
        for listener in &mut self.listeners {
            event(listener.as_mut());
        }
    }

    // ==================== Queries ====================

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Nodes in id order.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.iter()
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.get(id).is_some()
    }

    pub fn len(&self) -> usize {
        self.nodes.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.iter().next().is_none()
    }

    /// All connections, sorted.
    pub fn connections(&self) -> Vec<Connection> {
        self.forward
            .values()
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    pub fn connection_count(&self) -> usize {
        self.forward.values().map(BTreeSet::len).sum()
    }

    /// Connections into or out of `node`, sorted.
    pub fn connections_of(&self, node: NodeId) -> Vec<Connection> {
        self.forward
            .get(&node)
            .into_iter()
            .chain(self.reverse.get(&node))
            .flatten()
            .cloned()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    fn connections_at(&self, node: NodeId, port: &PortId) -> Vec<Connection> {
        let index = if port.is_input() {
            &self.reverse
        } else {
            &self.forward
        };
        index
            .get(&node)
            .into_iter()
            .flatten()
            .filter(|c| {
                if port.is_input() {
                    &c.dst_port == port
                } else {
                    &c.src_port == port
                }
            })
            .cloned()
            .collect()
    }

    /// Current value of a port: connected source, manual value, or default.
    pub fn value(&self, node: NodeId, port: &PortId) -> Option<Value> {
        let n = self.nodes.get(node)?;
        match n.holder(port) {
            Some(holder) => Some(holder.get(&self.nodes).clone()),
            None => n.port(port).map(PortDescriptor::default_value),
        }
    }

    pub fn is_connected(&self, node: NodeId, port: &PortId) -> bool {
        self.nodes
            .get(node)
            .and_then(|n| n.holder(port))
            .is_some_and(ValueHolder::is_connected)
    }

    pub fn holder(&self, node: NodeId, port: &PortId) -> Option<&ValueHolder> {
        self.nodes.get(node)?.holder(port)
    }

    /// Holder for a port, materialized on first access.
    pub fn holder_mut(&mut self, node: NodeId, port: &PortId) -> Option<&mut ValueHolder> {
        self.nodes.get_mut(node)?.get_value(port)
    }

    pub fn lookup(&self) -> &dyn OutputLookup {
        &self.nodes
    }

    pub fn named_node(&self, name: &str) -> Option<NodeId> {
        self.named.get(name).copied()
    }

    pub fn ui_data(&self) -> &JsonValue {
        &self.ui_data
    }

    /// Downcast a plugin node's behavior.
    pub fn plugin<T: NodePlugin + 'static>(&self, node: NodeId) -> Option<&T> {
        match self.nodes.get(node)?.behavior() {
            AnyNode::Plugin(plugin) => plugin.as_any().downcast_ref(),
            AnyNode::Builtin(_) => None,
        }
    }

    pub fn plugin_mut<T: NodePlugin + 'static>(&mut self, node: NodeId) -> Option<&mut T> {
        match self.nodes.get_mut(node)?.behavior_mut() {
            AnyNode::Plugin(plugin) => plugin.as_any_mut().downcast_mut(),
            AnyNode::Builtin(_) => None,
        }
    }

    // ==================== Structural mutation ====================

    fn allocate_id(&mut self) -> NodeId {
        if !NodeId(self.next_id).is_valid() {
            // A loaded document used the top of the id range
            self.next_id = 0;
        }
        while self.nodes.get(NodeId(self.next_id)).is_some() {
            self.next_id += 1;
        }
        NodeId(self.next_id)
    }

    /// Create a node of a registered type with initial manual values.
    pub fn create_node(
        &mut self,
        type_name: &str,
        initial_values: impl IntoIterator<Item = (PortId, Value)>,
    ) -> GraphResult<NodeId> {
        let mut spec = NodeSpec::new(type_name);
        spec.initial_values.extend(initial_values);
        self.create_node_with(spec)
    }

    pub fn create_node_with(&mut self, spec: NodeSpec) -> GraphResult<NodeId> {
        let descriptor = self
            .registry
            .get(&spec.type_name)
            .cloned()
            .ok_or_else(|| GraphError::UnknownType(spec.type_name.clone()))?;

        let id = match spec.id {
            Some(id) if !id.is_valid() || self.contains(id) => return Err(GraphError::IdInUse(id)),
            Some(id) => id,
            None => self.allocate_id(),
        };

        let mut node = Node::new(id, spec.layer, descriptor)?;
        if let Some(ports) = spec.custom_ports {
            node.set_custom_ports(ports)?;
        }
        for (port, value) in spec.initial_values {
            let Some(dtype) = node.port(&port).map(|p| p.dtype.clone()) else {
                tracing::warn!("{} {} has no port {}, value ignored", node.type_name(), id, port);
                continue;
            };
            match (dtype.coerce(value), node.get_value(&port)) {
                (Some(value), Some(holder)) => holder.set(value),
                _ => tracing::warn!(
                    "Initial value for {} of {} is not a {}, value ignored",
                    port,
                    id,
                    dtype
                ),
            }
        }
        node.set_ui_data(spec.ui_data);
        if let Some(state) = &spec.state {
            node.load_state(state);
        }

        node.start(GraphEnv {
            lookup: &self.nodes,
            named: &mut self.named,
            registry: &self.registry,
            tick: TickInfo::default(),
        });
        let pending = node.take_pending_ports();
        let type_name = node.type_name().to_string();
        self.nodes.put(node);
        self.next_id = self.next_id.max(id.0.saturating_add(1));

        tracing::debug!("Created node {} of type '{}'", id, type_name);
        self.notify(|l| l.created_node(id, &type_name));

        if let Some(ports) = pending {
            self.apply_custom_ports(id, ports);
        }
        Ok(id)
    }

    /// Stop a node, tear down its connections and remove it.
    pub fn remove_node(&mut self, id: NodeId) -> GraphResult<()> {
        let mut node = self.nodes.take(id).ok_or(GraphError::UnknownNode(id))?;
        node.stop(GraphEnv {
            lookup: &self.nodes,
            named: &mut self.named,
            registry: &self.registry,
            tick: TickInfo::default(),
        });
        self.nodes.put(node);

        for connection in self.connections_of(id) {
            self.remove_connection_inner(&connection, false);
        }
        self.forward.remove(&id);
        self.reverse.remove(&id);
        self.nodes.take(id);

        tracing::debug!("Removed node {}", id);
        self.notify(|l| l.removed_node(id));
        Ok(())
    }

    /// Remove every node.
    pub fn clear(&mut self) {
        for id in self.nodes.ids() {
            if let Err(e) = self.remove_node(id) {
                tracing::warn!("Failed to remove {}: {}", id, e);
            }
        }
    }

    /// Connect an output port to an input port.
    ///
    /// Unknown nodes or ports and wrong port directions are errors.
    ///
    /// # Panics
    /// If the destination input is already connected.
    pub fn create_connection(
        &mut self,
        src: NodeId,
        src_port: PortId,
        dst: NodeId,
        dst_port: PortId,
    ) -> GraphResult<()> {
        let invalid = |reason| GraphError::InvalidConnection {
            src,
            src_port: src_port.clone(),
            dst,
            dst_port: dst_port.clone(),
            reason,
        };

        let src_node = self.nodes.get(src).ok_or(GraphError::UnknownNode(src))?;
        match src_node.port(&src_port) {
            None => {
                return Err(GraphError::UnknownPort {
                    node: src,
                    port: src_port.clone(),
                })
            }
            Some(port) if port.is_input() => return Err(invalid("source is not an output")),
            Some(_) => {}
        }
        let dst_node = self.nodes.get(dst).ok_or(GraphError::UnknownNode(dst))?;
        match dst_node.port(&dst_port) {
            None => {
                return Err(GraphError::UnknownPort {
                    node: dst,
                    port: dst_port.clone(),
                })
            }
            Some(port) if !port.is_input() => {
                return Err(invalid("destination is not an input"))
            }
            Some(_) => {}
        }
        assert!(
            !dst_node.holder(&dst_port).is_some_and(ValueHolder::is_connected),
            "input {} of {} is already connected",
            dst_port,
            dst
        );

        // The link resolves through the source's output holder
        if let Some(node) = self.nodes.get_mut(src) {
            node.get_value(&src_port);
        }
        let link = Link {
            node: src,
            port: src_port.clone(),
        };
        match self
            .nodes
            .get_mut(dst)
            .and_then(|n| n.get_value(&dst_port))
            .and_then(ValueHolder::as_input_mut)
        {
            Some(input) => input.connect(link),
            None => return Err(invalid("destination holder is not an input")),
        }

        let connection = Connection::new(src, src_port, dst, dst_port);
        self.forward.entry(src).or_default().insert(connection.clone());
        self.reverse.entry(dst).or_default().insert(connection.clone());
        tracing::debug!(
            "Connected {}.{} -> {}.{}",
            connection.src,
            connection.src_port,
            connection.dst,
            connection.dst_port
        );
        self.notify(|l| l.created_connection(&connection));
        Ok(())
    }

    /// Remove a connection.
    ///
    /// If the destination port no longer exists, or its holder is no longer
    /// linked to the source, only the index entries are removed.
    ///
    /// # Panics
    /// If the connection is not part of the graph.
    pub fn remove_connection(&mut self, connection: &Connection) {
        self.remove_connection_inner(connection, true);
    }

    fn remove_connection_inner(&mut self, connection: &Connection, warn_stale: bool) {
        let removed = self
            .forward
            .get_mut(&connection.src)
            .is_some_and(|set| set.remove(connection));
        assert!(removed, "connection {:?} is not part of the graph", connection);
        if let Some(set) = self.reverse.get_mut(&connection.dst) {
            set.remove(connection);
        }

        let link = Link {
            node: connection.src,
            port: connection.src_port.clone(),
        };
        let input = self
            .nodes
            .get_mut(connection.dst)
            .filter(|n| n.has_port(&connection.dst_port))
            .and_then(|n| n.holder_mut(&connection.dst_port))
            .and_then(ValueHolder::as_input_mut);
        match input {
            Some(input) if input.link() == Some(&link) => input.disconnect(),
            _ if warn_stale => tracing::warn!(
                "Connection {}.{} -> {}.{} is stale, removed from the index only",
                connection.src,
                connection.src_port,
                connection.dst,
                connection.dst_port
            ),
            _ => tracing::debug!(
                "Dropped index entry for {} -> {}.{}",
                connection.src,
                connection.dst,
                connection.dst_port
            ),
        }

        self.notify(|l| l.removed_connection(connection));
    }

    /// Disconnect whatever feeds `port`. Returns whether a connection existed.
    pub fn disconnect_input(&mut self, node: NodeId, port: &PortId) -> bool {
        let existing = self.connections_at(node, port);
        for connection in &existing {
            self.remove_connection(connection);
        }
        !existing.is_empty()
    }

    /// Replace a node's custom ports. Connections touching dropped or
    /// retyped ports are removed.
    pub fn set_custom_ports(
        &mut self,
        node: NodeId,
        ports: Vec<PortDescriptor>,
    ) -> GraphResult<PortDiff> {
        let diff = self
            .nodes
            .get_mut(node)
            .ok_or(GraphError::UnknownNode(node))?
            .set_custom_ports(ports)?;

        let stale: Vec<Connection> = diff
            .dropped
            .iter()
            .flat_map(|port| self.connections_at(node, port))
            .collect();
        for connection in &stale {
            self.remove_connection_inner(connection, false);
        }

        tracing::debug!(
            "Custom ports of {} changed: {} dropped, {} added",
            node,
            diff.dropped.len(),
            diff.added.len()
        );
        self.notify(|l| l.changed_ports(node));
        Ok(diff)
    }

    fn apply_custom_ports(&mut self, node: NodeId, ports: Vec<PortDescriptor>) {
        if let Err(e) = self.set_custom_ports(node, ports) {
            tracing::warn!("Rejected custom ports requested by {}: {}", node, e);
        }
    }

    /// Set the manual value of an input, or the value of an output.
    pub fn set_value(&mut self, node: NodeId, port: &PortId, value: Value) -> GraphResult<()> {
        let n = self.nodes.get_mut(node).ok_or(GraphError::UnknownNode(node))?;
        let dtype = n
            .port(port)
            .map(|p| p.dtype.clone())
            .ok_or_else(|| GraphError::UnknownPort {
                node,
                port: port.clone(),
            })?;
        let value = dtype.coerce(value).ok_or_else(|| GraphError::TypeMismatch {
            port: port.clone(),
            expected: dtype.name(),
        })?;
        if let Some(holder) = n.get_value(port) {
            holder.set(value);
        }
        Ok(())
    }

    /// Set editor data of a node, or of the graph itself with `None`.
    pub fn set_ui_data(&mut self, node: Option<NodeId>, data: JsonValue) -> GraphResult<()> {
        match node {
            Some(id) => self
                .nodes
                .get_mut(id)
                .ok_or(GraphError::UnknownNode(id))?
                .set_ui_data(data),
            None => self.ui_data = data,
        }
        self.notify(|l| l.changed_ui_data(node));
        Ok(())
    }

    // ==================== Evaluation ====================

    /// Recompute the cached order if structure changed since the last call.
    pub fn flush_order(&mut self) {
        if !self.order.is_dirty() {
            return;
        }

        // Cycle breakers go first and their inputs are not dependencies:
        // they read their sources before those recompute this tick.
        let (breakers, regular): (Vec<&Node>, Vec<&Node>) =
            self.nodes.iter().partition(|n| n.breaks_cycles());
        let sort_nodes: Vec<SortNode> = breakers
            .into_iter()
            .map(|n| SortNode {
                id: n.id(),
                layer: n.layer(),
                inputs: Vec::new(),
            })
            .chain(regular.into_iter().map(|n| SortNode {
                id: n.id(),
                layer: n.layer(),
                inputs: n.input_nodes(),
            }))
            .collect();
        let global = self.config.evaluate_globally;
        let sequence = topological_sort(&sort_nodes, global);

        let nodes = &self.nodes;
        let breaks = |id| nodes.get(id).is_some_and(Node::breaks_cycles);
        let layer = |id| nodes.get(id).map(Node::layer);
        let mut unordered = unordered_connections(&sequence, self.forward.values().flatten(), |c| {
            breaks(c.src) || breaks(c.dst) || (!global && layer(c.src) != layer(c.dst))
        });
        unordered.sort();

        if !unordered.is_empty() && self.config.warn_on_cycles {
            tracing::warn!(
                "Graph has a cycle! {} connection(s) evaluate against a stale value; insert a Delay node to break it",
                unordered.len()
            );
            for c in &unordered {
                tracing::warn!("  {}.{} -> {}.{}", c.src, c.src_port, c.dst, c.dst_port);
            }
        }
        tracing::debug!("Evaluation order recomputed: {} nodes", sequence.len());

        self.unordered = unordered;
        self.order.store(sequence);
    }

    pub fn evaluation_order(&mut self) -> &[NodeId] {
        self.flush_order();
        self.order.sequence()
    }

    /// Connections the evaluation order cannot respect (unbroken cycles).
    pub fn unordered_connections(&mut self) -> &[Connection] {
        self.flush_order();
        &self.unordered
    }

    /// Number of times the evaluation order has been recomputed.
    pub fn order_rebuilds(&self) -> u64 {
        self.order.rebuilds()
    }

    /// Run one pass timed by the wall clock.
    pub fn evaluate(&mut self, reset_instances: bool) -> EvaluationReport {
        let tick = self.clock.next();
        self.evaluate_tick(tick, reset_instances)
    }

    /// Run one pass with explicit timing.
    pub fn evaluate_tick(&mut self, tick: TickInfo, reset_instances: bool) -> EvaluationReport {
        self.flush_order();
        let order = self.order.sequence().to_vec();
        let mut report = EvaluationReport {
            tick,
            recomputed: Vec::new(),
        };

        for id in order {
            let Some(mut node) = self.nodes.take(id) else {
                continue;
            };
            let recomputed = node.evaluate(GraphEnv {
                lookup: &self.nodes,
                named: &mut self.named,
                registry: &self.registry,
                tick,
            });
            let pending = node.take_pending_ports();
            self.nodes.put(node);

            if recomputed {
                report.recomputed.push(id);
            }
            if let Some(ports) = pending {
                self.apply_custom_ports(id, ports);
            }
        }

        if reset_instances {
            self.reset_instances();
        }
        tracing::trace!(
            "Tick {}: {} node(s) recomputed",
            tick.tick,
            report.recomputed.len()
        );
        report
    }

    /// Clear `evaluated` marks and change flags on every node.
    pub fn reset_instances(&mut self) {
        for node in self.nodes.iter_mut() {
            node.reset();
        }
    }
}

impl Drop for Graph {
    fn drop(&mut self) {
        for id in self.nodes.ids() {
            if let Some(mut node) = self.nodes.take(id) {
                node.stop(GraphEnv {
                    lookup: &self.nodes,
                    named: &mut self.named,
                    registry: &self.registry,
                    tick: TickInfo::default(),
                });
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::dtype::DType;
    use crate::graph::listener::MockNodeGraphListener;
    use mockall::predicate::*;

    fn float(graph: &mut Graph, value: f64) -> NodeId {
        graph
            .create_node("Float", [(PortId::input("value"), Value::Float(value))])
            .unwrap()
    }

    fn link(graph: &mut Graph, src: NodeId, dst: NodeId) {
        graph
            .create_connection(src, PortId::output("value"), dst, PortId::input("value"))
            .unwrap();
    }

    #[test]
    fn test_ids_are_allocated_in_order() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 0.0);
        let b = float(&mut graph, 0.0);
        assert_eq!((a, b), (NodeId(0), NodeId(1)));

        let c = graph
            .create_node_with(NodeSpec::new("Float").with_id(NodeId(10)))
            .unwrap();
        assert_eq!(c, NodeId(10));
        assert_eq!(float(&mut graph, 0.0), NodeId(11));
        assert!(matches!(
            graph.create_node_with(NodeSpec::new("Float").with_id(NodeId(1))),
            Err(GraphError::IdInUse(_))
        ));
    }

    #[test]
    fn test_sparse_ids_and_top_of_range() {
        let mut graph = Graph::with_builtins();
        let far = graph
            .create_node_with(NodeSpec::new("Float").with_id(NodeId(u32::MAX - 1)))
            .unwrap();
        assert!(graph.contains(far));

        // The range above is exhausted, so allocation starts over from the bottom
        assert_eq!(float(&mut graph, 1.0), NodeId(0));
        assert_eq!(float(&mut graph, 2.0), NodeId(1));
        let ids: Vec<NodeId> = graph.nodes().map(Node::id).collect();
        assert_eq!(ids, vec![NodeId(0), NodeId(1), far]);
    }

    #[test]
    fn test_unknown_and_virtual_types() {
        let mut graph = Graph::with_builtins();
        assert!(matches!(
            graph.create_node("NoSuchType", []),
            Err(GraphError::UnknownType(_))
        ));
        assert!(matches!(
            graph.create_node("BinaryMath", []),
            Err(GraphError::VirtualType(_))
        ));
        assert!(graph.is_empty());
    }

    #[test]
    fn test_connection_reads_source() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 4.0);
        let b = float(&mut graph, 1.0);
        link(&mut graph, a, b);
        assert!(graph.is_connected(b, &PortId::input("value")));

        graph.evaluate(true);
        assert_eq!(graph.value(b, &PortId::output("value")), Some(Value::Float(4.0)));
    }

    #[test]
    fn test_connection_errors() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 0.0);
        let b = float(&mut graph, 0.0);
        assert!(matches!(
            graph.create_connection(a, PortId::output("nope"), b, PortId::input("value")),
            Err(GraphError::UnknownPort { .. })
        ));
        assert!(matches!(
            graph.create_connection(a, PortId::input("value"), b, PortId::input("value")),
            Err(GraphError::InvalidConnection { .. })
        ));
        assert!(matches!(
            graph.create_connection(a, PortId::output("value"), NodeId(99), PortId::input("value")),
            Err(GraphError::UnknownNode(_))
        ));
        assert_eq!(graph.connection_count(), 0);
    }

    #[test]
    fn test_disconnect_keeps_last_manual_value() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 4.0);
        let b = float(&mut graph, 1.0);
        link(&mut graph, a, b);
        graph.evaluate(true);

        assert!(graph.disconnect_input(b, &PortId::input("value")));
        assert!(!graph.disconnect_input(b, &PortId::input("value")));
        assert_eq!(graph.value(b, &PortId::input("value")), Some(Value::Float(1.0)));

        let report = graph.evaluate(true);
        assert!(report.was_recomputed(b));
        assert_eq!(graph.value(b, &PortId::output("value")), Some(Value::Float(1.0)));
    }

    #[test]
    #[should_panic(expected = "not part of the graph")]
    fn test_remove_unknown_connection_panics() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 0.0);
        let b = float(&mut graph, 0.0);
        graph.remove_connection(&Connection::new(
            a,
            PortId::output("value"),
            b,
            PortId::input("value"),
        ));
    }

    #[test]
    fn test_set_value_coerces_and_checks() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 0.0);
        graph
            .set_value(a, &PortId::input("value"), Value::Int(2))
            .unwrap();
        assert_eq!(graph.value(a, &PortId::input("value")), Some(Value::Float(2.0)));
        assert!(matches!(
            graph.set_value(a, &PortId::input("value"), Value::Text("x".into())),
            Err(GraphError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_listener_notifications() {
        let mut mock = MockNodeGraphListener::new();
        mock.expect_created_node()
            .with(eq(NodeId(0)), eq("Float"))
            .times(1)
            .return_const(());
        mock.expect_created_node()
            .with(eq(NodeId(1)), eq("Float"))
            .times(1)
            .return_const(());
        mock.expect_created_connection().times(1).return_const(());
        mock.expect_removed_connection().times(1).return_const(());
        mock.expect_removed_node()
            .with(eq(NodeId(0)))
            .times(1)
            .return_const(());
        mock.expect_changed_ui_data()
            .with(eq(None::<NodeId>))
            .times(1)
            .return_const(());

        let mut graph = Graph::with_builtins();
        graph.add_listener(Box::new(mock));
        let a = float(&mut graph, 0.0);
        let b = float(&mut graph, 0.0);
        link(&mut graph, a, b);
        graph.remove_node(a).unwrap();
        graph
            .set_ui_data(None, serde_json::json!({ "zoom": 1.5 }))
            .unwrap();
    }

    #[test]
    fn test_order_cached_until_structure_changes() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 0.0);
        let b = float(&mut graph, 0.0);
        link(&mut graph, a, b);

        let first = graph.evaluation_order().to_vec();
        let second = graph.evaluation_order().to_vec();
        assert_eq!(first, second);
        assert_eq!(graph.order_rebuilds(), 1);

        graph.set_value(a, &PortId::input("value"), Value::Float(3.0)).unwrap();
        graph.evaluation_order();
        assert_eq!(graph.order_rebuilds(), 1);

        float(&mut graph, 0.0);
        graph.evaluation_order();
        assert_eq!(graph.order_rebuilds(), 2);
    }

    #[test]
    fn test_cycle_is_reported_not_rejected() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 1.0);
        let b = float(&mut graph, 2.0);
        link(&mut graph, a, b);
        link(&mut graph, b, a);

        assert_eq!(graph.unordered_connections().len(), 1);
        // Still evaluates every node once
        let report = graph.evaluate(true);
        assert_eq!(report.recomputed.len(), 2);
    }

    #[test]
    fn test_delay_breaks_cycle() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 1.0);
        let delay = graph.create_node("Delay", []).unwrap();
        link(&mut graph, a, delay);
        link(&mut graph, delay, a);
        assert!(graph.unordered_connections().is_empty());
    }

    #[test]
    fn test_layers_follow_config() {
        let mut graph = Graph::with_builtins();
        let reader = graph
            .create_node_with(NodeSpec::new("Float").in_layer(LayerId(0)))
            .unwrap();
        let source = graph
            .create_node_with(NodeSpec::new("Float").in_layer(LayerId(1)))
            .unwrap();
        link(&mut graph, source, reader);

        assert_eq!(graph.evaluation_order(), &[reader, source]);
        assert!(graph.unordered_connections().is_empty());

        graph.set_evaluate_globally(true);
        assert_eq!(graph.evaluation_order(), &[source, reader]);
    }

    #[test]
    fn test_custom_port_change_drops_connections() {
        let mut graph = Graph::with_builtins();
        let src = float(&mut graph, 0.0);
        let dst = float(&mut graph, 0.0);
        graph
            .set_custom_ports(dst, vec![PortDescriptor::input("extra", DType::float(0.0))])
            .unwrap();
        graph
            .create_connection(src, PortId::output("value"), dst, PortId::input("extra"))
            .unwrap();

        let diff = graph.set_custom_ports(dst, Vec::new()).unwrap();
        assert_eq!(diff.dropped, vec![PortId::input("extra")]);
        assert_eq!(graph.connection_count(), 0);
        assert!(graph.connections_of(dst).is_empty());
    }

    #[test]
    fn test_reset_false_keeps_flags() {
        let mut graph = Graph::with_builtins();
        let a = float(&mut graph, 5.0);
        graph.evaluate(false);
        assert!(graph.node(a).unwrap().is_evaluated());
        assert!(graph
            .holder(a, &PortId::output("value"))
            .unwrap()
            .has_changed(graph.lookup()));

        graph.reset_instances();
        assert!(!graph.node(a).unwrap().is_evaluated());
    }
}
