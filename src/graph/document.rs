//! Graph documents: saving and loading graphs as JSON.
//!
//! Loading is best effort. Unknown node types, unknown dtypes, missing
//! ports and unreadable values are logged, recorded in the [`LoadReport`]
//! and skipped; the rest of the document still loads.

use crate::graph::dtype::DType;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::executor::{Graph, NodeSpec};
use crate::graph::id::{LayerId, NodeId, PortId};
use crate::graph::node::Node;
use crate::graph::node_type::NodeTypeDescriptor;
use crate::graph::port::PortDescriptor;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// A saved graph.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphDocument {
    #[serde(default)]
    pub ui_data: JsonValue,
    #[serde(default)]
    pub nodes: Vec<NodeEntry>,
    #[serde(default)]
    pub connections: Vec<ConnectionEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeEntry {
    pub id: NodeId,
    #[serde(rename = "type")]
    pub type_name: String,
    #[serde(default)]
    pub ui_data: JsonValue,
    /// Every materialized value, keyed by port id.
    #[serde(default)]
    pub manual_values: Map<String, JsonValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub custom_ports: Option<Vec<(String, CustomPortEntry)>>,
    #[serde(default, skip_serializing_if = "LayerId::is_root")]
    pub layer: LayerId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<JsonValue>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CustomPortEntry {
    pub name: String,
    pub dtype: String,
    #[serde(default)]
    pub dtype_args: JsonValue,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionEntry {
    pub src_node_id: NodeId,
    pub src_port_id: String,
    pub dst_node_id: NodeId,
    pub dst_port_id: String,
}

impl GraphDocument {
    pub fn from_json(text: &str) -> GraphResult<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_json_pretty(&self) -> GraphResult<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn load(path: &Path) -> GraphResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    pub fn save(&self, path: &Path) -> GraphResult<()> {
        std::fs::write(path, self.to_json_pretty()?)?;
        tracing::info!("Saved graph with {} nodes to {:?}", self.nodes.len(), path);
        Ok(())
    }
}

/// What a load did and what it had to skip.
#[derive(Debug, Clone, Default)]
pub struct LoadReport {
    /// Saved id to id in the graph.
    pub id_map: BTreeMap<NodeId, NodeId>,
    /// Saved ids of nodes that were not created.
    pub ignored_nodes: Vec<NodeId>,
    pub skipped_connections: usize,
    pub warnings: Vec<String>,
}

impl LoadReport {
    fn warn(&mut self, message: String) {
        tracing::warn!("{}", message);
        self.warnings.push(message);
    }

    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

// ==================== Serialize ====================

fn custom_port_entry(port: &PortDescriptor) -> (String, CustomPortEntry) {
    (
        port.id().to_string(),
        CustomPortEntry {
            name: port.name.clone(),
            dtype: port.dtype.name().to_string(),
            dtype_args: port.dtype.args(),
            group: port.group.clone(),
        },
    )
}

fn node_entry(node: &Node) -> NodeEntry {
    let manual_values = node
        .values()
        .filter_map(|(id, holder)| {
            let port = node.port(id)?;
            Some((id.to_string(), port.dtype.serialize_value(holder.manual())))
        })
        .collect();
    let custom_ports = (!node.custom_ports().is_empty())
        .then(|| node.custom_ports().iter().map(custom_port_entry).collect());

    NodeEntry {
        id: node.id(),
        type_name: node.type_name().to_string(),
        ui_data: node.ui_data().clone(),
        manual_values,
        custom_ports,
        layer: node.layer(),
        state: node.save_state(),
    }
}

/// Save the nodes accepted by `filter` and the connections between them.
pub fn serialize(graph: &Graph, filter: impl Fn(&Node) -> bool) -> GraphDocument {
    let nodes: Vec<NodeEntry> = graph.nodes().filter(|n| filter(n)).map(node_entry).collect();
    let included: BTreeSet<NodeId> = nodes.iter().map(|n| n.id).collect();
    let connections = graph
        .connections()
        .into_iter()
        .filter(|c| included.contains(&c.src) && included.contains(&c.dst))
        .map(|c| ConnectionEntry {
            src_node_id: c.src,
            src_port_id: c.src_port.to_string(),
            dst_node_id: c.dst,
            dst_port_id: c.dst_port.to_string(),
        })
        .collect();

    GraphDocument {
        ui_data: graph.ui_data().clone(),
        nodes,
        connections,
    }
}

pub fn serialize_all(graph: &Graph) -> GraphDocument {
    serialize(graph, |_| true)
}

// ==================== Deserialize ====================

fn custom_ports_from_entry(
    entries: &[(String, CustomPortEntry)],
    saved_id: NodeId,
    report: &mut LoadReport,
) -> Vec<PortDescriptor> {
    let mut ports = Vec::with_capacity(entries.len());
    for (raw_id, entry) in entries {
        let Some(id) = PortId::parse(raw_id) else {
            report.warn(format!("Node {}: malformed custom port id '{}'", saved_id, raw_id));
            continue;
        };
        let dtype = match DType::from_parts(&entry.dtype, &entry.dtype_args) {
            Ok(dtype) => dtype,
            Err(e) => {
                report.warn(format!("Node {}: custom port {} skipped, {}", saved_id, raw_id, e));
                continue;
            }
        };
        if id.name() != entry.name {
            tracing::debug!("Custom port {} saved as '{}', using the id", raw_id, entry.name);
        }
        ports.push(PortDescriptor {
            name: id.name().to_string(),
            direction: id.direction(),
            dtype,
            group: entry.group.clone(),
            custom: true,
        });
    }
    ports
}

fn spec_from_entry(
    entry: &NodeEntry,
    descriptor: &NodeTypeDescriptor,
    report: &mut LoadReport,
) -> NodeSpec {
    let mut spec = NodeSpec::new(&entry.type_name)
        .in_layer(entry.layer)
        .with_ui_data(entry.ui_data.clone());

    let custom = entry
        .custom_ports
        .as_deref()
        .map(|ports| custom_ports_from_entry(ports, entry.id, report));

    // Values are decoded against the ports that exist once custom ports are installed
    for (raw_id, raw) in &entry.manual_values {
        let port = PortId::parse(raw_id).and_then(|id| {
            descriptor
                .port(&id)
                .or_else(|| custom.iter().flatten().find(|p| p.id() == id))
                .map(|p| (id, p.dtype.clone()))
        });
        let Some((id, dtype)) = port else {
            report.warn(format!(
                "Node {} ({}): no port '{}', value dropped",
                entry.id, entry.type_name, raw_id
            ));
            continue;
        };
        match dtype.unserialize_value(raw) {
            Some(value) => spec.initial_values.push((id, value)),
            None => report.warn(format!(
                "Node {}: value {} for {} is not a {}, using the default",
                entry.id, raw, raw_id, dtype
            )),
        }
    }

    spec.custom_ports = custom;
    spec.state = entry.state.clone();
    spec
}

/// Load `doc` into `graph`.
///
/// With `id_remapping` every node gets a fresh id. Without it saved ids are
/// kept where free, and remapped with a warning where taken.
pub fn deserialize(graph: &mut Graph, doc: &GraphDocument, id_remapping: bool) -> LoadReport {
    let mut report = LoadReport::default();

    for entry in &doc.nodes {
        let Some(descriptor) = graph.registry().get(&entry.type_name).cloned() else {
            report.warn(format!(
                "Node {}: unknown type '{}', ignored",
                entry.id, entry.type_name
            ));
            report.ignored_nodes.push(entry.id);
            continue;
        };
        if descriptor.is_virtual() {
            report.warn(format!(
                "Node {}: type '{}' is virtual, ignored",
                entry.id, entry.type_name
            ));
            report.ignored_nodes.push(entry.id);
            continue;
        }

        let mut spec = spec_from_entry(entry, &descriptor, &mut report);
        if !id_remapping {
            if !entry.id.is_valid() {
                report.warn(format!("Node id {} is reserved, remapped", entry.id));
            } else if graph.contains(entry.id) {
                report.warn(format!("Node id {} already in use, remapped", entry.id));
            } else {
                spec.id = Some(entry.id);
            }
        }

        match graph.create_node_with(spec) {
            Ok(id) => {
                report.id_map.insert(entry.id, id);
            }
            Err(e) => {
                report.warn(format!("Node {}: {}", entry.id, e));
                report.ignored_nodes.push(entry.id);
            }
        }
    }

    for entry in &doc.connections {
        if let Err(reason) = load_connection(graph, entry, &report.id_map) {
            report.skipped_connections += 1;
            report.warn(format!(
                "Connection {}.{} -> {}.{} skipped: {}",
                entry.src_node_id, entry.src_port_id, entry.dst_node_id, entry.dst_port_id, reason
            ));
        }
    }

    if !id_remapping && !doc.ui_data.is_null() {
        if let Err(e) = graph.set_ui_data(None, doc.ui_data.clone()) {
            report.warn(format!("Graph ui data not restored: {}", e));
        }
    }

    tracing::info!(
        "Loaded {} node(s) and {} connection(s), {} warning(s)",
        report.id_map.len(),
        doc.connections.len() - report.skipped_connections,
        report.warnings.len()
    );
    report
}

fn load_connection(
    graph: &mut Graph,
    entry: &ConnectionEntry,
    id_map: &BTreeMap<NodeId, NodeId>,
) -> Result<(), String> {
    let src = *id_map
        .get(&entry.src_node_id)
        .ok_or("source node was not loaded")?;
    let dst = *id_map
        .get(&entry.dst_node_id)
        .ok_or("destination node was not loaded")?;
    let src_port = PortId::parse(&entry.src_port_id).ok_or("malformed source port id")?;
    let dst_port = PortId::parse(&entry.dst_port_id).ok_or("malformed destination port id")?;

    let has_port = |node: NodeId, port: &PortId| graph.node(node).is_some_and(|n| n.has_port(port));
    if !has_port(src, &src_port) {
        return Err(format!("source has no port {}", src_port));
    }
    if !has_port(dst, &dst_port) {
        return Err(format!("destination has no port {}", dst_port));
    }
    if graph.is_connected(dst, &dst_port) {
        return Err("destination input is already connected".to_string());
    }

    graph
        .create_connection(src, src_port, dst, dst_port)
        .map_err(|e: GraphError| e.to_string())
}

/// Copy `nodes` and the connections among them into fresh ids.
pub fn duplicate_nodes(graph: &mut Graph, nodes: &[NodeId]) -> LoadReport {
    let selected: BTreeSet<NodeId> = nodes.iter().copied().collect();
    let doc = serialize(graph, |n| selected.contains(&n.id()));
    deserialize(graph, &doc, true)
}
