//! Composite module nodes.
//!
//! A `Module` owns an inner [`Graph`]. Every `ModuleInput` node inside it
//! becomes a float input of the module and every `ModuleOutput` node a
//! float output, named after the node's `name` input. Values cross the
//! boundary with `copy_to`, so only changed values are forwarded.
//!
//! The inner graph is persisted as the module's opaque node state.

use crate::config::GraphConfig;
use crate::graph::document::{deserialize, serialize_all, GraphDocument};
use crate::graph::dtype::DType;
use crate::graph::executor::Graph;
use crate::graph::id::{NodeId, PortId};
use crate::graph::node::{NodeContext, NodePlugin};
use crate::graph::port::PortDescriptor;
use serde_json::Value as JsonValue;
use std::any::Any;
use std::collections::BTreeSet;

pub const MODULE_INPUT: &str = "ModuleInput";
pub const MODULE_OUTPUT: &str = "ModuleOutput";

/// Marks an input of the enclosing module. Its output carries the value
/// the module received.
pub struct ModuleInputNode;

impl ModuleInputNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("name", DType::text("")),
            PortDescriptor::output("value", DType::float(0.0)),
        ]
    }
}

/// Marks an output of the enclosing module.
pub struct ModuleOutputNode;

impl ModuleOutputNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("name", DType::text("")),
            PortDescriptor::input("value", DType::float(0.0)),
        ]
    }
}

/// One boundary port and the inner node behind it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct BoundaryPort {
    name: String,
    node: NodeId,
}

#[derive(Default)]
pub struct ModuleNode {
    document: GraphDocument,
    inner: Option<Graph>,
    inputs: Vec<BoundaryPort>,
    outputs: Vec<BoundaryPort>,
    ports_stale: bool,
}

impl ModuleNode {
    pub fn new() -> Self {
        Self::default()
    }

    /// Module whose inner graph is loaded from `document` on start.
    pub fn from_document(document: GraphDocument) -> Self {
        Self {
            document,
            ..Self::default()
        }
    }

    pub fn inner(&self) -> Option<&Graph> {
        self.inner.as_ref()
    }

    /// Mutable access to the inner graph. The module's ports are rebuilt
    /// from the boundary nodes on its next recompute.
    pub fn inner_mut(&mut self) -> Option<&mut Graph> {
        self.ports_stale = true;
        self.inner.as_mut()
    }

    /// Boundary port names, inputs then outputs.
    pub fn port_names(&self) -> (Vec<&str>, Vec<&str>) {
        (
            self.inputs.iter().map(|p| p.name.as_str()).collect(),
            self.outputs.iter().map(|p| p.name.as_str()).collect(),
        )
    }

    fn build_inner(&mut self, ctx: &NodeContext) {
        let mut inner = Graph::new(ctx.registry.clone(), GraphConfig::default());
        let report = deserialize(&mut inner, &self.document, false);
        if !report.is_clean() {
            tracing::warn!(
                "Module {}: inner graph loaded with {} warning(s)",
                ctx.id,
                report.warnings.len()
            );
        }
        self.inner = Some(inner);
        self.ports_stale = true;
    }

    fn rebuild_ports(&mut self, ctx: &mut NodeContext) {
        self.ports_stale = false;
        let Some(inner) = &self.inner else {
            return;
        };
        self.inputs = boundary(inner, MODULE_INPUT, "in");
        self.outputs = boundary(inner, MODULE_OUTPUT, "out");

        let ports = self
            .inputs
            .iter()
            .map(|p| PortDescriptor::input(&p.name, DType::float(0.0)).with_group("module"))
            .chain(
                self.outputs
                    .iter()
                    .map(|p| PortDescriptor::output(&p.name, DType::float(0.0)).with_group("module")),
            )
            .collect();
        ctx.request_custom_ports(ports);
    }
}

/// Boundary nodes of `type_name` in id order, with unique names.
fn boundary(graph: &Graph, type_name: &str, fallback: &str) -> Vec<BoundaryPort> {
    let mut seen = BTreeSet::new();
    let mut ports = Vec::new();
    for node in graph.nodes().filter(|n| n.type_name() == type_name) {
        let name = graph
            .value(node.id(), &PortId::input("name"))
            .and_then(|v| v.as_str().map(str::to_string))
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| format!("{}_{}", fallback, node.id().0));
        if !seen.insert(name.clone()) {
            tracing::warn!("Duplicate module port '{}' on {}, ignored", name, node.id());
            continue;
        }
        ports.push(BoundaryPort {
            name,
            node: node.id(),
        });
    }
    ports
}

impl NodePlugin for ModuleNode {
    fn name(&self) -> &str {
        "Module"
    }

    fn start(&mut self, ctx: &mut NodeContext) {
        self.build_inner(ctx);
        self.rebuild_ports(ctx);
    }

    fn recompute(&mut self, ctx: &mut NodeContext) {
        if self.inner.is_none() {
            self.build_inner(ctx);
        }
        if self.ports_stale {
            self.rebuild_ports(ctx);
        }
        let Some(inner) = self.inner.as_mut() else {
            return;
        };

        for port in &self.inputs {
            let outer = PortId::input(&port.name);
            ctx.holder_mut(&outer);
            let (Some(src), Some(dst)) = (
                ctx.holder(&outer),
                inner.holder_mut(port.node, &PortId::output("value")),
            ) else {
                continue;
            };
            src.copy_to(ctx.lookup(), dst);
        }

        inner.evaluate_tick(ctx.tick, false);

        for port in &self.outputs {
            let Some(src) = inner.holder(port.node, &PortId::input("value")) else {
                continue;
            };
            if let Some(dst) = ctx.holder_mut(&PortId::output(&port.name)) {
                src.copy_to(inner.lookup(), dst);
            }
        }

        inner.reset_instances();
    }

    fn stop(&mut self, _ctx: &mut NodeContext) {
        if let Some(inner) = self.inner.take() {
            self.document = serialize_all(&inner);
        }
    }

    fn always_evaluate(&self) -> bool {
        true
    }

    fn save_state(&self) -> Option<JsonValue> {
        let document = match &self.inner {
            Some(inner) => serialize_all(inner),
            None => self.document.clone(),
        };
        match serde_json::to_value(document) {
            Ok(state) => Some(state),
            Err(e) => {
                tracing::warn!("Module state not saved: {}", e);
                None
            }
        }
    }

    fn load_state(&mut self, state: &JsonValue) {
        match serde_json::from_value::<GraphDocument>(state.clone()) {
            Ok(document) => {
                self.document = document;
                // Rebuilt from the new document on the next hook
                self.inner = None;
            }
            Err(e) => tracing::warn!("Module state not loaded: {}", e),
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Inner document of a module that doubles its input.
#[cfg(test)]
pub(crate) fn doubling_document() -> GraphDocument {
    use crate::graph::dtype::Value;
    use crate::graph::executor::NodeSpec;

    let mut graph = Graph::with_builtins();
    let input = graph
        .create_node_with(
            NodeSpec::new(MODULE_INPUT).with_value(PortId::input("name"), Value::Text("x".into())),
        )
        .unwrap();
    let add = graph.create_node("Add", []).unwrap();
    let output = graph
        .create_node_with(
            NodeSpec::new(MODULE_OUTPUT).with_value(PortId::input("name"), Value::Text("y".into())),
        )
        .unwrap();
    graph
        .create_connection(input, PortId::output("value"), add, PortId::input("a"))
        .unwrap();
    graph
        .create_connection(input, PortId::output("value"), add, PortId::input("b"))
        .unwrap();
    graph
        .create_connection(add, PortId::output("result"), output, PortId::input("value"))
        .unwrap();
    serialize_all(&graph)
}
