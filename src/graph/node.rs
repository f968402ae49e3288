//! Node instances and node behavior.
//!
//! Two-layer design for behavior:
//! - **`NodePlugin` trait** for node types defined outside the built-in library
//!   and for nodes that need downcasting (modules, external sources).
//! - **`BuiltinNode` enum** for the built-in library. Match arms are inlined,
//!   so the per-tick hot path has no dynamic dispatch.
//!
//! `AnyNode` wraps either variant so the graph handles both uniformly.
//!
//! A [`Node`] owns its ports (declared by its type plus instance-local custom
//! ports), the value holders behind them and its evaluation state.

use crate::graph::dtype::Value;
use crate::graph::error::{GraphError, GraphResult};
use crate::graph::id::{LayerId, NodeId, PortId};
use crate::graph::node_type::{NodeType, NodeTypeDescriptor, NodeTypeRegistry};
use crate::graph::nodes::{
    ColorNode, DelayNode, ExpressionNode, FloatNode, GetVarNode, LfoNode, MathNode,
    ModuleInputNode, ModuleOutputNode, SetVarNode, TimeNode, WeightedChoiceNode,
};
use crate::graph::port::{diff_ports, PortDescriptor, PortDiff};
use crate::graph::value::{InputValue, OutputLookup, SettableValue, ValueHolder};
use serde_json::Value as JsonValue;
use std::any::Any;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

/// Graph-scoped map from a logical name to the node that owns it.
pub type NamedNodes = BTreeMap<String, NodeId>;

/// Timing of one evaluation pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TickInfo {
    /// Time since the graph's clock started.
    pub time: Duration,
    /// Time since the previous tick.
    pub dt: Duration,
    /// Monotonic tick counter.
    pub tick: u64,
}

impl TickInfo {
    /// Tick `tick` of a fixed-rate clock. Times past `Duration::MAX`
    /// saturate.
    pub fn fixed(tick: u64, rate_hz: f64) -> Self {
        let period = if rate_hz > 0.0 { 1.0 / rate_hz } else { 0.0 };
        let saturating = |secs: f64| Duration::try_from_secs_f64(secs).unwrap_or(Duration::MAX);
        Self {
            time: saturating(period * tick as f64),
            dt: saturating(if tick == 0 { 0.0 } else { period }),
            tick,
        }
    }

    #[inline]
    pub fn seconds(&self) -> f64 {
        self.time.as_secs_f64()
    }

    #[inline]
    pub fn dt_seconds(&self) -> f64 {
        self.dt.as_secs_f64()
    }
}

/// What a node sees of its graph while one of its hooks runs.
pub struct GraphEnv<'a> {
    pub lookup: &'a dyn OutputLookup,
    pub named: &'a mut NamedNodes,
    pub registry: &'a Arc<NodeTypeRegistry>,
    pub tick: TickInfo,
}

/// Context passed to node hooks.
pub struct NodeContext<'a> {
    pub id: NodeId,
    pub tick: TickInfo,
    pub registry: &'a Arc<NodeTypeRegistry>,
    ports: &'a [PortDescriptor],
    custom_ports: &'a [PortDescriptor],
    values: &'a mut BTreeMap<PortId, ValueHolder>,
    lookup: &'a dyn OutputLookup,
    named: &'a mut NamedNodes,
    pending_ports: &'a mut Option<Vec<PortDescriptor>>,
}

impl<'a> NodeContext<'a> {
    /// Current value of an input, or `None` if the node has no such input.
    pub fn input(&mut self, name: &str) -> Option<Value> {
        let lookup = self.lookup;
        materialize(self.ports, self.values, &PortId::input(name)).map(|h| h.get(lookup).clone())
    }

    pub fn input_f64(&mut self, name: &str) -> f64 {
        self.input(name).and_then(|v| v.as_f64()).unwrap_or(0.0)
    }

    pub fn input_i64(&mut self, name: &str) -> i64 {
        self.input(name).and_then(|v| v.as_i64()).unwrap_or(0)
    }

    pub fn input_text(&mut self, name: &str) -> String {
        match self.input(name) {
            Some(Value::Text(s)) => s,
            _ => String::new(),
        }
    }

    pub fn input_changed(&self, name: &str) -> bool {
        self.values
            .get(&PortId::input(name))
            .is_some_and(|h| h.has_changed(self.lookup))
    }

    /// Write an output and mark it changed, even when the value is equal.
    pub fn set_output(&mut self, name: &str, value: Value) {
        let id = PortId::output(name);
        match materialize(self.ports, self.values, &id) {
            Some(holder) => holder.set(value),
            None => tracing::warn!("Node {} has no output {}", self.id, id),
        }
    }

    pub fn output(&self, name: &str) -> Option<&Value> {
        self.values
            .get(&PortId::output(name))
            .and_then(ValueHolder::as_output)
            .map(SettableValue::get)
    }

    pub fn holder(&self, port: &PortId) -> Option<&ValueHolder> {
        self.values.get(port)
    }

    pub fn holder_mut(&mut self, port: &PortId) -> Option<&mut ValueHolder> {
        materialize(self.ports, self.values, port)
    }

    pub fn lookup(&self) -> &dyn OutputLookup {
        self.lookup
    }

    pub fn lookup_output(&self, node: NodeId, port: &PortId) -> Option<&Value> {
        self.lookup.output(node, port).map(SettableValue::get)
    }

    pub fn custom_ports(&self) -> &[PortDescriptor] {
        self.custom_ports
    }

    /// Replace this node's custom ports once the current hook returns.
    pub fn request_custom_ports(&mut self, ports: Vec<PortDescriptor>) {
        *self.pending_ports = Some(ports);
    }

    pub fn named_node(&self, name: &str) -> Option<NodeId> {
        self.named.get(name).copied()
    }

    pub fn register_name(&mut self, name: &str) {
        if let Some(previous) = self.named.insert(name.to_string(), self.id) {
            if previous != self.id {
                tracing::warn!("Name '{}' moved from {} to {}", name, previous, self.id);
            }
        }
    }

    /// Release a name, unless another node has claimed it since.
    pub fn unregister_name(&mut self, name: &str) {
        if self.named.get(name) == Some(&self.id) {
            self.named.remove(name);
        }
    }
}

fn materialize<'v>(
    ports: &[PortDescriptor],
    values: &'v mut BTreeMap<PortId, ValueHolder>,
    id: &PortId,
) -> Option<&'v mut ValueHolder> {
    if !values.contains_key(id) {
        let port = ports.iter().find(|p| &p.id() == id)?;
        let holder = if port.is_input() {
            ValueHolder::Input(InputValue::new(port.default_value()))
        } else {
            ValueHolder::Output(SettableValue::new(port.default_value()))
        };
        values.insert(id.clone(), holder);
    }
    values.get_mut(id)
}

/// Trait for pluggable node behavior.
pub trait NodePlugin: Send {
    /// Human-readable name of this node.
    fn name(&self) -> &str;

    /// Called once when the node joins a graph.
    fn start(&mut self, _ctx: &mut NodeContext) {}

    /// Called when the node must recompute its outputs.
    fn recompute(&mut self, ctx: &mut NodeContext);

    /// Called once when the node leaves its graph.
    fn stop(&mut self, _ctx: &mut NodeContext) {}

    fn always_evaluate(&self) -> bool {
        false
    }

    /// Opaque state persisted with the node.
    fn save_state(&self) -> Option<JsonValue> {
        None
    }

    fn load_state(&mut self, _state: &JsonValue) {}

    fn as_any(&self) -> &dyn Any;

    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Enum dispatch for built-in nodes.
pub enum BuiltinNode {
    Float(FloatNode),
    Math(MathNode),
    Time(TimeNode),
    Lfo(LfoNode),
    Delay(DelayNode),
    Color(ColorNode),
    WeightedChoice(WeightedChoiceNode),
    Expression(ExpressionNode),
    SetVar(SetVarNode),
    GetVar(GetVarNode),
    ModuleInput(ModuleInputNode),
    ModuleOutput(ModuleOutputNode),
}

impl BuiltinNode {
    pub fn name(&self) -> &str {
        match self {
            BuiltinNode::Float(_) => "Float",
            BuiltinNode::Math(n) => n.name(),
            BuiltinNode::Time(_) => "Time",
            BuiltinNode::Lfo(_) => "Lfo",
            BuiltinNode::Delay(_) => "Delay",
            BuiltinNode::Color(_) => "Color",
            BuiltinNode::WeightedChoice(_) => "WeightedChoice",
            BuiltinNode::Expression(_) => "Expression",
            BuiltinNode::SetVar(_) => "SetVar",
            BuiltinNode::GetVar(_) => "GetVar",
            BuiltinNode::ModuleInput(_) => "ModuleInput",
            BuiltinNode::ModuleOutput(_) => "ModuleOutput",
        }
    }

    pub fn start(&mut self, ctx: &mut NodeContext) {
        match self {
            BuiltinNode::WeightedChoice(n) => n.start(ctx),
            BuiltinNode::SetVar(n) => n.start(ctx),
            _ => {}
        }
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        match self {
            BuiltinNode::Float(n) => n.recompute(ctx),
            BuiltinNode::Math(n) => n.recompute(ctx),
            BuiltinNode::Time(n) => n.recompute(ctx),
            BuiltinNode::Lfo(n) => n.recompute(ctx),
            BuiltinNode::Delay(n) => n.recompute(ctx),
            BuiltinNode::Color(n) => n.recompute(ctx),
            BuiltinNode::WeightedChoice(n) => n.recompute(ctx),
            BuiltinNode::Expression(n) => n.recompute(ctx),
            BuiltinNode::SetVar(n) => n.recompute(ctx),
            BuiltinNode::GetVar(n) => n.recompute(ctx),
            BuiltinNode::ModuleInput(_) | BuiltinNode::ModuleOutput(_) => {}
        }
    }

    pub fn stop(&mut self, ctx: &mut NodeContext) {
        if let BuiltinNode::SetVar(n) = self {
            n.stop(ctx);
        }
    }
}

/// Wrapper that holds either a built-in node (enum dispatch) or a plugin (trait object).
pub enum AnyNode {
    Builtin(BuiltinNode),
    Plugin(Box<dyn NodePlugin>),
}

impl AnyNode {
    pub fn name(&self) -> &str {
        match self {
            AnyNode::Builtin(n) => n.name(),
            AnyNode::Plugin(n) => n.name(),
        }
    }

    pub fn start(&mut self, ctx: &mut NodeContext) {
        match self {
            AnyNode::Builtin(n) => n.start(ctx),
            AnyNode::Plugin(n) => n.start(ctx),
        }
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        match self {
            AnyNode::Builtin(n) => n.recompute(ctx),
            AnyNode::Plugin(n) => n.recompute(ctx),
        }
    }

    pub fn stop(&mut self, ctx: &mut NodeContext) {
        match self {
            AnyNode::Builtin(n) => n.stop(ctx),
            AnyNode::Plugin(n) => n.stop(ctx),
        }
    }

    pub fn always_evaluate(&self) -> bool {
        match self {
            AnyNode::Builtin(_) => false,
            AnyNode::Plugin(n) => n.always_evaluate(),
        }
    }

    pub fn save_state(&self) -> Option<JsonValue> {
        match self {
            AnyNode::Builtin(_) => None,
            AnyNode::Plugin(n) => n.save_state(),
        }
    }

    pub fn load_state(&mut self, state: &JsonValue) {
        match self {
            AnyNode::Builtin(_) => {}
            AnyNode::Plugin(n) => n.load_state(state),
        }
    }
}

/// An instance of a node type living in a graph.
pub struct Node {
    id: NodeId,
    layer: LayerId,
    descriptor: Arc<NodeTypeDescriptor>,
    custom_ports: Vec<PortDescriptor>,
    /// Declared ports followed by custom ports.
    ports: Vec<PortDescriptor>,
    /// Created lazily on first access.
    values: BTreeMap<PortId, ValueHolder>,
    behavior: AnyNode,
    evaluated: bool,
    last_evaluated: Option<Duration>,
    ui_data: JsonValue,
    pending_ports: Option<Vec<PortDescriptor>>,
}

impl Node {
    pub fn new(id: NodeId, layer: LayerId, descriptor: Arc<NodeTypeDescriptor>) -> GraphResult<Self> {
        let behavior = descriptor.make_instance()?;
        let ports = descriptor.declared_ports().into_iter().cloned().collect();
        Ok(Self {
            id,
            layer,
            descriptor,
            custom_ports: Vec::new(),
            ports,
            values: BTreeMap::new(),
            behavior,
            evaluated: false,
            last_evaluated: None,
            ui_data: JsonValue::Null,
            pending_ports: None,
        })
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn layer(&self) -> LayerId {
        self.layer
    }

    pub fn type_name(&self) -> &str {
        self.descriptor.name()
    }

    pub fn descriptor(&self) -> &Arc<NodeTypeDescriptor> {
        &self.descriptor
    }

    /// All ports, declared first, then custom.
    pub fn ports(&self) -> &[PortDescriptor] {
        &self.ports
    }

    pub fn port(&self, id: &PortId) -> Option<&PortDescriptor> {
        self.ports.iter().find(|p| &p.id() == id)
    }

    pub fn has_port(&self, id: &PortId) -> bool {
        self.port(id).is_some()
    }

    pub fn custom_ports(&self) -> &[PortDescriptor] {
        &self.custom_ports
    }

    /// Holder for `port` if it has been materialized.
    pub fn holder(&self, port: &PortId) -> Option<&ValueHolder> {
        self.values.get(port)
    }

    pub(crate) fn holder_mut(&mut self, port: &PortId) -> Option<&mut ValueHolder> {
        self.values.get_mut(port)
    }

    /// Holder for `port`, created with the port default on first access.
    pub fn get_value(&mut self, port: &PortId) -> Option<&mut ValueHolder> {
        materialize(&self.ports, &mut self.values, port)
    }

    /// Materialized holders in port id order.
    pub fn values(&self) -> impl Iterator<Item = (&PortId, &ValueHolder)> {
        self.values.iter()
    }

    pub fn ui_data(&self) -> &JsonValue {
        &self.ui_data
    }

    pub fn set_ui_data(&mut self, data: JsonValue) {
        self.ui_data = data;
    }

    pub fn is_evaluated(&self) -> bool {
        self.evaluated
    }

    pub fn last_evaluated(&self) -> Option<Duration> {
        self.last_evaluated
    }

    pub fn behavior(&self) -> &AnyNode {
        &self.behavior
    }

    pub fn behavior_mut(&mut self) -> &mut AnyNode {
        &mut self.behavior
    }

    pub fn always_evaluate(&self) -> bool {
        self.descriptor.options().always_evaluate || self.behavior.always_evaluate()
    }

    pub fn breaks_cycles(&self) -> bool {
        self.descriptor.options().breaks_cycles
    }

    pub fn save_state(&self) -> Option<JsonValue> {
        self.behavior.save_state()
    }

    pub fn load_state(&mut self, state: &JsonValue) {
        self.behavior.load_state(state);
    }

    pub(crate) fn take_pending_ports(&mut self) -> Option<Vec<PortDescriptor>> {
        self.pending_ports.take()
    }

    pub fn have_any_inputs_changed(&self, lookup: &dyn OutputLookup) -> bool {
        self.values
            .values()
            .filter_map(ValueHolder::as_input)
            .any(|input| input.has_changed(lookup))
    }

    /// Nodes referenced by connected inputs, in port order, without repeats.
    pub fn input_nodes(&self) -> Vec<NodeId> {
        let mut seen = HashSet::new();
        self.values
            .values()
            .filter_map(ValueHolder::as_input)
            .filter_map(|input| input.link().map(|l| l.node))
            .filter(|node| seen.insert(*node))
            .collect()
    }

    /// Run the recompute hook if the node is dirty. Returns whether it ran.
    pub fn evaluate(&mut self, env: GraphEnv<'_>) -> bool {
        if self.evaluated {
            return false;
        }
        let must_run = self.always_evaluate()
            || self.last_evaluated.is_none()
            || self.have_any_inputs_changed(env.lookup);
        if !must_run {
            return false;
        }

        // Set before the hook so a re-entrant request is a no-op
        self.evaluated = true;
        let time = env.tick.time;
        self.run_hook(env, |behavior, ctx| behavior.recompute(ctx));
        self.last_evaluated = Some(time);
        true
    }

    pub fn start(&mut self, env: GraphEnv<'_>) {
        self.run_hook(env, |behavior, ctx| behavior.start(ctx));
    }

    pub fn stop(&mut self, env: GraphEnv<'_>) {
        self.run_hook(env, |behavior, ctx| behavior.stop(ctx));
    }

    fn run_hook(&mut self, env: GraphEnv<'_>, hook: impl FnOnce(&mut AnyNode, &mut NodeContext)) {
        let Node {
            id,
            ports,
            custom_ports,
            values,
            behavior,
            pending_ports,
            ..
        } = self;
        let mut ctx = NodeContext {
            id: *id,
            tick: env.tick,
            registry: env.registry,
            ports,
            custom_ports,
            values,
            lookup: env.lookup,
            named: env.named,
            pending_ports,
        };
        hook(behavior, &mut ctx);
    }

    /// Clear the evaluated mark and every holder's changed flag.
    pub fn reset(&mut self) {
        self.evaluated = false;
        for holder in self.values.values_mut() {
            holder.reset_changed();
        }
    }

    /// Replace the custom port list.
    ///
    /// Dropped ports lose their holders. Ports whose base type changed get
    /// a fresh default holder on next access. Custom ports may not shadow
    /// declared ports or each other.
    pub fn set_custom_ports(&mut self, ports: Vec<PortDescriptor>) -> GraphResult<PortDiff> {
        let mut seen = HashSet::new();
        for port in &ports {
            let id = port.id();
            if self.descriptor.port(&id).is_some() || !seen.insert(id.clone()) {
                return Err(GraphError::ShadowedPort {
                    owner: format!("{} {}", self.type_name(), self.id),
                    port: id,
                });
            }
        }

        let ports: Vec<_> = ports.into_iter().map(PortDescriptor::into_custom).collect();
        let diff = diff_ports(&self.custom_ports, &ports);
        for dropped in &diff.dropped {
            self.values.remove(dropped);
        }

        self.ports.truncate(self.ports.len() - self.custom_ports.len());
        self.ports.extend(ports.iter().cloned());
        self.custom_ports = ports;
        Ok(diff)
    }
}
