//! Named variables: `SetVar` publishes its value under a name, `GetVar`
//! reads it from anywhere in the same graph without a connection.
//!
//! Names live in the graph's named-node registry. A `SetVar` claims its name
//! on start and whenever the name input changes, and releases it on stop.
//! `GetVar` has no connection to the `SetVar` it reads, so it always
//! evaluates and sees the value from whenever that node last ran.

use crate::graph::dtype::{DType, Value};
use crate::graph::id::PortId;
use crate::graph::node::NodeContext;
use crate::graph::port::PortDescriptor;

#[derive(Default)]
pub struct SetVarNode {
    registered: Option<String>,
}

impl SetVarNode {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("name", DType::text("")),
            PortDescriptor::input("value", DType::float(0.0)),
            PortDescriptor::output("value", DType::float(0.0)),
        ]
    }

    pub fn registered_name(&self) -> Option<&str> {
        self.registered.as_deref()
    }

    pub fn start(&mut self, ctx: &mut NodeContext) {
        self.sync_name(ctx);
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        self.sync_name(ctx);
        let value = ctx.input_f64("value");
        ctx.set_output("value", Value::Float(value));
    }

    pub fn stop(&mut self, ctx: &mut NodeContext) {
        if let Some(name) = self.registered.take() {
            ctx.unregister_name(&name);
        }
    }

    fn sync_name(&mut self, ctx: &mut NodeContext) {
        let name = ctx.input_text("name");
        if self.registered.as_deref() == Some(name.as_str()) {
            return;
        }
        if let Some(old) = self.registered.take() {
            ctx.unregister_name(&old);
        }
        if !name.is_empty() {
            ctx.register_name(&name);
            self.registered = Some(name);
        }
    }
}

pub struct GetVarNode;

impl GetVarNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("name", DType::text("")),
            PortDescriptor::output("value", DType::float(0.0)),
        ]
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let name = ctx.input_text("name");
        let value = ctx
            .named_node(&name)
            .and_then(|node| ctx.lookup_output(node, &PortId::output("value")))
            .and_then(Value::as_f64);
        if let Some(value) = value {
            ctx.set_output("value", Value::Float(value));
        }
    }
}
