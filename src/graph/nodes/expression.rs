//! Expression node: a Rhai expression over inputs `a`, `b`, `c`.

use crate::graph::dtype::{DType, Value};
use crate::graph::node::NodeContext;
use crate::graph::port::PortDescriptor;
use crate::scripting::{ExpressionContext, ScriptEngine};

pub struct ExpressionNode {
    engine: ScriptEngine,
    /// Last successful result, exposed to scripts as `prev()`.
    prev: f64,
    last_error: Option<String>,
}

impl ExpressionNode {
    pub fn new() -> Self {
        Self {
            engine: ScriptEngine::new(),
            prev: f64::NAN,
            last_error: None,
        }
    }

    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("expr", DType::text("a")),
            PortDescriptor::input("a", DType::float(0.0)),
            PortDescriptor::input("b", DType::float(0.0)),
            PortDescriptor::input("c", DType::float(0.0)),
            PortDescriptor::output("result", DType::float(0.0)),
            PortDescriptor::output("error", DType::text("")),
        ]
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let source = ctx.input_text("expr");
        let inputs = [ctx.input_f64("a"), ctx.input_f64("b"), ctx.input_f64("c")];
        let script_ctx = ExpressionContext {
            time_secs: ctx.tick.seconds(),
            dt_secs: ctx.tick.dt_seconds(),
            tick: ctx.tick.tick,
            prev: self.prev,
        };

        match self.engine.eval(&source, inputs, script_ctx) {
            Ok(result) => {
                self.prev = result;
                self.last_error = None;
                ctx.set_output("result", Value::Float(result));
                ctx.set_output("error", Value::Text(String::new()));
            }
            Err(e) => {
                let message = e.to_string();
                // Log once per distinct error, not every tick
                if self.last_error.as_deref() != Some(message.as_str()) {
                    tracing::warn!("Expression {} failed: {}", ctx.id, message);
                }
                ctx.set_output("error", Value::Text(message.clone()));
                self.last_error = Some(message);
            }
        }
    }
}

impl Default for ExpressionNode {
    fn default() -> Self {
        Self::new()
    }
}
