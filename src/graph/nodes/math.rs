//! Value and arithmetic nodes: `Float`, the `BinaryMath` family and `Color`.

use crate::graph::dtype::{DType, Value};
use crate::graph::node::NodeContext;
use crate::graph::port::PortDescriptor;

/// Holds a single number. Its input is the editable value, its output
/// the same number for downstream nodes.
pub struct FloatNode;

impl FloatNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("value", DType::float(0.0)),
            PortDescriptor::output("value", DType::float(0.0)),
        ]
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let value = ctx.input_f64("value");
        ctx.set_output("value", Value::Float(value));
    }
}

/// Binary arithmetic operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MathOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Min,
    Max,
}

impl MathOp {
    pub const ALL: [MathOp; 6] = [
        MathOp::Add,
        MathOp::Subtract,
        MathOp::Multiply,
        MathOp::Divide,
        MathOp::Min,
        MathOp::Max,
    ];

    /// Node type name of this operation.
    pub fn name(self) -> &'static str {
        match self {
            MathOp::Add => "Add",
            MathOp::Subtract => "Subtract",
            MathOp::Multiply => "Multiply",
            MathOp::Divide => "Divide",
            MathOp::Min => "Min",
            MathOp::Max => "Max",
        }
    }

    pub fn apply(self, a: f64, b: f64) -> f64 {
        match self {
            MathOp::Add => a + b,
            MathOp::Subtract => a - b,
            MathOp::Multiply => a * b,
            MathOp::Divide if b == 0.0 => 0.0,
            MathOp::Divide => a / b,
            MathOp::Min => a.min(b),
            MathOp::Max => a.max(b),
        }
    }
}

/// Shared implementation of every `BinaryMath` subtype.
pub struct MathNode {
    op: MathOp,
}

impl MathNode {
    pub fn new(op: MathOp) -> Self {
        Self { op }
    }

    /// Ports of the virtual `BinaryMath` base type.
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("a", DType::float(0.0)),
            PortDescriptor::input("b", DType::float(0.0)),
            PortDescriptor::output("result", DType::float(0.0)),
        ]
    }

    pub fn name(&self) -> &str {
        self.op.name()
    }

    pub fn op(&self) -> MathOp {
        self.op
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let a = ctx.input_f64("a");
        let b = ctx.input_f64("b");
        ctx.set_output("result", Value::Float(self.op.apply(a, b)));
    }
}

/// Packs four channels into an RGBA color.
pub struct ColorNode;

impl ColorNode {
    pub fn ports() -> Vec<PortDescriptor> {
        let channel = || DType::float_range(1.0, 0.0, 1.0);
        vec![
            PortDescriptor::input("r", channel()).with_group("rgba"),
            PortDescriptor::input("g", channel()).with_group("rgba"),
            PortDescriptor::input("b", channel()).with_group("rgba"),
            PortDescriptor::input("a", channel()).with_group("rgba"),
            PortDescriptor::output("color", DType::color([1.0; 4])),
        ]
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let mut color = [0.0f32; 4];
        for (slot, name) in color.iter_mut().zip(["r", "g", "b", "a"]) {
            *slot = ctx.input_f64(name).clamp(0.0, 1.0) as f32;
        }
        ctx.set_output("color", Value::Color(color));
    }
}
