//! Clock-driven nodes: `Time`, `Lfo` and the cycle-breaking `Delay`.
//!
//! All three are registered as always-evaluate types.

use crate::graph::dtype::{DType, Value};
use crate::graph::node::NodeContext;
use crate::graph::port::PortDescriptor;
use std::f64::consts::TAU;

/// Exposes the graph clock.
pub struct TimeNode;

impl TimeNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::output("seconds", DType::float(0.0)),
            PortDescriptor::output("delta", DType::float(0.0)),
            PortDescriptor::output("tick", DType::int(0)),
        ]
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let tick = ctx.tick;
        ctx.set_output("seconds", Value::Float(tick.seconds()));
        ctx.set_output("delta", Value::Float(tick.dt_seconds()));
        ctx.set_output("tick", Value::Int(tick.tick as i64));
    }
}

/// Waveform of an [`LfoNode`], in the order of its `shape` choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LfoShape {
    Sine,
    Triangle,
    Saw,
    Square,
}

impl LfoShape {
    pub const NAMES: [&'static str; 4] = ["sine", "triangle", "saw", "square"];

    pub fn from_index(index: i64) -> Self {
        match index {
            1 => LfoShape::Triangle,
            2 => LfoShape::Saw,
            3 => LfoShape::Square,
            _ => LfoShape::Sine,
        }
    }

    /// Value in `-1..=1` at `phase` in `0..1`.
    pub fn sample(self, phase: f64) -> f64 {
        match self {
            LfoShape::Sine => (phase * TAU).sin(),
            LfoShape::Triangle => 1.0 - 4.0 * (phase - 0.5).abs(),
            LfoShape::Saw => 2.0 * phase - 1.0,
            LfoShape::Square => {
                if phase < 0.5 {
                    1.0
                } else {
                    -1.0
                }
            }
        }
    }
}

/// Low-frequency oscillator over the graph clock.
pub struct LfoNode;

impl LfoNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("frequency", DType::float_range(1.0, 0.0, 1000.0)),
            PortDescriptor::input("amplitude", DType::float(1.0)),
            PortDescriptor::input("offset", DType::float(0.0)),
            PortDescriptor::input("shape", DType::choice(&LfoShape::NAMES, 0)),
            PortDescriptor::output("value", DType::float(0.0)),
        ]
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let frequency = ctx.input_f64("frequency");
        let amplitude = ctx.input_f64("amplitude");
        let offset = ctx.input_f64("offset");
        let shape = LfoShape::from_index(ctx.input_i64("shape"));

        let phase = (ctx.tick.seconds() * frequency).rem_euclid(1.0);
        let value = offset + amplitude * shape.sample(phase);
        ctx.set_output("value", Value::Float(value));
    }
}

/// One-tick delay.
///
/// Delay nodes are evaluated before everything else in their layer and
/// their input is not an ordering dependency, so the input still holds the
/// value its source produced on the previous tick. Cyclic connections
/// through a delay are therefore legal.
pub struct DelayNode;

impl DelayNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("value", DType::float(0.0)),
            PortDescriptor::output("value", DType::float(0.0)),
        ]
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        if let Some(previous) = ctx.input("value") {
            ctx.set_output("value", previous);
        }
    }
}
