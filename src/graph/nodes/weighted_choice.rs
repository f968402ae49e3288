//! WeightedChoice node.
//!
//! Picks one of `count` slots, each with its own weight input. The weight
//! inputs are custom ports named `weight_0 .. weight_{count-1}`; whenever
//! `count` changes, the node requests a new custom port list. Existing
//! weights survive growing or shrinking since ports keep their names.

use crate::graph::dtype::{DType, Value};
use crate::graph::node::NodeContext;
use crate::graph::port::PortDescriptor;

pub const MAX_CHOICES: i64 = 64;
const DEFAULT_WEIGHT: f64 = 1.0;

pub struct WeightedChoiceNode;

impl WeightedChoiceNode {
    pub fn ports() -> Vec<PortDescriptor> {
        vec![
            PortDescriptor::input("count", DType::int_range(2, 0, MAX_CHOICES)),
            PortDescriptor::input("select", DType::float_range(0.0, 0.0, 1.0)),
            PortDescriptor::output("index", DType::int(-1)),
        ]
    }

    /// Custom weight ports for `count` slots.
    pub fn weight_ports(count: usize) -> Vec<PortDescriptor> {
        (0..count)
            .map(|i| {
                PortDescriptor::input(
                    &weight_name(i),
                    DType::float_range(DEFAULT_WEIGHT, 0.0, f64::MAX),
                )
                .with_group("weights")
            })
            .collect()
    }

    pub fn start(&mut self, ctx: &mut NodeContext) {
        self.sync_ports(ctx);
    }

    pub fn recompute(&mut self, ctx: &mut NodeContext) {
        let count = self.sync_ports(ctx);
        let weights: Vec<f64> = (0..count)
            .map(|i| {
                ctx.input(&weight_name(i))
                    .and_then(|v| v.as_f64())
                    .unwrap_or(DEFAULT_WEIGHT)
            })
            .collect();
        let select = ctx.input_f64("select");

        let index = pick(&weights, select).map_or(-1, |i| i as i64);
        ctx.set_output("index", Value::Int(index));
    }

    /// Request weight ports if `count` no longer matches. Returns the count.
    fn sync_ports(&self, ctx: &mut NodeContext) -> usize {
        let count = ctx.input_i64("count").clamp(0, MAX_CHOICES) as usize;
        if ctx.custom_ports().len() != count {
            tracing::debug!("WeightedChoice {}: {} weight port(s)", ctx.id, count);
            ctx.request_custom_ports(Self::weight_ports(count));
        }
        count
    }
}

fn weight_name(index: usize) -> String {
    format!("weight_{}", index)
}

/// Slot whose cumulative weight range contains `select * total`.
///
/// Negative weights count as zero. `None` if no slot has weight.
pub fn pick(weights: &[f64], select: f64) -> Option<usize> {
    let total: f64 = weights.iter().map(|w| w.max(0.0)).sum();
    if total <= 0.0 {
        return None;
    }

    let target = select.clamp(0.0, 1.0) * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (i, weight) in weights.iter().enumerate() {
        if *weight <= 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(i);
        if target < cumulative {
            return Some(i);
        }
    }
    last_positive
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pick_uniform() {
        let weights = [1.0, 1.0, 1.0, 1.0];
        assert_eq!(pick(&weights, 0.0), Some(0));
        assert_eq!(pick(&weights, 0.3), Some(1));
        assert_eq!(pick(&weights, 0.6), Some(2));
        assert_eq!(pick(&weights, 1.0), Some(3));
    }

    #[test]
    fn test_pick_skips_zero_weights() {
        assert_eq!(pick(&[0.0, 2.0, 0.0], 0.0), Some(1));
        assert_eq!(pick(&[0.0, 2.0, 0.0], 1.0), Some(1));
        assert_eq!(pick(&[-1.0, 1.0], 0.0), Some(1));
    }

    #[test]
    fn test_pick_nothing() {
        assert_eq!(pick(&[], 0.5), None);
        assert_eq!(pick(&[0.0, 0.0], 0.5), None);
    }

    #[test]
    fn test_weight_ports() {
        let ports = WeightedChoiceNode::weight_ports(3);
        let names: Vec<_> = ports.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["weight_0", "weight_1", "weight_2"]);
        assert!(ports.iter().all(|p| p.is_input()));
    }
}
