//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;

use crossbeam_channel::Receiver;
use lumagraph_rs::graph::{Graph, GraphEvent, NodeId, PortId};
use std::time::Duration;

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_millis(100)
}

/// Assert two floats are approximately equal
pub fn assert_float_eq(a: f64, b: f64, epsilon: f64) {
    assert!(
        (a - b).abs() < epsilon,
        "Expected {} to be approximately equal to {} (epsilon: {})",
        a,
        b,
        epsilon
    );
}

/// Read a float port, panicking with the port name if it is not a float
pub fn float_at(graph: &Graph, node: NodeId, port: &PortId) -> f64 {
    graph
        .value(node, port)
        .and_then(|v| v.as_f64())
        .unwrap_or_else(|| panic!("{} of {} holds no float", port, node))
}

/// Collect every event already queued on `rx`
pub fn drain_events(rx: &Receiver<GraphEvent>) -> Vec<GraphEvent> {
    rx.try_iter().collect()
}
