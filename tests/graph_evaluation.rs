//! Integration tests for evaluation passes and structural edits

mod common;

use common::builders::{float_in, float_out, GraphBuilder};
use common::{assert_float_eq, drain_events, float_at};
use lumagraph_rs::graph::{ChannelListener, GraphEvent, PortId, TickInfo, Value};

fn tick(n: u64) -> TickInfo {
    TickInfo::fixed(n, 60.0)
}

#[test]
fn test_first_pass_recomputes_everything() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(3.0, 4);
    let mut graph = builder.build();

    let report = graph.evaluate_tick(tick(0), true);
    assert_eq!(report.recomputed, chain);
    assert_float_eq(float_at(&graph, chain[3], &float_out()), 3.0, 1e-12);
}

#[test]
fn test_clean_graph_does_no_work() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(1.0, 3);
    let mut graph = builder.build();

    graph.evaluate_tick(tick(0), true);
    let report = graph.evaluate_tick(tick(1), true);
    assert!(report.recomputed.is_empty());
    assert_float_eq(float_at(&graph, chain[2], &float_out()), 1.0, 1e-12);
}

#[test]
fn test_change_propagates_downstream_only() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(1.0, 3);
    let side = builder.float(8.0);
    let mut graph = builder.build();
    graph.evaluate_tick(tick(0), true);

    graph.set_value(chain[0], &float_in(), Value::Float(5.0)).unwrap();
    let report = graph.evaluate_tick(tick(1), true);

    assert_eq!(report.recomputed, chain);
    assert!(!report.was_recomputed(side));
    assert_float_eq(float_at(&graph, chain[2], &float_out()), 5.0, 1e-12);
}

#[test]
fn test_connected_input_ignores_manual_value() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(2.0, 2);
    let mut graph = builder.build();

    graph.set_value(chain[1], &float_in(), Value::Float(9.0)).unwrap();
    graph.evaluate_tick(tick(0), true);
    assert_float_eq(float_at(&graph, chain[1], &float_out()), 2.0, 1e-12);

    // Editing the hidden manual value of a connected input is not a change
    graph.set_value(chain[1], &float_in(), Value::Float(10.0)).unwrap();
    assert!(graph.evaluate_tick(tick(1), true).recomputed.is_empty());
}

#[test]
fn test_rewriting_the_same_value_still_propagates() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(4.0, 3);
    let mut graph = builder.build();
    graph.evaluate_tick(tick(0), true);

    // A write marks the holder changed whether or not the value differs
    graph.set_value(chain[0], &float_in(), Value::Float(4.0)).unwrap();
    let report = graph.evaluate_tick(tick(1), true);
    assert_eq!(report.recomputed, chain);
    assert_float_eq(float_at(&graph, chain[2], &float_out()), 4.0, 1e-12);
}

#[test]
fn test_diamond_evaluates_each_node_once() {
    let mut builder = GraphBuilder::new();
    let [top, left, right, bottom] = builder.diamond(3.0);
    let mut graph = builder.build();

    let report = graph.evaluate_tick(tick(0), true);
    assert_eq!(report.recomputed.len(), 4);
    assert_eq!(report.recomputed[0], top);
    assert_eq!(report.recomputed[3], bottom);
    assert!(report.was_recomputed(left) && report.was_recomputed(right));
    assert_float_eq(float_at(&graph, bottom, &PortId::output("result")), 20.0, 1e-12);
}

#[test]
fn test_add_chain_accumulates() {
    let mut builder = GraphBuilder::new();
    let chain = builder.add_chain(1.0, 0.5, 6);
    let mut graph = builder.build();

    graph.evaluate_tick(tick(0), true);
    let last = *chain.last().unwrap();
    assert_float_eq(float_at(&graph, last, &PortId::output("result")), 4.0, 1e-12);
}

#[test]
fn test_remove_node_tears_down_connections() {
    let mut builder = GraphBuilder::new();
    let a = builder.float(1.0);
    let hub = builder.math("Add", 0.0, 2.0);
    let out1 = builder.float(0.0);
    let out2 = builder.float(0.0);
    builder
        .connect(a, "value", hub, "a")
        .connect(hub, "result", out1, "value")
        .connect(hub, "result", out2, "value");
    let mut graph = builder.build();
    graph.evaluate_tick(tick(0), true);
    assert_eq!(graph.connection_count(), 3);

    let (listener, rx) = ChannelListener::unbounded();
    graph.add_listener(Box::new(listener));
    graph.remove_node(hub).unwrap();

    assert!(!graph.contains(hub));
    assert_eq!(graph.connection_count(), 0);
    assert!(graph.connections_of(a).is_empty());
    assert!(!graph.is_connected(out1, &float_in()));
    assert!(!graph.is_connected(out2, &float_in()));

    let events = drain_events(&rx);
    let removed_connections = events
        .iter()
        .filter(|e| matches!(e, GraphEvent::ConnectionRemoved(_)))
        .count();
    assert_eq!(removed_connections, 3);
    assert_eq!(events.last(), Some(&GraphEvent::NodeRemoved { node: hub }));

    // Losing their source counts as a change for the former readers
    graph.set_value(a, &float_in(), Value::Float(7.0)).unwrap();
    let report = graph.evaluate_tick(tick(1), true);
    assert_eq!(report.recomputed.len(), 3);
    assert!(report.was_recomputed(a));
    assert!(report.was_recomputed(out1) && report.was_recomputed(out2));
    assert_float_eq(float_at(&graph, out1, &float_out()), 0.0, 1e-12);
}

#[test]
fn test_removed_ids_are_not_reused() {
    let mut builder = GraphBuilder::new();
    let first = builder.float(0.0);
    let mut graph = builder.build();
    graph.remove_node(first).unwrap();

    let second = graph.create_node("Float", []).unwrap();
    assert_ne!(first, second);
    assert!(graph.remove_node(first).is_err());
}

#[test]
fn test_disconnect_then_reconnect() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(6.0, 2);
    let other = builder.float(-1.0);
    let mut graph = builder.build();
    graph.evaluate_tick(tick(0), true);

    assert!(graph.disconnect_input(chain[1], &float_in()));
    assert!(!graph.disconnect_input(chain[1], &float_in()));
    graph
        .create_connection(other, float_out(), chain[1], float_in())
        .unwrap();

    let report = graph.evaluate_tick(tick(1), true);
    assert!(report.was_recomputed(chain[1]));
    assert_float_eq(float_at(&graph, chain[1], &float_out()), -1.0, 1e-12);
}

#[test]
#[should_panic(expected = "already connected")]
fn test_second_connection_to_input_panics() {
    let mut builder = GraphBuilder::new();
    let a = builder.float(1.0);
    let b = builder.float(2.0);
    let sink = builder.float(0.0);
    builder.connect(a, "value", sink, "value");
    builder.connect(b, "value", sink, "value");
}

#[test]
fn test_order_rebuilt_only_on_structure_change() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(1.0, 3);
    let mut graph = builder.build();

    graph.evaluate_tick(tick(0), true);
    let rebuilds = graph.order_rebuilds();
    graph.set_value(chain[0], &float_in(), Value::Float(2.0)).unwrap();
    graph.evaluate_tick(tick(1), true);
    assert_eq!(graph.order_rebuilds(), rebuilds);

    graph.disconnect_input(chain[2], &float_in());
    graph.evaluate_tick(tick(2), true);
    assert_eq!(graph.order_rebuilds(), rebuilds + 1);
}

#[test]
fn test_reset_after_manual_pass() {
    let mut builder = GraphBuilder::new();
    let chain = builder.float_chain(1.0, 2);
    let mut graph = builder.build();

    graph.evaluate_tick(tick(0), false);
    // Still marked evaluated, so nothing runs until the flags are cleared
    assert!(graph.evaluate_tick(tick(1), false).recomputed.is_empty());

    graph.reset_instances();
    graph.set_value(chain[0], &float_in(), Value::Float(3.0)).unwrap();
    let report = graph.evaluate_tick(tick(2), true);
    assert_eq!(report.recomputed, chain);
    assert_eq!(graph.value(chain[1], &float_out()), Some(Value::Float(3.0)));
}
