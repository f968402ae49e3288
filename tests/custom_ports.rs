//! Integration tests for per-instance custom ports

mod common;

use common::builders::{float_out, GraphBuilder};
use common::drain_events;
use lumagraph_rs::graph::{
    ChannelListener, DType, GraphError, GraphEvent, PortDescriptor, PortId, TickInfo, Value,
};

fn gain(dtype: DType) -> PortDescriptor {
    PortDescriptor::input("gain", dtype)
}

#[test]
fn test_same_base_type_keeps_value() {
    let mut builder = GraphBuilder::new();
    let node = builder.float(0.0);
    let mut graph = builder.build();

    graph
        .set_custom_ports(node, vec![gain(DType::float(1.0))])
        .unwrap();
    graph
        .set_value(node, &PortId::input("gain"), Value::Float(3.0))
        .unwrap();

    let diff = graph
        .set_custom_ports(node, vec![gain(DType::float_range(0.5, 0.0, 10.0))])
        .unwrap();
    assert!(diff.is_empty());
    assert_eq!(diff.kept, vec![PortId::input("gain")]);
    assert_eq!(
        graph.value(node, &PortId::input("gain")),
        Some(Value::Float(3.0))
    );
}

#[test]
fn test_changed_base_type_resets_to_default() {
    let mut builder = GraphBuilder::new();
    let node = builder.float(0.0);
    let mut graph = builder.build();

    graph
        .set_custom_ports(node, vec![gain(DType::float(1.0))])
        .unwrap();
    graph
        .set_value(node, &PortId::input("gain"), Value::Float(3.0))
        .unwrap();

    let diff = graph
        .set_custom_ports(node, vec![gain(DType::int(7))])
        .unwrap();
    assert_eq!(diff.dropped, vec![PortId::input("gain")]);
    assert_eq!(diff.added, vec![PortId::input("gain")]);
    assert_eq!(graph.value(node, &PortId::input("gain")), Some(Value::Int(7)));
}

#[test]
fn test_retyped_and_dropped_ports_lose_connections() {
    let mut builder = GraphBuilder::new();
    let source = builder.float(2.0);
    let node = builder.float(0.0);
    let mut graph = builder.build();

    graph
        .set_custom_ports(
            node,
            vec![gain(DType::float(1.0)), PortDescriptor::input("bias", DType::float(0.0))],
        )
        .unwrap();
    graph
        .create_connection(source, float_out(), node, PortId::input("gain"))
        .unwrap();
    graph
        .create_connection(source, float_out(), node, PortId::input("bias"))
        .unwrap();
    assert_eq!(graph.connection_count(), 2);

    let (listener, rx) = ChannelListener::unbounded();
    graph.add_listener(Box::new(listener));

    // gain changes type, bias disappears
    graph
        .set_custom_ports(node, vec![gain(DType::bool(false))])
        .unwrap();
    assert_eq!(graph.connection_count(), 0);
    assert!(!graph.is_connected(node, &PortId::input("gain")));
    assert!(!graph.node(node).unwrap().has_port(&PortId::input("bias")));

    let events = drain_events(&rx);
    assert_eq!(
        events
            .iter()
            .filter(|e| matches!(e, GraphEvent::ConnectionRemoved(_)))
            .count(),
        2
    );
    assert_eq!(events.last(), Some(&GraphEvent::PortsChanged { node }));
}

#[test]
fn test_custom_port_cannot_shadow_declared_port() {
    let mut builder = GraphBuilder::new();
    let node = builder.float(0.0);
    let mut graph = builder.build();

    let result = graph.set_custom_ports(node, vec![PortDescriptor::input("value", DType::float(0.0))]);
    assert!(matches!(result, Err(GraphError::ShadowedPort { .. })));

    let twice = vec![gain(DType::float(1.0)), gain(DType::float(2.0))];
    assert!(matches!(
        graph.set_custom_ports(node, twice),
        Err(GraphError::ShadowedPort { .. })
    ));
    assert!(graph.node(node).unwrap().custom_ports().is_empty());
}

#[test]
fn test_node_grows_and_shrinks_its_own_ports() {
    let mut builder = GraphBuilder::new();
    let source = builder.float(0.0);
    let mut graph = builder.build();
    let choice = graph
        .create_node(
            "WeightedChoice",
            [
                (PortId::input("count"), Value::Int(3)),
                (PortId::input("select"), Value::Float(0.99)),
            ],
        )
        .unwrap();

    // Ports requested while starting are installed before create returns
    assert_eq!(graph.node(choice).unwrap().custom_ports().len(), 3);
    graph
        .set_value(choice, &PortId::input("weight_1"), Value::Float(5.0))
        .unwrap();
    graph
        .create_connection(source, float_out(), choice, PortId::input("weight_2"))
        .unwrap();

    graph.evaluate_tick(TickInfo::fixed(0, 60.0), true);
    // weights [1, 5, 0]: the top of the range lands in slot 1
    assert_eq!(graph.value(choice, &PortId::output("index")), Some(Value::Int(1)));

    graph
        .set_value(choice, &PortId::input("count"), Value::Int(2))
        .unwrap();
    graph.evaluate_tick(TickInfo::fixed(1, 60.0), true);
    let ports: Vec<String> = graph
        .node(choice)
        .unwrap()
        .custom_ports()
        .iter()
        .map(|p| p.name.clone())
        .collect();
    assert_eq!(ports, ["weight_0", "weight_1"]);
    assert_eq!(graph.connection_count(), 0);
    assert_eq!(
        graph.value(choice, &PortId::input("weight_1")),
        Some(Value::Float(5.0))
    );

    graph
        .set_value(choice, &PortId::input("count"), Value::Int(3))
        .unwrap();
    graph.evaluate_tick(TickInfo::fixed(2, 60.0), true);
    assert_eq!(
        graph.value(choice, &PortId::input("weight_2")),
        Some(Value::Float(1.0))
    );
}
