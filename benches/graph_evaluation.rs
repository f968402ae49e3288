//! Benchmarks for graph evaluation
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use lumagraph_rs::graph::{deserialize, serialize_all, Graph, NodeId, PortId, TickInfo, Value};

/// A Float feeding `len` Add nodes in a row
fn add_chain(len: usize) -> (Graph, NodeId) {
    let mut graph = Graph::with_builtins();
    let head = graph
        .create_node("Float", [(PortId::input("value"), Value::Float(1.0))])
        .unwrap();
    let mut prev = (head, PortId::output("value"));
    for _ in 0..len {
        let add = graph
            .create_node("Add", [(PortId::input("b"), Value::Float(1.0))])
            .unwrap();
        graph
            .create_connection(prev.0, prev.1, add, PortId::input("a"))
            .unwrap();
        prev = (add, PortId::output("result"));
    }
    (graph, head)
}

fn bench_dirty_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("dirty_chain");

    for len in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            let (mut graph, head) = add_chain(len);
            let mut tick = 0u64;
            b.iter(|| {
                // Every pass changes the head, so the whole chain recomputes
                graph
                    .set_value(head, &PortId::input("value"), Value::Float(tick as f64))
                    .unwrap();
                let report = graph.evaluate_tick(TickInfo::fixed(tick, 60.0), true);
                tick += 1;
                black_box(report.recomputed.len())
            });
        });
    }

    group.finish();
}

fn bench_clean_chain(c: &mut Criterion) {
    let mut group = c.benchmark_group("clean_chain");

    for len in [10, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            let (mut graph, _) = add_chain(len);
            graph.evaluate_tick(TickInfo::fixed(0, 60.0), true);
            let mut tick = 1u64;
            b.iter(|| {
                let report = graph.evaluate_tick(TickInfo::fixed(tick, 60.0), true);
                tick += 1;
                black_box(report.recomputed.len())
            });
        });
    }

    group.finish();
}

fn bench_order_rebuild(c: &mut Criterion) {
    let mut group = c.benchmark_group("order_rebuild");

    for len in [100, 1000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(len), len, |b, &len| {
            let (mut graph, head) = add_chain(len);
            b.iter(|| {
                // Adding and removing a node invalidates the cached order
                let extra = graph.create_node("Float", []).unwrap();
                graph.remove_node(extra).unwrap();
                black_box(graph.evaluation_order().len());
            });
            black_box(head);
        });
    }

    group.finish();
}

fn bench_document_round_trip(c: &mut Criterion) {
    let (graph, _) = add_chain(200);
    let doc = serialize_all(&graph);

    c.bench_function("document_round_trip_200", |b| {
        b.iter(|| {
            let mut restored = Graph::with_builtins();
            let report = deserialize(&mut restored, black_box(&doc), false);
            black_box(report.id_map.len())
        });
    });
}

criterion_group!(
    benches,
    bench_dirty_chain,
    bench_clean_chain,
    bench_order_rebuild,
    bench_document_round_trip
);
criterion_main!(benches);
