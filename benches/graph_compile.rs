//! Benchmarks for dependency-graph construction and topological ordering.
//!
//! These measure [`DependencyGraphBuilder::build_order`] across the same
//! shapes the teacher benchmarked its graph compiler with: linear chains,
//! fan-out, and layered diamonds.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use weavegraph_coordinator::self_describing::dependency_graph::{DependencyGraphBuilder, DependencyNode};

fn node(name: String, refs: Vec<(&str, String)>) -> DependencyNode {
    DependencyNode {
        name,
        input_references: refs.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
    }
}

/// `node_0 -> node_1 -> ... -> node_{n-1}`.
fn build_linear_graph(node_count: usize) -> Vec<DependencyNode> {
    (0..node_count)
        .map(|i| {
            let refs = if i == 0 {
                Vec::new()
            } else {
                vec![("input", format!("node_{}.output", i - 1))]
            };
            node(format!("node_{i}"), refs)
        })
        .collect()
}

/// `width` independent nodes with no dependencies on one another.
fn build_fanout_graph(width: usize) -> Vec<DependencyNode> {
    (0..width).map(|i| node(format!("worker_{i}"), Vec::new())).collect()
}

/// `depth` layers of `width` nodes each, every node depending on the node
/// at the same position in the previous layer.
fn build_diamond_graph(depth: usize, width: usize) -> Vec<DependencyNode> {
    let mut nodes = Vec::with_capacity(depth * width);
    for layer in 0..depth {
        for slot in 0..width {
            let name = format!("L{layer}_N{slot}");
            let refs = if layer == 0 {
                Vec::new()
            } else {
                vec![("input", format!("L{}_N{slot}.output", layer - 1))]
            };
            nodes.push(node(name, refs));
        }
    }
    nodes
}

fn bench_build_order(c: &mut Criterion) {
    let mut group = c.benchmark_group("dependency_graph_build_order");

    for size in [10, 50, 100, 200] {
        let nodes = build_linear_graph(size);
        group.bench_with_input(BenchmarkId::new("linear", size), &nodes, |b, nodes| {
            b.iter(|| DependencyGraphBuilder::new().build_order(nodes).expect("acyclic"));
        });
    }

    for width in [10, 50, 100] {
        let nodes = build_fanout_graph(width);
        group.bench_with_input(BenchmarkId::new("fanout", width), &nodes, |b, nodes| {
            b.iter(|| DependencyGraphBuilder::new().build_order(nodes).expect("acyclic"));
        });
    }

    for (depth, width) in [(5, 10), (10, 10), (5, 20)] {
        let nodes = build_diamond_graph(depth, width);
        group.bench_with_input(
            BenchmarkId::new("diamond", format!("{depth}x{width}")),
            &nodes,
            |b, nodes| {
                b.iter(|| DependencyGraphBuilder::new().build_order(nodes).expect("acyclic"));
            },
        );
    }

    group.finish();
}

criterion_group!(benches, bench_build_order);
criterion_main!(benches);
