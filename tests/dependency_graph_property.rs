//! Property tests for `DependencyGraphBuilder::build_order`, in the
//! teacher's `proptest`-driven style: generate random acyclic reference
//! graphs and assert the ordering invariant holds, rather than hand-picking
//! a handful of fixed cases.

use proptest::prelude::*;
use rustc_hash::FxHashMap;
use weavegraph_coordinator::self_describing::dependency_graph::{DependencyGraphBuilder, DependencyNode};

/// Builds a DAG of `size` nodes named `n0..n{size-1}` where each node may
/// reference any strictly-lower-numbered node, guaranteeing acyclicity by
/// construction.
fn layered_dag(size: usize, edge_choices: &[Vec<bool>]) -> Vec<DependencyNode> {
    (0..size)
        .map(|i| {
            let mut refs = FxHashMap::default();
            for j in 0..i {
                if edge_choices[i].get(j).copied().unwrap_or(false) {
                    refs.insert(format!("in_{j}"), format!("n{j}.output"));
                }
            }
            DependencyNode {
                name: format!("n{i}"),
                input_references: refs,
            }
        })
        .collect()
}

proptest! {
    #[test]
    fn topological_order_always_respects_references(
        size in 1usize..12,
        bits in prop::collection::vec(prop::collection::vec(any::<bool>(), 0..12), 1..12),
    ) {
        let size = size.min(bits.len()).max(1);
        let bits = &bits[..size];
        let nodes = layered_dag(size, bits);
        let mut builder = DependencyGraphBuilder::new();
        let order = builder.build_order(&nodes).expect("constructed acyclic by design");

        prop_assert_eq!(order.len(), size);

        let position: FxHashMap<&str, usize> = order.iter().map(|s| s.as_str()).zip(0..).collect();
        for node in &nodes {
            for raw_reference in node.input_references.values() {
                let source_name = raw_reference.split('.').next().unwrap();
                if source_name == node.name {
                    continue;
                }
                prop_assert!(position[source_name] < position[node.name.as_str()]);
            }
        }
    }
}
