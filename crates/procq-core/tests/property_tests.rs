//! # Property-Based Tests
//!
//! Verification tests using proptest.
//!
//! These tests ensure determinism and correctness invariants of the graph
//! model, the compiler, and the merge engine.

use procq_core::{
    EdgeConstraint, EdgeKind, Fragment, NodeId, NodeKind, Position, PredicateParams, QueryGraph,
    compile, fragment_from_bytes, fragment_to_bytes, merge_fragment,
};
use proptest::collection::vec;
use proptest::prelude::*;

// =============================================================================
// STRATEGIES
// =============================================================================

/// A chain graph built from generated activity names: node i connects to
/// node i+1 with a kind picked by the paired flag.
fn chain_graph(names: &[String], eventually: &[bool]) -> QueryGraph {
    let mut graph = QueryGraph::new();
    let mut ids = Vec::with_capacity(names.len());
    for (i, name) in names.iter().enumerate() {
        let params = PredicateParams {
            activities: vec![name.clone()],
            ..PredicateParams::default()
        };
        let id = graph
            .insert_node(
                NodeKind::Activity,
                params,
                Position::new((i as i64) * 100, 0),
            )
            .expect("insert");
        ids.push(id);
    }
    for (i, pair) in ids.windows(2).enumerate() {
        let kind = if eventually.get(i).copied().unwrap_or(false) {
            EdgeKind::EventuallyFollows
        } else {
            EdgeKind::DirectlyFollows
        };
        graph
            .add_edge(kind, pair[0], pair[1], None)
            .expect("chain edge");
    }
    graph
}

fn activity_names() -> impl Strategy<Value = Vec<String>> {
    vec("[a-z]{1,8}", 1..20)
}

// =============================================================================
// PROPERTY TESTS
// =============================================================================

proptest! {
    /// Compiling the same graph twice yields structurally identical trees.
    #[test]
    fn compile_is_deterministic(
        names in activity_names(),
        eventually in vec(any::<bool>(), 0..20),
    ) {
        let graph = chain_graph(&names, &eventually);
        let first = compile(&graph).expect("first compile");
        let second = compile(&graph).expect("second compile");
        prop_assert_eq!(first, second);
    }

    /// Compilation preserves the leaf population: one leaf per ordinary node.
    #[test]
    fn compile_preserves_leaf_count(
        names in activity_names(),
        eventually in vec(any::<bool>(), 0..20),
    ) {
        let graph = chain_graph(&names, &eventually);
        let tree = compile(&graph).expect("compile");
        prop_assert_eq!(tree.leaf_count(), graph.node_count());
    }

    /// Restoring a fragment into an empty graph preserves every id.
    #[test]
    fn restore_round_trip_is_identity(
        names in activity_names(),
        eventually in vec(any::<bool>(), 0..20),
    ) {
        let graph = chain_graph(&names, &eventually);
        let fragment = Fragment::from_graph(&graph);

        let mut restored = QueryGraph::new();
        let report = merge_fragment(&mut restored, &fragment, 0, 0).expect("merge");

        prop_assert!(report.identity);
        prop_assert!(report.dropped_edges.is_empty());
        prop_assert_eq!(Fragment::from_graph(&restored), fragment);
    }

    /// Pasting a fragment into a populated graph never collides with
    /// existing ids and adds exactly the fragment's content.
    #[test]
    fn paste_is_collision_free(
        names in activity_names(),
        eventually in vec(any::<bool>(), 0..20),
        existing in 1usize..10,
    ) {
        let source = chain_graph(&names, &eventually);
        let fragment = Fragment::from_graph(&source);

        let mut dest = QueryGraph::new();
        for i in 0..existing {
            let params = PredicateParams {
                activities: vec![format!("existing{i}")],
                ..PredicateParams::default()
            };
            dest.insert_node(NodeKind::Activity, params, Position::default())
                .expect("insert existing");
        }
        let before_nodes: Vec<NodeId> = dest.nodes().map(|n| n.id).collect();

        let report = merge_fragment(&mut dest, &fragment, 10, 10).expect("merge");

        prop_assert!(!report.identity);
        prop_assert!(report.dropped_edges.is_empty());
        for new_id in report.node_mapping.values() {
            prop_assert!(!before_nodes.contains(new_id));
        }
        prop_assert_eq!(dest.node_count(), existing + fragment.nodes.len());
        prop_assert_eq!(dest.edge_count(), fragment.edges.len());
    }

    /// Pasting twice from the same fragment yields disjoint node sets.
    #[test]
    fn repeated_paste_yields_disjoint_ids(
        names in activity_names(),
    ) {
        let source = chain_graph(&names, &[]);
        let fragment = Fragment::from_graph(&source);

        let mut dest = QueryGraph::new();
        merge_fragment(&mut dest, &fragment, 0, 0).expect("restore");
        let first = merge_fragment(&mut dest, &fragment, 10, 10).expect("paste 1");
        let second = merge_fragment(&mut dest, &fragment, 20, 20).expect("paste 2");

        for id in first.node_mapping.values() {
            prop_assert!(!second.node_mapping.values().any(|other| other == id));
        }
    }

    /// The negation invariant holds after any accepted edge insertion: no
    /// negated node sources a sequencing edge.
    #[test]
    fn negation_stays_terminal(
        names in vec("[a-z]{1,8}", 2..12),
        edits in vec((any::<u8>(), any::<u8>(), any::<bool>()), 0..30),
    ) {
        let mut graph = chain_graph(&names, &[]);
        let ids: Vec<NodeId> = graph.nodes().map(|n| n.id).collect();

        for (a, b, negate) in edits {
            let source = ids[(a as usize) % ids.len()];
            let target = ids[(b as usize) % ids.len()];
            let constraint = negate.then(|| EdgeConstraint {
                negated: true,
                ..EdgeConstraint::default()
            });
            // Rejections are fine; the invariant must hold either way.
            let _ = graph.add_edge(EdgeKind::EventuallyFollows, source, target, constraint);

            for node in graph.nodes() {
                if node.negated {
                    prop_assert!(!graph.has_outgoing_sequencing(node.id));
                }
            }
        }
    }

    /// Fragment serialization round-trips exactly through the binary format.
    #[test]
    fn fragment_bytes_round_trip(
        names in activity_names(),
        eventually in vec(any::<bool>(), 0..20),
    ) {
        let graph = chain_graph(&names, &eventually);
        let fragment = Fragment::from_graph(&graph);

        let bytes = fragment_to_bytes(&fragment).expect("serialize");
        let restored = fragment_from_bytes(&bytes).expect("deserialize");
        prop_assert_eq!(restored, fragment);
    }

    /// A pasted fragment compiles to the same shape as its source graph.
    #[test]
    fn paste_preserves_compiled_shape(
        names in activity_names(),
        eventually in vec(any::<bool>(), 0..20),
    ) {
        let source = chain_graph(&names, &eventually);
        let source_tree = compile(&source).expect("compile source");
        let fragment = Fragment::from_graph(&source);

        let mut dest = QueryGraph::new();
        merge_fragment(&mut dest, &fragment, 0, 0).expect("restore");
        let dest_tree = compile(&dest).expect("compile dest");

        prop_assert_eq!(source_tree, dest_tree);
    }
}
