//! # Fragment Merge Engine
//!
//! Copy/paste and persistence share one entry point: a captured `Fragment`
//! is merged into a graph by rewriting its ids and replaying its edges
//! through the normal attach path.
//!
//! Two regimes, decided by the destination graph:
//! - **restore** (destination empty): original node and edge ids are kept,
//!   so save/load round-trips are the identity
//! - **paste** (destination populated): every node and edge gets a fresh
//!   id from the destination's counters, so a merge can never collide with
//!   existing content
//!
//! Edges are replayed in ascending original-id order through
//! `QueryGraph::attach_edge`. Replay runs full validation and the Or
//! param-adoption side effect, exactly as if the user had drawn each edge;
//! an edge the destination rejects is reported as dropped, never silently
//! kept in an invalid state.

use crate::{
    EdgeId, NodeId, PredicateNode, ProcqError, QueryGraph, RelationEdge, catalog,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// FRAGMENT
// =============================================================================

/// A detached slice of a query graph: plain node and edge records with
/// their original ids. The unit of clipboard capture and persistence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Fragment {
    pub nodes: Vec<PredicateNode>,
    pub edges: Vec<RelationEdge>,
}

impl Fragment {
    /// Capture the whole graph as a fragment (save path).
    #[must_use]
    pub fn from_graph(graph: &QueryGraph) -> Self {
        Self {
            nodes: graph.nodes().cloned().collect(),
            edges: graph.edges().cloned().collect(),
        }
    }

    /// Capture a node selection (copy path). Only edges with both
    /// endpoints inside the selection are carried; boundary edges are cut.
    #[must_use]
    pub fn from_selection(graph: &QueryGraph, selection: &BTreeSet<NodeId>) -> Self {
        Self {
            nodes: graph
                .nodes()
                .filter(|n| selection.contains(&n.id))
                .cloned()
                .collect(),
            edges: graph
                .edges()
                .filter(|e| selection.contains(&e.source) && selection.contains(&e.target))
                .cloned()
                .collect(),
        }
    }

    /// True when the fragment carries nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }
}

// =============================================================================
// MERGE REPORT
// =============================================================================

/// An edge the destination graph refused during replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DroppedEdge {
    /// The edge's id inside the fragment.
    pub original: EdgeId,
    /// Human-readable rejection reason.
    pub reason: String,
}

/// Outcome of a fragment merge: the id rewrites that were applied and the
/// edges that did not survive replay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct MergeReport {
    /// Fragment node id -> destination node id.
    pub node_mapping: BTreeMap<NodeId, NodeId>,
    /// Fragment edge id -> destination edge id (surviving edges only).
    pub edge_mapping: BTreeMap<EdgeId, EdgeId>,
    /// Edges rejected by destination-graph validation.
    pub dropped_edges: Vec<DroppedEdge>,
    /// True when ids were preserved (restore into an empty graph).
    pub identity: bool,
}

impl MergeReport {
    /// Number of nodes added to the destination.
    #[must_use]
    pub fn added_nodes(&self) -> usize {
        self.node_mapping.len()
    }

    /// Number of edges added to the destination.
    #[must_use]
    pub fn added_edges(&self) -> usize {
        self.edge_mapping.len()
    }
}

// =============================================================================
// MERGE
// =============================================================================

/// Merge a fragment into a graph, pasting at the given canvas offset.
///
/// Node validation failures abort the merge before the graph is touched;
/// edge rejections are per-edge and reported in the result.
pub fn merge_fragment(
    graph: &mut QueryGraph,
    fragment: &Fragment,
    offset_x: i64,
    offset_y: i64,
) -> Result<MergeReport, ProcqError> {
    // Validate every node up front so a bad fragment leaves the graph
    // untouched.
    for node in &fragment.nodes {
        catalog::validate_params(node.kind, &node.params)?;
    }

    let identity = graph.is_empty();
    let mut report = MergeReport {
        identity,
        ..MergeReport::default()
    };

    // Nodes first, in ascending original-id order (Fragment::from_graph
    // captures them that way; re-sort in case the fragment was assembled
    // by hand).
    let mut nodes = fragment.nodes.clone();
    nodes.sort_by_key(|n| n.id);

    for mut node in nodes {
        let original = node.id;
        if !identity {
            node.id = NodeId(graph.next_node_id());
        }
        node.position = node.position.offset_by(offset_x, offset_y);
        // Derived state is recomputed from the replayed edges.
        node.negated = node.params.negated;
        graph.import_node(node.clone())?;
        report.node_mapping.insert(original, node.id);
    }

    // Replay edges in construction order through the gesture path.
    let mut edges = fragment.edges.clone();
    edges.sort_by_key(|e| e.id);

    for edge in edges {
        let original = edge.id;
        let Some(&source) = report.node_mapping.get(&edge.source) else {
            report.dropped_edges.push(DroppedEdge {
                original,
                reason: ProcqError::NodeNotFound(edge.source).to_string(),
            });
            continue;
        };
        let Some(&target) = report.node_mapping.get(&edge.target) else {
            report.dropped_edges.push(DroppedEdge {
                original,
                reason: ProcqError::NodeNotFound(edge.target).to_string(),
            });
            continue;
        };

        let id = if identity {
            original
        } else {
            EdgeId(graph.next_edge_id())
        };
        let replayed = RelationEdge::new(id, edge.kind, source, target, edge.constraint.clone());
        match graph.attach_edge(replayed) {
            Ok(id) => {
                report.edge_mapping.insert(original, id);
            }
            Err(err) => {
                report.dropped_edges.push(DroppedEdge {
                    original,
                    reason: err.to_string(),
                });
            }
        }
    }

    graph.refresh_negation();
    Ok(report)
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        CompiledQuery, EdgeConstraint, EdgeKind, NodeKind, Position, PredicateParams, compile,
    };

    fn activity_at(graph: &mut QueryGraph, name: &str, x: i64, y: i64) -> NodeId {
        let params = PredicateParams {
            activities: vec![name.to_string()],
            ..PredicateParams::default()
        };
        graph
            .insert_node(NodeKind::Activity, params, Position::new(x, y))
            .expect("insert activity")
    }

    fn chain_fragment() -> Fragment {
        let mut graph = QueryGraph::new();
        let a = activity_at(&mut graph, "pack", 0, 0);
        let b = activity_at(&mut graph, "ship", 100, 0);
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, None)
            .expect("edge");
        Fragment::from_graph(&graph)
    }

    #[test]
    fn restore_into_empty_graph_preserves_ids() {
        let fragment = chain_fragment();
        let mut graph = QueryGraph::new();
        let report = merge_fragment(&mut graph, &fragment, 0, 0).expect("merge");

        assert!(report.identity);
        for (from, to) in &report.node_mapping {
            assert_eq!(from, to);
        }
        for (from, to) in &report.edge_mapping {
            assert_eq!(from, to);
        }
        assert!(report.dropped_edges.is_empty());
        assert_eq!(graph.node_count(), 2);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn restore_round_trip_is_identity() {
        let fragment = chain_fragment();
        let mut graph = QueryGraph::new();
        merge_fragment(&mut graph, &fragment, 0, 0).expect("merge");
        assert_eq!(Fragment::from_graph(&graph), fragment);
    }

    #[test]
    fn paste_into_populated_graph_allocates_fresh_ids() {
        let fragment = chain_fragment();
        let mut graph = QueryGraph::new();
        // Occupy the ids the fragment was captured with.
        activity_at(&mut graph, "existing-a", 0, 0);
        activity_at(&mut graph, "existing-b", 0, 50);

        let report = merge_fragment(&mut graph, &fragment, 0, 0).expect("merge");
        assert!(!report.identity);
        assert_eq!(report.added_nodes(), 2);
        assert_eq!(report.added_edges(), 1);
        for (from, to) in &report.node_mapping {
            assert_ne!(from, to);
            assert!(graph.contains_node(*to));
        }
        assert_eq!(graph.node_count(), 4);
        assert_eq!(graph.edge_count(), 1);
    }

    #[test]
    fn repeated_paste_never_collides() {
        let fragment = chain_fragment();
        let mut graph = QueryGraph::new();
        merge_fragment(&mut graph, &fragment, 0, 0).expect("restore");

        for i in 1..=3 {
            let report = merge_fragment(&mut graph, &fragment, 0, 0).expect("paste");
            assert!(!report.identity);
            assert_eq!(graph.node_count(), 2 * (i + 1));
            assert_eq!(graph.edge_count(), i + 1);
        }
    }

    #[test]
    fn paste_offset_applies_to_positions() {
        let fragment = chain_fragment();
        let mut graph = QueryGraph::new();
        activity_at(&mut graph, "existing", 0, 0);

        let report = merge_fragment(&mut graph, &fragment, 40, -20).expect("merge");
        let pasted = report.node_mapping.values().next().copied().expect("node");
        assert_eq!(
            graph.node(pasted).map(|n| n.position),
            Some(Position::new(40, -20))
        );
    }

    #[test]
    fn pasted_chain_compiles_like_the_original() {
        let fragment = chain_fragment();
        let mut source = QueryGraph::new();
        merge_fragment(&mut source, &fragment, 0, 0).expect("restore");
        let original_tree = compile(&source).expect("compile original");

        let mut dest = QueryGraph::new();
        activity_at(&mut dest, "existing", 0, 0);
        merge_fragment(&mut dest, &fragment, 0, 0).expect("paste");
        let tree = compile(&dest).expect("compile dest");

        // Pasted component appears alongside the existing one.
        let CompiledQuery::And(parts) = tree else {
            panic!("expected And");
        };
        assert_eq!(parts.len(), 2);
        assert!(matches!(parts[1], CompiledQuery::Follows { .. }));
        assert!(matches!(original_tree, CompiledQuery::Follows { .. }));
    }

    #[test]
    fn or_adoption_fires_during_replay() {
        // Capture an OrSplit with a trunk connector; on merge, the Or-node
        // must adopt the trunk partner's params via the replay path.
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::OrSplit,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let t = activity_at(&mut graph, "pack", 0, 0);
        graph
            .add_edge(EdgeKind::OrConnector, t, o, None)
            .expect("trunk");
        let mut fragment = Fragment::from_graph(&graph);
        // Strip the adopted params to prove replay re-derives them.
        for node in &mut fragment.nodes {
            if node.kind.is_or() {
                node.params = PredicateParams::default();
            }
        }

        let mut dest = QueryGraph::new();
        activity_at(&mut dest, "existing", 0, 0);
        let report = merge_fragment(&mut dest, &fragment, 0, 0).expect("merge");

        let new_or = report.node_mapping.get(&o).copied().expect("mapped or");
        assert_eq!(
            dest.node(new_or).map(|n| n.params.activities.clone()),
            Some(vec!["pack".to_string()])
        );
    }

    #[test]
    fn invalid_edge_reported_as_dropped() {
        // Hand-assembled fragment with a self-loop edge: nodes merge, the
        // edge is dropped with a reason.
        let mut graph = QueryGraph::new();
        let a = activity_at(&mut graph, "pack", 0, 0);
        let mut fragment = Fragment::from_graph(&graph);
        fragment.edges.push(RelationEdge::new(
            EdgeId(0),
            EdgeKind::DirectlyFollows,
            a,
            a,
            None,
        ));

        let mut dest = QueryGraph::new();
        let report = merge_fragment(&mut dest, &fragment, 0, 0).expect("merge");
        assert_eq!(report.added_nodes(), 1);
        assert_eq!(report.added_edges(), 0);
        assert_eq!(report.dropped_edges.len(), 1);
        assert!(report.dropped_edges[0].reason.contains("self-loop"));
    }

    #[test]
    fn edge_with_unknown_endpoint_reported_as_dropped() {
        let mut fragment = chain_fragment();
        fragment.edges.push(RelationEdge::new(
            EdgeId(99),
            EdgeKind::DirectlyFollows,
            NodeId(0),
            NodeId(42),
            None,
        ));

        let mut graph = QueryGraph::new();
        let report = merge_fragment(&mut graph, &fragment, 0, 0).expect("merge");
        assert_eq!(report.dropped_edges.len(), 1);
        assert_eq!(report.dropped_edges[0].original, EdgeId(99));
    }

    #[test]
    fn invalid_node_aborts_merge_untouched() {
        let mut fragment = chain_fragment();
        // Activity predicates need at least one activity name.
        if let Some(node) = fragment.nodes.first_mut() {
            node.params.activities.clear();
        }

        let mut graph = QueryGraph::new();
        let result = merge_fragment(&mut graph, &fragment, 0, 0);
        assert!(matches!(result, Err(ProcqError::InvalidParams { .. })));
        assert!(graph.is_empty());
    }

    #[test]
    fn selection_capture_cuts_boundary_edges() {
        let mut graph = QueryGraph::new();
        let a = activity_at(&mut graph, "pack", 0, 0);
        let b = activity_at(&mut graph, "ship", 100, 0);
        let c = activity_at(&mut graph, "deliver", 200, 0);
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, None)
            .expect("e1");
        graph
            .add_edge(EdgeKind::DirectlyFollows, b, c, None)
            .expect("e2");

        let selection: BTreeSet<NodeId> = [a, b].into_iter().collect();
        let fragment = Fragment::from_selection(&graph, &selection);
        assert_eq!(fragment.nodes.len(), 2);
        // Only a->b survives; b->c crosses the boundary.
        assert_eq!(fragment.edges.len(), 1);
    }

    #[test]
    fn restored_negation_flags_recomputed() {
        let mut graph = QueryGraph::new();
        let a = activity_at(&mut graph, "pack", 0, 0);
        let b = activity_at(&mut graph, "ship", 100, 0);
        let constraint = EdgeConstraint {
            negated: true,
            ..EdgeConstraint::default()
        };
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, Some(constraint))
            .expect("edge");
        let fragment = Fragment::from_graph(&graph);

        let mut restored = QueryGraph::new();
        merge_fragment(&mut restored, &fragment, 0, 0).expect("merge");
        assert!(restored.node(b).map(|n| n.negated).expect("b"));
    }
}
