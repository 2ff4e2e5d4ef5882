//! # Graph Compiler
//!
//! Pure translation from a `QueryGraph` to a nested boolean combinator
//! tree (`CompiledQuery`). No I/O, no caching, no mutation of the input;
//! compiling the same graph twice yields structurally identical trees.
//!
//! ## Algorithm
//!
//! 1. Every ordinary node starts as its own component holding a `Leaf`
//!    expression (wrapped in `Not` when the node carries a NOT modifier).
//! 2. Sequencing edges are folded in ascending edge-id order: each edge
//!    merges its two components into one whose expression is a `Follows`
//!    combinator (wrapped in `Not` for NOT edges). A merged combinator
//!    participates in later folds exactly like a leaf.
//! 3. Or-nodes are resolved in ascending node-id order: a split/join needs
//!    its trunk and both fan branches, a `SingleOr` just both branches.
//!    The fan components become the OR operands; for split/join the trunk
//!    component is AND-combined with the OR.
//! 4. Remaining components are combined by an implicit top-level AND in
//!    ascending order of their smallest node id; a single component is
//!    returned bare.

use crate::{
    EdgeConstraint, EdgeId, EdgeKind, NodeId, NodeKind, PredicateParams, ProcqError, QueryGraph,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// =============================================================================
// COMPILED TREE
// =============================================================================

/// A node of the compiled boolean tree.
///
/// The tree is self-contained: leaves and combinators carry the parameter
/// records they were compiled from, so an evaluation engine needs no access
/// to the source graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompiledQuery {
    /// An atomic predicate compiled from an ordinary node.
    Leaf {
        node: NodeId,
        kind: NodeKind,
        params: PredicateParams,
    },

    /// Boolean negation of a sub-tree.
    Not(Box<CompiledQuery>),

    /// Temporal sequencing combinator compiled from a sequencing edge.
    Follows {
        edge: EdgeId,
        kind: EdgeKind,
        constraint: EdgeConstraint,
        lhs: Box<CompiledQuery>,
        rhs: Box<CompiledQuery>,
    },

    /// Conjunction of sub-trees.
    And(Vec<CompiledQuery>),

    /// Disjunction of sub-trees.
    Or(Vec<CompiledQuery>),
}

impl CompiledQuery {
    /// Number of leaves in the tree.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Not(inner) => inner.leaf_count(),
            Self::Follows { lhs, rhs, .. } => lhs.leaf_count() + rhs.leaf_count(),
            Self::And(parts) | Self::Or(parts) => parts.iter().map(Self::leaf_count).sum(),
        }
    }

    /// Maximum nesting depth of the tree.
    #[must_use]
    pub fn depth(&self) -> usize {
        match self {
            Self::Leaf { .. } => 1,
            Self::Not(inner) => 1 + inner.depth(),
            Self::Follows { lhs, rhs, .. } => 1 + lhs.depth().max(rhs.depth()),
            Self::And(parts) | Self::Or(parts) => {
                1 + parts.iter().map(Self::depth).max().unwrap_or(0)
            }
        }
    }
}

// =============================================================================
// COMPILATION
// =============================================================================

/// Per-component state during folding: representative pointers plus the
/// expression each live component has accumulated so far.
struct Components {
    parent: BTreeMap<NodeId, NodeId>,
    exprs: BTreeMap<NodeId, CompiledQuery>,
}

impl Components {
    fn new() -> Self {
        Self {
            parent: BTreeMap::new(),
            exprs: BTreeMap::new(),
        }
    }

    /// Representative of the component containing `id`. Path length is
    /// bounded by the number of folds, no compression needed.
    fn find(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(&next) = self.parent.get(&current) {
            if next == current {
                break;
            }
            current = next;
        }
        current
    }

    /// Merge the components of `ids` into one rooted at `root`, replacing
    /// their expressions with `expr`.
    fn merge(&mut self, root: NodeId, ids: &[NodeId], expr: CompiledQuery) {
        for &id in ids {
            let rep = self.find(id);
            self.exprs.remove(&rep);
            self.parent.insert(rep, root);
        }
        self.parent.insert(root, root);
        self.exprs.insert(root, expr);
    }

    /// Take the expression of the component containing `id`, if any.
    fn take(&mut self, id: NodeId) -> Option<CompiledQuery> {
        let rep = self.find(id);
        self.exprs.remove(&rep)
    }
}

/// Compile a query graph into its boolean combinator tree.
///
/// Returns an error when the graph is structurally incomplete (an Or-node
/// missing a branch or trunk, or an edge referencing a missing node);
/// compilation never partially succeeds.
pub fn compile(graph: &QueryGraph) -> Result<CompiledQuery, ProcqError> {
    // Dangling edges cannot arise through the mutation API, but compile
    // accepts any graph value (for example a deserialized one).
    for edge in graph.edges() {
        for endpoint in [edge.source, edge.target] {
            if !graph.contains_node(endpoint) {
                return Err(ProcqError::DanglingEdge {
                    edge: edge.id,
                    node: endpoint,
                });
            }
        }
    }

    let mut components = Components::new();

    // Step 1: ordinary nodes seed singleton components.
    for node in graph.nodes() {
        if node.kind.is_leaf() {
            components.merge(node.id, &[], leaf_expr(node.id, node.kind, &node.params));
        }
    }

    // Step 2: fold sequencing edges in construction order.
    for edge in graph.edges() {
        if !edge.kind.is_sequencing() {
            continue;
        }
        let lhs_rep = components.find(edge.source);
        let rhs_rep = components.find(edge.target);
        let lhs = components
            .take(edge.source)
            .ok_or(ProcqError::DanglingEdge {
                edge: edge.id,
                node: edge.source,
            })?;
        let rhs = if rhs_rep == lhs_rep {
            // Both endpoints already share one component: the edge closes a
            // cycle. Unreachable through the mutation API, but compile
            // accepts any graph value.
            return Err(ProcqError::ChainCycle(edge.id));
        } else {
            components
                .take(edge.target)
                .ok_or(ProcqError::DanglingEdge {
                    edge: edge.id,
                    node: edge.target,
                })?
        };

        let constraint = edge.constraint.clone().unwrap_or_default();
        let negated = constraint.negated;
        let mut expr = CompiledQuery::Follows {
            edge: edge.id,
            kind: edge.kind,
            // NOT is expressed by the wrapping combinator.
            constraint: EdgeConstraint {
                negated: false,
                ..constraint
            },
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        };
        if negated {
            expr = CompiledQuery::Not(Box::new(expr));
        }
        components.merge(lhs_rep, &[edge.source, edge.target], expr);
    }

    // Step 3: resolve Or-nodes in id order; nested constructs resolve
    // outward because an earlier OR's component is reused as a branch or
    // trunk of a later one.
    for node in graph.nodes() {
        if !node.kind.is_or() {
            continue;
        }
        let connectors = graph.or_connectors(node.id)?;
        if connectors.fan.len() < 2 {
            return Err(ProcqError::MissingOrBranch(node.id));
        }

        // Branch order follows connector construction order.
        let mut fan = connectors.fan.clone();
        fan.sort_by_key(|(edge_id, _)| *edge_id);

        let mut branches = Vec::with_capacity(fan.len());
        let mut absorbed: Vec<NodeId> = vec![node.id];
        for (_, partner) in &fan {
            // A consumed component means two attachment points share one
            // chain; every leaf must stay owned by exactly one branch.
            // Unreachable through the mutation API, which rejects the
            // chain, but compile accepts any graph value.
            let expr = components
                .take(*partner)
                .ok_or(ProcqError::OrPartnersChained(node.id))?;
            branches.push(expr);
            absorbed.push(*partner);
        }
        let or_expr = CompiledQuery::Or(branches);

        let expr = match node.kind {
            NodeKind::SingleOr => or_expr,
            _ => {
                let (_, trunk_partner) = *connectors
                    .trunk
                    .first()
                    .ok_or(ProcqError::MissingOrTrunk(node.id))?;
                let trunk_expr = components
                    .take(trunk_partner)
                    .ok_or(ProcqError::OrPartnersChained(node.id))?;
                absorbed.push(trunk_partner);
                CompiledQuery::And(vec![trunk_expr, or_expr])
            }
        };

        let root = absorbed[0];
        components.merge(root, &absorbed, expr);
    }

    // Step 4: combine disjoint components in ascending min-node-id order.
    let mut ordered: BTreeMap<NodeId, CompiledQuery> = BTreeMap::new();
    let mut min_node: BTreeMap<NodeId, NodeId> = BTreeMap::new();
    for node in graph.nodes() {
        let rep = components.find(node.id);
        min_node.entry(rep).or_insert(node.id);
    }
    for (rep, expr) in std::mem::take(&mut components.exprs) {
        let key = min_node.get(&rep).copied().unwrap_or(rep);
        ordered.insert(key, expr);
    }

    let mut parts: Vec<CompiledQuery> = ordered.into_values().collect();
    match parts.len() {
        0 => Ok(CompiledQuery::And(Vec::new())),
        1 => parts.pop().ok_or_else(|| {
            ProcqError::SerializationError("component vector emptied unexpectedly".to_string())
        }),
        _ => Ok(CompiledQuery::And(parts)),
    }
}

/// Leaf expression for an ordinary node, `Not`-wrapped when the node-level
/// NOT modifier is set.
fn leaf_expr(id: NodeId, kind: NodeKind, params: &PredicateParams) -> CompiledQuery {
    let negated = params.negated;
    let leaf = CompiledQuery::Leaf {
        node: id,
        kind,
        params: PredicateParams {
            negated: false,
            ..params.clone()
        },
    };
    if negated {
        CompiledQuery::Not(Box::new(leaf))
    } else {
        leaf
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Position;

    fn activity(graph: &mut QueryGraph, name: &str) -> NodeId {
        let params = PredicateParams {
            activities: vec![name.to_string()],
            ..PredicateParams::default()
        };
        graph
            .insert_node(NodeKind::Activity, params, Position::default())
            .expect("insert activity")
    }

    fn leaf_name(expr: &CompiledQuery) -> &str {
        match expr {
            CompiledQuery::Leaf { params, .. } => params.activities.first().map_or("", |s| s),
            _ => "",
        }
    }

    #[test]
    fn empty_graph_compiles_to_empty_and() {
        let graph = QueryGraph::new();
        assert_eq!(compile(&graph).expect("compile"), CompiledQuery::And(vec![]));
    }

    #[test]
    fn single_node_compiles_to_bare_leaf() {
        let mut graph = QueryGraph::new();
        activity(&mut graph, "pack");
        let tree = compile(&graph).expect("compile");
        assert!(matches!(tree, CompiledQuery::Leaf { .. }));
    }

    #[test]
    fn two_node_chain_compiles_to_follows() {
        let mut graph = QueryGraph::new();
        let a = activity(&mut graph, "pack");
        let b = activity(&mut graph, "ship");
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, None)
            .expect("edge");

        let tree = compile(&graph).expect("compile");
        let CompiledQuery::Follows { kind, lhs, rhs, .. } = tree else {
            panic!("expected Follows, got {tree:?}");
        };
        assert_eq!(kind, EdgeKind::DirectlyFollows);
        assert_eq!(leaf_name(&lhs), "pack");
        assert_eq!(leaf_name(&rhs), "ship");
    }

    #[test]
    fn three_node_chain_nests_left() {
        // pack -> ship built first, then ship -> deliver: the second fold
        // sees the Follows combinator as its lhs.
        let mut graph = QueryGraph::new();
        let a = activity(&mut graph, "pack");
        let b = activity(&mut graph, "ship");
        let c = activity(&mut graph, "deliver");
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, None)
            .expect("e1");
        graph
            .add_edge(EdgeKind::EventuallyFollows, b, c, None)
            .expect("e2");

        let tree = compile(&graph).expect("compile");
        let CompiledQuery::Follows { kind, lhs, rhs, .. } = tree else {
            panic!("expected Follows, got {tree:?}");
        };
        assert_eq!(kind, EdgeKind::EventuallyFollows);
        assert!(matches!(*lhs, CompiledQuery::Follows { .. }));
        assert_eq!(leaf_name(&rhs), "deliver");
    }

    #[test]
    fn disjoint_components_joined_by_and_in_id_order() {
        let mut graph = QueryGraph::new();
        activity(&mut graph, "first");
        activity(&mut graph, "second");

        let tree = compile(&graph).expect("compile");
        let CompiledQuery::And(parts) = tree else {
            panic!("expected And, got {tree:?}");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(leaf_name(&parts[0]), "first");
        assert_eq!(leaf_name(&parts[1]), "second");
    }

    #[test]
    fn negated_leaf_wrapped_in_not() {
        let mut graph = QueryGraph::new();
        let params = PredicateParams {
            activities: vec!["pack".to_string()],
            negated: true,
            ..PredicateParams::default()
        };
        graph
            .insert_node(NodeKind::Activity, params, Position::default())
            .expect("insert");

        let tree = compile(&graph).expect("compile");
        let CompiledQuery::Not(inner) = tree else {
            panic!("expected Not, got {tree:?}");
        };
        // The carried params are un-negated; negation lives on the wrapper.
        let CompiledQuery::Leaf { params, .. } = *inner else {
            panic!("expected Leaf");
        };
        assert!(!params.negated);
    }

    #[test]
    fn negated_edge_wraps_follows_in_not() {
        let mut graph = QueryGraph::new();
        let a = activity(&mut graph, "pack");
        let b = activity(&mut graph, "ship");
        let constraint = EdgeConstraint {
            negated: true,
            ..EdgeConstraint::default()
        };
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, Some(constraint))
            .expect("edge");

        let tree = compile(&graph).expect("compile");
        let CompiledQuery::Not(inner) = tree else {
            panic!("expected Not, got {tree:?}");
        };
        let CompiledQuery::Follows { constraint, .. } = *inner else {
            panic!("expected Follows");
        };
        assert!(!constraint.negated);
    }

    #[test]
    fn or_split_compiles_to_trunk_and_or() {
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::OrSplit,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let trunk = activity(&mut graph, "pack");
        let air = activity(&mut graph, "air");
        let sea = activity(&mut graph, "sea");
        graph
            .add_edge(EdgeKind::OrConnector, trunk, o, None)
            .expect("trunk");
        graph
            .add_edge(EdgeKind::OrConnector, o, air, None)
            .expect("fan air");
        graph
            .add_edge(EdgeKind::OrConnector, o, sea, None)
            .expect("fan sea");

        let tree = compile(&graph).expect("compile");
        let CompiledQuery::And(parts) = tree else {
            panic!("expected And, got {tree:?}");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(leaf_name(&parts[0]), "pack");
        let CompiledQuery::Or(branches) = &parts[1] else {
            panic!("expected Or, got {:?}", parts[1]);
        };
        assert_eq!(leaf_name(&branches[0]), "air");
        assert_eq!(leaf_name(&branches[1]), "sea");
    }

    #[test]
    fn single_or_compiles_to_bare_or() {
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::SingleOr,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let air = activity(&mut graph, "air");
        let sea = activity(&mut graph, "sea");
        graph
            .add_edge(EdgeKind::OrConnector, o, air, None)
            .expect("fan air");
        graph
            .add_edge(EdgeKind::OrConnector, o, sea, None)
            .expect("fan sea");

        let tree = compile(&graph).expect("compile");
        assert!(matches!(tree, CompiledQuery::Or(ref b) if b.len() == 2));
    }

    #[test]
    fn or_with_one_branch_is_a_compile_error() {
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::SingleOr,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let air = activity(&mut graph, "air");
        graph
            .add_edge(EdgeKind::OrConnector, o, air, None)
            .expect("fan");

        let result = compile(&graph);
        assert!(matches!(result, Err(ProcqError::MissingOrBranch(id)) if id == o));
    }

    #[test]
    fn or_split_without_trunk_is_a_compile_error() {
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::OrSplit,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let air = activity(&mut graph, "air");
        let sea = activity(&mut graph, "sea");
        graph
            .add_edge(EdgeKind::OrConnector, o, air, None)
            .expect("fan air");
        graph
            .add_edge(EdgeKind::OrConnector, o, sea, None)
            .expect("fan sea");

        let result = compile(&graph);
        assert!(matches!(result, Err(ProcqError::MissingOrTrunk(id)) if id == o));
    }

    /// Append a sequencing edge to a serialized graph value, bypassing the
    /// mutation API the way a hand-edited graph file could.
    fn inject_sequencing_edge(graph: &QueryGraph, source: NodeId, target: NodeId) -> QueryGraph {
        let id = graph.next_edge_id();
        let mut value = serde_json::to_value(graph).expect("serialize");
        value["edges"][id.to_string()] = serde_json::json!({
            "id": id,
            "kind": "DirectlyFollows",
            "source": source.0,
            "target": target.0,
            "constraint": EdgeConstraint::default(),
        });
        value["next_edge_id"] = serde_json::json!(id + 1);
        serde_json::from_value(value).expect("deserialize")
    }

    #[test]
    fn chained_fan_partners_are_a_compile_error() {
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::SingleOr,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let air = activity(&mut graph, "air");
        let sea = activity(&mut graph, "sea");
        graph
            .add_edge(EdgeKind::OrConnector, o, air, None)
            .expect("fan air");
        graph
            .add_edge(EdgeKind::OrConnector, o, sea, None)
            .expect("fan sea");

        // air -> sea merges both alternatives into one component; every
        // leaf must stay owned by exactly one branch, so this cannot
        // produce a tree.
        let hostile = inject_sequencing_edge(&graph, air, sea);
        let result = compile(&hostile);
        assert!(matches!(result, Err(ProcqError::OrPartnersChained(id)) if id == o));
    }

    #[test]
    fn trunk_chained_into_fan_is_a_compile_error() {
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::OrSplit,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let trunk = activity(&mut graph, "pack");
        let air = activity(&mut graph, "air");
        let sea = activity(&mut graph, "sea");
        graph
            .add_edge(EdgeKind::OrConnector, trunk, o, None)
            .expect("trunk");
        graph
            .add_edge(EdgeKind::OrConnector, o, air, None)
            .expect("fan air");
        graph
            .add_edge(EdgeKind::OrConnector, o, sea, None)
            .expect("fan sea");

        let hostile = inject_sequencing_edge(&graph, trunk, air);
        let result = compile(&hostile);
        assert!(matches!(result, Err(ProcqError::OrPartnersChained(id)) if id == o));
    }

    #[test]
    fn or_branch_chains_fold_before_or_resolution() {
        // SingleOr over two branches where one branch is itself a chain.
        let mut graph = QueryGraph::new();
        let o = graph
            .insert_node(
                NodeKind::SingleOr,
                PredicateParams::default(),
                Position::default(),
            )
            .expect("or");
        let a = activity(&mut graph, "pick");
        let b = activity(&mut graph, "pack");
        let c = activity(&mut graph, "express");
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, None)
            .expect("chain");
        graph
            .add_edge(EdgeKind::OrConnector, o, a, None)
            .expect("fan chain");
        graph
            .add_edge(EdgeKind::OrConnector, o, c, None)
            .expect("fan leaf");

        let tree = compile(&graph).expect("compile");
        let CompiledQuery::Or(branches) = tree else {
            panic!("expected Or, got {tree:?}");
        };
        assert!(matches!(branches[0], CompiledQuery::Follows { .. }));
        assert_eq!(leaf_name(&branches[1]), "express");
    }

    #[test]
    fn compile_is_deterministic() {
        let mut graph = QueryGraph::new();
        let a = activity(&mut graph, "pack");
        let b = activity(&mut graph, "ship");
        activity(&mut graph, "lonely");
        graph
            .add_edge(EdgeKind::EventuallyFollows, a, b, None)
            .expect("edge");

        let first = compile(&graph).expect("first");
        let second = compile(&graph).expect("second");
        assert_eq!(first, second);
    }

    #[test]
    fn compile_does_not_mutate_the_graph() {
        let mut graph = QueryGraph::new();
        let a = activity(&mut graph, "pack");
        let b = activity(&mut graph, "ship");
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, None)
            .expect("edge");

        let before = graph.clone();
        let _ = compile(&graph).expect("compile");
        assert_eq!(graph, before);
    }

    #[test]
    fn leaf_count_and_depth() {
        let mut graph = QueryGraph::new();
        let a = activity(&mut graph, "pack");
        let b = activity(&mut graph, "ship");
        graph
            .add_edge(EdgeKind::DirectlyFollows, a, b, None)
            .expect("edge");

        let tree = compile(&graph).expect("compile");
        assert_eq!(tree.leaf_count(), 2);
        assert_eq!(tree.depth(), 2);
    }
}
