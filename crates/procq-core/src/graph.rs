//! # Query Graph Model
//!
//! The mutable node/edge collections for the procq core.
//!
//! `QueryGraph` is an arena of plain-data nodes and edges keyed by id; all
//! collections are `BTreeMap` for deterministic iteration. Structural
//! invariants are enforced synchronously: a rejected mutation commits
//! nothing.
//!
//! Invariants owned here:
//! - sequencing edges connect two ordinary predicate nodes
//! - connector edges join exactly one ordinary node and one Or-node, on a
//!   port with free capacity for the Or-node's current role
//! - a negated node never has outgoing sequencing edges
//! - the derived `negated` flag is maintained by a graph-wide pass after
//!   every mutation that can change it

use crate::primitives::{OR_FAN_WIDTH, OR_TRUNK_WIDTH};
use crate::{
    EdgeConstraint, EdgeId, EdgeKind, NodeId, NodeKind, OrPort, Position, PredicateNode,
    PredicateParams, ProcqError, RelationEdge, catalog,
};
use std::collections::{BTreeMap, BTreeSet};

// =============================================================================
// OR CONNECTOR VIEW
// =============================================================================

/// Connector edges of an Or-node grouped by port, each with its ordinary
/// partner. Computed on demand; used by role toggling and the compiler.
#[derive(Debug, Clone, Default)]
pub struct OrConnectors {
    /// Trunk-side connectors (at most one; empty for `SingleOr`).
    pub trunk: Vec<(EdgeId, NodeId)>,
    /// Fan-side connectors (at most two).
    pub fan: Vec<(EdgeId, NodeId)>,
}

// =============================================================================
// QUERY GRAPH
// =============================================================================

/// The node set and edge set currently on the canvas.
///
/// Not necessarily connected; disjoint sub-graphs are compiled
/// independently and combined by an implicit top-level AND.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct QueryGraph {
    /// Node storage keyed by id.
    nodes: BTreeMap<NodeId, PredicateNode>,

    /// Edge storage keyed by id. EdgeId order is construction order, which
    /// the compiler relies on for chain folding.
    edges: BTreeMap<EdgeId, RelationEdge>,

    /// Next available NodeId.
    next_node_id: u64,

    /// Next available EdgeId.
    next_edge_id: u64,
}

impl QueryGraph {
    /// Create a new empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // READ ACCESS
    // =========================================================================

    /// All nodes in ascending id order.
    pub fn nodes(&self) -> impl Iterator<Item = &PredicateNode> {
        self.nodes.values()
    }

    /// All edges in ascending id (construction) order.
    pub fn edges(&self) -> impl Iterator<Item = &RelationEdge> {
        self.edges.values()
    }

    /// Look up a node by id.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&PredicateNode> {
        self.nodes.get(&id)
    }

    /// Look up an edge by id.
    #[must_use]
    pub fn edge(&self, id: EdgeId) -> Option<&RelationEdge> {
        self.edges.get(&id)
    }

    /// Check whether the graph contains a node.
    #[must_use]
    pub fn contains_node(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Total number of nodes.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total number of edges.
    #[must_use]
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// True when the graph has neither nodes nor edges.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty() && self.edges.is_empty()
    }

    /// The next node id that would be assigned.
    #[must_use]
    pub fn next_node_id(&self) -> u64 {
        self.next_node_id
    }

    /// The next edge id that would be assigned.
    #[must_use]
    pub fn next_edge_id(&self) -> u64 {
        self.next_edge_id
    }

    /// Edges touching the given node, in edge-id order.
    pub fn incident_edges(&self, id: NodeId) -> impl Iterator<Item = &RelationEdge> {
        self.edges
            .values()
            .filter(move |e| e.source == id || e.target == id)
    }

    /// True if the node sources at least one sequencing edge.
    #[must_use]
    pub fn has_outgoing_sequencing(&self, id: NodeId) -> bool {
        self.edges
            .values()
            .any(|e| e.kind.is_sequencing() && e.source == id)
    }

    /// Derived view: all object types referenced by the current node set.
    ///
    /// Computed on demand; there is no separate registry to keep in sync.
    #[must_use]
    pub fn used_object_types(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .filter_map(|n| n.params.object_type.clone())
            .collect()
    }

    /// Derived view: all activity names referenced by the current node set.
    #[must_use]
    pub fn used_activities(&self) -> BTreeSet<String> {
        self.nodes
            .values()
            .flat_map(|n| n.params.activities.iter().cloned())
            .collect()
    }

    /// Connector edges of an Or-node grouped by trunk/fan port.
    ///
    /// Port direction depends on the node's role: a split's trunk is its
    /// incoming connector and its fan the outgoing ones; a join is the
    /// mirror image; a `SingleOr` has only an outgoing fan.
    pub fn or_connectors(&self, id: NodeId) -> Result<OrConnectors, ProcqError> {
        let node = self.nodes.get(&id).ok_or(ProcqError::NodeNotFound(id))?;
        if !node.kind.is_or() {
            return Err(ProcqError::NotAnOrNode(id));
        }

        let mut view = OrConnectors::default();
        for edge in self.edges.values() {
            if edge.kind != EdgeKind::OrConnector {
                continue;
            }
            if edge.source == id {
                match node.kind {
                    NodeKind::OrJoin => view.trunk.push((edge.id, edge.target)),
                    _ => view.fan.push((edge.id, edge.target)),
                }
            } else if edge.target == id {
                match node.kind {
                    NodeKind::OrJoin => view.fan.push((edge.id, edge.source)),
                    _ => view.trunk.push((edge.id, edge.source)),
                }
            }
        }
        Ok(view)
    }

    // =========================================================================
    // STRUCTURAL MUTATIONS
    // =========================================================================

    /// Insert a node built by the predicate editor. Params are validated
    /// against the catalog schema for the kind.
    pub fn insert_node(
        &mut self,
        kind: NodeKind,
        params: PredicateParams,
        position: Position,
    ) -> Result<NodeId, ProcqError> {
        catalog::validate_params(kind, &params)?;

        let id = NodeId(self.next_node_id);
        self.next_node_id = self.next_node_id.saturating_add(1);

        let mut node = PredicateNode::new(id, kind, params, position);
        node.negated = node.params.negated;
        self.nodes.insert(id, node);
        Ok(id)
    }

    /// Import a node preserving its original id (restore path).
    ///
    /// Bumps the id counter past the imported id. The derived negation flag
    /// is recomputed by the caller's final `refresh_negation`.
    pub fn import_node(&mut self, node: PredicateNode) -> Result<(), ProcqError> {
        catalog::validate_params(node.kind, &node.params)?;
        if node.id.0 >= self.next_node_id {
            self.next_node_id = node.id.0.saturating_add(1);
        }
        self.nodes.insert(node.id, node);
        Ok(())
    }

    /// Remove a node. Removal cascades to all incident edges; nodes that
    /// lose their negating predecessor are un-negated by the maintenance
    /// pass.
    pub fn remove_node(&mut self, id: NodeId) -> Result<(), ProcqError> {
        if !self.nodes.contains_key(&id) {
            return Err(ProcqError::NodeNotFound(id));
        }
        let incident: Vec<EdgeId> = self.incident_edges(id).map(|e| e.id).collect();
        for edge_id in incident {
            self.edges.remove(&edge_id);
        }
        self.nodes.remove(&id);
        self.refresh_negation();
        Ok(())
    }

    /// Remove an edge explicitly.
    pub fn remove_edge(&mut self, id: EdgeId) -> Result<(), ProcqError> {
        if self.edges.remove(&id).is_none() {
            return Err(ProcqError::EdgeNotFound(id));
        }
        self.refresh_negation();
        Ok(())
    }

    /// Add an edge from a connect gesture, allocating a fresh edge id.
    pub fn add_edge(
        &mut self,
        kind: EdgeKind,
        source: NodeId,
        target: NodeId,
        constraint: Option<EdgeConstraint>,
    ) -> Result<EdgeId, ProcqError> {
        let edge = RelationEdge::new(EdgeId(self.next_edge_id), kind, source, target, constraint);
        self.attach_edge(edge)
    }

    /// Attach a fully-formed edge, running the same validation and
    /// connect-time side effects as an interactive gesture.
    ///
    /// This is the replay entry point used by the merge engine: connector
    /// attachment copies the ordinary partner's params onto the Or-node,
    /// which plain id rewriting would miss.
    pub fn attach_edge(&mut self, mut edge: RelationEdge) -> Result<EdgeId, ProcqError> {
        self.validate_edge(&edge)?;

        // Sequencing edges always carry a constraint record.
        if edge.kind.is_sequencing() && edge.constraint.is_none() {
            edge.constraint = Some(EdgeConstraint::default());
        }

        if edge.id.0 >= self.next_edge_id {
            self.next_edge_id = edge.id.0.saturating_add(1);
        }

        let id = edge.id;
        let connector = (edge.kind == EdgeKind::OrConnector).then_some((edge.source, edge.target));
        self.edges.insert(id, edge);

        if let Some((source, target)) = connector {
            self.adopt_partner_params(source, target);
        }
        self.refresh_negation();
        Ok(id)
    }

    /// Validate an edge against all structural invariants without committing
    /// anything.
    fn validate_edge(&self, edge: &RelationEdge) -> Result<(), ProcqError> {
        let source = self
            .nodes
            .get(&edge.source)
            .ok_or(ProcqError::NodeNotFound(edge.source))?;
        let target = self
            .nodes
            .get(&edge.target)
            .ok_or(ProcqError::NodeNotFound(edge.target))?;
        if edge.source == edge.target {
            return Err(ProcqError::SelfLoop(edge.source));
        }

        match edge.kind {
            EdgeKind::DirectlyFollows | EdgeKind::EventuallyFollows => {
                if source.kind.is_or() {
                    return Err(ProcqError::SequencingIntoOr(source.id));
                }
                if target.kind.is_or() {
                    return Err(ProcqError::SequencingIntoOr(target.id));
                }
                // Negation is terminal in a chain.
                if source.negated {
                    return Err(ProcqError::NegatedSource(source.id));
                }
                if edge.is_negating() && self.has_outgoing_sequencing(target.id) {
                    return Err(ProcqError::NegatedNodeHasOutgoing(target.id));
                }
                // Chains stay acyclic so the compiler can fold them.
                if self.sequencing_reaches(target.id, source.id) {
                    return Err(ProcqError::ChainCycle(edge.id));
                }
                // A chain may not run between two attachment points of one
                // Or-node: the branches would collapse into one component
                // and the compiler could no longer keep them distinct.
                let lhs = self.sequencing_component(source.id);
                let rhs = self.sequencing_component(target.id);
                if let Some(or_id) = self.or_spanning(&lhs, &rhs) {
                    return Err(ProcqError::OrPartnersChained(or_id));
                }
            }
            EdgeKind::OrConnector => {
                if edge.constraint.is_some() {
                    return Err(ProcqError::ConstraintOnConnector(edge.id));
                }
                let (or_node, or_is_target) = match (source.kind.is_or(), target.kind.is_or()) {
                    (false, true) => (target, true),
                    (true, false) => (source, false),
                    _ => {
                        return Err(ProcqError::InvalidConnector {
                            from_node: edge.source,
                            to_node: edge.target,
                        });
                    }
                };

                // Which port does this connector land on under the current role?
                let port = match (or_node.kind, or_is_target) {
                    (NodeKind::OrSplit, true) | (NodeKind::OrJoin, false) => OrPort::Trunk,
                    (NodeKind::OrSplit | NodeKind::SingleOr, false) | (NodeKind::OrJoin, true) => {
                        OrPort::Fan
                    }
                    // SingleOr has no trunk; inbound connectors are invalid.
                    _ => {
                        return Err(ProcqError::InvalidConnector {
                            from_node: edge.source,
                            to_node: edge.target,
                        });
                    }
                };

                let connectors = self.or_connectors(or_node.id)?;
                let (occupied, capacity) = match port {
                    OrPort::Trunk => (connectors.trunk.len(), OR_TRUNK_WIDTH),
                    OrPort::Fan => (connectors.fan.len(), OR_FAN_WIDTH),
                };
                if occupied >= capacity {
                    return Err(ProcqError::OrPortOccupied {
                        node: or_node.id,
                        port,
                    });
                }

                // The new partner may not share a sequencing chain with an
                // existing attachment point of this Or-node.
                let partner = if or_is_target { source.id } else { target.id };
                let reach = self.sequencing_component(partner);
                for (_, existing) in connectors.trunk.iter().chain(connectors.fan.iter()) {
                    if reach.contains(existing) {
                        return Err(ProcqError::OrPartnersChained(or_node.id));
                    }
                }
            }
        }
        Ok(())
    }

    /// All nodes connected to `id` through sequencing edges, either
    /// direction. Always contains `id` itself.
    fn sequencing_component(&self, id: NodeId) -> BTreeSet<NodeId> {
        let mut seen = BTreeSet::new();
        let mut frontier = vec![id];
        while let Some(current) = frontier.pop() {
            if !seen.insert(current) {
                continue;
            }
            for edge in self.edges.values() {
                if !edge.kind.is_sequencing() {
                    continue;
                }
                if edge.source == current {
                    frontier.push(edge.target);
                } else if edge.target == current {
                    frontier.push(edge.source);
                }
            }
        }
        seen
    }

    /// The first Or-node with attachment points in both chain components.
    fn or_spanning(&self, lhs: &BTreeSet<NodeId>, rhs: &BTreeSet<NodeId>) -> Option<NodeId> {
        for node in self.nodes.values() {
            if !node.kind.is_or() {
                continue;
            }
            let mut in_lhs = false;
            let mut in_rhs = false;
            for edge in self.edges.values() {
                if edge.kind != EdgeKind::OrConnector {
                    continue;
                }
                let partner = if edge.source == node.id {
                    edge.target
                } else if edge.target == node.id {
                    edge.source
                } else {
                    continue;
                };
                in_lhs |= lhs.contains(&partner);
                in_rhs |= rhs.contains(&partner);
            }
            if in_lhs && in_rhs {
                return Some(node.id);
            }
        }
        None
    }

    /// True when `to` is reachable from `from` over sequencing edges.
    fn sequencing_reaches(&self, from: NodeId, to: NodeId) -> bool {
        let mut frontier = vec![from];
        let mut seen = BTreeSet::new();
        while let Some(current) = frontier.pop() {
            if current == to {
                return true;
            }
            if !seen.insert(current) {
                continue;
            }
            for edge in self.edges.values() {
                if edge.kind.is_sequencing() && edge.source == current {
                    frontier.push(edge.target);
                }
            }
        }
        false
    }

    /// Connect-time side effect: the Or-node adopts the ordinary partner's
    /// predicate params as display context. The NOT modifier stays on the
    /// partner leaf, so the adopted copy is un-negated.
    fn adopt_partner_params(&mut self, source: NodeId, target: NodeId) {
        let (or_id, partner_id) = match self.nodes.get(&source).map(|n| n.kind.is_or()) {
            Some(true) => (source, target),
            _ => (target, source),
        };
        let Some(partner) = self.nodes.get(&partner_id) else {
            return;
        };
        let mut adopted = partner.params.clone();
        adopted.negated = false;
        if let Some(or_node) = self.nodes.get_mut(&or_id) {
            or_node.params = adopted;
        }
    }

    /// Re-edit a node's params in place.
    pub fn update_node_params(
        &mut self,
        id: NodeId,
        params: PredicateParams,
    ) -> Result<(), ProcqError> {
        let kind = self
            .nodes
            .get(&id)
            .map(|n| n.kind)
            .ok_or(ProcqError::NodeNotFound(id))?;
        catalog::validate_params(kind, &params)?;
        if params.negated && self.has_outgoing_sequencing(id) {
            return Err(ProcqError::NegatedNodeHasOutgoing(id));
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.params = params;
        }
        self.refresh_negation();
        Ok(())
    }

    /// Re-edit a sequencing edge's constraint in place.
    pub fn update_edge_params(
        &mut self,
        id: EdgeId,
        constraint: EdgeConstraint,
    ) -> Result<(), ProcqError> {
        let edge = self.edges.get(&id).ok_or(ProcqError::EdgeNotFound(id))?;
        if !edge.kind.is_sequencing() {
            return Err(ProcqError::ConstraintOnConnector(id));
        }
        if constraint.negated && self.has_outgoing_sequencing(edge.target) {
            return Err(ProcqError::NegatedNodeHasOutgoing(edge.target));
        }
        if let Some(edge) = self.edges.get_mut(&id) {
            edge.constraint = Some(constraint);
        }
        self.refresh_negation();
        Ok(())
    }

    /// Toggle an Or-node between split and join roles.
    ///
    /// Existing connector edges are re-validated against the new role's
    /// directionality; the toggle is rejected (not auto-disconnected) when
    /// they no longer fit.
    pub fn toggle_or_role(&mut self, id: NodeId) -> Result<NodeKind, ProcqError> {
        let kind = self
            .nodes
            .get(&id)
            .map(|n| n.kind)
            .ok_or(ProcqError::NodeNotFound(id))?;
        let new_kind = match kind {
            NodeKind::OrSplit => NodeKind::OrJoin,
            NodeKind::OrJoin => NodeKind::OrSplit,
            _ => return Err(ProcqError::NotAnOrNode(id)),
        };

        // Under the new role, incoming/outgoing capacities swap.
        let mut incoming = 0usize;
        let mut outgoing = 0usize;
        for edge in self.edges.values() {
            if edge.kind != EdgeKind::OrConnector {
                continue;
            }
            if edge.target == id {
                incoming += 1;
            } else if edge.source == id {
                outgoing += 1;
            }
        }
        let (in_cap, out_cap) = match new_kind {
            NodeKind::OrSplit => (OR_TRUNK_WIDTH, OR_FAN_WIDTH),
            _ => (OR_FAN_WIDTH, OR_TRUNK_WIDTH),
        };
        if incoming > in_cap || outgoing > out_cap {
            return Err(ProcqError::RoleToggleConflict(id));
        }

        if let Some(node) = self.nodes.get_mut(&id) {
            node.kind = new_kind;
        }
        Ok(new_kind)
    }

    // =========================================================================
    // INVARIANT MAINTENANCE
    // =========================================================================

    /// Graph-wide negation pass: a node is negated iff its own params set
    /// the NOT modifier or an incoming sequencing edge does.
    ///
    /// Runs after every mutation that can change either input, instead of
    /// poking neighbor state from inside edge-update code.
    pub fn refresh_negation(&mut self) {
        let marked: BTreeSet<NodeId> = self
            .edges
            .values()
            .filter(|e| e.is_negating())
            .map(|e| e.target)
            .collect();
        for node in self.nodes.values_mut() {
            node.negated = node.params.negated || marked.contains(&node.id);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================
