//! # Core Type Definitions
//!
//! All core types for the procq query-graph substrate:
//! - Graph identifiers (`NodeId`, `EdgeId`) and canvas `Position`
//! - Predicate node kinds and parameter records
//! - Relation edge kinds and sequencing constraints
//! - Error types (`ProcqError`)
//!
//! ## Determinism Guarantees
//!
//! All types in this module:
//! - Use integer arithmetic only (probabilities are permyriad, no floats)
//! - Implement `Ord` where used as `BTreeMap`/`BTreeSet` keys
//! - Use saturating arithmetic for coordinates and counters

use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// GRAPH IDENTIFIERS
// =============================================================================

/// Unique identifier for a predicate node within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub u64);

/// Unique identifier for a relation edge within a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub u64);

/// Integer canvas position of a node.
///
/// The renderer collaborator owns layout; the core only carries positions
/// so that paste offsets are deterministic and testable.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Position {
    pub x: i64,
    pub y: i64,
}

impl Position {
    /// Create a new position.
    #[must_use]
    pub const fn new(x: i64, y: i64) -> Self {
        Self { x, y }
    }

    /// Return this position shifted by an offset, saturating at the edges.
    #[must_use]
    pub const fn offset_by(self, dx: i64, dy: i64) -> Self {
        Self {
            x: self.x.saturating_add(dx),
            y: self.y.saturating_add(dy),
        }
    }
}

// =============================================================================
// PREDICATE PARAMETERS
// =============================================================================

/// Quantifier over the objects/events a predicate ranges over.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum Quantifier {
    #[default]
    None,
    Any,
    All,
}

/// Comparison operator for count/probability/metric thresholds.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum CmpOp {
    #[default]
    Gte,
    Lte,
    Eq,
}

impl CmpOp {
    /// Apply the comparison to two ordered values.
    #[must_use]
    pub fn holds<T: Ord>(self, lhs: T, rhs: T) -> bool {
        match self {
            Self::Gte => lhs >= rhs,
            Self::Lte => lhs <= rhs,
            Self::Eq => lhs == rhs,
        }
    }

    /// Display symbol for threshold labels.
    #[must_use]
    pub const fn symbol(self) -> &'static str {
        match self {
            Self::Gte => "\u{2265}",
            Self::Lte => "\u{2264}",
            Self::Eq => "=",
        }
    }
}

/// Absolute occurrence-count threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CountThreshold {
    pub op: CmpOp,
    pub count: u64,
}

impl CountThreshold {
    /// Create a new count threshold.
    #[must_use]
    pub const fn new(op: CmpOp, count: u64) -> Self {
        Self { op, count }
    }

    /// Check a measured count against the threshold.
    #[must_use]
    pub fn holds(&self, measured: u64) -> bool {
        self.op.holds(measured, self.count)
    }

    /// Display label, e.g. `count ≥ 1`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("count {} {}", self.op.symbol(), self.count)
    }
}

/// Probability threshold in permyriad (1/10000), keeping the core float-free.
///
/// `permyriad = 2500` means a probability of 0.25.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProbabilityThreshold {
    pub op: CmpOp,
    /// Probability scaled by `primitives::PROBABILITY_SCALE` (0..=10000).
    pub permyriad: u16,
}

impl ProbabilityThreshold {
    /// Create a new probability threshold. Values above 10000 are clamped.
    #[must_use]
    pub fn new(op: CmpOp, permyriad: u16) -> Self {
        Self {
            op,
            permyriad: permyriad.min(crate::primitives::PROBABILITY_SCALE),
        }
    }

    /// Check a measured ratio (`matched` out of `total`) against the
    /// threshold using integer cross-multiplication.
    #[must_use]
    pub fn holds_ratio(&self, matched: u64, total: u64) -> bool {
        if total == 0 {
            // An empty population satisfies only `<=` thresholds.
            return matches!(self.op, CmpOp::Lte) || self.permyriad == 0;
        }
        let lhs = matched.saturating_mul(u64::from(crate::primitives::PROBABILITY_SCALE));
        let rhs = u64::from(self.permyriad).saturating_mul(total);
        self.op.holds(lhs, rhs)
    }

    /// Display label, e.g. `p ≥ 25.00%`.
    #[must_use]
    pub fn label(&self) -> String {
        format!(
            "p {} {}.{:02}%",
            self.op.symbol(),
            self.permyriad / 100,
            self.permyriad % 100
        )
    }
}

/// Constraint on a named performance metric (durations, counts, ...).
///
/// Metric values are integers; the unit is owned by the evaluation engine.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MetricConstraint {
    pub metric: String,
    pub op: CmpOp,
    pub value: i64,
}

impl MetricConstraint {
    /// Display label, e.g. `duration ≤ 3600`.
    #[must_use]
    pub fn label(&self) -> String {
        format!("{} {} {}", self.metric, self.op.symbol(), self.value)
    }
}

/// Which aspect of events/objects a leaf predicate tests.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub enum PredicateFeature {
    /// Membership of an activity / object / object type.
    #[default]
    Membership,
    /// Object is contained in (linked to) at least one event.
    Containment,
    /// The predicate anchors at the first event of an execution.
    Start,
    /// The predicate anchors at the last event of an execution.
    End,
}

/// Kind-specific parameter record for a predicate node.
///
/// Which fields apply to which node kind is defined by the catalog
/// (`catalog::schema`); graph mutations validate against it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PredicateParams {
    pub feature: PredicateFeature,
    /// Activity names for activity-membership predicates.
    pub activities: Vec<String>,
    /// Object type for object / object-type predicates.
    pub object_type: Option<String>,
    pub quantifier: Quantifier,
    pub count: Option<CountThreshold>,
    pub probability: Option<ProbabilityThreshold>,
    pub metric: Option<MetricConstraint>,
    /// Node-level NOT modifier, set by the predicate editor.
    pub negated: bool,
}

impl PredicateParams {
    /// Derived display string for the renderer (threshold labels joined).
    #[must_use]
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if !self.activities.is_empty() {
            parts.push(self.activities.join("|"));
        }
        if let Some(ot) = &self.object_type {
            parts.push(ot.clone());
        }
        if let Some(c) = &self.count {
            parts.push(c.label());
        }
        if let Some(p) = &self.probability {
            parts.push(p.label());
        }
        if let Some(m) = &self.metric {
            parts.push(m.label());
        }
        if self.negated {
            parts.push("NOT".to_string());
        }
        parts.join(", ")
    }
}

// =============================================================================
// PREDICATE NODE
// =============================================================================

/// Kind tag of a predicate node.
///
/// `Activity`/`Object`/`ObjectType` compile to leaves; the Or-kinds are
/// structural pseudo-nodes compiling to an OR combinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum NodeKind {
    Activity,
    Object,
    ObjectType,
    OrSplit,
    OrJoin,
    SingleOr,
}

impl NodeKind {
    /// True for the structural Or pseudo-nodes.
    #[must_use]
    pub const fn is_or(self) -> bool {
        matches!(self, Self::OrSplit | Self::OrJoin | Self::SingleOr)
    }

    /// True for kinds that compile to a leaf predicate.
    #[must_use]
    pub const fn is_leaf(self) -> bool {
        !self.is_or()
    }

    /// Display name for the renderer.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::Activity => "activity",
            Self::Object => "object",
            Self::ObjectType => "object type",
            Self::OrSplit => "OR split",
            Self::OrJoin => "OR join",
            Self::SingleOr => "OR",
        }
    }
}

/// A vertex of the query graph: one atomic condition, plain data only.
///
/// Handler dispatch lives in `QueryGraph` via id lookup; nodes never carry
/// callbacks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PredicateNode {
    pub id: NodeId,
    pub kind: NodeKind,
    pub params: PredicateParams,
    pub position: Position,
    /// Derived flag: true once an incoming NOT sequencing edge marks this
    /// node or its own params carry the NOT modifier. Maintained by
    /// `QueryGraph::refresh_negation`; a negated node may not gain outgoing
    /// sequencing edges.
    pub negated: bool,
}

impl PredicateNode {
    /// Create a new node with a cleared derived-negation flag.
    #[must_use]
    pub fn new(id: NodeId, kind: NodeKind, params: PredicateParams, position: Position) -> Self {
        Self {
            id,
            kind,
            params,
            position,
            negated: false,
        }
    }
}

// =============================================================================
// RELATION EDGE
// =============================================================================

/// Kind tag of a relation edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EdgeKind {
    DirectlyFollows,
    EventuallyFollows,
    OrConnector,
}

impl EdgeKind {
    /// True for the temporal sequencing kinds.
    #[must_use]
    pub const fn is_sequencing(self) -> bool {
        matches!(self, Self::DirectlyFollows | Self::EventuallyFollows)
    }

    /// Display name for the renderer.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::DirectlyFollows => "directly follows",
            Self::EventuallyFollows => "eventually follows",
            Self::OrConnector => "or",
        }
    }
}

/// Thresholds carried by a sequencing edge.
///
/// OrConnector edges are structural only and carry no constraint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct EdgeConstraint {
    pub count: Option<CountThreshold>,
    pub probability: Option<ProbabilityThreshold>,
    pub metric: Option<MetricConstraint>,
    /// Edge-level NOT modifier; propagates `negated` onto the target node.
    pub negated: bool,
}

impl EdgeConstraint {
    /// Derived display string for the renderer.
    #[must_use]
    pub fn label(&self) -> String {
        let mut parts = Vec::new();
        if let Some(c) = &self.count {
            parts.push(c.label());
        }
        if let Some(p) = &self.probability {
            parts.push(p.label());
        }
        if let Some(m) = &self.metric {
            parts.push(m.label());
        }
        if self.negated {
            parts.push("NOT".to_string());
        }
        parts.join(", ")
    }
}

/// A directed edge of the query graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationEdge {
    pub id: EdgeId,
    pub kind: EdgeKind,
    pub source: NodeId,
    pub target: NodeId,
    /// Present exactly for sequencing kinds.
    pub constraint: Option<EdgeConstraint>,
}

impl RelationEdge {
    /// Create a new edge.
    #[must_use]
    pub const fn new(
        id: EdgeId,
        kind: EdgeKind,
        source: NodeId,
        target: NodeId,
        constraint: Option<EdgeConstraint>,
    ) -> Self {
        Self {
            id,
            kind,
            source,
            target,
            constraint,
        }
    }

    /// True when this edge carries a NOT modifier.
    #[must_use]
    pub fn is_negating(&self) -> bool {
        self.kind.is_sequencing() && self.constraint.as_ref().is_some_and(|c| c.negated)
    }
}

/// Connector port of an Or-node, relative to its current role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrPort {
    /// The single-edge side (the trunk predicate).
    Trunk,
    /// The two-edge side (the alternative branches).
    Fan,
}

// =============================================================================
// ERROR TYPES
// =============================================================================

/// Errors that can occur in the procq core.
///
/// - Structural validation errors leave the graph unchanged
/// - Compile errors abort compilation without producing a tree
/// - No error category is fatal; the graph stays editable
#[derive(Debug, Error)]
pub enum ProcqError {
    /// The requested node was not found in the graph.
    #[error("node not found: {0:?}")]
    NodeNotFound(NodeId),

    /// The requested edge was not found in the graph.
    #[error("edge not found: {0:?}")]
    EdgeNotFound(EdgeId),

    /// Self-loops are never valid.
    #[error("self-loop rejected on {0:?}")]
    SelfLoop(NodeId),

    /// Sequencing edges may only connect ordinary predicate nodes.
    #[error("sequencing edge may not attach to Or-node {0:?}")]
    SequencingIntoOr(NodeId),

    /// A connector must join exactly one ordinary node and one Or-node.
    #[error("connector must join one predicate node and one Or-node ({from_node:?} -> {to_node:?})")]
    InvalidConnector { from_node: NodeId, to_node: NodeId },

    /// The Or-node port already has its full complement of connectors.
    #[error("{port:?} port of Or-node {node:?} is already fully connected")]
    OrPortOccupied { node: NodeId, port: OrPort },

    /// Two attachment points of one Or-node may not share a sequencing
    /// chain: the construct would collapse into a single alternative.
    #[error("attachment points of Or-node {0:?} are chained into one component")]
    OrPartnersChained(NodeId),

    /// Negation is terminal in a chain: a negated node gets no outgoing
    /// sequencing edges.
    #[error("node {0:?} is negated and cannot source a sequencing edge")]
    NegatedSource(NodeId),

    /// Setting a NOT modifier would leave the target with outgoing
    /// sequencing edges.
    #[error("cannot negate: node {0:?} already has outgoing sequencing edges")]
    NegatedNodeHasOutgoing(NodeId),

    /// Parameter record does not match the kind's catalog schema.
    #[error("invalid params for {kind:?} predicate: {reason}")]
    InvalidParams { kind: NodeKind, reason: String },

    /// Role toggle is incompatible with the existing connector edges.
    #[error("role toggle on {0:?} conflicts with existing connector edges")]
    RoleToggleConflict(NodeId),

    /// Only Or-nodes can toggle between split and join roles.
    #[error("node {0:?} is not an OR split/join")]
    NotAnOrNode(NodeId),

    /// An Or-node is missing one of its two fan branches (compile error).
    #[error("Or-node {0:?} is missing a fan branch")]
    MissingOrBranch(NodeId),

    /// A split/join Or-node has no trunk connection (compile error).
    #[error("Or-node {0:?} is missing its trunk connection")]
    MissingOrTrunk(NodeId),

    /// A sequencing edge would close a cycle within a chain.
    #[error("edge {0:?} would close a sequencing cycle")]
    ChainCycle(EdgeId),

    /// An edge references a node absent from the graph (compile error).
    #[error("edge {edge:?} references missing node {node:?}")]
    DanglingEdge { edge: EdgeId, node: NodeId },

    /// Constraint params were supplied for a structural connector edge.
    #[error("connector edges carry no constraint params ({0:?})")]
    ConstraintOnConnector(EdgeId),

    /// The named fragment does not exist in the store.
    #[error("fragment not found: {0}")]
    FragmentNotFound(String),

    /// A serialization error occurred.
    #[error("serialization error: {0}")]
    SerializationError(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

// =============================================================================
// TESTS
// =============================================================================
