//! # procq-core
//!
//! The deterministic query-graph substrate for procq - THE LOGIC.
//!
//! This crate implements the pure core of the visual process-query system:
//! the predicate catalog, the mutable query graph with its structural
//! invariants, the compiler to nested boolean combinator trees, and the
//! fragment merge engine behind copy/paste and persistence.
//!
//! ## Architectural Constraints
//!
//! The core:
//! - Is deterministic: `BTreeMap` collections only, integer arithmetic only
//! - Enforces invariants synchronously; a rejected mutation commits nothing
//! - Has NO async, NO network dependencies (pure Rust); scheduling and
//!   evaluation engines live in the app layer

// =============================================================================
// MODULES
// =============================================================================

pub mod catalog;
pub mod compile;
pub mod formats;
pub mod graph;
pub mod primitives;
pub mod remap;
pub mod storage;
pub mod types;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{
    CmpOp, CountThreshold, EdgeConstraint, EdgeId, EdgeKind, MetricConstraint, NodeId, NodeKind,
    OrPort, Position, PredicateFeature, PredicateNode, PredicateParams, ProbabilityThreshold,
    ProcqError, Quantifier, RelationEdge,
};

// =============================================================================
// RE-EXPORTS: Graph Engine
// =============================================================================

pub use catalog::{ParamSchema, leaf_kinds, schema, validate_params};
pub use compile::{CompiledQuery, compile};
pub use graph::{OrConnectors, QueryGraph};
pub use remap::{DroppedEdge, Fragment, MergeReport, merge_fragment};
pub use storage::FragmentStore;

// =============================================================================
// RE-EXPORTS: Formats (from formats module)
// =============================================================================

pub use formats::{FragmentHeader, fragment_from_bytes, fragment_to_bytes};
