//! # API Request/Response Types
//!
//! This module defines the JSON structures for the HTTP API.

use procq_core::{
    CompiledQuery, EdgeConstraint, EdgeKind, MergeReport, NodeKind, PredicateNode,
    PredicateParams, RelationEdge,
};
use serde::{Deserialize, Serialize};

// =============================================================================
// HEALTH RESPONSE
// =============================================================================

/// Health check response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

impl Default for HealthResponse {
    fn default() -> Self {
        Self {
            status: "ok".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

// =============================================================================
// GRAPH LISTING
// =============================================================================

/// One node with its derived display label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeJson {
    pub id: u64,
    pub kind: NodeKind,
    pub label: String,
    pub params: PredicateParams,
    pub x: i64,
    pub y: i64,
    pub negated: bool,
}

impl From<&PredicateNode> for NodeJson {
    fn from(node: &PredicateNode) -> Self {
        Self {
            id: node.id.0,
            kind: node.kind,
            label: format!("{}: {}", node.kind.label(), node.params.label()),
            params: node.params.clone(),
            x: node.position.x,
            y: node.position.y,
            negated: node.negated,
        }
    }
}

/// One edge with its derived display label.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeJson {
    pub id: u64,
    pub kind: EdgeKind,
    pub label: String,
    pub source: u64,
    pub target: u64,
    pub constraint: Option<EdgeConstraint>,
}

impl From<&RelationEdge> for EdgeJson {
    fn from(edge: &RelationEdge) -> Self {
        Self {
            id: edge.id.0,
            kind: edge.kind,
            label: edge.kind.label().to_string(),
            source: edge.source.0,
            target: edge.target.0,
            constraint: edge.constraint.clone(),
        }
    }
}

/// Full graph listing for the canvas collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphResponse {
    pub nodes: Vec<NodeJson>,
    pub edges: Vec<EdgeJson>,
    /// Derived views, computed on demand from the node set.
    pub object_types: Vec<String>,
    pub activities: Vec<String>,
}

// =============================================================================
// MUTATION REQUESTS/RESPONSE
// =============================================================================

/// Insert a predicate node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InsertNodeRequest {
    pub kind: NodeKind,
    #[serde(default)]
    pub params: PredicateParams,
    #[serde(default)]
    pub x: i64,
    #[serde(default)]
    pub y: i64,
}

/// Add a relation edge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AddEdgeRequest {
    pub kind: EdgeKind,
    pub source: u64,
    pub target: u64,
    #[serde(default)]
    pub constraint: Option<EdgeConstraint>,
}

/// Replace a node's parameter record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateNodeParamsRequest {
    pub params: PredicateParams,
}

/// Replace a sequencing edge's constraint record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpdateEdgeParamsRequest {
    pub constraint: EdgeConstraint,
}

/// Outcome of a single graph mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MutationResponse {
    pub success: bool,
    /// Allocated id for insert/add operations.
    pub id: Option<u64>,
    pub error: Option<String>,
}

impl MutationResponse {
    pub fn success(id: Option<u64>) -> Self {
        Self {
            success: true,
            id,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            id: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// COMPILE RESPONSE
// =============================================================================

/// Outcome of compiling the current graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompileResponse {
    pub success: bool,
    pub query: Option<CompiledQuery>,
    pub error: Option<String>,
}

impl CompileResponse {
    pub fn success(query: CompiledQuery) -> Self {
        Self {
            success: true,
            query: Some(query),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            query: None,
            error: Some(msg.into()),
        }
    }
}

// =============================================================================
// FRAGMENT REQUESTS/RESPONSES
// =============================================================================

/// Copy the whole graph, or a node selection, into the fragment store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CopyFragmentRequest {
    pub name: String,
    /// When present, only these nodes (and edges fully inside the
    /// selection) are copied.
    #[serde(default)]
    pub nodes: Option<Vec<u64>>,
}

/// Merge a stored fragment into the live graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasteFragmentRequest {
    pub name: String,
    #[serde(default)]
    pub offset_x: i64,
    #[serde(default)]
    pub offset_y: i64,
}

/// Outcome of a fragment merge, including per-edge drops.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResponse {
    pub success: bool,
    pub report: Option<MergeReport>,
    pub error: Option<String>,
}

impl MergeResponse {
    pub fn success(report: MergeReport) -> Self {
        Self {
            success: true,
            report: Some(report),
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            report: None,
            error: Some(msg.into()),
        }
    }
}

/// Names of stored fragments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FragmentListResponse {
    pub success: bool,
    pub fragments: Vec<String>,
    pub error: Option<String>,
}

impl FragmentListResponse {
    pub fn success(fragments: Vec<String>) -> Self {
        Self {
            success: true,
            fragments,
            error: None,
        }
    }

    pub fn error(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            fragments: Vec::new(),
            error: Some(msg.into()),
        }
    }
}
