//! # API Endpoint Handlers
//!
//! This module implements the actual HTTP endpoint handlers.
//!
//! Structural validation errors come back as 422 with the error string and
//! leave the graph unchanged; missing entities are 404; storage failures
//! are 500. Every successful mutation wakes the evaluation scheduler.

use super::{
    AppState,
    types::{
        AddEdgeRequest, CompileResponse, CopyFragmentRequest, EdgeJson, FragmentListResponse,
        GraphResponse, HealthResponse, InsertNodeRequest, MergeResponse, MutationResponse,
        NodeJson, PasteFragmentRequest, UpdateEdgeParamsRequest, UpdateNodeParamsRequest,
    },
};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use procq_core::{EdgeId, Fragment, NodeId, Position, ProcqError, compile, merge_fragment};
use std::collections::BTreeSet;

/// Map a core error to the HTTP status of its category.
fn error_status(error: &ProcqError) -> StatusCode {
    match error {
        ProcqError::NodeNotFound(_)
        | ProcqError::EdgeNotFound(_)
        | ProcqError::FragmentNotFound(_) => StatusCode::NOT_FOUND,
        ProcqError::IoError(_) | ProcqError::SerializationError(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        _ => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

// =============================================================================
// HEALTH HANDLER
// =============================================================================

/// Health check endpoint.
pub async fn health_handler() -> impl IntoResponse {
    Json(HealthResponse::default())
}

// =============================================================================
// GRAPH LISTING
// =============================================================================

/// List the graph with derived display labels and views.
pub async fn graph_handler(State(state): State<AppState>) -> impl IntoResponse {
    let graph = state.graph.read().await;

    let response = GraphResponse {
        nodes: graph.nodes().map(NodeJson::from).collect(),
        edges: graph.edges().map(EdgeJson::from).collect(),
        object_types: graph.used_object_types().into_iter().collect(),
        activities: graph.used_activities().into_iter().collect(),
    };

    (StatusCode::OK, Json(response))
}

// =============================================================================
// NODE MUTATIONS
// =============================================================================

/// Insert a predicate node.
pub async fn insert_node_handler(
    State(state): State<AppState>,
    Json(request): Json<InsertNodeRequest>,
) -> impl IntoResponse {
    let mut graph = state.graph.write().await;
    match graph.insert_node(request.kind, request.params, Position::new(request.x, request.y)) {
        Ok(id) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MutationResponse::success(Some(id.0))))
        }
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

/// Remove a node, cascading to its incident edges.
pub async fn remove_node_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let mut graph = state.graph.write().await;
    match graph.remove_node(NodeId(id)) {
        Ok(()) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MutationResponse::success(None)))
        }
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

/// Replace a node's parameter record.
pub async fn update_node_params_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateNodeParamsRequest>,
) -> impl IntoResponse {
    let mut graph = state.graph.write().await;
    match graph.update_node_params(NodeId(id), request.params) {
        Ok(()) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MutationResponse::success(None)))
        }
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

/// Toggle an Or-node between split and join roles.
pub async fn toggle_or_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let mut graph = state.graph.write().await;
    match graph.toggle_or_role(NodeId(id)) {
        Ok(_new_kind) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MutationResponse::success(Some(id))))
        }
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

// =============================================================================
// EDGE MUTATIONS
// =============================================================================

/// Add a relation edge from a connect gesture.
pub async fn add_edge_handler(
    State(state): State<AppState>,
    Json(request): Json<AddEdgeRequest>,
) -> impl IntoResponse {
    let mut graph = state.graph.write().await;
    match graph.add_edge(
        request.kind,
        NodeId(request.source),
        NodeId(request.target),
        request.constraint,
    ) {
        Ok(id) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MutationResponse::success(Some(id.0))))
        }
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

/// Remove an edge.
pub async fn remove_edge_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
) -> impl IntoResponse {
    let mut graph = state.graph.write().await;
    match graph.remove_edge(EdgeId(id)) {
        Ok(()) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MutationResponse::success(None)))
        }
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

/// Replace a sequencing edge's constraint record.
pub async fn update_edge_params_handler(
    State(state): State<AppState>,
    Path(id): Path<u64>,
    Json(request): Json<UpdateEdgeParamsRequest>,
) -> impl IntoResponse {
    let mut graph = state.graph.write().await;
    match graph.update_edge_params(EdgeId(id), request.constraint) {
        Ok(()) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MutationResponse::success(None)))
        }
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

// =============================================================================
// COMPILE HANDLER
// =============================================================================

/// Compile the current graph into its nested combinator tree.
pub async fn compile_handler(State(state): State<AppState>) -> impl IntoResponse {
    let graph = state.graph.read().await;
    match compile(&graph) {
        Ok(query) => (StatusCode::OK, Json(CompileResponse::success(query))),
        Err(e) => (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(CompileResponse::error(e.to_string())),
        ),
    }
}

// =============================================================================
// FRAGMENT HANDLERS
// =============================================================================

/// Copy the graph (or a node selection) into the fragment store.
pub async fn copy_fragment_handler(
    State(state): State<AppState>,
    Json(request): Json<CopyFragmentRequest>,
) -> impl IntoResponse {
    let graph = state.graph.read().await;
    let fragment = match &request.nodes {
        Some(ids) => {
            let selection: BTreeSet<NodeId> = ids.iter().map(|id| NodeId(*id)).collect();
            Fragment::from_selection(&graph, &selection)
        }
        None => Fragment::from_graph(&graph),
    };
    drop(graph);

    match state.store.save(&request.name, &fragment) {
        Ok(()) => (StatusCode::OK, Json(MutationResponse::success(None))),
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

/// Merge a stored fragment into the live graph. An empty live graph makes
/// this a restore (original ids preserved); otherwise a collision-free
/// paste with fresh ids.
pub async fn paste_fragment_handler(
    State(state): State<AppState>,
    Json(request): Json<PasteFragmentRequest>,
) -> impl IntoResponse {
    let fragment = match state.store.load(&request.name) {
        Ok(f) => f,
        Err(e) => {
            return (error_status(&e), Json(MergeResponse::error(e.to_string())));
        }
    };

    let mut graph = state.graph.write().await;
    match merge_fragment(&mut graph, &fragment, request.offset_x, request.offset_y) {
        Ok(report) => {
            drop(graph);
            state.scheduler.mark_dirty();
            (StatusCode::OK, Json(MergeResponse::success(report)))
        }
        Err(e) => (error_status(&e), Json(MergeResponse::error(e.to_string()))),
    }
}

/// List stored fragment names.
pub async fn list_fragments_handler(State(state): State<AppState>) -> impl IntoResponse {
    match state.store.list() {
        Ok(names) => (StatusCode::OK, Json(FragmentListResponse::success(names))),
        Err(e) => (
            error_status(&e),
            Json(FragmentListResponse::error(e.to_string())),
        ),
    }
}

/// Delete a stored fragment.
pub async fn delete_fragment_handler(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> impl IntoResponse {
    match state.store.delete(&name) {
        Ok(()) => (StatusCode::OK, Json(MutationResponse::success(None))),
        Err(e) => (error_status(&e), Json(MutationResponse::error(e.to_string()))),
    }
}

// =============================================================================
// EVALUATION STATE HANDLER
// =============================================================================

/// Current evaluation state: last successful result plus error indicator.
pub async fn eval_handler(State(state): State<AppState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.scheduler.state()))
}
