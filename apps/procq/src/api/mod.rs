//! # procq HTTP API Module
//!
//! This module implements the HTTP REST API server using axum.
//!
//! ## Endpoints
//!
//! - `GET  /health` - Health check
//! - `GET  /graph` - Graph listing with display labels
//! - `POST /node` - Insert a predicate node
//! - `DELETE /node/{id}` - Remove a node (cascades to incident edges)
//! - `PUT  /node/{id}/params` - Replace node params
//! - `POST /node/{id}/toggle-or` - Toggle Or split/join role
//! - `POST /edge` - Add a relation edge
//! - `DELETE /edge/{id}` - Remove an edge
//! - `PUT  /edge/{id}/params` - Replace edge constraint
//! - `GET  /compile` - Compile the graph into a combinator tree
//! - `POST /fragment/copy` - Copy graph/selection into the fragment store
//! - `POST /fragment/paste` - Merge a stored fragment into the graph
//! - `GET  /fragments` - List stored fragments
//! - `DELETE /fragment/{name}` - Delete a stored fragment
//! - `GET  /eval` - Current evaluation state
//!
//! ## Configuration (Environment Variables)
//!
//! - `PROCQ_CORS_ORIGINS`: Comma-separated list of allowed origins, or "*"
//!   for all (default: localhost only)

mod handlers;
mod types;

// Re-export handlers and types for integration tests (via `procq::api::*`)
#[allow(unused_imports)]
pub use handlers::{
    add_edge_handler, compile_handler, copy_fragment_handler, delete_fragment_handler,
    eval_handler, graph_handler, health_handler, insert_node_handler, list_fragments_handler,
    paste_fragment_handler, remove_edge_handler, remove_node_handler, toggle_or_handler,
    update_edge_params_handler, update_node_params_handler,
};
#[allow(unused_imports)]
pub use types::{
    AddEdgeRequest, CompileResponse, CopyFragmentRequest, EdgeJson, FragmentListResponse,
    GraphResponse, HealthResponse, InsertNodeRequest, MergeResponse, MutationResponse, NodeJson,
    PasteFragmentRequest, UpdateEdgeParamsRequest, UpdateNodeParamsRequest,
};

use crate::scheduler::SchedulerHandle;
use axum::{
    Router,
    http::{HeaderValue, Method, header},
    routing::{delete, get, post, put},
};
use procq_core::{FragmentStore, ProcqError, QueryGraph};
use std::sync::Arc;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

// =============================================================================
// SERVER STATE
// =============================================================================

/// Shared server state: the live graph, the fragment store, and a handle
/// to the evaluation scheduler.
#[derive(Clone)]
pub struct AppState {
    /// The live query graph.
    pub graph: Arc<RwLock<QueryGraph>>,
    /// Named fragment persistence.
    pub store: Arc<FragmentStore>,
    /// Handle used to wake the evaluate loop after mutations.
    pub scheduler: SchedulerHandle,
}

impl AppState {
    /// Create new app state around an already-shared graph.
    #[must_use]
    pub fn new(
        graph: Arc<RwLock<QueryGraph>>,
        store: FragmentStore,
        scheduler: SchedulerHandle,
    ) -> Self {
        Self {
            graph,
            store: Arc::new(store),
            scheduler,
        }
    }
}

// =============================================================================
// CORS CONFIGURATION
// =============================================================================

/// Build CORS layer from environment configuration.
///
/// Reads `PROCQ_CORS_ORIGINS`:
/// - If "*": allows all origins (development mode - use with caution!)
/// - If not set: defaults to localhost only (restrictive default)
/// - Otherwise: parses comma-separated list of allowed origins
fn build_cors_layer() -> CorsLayer {
    let origins_env = std::env::var("PROCQ_CORS_ORIGINS").ok();

    match origins_env.as_deref() {
        Some("*") => {
            tracing::warn!(
                "CORS: Allowing ALL origins (PROCQ_CORS_ORIGINS=*). This is insecure for production!"
            );
            CorsLayer::permissive()
        }
        Some(origins) => {
            let allowed_origins: Vec<HeaderValue> = origins
                .split(',')
                .filter_map(|s| {
                    let trimmed = s.trim();
                    match trimmed.parse::<HeaderValue>() {
                        Ok(hv) => {
                            tracing::info!("CORS: Allowing origin: {}", trimmed);
                            Some(hv)
                        }
                        Err(e) => {
                            tracing::warn!("CORS: Invalid origin '{}': {}", trimmed, e);
                            None
                        }
                    }
                })
                .collect();

            if allowed_origins.is_empty() {
                tracing::warn!(
                    "CORS: No valid origins in PROCQ_CORS_ORIGINS, defaulting to localhost only"
                );
                build_localhost_cors()
            } else {
                CorsLayer::new()
                    .allow_origin(allowed_origins)
                    .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
                    .allow_headers([header::CONTENT_TYPE])
            }
        }
        None => {
            tracing::info!("CORS: No PROCQ_CORS_ORIGINS set, defaulting to localhost only");
            build_localhost_cors()
        }
    }
}

/// Build a restrictive CORS layer that only allows localhost origins.
fn build_localhost_cors() -> CorsLayer {
    let localhost_origins = vec![
        "http://localhost:3000".parse::<HeaderValue>().ok(),
        "http://localhost:8080".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:3000".parse::<HeaderValue>().ok(),
        "http://127.0.0.1:8080".parse::<HeaderValue>().ok(),
    ];
    let origins: Vec<HeaderValue> = localhost_origins.into_iter().flatten().collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE])
}

// =============================================================================
// ROUTER CREATION
// =============================================================================

/// Create the axum router with all endpoints and middleware.
///
/// Middleware stack (outer to inner):
/// 1. Tracing - logs all requests
/// 2. CORS - handles preflight requests
/// 3. Body limit - caps request payloads at 2 MB
pub fn create_router(state: AppState) -> Router {
    let cors = build_cors_layer();

    Router::new()
        .route("/health", get(handlers::health_handler))
        .route("/graph", get(handlers::graph_handler))
        .route("/node", post(handlers::insert_node_handler))
        .route("/node/{id}", delete(handlers::remove_node_handler))
        .route("/node/{id}/params", put(handlers::update_node_params_handler))
        .route("/node/{id}/toggle-or", post(handlers::toggle_or_handler))
        .route("/edge", post(handlers::add_edge_handler))
        .route("/edge/{id}", delete(handlers::remove_edge_handler))
        .route("/edge/{id}/params", put(handlers::update_edge_params_handler))
        .route("/compile", get(handlers::compile_handler))
        .route("/fragment/copy", post(handlers::copy_fragment_handler))
        .route("/fragment/paste", post(handlers::paste_fragment_handler))
        .route("/fragments", get(handlers::list_fragments_handler))
        .route("/fragment/{name}", delete(handlers::delete_fragment_handler))
        .route("/eval", get(handlers::eval_handler))
        .layer(axum::extract::DefaultBodyLimit::max(2 * 1024 * 1024))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// SERVER STARTUP
// =============================================================================

/// Start the HTTP server.
pub async fn run_server(addr: &str, state: AppState) -> Result<(), ProcqError> {
    let router = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| ProcqError::IoError(format!("Bind failed: {}", e)))?;

    tracing::info!("procq HTTP server listening on {}", addr);

    axum::serve(listener, router)
        .await
        .map_err(|e| ProcqError::IoError(format!("Server error: {}", e)))
}
