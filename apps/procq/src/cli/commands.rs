//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::FragmentAction;
use crate::api::{self, AppState};
use crate::config::AppConfig;
use crate::engine::{DatasetRef, LocalEngine};
use crate::scheduler::{SchedulerConfig, SchedulerHandle};
use procq_core::{
    Fragment, FragmentStore, MergeReport, ProcqError, QueryGraph, compile, merge_fragment,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;

// =============================================================================
// FILE SIZE LIMITS
// =============================================================================

/// Maximum graph/fragment file size (16 MB), matching the binary format cap.
const MAX_GRAPH_FILE_SIZE: u64 = 16 * 1024 * 1024;

/// Validate file size before reading.
fn validate_file_size(path: &Path, max_size: u64) -> Result<(), ProcqError> {
    let metadata = std::fs::metadata(path)
        .map_err(|e| ProcqError::IoError(format!("Cannot read file metadata: {}", e)))?;

    if metadata.len() > max_size {
        return Err(ProcqError::SerializationError(format!(
            "File size {} bytes exceeds maximum allowed {} bytes",
            metadata.len(),
            max_size
        )));
    }
    Ok(())
}

/// Validate an input file path: canonicalize (resolving symlinks and "..")
/// and require a regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, ProcqError> {
    let canonical = path.canonicalize().map_err(|e| {
        ProcqError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(ProcqError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output path: the parent directory must exist.
fn validate_output_path(path: &Path) -> Result<PathBuf, ProcqError> {
    let parent = path.parent().unwrap_or(Path::new("."));

    let canonical_parent = parent.canonicalize().map_err(|e| {
        ProcqError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(ProcqError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| ProcqError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

// =============================================================================
// GRAPH FILE LOADING
// =============================================================================

/// Read a fragment-shaped graph JSON file.
fn load_fragment_file(path: &Path) -> Result<Fragment, ProcqError> {
    let validated = validate_file_path(path)?;
    validate_file_size(&validated, MAX_GRAPH_FILE_SIZE)?;

    let contents = std::fs::read(&validated)
        .map_err(|e| ProcqError::IoError(format!("Read file: {}", e)))?;
    serde_json::from_slice(&contents)
        .map_err(|e| ProcqError::SerializationError(format!("Parse graph file: {}", e)))
}

/// Restore a fragment into a fresh graph through the merge engine, so edge
/// replay runs the same validation as interactive connect gestures.
fn restore_graph(fragment: &Fragment) -> Result<(QueryGraph, MergeReport), ProcqError> {
    let mut graph = QueryGraph::new();
    let report = merge_fragment(&mut graph, fragment, 0, 0)?;
    Ok((graph, report))
}

// =============================================================================
// SERVE COMMAND
// =============================================================================

/// Start the HTTP server with the live evaluation scheduler.
pub async fn cmd_serve(
    config_path: &Path,
    store_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    graph_file: Option<&Path>,
    dataset: Option<PathBuf>,
) -> Result<(), ProcqError> {
    let config = AppConfig::load(Some(config_path))?;
    let host = host.unwrap_or_else(|| config.host.clone());
    let port = port.unwrap_or(config.port);
    let dataset_path = dataset.or_else(|| config.dataset.clone());

    // Preload a graph through the restore path when requested.
    let mut graph = QueryGraph::new();
    if let Some(path) = graph_file {
        let fragment = load_fragment_file(path)?;
        let report = merge_fragment(&mut graph, &fragment, 0, 0)?;
        for dropped in &report.dropped_edges {
            tracing::warn!("Preload dropped edge {}: {}", dropped.original.0, dropped.reason);
        }
        tracing::info!(
            "Preloaded {} nodes, {} edges from {:?}",
            report.added_nodes(),
            report.added_edges(),
            path
        );
    }

    let engine = match &dataset_path {
        Some(path) => {
            let engine = LocalEngine::from_path(path)
                .map_err(|e| ProcqError::IoError(e.to_string()))?;
            tracing::info!("Loaded event log with {} cases from {:?}", engine.case_count(), path);
            engine
        }
        None => {
            tracing::info!("No dataset configured; evaluating against an empty log");
            LocalEngine::default()
        }
    };

    let store = FragmentStore::open(store_path)?;
    let graph = Arc::new(RwLock::new(graph));
    let scheduler = SchedulerHandle::spawn(
        engine,
        Arc::clone(&graph),
        SchedulerConfig {
            debounce_ms: config.debounce_ms,
            engine_timeout_ms: config.engine_timeout_ms,
            dataset: DatasetRef(
                dataset_path
                    .map(|p| p.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            ),
        },
    );

    println!("procq server starting...");
    println!();
    println!("Configuration:");
    println!("  Host:     {}", host);
    println!("  Port:     {}", port);
    println!("  Store:    {:?}", store_path);
    println!("  Debounce: {} ms", config.debounce_ms);
    println!();
    println!("Press Ctrl+C to stop");
    println!();

    let addr = format!("{}:{}", host, port);
    let state = AppState::new(graph, store, scheduler);
    api::run_server(&addr, state).await
}

// =============================================================================
// COMPILE COMMAND
// =============================================================================

/// Compile a graph JSON file into its combinator tree.
pub fn cmd_compile(input: &Path, output: Option<&Path>) -> Result<(), ProcqError> {
    let fragment = load_fragment_file(input)?;
    let (graph, report) = restore_graph(&fragment)?;

    for dropped in &report.dropped_edges {
        eprintln!("warning: dropped edge {}: {}", dropped.original.0, dropped.reason);
    }

    let query = compile(&graph)?;
    let json = serde_json::to_string_pretty(&query)
        .map_err(|e| ProcqError::SerializationError(e.to_string()))?;

    match output {
        Some(path) => {
            let validated = validate_output_path(path)?;
            std::fs::write(&validated, json.as_bytes())
                .map_err(|e| ProcqError::IoError(format!("Write file: {}", e)))?;
            println!("Compiled tree written to {:?}", validated);
        }
        None => println!("{}", json),
    }

    Ok(())
}

// =============================================================================
// VALIDATE COMMAND
// =============================================================================

/// Check a graph JSON file against the structural rules and report what a
/// restore-then-compile would do.
pub fn cmd_validate(input: &Path) -> Result<(), ProcqError> {
    let fragment = load_fragment_file(input)?;
    let (graph, report) = restore_graph(&fragment)?;

    println!("Graph file: {:?}", input);
    println!("Nodes: {}", graph.node_count());
    println!("Edges: {}", graph.edge_count());

    if report.dropped_edges.is_empty() {
        println!("Structure: all edges admissible");
    } else {
        println!("Structure: {} edge(s) dropped", report.dropped_edges.len());
        for dropped in &report.dropped_edges {
            println!("  edge {}: {}", dropped.original.0, dropped.reason);
        }
    }

    match compile(&graph) {
        Ok(query) => {
            println!(
                "Compile: ok ({} leaves, depth {})",
                query.leaf_count(),
                query.depth()
            );
        }
        Err(e) => println!("Compile: error - {}", e),
    }

    Ok(())
}

// =============================================================================
// FRAGMENTS COMMAND
// =============================================================================

/// Manage the named fragment store.
pub fn cmd_fragments(store_path: &Path, action: FragmentAction) -> Result<(), ProcqError> {
    let store = FragmentStore::open(store_path)?;

    match action {
        FragmentAction::List => {
            let names = store.list()?;
            if names.is_empty() {
                println!("No fragments stored in {:?}", store_path);
            } else {
                for name in names {
                    println!("{}", name);
                }
            }
        }
        FragmentAction::Save { name, file } => {
            let fragment = load_fragment_file(&file)?;
            // Dry-run the restore so a structurally hopeless fragment is
            // rejected before it lands in the store.
            let (_, report) = restore_graph(&fragment)?;
            for dropped in &report.dropped_edges {
                eprintln!(
                    "warning: edge {} will be dropped on paste: {}",
                    dropped.original.0, dropped.reason
                );
            }
            store.save(&name, &fragment)?;
            println!(
                "Saved fragment '{}' ({} nodes, {} edges)",
                name,
                fragment.nodes.len(),
                fragment.edges.len()
            );
        }
        FragmentAction::Load { name, output } => {
            let fragment = store.load(&name)?;
            let json = serde_json::to_string_pretty(&fragment)
                .map_err(|e| ProcqError::SerializationError(e.to_string()))?;
            match output {
                Some(path) => {
                    let validated = validate_output_path(&path)?;
                    std::fs::write(&validated, json.as_bytes())
                        .map_err(|e| ProcqError::IoError(format!("Write file: {}", e)))?;
                    println!("Fragment '{}' written to {:?}", name, validated);
                }
                None => println!("{}", json),
            }
        }
        FragmentAction::Delete { name } => {
            store.delete(&name)?;
            println!("Deleted fragment '{}'", name);
        }
    }

    Ok(())
}
