//! # Evaluation Engine Seam
//!
//! The scheduler talks to evaluation backends through the
//! [`EvaluationEngine`] trait. The compiled query tree goes in, the
//! satisfying case indices and highlight sets come back. Engines are
//! expected to be slow and fallible; nothing they return is allowed to
//! block graph editing.

mod local;

pub use local::{Case, Event, EventLog, LocalEngine, ObjectRef, log_from_traces};

use procq_core::{CompiledQuery, EdgeId};
use serde::{Deserialize, Serialize};

// =============================================================================
// ENGINE ERRORS
// =============================================================================

/// Errors an evaluation backend can report. All of them are recoverable:
/// the scheduler keeps the previous result and raises an error indicator.
#[derive(Debug, Clone, thiserror::Error)]
pub enum EngineError {
    #[error("Dataset unavailable: {0}")]
    DatasetUnavailable(String),

    #[error("Engine failure: {0}")]
    Backend(String),

    #[error("Evaluation timed out after {0} ms")]
    Timeout(u64),
}

// =============================================================================
// DATASET REFERENCE
// =============================================================================

/// Names the dataset a query is evaluated against. The engine decides how
/// to resolve it (the local engine treats it as a display label for its
/// preloaded log; a remote engine would treat it as a server-side key).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetRef(pub String);

// =============================================================================
// EVALUATION RESULT
// =============================================================================

/// Result of one evaluation round.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvalResult {
    /// Indices of cases (in dataset order) that satisfy the query.
    pub satisfying_indices: Vec<usize>,
    /// Object ids touched by satisfied predicates, for canvas highlighting.
    pub highlight_objects: Vec<String>,
    /// Ids of sequencing edges whose combinator held in a satisfying case.
    pub highlight_edges: Vec<EdgeId>,
}

impl EvalResult {
    /// Number of satisfying cases.
    #[must_use]
    pub fn satisfying_count(&self) -> usize {
        self.satisfying_indices.len()
    }
}

// =============================================================================
// ENGINE TRAIT
// =============================================================================

/// An asynchronous evaluation backend.
///
/// Implementations must be safe to call concurrently, but the scheduler
/// guarantees at most one submission in flight per graph.
pub trait EvaluationEngine: Send + Sync + 'static {
    /// Evaluate a compiled query against a dataset.
    fn evaluate(
        &self,
        query: &CompiledQuery,
        dataset: &DatasetRef,
    ) -> impl Future<Output = Result<EvalResult, EngineError>> + Send;
}
