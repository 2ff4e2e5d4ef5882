//! # Live Evaluation Scheduler
//!
//! One tokio task owns the evaluate loop. Graph mutations bump an atomic
//! generation counter and wake the task; the task debounces, compiles a
//! snapshot, submits it to the engine under a defensive timeout, and
//! publishes the outcome through a watch channel.
//!
//! Guarantees:
//! - At most one engine submission is in flight per graph.
//! - A response whose generation no longer matches is discarded and the
//!   loop re-runs against the current graph (no engine-side cancellation).
//! - Compile errors and engine errors/timeouts are published as error
//!   indicators; the previous successful result is retained. Nothing here
//!   is fatal and the graph stays editable throughout.

use crate::engine::{DatasetRef, EngineError, EvalResult, EvaluationEngine};
use procq_core::{QueryGraph, compile};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::{Notify, RwLock, watch};

// =============================================================================
// SCHEDULER CONFIGURATION
// =============================================================================

/// Timing knobs and dataset for the evaluate loop.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Debounce window after the last edit before a round starts.
    pub debounce_ms: u64,
    /// Defensive timeout per engine submission.
    pub engine_timeout_ms: u64,
    /// Dataset every submission is evaluated against.
    pub dataset: DatasetRef,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 250,
            engine_timeout_ms: 30_000,
            dataset: DatasetRef::default(),
        }
    }
}

// =============================================================================
// PUBLISHED STATE
// =============================================================================

/// Snapshot of the scheduler's bound state, replaced atomically as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct EvalState {
    /// Graph generation this state reflects.
    pub generation: u64,
    /// Last successful evaluation result, retained across engine errors.
    pub result: Option<EvalResult>,
    /// Current error indicator (compile error, engine error, or timeout).
    pub error: Option<String>,
}

// =============================================================================
// SCHEDULER HANDLE
// =============================================================================

/// Cheap, cloneable handle to a running scheduler task.
#[derive(Debug, Clone)]
pub struct SchedulerHandle {
    generation: Arc<AtomicU64>,
    notify: Arc<Notify>,
    state_rx: watch::Receiver<EvalState>,
}

impl SchedulerHandle {
    /// Spawn the evaluate loop over a shared graph.
    pub fn spawn<E: EvaluationEngine>(
        engine: E,
        graph: Arc<RwLock<QueryGraph>>,
        config: SchedulerConfig,
    ) -> Self {
        let generation = Arc::new(AtomicU64::new(0));
        let notify = Arc::new(Notify::new());
        let (state_tx, state_rx) = watch::channel(EvalState::default());

        tokio::spawn(run_loop(
            engine,
            graph,
            config,
            Arc::clone(&generation),
            Arc::clone(&notify),
            state_tx,
        ));

        Self {
            generation,
            notify,
            state_rx,
        }
    }

    /// Record a graph mutation: bump the generation and wake the loop.
    pub fn mark_dirty(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.notify.notify_one();
    }

    /// Current generation counter.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }

    /// Latest published state.
    #[must_use]
    pub fn state(&self) -> EvalState {
        self.state_rx.borrow().clone()
    }

    /// Subscribe to state changes (used by tests to await publications).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<EvalState> {
        self.state_rx.clone()
    }
}

// =============================================================================
// EVALUATE LOOP
// =============================================================================

async fn run_loop<E: EvaluationEngine>(
    engine: E,
    graph: Arc<RwLock<QueryGraph>>,
    config: SchedulerConfig,
    generation: Arc<AtomicU64>,
    notify: Arc<Notify>,
    state_tx: watch::Sender<EvalState>,
) {
    let mut last_ok: Option<EvalResult> = None;
    let mut last_done: Option<u64> = None;

    loop {
        notify.notified().await;

        // Debounce: restart the window as long as edits keep arriving.
        let mut seen = generation.load(Ordering::SeqCst);
        loop {
            tokio::time::sleep(Duration::from_millis(config.debounce_ms)).await;
            let now = generation.load(Ordering::SeqCst);
            if now == seen {
                break;
            }
            seen = now;
        }

        // A wakeup permit stored during the previous round can wake the
        // loop for a generation it already handled.
        if last_done == Some(seen) {
            continue;
        }

        // Compile a snapshot; the graph lock is held only for the clone.
        let snapshot = graph.read().await.clone();
        let compiled = match compile(&snapshot) {
            Ok(c) => c,
            Err(e) => {
                tracing::debug!(generation = seen, "Compile failed: {}", e);
                last_done = Some(seen);
                publish(&state_tx, seen, last_ok.clone(), Some(e.to_string()));
                continue;
            }
        };

        tracing::debug!(generation = seen, "Submitting evaluation");
        let outcome = tokio::time::timeout(
            Duration::from_millis(config.engine_timeout_ms),
            engine.evaluate(&compiled, &config.dataset),
        )
        .await;

        // Staleness check: if the graph moved while the engine ran, the
        // response describes an old graph. Discard it; the mark_dirty that
        // moved the generation already left a wakeup permit, so the loop
        // re-runs immediately.
        let current = generation.load(Ordering::SeqCst);
        if current != seen {
            tracing::debug!(
                submitted = seen,
                current = current,
                "Discarding stale evaluation response"
            );
            continue;
        }
        last_done = Some(seen);

        match outcome {
            Ok(Ok(result)) => {
                tracing::debug!(
                    generation = seen,
                    satisfying = result.satisfying_count(),
                    "Evaluation complete"
                );
                last_ok = Some(result);
                publish(&state_tx, seen, last_ok.clone(), None);
            }
            Ok(Err(e)) => {
                tracing::warn!(generation = seen, "Engine error: {}", e);
                publish(&state_tx, seen, last_ok.clone(), Some(e.to_string()));
            }
            Err(_elapsed) => {
                let err = EngineError::Timeout(config.engine_timeout_ms);
                tracing::warn!(generation = seen, "{}", err);
                publish(&state_tx, seen, last_ok.clone(), Some(err.to_string()));
            }
        }
    }
}

/// Replace the bound state atomically. Send only fails when every receiver
/// is gone, which means the owning server is shutting down.
fn publish(
    state_tx: &watch::Sender<EvalState>,
    generation: u64,
    result: Option<EvalResult>,
    error: Option<String>,
) {
    let _ = state_tx.send(EvalState {
        generation,
        result,
        error,
    });
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::panic)]
mod tests {
    use super::*;
    use crate::engine::{LocalEngine, log_from_traces};
    use procq_core::{EdgeKind, NodeKind, Position, PredicateParams};
    use std::sync::atomic::AtomicUsize;

    fn activity_params(name: &str) -> PredicateParams {
        PredicateParams {
            activities: vec![name.to_string()],
            ..PredicateParams::default()
        }
    }

    /// Wait until a state with `generation >= want` is published.
    async fn wait_for_generation(
        rx: &mut watch::Receiver<EvalState>,
        want: u64,
    ) -> EvalState {
        loop {
            {
                let state = rx.borrow();
                if state.generation >= want {
                    return state.clone();
                }
            }
            rx.changed().await.unwrap();
        }
    }

    #[tokio::test]
    async fn edit_triggers_evaluation() {
        let log = log_from_traces(&[&["pack", "ship"], &["receive"]]);
        let graph = Arc::new(RwLock::new(QueryGraph::new()));
        let handle = SchedulerHandle::spawn(
            LocalEngine::new(log),
            Arc::clone(&graph),
            SchedulerConfig {
                debounce_ms: 10,
                ..SchedulerConfig::default()
            },
        );
        let mut rx = handle.subscribe();

        graph
            .write()
            .await
            .insert_node(NodeKind::Activity, activity_params("ship"), Position::default())
            .unwrap();
        handle.mark_dirty();

        let state = wait_for_generation(&mut rx, 1).await;
        assert!(state.error.is_none());
        assert_eq!(state.result.unwrap().satisfying_indices, vec![0]);
    }

    #[tokio::test]
    async fn incomplete_or_publishes_error_and_keeps_result() {
        let log = log_from_traces(&[&["pack"]]);
        let graph = Arc::new(RwLock::new(QueryGraph::new()));
        let handle = SchedulerHandle::spawn(
            LocalEngine::new(log),
            Arc::clone(&graph),
            SchedulerConfig {
                debounce_ms: 10,
                ..SchedulerConfig::default()
            },
        );
        let mut rx = handle.subscribe();

        let leaf = graph
            .write()
            .await
            .insert_node(NodeKind::Activity, activity_params("pack"), Position::default())
            .unwrap();
        handle.mark_dirty();
        let ok_state = wait_for_generation(&mut rx, 1).await;
        assert!(ok_state.error.is_none());

        // Attach a lone Or-node with only one fan branch.
        {
            let mut g = graph.write().await;
            let or = g
                .insert_node(
                    NodeKind::SingleOr,
                    PredicateParams::default(),
                    Position::default(),
                )
                .unwrap();
            g.add_edge(EdgeKind::OrConnector, or, leaf, None).unwrap();
        }
        handle.mark_dirty();

        let state = wait_for_generation(&mut rx, 2).await;
        assert!(state.error.is_some(), "compile error must be published");
        assert!(
            state.result.is_some(),
            "previous successful result must be retained"
        );
    }

    /// Engine that delays, counts calls, and can be scripted to fail.
    struct ScriptedEngine {
        delay: Duration,
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    impl EvaluationEngine for ScriptedEngine {
        async fn evaluate(
            &self,
            _query: &procq_core::CompiledQuery,
            _dataset: &DatasetRef,
        ) -> Result<EvalResult, EngineError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.fail {
                Err(EngineError::Backend("scripted failure".to_string()))
            } else {
                Ok(EvalResult {
                    satisfying_indices: vec![0],
                    ..EvalResult::default()
                })
            }
        }
    }

    #[tokio::test]
    async fn stale_response_is_discarded_and_loop_reruns() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = Arc::new(RwLock::new(QueryGraph::new()));
        let handle = SchedulerHandle::spawn(
            ScriptedEngine {
                delay: Duration::from_millis(100),
                calls: Arc::clone(&calls),
                fail: false,
            },
            Arc::clone(&graph),
            SchedulerConfig {
                debounce_ms: 10,
                ..SchedulerConfig::default()
            },
        );
        let mut rx = handle.subscribe();

        graph
            .write()
            .await
            .insert_node(NodeKind::Activity, activity_params("a"), Position::default())
            .unwrap();
        handle.mark_dirty();

        // Edit again while the first submission is in flight.
        tokio::time::sleep(Duration::from_millis(50)).await;
        graph
            .write()
            .await
            .insert_node(NodeKind::Activity, activity_params("b"), Position::default())
            .unwrap();
        handle.mark_dirty();

        let state = wait_for_generation(&mut rx, 2).await;
        // The generation-1 response was stale; only generation 2 lands.
        assert_eq!(state.generation, 2);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn debounce_coalesces_rapid_edits() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = Arc::new(RwLock::new(QueryGraph::new()));
        let handle = SchedulerHandle::spawn(
            ScriptedEngine {
                delay: Duration::from_millis(1),
                calls: Arc::clone(&calls),
                fail: false,
            },
            Arc::clone(&graph),
            SchedulerConfig {
                debounce_ms: 50,
                ..SchedulerConfig::default()
            },
        );
        let mut rx = handle.subscribe();

        for name in ["a", "b", "c", "d"] {
            graph
                .write()
                .await
                .insert_node(NodeKind::Activity, activity_params(name), Position::default())
                .unwrap();
            handle.mark_dirty();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let state = wait_for_generation(&mut rx, 4).await;
        assert_eq!(state.generation, 4);
        // All four edits land inside one debounce window.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn engine_error_is_reported() {
        let calls = Arc::new(AtomicUsize::new(0));
        let graph = Arc::new(RwLock::new(QueryGraph::new()));

        // First a succeeding engine to seed a result.
        let log = log_from_traces(&[&["pack"]]);
        let handle = SchedulerHandle::spawn(
            LocalEngine::new(log),
            Arc::clone(&graph),
            SchedulerConfig {
                debounce_ms: 10,
                ..SchedulerConfig::default()
            },
        );
        let mut rx = handle.subscribe();
        graph
            .write()
            .await
            .insert_node(NodeKind::Activity, activity_params("pack"), Position::default())
            .unwrap();
        handle.mark_dirty();
        let seeded = wait_for_generation(&mut rx, 1).await;
        assert!(seeded.result.is_some());

        // Then a failing engine over the same graph.
        let failing = SchedulerHandle::spawn(
            ScriptedEngine {
                delay: Duration::from_millis(1),
                calls,
                fail: true,
            },
            Arc::clone(&graph),
            SchedulerConfig {
                debounce_ms: 10,
                ..SchedulerConfig::default()
            },
        );
        let mut failing_rx = failing.subscribe();
        failing.mark_dirty();
        let state = wait_for_generation(&mut failing_rx, 1).await;
        assert!(state.error.is_some());
        assert!(state.result.is_none(), "fresh scheduler has no prior result");
    }

    #[tokio::test]
    async fn timeout_is_reported_as_error() {
        let graph = Arc::new(RwLock::new(QueryGraph::new()));
        let handle = SchedulerHandle::spawn(
            ScriptedEngine {
                delay: Duration::from_millis(200),
                calls: Arc::new(AtomicUsize::new(0)),
                fail: false,
            },
            Arc::clone(&graph),
            SchedulerConfig {
                debounce_ms: 10,
                engine_timeout_ms: 20,
                ..SchedulerConfig::default()
            },
        );
        let mut rx = handle.subscribe();

        handle.mark_dirty();
        let state = wait_for_generation(&mut rx, 1).await;
        assert!(state.error.as_deref().unwrap_or("").contains("timed out"));
    }
}
