//! # Local Reference Engine
//!
//! A reference [`EvaluationEngine`] over a JSON event log, so the binary
//! is usable end to end without a remote backend. Cases are sequences of
//! events carrying an activity name, object references, and optional
//! integer metrics. All comparisons are integer-only, matching the core.
//!
//! The local semantics are deliberately simple: a `Follows` combinator is
//! witnessed by event pairs whose endpoints match the operand subtrees
//! anchored to single events. Nested chains therefore evaluate
//! conservatively; a remote process-mining backend is expected to refine
//! this.

use super::{DatasetRef, EngineError, EvalResult, EvaluationEngine};
use procq_core::{CompiledQuery, EdgeConstraint, EdgeId, EdgeKind, NodeKind};
use procq_core::{PredicateFeature, PredicateParams, Quantifier};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

// =============================================================================
// EVENT LOG MODEL
// =============================================================================

/// An object touched by an event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectRef {
    pub id: String,
    pub object_type: String,
}

/// One event in a case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub activity: String,
    #[serde(default)]
    pub objects: Vec<ObjectRef>,
    #[serde(default)]
    pub metrics: BTreeMap<String, i64>,
}

/// One case: an ordered sequence of events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Case {
    pub id: String,
    pub events: Vec<Event>,
}

/// The whole dataset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventLog {
    pub cases: Vec<Case>,
}

// =============================================================================
// LOCAL ENGINE
// =============================================================================

/// In-process evaluator over a preloaded [`EventLog`].
#[derive(Debug, Clone, Default)]
pub struct LocalEngine {
    log: EventLog,
}

impl LocalEngine {
    /// Wrap an already-loaded event log.
    #[must_use]
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }

    /// Load a JSON event log from disk.
    pub fn from_path(path: &Path) -> Result<Self, EngineError> {
        let contents = std::fs::read(path).map_err(|e| {
            EngineError::DatasetUnavailable(format!("{}: {}", path.display(), e))
        })?;
        let log: EventLog = serde_json::from_slice(&contents)
            .map_err(|e| EngineError::DatasetUnavailable(format!("{}: {}", path.display(), e)))?;
        Ok(Self::new(log))
    }

    /// Number of cases in the loaded log.
    #[must_use]
    pub fn case_count(&self) -> usize {
        self.log.cases.len()
    }
}

impl EvaluationEngine for LocalEngine {
    async fn evaluate(
        &self,
        query: &CompiledQuery,
        _dataset: &DatasetRef,
    ) -> Result<EvalResult, EngineError> {
        let mut satisfying = Vec::new();
        let mut objects = BTreeSet::new();
        let mut edges = BTreeSet::new();

        for (index, case) in self.log.cases.iter().enumerate() {
            if case_satisfies(query, case) {
                satisfying.push(index);
                collect_highlights(query, case, &mut objects, &mut edges);
            }
        }

        Ok(EvalResult {
            satisfying_indices: satisfying,
            highlight_objects: objects.into_iter().collect(),
            highlight_edges: edges.into_iter().collect(),
        })
    }
}

// =============================================================================
// CASE-LEVEL EVALUATION
// =============================================================================

/// Does this case satisfy the query tree?
fn case_satisfies(query: &CompiledQuery, case: &Case) -> bool {
    match query {
        CompiledQuery::Leaf { kind, params, .. } => leaf_satisfies(*kind, params, case),
        CompiledQuery::Not(inner) => !case_satisfies(inner, case),
        CompiledQuery::And(branches) => branches.iter().all(|b| case_satisfies(b, case)),
        CompiledQuery::Or(branches) => branches.iter().any(|b| case_satisfies(b, case)),
        CompiledQuery::Follows {
            kind,
            constraint,
            lhs,
            rhs,
            ..
        } => follows_satisfies(*kind, constraint, lhs, rhs, case),
    }
}

/// Leaf predicate against a whole case: match events, apply the feature
/// (membership / containment / start / end), then the thresholds.
fn leaf_satisfies(kind: NodeKind, params: &PredicateParams, case: &Case) -> bool {
    let matched: Vec<&Event> = case
        .events
        .iter()
        .filter(|e| event_matches_leaf(kind, params, e))
        .collect();

    let base = match params.feature {
        PredicateFeature::Start => case
            .events
            .first()
            .is_some_and(|e| event_matches_leaf(kind, params, e)),
        PredicateFeature::End => case
            .events
            .last()
            .is_some_and(|e| event_matches_leaf(kind, params, e)),
        PredicateFeature::Membership | PredicateFeature::Containment => match params.quantifier {
            Quantifier::All if kind == NodeKind::Activity => params
                .activities
                .iter()
                .all(|a| case.events.iter().any(|e| &e.activity == a)),
            _ => !matched.is_empty(),
        },
    };

    base && thresholds_hold(
        params.count.as_ref(),
        params.probability.as_ref(),
        matched.len() as u64,
        case.events.len() as u64,
    ) && metric_holds(params, &matched)
}

/// Check count/probability thresholds against measured and total counts.
fn thresholds_hold(
    count: Option<&procq_core::CountThreshold>,
    probability: Option<&procq_core::ProbabilityThreshold>,
    measured: u64,
    total: u64,
) -> bool {
    count.is_none_or(|c| c.holds(measured))
        && probability.is_none_or(|p| p.holds_ratio(measured, total))
}

/// A metric constraint holds when some matching event carries the metric
/// with a satisfying value.
fn metric_holds(params: &PredicateParams, matched: &[&Event]) -> bool {
    let Some(mc) = &params.metric else {
        return true;
    };
    matched
        .iter()
        .any(|e| e.metrics.get(&mc.metric).is_some_and(|v| mc.op.holds(*v, mc.value)))
}

/// Follows combinator: count witness pairs whose endpoints match the
/// operand subtrees anchored to single events.
fn follows_satisfies(
    kind: EdgeKind,
    constraint: &EdgeConstraint,
    lhs: &CompiledQuery,
    rhs: &CompiledQuery,
    case: &Case,
) -> bool {
    let witnesses = count_witnesses(kind, lhs, rhs, case);

    witnesses.0 > 0
        && constraint.count.is_none_or(|c| c.holds(witnesses.0))
        && constraint
            .probability
            .is_none_or(|p| p.holds_ratio(witnesses.0, case.events.len() as u64))
        && constraint.metric.as_ref().is_none_or(|mc| {
            witnesses.1.iter().any(|&(_, j)| {
                case.events[j]
                    .metrics
                    .get(&mc.metric)
                    .is_some_and(|v| mc.op.holds(*v, mc.value))
            })
        })
}

/// Witness pairs for a Follows combinator: `(count, pairs)`.
fn count_witnesses(
    kind: EdgeKind,
    lhs: &CompiledQuery,
    rhs: &CompiledQuery,
    case: &Case,
) -> (u64, Vec<(usize, usize)>) {
    let mut pairs = Vec::new();
    for (i, ei) in case.events.iter().enumerate() {
        if !event_matches(lhs, ei) {
            continue;
        }
        match kind {
            EdgeKind::DirectlyFollows => {
                if case.events.get(i + 1).is_some_and(|ej| event_matches(rhs, ej)) {
                    pairs.push((i, i + 1));
                }
            }
            EdgeKind::EventuallyFollows => {
                for (j, ej) in case.events.iter().enumerate().skip(i + 1) {
                    if event_matches(rhs, ej) {
                        pairs.push((i, j));
                    }
                }
            }
            EdgeKind::OrConnector => {}
        }
    }
    (pairs.len() as u64, pairs)
}

// =============================================================================
// EVENT-LEVEL ANCHORING
// =============================================================================

/// Anchor an operand subtree to a single event. A nested `Follows` cannot
/// anchor to one event, so it contributes `false` here.
fn event_matches(query: &CompiledQuery, event: &Event) -> bool {
    match query {
        CompiledQuery::Leaf { kind, params, .. } => event_matches_leaf(*kind, params, event),
        CompiledQuery::Not(inner) => !event_matches(inner, event),
        CompiledQuery::And(branches) => branches.iter().all(|b| event_matches(b, event)),
        CompiledQuery::Or(branches) => branches.iter().any(|b| event_matches(b, event)),
        CompiledQuery::Follows { .. } => false,
    }
}

/// Does one event match a leaf predicate's selection criteria?
fn event_matches_leaf(kind: NodeKind, params: &PredicateParams, event: &Event) -> bool {
    match kind {
        NodeKind::Activity => {
            params.activities.is_empty() || params.activities.contains(&event.activity)
        }
        NodeKind::Object | NodeKind::ObjectType => event
            .objects
            .iter()
            .any(|o| params.object_type.as_ref().is_some_and(|t| &o.object_type == t)),
        NodeKind::OrSplit | NodeKind::OrJoin | NodeKind::SingleOr => false,
    }
}

// =============================================================================
// HIGHLIGHT COLLECTION
// =============================================================================

/// Collect highlight objects and edges from the satisfied parts of the
/// tree for one satisfying case. A satisfied `Not` highlights nothing:
/// its evidence is an absence.
fn collect_highlights(
    query: &CompiledQuery,
    case: &Case,
    objects: &mut BTreeSet<String>,
    edges: &mut BTreeSet<EdgeId>,
) {
    match query {
        CompiledQuery::Leaf { kind, params, .. } => {
            for event in case.events.iter().filter(|e| event_matches_leaf(*kind, params, e)) {
                for obj in &event.objects {
                    objects.insert(obj.id.clone());
                }
            }
        }
        CompiledQuery::Not(_) => {}
        CompiledQuery::And(branches) | CompiledQuery::Or(branches) => {
            for branch in branches {
                if case_satisfies(branch, case) {
                    collect_highlights(branch, case, objects, edges);
                }
            }
        }
        CompiledQuery::Follows {
            edge,
            kind,
            constraint,
            lhs,
            rhs,
        } => {
            if follows_satisfies(*kind, constraint, lhs, rhs, case) {
                edges.insert(*edge);
                collect_highlights(lhs, case, objects, edges);
                collect_highlights(rhs, case, objects, edges);
            }
        }
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

/// Build a minimal event log from activity name sequences, one case per
/// slice.
#[must_use]
pub fn log_from_traces(traces: &[&[&str]]) -> EventLog {
    EventLog {
        cases: traces
            .iter()
            .enumerate()
            .map(|(i, trace)| Case {
                id: format!("case-{}", i),
                events: trace
                    .iter()
                    .map(|a| Event {
                        activity: (*a).to_string(),
                        objects: Vec::new(),
                        metrics: BTreeMap::new(),
                    })
                    .collect(),
            })
            .collect(),
    }
}

// =============================================================================
// TESTS
// =============================================================================
