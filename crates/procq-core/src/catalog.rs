//! # Predicate Catalog
//!
//! The fixed set of leaf predicate kinds and their parameter schemas.
//!
//! Pure data/lookup, no state. The predicate editor collaborator consults
//! the catalog to build its forms; the graph model consults it to validate
//! every parameter record before committing a mutation.

use crate::primitives::{MAX_ACTIVITIES_PER_PREDICATE, MAX_NAME_LENGTH};
use crate::{NodeKind, PredicateFeature, PredicateParams, ProcqError, Quantifier};

/// Parameter schema of one leaf predicate kind.
#[derive(Debug, Clone, Copy)]
pub struct ParamSchema {
    pub kind: NodeKind,
    /// Features this kind admits (membership, containment, start/end).
    pub features: &'static [PredicateFeature],
    /// Quantifiers this kind accepts.
    pub quantifiers: &'static [Quantifier],
    pub supports_count: bool,
    pub supports_probability: bool,
    pub supports_metric: bool,
}

/// Schemas for the three leaf kinds. Or-nodes have no schema: their params
/// are adopted from a connector partner and are display-only.
static SCHEMAS: [ParamSchema; 3] = [
    ParamSchema {
        kind: NodeKind::Activity,
        features: &[
            PredicateFeature::Membership,
            PredicateFeature::Start,
            PredicateFeature::End,
        ],
        quantifiers: &[Quantifier::None, Quantifier::Any, Quantifier::All],
        supports_count: true,
        supports_probability: true,
        supports_metric: true,
    },
    ParamSchema {
        kind: NodeKind::Object,
        features: &[PredicateFeature::Membership, PredicateFeature::Containment],
        quantifiers: &[Quantifier::None, Quantifier::Any, Quantifier::All],
        supports_count: true,
        supports_probability: true,
        supports_metric: false,
    },
    ParamSchema {
        kind: NodeKind::ObjectType,
        features: &[PredicateFeature::Membership],
        quantifiers: &[Quantifier::None],
        supports_count: true,
        supports_probability: false,
        supports_metric: false,
    },
];

/// Look up the schema for a leaf kind. Returns `None` for Or-nodes.
#[must_use]
pub fn schema(kind: NodeKind) -> Option<&'static ParamSchema> {
    SCHEMAS.iter().find(|s| s.kind == kind)
}

/// The leaf kinds, in catalog order.
#[must_use]
pub fn leaf_kinds() -> impl Iterator<Item = NodeKind> {
    SCHEMAS.iter().map(|s| s.kind)
}

fn invalid(kind: NodeKind, reason: impl Into<String>) -> ProcqError {
    ProcqError::InvalidParams {
        kind,
        reason: reason.into(),
    }
}

/// Validate a parameter record against the kind's schema.
///
/// Or-node params are always accepted: they are copied from connector
/// partners (which were validated on their own insert).
pub fn validate_params(kind: NodeKind, params: &PredicateParams) -> Result<(), ProcqError> {
    if kind.is_or() {
        return Ok(());
    }
    let Some(schema) = schema(kind) else {
        return Err(invalid(kind, "kind has no catalog schema"));
    };

    if !schema.features.contains(&params.feature) {
        return Err(invalid(
            kind,
            format!("feature {:?} not supported", params.feature),
        ));
    }
    if !schema.quantifiers.contains(&params.quantifier) {
        return Err(invalid(
            kind,
            format!("quantifier {:?} not supported", params.quantifier),
        ));
    }
    if params.count.is_some() && !schema.supports_count {
        return Err(invalid(kind, "count threshold not supported"));
    }
    if params.probability.is_some() && !schema.supports_probability {
        return Err(invalid(kind, "probability threshold not supported"));
    }
    if params.metric.is_some() && !schema.supports_metric {
        return Err(invalid(kind, "metric constraint not supported"));
    }

    match kind {
        NodeKind::Activity => {
            if params.activities.is_empty() {
                return Err(invalid(kind, "at least one activity name required"));
            }
            if params.object_type.is_some() {
                return Err(invalid(kind, "object type not applicable"));
            }
        }
        NodeKind::Object | NodeKind::ObjectType => {
            if !params.activities.is_empty() {
                return Err(invalid(kind, "activity names not applicable"));
            }
            match params.object_type.as_deref() {
                None | Some("") => return Err(invalid(kind, "object type required")),
                Some(_) => {}
            }
        }
        _ => {}
    }

    if params.activities.len() > MAX_ACTIVITIES_PER_PREDICATE {
        return Err(invalid(
            kind,
            format!("more than {} activity names", MAX_ACTIVITIES_PER_PREDICATE),
        ));
    }
    for name in params
        .activities
        .iter()
        .chain(params.object_type.as_ref().into_iter())
    {
        if name.is_empty() {
            return Err(invalid(kind, "empty name"));
        }
        if name.len() > MAX_NAME_LENGTH {
            return Err(invalid(
                kind,
                format!("name exceeds {} bytes", MAX_NAME_LENGTH),
            ));
        }
    }
    if let Some(m) = &params.metric {
        if m.metric.is_empty() || m.metric.len() > MAX_NAME_LENGTH {
            return Err(invalid(kind, "invalid metric name"));
        }
    }

    Ok(())
}

// =============================================================================
// TESTS
// =============================================================================
