//! Topological sequencing: put a connected set of lines in flow order.
//!
//! The head is a line with no predecessor, i.e. no other line ends
//! (flow-out) within tolerance of where it begins (flow-in). From the
//! head the walk repeatedly appends the first remaining line whose
//! flow-in endpoint is within tolerance of the current flow-out endpoint.
//! Ties go to input order, so branching networks yield one path, not a
//! tree.

use serde::{Deserialize, Serialize};

use crate::geometry::{Endpoints, MultiPartPolicy, endpoints};
use crate::provider::{self, LineLayer, Measure, MeasureKind};
use crate::tolerance;
use crate::types::{Direction, FeatureId, LineFeature, Point, TraceError};

/// What to do when more than one line has no predecessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeadPolicy {
    /// Use the first head in input order and count the others in
    /// [`OrderedSequence::ambiguous_heads_skipped`].
    #[default]
    FirstWins,
    /// Fail with [`TraceError::AmbiguousHead`].
    Strict,
}

/// Configuration for [`sequence`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SequenceConfig {
    /// Maximum endpoint distance (inclusive) between consecutive lines.
    pub tolerance: f64,
    /// Flow direction defining predecessor and successor.
    pub direction: Direction,
    /// How to treat multi-part lines.
    pub multipart: MultiPartPolicy,
    /// How endpoint distances are measured.
    pub measure: MeasureKind,
    /// Behavior when several heads exist.
    pub head_policy: HeadPolicy,
}

impl SequenceConfig {
    /// Default tolerance in layer units.
    pub const DEFAULT_TOLERANCE: f64 = 0.1;
}

impl Default for SequenceConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            direction: Direction::default(),
            multipart: MultiPartPolicy::default(),
            measure: MeasureKind::default(),
            head_policy: HeadPolicy::default(),
        }
    }
}

/// Lines in flow order, head first.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderedSequence<'a> {
    /// Ordered lines. Never longer than the input.
    pub features: Vec<&'a LineFeature>,
    /// Heads other than the one the walk started from.
    pub ambiguous_heads_skipped: usize,
    /// Input lines the walk never reached, in input order.
    pub unplaced: Vec<FeatureId>,
}

impl OrderedSequence<'_> {
    /// Identifiers in sequence order.
    #[must_use]
    pub fn ids(&self) -> Vec<FeatureId> {
        self.features.iter().map(|f| f.id).collect()
    }

    /// Number of ordered lines.
    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    /// Returns `true` if nothing was ordered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

/// Order `features` from head to end of flow.
///
/// `layer` supplies the CRS for the tolerance override; the features
/// themselves need not belong to it.
///
/// # Errors
///
/// Returns [`TraceError::InvalidTolerance`] for an unusable tolerance,
/// [`TraceError::ProjectedCrs`] if the measure does not fit the layer CRS,
/// [`TraceError::InvalidGeometry`] if an input is not a usable line, and
/// [`TraceError::AmbiguousHead`] if no head exists (the input is a cycle)
/// or several exist under [`HeadPolicy::Strict`].
pub fn sequence<'a, L: LineLayer + ?Sized>(
    layer: &L,
    features: &[&'a LineFeature],
    config: &SequenceConfig,
) -> Result<OrderedSequence<'a>, TraceError> {
    provider::check_crs(&config.measure, layer.crs())?;
    let tolerance = tolerance::effective(layer.crs(), config.tolerance)?;
    if features.is_empty() {
        return Ok(OrderedSequence {
            features: Vec::new(),
            ambiguous_heads_skipped: 0,
            unplaced: Vec::new(),
        });
    }

    let ends: Vec<Endpoints> = features
        .iter()
        .map(|f| {
            endpoints(&f.geometry, config.multipart).map_err(|reason| {
                TraceError::InvalidGeometry { id: f.id, reason }
            })
        })
        .collect::<Result<_, _>>()?;

    let direction = config.direction;
    let measure = &config.measure;
    let limit = measure.tolerance_in_measure_units(tolerance);
    let within = |a: Point, b: Point| measure.distance(a, b) <= limit;

    let heads: Vec<usize> = (0..features.len())
        .filter(|&i| {
            let inflow = ends[i].flow_in(direction);
            !ends
                .iter()
                .enumerate()
                .any(|(j, other)| j != i && within(other.flow_out(direction), inflow))
        })
        .collect();

    let Some(&head) = heads.first() else {
        log::warn!("no head among {} features: input is cyclic", features.len());
        return Err(TraceError::AmbiguousHead { candidates: 0 });
    };
    if heads.len() > 1 {
        if config.head_policy == HeadPolicy::Strict {
            return Err(TraceError::AmbiguousHead {
                candidates: heads.len(),
            });
        }
        log::warn!(
            "{} heads found, starting from {}",
            heads.len(),
            features[head].id
        );
    }

    let mut remaining: Vec<usize> = (0..features.len()).filter(|&i| i != head).collect();
    let mut ordered = vec![features[head]];
    let mut current = head;
    while let Some(pos) = remaining.iter().position(|&k| {
        within(ends[k].flow_in(direction), ends[current].flow_out(direction))
    }) {
        let previous = current;
        current = remaining.remove(pos);
        log::debug!("{} follows {}", features[current].id, features[previous].id);
        ordered.push(features[current]);
    }

    Ok(OrderedSequence {
        features: ordered,
        ambiguous_heads_skipped: heads.len() - 1,
        unplaced: remaining.into_iter().map(|k| features[k].id).collect(),
    })
}
