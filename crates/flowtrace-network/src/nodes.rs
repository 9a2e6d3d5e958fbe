//! Match the endpoints of a line to point features (manholes, junctions).

use serde::{Deserialize, Serialize};

use crate::geometry::{MultiPartPolicy, endpoints};
use crate::neighbors::point_neighbors;
use crate::provider::{self, LineLayer, Measure, MeasureKind, PointLayer};
use crate::tolerance;
use crate::types::{FeatureId, LineFeature, Point, PointFeature, TraceError};

/// Which point wins when several fall inside an endpoint's search box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeMatchPolicy {
    /// The last point returned by the layer query.
    #[default]
    LastEnumerated,
    /// The point closest to the endpoint; the first one on ties.
    Nearest,
}

/// Configuration for [`match_endpoints`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeMatchConfig {
    /// Side length of the square searched around each endpoint.
    pub tolerance: f64,
    /// How to treat multi-part lines.
    pub multipart: MultiPartPolicy,
    /// Tie-breaking between several points.
    pub policy: NodeMatchPolicy,
    /// Distance measure for [`NodeMatchPolicy::Nearest`].
    pub measure: MeasureKind,
}

impl NodeMatchConfig {
    /// Default tolerance in layer units.
    pub const DEFAULT_TOLERANCE: f64 = 0.1;
}

impl Default for NodeMatchConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            multipart: MultiPartPolicy::default(),
            policy: NodeMatchPolicy::default(),
            measure: MeasureKind::default(),
        }
    }
}

/// Point features at the first (head) and last (tail) vertex of a line.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct EndpointMatch<'a> {
    /// Point at the first vertex.
    pub head: Option<&'a PointFeature>,
    /// Point at the last vertex.
    pub tail: Option<&'a PointFeature>,
}

impl EndpointMatch<'_> {
    /// Identifiers of the head and tail points.
    #[must_use]
    pub fn ids(&self) -> (Option<FeatureId>, Option<FeatureId>) {
        (self.head.map(|p| p.id), self.tail.map(|p| p.id))
    }
}

/// Find the point features at both ends of `line`.
///
/// The tolerance is resolved against the CRS of `line_layer`, and each
/// endpoint is searched with a box of half that size. Candidates are not
/// filtered by exact distance.
///
/// # Errors
///
/// Returns [`TraceError::InvalidTolerance`] for an unusable tolerance,
/// [`TraceError::ProjectedCrs`] if the measure does not fit the layer CRS,
/// and [`TraceError::InvalidGeometry`] if `line` is not a usable line.
pub fn match_endpoints<'a, L, P>(
    line_layer: &L,
    line: &LineFeature,
    point_layer: &'a P,
    config: &NodeMatchConfig,
) -> Result<EndpointMatch<'a>, TraceError>
where
    L: LineLayer + ?Sized,
    P: PointLayer + ?Sized,
{
    provider::check_crs(&config.measure, line_layer.crs())?;
    let tolerance = tolerance::effective(line_layer.crs(), config.tolerance)?;
    if line_layer.crs() != point_layer.crs() {
        log::warn!(
            "line layer is {} but point layer is {}",
            line_layer.crs(),
            point_layer.crs()
        );
    }

    let ends = endpoints(&line.geometry, config.multipart).map_err(|reason| {
        TraceError::InvalidGeometry {
            id: line.id,
            reason,
        }
    })?;

    let half_extent = tolerance / 2.0;
    let pick = |at: Point, label: &str| {
        let hits = point_neighbors(point_layer, at, half_extent);
        if hits.len() > 1 {
            log::warn!("{} {label}: {} points within tolerance", line.id, hits.len());
        }
        match config.policy {
            NodeMatchPolicy::LastEnumerated => hits.last().copied(),
            NodeMatchPolicy::Nearest => hits.into_iter().min_by(|a, b| {
                let da = config.measure.distance(a.point, at);
                let db = config.measure.distance(b.point, at);
                da.total_cmp(&db)
            }),
        }
    };

    Ok(EndpointMatch {
        head: pick(ends.first, "head"),
        tail: pick(ends.last, "tail"),
    })
}
