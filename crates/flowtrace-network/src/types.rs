//! Shared types for the flowtrace network core.

use std::fmt;

use serde::{Deserialize, Serialize};

/// A 2D point in layer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    /// Easting or longitude, depending on the layer CRS.
    pub x: f64,
    /// Northing or latitude, depending on the layer CRS.
    pub y: f64,
}

impl Point {
    /// Create a new point.
    #[must_use]
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl From<geo::Coord<f64>> for Point {
    fn from(c: geo::Coord<f64>) -> Self {
        Self::new(c.x, c.y)
    }
}

impl From<Point> for geo::Coord<f64> {
    fn from(p: Point) -> Self {
        Self { x: p.x, y: p.y }
    }
}

impl From<Point> for geo::Point<f64> {
    fn from(p: Point) -> Self {
        Self::new(p.x, p.y)
    }
}

/// Identifier of a feature, unique within its layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FeatureId(pub u64);

impl fmt::Display for FeatureId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for FeatureId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// Flow direction of a trace.
///
/// Decides which endpoint of every line is the flow-out (tail) and
/// which is the flow-in (head):
///
/// | Direction    | flow-out     | flow-in      |
/// |--------------|--------------|--------------|
/// | `Downstream` | last vertex  | first vertex |
/// | `Upstream`   | first vertex | last vertex  |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// Follow the digitized vertex order.
    #[default]
    Downstream,
    /// Walk against the digitized vertex order.
    Upstream,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downstream => f.write_str("downstream"),
            Self::Upstream => f.write_str("upstream"),
        }
    }
}

/// Coordinate reference system identifier in `AUTHORITY:CODE` form.
///
/// OGC URNs (`urn:ogc:def:crs:EPSG::4269`) and lowercase authorities
/// (`epsg:4269`) are normalized on construction so that comparisons
/// against well-known identifiers are exact string matches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct Crs(String);

impl Crs {
    /// Create a CRS identifier, normalizing URN and case variants.
    #[must_use]
    pub fn new(id: &str) -> Self {
        Self(normalize_crs(id))
    }

    /// The normalized `AUTHORITY:CODE` identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Returns `true` for the longitude/latitude systems known to the
    /// tracer (WGS84, NAD83, ETRS89 and `OGC:CRS84`).
    #[must_use]
    pub fn is_geographic(&self) -> bool {
        GEOGRAPHIC_SYSTEMS.contains(&self.0.as_str())
    }
}

const GEOGRAPHIC_SYSTEMS: [&str; 4] = ["EPSG:4326", "EPSG:4269", "EPSG:4258", "OGC:CRS84"];

fn normalize_crs(id: &str) -> String {
    const URN_PREFIX: &str = "urn:ogc:def:crs:";

    let id = id.trim();
    if let Some(head) = id.get(..URN_PREFIX.len())
        && head.eq_ignore_ascii_case(URN_PREFIX)
        && let Some(rest) = id.get(URN_PREFIX.len()..)
    {
        // urn:ogc:def:crs:EPSG:<version>:<code>; the version is usually empty.
        let mut parts = rest.split(':');
        if let (Some(authority), Some(code)) = (parts.next(), parts.next_back()) {
            return format!("{}:{}", authority.to_ascii_uppercase(), code);
        }
    }
    match id.split_once(':') {
        Some((authority, code)) => format!("{}:{}", authority.to_ascii_uppercase(), code.trim()),
        None => id.to_owned(),
    }
}

impl From<String> for Crs {
    fn from(id: String) -> Self {
        Self::new(&id)
    }
}

impl From<Crs> for String {
    fn from(crs: Crs) -> Self {
        crs.0
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A line feature: identifier plus geometry.
///
/// The geometry is kept as a general [`geo::Geometry`] so that providers
/// can hand over whatever they store; the geometry adapter rejects
/// anything that is not a line.
#[derive(Debug, Clone, PartialEq)]
pub struct LineFeature {
    /// Identifier, unique within the layer.
    pub id: FeatureId,
    /// Feature geometry in layer coordinates.
    pub geometry: geo::Geometry<f64>,
}

impl LineFeature {
    /// Create a line feature.
    #[must_use]
    pub fn new(id: FeatureId, geometry: impl Into<geo::Geometry<f64>>) -> Self {
        Self {
            id,
            geometry: geometry.into(),
        }
    }

    /// Convenience constructor for a simple line through `coords`.
    #[must_use]
    pub fn from_coords(id: FeatureId, coords: &[(f64, f64)]) -> Self {
        let line: geo::LineString<f64> = coords.iter().copied().collect();
        Self::new(id, line)
    }
}

/// A point feature such as a manhole or junction node.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointFeature {
    /// Identifier, unique within the layer.
    pub id: FeatureId,
    /// Location in layer coordinates.
    pub point: Point,
}

impl PointFeature {
    /// Create a point feature.
    #[must_use]
    pub const fn new(id: FeatureId, point: Point) -> Self {
        Self { id, point }
    }
}

/// Axis-aligned query rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    /// Lower-left corner.
    pub min: Point,
    /// Upper-right corner.
    pub max: Point,
}

impl Rect {
    /// Square of side `2 * half_extent` centered on `center`.
    #[must_use]
    pub fn around(center: Point, half_extent: f64) -> Self {
        Self {
            min: Point::new(center.x - half_extent, center.y - half_extent),
            max: Point::new(center.x + half_extent, center.y + half_extent),
        }
    }
}

/// Why a geometry cannot be used as a traceable line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum GeometryIssue {
    /// The geometry is not a line (point, polygon, collection, ...).
    #[error("expected a line geometry, found {0}")]
    NotALine(String),

    /// The line has fewer than two vertices.
    #[error("line has {0} vertices, at least 2 are required")]
    TooFewVertices(usize),

    /// A multi-line holds more than one part and the policy rejects it.
    #[error("multi-part line with {0} parts")]
    MultiPart(usize),

    /// A multi-line without any part.
    #[error("multi-part line has no parts")]
    EmptyMultiPart,
}

/// Errors that can occur while tracing, sequencing or matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
pub enum TraceError {
    /// The seed or a referenced feature does not exist in the layer.
    #[error("feature {0} not found")]
    NotFound(FeatureId),

    /// A feature's geometry cannot be traced.
    #[error("feature {id} has an invalid geometry: {reason}")]
    InvalidGeometry {
        /// Offending feature.
        id: FeatureId,
        /// What is wrong with it.
        reason: GeometryIssue,
    },

    /// Zero heads, or more than one head under the strict policy.
    #[error("expected exactly one upstream-most feature, found {candidates}")]
    AmbiguousHead {
        /// Number of features without a predecessor.
        candidates: usize,
    },

    /// Negative, NaN or infinite tolerance.
    #[error("tolerance must be finite and non-negative, got {0}")]
    InvalidTolerance(f64),

    /// An ellipsoidal measure was requested for a projected layer.
    #[error("ellipsoidal measurement needs a geographic CRS, layer is {0}")]
    ProjectedCrs(Crs),

    /// The caller raised the cancellation flag.
    #[error("trace cancelled")]
    Cancelled,
}

/// Errors that can occur while building a layer.
#[derive(Debug, thiserror::Error)]
pub enum LayerError {
    /// The input is not valid JSON, or does not have the expected shape.
    #[error("failed to parse GeoJSON: {0}")]
    Json(#[from] serde_json::Error),

    /// The top-level object is not a `FeatureCollection`.
    #[error("expected a FeatureCollection, found {0}")]
    NotAFeatureCollection(String),

    /// Two features share an identifier.
    #[error("duplicate feature id {0}")]
    DuplicateId(FeatureId),

    /// A feature id is neither a non-negative integer nor a string holding one.
    #[error("feature #{index} has an unusable id: {value}")]
    InvalidId {
        /// Position of the feature in the collection.
        index: usize,
        /// The raw id as found in the input.
        value: String,
    },

    /// A feature has a null geometry.
    #[error("feature #{index} has no geometry")]
    MissingGeometry {
        /// Position of the feature in the collection.
        index: usize,
    },

    /// A feature's geometry type does not belong in this layer.
    #[error("feature #{index}: expected {expected}, found {found}")]
    WrongGeometryType {
        /// Position of the feature in the collection.
        index: usize,
        /// Geometry types accepted by the layer.
        expected: &'static str,
        /// Geometry type found in the input.
        found: String,
    },

    /// A position with fewer than two ordinates.
    #[error("feature #{index} has a position with fewer than 2 ordinates")]
    InvalidPosition {
        /// Position of the feature in the collection.
        index: usize,
    },
}
