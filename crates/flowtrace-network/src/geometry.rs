//! Geometry adapter: extract the ordered vertex sequence of a line feature.
//!
//! Providers may encode a line as a simple `LineString` or wrap it in a
//! `MultiLineString`. Tracing only ever looks at the two endpoints of a
//! single part, so this module reduces every accepted encoding to one
//! [`geo::LineString`] and its [`Endpoints`].

use std::borrow::Cow;

use geo::{Geometry, LineString};
use serde::{Deserialize, Serialize};

use crate::types::{Direction, GeometryIssue, Point};

/// How to treat a `MultiLineString` with more than one part.
///
/// A multi-line with exactly one part is always accepted, whatever the
/// policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiPartPolicy {
    /// Fail with [`GeometryIssue::MultiPart`].
    #[default]
    Reject,
    /// Use the first part and ignore the rest.
    FirstPart,
}

/// First and last vertex of a line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Endpoints {
    /// First vertex in digitized order.
    pub first: Point,
    /// Last vertex in digitized order.
    pub last: Point,
}

impl Endpoints {
    /// Endpoint where flow leaves the line (tail).
    #[must_use]
    pub const fn flow_out(&self, direction: Direction) -> Point {
        match direction {
            Direction::Downstream => self.last,
            Direction::Upstream => self.first,
        }
    }

    /// Endpoint where flow enters the line (head).
    #[must_use]
    pub const fn flow_in(&self, direction: Direction) -> Point {
        match direction {
            Direction::Downstream => self.first,
            Direction::Upstream => self.last,
        }
    }
}

/// Returns `true` if the geometry is a line with a single part.
///
/// `LineString` and `Line` are single-part; a `MultiLineString` is
/// single-part only if it holds exactly one line. Anything else is
/// `false`.
#[must_use]
pub fn is_single_part(geometry: &Geometry<f64>) -> bool {
    match geometry {
        Geometry::Line(_) | Geometry::LineString(_) => true,
        Geometry::MultiLineString(multi) => multi.0.len() == 1,
        _ => false,
    }
}

/// Resolve a geometry to the single line part that tracing operates on.
///
/// # Errors
///
/// Returns [`GeometryIssue::NotALine`] for non-line geometries,
/// [`GeometryIssue::EmptyMultiPart`] for a multi-line without parts,
/// [`GeometryIssue::MultiPart`] for a multi-line with several parts under
/// [`MultiPartPolicy::Reject`], and [`GeometryIssue::TooFewVertices`] if
/// the selected part has fewer than two vertices.
pub fn line_part(
    geometry: &Geometry<f64>,
    policy: MultiPartPolicy,
) -> Result<Cow<'_, LineString<f64>>, GeometryIssue> {
    let line = match geometry {
        Geometry::LineString(line) => Cow::Borrowed(line),
        Geometry::Line(line) => Cow::Owned(LineString::from(*line)),
        Geometry::MultiLineString(multi) => match (multi.0.as_slice(), policy) {
            ([], _) => return Err(GeometryIssue::EmptyMultiPart),
            ([only], _) | ([only, ..], MultiPartPolicy::FirstPart) => {
                Cow::Borrowed(only)
            }
            (parts, MultiPartPolicy::Reject) => return Err(GeometryIssue::MultiPart(parts.len())),
        },
        other => return Err(GeometryIssue::NotALine(geometry_kind(other).to_owned())),
    };

    if line.0.len() < 2 {
        return Err(GeometryIssue::TooFewVertices(line.0.len()));
    }
    Ok(line)
}

/// Ordered vertex sequence of a line geometry.
///
/// # Errors
///
/// See [`line_part`].
pub fn vertices(
    geometry: &Geometry<f64>,
    policy: MultiPartPolicy,
) -> Result<Vec<Point>, GeometryIssue> {
    let line = line_part(geometry, policy)?;
    Ok(line.coords().copied().map(Point::from).collect())
}

/// First and last vertex of a line geometry.
///
/// # Errors
///
/// See [`line_part`].
pub fn endpoints(
    geometry: &Geometry<f64>,
    policy: MultiPartPolicy,
) -> Result<Endpoints, GeometryIssue> {
    let line = line_part(geometry, policy)?;
    // line_part guarantees at least two vertices.
    match (line.0.first(), line.0.last()) {
        (Some(first), Some(last)) => Ok(Endpoints {
            first: Point::from(*first),
            last: Point::from(*last),
        }),
        _ => Err(GeometryIssue::TooFewVertices(line.0.len())),
    }
}

/// Human-readable name of a geometry variant, used in error messages.
#[must_use]
pub const fn geometry_kind(geometry: &Geometry<f64>) -> &'static str {
    match geometry {
        Geometry::Point(_) => "Point",
        Geometry::Line(_) => "Line",
        Geometry::LineString(_) => "LineString",
        Geometry::Polygon(_) => "Polygon",
        Geometry::MultiPoint(_) => "MultiPoint",
        Geometry::MultiLineString(_) => "MultiLineString",
        Geometry::MultiPolygon(_) => "MultiPolygon",
        Geometry::GeometryCollection(_) => "GeometryCollection",
        Geometry::Rect(_) => "Rect",
        Geometry::Triangle(_) => "Triangle",
    }
}
