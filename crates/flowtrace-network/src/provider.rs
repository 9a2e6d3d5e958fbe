//! Seams to the outside world: feature layers and measurement.
//!
//! The tracing core never owns features. It borrows them from a
//! [`LineLayer`] (and a [`PointLayer`] for node matching) and measures
//! distances and lengths through a [`Measure`]. In-memory implementations
//! backed by an R\*-tree live in [`crate::layer`].

use geo::line_measures::{Distance, Length};
use geo::{Euclidean, Geodesic, Geometry};
use serde::{Deserialize, Serialize};

use crate::types::{Crs, FeatureId, LineFeature, Point, PointFeature, Rect, TraceError};

/// Read-only access to a layer of line features.
pub trait LineLayer {
    /// CRS shared by every feature of the layer.
    fn crs(&self) -> &Crs;

    /// Look up a feature by identifier.
    fn feature(&self, id: FeatureId) -> Option<&LineFeature>;

    /// Every feature whose bounding box intersects `rect`.
    ///
    /// Order is implementation-defined; callers must not assume the
    /// results are sorted by distance.
    fn query_rect(&self, rect: &Rect) -> Vec<&LineFeature>;

    /// Features currently selected in the layer.
    fn selected_features(&self) -> Vec<&LineFeature>;

    /// All features of the layer.
    fn features(&self) -> Vec<&LineFeature>;
}

/// Read-only access to a layer of point features.
pub trait PointLayer {
    /// CRS shared by every feature of the layer.
    fn crs(&self) -> &Crs;

    /// Every point inside `rect`, in implementation-defined order.
    fn query_rect(&self, rect: &Rect) -> Vec<&PointFeature>;
}

/// Distance and length measurement.
pub trait Measure {
    /// Distance between two points.
    fn distance(&self, a: Point, b: Point) -> f64;

    /// Length of a line geometry, summed over all parts.
    ///
    /// Non-line geometries have length zero.
    fn path_length(&self, geometry: &Geometry<f64>) -> f64;

    /// Returns `true` if coordinates are read as longitude/latitude.
    fn needs_geographic(&self) -> bool {
        false
    }

    /// Convert a tolerance in layer units into the unit of
    /// [`Measure::distance`].
    fn tolerance_in_measure_units(&self, tolerance: f64) -> f64 {
        tolerance
    }
}

fn line_length<S: Length<f64>>(space: &S, geometry: &Geometry<f64>) -> f64 {
    match geometry {
        Geometry::Line(line) => space.length(line),
        Geometry::LineString(line) => space.length(line),
        Geometry::MultiLineString(multi) => space.length(multi),
        _ => 0.0,
    }
}

/// Check that `measure` can be used on a layer in `crs`.
///
/// # Errors
///
/// Returns [`TraceError::ProjectedCrs`] when the measure reads
/// longitude/latitude and `crs` is not geographic.
pub fn check_crs<M: Measure + ?Sized>(measure: &M, crs: &Crs) -> Result<(), TraceError> {
    if measure.needs_geographic() && !crs.is_geographic() {
        return Err(TraceError::ProjectedCrs(crs.clone()));
    }
    Ok(())
}

/// Cartesian distance in CRS units.
#[derive(Debug, Clone, Copy, Default)]
pub struct Planar;

impl Measure for Planar {
    fn distance(&self, a: Point, b: Point) -> f64 {
        Euclidean.distance(geo::Point::from(a), geo::Point::from(b))
    }

    fn path_length(&self, geometry: &Geometry<f64>) -> f64 {
        line_length(&Euclidean, geometry)
    }
}

/// Geodesic distance in metres on the WGS84 ellipsoid.
///
/// Expects `x` as longitude and `y` as latitude in degrees. Tolerances
/// given in degrees are scaled by [`Ellipsoidal::METRES_PER_DEGREE`].
#[derive(Debug, Clone, Copy, Default)]
pub struct Ellipsoidal;

impl Ellipsoidal {
    /// Length of one degree of arc on the equator.
    pub const METRES_PER_DEGREE: f64 = 111_320.0;
}

impl Measure for Ellipsoidal {
    fn distance(&self, a: Point, b: Point) -> f64 {
        Geodesic.distance(geo::Point::from(a), geo::Point::from(b))
    }

    fn path_length(&self, geometry: &Geometry<f64>) -> f64 {
        line_length(&Geodesic, geometry)
    }

    fn needs_geographic(&self) -> bool {
        true
    }

    fn tolerance_in_measure_units(&self, tolerance: f64) -> f64 {
        tolerance * Self::METRES_PER_DEGREE
    }
}

/// Selects which [`Measure`] a configuration uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MeasureKind {
    /// [`Planar`] measurement in CRS units.
    #[default]
    Planar,
    /// [`Ellipsoidal`] measurement in metres. Geographic layers only.
    Ellipsoidal,
}

impl Measure for MeasureKind {
    fn distance(&self, a: Point, b: Point) -> f64 {
        match *self {
            Self::Planar => Planar.distance(a, b),
            Self::Ellipsoidal => Ellipsoidal.distance(a, b),
        }
    }

    fn path_length(&self, geometry: &Geometry<f64>) -> f64 {
        match *self {
            Self::Planar => Planar.path_length(geometry),
            Self::Ellipsoidal => Ellipsoidal.path_length(geometry),
        }
    }

    fn needs_geographic(&self) -> bool {
        match *self {
            Self::Planar => Planar.needs_geographic(),
            Self::Ellipsoidal => Ellipsoidal.needs_geographic(),
        }
    }

    fn tolerance_in_measure_units(&self, tolerance: f64) -> f64 {
        match *self {
            Self::Planar => Planar.tolerance_in_measure_units(tolerance),
            Self::Ellipsoidal => Ellipsoidal.tolerance_in_measure_units(tolerance),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use geo::{MultiLineString, line_string};

    use super::*;

    #[test]
    fn planar_distance() {
        let d = Planar.distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0));
        assert_relative_eq!(d, 5.0);
    }

    #[test]
    fn planar_path_length_sums_segments() {
        let line = Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 3.0, y: 4.0),
            (x: 3.0, y: 10.0),
        ]);
        assert_relative_eq!(Planar.path_length(&line), 11.0);
    }

    #[test]
    fn planar_path_length_covers_all_parts() {
        let multi = Geometry::MultiLineString(MultiLineString::new(vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 5.0, y: 0.0), (x: 5.0, y: 2.0)],
        ]));
        assert_relative_eq!(Planar.path_length(&multi), 3.0);
    }

    #[test]
    fn non_line_has_zero_length() {
        let point = Geometry::Point(geo::Point::new(1.0, 2.0));
        assert_relative_eq!(Planar.path_length(&point), 0.0);
    }

    #[test]
    fn ellipsoidal_degree_of_latitude() {
        // One degree of latitude at the equator is about 110.57 km.
        let d = Ellipsoidal.distance(Point::new(0.0, 0.0), Point::new(0.0, 1.0));
        assert_relative_eq!(d, 110_574.0, max_relative = 1e-3);
    }

    #[test]
    fn ellipsoidal_path_length_is_geodesic() {
        let line = Geometry::LineString(line_string![
            (x: 0.0, y: 0.0),
            (x: 0.0, y: 0.5),
            (x: 0.0, y: 1.0),
        ]);
        assert_relative_eq!(Ellipsoidal.path_length(&line), 110_574.0, max_relative = 1e-3);
    }

    #[test]
    fn ellipsoidal_tolerance_is_scaled_to_metres() {
        assert_relative_eq!(
            Ellipsoidal.tolerance_in_measure_units(0.0001),
            11.132,
            max_relative = 1e-12
        );
        assert_relative_eq!(Planar.tolerance_in_measure_units(0.0001), 0.0001);
    }

    #[test]
    fn ellipsoidal_rejects_projected_crs() {
        let projected = Crs::new("EPSG:25832");
        assert_eq!(
            check_crs(&MeasureKind::Ellipsoidal, &projected),
            Err(TraceError::ProjectedCrs(projected.clone()))
        );
        assert_eq!(check_crs(&MeasureKind::Planar, &projected), Ok(()));
        assert_eq!(check_crs(&Ellipsoidal, &Crs::new("EPSG:4269")), Ok(()));
        assert_eq!(check_crs(&Ellipsoidal, &Crs::new("EPSG:4326")), Ok(()));
    }

    #[test]
    fn measure_kind_dispatches() {
        let a = Point::new(0.0, 0.0);
        let b = Point::new(0.0, 1.0);
        assert_relative_eq!(MeasureKind::Planar.distance(a, b), 1.0);
        assert!(MeasureKind::Ellipsoidal.distance(a, b) > 100_000.0);
        assert!(MeasureKind::Ellipsoidal.needs_geographic());
        assert!(!MeasureKind::Planar.needs_geographic());
    }
}
