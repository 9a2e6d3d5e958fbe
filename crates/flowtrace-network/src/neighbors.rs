//! Spatial neighbor query: candidates around a point.
//!
//! A candidate is any feature whose bounding box intersects the square
//! of side `2 * half_extent` centered on the query point. Candidates are
//! not filtered by exact distance; callers measure endpoint distances
//! themselves.

use crate::provider::{LineLayer, PointLayer};
use crate::types::{LineFeature, Point, PointFeature, Rect};

/// Line features around `center`.
#[must_use]
pub fn neighbors<L: LineLayer + ?Sized>(
    layer: &L,
    center: Point,
    half_extent: f64,
) -> Vec<&LineFeature> {
    layer.query_rect(&Rect::around(center, half_extent))
}

/// Point features around `center`.
#[must_use]
pub fn point_neighbors<P: PointLayer + ?Sized>(
    layer: &P,
    center: Point,
    half_extent: f64,
) -> Vec<&PointFeature> {
    layer.query_rect(&Rect::around(center, half_extent))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::layer::LineLayerIndex;
    use crate::types::{Crs, FeatureId};

    #[test]
    fn half_extent_bounds_the_search_box() {
        let layer = LineLayerIndex::new(
            Crs::new("EPSG:25832"),
            vec![
                LineFeature::from_coords(FeatureId(1), &[(0.3, 0.0), (1.0, 0.0)]),
                LineFeature::from_coords(FeatureId(2), &[(0.6, 0.0), (1.0, 0.0)]),
            ],
        )
        .unwrap();

        let near = neighbors(&layer, Point::new(0.0, 0.0), 0.5);
        assert_eq!(near.len(), 1);
        assert_eq!(near[0].id, FeatureId(1));

        let wide = neighbors(&layer, Point::new(0.0, 0.0), 0.6);
        assert_eq!(wide.len(), 2);
    }

    #[test]
    fn works_through_a_trait_object() {
        let layer = LineLayerIndex::new(
            Crs::new("EPSG:25832"),
            vec![LineFeature::from_coords(FeatureId(1), &[(0.0, 0.0), (1.0, 0.0)])],
        )
        .unwrap();
        let dynamic: &dyn LineLayer = &layer;
        assert_eq!(neighbors(dynamic, Point::new(1.0, 0.0), 0.1).len(), 1);
    }
}
