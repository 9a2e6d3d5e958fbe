//! Length totals and multi-part checks over sets of lines.

use geo::Geometry;
use serde::{Deserialize, Serialize};

use crate::geometry::is_single_part;
use crate::provider::{self, LineLayer, Measure};
use crate::types::{LineFeature, TraceError};

/// Total length and count of a set of lines.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SelectionSummary {
    /// Sum of the path lengths of all lines.
    pub total_length: f64,
    /// Number of lines.
    pub count: usize,
}

/// Sum the lengths of `features`.
pub fn summarize<'a, M: Measure + ?Sized>(
    features: impl IntoIterator<Item = &'a LineFeature>,
    measure: &M,
) -> SelectionSummary {
    features
        .into_iter()
        .fold(SelectionSummary::default(), |acc, feature| SelectionSummary {
            total_length: acc.total_length + measure.path_length(&feature.geometry),
            count: acc.count + 1,
        })
}

/// Summary of the layer's current selection.
///
/// # Errors
///
/// Returns [`TraceError::ProjectedCrs`] if `measure` does not fit the
/// layer CRS.
pub fn summarize_selection<L: LineLayer + ?Sized, M: Measure + ?Sized>(
    layer: &L,
    measure: &M,
) -> Result<SelectionSummary, TraceError> {
    provider::check_crs(measure, layer.crs())?;
    Ok(summarize(layer.selected_features(), measure))
}

/// Returns `true` if any line of the layer has more than one part.
///
/// Non-line geometries and multi-lines without parts are ignored.
pub fn has_multipart<L: LineLayer + ?Sized>(layer: &L) -> bool {
    layer.features().into_iter().any(|feature| {
        let geometry = &feature.geometry;
        matches!(geometry, Geometry::MultiLineString(multi) if !multi.0.is_empty())
            && !is_single_part(geometry)
    })
}
