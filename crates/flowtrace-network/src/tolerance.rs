//! Effective proximity tolerance per coordinate reference system.
//!
//! Tolerances are given in the linear unit of the layer CRS. NAD83
//! (`EPSG:4269`) is geographic, so a tolerance typed in metres would span
//! whole degrees; for that CRS a fixed degree-scale value replaces the
//! caller's tolerance. This is not a general unit conversion: every other
//! CRS gets the requested tolerance unchanged.

use crate::types::{Crs, TraceError};

/// The geographic CRS whose tolerance is overridden.
pub const GEOGRAPHIC_CRS: &str = "EPSG:4269";

/// Tolerance in degrees used for [`GEOGRAPHIC_CRS`] (about 10 m at
/// mid-latitudes).
pub const GEOGRAPHIC_TOLERANCE: f64 = 0.0001;

/// Effective tolerance for `crs`.
#[must_use]
pub fn resolve(crs: &Crs, requested: f64) -> f64 {
    if crs.as_str() == GEOGRAPHIC_CRS {
        if (requested - GEOGRAPHIC_TOLERANCE).abs() > f64::EPSILON {
            log::debug!(
                "{crs}: overriding tolerance {requested} with {GEOGRAPHIC_TOLERANCE} degrees"
            );
        }
        GEOGRAPHIC_TOLERANCE
    } else {
        requested
    }
}

/// Check that a caller-supplied tolerance is usable.
///
/// # Errors
///
/// Returns [`TraceError::InvalidTolerance`] for negative, NaN or
/// infinite values.
pub fn validate(tolerance: f64) -> Result<f64, TraceError> {
    if tolerance.is_finite() && tolerance >= 0.0 {
        Ok(tolerance)
    } else {
        Err(TraceError::InvalidTolerance(tolerance))
    }
}

/// Validate `requested`, then resolve it for `crs`.
///
/// # Errors
///
/// See [`validate`].
pub fn effective(crs: &Crs, requested: f64) -> Result<f64, TraceError> {
    validate(requested).map(|t| resolve(crs, t))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nad83_is_overridden() {
        assert!((resolve(&Crs::new("EPSG:4269"), 5.0) - 0.0001).abs() < f64::EPSILON);
    }

    #[test]
    fn nad83_urn_is_overridden() {
        let crs = Crs::new("urn:ogc:def:crs:EPSG::4269");
        assert!((resolve(&crs, 5.0) - GEOGRAPHIC_TOLERANCE).abs() < f64::EPSILON);
    }

    #[test]
    fn projected_crs_keeps_requested() {
        assert!((resolve(&Crs::new("EPSG:3857"), 5.0) - 5.0).abs() < f64::EPSILON);
    }

    #[test]
    fn wgs84_is_not_overridden() {
        // Only NAD83 carries the override.
        assert!((resolve(&Crs::new("EPSG:4326"), 0.5) - 0.5).abs() < f64::EPSILON);
    }

    #[test]
    fn zero_tolerance_is_valid() {
        assert_eq!(validate(0.0), Ok(0.0));
    }

    #[test]
    fn negative_and_non_finite_tolerances_are_rejected() {
        assert_eq!(validate(-1.0), Err(TraceError::InvalidTolerance(-1.0)));
        assert_eq!(
            validate(f64::INFINITY),
            Err(TraceError::InvalidTolerance(f64::INFINITY))
        );
        assert!(matches!(
            validate(f64::NAN),
            Err(TraceError::InvalidTolerance(t)) if t.is_nan()
        ));
    }

    #[test]
    fn effective_rejects_before_override() {
        // A broken tolerance is an error even where it would be overridden.
        assert!(effective(&Crs::new("EPSG:4269"), -5.0).is_err());
        assert!((effective(&Crs::new("EPSG:4269"), 5.0).unwrap_or(0.0) - 0.0001).abs() < 1e-12);
    }
}
