//! Trace diagnostics: timing and counts for a single trace.
//!
//! Intended for tuning tolerances and comparing layers. Timestamps come
//! from a caller-supplied [`Clock`], so the core never touches a platform
//! timer.
//!
//! Durations are serialized as fractional seconds (`f64`) for JSON
//! compatibility, since `std::time::Duration` does not implement serde
//! traits.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::provider::{LineLayer, Measure};
use crate::trace::{TraceConfig, TraceControl, TraceProgress, TraceResult, trace_with};
use crate::types::{FeatureId, TraceError};

/// Source of timestamps for diagnostics.
pub trait Clock {
    /// Opaque point in time.
    type Instant;

    /// Current time.
    fn now(&self) -> Self::Instant;

    /// Time elapsed since `since`.
    fn elapsed(&self, since: &Self::Instant) -> Duration;
}

/// Serde support for `std::time::Duration` as fractional seconds.
mod duration_serde {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    /// Serialize a `Duration` as fractional seconds (`f64`).
    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        duration.as_secs_f64().serialize(serializer)
    }

    /// Deserialize a `Duration` from fractional seconds (`f64`).
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(deserializer)?;
        Duration::try_from_secs_f64(secs).map_err(|_| {
            serde::de::Error::custom(
                "duration seconds must be finite, non-negative, and representable as a Duration",
            )
        })
    }
}

/// Diagnostics collected from a single trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceDiagnostics {
    /// Feature the trace started from.
    pub seed: FeatureId,
    /// Wall-clock duration of the trace (seconds).
    #[serde(with = "duration_serde")]
    pub duration: Duration,
    /// Tolerance actually applied.
    pub tolerance: f64,
    /// Lines expanded, which is also the number of spatial queries.
    pub expansions: usize,
    /// Candidates returned by the spatial queries.
    pub candidates_examined: usize,
    /// Candidates whose flow-in endpoint was within tolerance.
    pub within_tolerance: usize,
    /// Within-tolerance candidates that were already connected.
    pub duplicates: usize,
    /// Largest work queue observed.
    pub peak_queue: usize,
    /// Size of the connected set.
    pub connected: usize,
    /// Total length of the connected set.
    pub total_length: f64,
}

impl TraceDiagnostics {
    /// Human-readable multi-line report.
    #[must_use]
    pub fn report(&self) -> String {
        let mut lines = Vec::new();
        lines.push(format!("Trace Diagnostics Report\n{}", "=".repeat(60)));
        lines.push(format!("Seed: {}", self.seed));
        lines.push(format!("Tolerance: {}", self.tolerance));
        lines.push(format!(
            "Total duration: {:.3}ms",
            duration_ms(self.duration)
        ));
        lines.push(String::new());
        lines.push(format!("{:<24} {:>10}", "Expansions", self.expansions));
        lines.push(format!("{:<24} {:>10}", "Candidates examined", self.candidates_examined));
        lines.push(format!("{:<24} {:>10}", "Within tolerance", self.within_tolerance));
        lines.push(format!("{:<24} {:>10}", "Duplicate matches", self.duplicates));
        lines.push(format!("{:<24} {:>10}", "Peak queue", self.peak_queue));
        lines.push(format!("{:<24} {:>10}", "Connected features", self.connected));
        lines.push(format!("{:<24} {:>10.3}", "Total length", self.total_length));
        lines.join("\n")
    }
}

fn duration_ms(d: Duration) -> f64 {
    d.as_secs_f64() * 1000.0
}

/// Run [`trace_with`] and collect [`TraceDiagnostics`] alongside the
/// result.
///
/// # Errors
///
/// Same as [`trace_with`].
pub fn trace_with_diagnostics<L, M, C>(
    layer: &L,
    seed: FeatureId,
    config: &TraceConfig,
    measure: &M,
    clock: &C,
) -> Result<(TraceResult, TraceDiagnostics), TraceError>
where
    L: LineLayer + ?Sized,
    M: Measure + ?Sized,
    C: Clock,
{
    let start = clock.now();
    let mut peak_queue = 1;
    let mut watch = |p: &TraceProgress| peak_queue = peak_queue.max(p.queued);
    let result = trace_with(
        layer,
        seed,
        config,
        measure,
        TraceControl::new().with_progress(&mut watch),
    )?;
    let duration = clock.elapsed(&start);

    let diagnostics = TraceDiagnostics {
        seed,
        duration,
        tolerance: result.tolerance,
        expansions: result.expansions,
        candidates_examined: result.candidates_examined,
        within_tolerance: result.matches.len(),
        duplicates: result.duplicates,
        peak_queue,
        connected: result.connected.len(),
        total_length: result.connected.total_length(),
    };
    Ok((result, diagnostics))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::layer::LineLayerIndex;
    use crate::provider::Planar;
    use crate::types::{Crs, LineFeature};

    /// Advances by one millisecond every time it is read.
    struct TickClock(Cell<u64>);

    impl Clock for TickClock {
        type Instant = u64;

        fn now(&self) -> u64 {
            let t = self.0.get();
            self.0.set(t + 1);
            t
        }

        fn elapsed(&self, since: &u64) -> Duration {
            Duration::from_millis(self.now() - since)
        }
    }

    fn fan_layer() -> LineLayerIndex {
        // 1 feeds three branches at (1, 0).
        LineLayerIndex::new(
            Crs::new("EPSG:25832"),
            vec![
                LineFeature::from_coords(FeatureId(1), &[(0.0, 0.0), (1.0, 0.0)]),
                LineFeature::from_coords(FeatureId(2), &[(1.0, 0.0), (2.0, 1.0)]),
                LineFeature::from_coords(FeatureId(3), &[(1.0, 0.0), (2.0, 0.0)]),
                LineFeature::from_coords(FeatureId(4), &[(1.0, 0.0), (2.0, -1.0)]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn counts_match_the_result() {
        let layer = fan_layer();
        let config = TraceConfig {
            tolerance: 0.01,
            ..TraceConfig::default()
        };
        let (result, diag) =
            trace_with_diagnostics(&layer, FeatureId(1), &config, &Planar, &TickClock(Cell::new(0)))
                .unwrap();
        assert_eq!(diag.connected, 4);
        assert_eq!(diag.connected, result.connected.len());
        assert_eq!(diag.expansions, 4);
        assert_eq!(diag.within_tolerance, 3);
        assert_eq!(diag.duplicates, 0);
        assert_eq!(diag.peak_queue, 3);
        assert_eq!(diag.duration, Duration::from_millis(1));
    }

    #[test]
    fn serializes_duration_as_seconds() {
        let layer = fan_layer();
        let (_, diag) = trace_with_diagnostics(
            &layer,
            FeatureId(1),
            &TraceConfig::default(),
            &Planar,
            &TickClock(Cell::new(0)),
        )
        .unwrap();
        let json = serde_json::to_value(&diag).unwrap();
        assert!((json["duration"].as_f64().unwrap() - 0.001).abs() < 1e-12);
        let back: TraceDiagnostics = serde_json::from_value(json).unwrap();
        assert_eq!(back.connected, diag.connected);
        assert!((back.duration.as_secs_f64() - 0.001).abs() < 1e-9);
    }

    #[test]
    fn report_mentions_counts() {
        let layer = fan_layer();
        let (_, diag) = trace_with_diagnostics(
            &layer,
            FeatureId(1),
            &TraceConfig::default(),
            &Planar,
            &TickClock(Cell::new(0)),
        )
        .unwrap();
        let report = diag.report();
        assert!(report.contains("Connected features"));
        assert!(report.contains("Total duration: 1.000ms"));
    }

    #[test]
    fn errors_pass_through() {
        let layer = fan_layer();
        let err = trace_with_diagnostics(
            &layer,
            FeatureId(99),
            &TraceConfig::default(),
            &Planar,
            &TickClock(Cell::new(0)),
        )
        .unwrap_err();
        assert_eq!(err, TraceError::NotFound(FeatureId(99)));
    }
}
