//! Directed network tracing: breadth-first expansion over endpoint
//! adjacency.
//!
//! Starting from a seed line, the tracer repeatedly takes the next queued
//! line, looks up candidates around its flow-out endpoint, and accepts
//! every candidate whose flow-in endpoint lies strictly closer than the
//! tolerance. A distance that cannot be measured (NaN) never connects. Accepted lines that are not yet part of the
//! [`ConnectedSet`] are added to it, queued for expansion, and their
//! length is added to the running total.
//!
//! Membership in the connected set is the only cycle breaker: a line is
//! expanded at most once, so closed loops terminate.
//!
//! ```
//! # use flowtrace_network::{Crs, FeatureId, LineFeature, LineLayerIndex, TraceConfig, TraceError};
//! # fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let layer = LineLayerIndex::new(
//!     Crs::new("EPSG:25832"),
//!     vec![
//!         LineFeature::from_coords(FeatureId(1), &[(0.0, 0.0), (1.0, 0.0)]),
//!         LineFeature::from_coords(FeatureId(2), &[(1.0, 0.0), (2.0, 0.0)]),
//!     ],
//! )?;
//! let result = flowtrace_network::trace(&layer, FeatureId(1), &TraceConfig::default())?;
//! assert_eq!(result.connected.len(), 2);
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexSet;
use serde::{Deserialize, Serialize};

use crate::geometry::{Endpoints, MultiPartPolicy, endpoints};
use crate::neighbors::neighbors;
use crate::provider::{self, LineLayer, Measure, MeasureKind};
use crate::tolerance;
use crate::types::{Direction, FeatureId, LineFeature, TraceError};

/// Size of the box searched around each flow-out endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchWindow {
    /// Half-extent equal to the tolerance. Every endpoint closer than the
    /// tolerance is a candidate, so the distance test alone decides
    /// adjacency.
    #[default]
    FullTolerance,
    /// Half-extent of half the tolerance, as the legacy desktop plugin
    /// queried it. Endpoints further than `tolerance / 2` along either
    /// axis are never found, whatever the distance test says.
    HalfTolerance,
}

impl SearchWindow {
    /// Half-extent of the search box for `tolerance`.
    #[must_use]
    pub fn half_extent(self, tolerance: f64) -> f64 {
        match self {
            Self::FullTolerance => tolerance,
            Self::HalfTolerance => tolerance / 2.0,
        }
    }
}

/// Configuration for a trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Maximum endpoint distance, in layer units, for two lines to count
    /// as connected. Overridden for geographic layers, see
    /// [`tolerance::resolve`].
    pub tolerance: f64,

    /// Flow direction to follow.
    pub direction: Direction,

    /// How to treat multi-part lines.
    pub multipart: MultiPartPolicy,

    /// How distances and lengths are measured.
    pub measure: MeasureKind,

    /// Size of the candidate search box.
    pub search_window: SearchWindow,
}

impl TraceConfig {
    /// Default tolerance in layer units.
    pub const DEFAULT_TOLERANCE: f64 = 0.1;
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            tolerance: Self::DEFAULT_TOLERANCE,
            direction: Direction::default(),
            multipart: MultiPartPolicy::default(),
            measure: MeasureKind::default(),
            search_window: SearchWindow::default(),
        }
    }
}

/// Lifecycle of a [`Tracer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TraceState {
    /// Created, nothing expanded yet.
    Idle,
    /// At least one line expanded, more are queued.
    Expanding,
    /// The work queue is empty.
    Done,
}

/// Identifiers reached by a trace, without duplicates, plus the summed
/// length of every line added after the seed.
///
/// Iteration yields identifiers in discovery order (seed first).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectedSet {
    members: IndexSet<FeatureId>,
    total_length: f64,
}

impl ConnectedSet {
    fn seeded(seed: FeatureId) -> Self {
        let mut members = IndexSet::new();
        members.insert(seed);
        Self {
            members,
            total_length: 0.0,
        }
    }

    /// Add `id` with its length. Returns `false` if it was already present.
    fn insert(&mut self, id: FeatureId, length: f64) -> bool {
        if self.members.insert(id) {
            self.total_length += length;
            true
        } else {
            false
        }
    }

    /// Returns `true` if `id` was reached.
    #[must_use]
    pub fn contains(&self, id: FeatureId) -> bool {
        self.members.contains(&id)
    }

    /// Number of identifiers, seed included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.members.len()
    }

    /// Never true for a set produced by a trace (the seed is always in).
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Summed length of the lines added after the seed.
    #[must_use]
    pub const fn total_length(&self) -> f64 {
        self.total_length
    }

    /// Identifiers in discovery order.
    pub fn iter(&self) -> impl Iterator<Item = FeatureId> + '_ {
        self.members.iter().copied()
    }

    /// Identifiers in discovery order, collected.
    #[must_use]
    pub fn to_vec(&self) -> Vec<FeatureId> {
        self.iter().collect()
    }
}

/// Snapshot handed to the progress callback after every expansion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TraceProgress {
    /// Lines expanded so far.
    pub expanded: usize,
    /// Lines waiting in the work queue.
    pub queued: usize,
    /// Size of the connected set.
    pub connected: usize,
    /// Running total length.
    pub total_length: f64,
}

/// Cancellation and progress hooks for [`trace_with`].
#[derive(Default)]
pub struct TraceControl<'a> {
    cancel: Option<&'a AtomicBool>,
    progress: Option<&'a mut dyn FnMut(&TraceProgress)>,
}

impl<'a> TraceControl<'a> {
    /// No cancellation, no progress reporting.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Abort with [`TraceError::Cancelled`] once `flag` is set.
    ///
    /// The flag is checked before every expansion.
    #[must_use]
    pub fn with_cancel(mut self, flag: &'a AtomicBool) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Call `callback` after every expansion.
    #[must_use]
    pub fn with_progress(mut self, callback: &'a mut dyn FnMut(&TraceProgress)) -> Self {
        self.progress = Some(callback);
        self
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn report(&mut self, progress: &TraceProgress) {
        if let Some(callback) = self.progress.as_mut() {
            callback(progress);
        }
    }
}

/// Result of a completed trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceResult {
    /// Feature the trace started from.
    pub seed: FeatureId,
    /// Direction that was followed.
    pub direction: Direction,
    /// Tolerance actually applied, after the CRS override.
    pub tolerance: f64,
    /// Lines reached, and their summed length.
    pub connected: ConnectedSet,
    /// Every accepted candidate in the order it was accepted, including
    /// candidates that were already connected.
    pub matches: Vec<FeatureId>,
    /// Entries of `matches` whose line was already connected when matched.
    pub duplicates: usize,
    /// Lines expanded (equal to `connected.len()` on completion).
    pub expansions: usize,
    /// Candidates returned by all neighbor queries.
    pub candidates_examined: usize,
}

/// Breadth-first tracer that can be driven one expansion at a time.
pub struct Tracer<'a, L: ?Sized, M: ?Sized> {
    layer: &'a L,
    measure: &'a M,
    seed: FeatureId,
    direction: Direction,
    multipart: MultiPartPolicy,
    tolerance: f64,
    distance_limit: f64,
    half_extent: f64,
    state: TraceState,
    queue: VecDeque<FeatureId>,
    connected: ConnectedSet,
    matches: Vec<FeatureId>,
    duplicates: usize,
    expansions: usize,
    candidates_examined: usize,
}

impl<'a, L: LineLayer + ?Sized, M: Measure + ?Sized> Tracer<'a, L, M> {
    /// Prepare a trace from `seed`.
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::InvalidTolerance`] for an unusable tolerance,
    /// [`TraceError::ProjectedCrs`] if `measure` does not fit the layer
    /// CRS, [`TraceError::NotFound`] if the seed is not in the layer, and
    /// [`TraceError::InvalidGeometry`] if the seed is not a usable line.
    pub fn new(
        layer: &'a L,
        seed: FeatureId,
        config: &TraceConfig,
        measure: &'a M,
    ) -> Result<Self, TraceError> {
        provider::check_crs(measure, layer.crs())?;
        let tolerance = tolerance::effective(layer.crs(), config.tolerance)?;
        let feature = layer.feature(seed).ok_or(TraceError::NotFound(seed))?;
        line_endpoints(feature, config.multipart)?;

        let mut queue = VecDeque::new();
        queue.push_back(seed);

        Ok(Self {
            layer,
            measure,
            seed,
            direction: config.direction,
            multipart: config.multipart,
            tolerance,
            distance_limit: measure.tolerance_in_measure_units(tolerance),
            half_extent: config.search_window.half_extent(tolerance),
            state: TraceState::Idle,
            queue,
            connected: ConnectedSet::seeded(seed),
            matches: Vec::new(),
            duplicates: 0,
            expansions: 0,
            candidates_examined: 0,
        })
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> TraceState {
        self.state
    }

    /// Lines reached so far.
    #[must_use]
    pub const fn connected(&self) -> &ConnectedSet {
        &self.connected
    }

    /// Snapshot of the current progress.
    #[must_use]
    pub fn progress(&self) -> TraceProgress {
        TraceProgress {
            expanded: self.expansions,
            queued: self.queue.len(),
            connected: self.connected.len(),
            total_length: self.connected.total_length(),
        }
    }

    /// Expand the next queued line and return the resulting state.
    ///
    /// Calling `step` on a finished tracer is a no-op returning
    /// [`TraceState::Done`].
    ///
    /// # Errors
    ///
    /// Returns [`TraceError::NotFound`] if a queued line vanished from the
    /// layer and [`TraceError::InvalidGeometry`] if the expanded line or
    /// one of its candidates is not a usable line.
    pub fn step(&mut self) -> Result<TraceState, TraceError> {
        let Some(current) = self.queue.pop_front() else {
            self.state = TraceState::Done;
            return Ok(self.state);
        };
        self.state = TraceState::Expanding;

        let feature = self
            .layer
            .feature(current)
            .ok_or(TraceError::NotFound(current))?;
        let outflow = line_endpoints(feature, self.multipart)?.flow_out(self.direction);

        let candidates = neighbors(self.layer, outflow, self.half_extent);
        log::debug!(
            "expanding {current}: {} candidates around ({}, {})",
            candidates.len(),
            outflow.x,
            outflow.y,
        );

        for candidate in candidates {
            self.candidates_examined += 1;
            let inflow = line_endpoints(candidate, self.multipart)?.flow_in(self.direction);
            if self.measure.distance(inflow, outflow) < self.distance_limit {
                self.matches.push(candidate.id);
                let length = self.measure.path_length(&candidate.geometry);
                if self.connected.insert(candidate.id, length) {
                    self.queue.push_back(candidate.id);
                } else {
                    self.duplicates += 1;
                    log::debug!("{} matched again from {current}", candidate.id);
                }
            }
        }

        self.expansions += 1;
        if self.queue.is_empty() {
            self.state = TraceState::Done;
        }
        Ok(self.state)
    }

    /// Consume the tracer and return what it found so far.
    #[must_use]
    pub fn finish(self) -> TraceResult {
        TraceResult {
            seed: self.seed,
            direction: self.direction,
            tolerance: self.tolerance,
            connected: self.connected,
            matches: self.matches,
            duplicates: self.duplicates,
            expansions: self.expansions,
            candidates_examined: self.candidates_examined,
        }
    }
}

fn line_endpoints(
    feature: &LineFeature,
    policy: MultiPartPolicy,
) -> Result<Endpoints, TraceError> {
    endpoints(&feature.geometry, policy).map_err(|reason| TraceError::InvalidGeometry {
        id: feature.id,
        reason,
    })
}

/// Trace the network from `seed` using the measure named in `config`.
///
/// # Errors
///
/// See [`trace_with`].
pub fn trace<L: LineLayer + ?Sized>(
    layer: &L,
    seed: FeatureId,
    config: &TraceConfig,
) -> Result<TraceResult, TraceError> {
    trace_with(layer, seed, config, &config.measure, TraceControl::new())
}

/// Trace the network from `seed` with an explicit measure and hooks.
///
/// # Errors
///
/// Returns [`TraceError::InvalidTolerance`], [`TraceError::ProjectedCrs`],
/// [`TraceError::NotFound`] or [`TraceError::InvalidGeometry`] as
/// described on [`Tracer::new`] and
/// [`Tracer::step`], and [`TraceError::Cancelled`] if the cancellation
/// flag is raised before the queue empties.
pub fn trace_with<L: LineLayer + ?Sized, M: Measure + ?Sized>(
    layer: &L,
    seed: FeatureId,
    config: &TraceConfig,
    measure: &M,
    mut control: TraceControl<'_>,
) -> Result<TraceResult, TraceError> {
    let mut tracer = Tracer::new(layer, seed, config, measure)?;

    while tracer.state() != TraceState::Done {
        if control.is_cancelled() {
            log::info!(
                "trace from {seed} cancelled after {} expansions",
                tracer.progress().expanded
            );
            return Err(TraceError::Cancelled);
        }
        tracer.step()?;
        control.report(&tracer.progress());
    }

    let result = tracer.finish();
    log::info!(
        "trace {} from {seed}: {} features, total length {:.3}, {} duplicate matches",
        result.direction,
        result.connected.len(),
        result.connected.total_length(),
        result.duplicates,
    );
    Ok(result)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::layer::LineLayerIndex;
    use crate::provider::Planar;
    use crate::types::Crs;

    fn layer(crs: &str, lines: &[(u64, &[(f64, f64)])]) -> LineLayerIndex {
        let features = lines
            .iter()
            .map(|(id, coords)| LineFeature::from_coords(FeatureId(*id), coords))
            .collect();
        LineLayerIndex::new(Crs::new(crs), features).unwrap()
    }

    /// S1(0,0 -> 1,0), S2(1,0 -> 2,0), S3(2,0 -> 3,0).
    fn collinear() -> LineLayerIndex {
        layer(
            "EPSG:25832",
            &[
                (1, &[(0.0, 0.0), (1.0, 0.0)]),
                (2, &[(1.0, 0.0), (2.0, 0.0)]),
                (3, &[(2.0, 0.0), (3.0, 0.0)]),
            ],
        )
    }

    fn config(tolerance: f64, direction: Direction) -> TraceConfig {
        TraceConfig {
            tolerance,
            direction,
            ..TraceConfig::default()
        }
    }

    #[test]
    fn downstream_reaches_whole_chain() {
        let result = trace(&collinear(), FeatureId(1), &config(0.01, Direction::Downstream)).unwrap();
        assert_eq!(
            result.connected.to_vec(),
            vec![FeatureId(1), FeatureId(2), FeatureId(3)]
        );
        assert_relative_eq!(result.connected.total_length(), 2.0);
        assert_eq!(result.duplicates, 0);
        assert_eq!(result.expansions, 3);
    }

    #[test]
    fn upstream_walks_against_digitized_order() {
        let result = trace(&collinear(), FeatureId(3), &config(0.01, Direction::Upstream)).unwrap();
        assert_eq!(
            result.connected.to_vec(),
            vec![FeatureId(3), FeatureId(2), FeatureId(1)]
        );
        assert_relative_eq!(result.connected.total_length(), 2.0);
    }

    #[test]
    fn upstream_from_the_source_finds_nothing() {
        let result = trace(&collinear(), FeatureId(1), &config(0.01, Direction::Upstream)).unwrap();
        assert_eq!(result.connected.to_vec(), vec![FeatureId(1)]);
        assert_relative_eq!(result.connected.total_length(), 0.0);
    }

    #[test]
    fn isolated_seed_yields_only_itself() {
        let layer = layer(
            "EPSG:25832",
            &[(1, &[(0.0, 0.0), (1.0, 0.0)]), (2, &[(5.0, 5.0), (6.0, 5.0)])],
        );
        let result = trace(&layer, FeatureId(1), &config(0.5, Direction::Downstream)).unwrap();
        assert_eq!(result.connected.to_vec(), vec![FeatureId(1)]);
        assert_relative_eq!(result.connected.total_length(), 0.0);
        assert!(result.matches.is_empty());
    }

    #[test]
    fn closed_loop_terminates() {
        let layer = layer(
            "EPSG:25832",
            &[(1, &[(0.0, 0.0), (1.0, 0.0)]), (2, &[(1.0, 0.0), (0.0, 0.0)])],
        );
        let result = trace(&layer, FeatureId(1), &config(0.01, Direction::Downstream)).unwrap();
        assert_eq!(result.connected.len(), 2);
        assert!(result.connected.contains(FeatureId(1)));
        assert!(result.connected.contains(FeatureId(2)));
        // B -> A closes the loop: A is matched again but not re-expanded.
        assert_eq!(result.matches, vec![FeatureId(2), FeatureId(1)]);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.expansions, 2);
        assert_relative_eq!(result.connected.total_length(), 1.0);
    }

    #[test]
    fn braided_reach_counts_duplicates_once_in_the_set() {
        // 1 splits into 2 and 3, which rejoin into 4.
        let layer = layer(
            "EPSG:25832",
            &[
                (1, &[(0.0, 0.0), (1.0, 0.0)]),
                (2, &[(1.0, 0.0), (2.0, 1.0), (3.0, 0.0)]),
                (3, &[(1.0, 0.0), (2.0, -1.0), (3.0, 0.0)]),
                (4, &[(3.0, 0.0), (4.0, 0.0)]),
            ],
        );
        let result = trace(&layer, FeatureId(1), &config(0.01, Direction::Downstream)).unwrap();
        assert_eq!(result.connected.len(), 4);
        assert_eq!(result.duplicates, 1);
        assert_eq!(result.matches.len() - result.duplicates, result.connected.len() - 1);
        let branch = 2.0 * 2.0_f64.sqrt();
        assert_relative_eq!(result.connected.total_length(), 2.0 * branch + 1.0);
    }

    #[test]
    fn tolerance_boundary_is_strict() {
        let exact = layer(
            "EPSG:25832",
            &[(1, &[(0.0, 0.0), (1.0, 0.0)]), (2, &[(1.5, 0.0), (3.0, 0.0)])],
        );
        let result = trace(&exact, FeatureId(1), &config(0.5, Direction::Downstream)).unwrap();
        assert_eq!(result.connected.len(), 1);

        let inside = layer(
            "EPSG:25832",
            &[
                (1, &[(0.0, 0.0), (1.0, 0.0)]),
                (2, &[(1.5 - 1e-9, 0.0), (3.0, 0.0)]),
            ],
        );
        let result = trace(&inside, FeatureId(1), &config(0.5, Direction::Downstream)).unwrap();
        assert_eq!(result.connected.len(), 2);
    }

    #[test]
    fn half_tolerance_window_misses_distant_endpoints() {
        let layer = layer(
            "EPSG:25832",
            &[(1, &[(0.0, 0.0), (1.0, 0.0)]), (2, &[(1.4, 0.0), (3.0, 0.0)])],
        );
        let full = trace(&layer, FeatureId(1), &config(0.5, Direction::Downstream)).unwrap();
        assert_eq!(full.connected.len(), 2);

        let legacy = TraceConfig {
            search_window: SearchWindow::HalfTolerance,
            ..config(0.5, Direction::Downstream)
        };
        let half = trace(&layer, FeatureId(1), &legacy).unwrap();
        assert_eq!(half.connected.len(), 1);
    }

    #[test]
    fn nad83_layer_uses_fixed_tolerance() {
        // 0.001 degrees apart: connected with the requested 5.0, but the
        // override shrinks the tolerance to 0.0001.
        let layer = layer(
            "EPSG:4269",
            &[
                (1, &[(-90.0, 40.0), (-89.99, 40.0)]),
                (2, &[(-89.989, 40.0), (-89.98, 40.0)]),
            ],
        );
        let result = trace(&layer, FeatureId(1), &config(5.0, Direction::Downstream)).unwrap();
        assert_relative_eq!(result.tolerance, 0.0001);
        assert_eq!(result.connected.len(), 1);
    }

    #[test]
    fn missing_seed_is_not_found() {
        let err = trace(&collinear(), FeatureId(42), &TraceConfig::default()).unwrap_err();
        assert_eq!(err, TraceError::NotFound(FeatureId(42)));
    }

    #[test]
    fn negative_tolerance_is_rejected() {
        let err = trace(&collinear(), FeatureId(1), &config(-1.0, Direction::Downstream)).unwrap_err();
        assert_eq!(err, TraceError::InvalidTolerance(-1.0));
    }

    #[test]
    fn multipart_candidate_fails_the_trace() {
        let multi = geo::MultiLineString::new(vec![
            geo::LineString::from(vec![(1.0, 0.0), (2.0, 0.0)]),
            geo::LineString::from(vec![(7.0, 0.0), (8.0, 0.0)]),
        ]);
        let layer = LineLayerIndex::new(
            Crs::new("EPSG:25832"),
            vec![
                LineFeature::from_coords(FeatureId(1), &[(0.0, 0.0), (1.0, 0.0)]),
                LineFeature::new(FeatureId(2), multi),
            ],
        )
        .unwrap();

        let err = trace(&layer, FeatureId(1), &config(0.01, Direction::Downstream)).unwrap_err();
        assert!(matches!(err, TraceError::InvalidGeometry { id: FeatureId(2), .. }));

        let lenient = TraceConfig {
            multipart: MultiPartPolicy::FirstPart,
            ..config(0.01, Direction::Downstream)
        };
        let result = trace(&layer, FeatureId(1), &lenient).unwrap();
        assert_eq!(result.connected.len(), 2);
        // Length covers every part, not only the first.
        assert_relative_eq!(result.connected.total_length(), 2.0);
    }

    #[test]
    fn connected_set_never_shrinks() {
        let mut sizes = Vec::new();
        let mut record = |p: &TraceProgress| sizes.push((p.connected, p.total_length));
        let control = TraceControl::new().with_progress(&mut record);
        trace_with(
            &collinear(),
            FeatureId(1),
            &config(0.01, Direction::Downstream),
            &Planar,
            control,
        )
        .unwrap();

        assert_eq!(sizes.len(), 3);
        for pair in sizes.windows(2) {
            assert!(pair[1].0 >= pair[0].0);
            assert!(pair[1].1 >= pair[0].1);
        }
    }

    #[test]
    fn cancellation_stops_the_trace() {
        let cancel = AtomicBool::new(false);
        let mut stop_after_first = |_: &TraceProgress| cancel.store(true, Ordering::Relaxed);
        let control = TraceControl::new()
            .with_cancel(&cancel)
            .with_progress(&mut stop_after_first);
        let err = trace_with(
            &collinear(),
            FeatureId(1),
            &config(0.01, Direction::Downstream),
            &Planar,
            control,
        )
        .unwrap_err();
        assert_eq!(err, TraceError::Cancelled);
    }

    #[test]
    fn tracer_moves_through_states() {
        let layer = collinear();
        let config = config(0.01, Direction::Downstream);
        let mut tracer = Tracer::new(&layer, FeatureId(1), &config, &Planar).unwrap();
        assert_eq!(tracer.state(), TraceState::Idle);
        assert_eq!(tracer.step().unwrap(), TraceState::Expanding);
        assert_eq!(tracer.step().unwrap(), TraceState::Expanding);
        assert_eq!(tracer.step().unwrap(), TraceState::Done);
        assert_eq!(tracer.step().unwrap(), TraceState::Done);
        assert_eq!(tracer.finish().connected.len(), 3);
    }

    /// Measure that cannot measure anything.
    struct Unmeasurable;

    impl Measure for Unmeasurable {
        fn distance(&self, _: crate::types::Point, _: crate::types::Point) -> f64 {
            f64::NAN
        }

        fn path_length(&self, _: &geo::Geometry<f64>) -> f64 {
            f64::NAN
        }
    }

    #[test]
    fn unmeasurable_distance_never_connects() {
        let result = trace_with(
            &collinear(),
            FeatureId(1),
            &config(0.01, Direction::Downstream),
            &Unmeasurable,
            TraceControl::new(),
        )
        .unwrap();
        assert_eq!(result.connected.to_vec(), vec![FeatureId(1)]);
        assert!(result.matches.is_empty());
        assert_relative_eq!(result.connected.total_length(), 0.0);
    }

    #[test]
    fn ellipsoidal_on_projected_layer_is_rejected() {
        let config = TraceConfig {
            measure: MeasureKind::Ellipsoidal,
            ..config(1000.0, Direction::Downstream)
        };
        let err = trace(&collinear(), FeatureId(1), &config).unwrap_err();
        assert_eq!(err, TraceError::ProjectedCrs(Crs::new("EPSG:25832")));
    }

    #[test]
    fn nad83_planar_and_ellipsoidal_agree() {
        // 1e-5 degrees of longitude apart, about 0.85 m at 40N.
        let layer = layer(
            "EPSG:4269",
            &[
                (1, &[(-100.0, 40.0), (-99.999, 40.0)]),
                (2, &[(-99.998_99, 40.0), (-99.998, 40.0)]),
            ],
        );
        for measure in [MeasureKind::Planar, MeasureKind::Ellipsoidal] {
            let config = TraceConfig {
                measure,
                ..config(0.1, Direction::Downstream)
            };
            let result = trace(&layer, FeatureId(1), &config).unwrap();
            assert_eq!(
                result.connected.to_vec(),
                vec![FeatureId(1), FeatureId(2)],
                "{measure:?}"
            );
            assert!(result.connected.total_length().is_finite());
        }
    }

    #[test]
    fn nad83_ellipsoidal_gap_beyond_tolerance_stays_apart() {
        // 1e-3 degrees of longitude apart, about 85 m at 40N.
        let layer = layer(
            "EPSG:4269",
            &[
                (1, &[(-100.0, 40.0), (-99.999, 40.0)]),
                (2, &[(-99.998, 40.0), (-99.997, 40.0)]),
            ],
        );
        let config = TraceConfig {
            measure: MeasureKind::Ellipsoidal,
            ..config(0.1, Direction::Downstream)
        };
        let result = trace(&layer, FeatureId(1), &config).unwrap();
        assert_eq!(result.connected.to_vec(), vec![FeatureId(1)]);
    }
}
