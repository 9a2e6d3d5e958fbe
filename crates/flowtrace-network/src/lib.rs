//! flowtrace-network: Directed tracing over line networks (sans-IO).
//!
//! Follows pipes, streams or any other digitized flow lines downstream or
//! upstream from a seed feature, treating two lines as connected when the
//! end of one lies within a tolerance of the start of the next:
//!
//! - [`trace()`]: breadth-first expansion into a [`ConnectedSet`] with the
//!   summed length of everything reached.
//! - [`sequence()`]: order a connected set from head to outlet.
//! - [`match_endpoints`]: find the point features (manholes, junctions)
//!   at both ends of a line.
//! - [`summarize`] and [`has_multipart`]: selection totals and data checks.
//!
//! This crate has **no I/O dependencies**: layers are borrowed through the
//! [`LineLayer`] and [`PointLayer`] traits, measurement goes through
//! [`Measure`], and timing through a caller-supplied
//! [`diagnostics::Clock`]. [`LineLayerIndex`] and [`PointLayerIndex`] are
//! R\*-tree backed in-memory layers, loadable from GeoJSON text via
//! [`geojson`].

pub mod diagnostics;
pub mod geojson;
pub mod geometry;
pub mod layer;
pub mod neighbors;
pub mod nodes;
pub mod provider;
pub mod sequence;
pub mod summary;
pub mod tolerance;
pub mod trace;
pub mod types;

pub use diagnostics::{Clock, TraceDiagnostics, trace_with_diagnostics};
pub use geojson::{parse_line_layer, parse_point_layer};
pub use geometry::{Endpoints, MultiPartPolicy};
pub use layer::{LineLayerIndex, PointLayerIndex};
pub use neighbors::{neighbors, point_neighbors};
pub use nodes::{EndpointMatch, NodeMatchConfig, NodeMatchPolicy, match_endpoints};
pub use provider::{Ellipsoidal, LineLayer, Measure, MeasureKind, Planar, PointLayer, check_crs};
pub use sequence::{HeadPolicy, OrderedSequence, SequenceConfig, sequence};
pub use summary::{SelectionSummary, has_multipart, summarize, summarize_selection};
pub use trace::{
    ConnectedSet, SearchWindow, TraceConfig, TraceControl, TraceProgress, TraceResult, TraceState,
    Tracer, trace, trace_with,
};
pub use types::{
    Crs, Direction, FeatureId, GeometryIssue, LayerError, LineFeature, Point, PointFeature, Rect,
    TraceError,
};
