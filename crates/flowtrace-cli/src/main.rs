//! flowtrace: trace, order and inspect line networks stored as GeoJSON.
//!
//! Loads a line layer (and optionally a point layer) from GeoJSON
//! `FeatureCollection` files and runs one operation on it:
//!
//! - `trace`: follow the network downstream or upstream from a seed
//! - `sequence`: order a set of lines from head to outlet
//! - `nodes`: find the point features at both ends of a line
//! - `summary`: total length and count of a set of lines
//!
//! Results are printed as a human-readable report or, with `--json`, as
//! JSON on stdout. Status messages and logs go to stderr; set `RUST_LOG`
//! or pass `-v` for more detail.
//!
//! # Usage
//!
//! ```text
//! cargo run --bin flowtrace -- trace --lines pipes.geojson --seed 17 --svg trace.svg
//! ```

#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Args, Parser, Subcommand, ValueEnum};
use flowtrace_export::{SvgMetadata, SvgStyle};
use flowtrace_network::diagnostics::Clock;
use flowtrace_network::{
    Crs, Direction, FeatureId, HeadPolicy, LineFeature, LineLayer, LineLayerIndex, MeasureKind,
    MultiPartPolicy, NodeMatchConfig, NodeMatchPolicy, PointFeature, SearchWindow,
    SequenceConfig, TraceConfig, geojson,
};
use serde::Serialize;
use serde_json::json;

/// Trace directed line networks (pipes, streams, ditches) from GeoJSON.
#[derive(Parser)]
#[command(name = "flowtrace", version)]
struct Cli {
    /// Increase log verbosity (-v: info, -vv: debug, -vvv: trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Follow the network from a seed line and report everything reached.
    Trace(TraceArgs),
    /// Order lines from head to outlet.
    Sequence(SequenceArgs),
    /// Find the point features at both ends of a line.
    Nodes(NodesArgs),
    /// Total length and count of lines, plus a multi-part check.
    Summary(SummaryArgs),
}

/// Options shared by every subcommand.
#[derive(Args)]
struct LayerArgs {
    /// GeoJSON FeatureCollection of LineString/MultiLineString features.
    #[arg(long)]
    lines: PathBuf,

    /// CRS assumed when a file does not name one.
    #[arg(long, default_value = geojson::DEFAULT_CRS)]
    default_crs: String,

    /// Output results as JSON instead of a human-readable report.
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct TraceArgs {
    #[command(flatten)]
    layer: LayerArgs,

    /// Id of the line to start from.
    #[arg(long)]
    seed: u64,

    /// Maximum endpoint distance in layer units.
    #[arg(long, default_value_t = TraceConfig::DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Flow direction to follow.
    #[arg(long, value_enum, default_value_t = Flow::Downstream)]
    direction: Flow,

    /// Treatment of multi-part lines.
    #[arg(long, value_enum, default_value_t = MultiPart::Reject)]
    multipart: MultiPart,

    /// Distance and length measurement.
    #[arg(long, value_enum, default_value_t = Measurement::Planar)]
    measure: Measurement,

    /// Size of the box searched around each endpoint.
    #[arg(long, value_enum, default_value_t = Window::Full)]
    search_window: Window,

    /// Full trace config as a JSON string.
    ///
    /// When provided, all other trace parameter flags are ignored.
    /// The JSON must be a valid `TraceConfig` serialization.
    #[arg(long)]
    config_json: Option<String>,

    /// Print timing and count diagnostics.
    #[arg(long)]
    diagnostics: bool,

    /// Order the connected lines from head to outlet as well.
    #[arg(long)]
    sequence: bool,

    /// Write the connected lines to a GeoJSON file.
    #[arg(long)]
    geojson_out: Option<PathBuf>,

    /// Write an SVG preview with the connected lines highlighted.
    #[arg(long)]
    svg: Option<PathBuf>,
}

#[derive(Args)]
struct SequenceArgs {
    #[command(flatten)]
    layer: LayerArgs,

    /// Ids of the lines to order (comma-separated). Defaults to the whole
    /// layer.
    #[arg(long, value_delimiter = ',')]
    ids: Vec<u64>,

    /// Maximum endpoint distance (inclusive) in layer units.
    #[arg(long, default_value_t = SequenceConfig::DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Flow direction defining predecessor and successor.
    #[arg(long, value_enum, default_value_t = Flow::Downstream)]
    direction: Flow,

    /// Treatment of multi-part lines.
    #[arg(long, value_enum, default_value_t = MultiPart::Reject)]
    multipart: MultiPart,

    /// Fail instead of picking the first head when several exist.
    #[arg(long)]
    strict: bool,

    /// Full sequence config as a JSON string; overrides the other flags.
    #[arg(long)]
    config_json: Option<String>,

    /// Write an SVG preview with the ordered lines highlighted.
    #[arg(long)]
    svg: Option<PathBuf>,
}

#[derive(Args)]
struct NodesArgs {
    #[command(flatten)]
    layer: LayerArgs,

    /// GeoJSON FeatureCollection of Point features.
    #[arg(long)]
    points: PathBuf,

    /// Id of the line whose endpoints are matched.
    #[arg(long)]
    line: u64,

    /// Side length of the square searched around each endpoint.
    #[arg(long, default_value_t = NodeMatchConfig::DEFAULT_TOLERANCE)]
    tolerance: f64,

    /// Pick the nearest point instead of the last one found.
    #[arg(long)]
    nearest: bool,

    /// Distance measurement used by `--nearest`.
    #[arg(long, value_enum, default_value_t = Measurement::Planar)]
    measure: Measurement,

    /// Treatment of multi-part lines.
    #[arg(long, value_enum, default_value_t = MultiPart::Reject)]
    multipart: MultiPart,

    /// Write an SVG preview with the line and its nodes highlighted.
    #[arg(long)]
    svg: Option<PathBuf>,
}

#[derive(Args)]
struct SummaryArgs {
    #[command(flatten)]
    layer: LayerArgs,

    /// Ids of the lines to total (comma-separated). Defaults to the whole
    /// layer.
    #[arg(long, value_delimiter = ',')]
    ids: Vec<u64>,

    /// Length measurement.
    #[arg(long, value_enum, default_value_t = Measurement::Planar)]
    measure: Measurement,
}

/// Flow direction selection.
#[derive(Clone, Copy, ValueEnum)]
enum Flow {
    /// Follow digitized order.
    Downstream,
    /// Walk against digitized order.
    Upstream,
}

/// Multi-part line policy selection.
#[derive(Clone, Copy, ValueEnum)]
enum MultiPart {
    /// Fail on lines with more than one part.
    Reject,
    /// Use the first part only.
    FirstPart,
}

/// Measurement selection.
#[derive(Clone, Copy, ValueEnum)]
enum Measurement {
    /// Cartesian distance in CRS units.
    Planar,
    /// Geodesic distance in metres (lon/lat input).
    Ellipsoidal,
}

/// Search window selection.
#[derive(Clone, Copy, ValueEnum)]
enum Window {
    /// Half-extent equal to the tolerance.
    Full,
    /// Half-extent of half the tolerance.
    Half,
}

const fn direction(flow: Flow) -> Direction {
    match flow {
        Flow::Downstream => Direction::Downstream,
        Flow::Upstream => Direction::Upstream,
    }
}

const fn multipart_policy(m: MultiPart) -> MultiPartPolicy {
    match m {
        MultiPart::Reject => MultiPartPolicy::Reject,
        MultiPart::FirstPart => MultiPartPolicy::FirstPart,
    }
}

const fn measure_kind(m: Measurement) -> MeasureKind {
    match m {
        Measurement::Planar => MeasureKind::Planar,
        Measurement::Ellipsoidal => MeasureKind::Ellipsoidal,
    }
}

/// Build a [`TraceConfig`] from CLI arguments.
///
/// If `--config-json` is provided, the JSON is parsed directly and all
/// individual parameter flags are ignored.
fn trace_config(args: &TraceArgs) -> Result<TraceConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    Ok(TraceConfig {
        tolerance: args.tolerance,
        direction: direction(args.direction),
        multipart: multipart_policy(args.multipart),
        measure: measure_kind(args.measure),
        search_window: match args.search_window {
            Window::Full => SearchWindow::FullTolerance,
            Window::Half => SearchWindow::HalfTolerance,
        },
    })
}

fn sequence_config(args: &SequenceArgs) -> Result<SequenceConfig, String> {
    if let Some(ref json) = args.config_json {
        return serde_json::from_str(json).map_err(|e| format!("Error parsing --config-json: {e}"));
    }
    Ok(SequenceConfig {
        tolerance: args.tolerance,
        direction: direction(args.direction),
        multipart: multipart_policy(args.multipart),
        head_policy: if args.strict {
            HeadPolicy::Strict
        } else {
            HeadPolicy::FirstWins
        },
        ..SequenceConfig::default()
    })
}

fn read_file(path: &Path) -> Result<String, String> {
    std::fs::read_to_string(path).map_err(|e| format!("Error reading {}: {e}", path.display()))
}

fn load_lines(args: &LayerArgs) -> Result<LineLayerIndex, String> {
    let text = read_file(&args.lines)?;
    let layer = geojson::parse_line_layer(&text, &Crs::new(&args.default_crs))
        .map_err(|e| format!("Error loading {}: {e}", args.lines.display()))?;
    eprintln!(
        "Lines: {} ({} features, {})",
        args.lines.display(),
        layer.len(),
        layer.crs()
    );
    Ok(layer)
}

/// Look up `ids` in `layer`, or return every feature when `ids` is empty.
fn pick<'a>(layer: &'a LineLayerIndex, ids: &[u64]) -> Result<Vec<&'a LineFeature>, String> {
    if ids.is_empty() {
        return Ok(layer.features());
    }
    ids.iter()
        .map(|&id| {
            layer
                .feature(FeatureId(id))
                .ok_or_else(|| format!("Feature {id} not found in the line layer"))
        })
        .collect()
}

fn print_json<T: Serialize>(value: &T) -> Result<(), String> {
    let json =
        serde_json::to_string_pretty(value).map_err(|e| format!("Error serializing output: {e}"))?;
    println!("{json}");
    Ok(())
}

fn write_svg(
    path: &Path,
    layer: &LineLayerIndex,
    highlight: &[FeatureId],
    points: &[&PointFeature],
    metadata: &SvgMetadata<'_>,
) -> Result<(), String> {
    let svg = flowtrace_export::to_svg_with_points(
        layer,
        highlight,
        points,
        metadata,
        &SvgStyle::default(),
    );
    std::fs::write(path, &svg)
        .map_err(|e| format!("Error writing SVG to {}: {e}", path.display()))?;
    eprintln!("SVG written to {} ({} bytes)", path.display(), svg.len());
    Ok(())
}

fn join_ids(ids: impl IntoIterator<Item = FeatureId>) -> String {
    ids.into_iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

fn run_trace(args: &TraceArgs) -> Result<(), String> {
    let config = trace_config(args)?;
    let layer = load_lines(&args.layer)?;
    let seed = FeatureId(args.seed);
    eprintln!("Config: {config:#?}");

    let (result, diagnostics) = flowtrace_network::trace_with_diagnostics(
        &layer,
        seed,
        &config,
        &config.measure,
        &StdClock,
    )
    .map_err(|e| format!("Trace error: {e}"))?;

    let ordered = if args.sequence {
        let members: Vec<&LineFeature> = result
            .connected
            .iter()
            .filter_map(|id| layer.feature(id))
            .collect();
        let sequence_config = SequenceConfig {
            tolerance: config.tolerance,
            direction: config.direction,
            multipart: config.multipart,
            measure: config.measure,
            ..SequenceConfig::default()
        };
        let ordered = flowtrace_network::sequence(&layer, &members, &sequence_config)
            .map_err(|e| format!("Sequence error: {e}"))?;
        Some(ordered.ids())
    } else {
        None
    };

    if args.layer.json {
        print_json(&json!({
            "result": result,
            "sequence": ordered,
            "diagnostics": diagnostics,
        }))?;
    } else {
        println!(
            "Trace {} from {seed} (tolerance {})",
            result.direction, result.tolerance
        );
        println!("Connected features: {}", result.connected.len());
        println!("Total length: {:.3}", result.connected.total_length());
        println!("Duplicate matches: {}", result.duplicates);
        println!("Ids: {}", join_ids(result.connected.iter()));
        if let Some(ref ordered) = ordered {
            println!("Sequence: {}", join_ids(ordered.iter().copied()));
        }
        if args.diagnostics {
            println!();
            println!("{}", diagnostics.report());
        }
    }

    if let Some(ref path) = args.geojson_out {
        let members = result.connected.iter().filter_map(|id| layer.feature(id));
        let collection = geojson::line_features_to_geojson(layer.crs(), members);
        match std::fs::write(path, collection.to_string()) {
            Ok(()) => eprintln!("GeoJSON written to {}", path.display()),
            Err(e) => return Err(format!("Error writing {}: {e}", path.display())),
        }
    }

    if let Some(ref path) = args.svg {
        let title = args
            .layer
            .lines
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("flowtrace");
        let desc = format!("{} trace from {seed}", result.direction);
        let config_json = serde_json::to_string(&config).ok();
        let metadata = SvgMetadata {
            title: Some(title),
            description: Some(&desc),
            config_json: config_json.as_deref(),
        };
        let highlight = ordered.unwrap_or_else(|| result.connected.to_vec());
        write_svg(path, &layer, &highlight, &[], &metadata)?;
    }

    Ok(())
}

fn run_sequence(args: &SequenceArgs) -> Result<(), String> {
    let config = sequence_config(args)?;
    let layer = load_lines(&args.layer)?;
    let features = pick(&layer, &args.ids)?;

    let ordered = flowtrace_network::sequence(&layer, &features, &config)
        .map_err(|e| format!("Sequence error: {e}"))?;
    let ids = ordered.ids();

    if args.layer.json {
        print_json(&json!({
            "sequence": ids,
            "ambiguous_heads_skipped": ordered.ambiguous_heads_skipped,
            "unplaced": ordered.unplaced,
        }))?;
    } else {
        println!("Sequence ({} of {}): {}", ids.len(), features.len(), join_ids(ids.iter().copied()));
        if ordered.ambiguous_heads_skipped > 0 {
            println!("Other heads skipped: {}", ordered.ambiguous_heads_skipped);
        }
        if !ordered.unplaced.is_empty() {
            println!("Unplaced: {}", join_ids(ordered.unplaced.iter().copied()));
        }
    }

    if let Some(ref path) = args.svg {
        let metadata = SvgMetadata {
            title: Some("sequence"),
            ..SvgMetadata::default()
        };
        write_svg(path, &layer, &ids, &[], &metadata)?;
    }

    Ok(())
}

fn run_nodes(args: &NodesArgs) -> Result<(), String> {
    let layer = load_lines(&args.layer)?;
    let text = read_file(&args.points)?;
    let points = geojson::parse_point_layer(&text, &Crs::new(&args.layer.default_crs))
        .map_err(|e| format!("Error loading {}: {e}", args.points.display()))?;
    eprintln!("Points: {} ({} features)", args.points.display(), points.len());

    let config = NodeMatchConfig {
        tolerance: args.tolerance,
        multipart: multipart_policy(args.multipart),
        policy: if args.nearest {
            NodeMatchPolicy::Nearest
        } else {
            NodeMatchPolicy::LastEnumerated
        },
        measure: measure_kind(args.measure),
    };

    let id = FeatureId(args.line);
    let line = layer
        .feature(id)
        .ok_or_else(|| format!("Feature {id} not found in the line layer"))?;
    let found = flowtrace_network::match_endpoints(&layer, line, &points, &config)
        .map_err(|e| format!("Node match error: {e}"))?;
    let (head, tail) = found.ids();

    if args.layer.json {
        print_json(&json!({ "line": id, "head": head, "tail": tail }))?;
    } else {
        let show = |node: Option<FeatureId>| node.map_or_else(|| "-".to_owned(), |n| n.to_string());
        println!("Line {id}: head {}, tail {}", show(head), show(tail));
    }

    if let Some(ref path) = args.svg {
        let matched: Vec<&PointFeature> = [found.head, found.tail].into_iter().flatten().collect();
        let metadata = SvgMetadata {
            title: Some("nodes"),
            ..SvgMetadata::default()
        };
        write_svg(path, &layer, &[id], &matched, &metadata)?;
    }

    Ok(())
}

fn run_summary(args: &SummaryArgs) -> Result<(), String> {
    let layer = load_lines(&args.layer)?;
    let features = pick(&layer, &args.ids)?;
    let measure = measure_kind(args.measure);
    flowtrace_network::check_crs(&measure, layer.crs())
        .map_err(|e| format!("Summary error: {e}"))?;
    let summary = flowtrace_network::summarize(features, &measure);
    let multipart = flowtrace_network::has_multipart(&layer);

    if args.layer.json {
        print_json(&json!({ "summary": summary, "layer_has_multipart": multipart }))?;
    } else {
        println!("Features: {}", summary.count);
        println!("Total length: {:.3}", summary.total_length);
        if multipart {
            println!("Layer contains multi-part lines");
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => log::LevelFilter::Warn,
        1 => log::LevelFilter::Info,
        2 => log::LevelFilter::Debug,
        _ => log::LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    let outcome = match cli.command {
        Command::Trace(ref args) => run_trace(args),
        Command::Sequence(ref args) => run_sequence(args),
        Command::Nodes(ref args) => run_nodes(args),
        Command::Summary(ref args) => run_summary(args),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(msg) => {
            eprintln!("{msg}");
            ExitCode::FAILURE
        }
    }
}

/// [`Clock`] implementation backed by [`std::time::Instant`].
struct StdClock;

impl Clock for StdClock {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn elapsed(&self, since: &Instant) -> Duration {
        since.elapsed()
    }
}
