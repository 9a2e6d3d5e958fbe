//! SVG export serializer.
//!
//! Draws every line of a layer as a `<path>` element, with a chosen set
//! of features (a trace result or an ordered sequence) drawn on top in a
//! highlight color. Layer coordinates are scaled into a fixed-width
//! document and the y axis is flipped, since map y grows northwards and
//! SVG y grows downwards.
//!
//! Optional [`SvgMetadata`] embeds `<title>`, `<desc>` and the trace
//! configuration as JSON so exported previews are self-describing.
//!
//! This is a pure function with no I/O -- it returns a `String`.

use std::collections::HashSet;

use geo::{BoundingRect, Coord, Geometry, LineString};
use svg::Document;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Description, Element, Path, Title};
use svg::node::{Node, Text, Value};

use flowtrace_network::{FeatureId, LineFeature, LineLayer, PointFeature};

/// Metadata to embed in the SVG document.
///
/// All fields are optional. Text values are XML-escaped automatically by
/// the `svg` crate.
#[derive(Debug, Clone, Default)]
pub struct SvgMetadata<'a> {
    /// Document title, emitted as `<title>`.
    pub title: Option<&'a str>,

    /// Document description, emitted as `<desc>`.
    pub description: Option<&'a str>,

    /// Serialized trace configuration, emitted inside a `<metadata>`
    /// element wrapped in a namespaced `<flowtrace:config>` element.
    pub config_json: Option<&'a str>,
}

/// Colors and sizes used by [`to_svg`].
#[derive(Debug, Clone, PartialEq)]
pub struct SvgStyle {
    /// Document width in user units; the height follows the layer's
    /// aspect ratio.
    pub width: f64,
    /// Blank border around the drawing.
    pub margin: f64,
    /// Stroke color of lines that are not highlighted.
    pub base_color: String,
    /// Stroke width of lines that are not highlighted.
    pub base_width: f64,
    /// Stroke color of highlighted lines.
    pub highlight_color: String,
    /// Stroke width of highlighted lines.
    pub highlight_width: f64,
    /// Fill color of point markers.
    pub point_color: String,
    /// Radius of point markers.
    pub point_radius: f64,
}

impl SvgStyle {
    /// Default document width.
    pub const DEFAULT_WIDTH: f64 = 800.0;
    /// Default margin.
    pub const DEFAULT_MARGIN: f64 = 10.0;
    /// Default color of ordinary lines.
    pub const DEFAULT_BASE_COLOR: &'static str = "#9e9e9e";
    /// Default width of ordinary lines.
    pub const DEFAULT_BASE_WIDTH: f64 = 1.0;
    /// Default color of highlighted lines.
    pub const DEFAULT_HIGHLIGHT_COLOR: &'static str = "#d32f2f";
    /// Default width of highlighted lines.
    pub const DEFAULT_HIGHLIGHT_WIDTH: f64 = 3.0;
    /// Default color of point markers.
    pub const DEFAULT_POINT_COLOR: &'static str = "#1565c0";
    /// Default radius of point markers.
    pub const DEFAULT_POINT_RADIUS: f64 = 4.0;
}

impl Default for SvgStyle {
    fn default() -> Self {
        Self {
            width: Self::DEFAULT_WIDTH,
            margin: Self::DEFAULT_MARGIN,
            base_color: Self::DEFAULT_BASE_COLOR.to_owned(),
            base_width: Self::DEFAULT_BASE_WIDTH,
            highlight_color: Self::DEFAULT_HIGHLIGHT_COLOR.to_owned(),
            highlight_width: Self::DEFAULT_HIGHLIGHT_WIDTH,
            point_color: Self::DEFAULT_POINT_COLOR.to_owned(),
            point_radius: Self::DEFAULT_POINT_RADIUS,
        }
    }
}

/// Mapping from layer coordinates to document coordinates.
#[derive(Debug, Clone, Copy)]
struct Frame {
    min_x: f64,
    max_y: f64,
    scale: f64,
    margin: f64,
    width: f64,
    height: f64,
}

impl Frame {
    fn fit(bounds: Option<geo::Rect<f64>>, style: &SvgStyle) -> Self {
        let inner = (style.width - 2.0 * style.margin).max(1.0);
        let Some(bounds) = bounds else {
            return Self {
                min_x: 0.0,
                max_y: 0.0,
                scale: 1.0,
                margin: style.margin,
                width: style.width,
                height: style.width,
            };
        };
        let span = bounds.width().max(bounds.height());
        let scale = if span > 0.0 { inner / span } else { 1.0 };
        Self {
            min_x: bounds.min().x,
            max_y: bounds.max().y,
            scale,
            margin: style.margin,
            width: style.width,
            height: bounds.height().mul_add(scale, 2.0 * style.margin),
        }
    }

    fn project(&self, c: Coord<f64>) -> (f64, f64) {
        (
            (c.x - self.min_x).mul_add(self.scale, self.margin),
            (self.max_y - c.y).mul_add(self.scale, self.margin),
        )
    }
}

fn union(a: Option<geo::Rect<f64>>, b: Option<geo::Rect<f64>>) -> Option<geo::Rect<f64>> {
    match (a, b) {
        (Some(a), Some(b)) => Some(geo::Rect::new(
            Coord {
                x: a.min().x.min(b.min().x),
                y: a.min().y.min(b.min().y),
            },
            Coord {
                x: a.max().x.max(b.max().x),
                y: a.max().y.max(b.max().y),
            },
        )),
        (a, b) => a.or(b),
    }
}

/// Build an SVG path `d` attribute string from a line geometry.
///
/// Each part with at least two vertices becomes one `M ... L ...`
/// subpath, with `project` applied to every vertex. Returns an empty
/// string when nothing is drawable (non-line geometries, parts with fewer
/// than two vertices).
///
/// # Examples
///
/// ```
/// use flowtrace_export::build_path_data;
/// use geo::{Geometry, line_string};
///
/// let line = Geometry::LineString(line_string![(x: 10.0, y: 20.0), (x: 30.0, y: 40.0)]);
/// assert_eq!(build_path_data(&line, |c| (c.x, c.y)), "M10,20 L30,40");
/// ```
#[must_use]
pub fn build_path_data(geometry: &Geometry<f64>, project: impl Fn(Coord<f64>) -> (f64, f64)) -> String {
    let parts: Vec<LineString<f64>> = match geometry {
        Geometry::Line(line) => vec![LineString::from(*line)],
        Geometry::LineString(line) => vec![line.clone()],
        Geometry::MultiLineString(multi) => multi.0.clone(),
        _ => Vec::new(),
    };

    let mut data = Data::new();
    let mut drawn = false;
    for part in parts.iter().filter(|p| p.0.len() >= 2) {
        let mut coords = part.coords().copied();
        if let Some(first) = coords.next() {
            data = data.move_to(project(first));
            for c in coords {
                data = data.line_to(project(c));
            }
            drawn = true;
        }
    }
    if drawn {
        String::from(Value::from(data))
    } else {
        String::new()
    }
}

fn line_path(feature: &LineFeature, frame: &Frame, color: &str, width: f64) -> Option<Path> {
    let d = build_path_data(&feature.geometry, |c| frame.project(c));
    if d.is_empty() {
        return None;
    }
    Some(
        Path::new()
            .set("d", d)
            .set("fill", "none")
            .set("stroke", color)
            .set("stroke-width", width)
            .set("data-id", feature.id.to_string()),
    )
}

/// Serialize a line layer as an SVG document string.
///
/// Features listed in `highlight` are drawn last, in the listed order,
/// with the highlight style. Unknown ids in `highlight` are skipped.
#[must_use]
pub fn to_svg<L: LineLayer + ?Sized>(
    layer: &L,
    highlight: &[FeatureId],
    metadata: &SvgMetadata<'_>,
    style: &SvgStyle,
) -> String {
    to_svg_with_points(layer, highlight, &[], metadata, style)
}

/// Like [`to_svg`], with point markers (for example matched manholes)
/// drawn on top of the lines.
#[must_use]
pub fn to_svg_with_points<L: LineLayer + ?Sized>(
    layer: &L,
    highlight: &[FeatureId],
    points: &[&PointFeature],
    metadata: &SvgMetadata<'_>,
    style: &SvgStyle,
) -> String {
    let features = layer.features();
    let bounds = features
        .iter()
        .map(|f| f.geometry.bounding_rect())
        .chain(points.iter().map(|p| {
            let c = Coord::from(p.point);
            Some(geo::Rect::new(c, c))
        }))
        .fold(None, union);
    let frame = Frame::fit(bounds, style);

    let mut doc = Document::new()
        .set("width", frame.width)
        .set("height", frame.height)
        .set("viewBox", format!("0 0 {} {}", frame.width, frame.height));

    if let Some(title) = metadata.title {
        doc = doc.add(Title::new(title));
    }

    if let Some(description) = metadata.description {
        doc = doc.add(Description::new().add(Text::new(description)));
    }

    if let Some(config_json) = metadata.config_json {
        let mut config_el = Element::new("flowtrace:config");
        config_el.assign("xmlns:flowtrace", "urn:flowtrace:ns:1");
        config_el.append(Text::new(config_json));
        let mut metadata_el = Element::new("metadata");
        metadata_el.append(config_el);
        doc = doc.add(metadata_el);
    }

    let highlighted: HashSet<FeatureId> = highlight.iter().copied().collect();
    for feature in features.iter().filter(|f| !highlighted.contains(&f.id)) {
        if let Some(path) = line_path(feature, &frame, &style.base_color, style.base_width) {
            doc = doc.add(path);
        }
    }
    for feature in highlight.iter().filter_map(|id| layer.feature(*id)) {
        if let Some(path) =
            line_path(feature, &frame, &style.highlight_color, style.highlight_width)
        {
            doc = doc.add(path);
        }
    }

    for point in points {
        let (cx, cy) = frame.project(Coord::from(point.point));
        doc = doc.add(
            Circle::new()
                .set("cx", cx)
                .set("cy", cy)
                .set("r", style.point_radius)
                .set("fill", style.point_color.as_str())
                .set("data-id", point.id.to_string()),
        );
    }

    // The svg crate omits the XML declaration, so we prepend it.
    format!("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n{doc}\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use flowtrace_network::{Crs, LineLayerIndex, Point};
    use geo::{MultiLineString, line_string};

    use super::*;

    fn no_meta() -> SvgMetadata<'static> {
        SvgMetadata::default()
    }

    fn style(width: f64, margin: f64) -> SvgStyle {
        SvgStyle {
            width,
            margin,
            ..SvgStyle::default()
        }
    }

    fn layer(lines: &[(u64, &[(f64, f64)])]) -> LineLayerIndex {
        LineLayerIndex::new(
            Crs::new("EPSG:25832"),
            lines
                .iter()
                .map(|(id, coords)| LineFeature::from_coords(FeatureId(*id), coords))
                .collect(),
        )
        .unwrap()
    }

    // --- build_path_data ---

    #[test]
    fn build_path_data_single_vertex_is_empty() {
        let line = Geometry::LineString(line_string![(x: 5.0, y: 5.0)]);
        assert_eq!(build_path_data(&line, |c| (c.x, c.y)), "");
    }

    #[test]
    fn build_path_data_point_is_empty() {
        let point = Geometry::Point(geo::Point::new(1.0, 1.0));
        assert_eq!(build_path_data(&point, |c| (c.x, c.y)), "");
    }

    #[test]
    fn build_path_data_multiline_has_one_subpath_per_part() {
        let multi = Geometry::MultiLineString(MultiLineString::new(vec![
            line_string![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0)],
            line_string![(x: 5.0, y: 5.0), (x: 6.0, y: 5.0), (x: 7.0, y: 6.0)],
        ]));
        assert_eq!(
            build_path_data(&multi, |c| (c.x, c.y)),
            "M0,0 L1,0 M5,5 L6,5 L7,6"
        );
    }

    // --- to_svg ---

    #[test]
    fn empty_layer_produces_valid_svg_with_no_paths() {
        let svg = to_svg(&layer(&[]), &[], &no_meta(), &style(100.0, 10.0));
        assert!(svg.contains(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(svg.contains(r#"width="100""#));
        assert!(svg.contains(r#"viewBox="0 0 100 100""#));
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn coordinates_are_scaled_and_flipped() {
        let svg = to_svg(
            &layer(&[(1, &[(0.0, 0.0), (10.0, 10.0)])]),
            &[],
            &no_meta(),
            &style(120.0, 10.0),
        );
        assert!(svg.contains(r#"d="M10,110 L110,10""#), "{svg}");
        assert!(svg.contains(r#"height="120""#));
    }

    #[test]
    fn highlighted_features_are_drawn_last_in_order() {
        let layer = layer(&[
            (1, &[(0.0, 0.0), (1.0, 0.0)]),
            (2, &[(1.0, 0.0), (2.0, 0.0)]),
            (3, &[(2.0, 0.0), (3.0, 0.0)]),
        ]);
        let svg = to_svg(
            &layer,
            &[FeatureId(3), FeatureId(1), FeatureId(99)],
            &no_meta(),
            &SvgStyle::default(),
        );
        assert_eq!(svg.matches("<path").count(), 3);
        assert_eq!(svg.matches(SvgStyle::DEFAULT_HIGHLIGHT_COLOR).count(), 2);

        let base = svg.find(r#"data-id="2""#).unwrap();
        let first = svg.find(r#"data-id="3""#).unwrap();
        let second = svg.find(r#"data-id="1""#).unwrap();
        assert!(base < first && first < second);
    }

    #[test]
    fn points_are_drawn_as_circles() {
        let manhole = PointFeature::new(FeatureId(100), Point::new(0.0, 0.0));
        let svg = to_svg_with_points(
            &layer(&[(1, &[(0.0, 0.0), (10.0, 0.0)])]),
            &[],
            &[&manhole],
            &no_meta(),
            &SvgStyle::default(),
        );
        assert!(svg.contains("<circle"));
        assert!(svg.contains(r#"data-id="100""#));
    }

    #[test]
    fn metadata_is_embedded_and_escaped() {
        let meta = SvgMetadata {
            title: Some("pipes & ditches"),
            description: Some("trace from 7"),
            config_json: Some(r#"{"tolerance":0.1}"#),
        };
        let svg = to_svg(
            &layer(&[(1, &[(0.0, 0.0), (1.0, 0.0)])]),
            &[],
            &meta,
            &SvgStyle::default(),
        );
        assert!(svg.contains("<title>pipes &amp; ditches</title>"));
        assert!(svg.contains("<desc>trace from 7</desc>"));
        assert!(svg.contains("<metadata>"));
        assert!(svg.contains(r#"xmlns:flowtrace="urn:flowtrace:ns:1""#));
        assert!(svg.contains("&quot;tolerance&quot;") || svg.contains(r#""tolerance""#));
    }
}
