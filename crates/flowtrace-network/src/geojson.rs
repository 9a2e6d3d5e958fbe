//! Load layers from GeoJSON `FeatureCollection`s.
//!
//! Feature ids must be non-negative integers or strings holding one;
//! features without an id are numbered by their position in the
//! collection. The legacy top-level `crs` member (`{"type": "name",
//! "properties": {"name": ...}}`) names the CRS; without it the caller's
//! default applies.

use geo::{Geometry, LineString, MultiLineString};
use serde::Deserialize;
use serde_json::{Value, json};

use crate::layer::{LineLayerIndex, PointLayerIndex};
use crate::types::{Crs, FeatureId, LineFeature, Point, PointFeature};

pub use crate::types::LayerError;

/// CRS assumed by GeoJSON when the document does not name one.
pub const DEFAULT_CRS: &str = "EPSG:4326";

#[derive(Deserialize)]
struct Collection {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    crs: Option<NamedCrs>,
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct NamedCrs {
    #[serde(default)]
    properties: Option<NamedCrsProperties>,
}

#[derive(Deserialize)]
struct NamedCrsProperties {
    name: Option<String>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    geometry: Option<RawGeometry>,
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

fn parse_collection(json: &str, default_crs: &Crs) -> Result<(Crs, Vec<RawFeature>), LayerError> {
    let collection: Collection = serde_json::from_str(json)?;
    if collection.kind != "FeatureCollection" {
        return Err(LayerError::NotAFeatureCollection(collection.kind));
    }
    let crs = collection
        .crs
        .and_then(|c| c.properties)
        .and_then(|p| p.name)
        .map_or_else(|| default_crs.clone(), |name| Crs::new(&name));
    Ok((crs, collection.features))
}

fn feature_id(index: usize, raw: Option<&Value>) -> Result<FeatureId, LayerError> {
    let invalid = |value: &Value| LayerError::InvalidId {
        index,
        value: value.to_string(),
    };
    match raw {
        None | Some(Value::Null) => Ok(FeatureId(index as u64)),
        Some(value @ Value::Number(n)) => n.as_u64().map(FeatureId).ok_or_else(|| invalid(value)),
        Some(value @ Value::String(s)) => s
            .trim()
            .parse::<u64>()
            .map(FeatureId)
            .map_err(|_| invalid(value)),
        Some(value) => Err(invalid(value)),
    }
}

fn position(index: usize, raw: &[f64]) -> Result<(f64, f64), LayerError> {
    match raw {
        [x, y, ..] => Ok((*x, *y)),
        _ => Err(LayerError::InvalidPosition { index }),
    }
}

fn line_string(index: usize, raw: &[Vec<f64>]) -> Result<LineString<f64>, LayerError> {
    raw.iter()
        .map(|p| position(index, p))
        .collect::<Result<Vec<_>, _>>()
        .map(LineString::from)
}

fn line_geometry(index: usize, raw: RawGeometry) -> Result<Geometry<f64>, LayerError> {
    match raw.kind.as_str() {
        "LineString" => {
            let coords: Vec<Vec<f64>> = serde_json::from_value(raw.coordinates)?;
            Ok(Geometry::LineString(line_string(index, &coords)?))
        }
        "MultiLineString" => {
            let parts: Vec<Vec<Vec<f64>>> = serde_json::from_value(raw.coordinates)?;
            let lines = parts
                .iter()
                .map(|part| line_string(index, part))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Geometry::MultiLineString(MultiLineString::new(lines)))
        }
        _ => Err(LayerError::WrongGeometryType {
            index,
            expected: "LineString or MultiLineString",
            found: raw.kind,
        }),
    }
}

/// Parse a line layer.
///
/// # Errors
///
/// Returns a [`LayerError`] for malformed JSON, a document that is not a
/// `FeatureCollection`, unusable ids, missing or non-line geometries, and
/// duplicate ids.
pub fn parse_line_layer(json: &str, default_crs: &Crs) -> Result<LineLayerIndex, LayerError> {
    let (crs, raw) = parse_collection(json, default_crs)?;
    let features = raw
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let id = feature_id(index, feature.id.as_ref())?;
            let geometry = feature
                .geometry
                .ok_or(LayerError::MissingGeometry { index })?;
            Ok(LineFeature::new(id, line_geometry(index, geometry)?))
        })
        .collect::<Result<Vec<_>, LayerError>>()?;
    LineLayerIndex::new(crs, features)
}

/// Parse a point layer.
///
/// # Errors
///
/// Same as [`parse_line_layer`], with `Point` as the only accepted
/// geometry type.
pub fn parse_point_layer(json: &str, default_crs: &Crs) -> Result<PointLayerIndex, LayerError> {
    let (crs, raw) = parse_collection(json, default_crs)?;
    let features = raw
        .into_iter()
        .enumerate()
        .map(|(index, feature)| {
            let id = feature_id(index, feature.id.as_ref())?;
            let geometry = feature
                .geometry
                .ok_or(LayerError::MissingGeometry { index })?;
            if geometry.kind != "Point" {
                return Err(LayerError::WrongGeometryType {
                    index,
                    expected: "Point",
                    found: geometry.kind,
                });
            }
            let coords: Vec<f64> = serde_json::from_value(geometry.coordinates)?;
            let (x, y) = position(index, &coords)?;
            Ok(PointFeature::new(id, Point::new(x, y)))
        })
        .collect::<Result<Vec<_>, LayerError>>()?;
    PointLayerIndex::new(crs, features)
}

/// Write line features as a GeoJSON `FeatureCollection`.
///
/// Geometries other than lines are written with a `null` geometry.
#[must_use]
pub fn line_features_to_geojson<'a>(
    crs: &Crs,
    features: impl IntoIterator<Item = &'a LineFeature>,
) -> Value {
    let coords = |line: &LineString<f64>| -> Vec<[f64; 2]> {
        line.coords().map(|c| [c.x, c.y]).collect()
    };
    let features: Vec<Value> = features
        .into_iter()
        .map(|feature| {
            let geometry = match &feature.geometry {
                Geometry::Line(line) => json!({
                    "type": "LineString",
                    "coordinates": [[line.start.x, line.start.y], [line.end.x, line.end.y]],
                }),
                Geometry::LineString(line) => json!({
                    "type": "LineString",
                    "coordinates": coords(line),
                }),
                Geometry::MultiLineString(multi) => json!({
                    "type": "MultiLineString",
                    "coordinates": multi.0.iter().map(coords).collect::<Vec<_>>(),
                }),
                _ => Value::Null,
            };
            json!({
                "type": "Feature",
                "id": feature.id.0,
                "properties": {},
                "geometry": geometry,
            })
        })
        .collect();
    json!({
        "type": "FeatureCollection",
        "crs": { "type": "name", "properties": { "name": crs.as_str() } },
        "features": features,
    })
}
