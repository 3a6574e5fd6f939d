//! Loosely-typed GeoJSON input.
//!
//! KML-derived exports nest geometry in every way GeoJSON allows: collections inside
//! collections, points inside GeometryCollections, whole FeatureCollections inside another
//! collection's `features`. Everything is normalized into [`FeatureNode`]s holding a
//! [`GeometryNode`] tree, and consumers walk that tree with a [`GeometryVisitor`].
//!
//! Decoding is per feature: a feature that fails to decode is skipped with a warning and
//! its siblings are kept.

use crate::{GpsPoint, Result, TraceError};
use geojson::GeoJson;
use log::{debug, warn};
use serde_json::Value as JsonValue;

/// Geometry tree, independent of the container shapes it was read from.
#[derive(Debug, Clone, PartialEq)]
pub enum GeometryNode {
    Point(GpsPoint),
    MultiPoint(Vec<GpsPoint>),
    LineString(Vec<GpsPoint>),
    MultiLineString(Vec<Vec<GpsPoint>>),
    Collection(Vec<GeometryNode>),
}

/// Callbacks for a depth-first walk over a [`GeometryNode`].
///
/// Multi-geometries are delivered one member at a time.
pub trait GeometryVisitor {
    fn visit_point(&mut self, _point: &GpsPoint) {}
    fn visit_line(&mut self, _line: &[GpsPoint]) {}
}

impl GeometryNode {
    /// Walk the tree, calling the visitor for every point and line regardless of depth.
    pub fn walk<V: GeometryVisitor + ?Sized>(&self, visitor: &mut V) {
        match self {
            GeometryNode::Point(p) => visitor.visit_point(p),
            GeometryNode::MultiPoint(points) => points.iter().for_each(|p| visitor.visit_point(p)),
            GeometryNode::LineString(line) => visitor.visit_line(line),
            GeometryNode::MultiLineString(lines) => {
                lines.iter().for_each(|l| visitor.visit_line(l))
            }
            GeometryNode::Collection(children) => children.iter().for_each(|c| c.walk(visitor)),
        }
    }

    /// Convert a GeoJSON geometry value.
    ///
    /// Invalid positions are dropped. Polygons carry no highway information and are
    /// rejected as unsupported; inside a GeometryCollection they are skipped.
    pub fn from_geojson(value: &geojson::Value) -> Result<Self> {
        let point_list = |positions: &[Vec<f64>]| -> Vec<GpsPoint> {
            positions
                .iter()
                .filter_map(|p| GpsPoint::from_position(p))
                .collect()
        };

        match value {
            geojson::Value::Point(position) => GpsPoint::from_position(position)
                .map(GeometryNode::Point)
                .ok_or_else(|| TraceError::InvalidInput(format!("bad position {position:?}"))),
            geojson::Value::MultiPoint(positions) => {
                Ok(GeometryNode::MultiPoint(point_list(positions)))
            }
            geojson::Value::LineString(positions) => {
                Ok(GeometryNode::LineString(point_list(positions)))
            }
            geojson::Value::MultiLineString(lines) => Ok(GeometryNode::MultiLineString(
                lines.iter().map(|l| point_list(l)).collect(),
            )),
            geojson::Value::GeometryCollection(geometries) => Ok(GeometryNode::Collection(
                geometries
                    .iter()
                    .filter_map(|g| match GeometryNode::from_geojson(&g.value) {
                        Ok(node) => Some(node),
                        Err(e) => {
                            debug!("[Input] Skipping collection member: {}", e);
                            None
                        }
                    })
                    .collect(),
            )),
            geojson::Value::Polygon(_) => Err(TraceError::UnsupportedGeometry("Polygon".into())),
            geojson::Value::MultiPolygon(_) => {
                Err(TraceError::UnsupportedGeometry("MultiPolygon".into()))
            }
        }
    }
}

/// One feature of the input: its geometry and the label text markers are parsed from.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureNode {
    pub name: Option<String>,
    pub description: Option<String>,
    pub geometry: GeometryNode,
}

impl FeatureNode {
    /// Unlabelled feature, mostly for building inputs in code.
    pub fn new(geometry: GeometryNode) -> Self {
        Self {
            name: None,
            description: None,
            geometry,
        }
    }

    /// Feature with a `name` label.
    pub fn named(name: &str, geometry: GeometryNode) -> Self {
        Self {
            name: Some(name.to_string()),
            description: None,
            geometry,
        }
    }

    fn from_feature(feature: geojson::Feature) -> Result<Self> {
        let text = |key: &str| {
            feature
                .property(key)
                .and_then(|v| v.as_str())
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        let name = text("name").or_else(|| text("Name"));
        let description = text("description").or_else(|| text("Description"));

        let geometry = feature
            .geometry
            .as_ref()
            .ok_or_else(|| TraceError::InvalidInput("feature without geometry".to_string()))?;

        Ok(Self {
            name,
            description,
            geometry: GeometryNode::from_geojson(&geometry.value)?,
        })
    }
}

/// Raw geometry input: every decodable feature of a document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GeoInput {
    pub features: Vec<FeatureNode>,
}

impl GeoInput {
    pub fn new(features: Vec<FeatureNode>) -> Self {
        Self { features }
    }

    /// Decode a GeoJSON document from text.
    ///
    /// Fails only when the text is not JSON at all; malformed features are skipped.
    pub fn from_json_str(text: &str) -> Result<Self> {
        let value: JsonValue = serde_json::from_str(text)?;
        Self::from_json_value(value)
    }

    /// Decode a GeoJSON document that is already parsed as JSON.
    ///
    /// Accepts a FeatureCollection (nested collections included), a Feature, a bare
    /// Geometry, or an array of any of those.
    pub fn from_json_value(value: JsonValue) -> Result<Self> {
        if !value.is_object() && !value.is_array() {
            return Err(TraceError::InvalidInput(
                "expected a GeoJSON object or array".to_string(),
            ));
        }
        let mut input = GeoInput::default();
        let mut skipped = 0usize;
        input.collect(value, &mut skipped);
        if skipped > 0 {
            warn!(
                "[Input] Skipped {} undecodable features, kept {}",
                skipped,
                input.features.len()
            );
        }
        Ok(input)
    }

    fn collect(&mut self, value: JsonValue, skipped: &mut usize) {
        match value {
            JsonValue::Array(items) => {
                for item in items {
                    self.collect(item, skipped);
                }
            }
            JsonValue::Object(mut object)
                if object.get("type").and_then(|t| t.as_str()) == Some("FeatureCollection") =>
            {
                if let Some(JsonValue::Array(features)) = object.remove("features") {
                    for feature in features {
                        self.collect(feature, skipped);
                    }
                }
            }
            other => {
                let index = self.features.len() + *skipped;
                match GeoJson::from_json_value(other)
                    .map_err(TraceError::from)
                    .and_then(Self::node_from_geojson)
                {
                    Ok(node) => self.features.push(node),
                    Err(e @ TraceError::UnsupportedGeometry(_)) => {
                        debug!("[Input] Ignoring feature #{}: {}", index, e);
                    }
                    Err(e) => {
                        warn!("[Input] Skipping feature #{}: {}", index, e);
                        *skipped += 1;
                    }
                }
            }
        }
    }

    fn node_from_geojson(geojson: GeoJson) -> Result<FeatureNode> {
        match geojson {
            GeoJson::Feature(feature) => FeatureNode::from_feature(feature),
            GeoJson::Geometry(geometry) => {
                Ok(FeatureNode::new(GeometryNode::from_geojson(&geometry.value)?))
            }
            GeoJson::FeatureCollection(_) => Err(TraceError::InvalidInput(
                "unexpected nested collection".to_string(),
            )),
        }
    }

    /// Walk every feature's geometry.
    pub fn walk<V: GeometryVisitor + ?Sized>(&self, visitor: &mut V) {
        for feature in &self.features {
            feature.geometry.walk(visitor);
        }
    }
}
