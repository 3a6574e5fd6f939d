//! Output feature builders.
//!
//! Property names are what the map layer reads: traces carry `isReference` (and
//! `isReversed` on a direction mismatch), occurrences carry `type: "occurrence"`,
//! `source` and `segmento_id`.

use crate::geocoder::GeocodedOccurrence;
use crate::markers::Marker;
use crate::{SlicedTrace, TraceConfig};
use geojson::{Feature, FeatureCollection, Geometry, JsonObject, Value};
use log::{debug, warn};
use serde_json::Value as JsonValue;

/// Largest integer a JSON number (IEEE double) holds exactly.
const MAX_SAFE_INTEGER: u64 = 1 << 53;

/// JSON number for a 64-bit storage identifier.
///
/// Exact up to 2^53; larger magnitudes are emitted as (lossy) floats.
pub fn json_id(id: i64) -> JsonValue {
    if id.unsigned_abs() <= MAX_SAFE_INTEGER {
        JsonValue::from(id)
    } else {
        warn!("[Output] Identifier {} exceeds 2^53, precision is lost", id);
        JsonValue::from(id as f64)
    }
}

fn feature(value: Value, properties: JsonObject) -> Feature {
    Feature {
        bbox: None,
        geometry: Some(Geometry::new(value)),
        id: None,
        properties: Some(properties),
        foreign_members: None,
    }
}

/// Feature for a sliced (or whole) highway trace.
pub fn trace_feature(trace: &SlicedTrace, highway_code: &str) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("isReference".to_string(), true.into());
    if trace.reversed {
        properties.insert("isReversed".to_string(), true.into());
    }
    properties.insert("highwayCode".to_string(), highway_code.into());
    properties.insert("provenance".to_string(), trace.provenance.as_str().into());
    if let Some((start, end)) = trace.km_range {
        properties.insert("kmInicial".to_string(), start.into());
        properties.insert("kmFinal".to_string(), end.into());
    }
    feature(trace.geometry.to_geojson(), properties)
}

/// Feature for a geocoded occurrence.
pub fn occurrence_feature(occurrence: &GeocodedOccurrence) -> Feature {
    let mut properties = JsonObject::new();
    properties.insert("type".to_string(), "occurrence".into());
    properties.insert("id".to_string(), json_id(occurrence.id));
    properties.insert("segmento_id".to_string(), json_id(occurrence.segment_id));
    properties.insert("highwayId".to_string(), occurrence.highway_id.clone().into());
    properties.insert(
        "source".to_string(),
        occurrence.placement.source.as_str().into(),
    );
    feature(occurrence.placement.geometry.to_geojson(), properties)
}

fn is_critical(marker: &Marker, keywords: &[String]) -> bool {
    let label = marker.raw_name.to_uppercase();
    keywords
        .iter()
        .any(|k| !k.is_empty() && label.contains(&k.to_uppercase()))
}

/// Point features for markers.
///
/// Markers without a kilometer are skipped, unless their label names critical
/// infrastructure: those are forced in with `km: 0` and `kmSynthetic: true`.
pub fn marker_features(markers: &[Marker], config: &TraceConfig) -> Vec<Feature> {
    let mut skipped = 0usize;
    let features: Vec<Feature> = markers
        .iter()
        .filter_map(|marker| {
            let (km, synthetic) = match marker.parsed_km {
                Some(km) => (km, false),
                None if is_critical(marker, &config.critical_keywords) => (0.0, true),
                None => {
                    debug!("[Output] Skipping marker '{}' without km", marker.raw_name);
                    skipped += 1;
                    return None;
                }
            };

            let mut properties = JsonObject::new();
            properties.insert("name".to_string(), marker.raw_name.clone().into());
            properties.insert("km".to_string(), km.into());
            if synthetic {
                properties.insert("kmSynthetic".to_string(), true.into());
            }
            properties.insert("category".to_string(), marker.category.as_str().into());
            properties.insert(
                "highwayCode".to_string(),
                marker
                    .highway_code
                    .clone()
                    .map_or(JsonValue::Null, JsonValue::from),
            );
            Some(feature(
                Value::Point(marker.coordinate.to_position()),
                properties,
            ))
        })
        .collect();

    if skipped > 0 {
        warn!(
            "[Output] Skipped {} markers without a kilometer, exported {}",
            skipped,
            features.len()
        );
    }
    features
}

pub fn feature_collection(features: Vec<Feature>) -> FeatureCollection {
    FeatureCollection {
        bbox: None,
        features,
        foreign_members: None,
    }
}
