//! # Occurrence Geocoding
//!
//! Places inspection occurrences on prepared highway paths.
//!
//! Priority:
//! 1. **Path interpolation**: absolute km = segment offset + relative km. A range longer
//!    than `range_min_km` becomes a LineString slice, anything else a Point.
//! 2. **Photo fallback**: the photo's GPS coordinate, accepted only within
//!    `photo_max_distance_m` of the path.
//!
//! Occurrences that fit neither are dropped.
//!
//! Paths are prepared once per highway and kept in a [`PreparedPathCache`] owned by the
//! caller for the duration of one batch.

use crate::boundary::PathIndex;
use crate::{geo_utils, GpsPoint, ReconstructedPath, TraceConfig};
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// An inspection event to place on the map.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Occurrence {
    pub id: i64,
    /// Homogeneous segment the occurrence belongs to
    pub segment_id: i64,
    pub highway_id: String,
    /// Start kilometer, relative to the segment
    pub km_inicial: Option<f64>,
    /// End kilometer, relative to the segment
    pub km_final: Option<f64>,
    /// Real-world kilometer at which the segment starts
    #[serde(default)]
    pub segment_km_offset: f64,
    /// GPS tag of the occurrence photo
    #[serde(default)]
    pub photo: Option<GpsPoint>,
}

/// How an occurrence was placed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OccurrenceSource {
    LineInterpolation,
    Photo,
    LineSlice,
}

impl OccurrenceSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            OccurrenceSource::LineInterpolation => "line_interpolation",
            OccurrenceSource::Photo => "photo",
            OccurrenceSource::LineSlice => "line_slice",
        }
    }
}

/// Point or line placement of an occurrence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum OccurrenceShape {
    Point(GpsPoint),
    LineString(Vec<GpsPoint>),
}

impl OccurrenceShape {
    pub fn to_geojson(&self) -> geojson::Value {
        match self {
            OccurrenceShape::Point(p) => geojson::Value::Point(p.to_position()),
            OccurrenceShape::LineString(points) => {
                geojson::Value::LineString(points.iter().map(GpsPoint::to_position).collect())
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OccurrenceGeometry {
    pub geometry: OccurrenceShape,
    pub source: OccurrenceSource,
}

/// An occurrence with its display geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeocodedOccurrence {
    pub id: i64,
    pub segment_id: i64,
    pub highway_id: String,
    pub placement: OccurrenceGeometry,
}

// =============================================================================
// Prepared Paths
// =============================================================================

/// A highway path oriented so that distance grows with kilometer.
#[derive(Debug)]
pub struct PreparedPath {
    index: PathIndex,
    /// Kilometer at the start of the path
    km_origin: f64,
}

impl PreparedPath {
    /// Prepare a path; a reversed path is flipped first.
    pub fn new(path: &ReconstructedPath, reversed: bool) -> Self {
        let oriented = if reversed { path.reversed() } else { path.clone() };
        Self {
            index: PathIndex::new(&oriented),
            km_origin: 0.0,
        }
    }

    /// Set the kilometer at the start of the path (default 0).
    pub fn with_km_origin(mut self, km_origin: f64) -> Self {
        self.km_origin = km_origin;
        self
    }

    pub fn length_m(&self) -> f64 {
        self.index.length_m()
    }

    fn distance_for_km(&self, km: f64) -> f64 {
        let distance = (km - self.km_origin) * 1000.0;
        let clamped = distance.clamp(0.0, self.length_m());
        if clamped != distance {
            debug!(
                "[Geocoder] km {:.3} is outside the path, clamped to {:.0}m",
                km, clamped
            );
        }
        clamped
    }

    /// Point at an absolute kilometer, clamped to the path.
    pub fn point_at_km(&self, km: f64) -> Option<GpsPoint> {
        self.index.point_at(self.distance_for_km(km))
    }

    /// Line between two absolute kilometers, clamped to the path.
    ///
    /// When the range spans several chains the longest part is returned.
    pub fn line_between_km(&self, start_km: f64, end_km: f64) -> Option<Vec<GpsPoint>> {
        let start = self.distance_for_km(start_km);
        let end = self.distance_for_km(end_km);
        if start >= end {
            return None;
        }
        let geometry = self.index.extract(start, end)?;
        geometry
            .chains()
            .into_iter()
            .max_by(|a, b| {
                geo_utils::polyline_length(a).total_cmp(&geo_utils::polyline_length(b))
            })
            .map(|c| c.to_vec())
    }

    /// Distance from a point to the path (meters).
    pub fn distance_to(&self, point: &GpsPoint) -> Option<f64> {
        self.index.snap(point).map(|s| s.distance_m)
    }
}

/// Where prepared paths come from.
///
/// Implemented by the host over its own storage; returns the reconstructed path of a
/// highway and whether its coordinates run against increasing kilometer.
pub trait PathSource {
    fn highway_path(&self, highway_id: &str) -> Option<(ReconstructedPath, bool)>;
}

impl PathSource for HashMap<String, (ReconstructedPath, bool)> {
    fn highway_path(&self, highway_id: &str) -> Option<(ReconstructedPath, bool)> {
        self.get(highway_id).cloned()
    }
}

/// Per-highway prepared paths for one batch of work.
///
/// Highways without a path are remembered too, so the source is asked at most once.
#[derive(Debug, Default)]
pub struct PreparedPathCache {
    paths: HashMap<String, Option<PreparedPath>>,
}

impl PreparedPathCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, highway_id: &str, path: PreparedPath) {
        self.paths.insert(highway_id.to_string(), Some(path));
    }

    /// Cached path for a highway, preparing it from `source` on first use.
    pub fn get_or_prepare<S: PathSource + ?Sized>(
        &mut self,
        highway_id: &str,
        source: &S,
    ) -> Option<&PreparedPath> {
        self.paths
            .entry(highway_id.to_string())
            .or_insert_with(|| {
                let prepared = source
                    .highway_path(highway_id)
                    .map(|(path, reversed)| PreparedPath::new(&path, reversed));
                match &prepared {
                    Some(p) => debug!(
                        "[Geocoder] Prepared highway {} ({:.0}m)",
                        highway_id,
                        p.length_m()
                    ),
                    None => warn!("[Geocoder] No path for highway {}", highway_id),
                }
                prepared
            })
            .as_ref()
    }

    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

// =============================================================================
// Geocoding
// =============================================================================

fn interpolate(
    occurrence: &Occurrence,
    path: &PreparedPath,
    config: &TraceConfig,
) -> Option<OccurrenceGeometry> {
    let km_inicial = occurrence.km_inicial?;
    let start = occurrence.segment_km_offset + km_inicial;

    if let Some(km_final) = occurrence.km_final {
        if km_final - km_inicial > config.range_min_km {
            let end = occurrence.segment_km_offset + km_final;
            if let Some(line) = path.line_between_km(start, end) {
                return Some(OccurrenceGeometry {
                    geometry: OccurrenceShape::LineString(line),
                    source: OccurrenceSource::LineSlice,
                });
            }
        }
    }

    path.point_at_km(start).map(|p| OccurrenceGeometry {
        geometry: OccurrenceShape::Point(p),
        source: OccurrenceSource::LineInterpolation,
    })
}

fn photo_fallback(
    occurrence: &Occurrence,
    path: Option<&PreparedPath>,
    config: &TraceConfig,
) -> Option<OccurrenceGeometry> {
    let photo = occurrence.photo?;
    let Some(distance) = path.and_then(|p| p.distance_to(&photo)) else {
        warn!(
            "[Geocoder] Occurrence {}: photo cannot be checked without a path",
            occurrence.id
        );
        return None;
    };
    if distance >= config.photo_max_distance_m {
        warn!(
            "[Geocoder] Occurrence {}: photo is {:.0}m from the path, rejected",
            occurrence.id, distance
        );
        return None;
    }
    Some(OccurrenceGeometry {
        geometry: OccurrenceShape::Point(photo),
        source: OccurrenceSource::Photo,
    })
}

/// Place one occurrence on its highway's prepared path.
///
/// Returns `None` when neither the kilometers nor the photo yield a placement.
pub fn geocode_occurrence(
    occurrence: &Occurrence,
    path: Option<&PreparedPath>,
    config: &TraceConfig,
) -> Option<GeocodedOccurrence> {
    let placement = path
        .and_then(|p| interpolate(occurrence, p, config))
        .or_else(|| photo_fallback(occurrence, path, config));

    if placement.is_none() {
        debug!("[Geocoder] Occurrence {} dropped", occurrence.id);
    }

    placement.map(|placement| GeocodedOccurrence {
        id: occurrence.id,
        segment_id: occurrence.segment_id,
        highway_id: occurrence.highway_id.clone(),
        placement,
    })
}

/// Place occurrences of any number of highways, preparing each path once.
pub fn geocode_batch<S: PathSource + ?Sized>(
    occurrences: &[Occurrence],
    source: &S,
    cache: &mut PreparedPathCache,
    config: &TraceConfig,
) -> Vec<GeocodedOccurrence> {
    let geocoded: Vec<GeocodedOccurrence> = occurrences
        .iter()
        .filter_map(|occurrence| {
            let path = cache.get_or_prepare(&occurrence.highway_id, source);
            geocode_occurrence(occurrence, path, config)
        })
        .collect();

    info!(
        "[Geocoder] Placed {}/{} occurrences on {} highways",
        geocoded.len(),
        occurrences.len(),
        cache.len()
    );
    geocoded
}
