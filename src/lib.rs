//! # Highway Trace
//!
//! Reconstruction and kilometer slicing of highway geometry from noisy, tool-exported
//! GeoJSON (typically converted from KML).
//!
//! This library provides:
//! - Merging of disordered line fragments into continuous chains (grid-indexed
//!   nearest-neighbor chaining)
//! - Kilometer marker extraction and highway code classification from free-text labels
//! - Highway boundary resolution: which part of a shared geometry blob belongs to one
//!   highway, and whether kilometers run with or against the coordinate order
//! - Kilometer-range slicing, multi-chain aware, with a marker-based self-correction
//! - Geocoding of inspection occurrences onto prepared highway paths
//!
//! ## Quick Start
//!
//! ```rust
//! use highway_trace::{GeoInput, HighwayRequest, TraceConfig, render_highway};
//!
//! let input = GeoInput::from_json_str(r#"{
//!     "type": "FeatureCollection",
//!     "features": [
//!         {"type": "Feature", "properties": {},
//!          "geometry": {"type": "LineString", "coordinates": [[-56.10, -15.60], [-56.10, -15.61]]}},
//!         {"type": "Feature", "properties": {},
//!          "geometry": {"type": "LineString", "coordinates": [[-56.10, -15.61], [-56.10, -15.62]]}}
//!     ]
//! }"#).unwrap();
//!
//! let request = HighwayRequest::new("MT-010");
//! let render = render_highway(&input, &request, &TraceConfig::default()).unwrap();
//! assert!(!render.trace.geometry.is_multi());
//! ```

use geo::{algorithm::simplify::Simplify, Coord, LineString};
use serde::{Deserialize, Serialize};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TraceError};

// Geographic utilities (distance, interpolation, sub-lines)
pub mod geo_utils;

// Loosely-typed GeoJSON input and the geometry-node visitor
pub mod input;
pub use input::{FeatureNode, GeoInput, GeometryNode, GeometryVisitor};

// Kilometer marker extraction and label parsing
pub mod markers;
pub use markers::{
    classify_label, extract_markers, normalize_highway_code, parse_km, Marker, MarkerCategory,
};

// Fragment merging via grid-indexed nearest-neighbor chaining
pub mod reconstruct;
pub use reconstruct::{chain_points, reconstruct_path, PointGrid, Reconstruction};

// Marker anchoring, direction detection and highway extent restriction
pub mod boundary;
pub use boundary::{
    resolve_boundary, resolve_extent, AnchoredMarker, HighwayExtent, PathIndex, SegmentBoundary,
};

// Kilometer-range slicing with self-correction
pub mod slicer;
pub use slicer::{correct_slice, slice, slice_between, slice_with_boundary};

// Occurrence geocoding onto prepared paths
pub mod geocoder;
pub use geocoder::{
    geocode_batch, geocode_occurrence, GeocodedOccurrence, Occurrence, OccurrenceGeometry,
    OccurrenceShape, OccurrenceSource, PathSource, PreparedPath, PreparedPathCache,
};

// Output feature collection builders
pub mod output;

// End-to-end highway rendering
pub mod highway;
pub use highway::{render_highway, HighwayRender, HighwayRequest};

// ============================================================================
// Core Types
// ============================================================================

/// A WGS84 coordinate.
///
/// GeoJSON stores positions as `[lng, lat]`; this type keeps them named to avoid
/// axis mix-ups.
///
/// # Example
/// ```
/// use highway_trace::GpsPoint;
/// let point = GpsPoint::new(-15.6014, -56.0979); // Cuiabá
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Create a point from a GeoJSON position (`[lng, lat, ...]`).
    ///
    /// Returns `None` for short positions or out-of-range values.
    pub fn from_position(position: &[f64]) -> Option<Self> {
        match position {
            [lng, lat, ..] => Some(Self::new(*lat, *lng)).filter(|p| p.is_valid()),
            _ => None,
        }
    }

    /// GeoJSON position (`[lng, lat]`).
    pub fn to_position(&self) -> Vec<f64> {
        vec![self.longitude, self.latitude]
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Line geometry made of one or more ordered chains.
///
/// A reconstructed path and a sliced trace share this shape: a single chain is a
/// LineString, several chains form a MultiLineString in discovery order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "coordinates")]
pub enum TraceGeometry {
    LineString(Vec<GpsPoint>),
    MultiLineString(Vec<Vec<GpsPoint>>),
}

/// A reconstructed highway path.
pub type ReconstructedPath = TraceGeometry;

impl TraceGeometry {
    /// Build geometry from chains, dropping chains with fewer than 2 points.
    ///
    /// Returns `None` when no chain survives.
    pub fn from_chains(chains: Vec<Vec<GpsPoint>>) -> Option<Self> {
        let mut chains: Vec<Vec<GpsPoint>> = chains.into_iter().filter(|c| c.len() >= 2).collect();
        match chains.len() {
            0 => None,
            1 => chains.pop().map(TraceGeometry::LineString),
            _ => Some(TraceGeometry::MultiLineString(chains)),
        }
    }

    /// The chains of this geometry, in order.
    pub fn chains(&self) -> Vec<&[GpsPoint]> {
        match self {
            TraceGeometry::LineString(points) => vec![points.as_slice()],
            TraceGeometry::MultiLineString(chains) => chains.iter().map(|c| c.as_slice()).collect(),
        }
    }

    /// True for a MultiLineString.
    pub fn is_multi(&self) -> bool {
        matches!(self, TraceGeometry::MultiLineString(_))
    }

    /// Total number of coordinates across chains.
    pub fn point_count(&self) -> usize {
        self.chains().iter().map(|c| c.len()).sum()
    }

    /// Sum of chain lengths in meters (gaps between chains are not counted).
    pub fn length_m(&self) -> f64 {
        self.chains()
            .iter()
            .map(|c| geo_utils::polyline_length(c))
            .sum()
    }

    /// Geometry traversed in the opposite direction (chain order and point order).
    pub fn reversed(&self) -> Self {
        match self {
            TraceGeometry::LineString(points) => {
                TraceGeometry::LineString(points.iter().rev().copied().collect())
            }
            TraceGeometry::MultiLineString(chains) => TraceGeometry::MultiLineString(
                chains
                    .iter()
                    .rev()
                    .map(|c| c.iter().rev().copied().collect())
                    .collect(),
            ),
        }
    }

    /// Douglas-Peucker simplification of every chain.
    ///
    /// A non-positive tolerance returns the geometry unchanged.
    pub fn simplified(&self, tolerance: f64) -> Self {
        if tolerance <= 0.0 {
            return self.clone();
        }
        let chains = self
            .chains()
            .into_iter()
            .map(|chain| {
                let line = LineString::new(
                    chain
                        .iter()
                        .map(|p| Coord {
                            x: p.longitude,
                            y: p.latitude,
                        })
                        .collect(),
                );
                line.simplify(&tolerance)
                    .0
                    .iter()
                    .map(|c| GpsPoint::new(c.y, c.x))
                    .collect()
            })
            .collect();
        TraceGeometry::from_chains(chains).unwrap_or_else(|| self.clone())
    }

    /// GeoJSON geometry value.
    pub fn to_geojson(&self) -> geojson::Value {
        match self {
            TraceGeometry::LineString(points) => {
                geojson::Value::LineString(points.iter().map(GpsPoint::to_position).collect())
            }
            TraceGeometry::MultiLineString(chains) => geojson::Value::MultiLineString(
                chains
                    .iter()
                    .map(|c| c.iter().map(GpsPoint::to_position).collect())
                    .collect(),
            ),
        }
    }
}

/// How a sliced trace was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Range endpoints anchored on kilometer markers snapped to the path
    MarkerAnchored,
    /// Range endpoints computed from the ratio of kilometers to path length
    Proportional,
    /// Geometry built directly from point features (markers), not line data
    PointSynthesized,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::MarkerAnchored => "marker-anchored",
            Provenance::Proportional => "proportional",
            Provenance::PointSynthesized => "point-synthesized",
        }
    }
}

/// The sub-geometry of a highway for a kilometer range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlicedTrace {
    pub geometry: TraceGeometry,
    /// Requested kilometer range, `None` for the whole highway
    pub km_range: Option<(f64, f64)>,
    /// Coordinate order runs against increasing kilometer
    pub reversed: bool,
    pub provenance: Provenance,
}

/// Configuration for reconstruction, slicing and geocoding.
///
/// Distances on the grid are planar degrees; distances along paths are meters.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceConfig {
    /// Grid cell size for the nearest-neighbor index (degrees).
    /// Default: 0.01 (~1km)
    pub grid_cell_deg: f64,

    /// Nearest-neighbor jumps longer than this start a new chain (degrees).
    /// Default: 0.05
    pub gap_threshold_deg: f64,

    /// Rings searched around a cell before falling back to a linear scan.
    /// Default: 64
    pub max_ring_radius: u32,

    /// Point features replace line data when they outnumber line coordinates by this ratio.
    /// Default: 1.5
    pub point_substitution_ratio: f64,

    /// Generic (non-SINFRA, unnamed) markers must lie within this distance of the path (meters).
    /// Default: 500.0
    pub generic_marker_radius_m: f64,

    /// Maximum kilometer difference between a target kilometer and the anchor resolving it.
    /// Default: 2.0
    pub anchor_km_tolerance: f64,

    /// A slice longer than this multiple of its anchors' separation is rebuilt from markers.
    /// Default: 3.0
    pub mismatch_ratio: f64,

    /// Anchor separations below this are too short to judge a slice (km).
    /// Default: 0.5
    pub mismatch_min_km: f64,

    /// Occurrences spanning more than this are rendered as lines (km).
    /// Default: 0.05
    pub range_min_km: f64,

    /// Photo coordinates further than this from the path are rejected (meters).
    /// Default: 5000.0
    pub photo_max_distance_m: f64,

    /// Douglas-Peucker tolerance applied to output slices (degrees, 0 disables).
    /// Default: 0.00001 (~1 meter)
    pub simplification_tolerance: f64,

    /// Label keywords marking critical infrastructure exported even without a kilometer.
    /// Default: PONTE, VIADUTO, BUEIRO, TRAVESSIA, PASSARELA
    pub critical_keywords: Vec<String>,
}

impl Default for TraceConfig {
    fn default() -> Self {
        Self {
            grid_cell_deg: 0.01,
            gap_threshold_deg: 0.05,
            max_ring_radius: 64,
            point_substitution_ratio: 1.5,
            generic_marker_radius_m: 500.0,
            anchor_km_tolerance: 2.0,
            mismatch_ratio: 3.0,
            mismatch_min_km: 0.5,
            range_min_km: 0.05,
            photo_max_distance_m: 5000.0,
            simplification_tolerance: 0.00001,
            critical_keywords: ["PONTE", "VIADUTO", "BUEIRO", "TRAVESSIA", "PASSARELA"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
