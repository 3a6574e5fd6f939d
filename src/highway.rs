//! End-to-end highway rendering.
//!
//! ```text
//! GeoInput ─┬─ extract_markers ─────┐
//!           └─ reconstruct_path ────┴─ resolve_extent ─ resolve_boundary ─ slice ─ correct
//! ```

use crate::boundary::{resolve_boundary, resolve_extent, HighwayExtent, SegmentBoundary};
use crate::input::GeoInput;
use crate::markers::{extract_markers, Marker, MarkerCategory};
use crate::output;
use crate::reconstruct::reconstruct_path;
use crate::slicer::slice_with_boundary;
use crate::{PathIndex, Provenance, SlicedTrace, TraceConfig};
use geojson::FeatureCollection;
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// What to render: a highway, optionally restricted to a kilometer range.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HighwayRequest {
    pub highway_code: String,
    /// Absolute kilometer range, `None` for the whole highway
    #[serde(default)]
    pub km_range: Option<(f64, f64)>,
    /// Kilometer at which the highway's geometry starts
    #[serde(default)]
    pub km_origin: f64,
    /// Official length of the highway, used for proportional slicing
    #[serde(default)]
    pub total_km: Option<f64>,
}

impl HighwayRequest {
    pub fn new(highway_code: &str) -> Self {
        Self {
            highway_code: highway_code.to_string(),
            km_range: None,
            km_origin: 0.0,
            total_km: None,
        }
    }

    pub fn with_range(mut self, start_km: f64, end_km: f64) -> Self {
        self.km_range = Some((start_km, end_km));
        self
    }

    pub fn with_km_origin(mut self, km_origin: f64) -> Self {
        self.km_origin = km_origin;
        self
    }

    pub fn with_total_km(mut self, total_km: f64) -> Self {
        self.total_km = Some(total_km);
        self
    }
}

/// A rendered highway: its trace and the markers exported alongside it.
#[derive(Debug, Clone)]
pub struct HighwayRender {
    pub highway_code: String,
    pub trace: SlicedTrace,
    /// Resolved range, when a range was requested and resolved
    pub boundary: Option<SegmentBoundary>,
    pub markers: Vec<Marker>,
}

impl HighwayRender {
    /// Trace feature followed by marker features.
    pub fn to_feature_collection(&self, config: &TraceConfig) -> FeatureCollection {
        let mut features = vec![output::trace_feature(&self.trace, &self.highway_code)];
        features.extend(output::marker_features(&self.markers, config));
        output::feature_collection(features)
    }
}

/// Markers belonging to the highway: its own code, or no code and close to the path.
fn highway_markers(
    markers: Vec<Marker>,
    extent: &HighwayExtent,
    code: &str,
    config: &TraceConfig,
) -> Vec<Marker> {
    let index = PathIndex::new(&extent.path);
    markers
        .into_iter()
        .filter(|m| {
            m.matches_highway(code)
                || (m.highway_code.is_none()
                    && index
                        .snap(&m.coordinate)
                        .is_some_and(|s| s.distance_m <= config.generic_marker_radius_m))
        })
        .collect()
}

/// The extent's whole path. `anchored` is false when a requested range failed to resolve,
/// since no marker then anchors what is returned.
fn whole_trace(extent: &HighwayExtent, from_points: bool, anchored: bool) -> SlicedTrace {
    let provenance = if from_points {
        Provenance::PointSynthesized
    } else if anchored && extent.anchors.len() >= 2 {
        Provenance::MarkerAnchored
    } else {
        Provenance::Proportional
    };
    SlicedTrace {
        geometry: extent.path.clone(),
        km_range: None,
        reversed: extent.reversed,
        provenance,
    }
}

/// Render one highway from raw input.
///
/// Returns `None` only when the input holds no usable geometry; every other problem
/// degrades to a coarser trace.
pub fn render_highway(
    input: &GeoInput,
    request: &HighwayRequest,
    config: &TraceConfig,
) -> Option<HighwayRender> {
    let code = request.highway_code.as_str();
    let markers = extract_markers(input);

    let Some(reconstruction) = reconstruct_path(input, config) else {
        warn!("[Highway] {}: no usable geometry", code);
        return None;
    };

    let extent = resolve_extent(&markers, &reconstruction.path, Some(code), config);

    let (mut trace, boundary) = match request.km_range {
        Some((start_km, end_km)) => match resolve_boundary(
            &extent,
            start_km,
            end_km,
            request.km_origin,
            request.total_km,
            config,
        ) {
            Ok(boundary) => {
                let mut trace = slice_with_boundary(&extent, &boundary, config);
                if reconstruction.from_points {
                    trace.provenance = Provenance::PointSynthesized;
                }
                (trace, Some(boundary))
            }
            Err(e) => {
                warn!(
                    "[Highway] {} km {:.3}..{:.3}: {}, returning the whole highway",
                    code, start_km, end_km, e
                );
                let mut trace = whole_trace(&extent, reconstruction.from_points, false);
                trace.km_range = Some((start_km, end_km));
                (trace, None)
            }
        },
        None => (whole_trace(&extent, reconstruction.from_points, true), None),
    };

    trace.geometry = trace.geometry.simplified(config.simplification_tolerance);

    let markers = highway_markers(markers, &extent, code, config);
    let anchored = markers
        .iter()
        .filter(|m| m.category != MarkerCategory::Generic)
        .count();

    info!(
        "[Highway] {}: {} chain(s), {:.1}km, {} markers ({} highway-specific), {}{}",
        code,
        trace.geometry.chains().len(),
        trace.geometry.length_m() / 1000.0,
        markers.len(),
        anchored,
        trace.provenance.as_str(),
        if trace.reversed { ", reversed" } else { "" }
    );

    Some(HighwayRender {
        highway_code: code.to_string(),
        trace,
        boundary,
        markers,
    })
}
