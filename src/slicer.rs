//! Kilometer-range slicing of reconstructed paths.
//!
//! Multi-chain paths are sliced as a virtual concatenation of their chains (see
//! [`PathIndex`]). A slice that could not be resolved falls back to the whole path, and a
//! slice much longer than its anchor markers imply is rebuilt from the markers.

use crate::boundary::{AnchoredMarker, HighwayExtent, PathIndex, SegmentBoundary};
use crate::{
    geo_utils, Provenance, ReconstructedPath, Result, SlicedTrace, TraceConfig, TraceError,
    TraceGeometry,
};
use log::{debug, warn};

/// Sub-geometry between two positions (meters along the path).
///
/// Fails with [`TraceError::AmbiguousRange`] when the range is empty once clamped.
pub fn slice_between(path: &ReconstructedPath, start_m: f64, end_m: f64) -> Result<TraceGeometry> {
    let index = PathIndex::new(path);
    let length = index.length_m();
    let start = start_m.clamp(0.0, length);
    let end = end_m.clamp(0.0, length);
    if start != start_m || end != end_m {
        debug!(
            "[Slicer] Clamped range {:.0}m..{:.0}m to {:.0}m..{:.0}m",
            start_m, end_m, start, end
        );
    }
    if start >= end {
        return Err(TraceError::AmbiguousRange {
            start_m: start,
            end_m: end,
        });
    }
    index.extract(start, end).ok_or(TraceError::AmbiguousRange {
        start_m: start,
        end_m: end,
    })
}

fn whole_path(path: &ReconstructedPath, km_range: Option<(f64, f64)>, reversed: bool) -> SlicedTrace {
    SlicedTrace {
        geometry: path.clone(),
        km_range,
        reversed,
        provenance: Provenance::Proportional,
    }
}

/// Proportional slice: `distance = km / total_km * length`.
///
/// An empty or inverted range returns the whole path.
pub fn slice(path: &ReconstructedPath, km_start: f64, km_end: f64, total_km: f64) -> SlicedTrace {
    let range = Some((km_start, km_end));
    if total_km <= 0.0 {
        warn!(
            "[Slicer] Total length {:.3}km is not positive, returning the whole path",
            total_km
        );
        return whole_path(path, range, false);
    }

    let length = path.length_m();
    let start_m = km_start / total_km * length;
    let end_m = km_end / total_km * length;

    match slice_between(path, start_m, end_m) {
        Ok(geometry) => SlicedTrace {
            geometry,
            km_range: range,
            reversed: false,
            provenance: Provenance::Proportional,
        },
        Err(e) => {
            warn!(
                "[Slicer] km {:.3}..{:.3}: {}, returning the whole path",
                km_start, km_end, e
            );
            whole_path(path, range, false)
        }
    }
}

/// Slice the extent's path at a resolved boundary, then apply [`correct_slice`].
pub fn slice_with_boundary(
    extent: &HighwayExtent,
    boundary: &SegmentBoundary,
    config: &TraceConfig,
) -> SlicedTrace {
    let range = Some((boundary.start_km, boundary.end_km));
    let trace = match slice_between(&extent.path, boundary.start_position, boundary.end_position) {
        Ok(geometry) => SlicedTrace {
            geometry,
            km_range: range,
            reversed: boundary.reversed,
            provenance: boundary.provenance,
        },
        Err(e) => {
            warn!(
                "[Slicer] km {:.3}..{:.3}: {}, returning the whole path",
                boundary.start_km, boundary.end_km, e
            );
            whole_path(&extent.path, range, boundary.reversed)
        }
    };

    debug!(
        "[Slicer] km {:.3}..{:.3} -> {} chain(s), {:.0}m ({})",
        boundary.start_km,
        boundary.end_km,
        trace.geometry.chains().len(),
        trace.geometry.length_m(),
        trace.provenance.as_str()
    );

    correct_slice(trace, &extent.anchors, config)
}

/// Anchors closest to each end of the range, when they are distinct markers.
fn end_anchors<'a>(
    anchors: &'a [AnchoredMarker],
    km_start: f64,
    km_end: f64,
    tolerance: f64,
) -> Option<(&'a AnchoredMarker, &'a AnchoredMarker)> {
    let closest = |km: f64| {
        anchors
            .iter()
            .enumerate()
            .filter(|(_, a)| (a.km - km).abs() <= tolerance)
            .min_by(|(_, a), (_, b)| (a.km - km).abs().total_cmp(&(b.km - km).abs()))
    };
    match (closest(km_start), closest(km_end)) {
        (Some((i, a)), Some((j, b))) if i != j => Some((a, b)),
        _ => None,
    }
}

fn check_length(actual_km: f64, implied_km: f64, config: &TraceConfig) -> Result<()> {
    if implied_km > config.mismatch_min_km && actual_km > implied_km * config.mismatch_ratio {
        return Err(TraceError::GeometryMismatch {
            actual_km,
            implied_km,
        });
    }
    Ok(())
}

/// Rebuild a slice from markers when its length is implausible.
///
/// The implied length is the straight-line distance between the anchors nearest the two
/// ends of the range. When the slice exceeds it by more than `mismatch_ratio` (and the
/// implied length is above `mismatch_min_km`), the geometry is replaced by the anchors
/// within the range joined in kilometer order.
pub fn correct_slice(
    trace: SlicedTrace,
    anchors: &[AnchoredMarker],
    config: &TraceConfig,
) -> SlicedTrace {
    let Some((km_start, km_end)) = trace.km_range else {
        return trace;
    };
    let Some((first, last)) = end_anchors(anchors, km_start, km_end, config.anchor_km_tolerance)
    else {
        return trace;
    };

    let implied_km =
        geo_utils::haversine_distance(&first.marker.coordinate, &last.marker.coordinate) / 1000.0;
    let actual_km = trace.geometry.length_m() / 1000.0;

    let Err(e) = check_length(actual_km, implied_km, config) else {
        return trace;
    };

    let (lo, hi) = if first.km <= last.km {
        (first.km, last.km)
    } else {
        (last.km, first.km)
    };
    let mut in_range: Vec<&AnchoredMarker> =
        anchors.iter().filter(|a| a.km >= lo && a.km <= hi).collect();
    in_range.sort_by(|a, b| a.km.total_cmp(&b.km));
    let mut points: Vec<_> = in_range.iter().map(|a| a.marker.coordinate).collect();
    points.dedup();

    if points.len() < 2 {
        warn!("[Slicer] {} but too few markers to rebuild, keeping slice", e);
        return trace;
    }

    warn!(
        "[Slicer] {} (ratio {:.1}), rebuilding km {:.3}..{:.3} from {} markers",
        e,
        config.mismatch_ratio,
        km_start,
        km_end,
        points.len()
    );
    SlicedTrace {
        geometry: TraceGeometry::LineString(points),
        km_range: trace.km_range,
        reversed: false,
        provenance: Provenance::PointSynthesized,
    }
}
