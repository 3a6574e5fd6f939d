//! # Geographic Utilities
//!
//! Geodesic helpers shared by reconstruction, slicing and geocoding.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two GPS points |
//! | [`polyline_length`] | Total length of a polyline in meters |
//! | [`cumulative_distances`] | Running distance at every vertex of a polyline |
//! | [`interpolate_at`] | Point at a given distance along a polyline |
//! | [`sub_line`] | Portion of a polyline between two distances |
//! | [`project_onto_segment`] | Closest point of a segment to a query point |
//! | [`planar_distance_sq`] | Squared distance in degrees (grid and chaining metric) |
//!
//! ## Coordinate System
//!
//! All functions expect WGS84 coordinates (latitude/longitude in degrees). Interpolation is
//! linear in degrees between consecutive vertices, which is accurate at highway vertex
//! spacing.

use crate::GpsPoint;
use geo::{Distance, Haversine, Point};

// =============================================================================
// Distance Functions
// =============================================================================

/// Calculate the great-circle distance between two GPS points using the Haversine formula.
///
/// Returns the distance in meters.
///
/// # Example
///
/// ```rust
/// use highway_trace::{GpsPoint, geo_utils};
///
/// let cuiaba = GpsPoint::new(-15.6014, -56.0979);
/// let rondonopolis = GpsPoint::new(-16.4673, -54.6372);
///
/// let distance = geo_utils::haversine_distance(&cuiaba, &rondonopolis);
/// assert!((distance - 180_000.0).abs() < 10_000.0);
/// ```
#[inline]
pub fn haversine_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Haversine::distance(point1, point2)
}

/// Squared planar distance in degrees.
///
/// This is the metric of the reconstruction grid; it is cheap and monotonic enough for
/// nearest-neighbor ordering at highway scale.
#[inline]
pub fn planar_distance_sq(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let dlat = p1.latitude - p2.latitude;
    let dlng = p1.longitude - p2.longitude;
    dlat * dlat + dlng * dlng
}

/// Calculate the total length of a polyline in meters.
///
/// Empty or single-point polylines return 0.0.
pub fn polyline_length(points: &[GpsPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Running distance in meters at every vertex.
///
/// The first entry is always 0.0 and the last is the polyline length.
pub fn cumulative_distances(points: &[GpsPoint]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(points.len());
    let mut total = 0.0;
    for (i, point) in points.iter().enumerate() {
        if i > 0 {
            total += haversine_distance(&points[i - 1], point);
        }
        cumulative.push(total);
    }
    cumulative
}

// =============================================================================
// Interpolation
// =============================================================================

fn lerp(p1: &GpsPoint, p2: &GpsPoint, t: f64) -> GpsPoint {
    GpsPoint::new(
        p1.latitude + t * (p2.latitude - p1.latitude),
        p1.longitude + t * (p2.longitude - p1.longitude),
    )
}

/// Index of the segment containing `distance`: the last vertex whose cumulative
/// distance is not beyond it.
fn segment_index(cumulative: &[f64], distance: f64) -> usize {
    let idx = cumulative.partition_point(|&d| d <= distance);
    idx.saturating_sub(1).min(cumulative.len().saturating_sub(2))
}

/// Point at `distance` meters along a polyline.
///
/// `cumulative` must come from [`cumulative_distances`] on the same points. Distances
/// outside `[0, length]` are clamped. Returns `None` for an empty polyline.
pub fn interpolate_at(points: &[GpsPoint], cumulative: &[f64], distance: f64) -> Option<GpsPoint> {
    match points.len() {
        0 => return None,
        1 => return Some(points[0]),
        _ => {}
    }
    let total = cumulative.last().copied().unwrap_or(0.0);
    let distance = distance.clamp(0.0, total);

    let seg = segment_index(cumulative, distance);
    let seg_len = cumulative[seg + 1] - cumulative[seg];
    let t = if seg_len > 1e-9 {
        (distance - cumulative[seg]) / seg_len
    } else {
        0.0
    };
    Some(lerp(&points[seg], &points[seg + 1], t))
}

/// Portion of a polyline between two distances (meters), with interpolated endpoints.
///
/// Distances are clamped to the polyline. Returns an empty vector when the clamped
/// range is empty.
pub fn sub_line(points: &[GpsPoint], cumulative: &[f64], start: f64, end: f64) -> Vec<GpsPoint> {
    if points.len() < 2 {
        return Vec::new();
    }
    let total = cumulative.last().copied().unwrap_or(0.0);
    let start = start.clamp(0.0, total);
    let end = end.clamp(0.0, total);
    if start >= end {
        return Vec::new();
    }

    let mut result = Vec::new();
    if let Some(first) = interpolate_at(points, cumulative, start) {
        result.push(first);
    }
    for (point, &d) in points.iter().zip(cumulative) {
        if d > start && d < end && result.last() != Some(point) {
            result.push(*point);
        }
    }
    if let Some(last) = interpolate_at(points, cumulative, end) {
        if result.last() != Some(&last) {
            result.push(last);
        }
    }
    result
}

/// Closest point of segment `a`-`b` to `p`, with its parameter `t` in `[0, 1]`.
///
/// Longitudes are scaled by the cosine of the latitude so the projection is close to
/// metric at highway scale.
pub fn project_onto_segment(p: &GpsPoint, a: &GpsPoint, b: &GpsPoint) -> (GpsPoint, f64) {
    let scale = p.latitude.to_radians().cos();
    let ax = a.longitude * scale;
    let bx = b.longitude * scale;
    let px = p.longitude * scale;
    let dx = bx - ax;
    let dy = b.latitude - a.latitude;
    let len_sq = dx * dx + dy * dy;
    if len_sq < 1e-18 {
        return (*a, 0.0);
    }
    let t = (((px - ax) * dx + (p.latitude - a.latitude) * dy) / len_sq).clamp(0.0, 1.0);
    (lerp(a, b, t), t)
}

// =============================================================================
// Unit Tests
// =============================================================================
