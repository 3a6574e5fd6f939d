//! # Highway Boundary Resolution
//!
//! Anchors real-world kilometers onto positions along a reconstructed path.
//!
//! ## Positions
//! A position is a cumulative distance in meters along the path. For a MultiLineString the
//! chains are treated as one virtual line in array order, so chain `i` covers
//! `[sum(len[..i]), sum(len[..=i])]`.
//!
//! ## Algorithm
//! 1. Pick markers for the target highway: SINFRA first, then named, then generic markers
//!    lying close to the path
//! 2. Snap each marker to the path, giving it a position
//! 3. Sort by kilometer; if the lowest kilometer sits further along the path than the
//!    highest, the geometry is reversed
//! 4. With two or more highway-specific markers, restrict the path to the stretch between
//!    them, dropping geometry of other highways exported in the same blob
//!
//! Kilometer ranges are then resolved anchor-to-anchor when markers allow it, and
//! proportionally otherwise.

use crate::markers::{Marker, MarkerCategory};
use crate::{
    geo_utils, GpsPoint, OptionExt, Provenance, ReconstructedPath, Result, TraceConfig,
    TraceError, TraceGeometry,
};
use log::{debug, info, warn};
use rstar::{PointDistance, RTree, RTreeObject, AABB};
use serde::{Deserialize, Serialize};

// =============================================================================
// R-tree Indexed Segment for Spatial Queries
// =============================================================================

/// A path segment with its (chain, segment) address for R-tree queries.
///
/// Endpoints are stored as `[x, y]` with `x = lng * scale` and `y = lat`, where `scale` is
/// the cosine of the path's mean latitude, so planar distances track meters.
#[derive(Debug, Clone, Copy)]
struct IndexedSegment {
    chain: usize,
    segment: usize,
    from: [f64; 2],
    to: [f64; 2],
}

impl RTreeObject for IndexedSegment {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(self.from, self.to)
    }
}

impl PointDistance for IndexedSegment {
    fn distance_2(&self, point: &[f64; 2]) -> f64 {
        let dx = self.to[0] - self.from[0];
        let dy = self.to[1] - self.from[1];
        let len_sq = dx * dx + dy * dy;
        let t = if len_sq < 1e-18 {
            0.0
        } else {
            (((point[0] - self.from[0]) * dx + (point[1] - self.from[1]) * dy) / len_sq)
                .clamp(0.0, 1.0)
        };
        let ex = self.from[0] + t * dx - point[0];
        let ey = self.from[1] + t * dy - point[1];
        ex * ex + ey * ey
    }
}

/// Nearest segments re-measured with haversine around a snap query
const SNAP_CANDIDATES: usize = 4;

/// Result of snapping a coordinate onto a path.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Snap {
    /// Closest point on the path
    pub point: GpsPoint,
    /// Position of that point along the path (meters)
    pub position: f64,
    /// Distance from the query to the path (meters)
    pub distance_m: f64,
}

/// Positional model of a reconstructed path.
#[derive(Debug)]
pub struct PathIndex {
    chains: Vec<Vec<GpsPoint>>,
    cumulative: Vec<Vec<f64>>,
    offsets: Vec<f64>,
    length: f64,
    scale: f64,
    tree: RTree<IndexedSegment>,
}

impl PathIndex {
    pub fn new(path: &ReconstructedPath) -> Self {
        let chains: Vec<Vec<GpsPoint>> = path.chains().into_iter().map(|c| c.to_vec()).collect();
        let cumulative: Vec<Vec<f64>> = chains
            .iter()
            .map(|c| geo_utils::cumulative_distances(c))
            .collect();

        let mut offsets = Vec::with_capacity(chains.len());
        let mut length = 0.0;
        for cum in &cumulative {
            offsets.push(length);
            length += cum.last().copied().unwrap_or(0.0);
        }

        let point_count: usize = chains.iter().map(|c| c.len()).sum();
        let mean_lat = if point_count > 0 {
            chains.iter().flatten().map(|p| p.latitude).sum::<f64>() / point_count as f64
        } else {
            0.0
        };
        let scale = mean_lat.to_radians().cos();

        let indexed: Vec<IndexedSegment> = chains
            .iter()
            .enumerate()
            .flat_map(|(chain, points)| {
                // A lone vertex is indexed as a zero-length segment
                let last = points.len().saturating_sub(1);
                let count = if points.len() == 1 { 1 } else { last };
                (0..count).map(move |segment| {
                    let a = &points[segment];
                    let b = &points[(segment + 1).min(last)];
                    IndexedSegment {
                        chain,
                        segment,
                        from: [a.longitude * scale, a.latitude],
                        to: [b.longitude * scale, b.latitude],
                    }
                })
            })
            .collect();

        Self {
            chains,
            cumulative,
            offsets,
            length,
            scale,
            tree: RTree::bulk_load(indexed),
        }
    }

    /// Total length in meters (sum of chains).
    pub fn length_m(&self) -> f64 {
        self.length
    }

    /// Chains with their local cumulative distances and virtual start offset.
    pub fn chain_ranges(&self) -> impl Iterator<Item = (&[GpsPoint], &[f64], f64)> {
        self.chains
            .iter()
            .zip(&self.cumulative)
            .zip(&self.offsets)
            .map(|((c, cum), off)| (c.as_slice(), cum.as_slice(), *off))
    }

    /// Closest point of the path to `point`.
    ///
    /// The nearest segments come from the R-tree and are re-measured with haversine, so a
    /// point beside a long segment snaps onto it even when denser geometry lies nearby.
    pub fn snap(&self, point: &GpsPoint) -> Option<Snap> {
        let query = [point.longitude * self.scale, point.latitude];
        let mut best: Option<Snap> = None;

        for candidate in self.tree.nearest_neighbor_iter(&query).take(SNAP_CANDIDATES) {
            let chain = &self.chains[candidate.chain];
            let cum = &self.cumulative[candidate.chain];
            let offset = self.offsets[candidate.chain];
            let s = candidate.segment;
            let e = (s + 1).min(chain.len() - 1);

            let (closest, t) = geo_utils::project_onto_segment(point, &chain[s], &chain[e]);
            let snap = Snap {
                point: closest,
                position: offset + cum[s] + t * (cum[e] - cum[s]),
                distance_m: geo_utils::haversine_distance(point, &closest),
            };
            if best.map_or(true, |b| snap.distance_m < b.distance_m) {
                best = Some(snap);
            }
        }
        best
    }

    /// Point at a position, clamped to `[0, length]`.
    pub fn point_at(&self, position: f64) -> Option<GpsPoint> {
        let position = position.clamp(0.0, self.length);
        let (chain, cum, offset) = self
            .chain_ranges()
            .find(|(_, cum, offset)| position <= offset + cum.last().copied().unwrap_or(0.0))
            .or_else(|| self.chain_ranges().last())?;
        geo_utils::interpolate_at(chain, cum, position - offset)
    }

    /// Sub-geometry between two positions.
    ///
    /// Every chain overlapping `[start, end]` contributes its overlapping part; one
    /// contributing chain yields a LineString, several a MultiLineString.
    pub fn extract(&self, start: f64, end: f64) -> Option<TraceGeometry> {
        let parts: Vec<Vec<GpsPoint>> = self
            .chain_ranges()
            .filter_map(|(chain, cum, offset)| {
                let chain_len = cum.last().copied().unwrap_or(0.0);
                let lo = start.max(offset);
                let hi = end.min(offset + chain_len);
                if hi - lo <= 0.0 {
                    return None;
                }
                let part = geo_utils::sub_line(chain, cum, lo - offset, hi - offset);
                (part.len() >= 2).then_some(part)
            })
            .collect();
        TraceGeometry::from_chains(parts)
    }
}

// =============================================================================
// Anchors and Extent
// =============================================================================

/// A marker snapped onto the path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnchoredMarker {
    pub marker: Marker,
    pub km: f64,
    /// Position along the path (meters)
    pub position: f64,
    /// Distance from the marker to the path (meters)
    pub snap_distance_m: f64,
}

/// The part of a path belonging to one highway, with its anchors.
#[derive(Debug, Clone)]
pub struct HighwayExtent {
    /// Restricted path, or the full path when markers were insufficient
    pub path: ReconstructedPath,
    /// Anchors sorted by kilometer, positions relative to `path`
    pub anchors: Vec<AnchoredMarker>,
    /// Coordinate order runs against increasing kilometer
    pub reversed: bool,
    /// `path` was cut down to the span of highway-specific markers
    pub restricted: bool,
}

impl HighwayExtent {
    /// Kilometers at the first and last anchor, when there are at least two.
    pub fn km_span(&self) -> Option<(f64, f64)> {
        match (self.anchors.first(), self.anchors.last()) {
            (Some(first), Some(last)) if self.anchors.len() >= 2 => Some((first.km, last.km)),
            _ => None,
        }
    }
}

fn snap_markers(index: &PathIndex, markers: &[&Marker]) -> Vec<AnchoredMarker> {
    let mut anchors: Vec<AnchoredMarker> = markers
        .iter()
        .filter_map(|m| {
            let km = m.parsed_km?;
            let snap = index.snap(&m.coordinate)?;
            Some(AnchoredMarker {
                marker: (*m).clone(),
                km,
                position: snap.position,
                snap_distance_m: snap.distance_m,
            })
        })
        .collect();
    anchors.sort_by(|a, b| a.km.total_cmp(&b.km));
    anchors
}

fn is_reversed(anchors: &[AnchoredMarker]) -> bool {
    match (anchors.first(), anchors.last()) {
        (Some(low), Some(high)) if anchors.len() >= 2 => low.position > high.position,
        _ => false,
    }
}

/// Select the target highway's markers, snap them, detect direction, and restrict the
/// path to the highway's own stretch when at least two highway-specific markers exist.
///
/// With no `highway_code`, every marker with a kilometer is a candidate.
pub fn resolve_extent(
    markers: &[Marker],
    path: &ReconstructedPath,
    highway_code: Option<&str>,
    config: &TraceConfig,
) -> HighwayExtent {
    let index = PathIndex::new(path);
    let for_highway = |m: &&Marker| {
        m.parsed_km.is_some() && highway_code.map_or(true, |code| m.matches_highway(code))
    };

    let specific: Vec<&Marker> = markers
        .iter()
        .filter(for_highway)
        .filter(|m| m.category != MarkerCategory::Generic)
        .collect();
    let sinfra: Vec<&Marker> = specific
        .iter()
        .copied()
        .filter(|m| m.category == MarkerCategory::Sinfra)
        .collect();

    let selected: Vec<&Marker> = if sinfra.len() >= 2 {
        sinfra
    } else if specific.len() >= 2 {
        specific.clone()
    } else {
        let generic = markers.iter().filter(|m| {
            m.category == MarkerCategory::Generic
                && m.parsed_km.is_some()
                && (m.highway_code.is_none() || highway_code.map_or(true, |c| m.matches_highway(c)))
                && index
                    .snap(&m.coordinate)
                    .is_some_and(|s| s.distance_m <= config.generic_marker_radius_m)
        });
        specific.iter().copied().chain(generic).collect()
    };

    let anchors = snap_markers(&index, &selected);
    let reversed = is_reversed(&anchors);
    let specific_count = anchors
        .iter()
        .filter(|a| a.marker.category != MarkerCategory::Generic)
        .count();

    debug!(
        "[Boundary] {} anchors ({} highway-specific), reversed={}",
        anchors.len(),
        specific_count,
        reversed
    );

    if specific_count >= 2 {
        let lo = anchors.iter().map(|a| a.position).fold(f64::INFINITY, f64::min);
        let hi = anchors
            .iter()
            .map(|a| a.position)
            .fold(f64::NEG_INFINITY, f64::max);

        if let Some(restricted) = index.extract(lo, hi) {
            info!(
                "[Boundary] Restricted path to {:.0}m..{:.0}m of {:.0}m using {} markers",
                lo,
                hi,
                index.length_m(),
                specific_count
            );
            let restricted_index = PathIndex::new(&restricted);
            let markers: Vec<&Marker> = anchors.iter().map(|a| &a.marker).collect();
            let anchors = snap_markers(&restricted_index, &markers);
            return HighwayExtent {
                path: restricted,
                reversed: is_reversed(&anchors),
                anchors,
                restricted: true,
            };
        }
        warn!(
            "[Boundary] Markers span no geometry ({:.0}m..{:.0}m), keeping full path",
            lo, hi
        );
    }

    HighwayExtent {
        path: path.clone(),
        anchors,
        reversed,
        restricted: false,
    }
}

// =============================================================================
// Range Resolution
// =============================================================================

/// Mapping of a kilometer range to positions along a specific path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentBoundary {
    pub start_km: f64,
    pub end_km: f64,
    /// Position of the range start (meters), always below `end_position`
    pub start_position: f64,
    pub end_position: f64,
    pub reversed: bool,
    pub provenance: Provenance,
    /// Markers anchoring the low and high kilometer ends, when marker-anchored
    pub anchors: Option<(AnchoredMarker, AnchoredMarker)>,
}

/// Anchor closest in kilometers to `km`, within tolerance.
fn anchor_for(anchors: &[AnchoredMarker], km: f64, tolerance: f64) -> Option<usize> {
    anchors
        .iter()
        .enumerate()
        .filter(|(_, a)| (a.km - km).abs() <= tolerance)
        .min_by(|(_, a), (_, b)| (a.km - km).abs().total_cmp(&(b.km - km).abs()))
        .map(|(i, _)| i)
}

/// Position of `km`, offset from an anchor along the kilometer direction.
fn position_from_anchor(anchor: &AnchoredMarker, km: f64, reversed: bool) -> f64 {
    let delta = (km - anchor.km) * 1000.0;
    if reversed {
        anchor.position - delta
    } else {
        anchor.position + delta
    }
}

fn anchored_range(
    anchors: &[AnchoredMarker],
    start_km: f64,
    end_km: f64,
    reversed: bool,
    config: &TraceConfig,
) -> Result<Option<(f64, f64, AnchoredMarker, AnchoredMarker)>> {
    let start = anchor_for(anchors, start_km, config.anchor_km_tolerance);
    let end = anchor_for(anchors, end_km, config.anchor_km_tolerance);
    match (start, end) {
        (Some(s), Some(e)) if s == e => Err(TraceError::MarkerCollision { km: anchors[s].km }),
        (Some(s), Some(e)) => {
            let a = &anchors[s];
            let b = &anchors[e];
            Ok(Some((
                position_from_anchor(a, start_km, reversed),
                position_from_anchor(b, end_km, reversed),
                a.clone(),
                b.clone(),
            )))
        }
        _ => Ok(None),
    }
}

/// Resolve a kilometer range to positions along the extent's path.
///
/// Fallback ladder:
/// 1. anchor-to-anchor, using markers near both target kilometers
/// 2. on a marker collision (one marker resolving both ends), retry with SINFRA anchors
/// 3. proportional: `(km - origin) / total_km * length`, where `origin` is the highway's
///    starting kilometer (or the first anchor's, for a restricted path)
///
/// Fails with [`TraceError::AmbiguousRange`] when the resolved start is not before the end.
pub fn resolve_boundary(
    extent: &HighwayExtent,
    start_km: f64,
    end_km: f64,
    km_origin: f64,
    total_km: Option<f64>,
    config: &TraceConfig,
) -> Result<SegmentBoundary> {
    let index = PathIndex::new(&extent.path);
    let length = index.length_m();
    let reversed = extent.reversed;

    let anchored = match anchored_range(&extent.anchors, start_km, end_km, reversed, config) {
        Err(TraceError::MarkerCollision { km }) => {
            warn!(
                "[Boundary] Marker at km {:.3} resolves both km {:.3} and {:.3}, retrying with SINFRA anchors",
                km, start_km, end_km
            );
            let sinfra: Vec<AnchoredMarker> = extent
                .anchors
                .iter()
                .filter(|a| a.marker.category == MarkerCategory::Sinfra)
                .cloned()
                .collect();
            if sinfra.len() < extent.anchors.len() {
                anchored_range(&sinfra, start_km, end_km, reversed, config).unwrap_or_else(|e| {
                    warn!("[Boundary] {}, falling back to proportional", e);
                    None
                })
            } else {
                None
            }
        }
        other => other?,
    };

    let (start_position, end_position, provenance, anchors) = match anchored {
        Some((s, e, a, b)) => (
            s.min(e).clamp(0.0, length),
            s.max(e).clamp(0.0, length),
            Provenance::MarkerAnchored,
            Some((a, b)),
        ),
        None => {
            let (origin, span_km) = match extent.km_span() {
                Some((lo, hi)) if extent.restricted && hi > lo => (lo, hi - lo),
                _ => (
                    km_origin,
                    total_km.filter(|t| *t > 0.0).unwrap_or(length / 1000.0),
                ),
            };
            let point_count: usize = index.chain_ranges().map(|(c, _, _)| c.len()).sum();
            let span_km = Some(span_km)
                .filter(|s| *s > 0.0)
                .ok_or_insufficient_points(point_count, 2)?;
            let to_position = |km: f64| {
                let d = ((km - origin) / span_km * length).clamp(0.0, length);
                if reversed {
                    length - d
                } else {
                    d
                }
            };
            let (s, e) = (to_position(start_km), to_position(end_km));
            debug!(
                "[Boundary] Proportional range km {:.3}..{:.3} (origin {:.3}, span {:.3}km)",
                start_km, end_km, origin, span_km
            );
            (s.min(e), s.max(e), Provenance::Proportional, None)
        }
    };

    if start_km >= end_km || start_position >= end_position {
        return Err(TraceError::AmbiguousRange {
            start_m: start_position,
            end_m: end_position,
        });
    }

    Ok(SegmentBoundary {
        start_km,
        end_km,
        start_position,
        end_position,
        reversed,
        provenance,
        anchors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn north_path(n: usize) -> ReconstructedPath {
        TraceGeometry::LineString((0..n).map(|i| GpsPoint::new(i as f64 * 0.01, 0.0)).collect())
    }

    fn marker(label: &str, lat: f64, lng: f64) -> Marker {
        Marker::from_label(GpsPoint::new(lat, lng), Some(label), None)
    }

    #[test]
    fn test_snap_onto_segment() {
        let index = PathIndex::new(&north_path(3));
        let snap = index.snap(&GpsPoint::new(0.005, 0.001)).unwrap();
        assert!((snap.point.latitude - 0.005).abs() < 1e-9);
        assert!((snap.position - 556.0).abs() < 2.0);
        assert!((snap.distance_m - 111.0).abs() < 2.0);
    }

    #[test]
    fn test_snap_prefers_long_segment_over_dense_vertices() {
        // 11km segment heading east, then a densely sampled return leg 0.005° north of it
        let mut points = vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.0, 0.1)];
        points.extend((0..=100).map(|i| GpsPoint::new(0.005, 0.1 - i as f64 * 0.001)));
        let index = PathIndex::new(&TraceGeometry::LineString(points));

        let snap = index.snap(&GpsPoint::new(0.0002, 0.05)).unwrap();
        assert!((snap.distance_m - 22.2).abs() < 1.0, "distance {}", snap.distance_m);
        assert!((snap.position - 5560.0).abs() < 5.0, "position {}", snap.position);
        assert!(snap.point.latitude.abs() < 1e-9);
    }

    #[test]
    fn test_snap_single_vertex_chain() {
        let index = PathIndex::new(&TraceGeometry::LineString(vec![GpsPoint::new(0.0, 0.0)]));
        let snap = index.snap(&GpsPoint::new(0.01, 0.0)).unwrap();
        assert_eq!(snap.position, 0.0);
        assert!((snap.distance_m - 1112.0).abs() < 2.0);
    }

    #[test]
    fn test_multichain_positions_are_virtual_concatenation() {
        let path = TraceGeometry::MultiLineString(vec![
            vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.01, 0.0)],
            vec![GpsPoint::new(1.0, 0.0), GpsPoint::new(1.01, 0.0)],
        ]);
        let index = PathIndex::new(&path);
        let snap = index.snap(&GpsPoint::new(1.005, 0.0)).unwrap();
        assert!((snap.position - 1112.0 * 1.5).abs() < 3.0);

        let p = index.point_at(1112.0 * 1.5).unwrap();
        assert!((p.latitude - 1.005).abs() < 1e-4);
    }

    #[test]
    fn test_extract_across_chains() {
        let path = TraceGeometry::MultiLineString(vec![
            vec![GpsPoint::new(0.0, 0.0), GpsPoint::new(0.01, 0.0)],
            vec![GpsPoint::new(1.0, 0.0), GpsPoint::new(1.01, 0.0)],
        ]);
        let index = PathIndex::new(&path);
        let total = index.length_m();
        assert!(index.extract(total * 0.25, total * 0.75).unwrap().is_multi());
        assert!(!index.extract(total * 0.6, total * 0.9).unwrap().is_multi());
        assert!(index.extract(total * 0.5, total * 0.5).is_none());
    }

    #[test]
    fn test_reversed_detection() {
        // km 10 at the far end of the path, km 20 at its start
        let markers = vec![
            marker("SINFRA - 163/10", 0.04, 0.0),
            marker("SINFRA - 163/20", 0.0, 0.0),
        ];
        let extent = resolve_extent(&markers, &north_path(5), Some("163"), &TraceConfig::default());
        assert!(extent.reversed);
        assert!(extent.restricted);
        assert_eq!(extent.anchors[0].km, 10.0);
    }

    #[test]
    fn test_extent_restricts_to_marker_span() {
        let markers = vec![
            marker("SINFRA - 163/1", 0.01, 0.0),
            marker("SINFRA - 163/3", 0.03, 0.0),
            marker("SINFRA - 364/50", 0.09, 0.0),
        ];
        let path = north_path(10);
        let extent = resolve_extent(&markers, &path, Some("BR-163"), &TraceConfig::default());
        assert!(extent.restricted);
        assert!(!extent.reversed);
        assert_eq!(extent.anchors.len(), 2);
        let length = PathIndex::new(&extent.path).length_m();
        assert!((length - 2224.0).abs() < 5.0);
        assert!(extent.anchors[0].position.abs() < 1.0);
    }

    #[test]
    fn test_generic_markers_must_be_near_path() {
        let markers = vec![
            marker("KM 1", 0.01, 0.001),
            marker("KM 2", 0.02, 0.5),
        ];
        let extent = resolve_extent(&markers, &north_path(5), Some("163"), &TraceConfig::default());
        assert_eq!(extent.anchors.len(), 1);
        assert!(!extent.restricted);
    }

    #[test]
    fn test_anchor_to_anchor_boundary() {
        let markers = vec![
            marker("SINFRA - 163/0", 0.0, 0.0),
            marker("SINFRA - 163/2", 0.02, 0.0),
            marker("SINFRA - 163/4", 0.04, 0.0),
        ];
        let extent = resolve_extent(&markers, &north_path(5), Some("163"), &TraceConfig::default());
        let boundary = resolve_boundary(&extent, 0.0, 2.0, 0.0, None, &TraceConfig::default()).unwrap();
        assert_eq!(boundary.provenance, Provenance::MarkerAnchored);
        assert!(boundary.start_position.abs() < 1.0);
        assert!((boundary.end_position - 2224.0).abs() < 3.0);
        let (low, high) = boundary.anchors.unwrap();
        assert_eq!((low.km, high.km), (0.0, 2.0));
    }

    #[test]
    fn test_marker_collision_falls_back_to_proportional() {
        let markers = vec![marker("SINFRA - 163/10", 0.02, 0.0)];
        let extent = resolve_extent(&markers, &north_path(5), Some("163"), &TraceConfig::default());
        let boundary =
            resolve_boundary(&extent, 10.0, 10.5, 8.0, Some(4.0), &TraceConfig::default()).unwrap();
        assert_eq!(boundary.provenance, Provenance::Proportional);
        let length = PathIndex::new(&extent.path).length_m();
        assert!((boundary.start_position - length * 0.5).abs() < 1.0);
        assert!((boundary.end_position - length * 0.625).abs() < 1.0);
    }

    #[test]
    fn test_collision_retries_with_sinfra_anchors() {
        let path = north_path(5);
        let index = PathIndex::new(&path);
        let anchor = |label: &str, lat: f64| {
            let marker = marker(label, lat, 0.0);
            let snap = index.snap(&marker.coordinate).unwrap();
            AnchoredMarker {
                km: marker.parsed_km.unwrap(),
                marker,
                position: snap.position,
                snap_distance_m: snap.distance_m,
            }
        };
        // The named marker is closest to both target kilometers
        let extent = HighwayExtent {
            anchors: vec![
                anchor("SINFRA - 163/0", 0.0),
                anchor("Trevo KM 2,5 (MT 163)", 0.025),
                anchor("SINFRA - 163/4", 0.04),
            ],
            path,
            reversed: false,
            restricted: false,
        };
        assert_eq!(extent.anchors[1].marker.category, MarkerCategory::Named);

        let boundary =
            resolve_boundary(&extent, 1.5, 3.0, 0.0, None, &TraceConfig::default()).unwrap();
        assert_eq!(boundary.provenance, Provenance::MarkerAnchored);
        let (low, high) = boundary.anchors.unwrap();
        assert_eq!((low.km, high.km), (0.0, 4.0));
        assert!((boundary.start_position - 1500.0).abs() < 1.0);
        assert!((boundary.end_position - (high.position - 1000.0)).abs() < 1.0);
    }

    #[test]
    fn test_restricted_proportional_uses_anchor_span() {
        let markers = vec![
            marker("SINFRA - 163/0", 0.01, 0.0),
            marker("SINFRA - 163/4", 0.05, 0.0),
        ];
        let extent = resolve_extent(&markers, &north_path(10), Some("163"), &TraceConfig::default());
        assert!(extent.restricted);
        assert_eq!(extent.km_span(), Some((0.0, 4.0)));

        // No anchor within tolerance of km 1 or km 3
        let config = TraceConfig {
            anchor_km_tolerance: 0.1,
            ..TraceConfig::default()
        };
        let boundary = resolve_boundary(&extent, 1.0, 3.0, 100.0, Some(50.0), &config).unwrap();
        assert_eq!(boundary.provenance, Provenance::Proportional);
        let length = PathIndex::new(&extent.path).length_m();
        assert!((boundary.start_position - length * 0.25).abs() < 1.0);
        assert!((boundary.end_position - length * 0.75).abs() < 1.0);
    }

    #[test]
    fn test_proportional_reversed_mirrors_positions() {
        let markers = vec![
            marker("KM 0", 0.04, 0.0),
            marker("KM 4", 0.0, 0.0),
        ];
        let extent = resolve_extent(&markers, &north_path(5), None, &TraceConfig::default());
        assert!(extent.reversed);
        let config = TraceConfig {
            anchor_km_tolerance: 0.1,
            ..TraceConfig::default()
        };
        let boundary = resolve_boundary(&extent, 1.0, 2.0, 0.0, Some(4.0), &config).unwrap();
        let length = PathIndex::new(&extent.path).length_m();
        assert!((boundary.start_position - length * 0.5).abs() < 1.0);
        assert!((boundary.end_position - length * 0.75).abs() < 1.0);
    }

    #[test]
    fn test_inverted_range_is_ambiguous() {
        let extent = resolve_extent(&[], &north_path(5), None, &TraceConfig::default());
        let result = resolve_boundary(&extent, 3.0, 1.0, 0.0, Some(4.0), &TraceConfig::default());
        assert!(matches!(result, Err(TraceError::AmbiguousRange { .. })));
    }
}
