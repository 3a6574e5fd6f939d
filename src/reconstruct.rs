//! Trace reconstruction from disordered fragments.
//!
//! Exported highway geometry arrives as many LineString fragments in no particular order,
//! often overlapping at their ends. All fragment coordinates are pooled and re-linked by
//! nearest-neighbor chaining:
//!
//! 1. Start at the westmost point
//! 2. Repeatedly step to the nearest unvisited point
//! 3. A step longer than the gap threshold closes the current chain and opens a new one
//!
//! A uniform grid makes each nearest-neighbor query an expanding ring search over cells,
//! so the whole pass is amortized O(n) rather than O(n²).

use crate::input::{GeoInput, GeometryVisitor};
use crate::{geo_utils, GpsPoint, ReconstructedPath, TraceConfig, TraceGeometry};
use log::{debug, info};
use std::collections::HashMap;

/// Grid coordinate (column, row)
type CellKey = (i64, i64);

/// Uniform grid over a point pool supporting removal and nearest-unvisited queries.
///
/// Distances are planar degrees. Ties are broken toward the lower pool index.
#[derive(Debug)]
pub struct PointGrid<'a> {
    points: &'a [GpsPoint],
    cell_size: f64,
    cells: HashMap<CellKey, Vec<usize>>,
    visited: Vec<bool>,
    remaining: usize,
    min_cell: CellKey,
    max_cell: CellKey,
}

impl<'a> PointGrid<'a> {
    /// Index every point of the pool.
    pub fn new(points: &'a [GpsPoint], cell_size: f64) -> Self {
        let cell_size = if cell_size > 0.0 { cell_size } else { 0.01 };
        let mut grid = Self {
            points,
            cell_size,
            cells: HashMap::new(),
            visited: vec![false; points.len()],
            remaining: points.len(),
            min_cell: (i64::MAX, i64::MAX),
            max_cell: (i64::MIN, i64::MIN),
        };
        for (idx, point) in points.iter().enumerate() {
            let key = grid.cell_of(point);
            grid.min_cell = (grid.min_cell.0.min(key.0), grid.min_cell.1.min(key.1));
            grid.max_cell = (grid.max_cell.0.max(key.0), grid.max_cell.1.max(key.1));
            grid.cells.entry(key).or_default().push(idx);
        }
        grid
    }

    fn cell_of(&self, point: &GpsPoint) -> CellKey {
        (
            (point.longitude / self.cell_size).floor() as i64,
            (point.latitude / self.cell_size).floor() as i64,
        )
    }

    /// Number of points not yet removed.
    pub fn len(&self) -> usize {
        self.remaining
    }

    pub fn is_empty(&self) -> bool {
        self.remaining == 0
    }

    /// Mark a point as visited and drop it from its cell.
    pub fn remove(&mut self, idx: usize) {
        if idx >= self.points.len() || self.visited[idx] {
            return;
        }
        self.visited[idx] = true;
        self.remaining -= 1;
        let key = self.cell_of(&self.points[idx]);
        if let Some(bucket) = self.cells.get_mut(&key) {
            if let Some(pos) = bucket.iter().position(|&i| i == idx) {
                bucket.swap_remove(pos);
            }
            if bucket.is_empty() {
                self.cells.remove(&key);
            }
        }
    }

    fn consider(&self, query: &GpsPoint, idx: usize, best: &mut Option<(usize, f64)>) {
        let d = geo_utils::planar_distance_sq(query, &self.points[idx]);
        let better = match *best {
            None => true,
            Some((best_idx, best_d)) => d < best_d || (d == best_d && idx < best_idx),
        };
        if better {
            *best = Some((idx, d));
        }
    }

    fn scan_cell(&self, query: &GpsPoint, key: CellKey, best: &mut Option<(usize, f64)>) {
        if let Some(bucket) = self.cells.get(&key) {
            for &idx in bucket {
                self.consider(query, idx, best);
            }
        }
    }

    fn scan_ring(&self, query: &GpsPoint, center: CellKey, r: i64, best: &mut Option<(usize, f64)>) {
        if r == 0 {
            self.scan_cell(query, center, best);
            return;
        }
        let (x, y) = center;
        for dx in -r..=r {
            self.scan_cell(query, (x.saturating_add(dx), y.saturating_sub(r)), best);
            self.scan_cell(query, (x.saturating_add(dx), y.saturating_add(r)), best);
        }
        for dy in (-r + 1)..r {
            self.scan_cell(query, (x.saturating_sub(r), y.saturating_add(dy)), best);
            self.scan_cell(query, (x.saturating_add(r), y.saturating_add(dy)), best);
        }
    }

    /// Nearest unvisited point to `query`, as `(index, squared distance in degrees)`.
    ///
    /// Rings of cells are searched outward until the best candidate provably cannot be
    /// beaten by the next ring. If that takes more than `max_rings` rings (very sparse
    /// data), the remaining points are scanned linearly instead.
    pub fn nearest(&self, query: &GpsPoint, max_rings: u32) -> Option<(usize, f64)> {
        if self.remaining == 0 {
            return None;
        }
        let center = self.cell_of(query);
        let extent = center
            .0
            .saturating_sub(self.min_cell.0)
            .max(self.max_cell.0.saturating_sub(center.0))
            .max(center.1.saturating_sub(self.min_cell.1))
            .max(self.max_cell.1.saturating_sub(center.1))
            .max(0);
        let limit = extent.min(i64::from(max_rings));

        let mut best = None;
        for r in 0..=limit {
            self.scan_ring(query, center, r, &mut best);
            if let Some((_, d)) = best {
                // Points beyond ring r are at least r cells away
                let reach = r as f64 * self.cell_size;
                if d.sqrt() < reach {
                    return best;
                }
            }
        }
        if limit == extent {
            return best;
        }

        debug!(
            "[Reconstruct] Ring search exhausted {} rings, scanning {} points",
            limit, self.remaining
        );
        let mut best = None;
        for idx in (0..self.points.len()).filter(|&i| !self.visited[i]) {
            self.consider(query, idx, &mut best);
        }
        best
    }
}

/// Link a pool of coordinates into chains by nearest-neighbor order.
///
/// Chains are returned in discovery order. A coordinate identical to the chain's last one
/// is consumed without being appended, so overlapping fragment ends collapse.
pub fn chain_points(points: &[GpsPoint], config: &TraceConfig) -> Vec<Vec<GpsPoint>> {
    if points.len() < 2 {
        return Vec::new();
    }
    let gap_sq = config.gap_threshold_deg * config.gap_threshold_deg;
    let mut grid = PointGrid::new(points, config.grid_cell_deg);

    // Westmost point, then southmost
    let start = (0..points.len())
        .min_by(|&a, &b| {
            points[a]
                .longitude
                .total_cmp(&points[b].longitude)
                .then(points[a].latitude.total_cmp(&points[b].latitude))
        })
        .unwrap_or(0);

    grid.remove(start);
    let mut chains: Vec<Vec<GpsPoint>> = vec![vec![points[start]]];
    let mut current = start;

    while let Some((next, d)) = grid.nearest(&points[current], config.max_ring_radius) {
        grid.remove(next);
        if d > gap_sq {
            debug!(
                "[Reconstruct] Gap of {:.4} deg after chain {}, starting new chain",
                d.sqrt(),
                chains.len()
            );
            chains.push(Vec::new());
        }
        if let Some(chain) = chains.last_mut() {
            if chain.last() != Some(&points[next]) {
                chain.push(points[next]);
            }
        }
        current = next;
    }

    chains
}

/// Result of reconstructing a path from raw input.
#[derive(Debug, Clone)]
pub struct Reconstruction {
    pub path: ReconstructedPath,
    /// The path was built from point features because line data was too sparse
    pub from_points: bool,
    /// Size of the coordinate pool that was chained
    pub pool_size: usize,
}

#[derive(Default)]
struct CoordinatePool {
    line_coords: Vec<GpsPoint>,
    point_coords: Vec<GpsPoint>,
}

impl GeometryVisitor for CoordinatePool {
    fn visit_point(&mut self, point: &GpsPoint) {
        self.point_coords.push(*point);
    }

    fn visit_line(&mut self, line: &[GpsPoint]) {
        self.line_coords.extend_from_slice(line);
    }
}

/// Reconstruct one or more continuous chains from all line fragments of the input.
///
/// When point features outnumber line coordinates by more than
/// `point_substitution_ratio`, the points themselves become the pool. Returns `None` when
/// fewer than two usable coordinates remain.
pub fn reconstruct_path(input: &GeoInput, config: &TraceConfig) -> Option<Reconstruction> {
    let start = std::time::Instant::now();
    let mut pool = CoordinatePool::default();
    input.walk(&mut pool);

    let line_count = pool.line_coords.len();
    let point_count = pool.point_coords.len();
    let from_points = point_count >= 2
        && point_count as f64 > config.point_substitution_ratio * line_count as f64;
    let mut coords = if from_points {
        info!(
            "[Reconstruct] Line data too sparse ({} coords vs {} points), using points",
            line_count, point_count
        );
        pool.point_coords
    } else {
        pool.line_coords
    };
    coords.dedup();

    if coords.len() < 2 {
        debug!(
            "[Reconstruct] Only {} usable coordinates, nothing to reconstruct",
            coords.len()
        );
        return None;
    }

    let chains = chain_points(&coords, config);
    let path = TraceGeometry::from_chains(chains)?;

    info!(
        "[Reconstruct] {} chains ({} points) from pool of {} in {}ms",
        path.chains().len(),
        path.point_count(),
        coords.len(),
        start.elapsed().as_millis()
    );

    Some(Reconstruction {
        path,
        from_points,
        pool_size: coords.len(),
    })
}
