//! Tests for fragment reconstruction

use highway_trace::{
    chain_points, reconstruct_path, GeoInput, GpsPoint, PointGrid, TraceConfig, TraceGeometry,
};
use serde_json::json;

fn pt(lng: f64, lat: f64) -> GpsPoint {
    GpsPoint::new(lat, lng)
}

fn fragment(coords: &[[f64; 2]]) -> serde_json::Value {
    json!({
        "type": "Feature",
        "properties": {},
        "geometry": {"type": "LineString", "coordinates": coords}
    })
}

fn collection(features: Vec<serde_json::Value>) -> GeoInput {
    GeoInput::from_json_value(json!({"type": "FeatureCollection", "features": features})).unwrap()
}

/// Tiny deterministic generator so pools are reproducible without extra dependencies.
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6364136223846793005)
            .wrapping_add(1442695040888963407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

fn permutations<T: Clone>(items: &[T]) -> Vec<Vec<T>> {
    if items.len() <= 1 {
        return vec![items.to_vec()];
    }
    let mut result = Vec::new();
    for i in 0..items.len() {
        let mut rest = items.to_vec();
        let head = rest.remove(i);
        for mut tail in permutations(&rest) {
            tail.insert(0, head.clone());
            result.push(tail);
        }
    }
    result
}

// ============================================================================
// Fragment Ordering
// ============================================================================

#[test]
fn test_fragments_in_any_order_form_one_line() {
    let a = fragment(&[[0.0, 0.0], [0.0, 1.0]]);
    let c = fragment(&[[0.0, 1.0], [0.0, 3.0]]);
    let b = fragment(&[[0.0, 3.0], [0.0, 4.0]]);

    // Whole-degree spacing needs a gap threshold above 2 degrees
    let config = TraceConfig {
        gap_threshold_deg: 5.0,
        ..TraceConfig::default()
    };
    let expected = vec![pt(0.0, 0.0), pt(0.0, 1.0), pt(0.0, 3.0), pt(0.0, 4.0)];

    for order in permutations(&[a, b, c]) {
        let input = collection(order);
        let reconstruction = reconstruct_path(&input, &config).unwrap();
        assert_eq!(reconstruction.path, TraceGeometry::LineString(expected.clone()));
        assert!(!reconstruction.from_points);
    }
}

#[test]
fn test_scaled_fragments_under_defaults() {
    let a = fragment(&[[0.0, 0.0], [0.0, 0.01]]);
    let c = fragment(&[[0.0, 0.01], [0.0, 0.03]]);
    let b = fragment(&[[0.0, 0.03], [0.0, 0.04]]);
    let expected = vec![pt(0.0, 0.0), pt(0.0, 0.01), pt(0.0, 0.03), pt(0.0, 0.04)];

    for order in permutations(&[a, b, c]) {
        let reconstruction = reconstruct_path(&collection(order), &TraceConfig::default()).unwrap();
        assert_eq!(reconstruction.path, TraceGeometry::LineString(expected.clone()));
    }
}

#[test]
fn test_distant_fragments_form_two_chains() {
    let input = collection(vec![
        fragment(&[[-56.0, -15.0], [-56.0, -15.02]]),
        fragment(&[[-55.0, -15.0], [-55.0, -15.02]]),
    ]);
    let reconstruction = reconstruct_path(&input, &TraceConfig::default()).unwrap();
    match reconstruction.path {
        TraceGeometry::MultiLineString(chains) => {
            assert_eq!(chains.len(), 2);
            for chain in &chains {
                assert_eq!(chain.len(), 2);
                assert_eq!(chain[0].longitude, chain[1].longitude);
            }
        }
        other => panic!("expected two chains, got {:?}", other),
    }
}

#[test]
fn test_reversed_fragment_is_absorbed() {
    // Second fragment digitized in the opposite direction
    let input = collection(vec![
        fragment(&[[0.0, 0.0], [0.0, 0.01], [0.0, 0.02]]),
        fragment(&[[0.0, 0.04], [0.0, 0.03], [0.0, 0.02]]),
    ]);
    let reconstruction = reconstruct_path(&input, &TraceConfig::default()).unwrap();
    let chains = reconstruction.path.chains();
    assert_eq!(chains.len(), 1);
    let lats: Vec<f64> = chains[0].iter().map(|p| p.latitude).collect();
    assert_eq!(lats, vec![0.0, 0.01, 0.02, 0.03, 0.04]);
}

#[test]
fn test_nested_collections_contribute_fragments() {
    let doc = json!({
        "type": "FeatureCollection",
        "features": [{
            "type": "Feature",
            "properties": {},
            "geometry": {"type": "GeometryCollection", "geometries": [
                {"type": "MultiLineString", "coordinates": [
                    [[0.0, 0.02], [0.0, 0.03]],
                    [[0.0, 0.0], [0.0, 0.01]]
                ]},
                {"type": "GeometryCollection", "geometries": [
                    {"type": "LineString", "coordinates": [[0.0, 0.01], [0.0, 0.02]]}
                ]}
            ]}
        }]
    });
    let input = GeoInput::from_json_value(doc).unwrap();
    let reconstruction = reconstruct_path(&input, &TraceConfig::default()).unwrap();
    assert!(!reconstruction.path.is_multi());
    assert_eq!(reconstruction.path.point_count(), 4);
}

// ============================================================================
// Degenerate Input
// ============================================================================

#[test]
fn test_no_usable_geometry() {
    assert!(reconstruct_path(&GeoInput::default(), &TraceConfig::default()).is_none());

    let single = collection(vec![json!({
        "type": "Feature",
        "properties": {"name": "KM 3"},
        "geometry": {"type": "Point", "coordinates": [-56.0, -15.0]}
    })]);
    assert!(reconstruct_path(&single, &TraceConfig::default()).is_none());
}

#[test]
fn test_points_substitute_sparse_lines() {
    let mut features = vec![fragment(&[[0.0, 0.0], [0.0, 0.001]])];
    for i in 0..6 {
        features.push(json!({
            "type": "Feature",
            "properties": {"name": format!("KM {}", i)},
            "geometry": {"type": "Point", "coordinates": [0.0, i as f64 * 0.01]}
        }));
    }
    let reconstruction = reconstruct_path(&collection(features), &TraceConfig::default()).unwrap();
    assert!(reconstruction.from_points);
    assert_eq!(reconstruction.path.point_count(), 6);
}

// ============================================================================
// Grid vs Brute Force
// ============================================================================

fn brute_force_nearest(
    points: &[GpsPoint],
    removed: &[bool],
    query: &GpsPoint,
) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in points.iter().enumerate() {
        if removed[i] {
            continue;
        }
        let dlat = p.latitude - query.latitude;
        let dlng = p.longitude - query.longitude;
        let d = dlat * dlat + dlng * dlng;
        if best.map_or(true, |(_, bd)| d < bd) {
            best = Some((i, d));
        }
    }
    best
}

#[test]
fn test_grid_matches_brute_force() {
    for seed in 1..=5u64 {
        let mut rng = Lcg(seed);
        // Clustered pool: a dense stretch plus scattered outliers
        let mut points: Vec<GpsPoint> = (0..300)
            .map(|_| pt(-56.0 + rng.next_f64() * 0.2, -15.0 + rng.next_f64() * 0.05))
            .collect();
        points.extend(
            (0..20).map(|_| pt(-58.0 + rng.next_f64() * 4.0, -17.0 + rng.next_f64() * 4.0)),
        );

        let mut grid = PointGrid::new(&points, 0.01);
        let mut removed = vec![false; points.len()];
        let mut current = 0;
        removed[current] = true;
        grid.remove(current);

        while let Some((idx, d)) = grid.nearest(&points[current], 64) {
            let (expected_idx, expected_d) =
                brute_force_nearest(&points, &removed, &points[current]).unwrap();
            assert_eq!(d, expected_d, "seed {seed}: distance differs");
            assert_eq!(idx, expected_idx, "seed {seed}: index differs");
            removed[idx] = true;
            grid.remove(idx);
            current = idx;
        }
        assert!(removed.iter().all(|r| *r));
        assert!(grid.is_empty());
    }
}

#[test]
fn test_chains_never_exceed_gap() {
    let mut rng = Lcg(42);
    let points: Vec<GpsPoint> = (0..500)
        .map(|_| pt(-56.0 + rng.next_f64() * 2.0, -15.0 + rng.next_f64() * 2.0))
        .collect();
    let config = TraceConfig::default();
    let chains = chain_points(&points, &config);

    let total: usize = chains.iter().map(|c| c.len()).sum();
    assert_eq!(total, points.len());
    for chain in &chains {
        for pair in chain.windows(2) {
            let dlat = pair[0].latitude - pair[1].latitude;
            let dlng = pair[0].longitude - pair[1].longitude;
            assert!((dlat * dlat + dlng * dlng).sqrt() <= config.gap_threshold_deg);
        }
    }
}
