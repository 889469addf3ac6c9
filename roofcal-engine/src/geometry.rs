//! Geometry Kernel
//!
//! Pure functions over lat/lon rings (implicitly closed, ≥3 vertices for a
//! non-zero area) and roof pitch conversions.
//!
//! # Projection
//! Areas use a local equirectangular projection applied per vertex:
//! ```text
//! x = lon · 111320 · cos(lat · π/180)
//! y = lat · 110540
//! ```
//! followed by the shoelace formula. Perimeters use haversine distances.
//!
//! # Shape Analysis
//! `analyze_geometry` simplifies the ring (Douglas-Peucker), measures
//! compactness (area / perimeter²) and bounding-box aspect ratio, and maps
//! the result to an estimated roof segment count and complexity bucket.

use crate::types::{Complexity, LatLng};
use serde::{Deserialize, Serialize};

/// Meters per degree of longitude at the equator
pub const METERS_PER_DEGREE_LON: f64 = 111_320.0;

/// Meters per degree of latitude
pub const METERS_PER_DEGREE_LAT: f64 = 110_540.0;

/// Mean Earth radius for haversine distances
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Square meters to square feet
pub const SQ_M_TO_SQ_FT: f64 = 10.7639;

/// Simplification tolerance used by `analyze_geometry`
pub const ANALYSIS_TOLERANCE_M: f64 = 0.5;

/// Compactness above which a ≤5-vertex outline counts as rectangular
const RECTANGULAR_MIN_COMPACTNESS: f64 = 0.04;

/// Bounding-box aspect ratio above which a rectangle counts as elongated
const ELONGATED_MIN_ASPECT: f64 = 1.5;

/// Shape metrics of a footprint outline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeometryAnalysis {
    pub vertex_count: usize,
    pub simplified_vertex_count: usize,
    pub area_sq_m: f64,
    pub perimeter_m: f64,
    pub compactness_ratio: f64,
    pub aspect_ratio: f64,
    pub is_rectangular: bool,
    pub estimated_segments: u32,
    pub complexity: Complexity,
}

fn project(point: &LatLng) -> (f64, f64) {
    let x = point.lng * METERS_PER_DEGREE_LON * (point.lat.to_radians()).cos();
    let y = point.lat * METERS_PER_DEGREE_LAT;
    (x, y)
}

/// Polygon area in square meters (0 for fewer than 3 vertices)
pub fn polygon_area(vertices: &[LatLng]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }

    let projected: Vec<(f64, f64)> = vertices.iter().map(project).collect();
    let n = projected.len();
    let twice_area: f64 = (0..n)
        .map(|i| {
            let (x1, y1) = projected[i];
            let (x2, y2) = projected[(i + 1) % n];
            x1 * y2 - x2 * y1
        })
        .sum();

    twice_area.abs() / 2.0
}

/// Great-circle distance between two points in meters
pub fn haversine_distance(a: &LatLng, b: &LatLng) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2)
        + a.lat.to_radians().cos() * b.lat.to_radians().cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Perimeter of the closed ring in meters
pub fn perimeter(vertices: &[LatLng]) -> f64 {
    if vertices.len() < 2 {
        return 0.0;
    }
    let n = vertices.len();
    (0..n)
        .map(|i| haversine_distance(&vertices[i], &vertices[(i + 1) % n]))
        .sum()
}

/// Perpendicular distance (degrees) from `point` to the chord `start`–`end`
///
/// Falls back to point distance for a zero-length chord.
fn perpendicular_distance(point: &LatLng, start: &LatLng, end: &LatLng) -> f64 {
    let dx = end.lng - start.lng;
    let dy = end.lat - start.lat;
    let chord = (dx * dx + dy * dy).sqrt();

    if chord == 0.0 {
        let px = point.lng - start.lng;
        let py = point.lat - start.lat;
        return (px * px + py * py).sqrt();
    }

    (dy * point.lng - dx * point.lat + end.lng * start.lat - end.lat * start.lng).abs() / chord
}

fn douglas_peucker(points: &[LatLng], tolerance_deg: f64, out: &mut Vec<LatLng>) {
    let last = points.len() - 1;
    let (mut max_distance, mut split) = (0.0_f64, 0);
    for (i, point) in points.iter().enumerate().take(last).skip(1) {
        let distance = perpendicular_distance(point, &points[0], &points[last]);
        if distance > max_distance {
            max_distance = distance;
            split = i;
        }
    }

    if max_distance > tolerance_deg && split > 0 {
        douglas_peucker(&points[..=split], tolerance_deg, out);
        // Split vertex already emitted by the left half
        out.pop();
        douglas_peucker(&points[split..], tolerance_deg, out);
    } else {
        out.push(points[0]);
        out.push(points[last]);
    }
}

/// Douglas-Peucker simplification with a tolerance in meters
///
/// Rings of ≤2 points are returned unchanged. The first and last vertices are
/// always preserved.
pub fn simplify(vertices: &[LatLng], tolerance_m: f64) -> Vec<LatLng> {
    if vertices.len() <= 2 {
        return vertices.to_vec();
    }

    let tolerance_deg = tolerance_m / METERS_PER_DEGREE_LON;
    let mut out = Vec::with_capacity(vertices.len());
    douglas_peucker(vertices, tolerance_deg, &mut out);
    out
}

/// Long side / short side of the bounding box (0 when degenerate)
///
/// Measured in a projection local to the first vertex; the absolute
/// projection used for areas shears outlines far from the prime meridian.
fn aspect_ratio(vertices: &[LatLng]) -> f64 {
    let Some(origin) = vertices.first() else {
        return 0.0;
    };
    let cos_lat = origin.lat.to_radians().cos();
    let (mut min_x, mut max_x) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_y, mut max_y) = (f64::INFINITY, f64::NEG_INFINITY);
    for point in vertices {
        let x = (point.lng - origin.lng) * METERS_PER_DEGREE_LON * cos_lat;
        let y = (point.lat - origin.lat) * METERS_PER_DEGREE_LAT;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    let width = max_x - min_x;
    let height = max_y - min_y;
    let short = width.min(height);
    if short <= 0.0 || !short.is_finite() {
        return 0.0;
    }
    width.max(height) / short
}

fn estimate_segments(simplified_count: usize, is_rectangular: bool, aspect: f64) -> u32 {
    if is_rectangular {
        return if aspect > ELONGATED_MIN_ASPECT { 2 } else { 4 };
    }
    match simplified_count {
        0..=5 => 4,
        6..=8 => 6,
        9..=12 => 8,
        n => n.div_ceil(2).min(12) as u32,
    }
}

/// Analyze a footprint outline
pub fn analyze_geometry(vertices: &[LatLng]) -> GeometryAnalysis {
    let area_sq_m = polygon_area(vertices);
    let perimeter_m = perimeter(vertices);
    let compactness_ratio = if perimeter_m > 0.0 {
        area_sq_m / (perimeter_m * perimeter_m)
    } else {
        0.0
    };

    let simplified = simplify(vertices, ANALYSIS_TOLERANCE_M);
    let simplified_vertex_count = simplified.len();
    let aspect = aspect_ratio(&simplified);
    let is_rectangular =
        simplified_vertex_count <= 5 && compactness_ratio > RECTANGULAR_MIN_COMPACTNESS;
    let estimated_segments = estimate_segments(simplified_vertex_count, is_rectangular, aspect);

    GeometryAnalysis {
        vertex_count: vertices.len(),
        simplified_vertex_count,
        area_sq_m,
        perimeter_m,
        compactness_ratio,
        aspect_ratio: aspect,
        is_rectangular,
        estimated_segments,
        complexity: Complexity::from_count(simplified_vertex_count),
    }
}

// ============================================================================
// Pitch
// ============================================================================

/// Pitch multiplier for a rise per 12 units of run: sqrt((rise/12)² + 1)
pub fn pitch_multiplier(rise_per_12: f64) -> f64 {
    ((rise_per_12 / 12.0).powi(2) + 1.0).sqrt()
}

pub fn pitch_degrees_from_rise(rise_per_12: f64) -> f64 {
    (rise_per_12 / 12.0).atan().to_degrees()
}

pub fn rise_from_pitch_degrees(degrees: f64) -> f64 {
    degrees.to_radians().tan() * 12.0
}

/// Pitch multiplier for an angle; equals `pitch_multiplier` of the same slope
pub fn multiplier_from_degrees(degrees: f64) -> f64 {
    let cos = degrees.to_radians().cos();
    if cos <= f64::EPSILON {
        1.0
    } else {
        1.0 / cos
    }
}
