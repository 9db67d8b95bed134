//! Geographic utilities: great-circle distance, bearing, nearest path point.
//!
//! All functions are pure and operate on [`Coordinate`] values in degrees.

use geo::{algorithm::simplify::Simplify, LineString};

use crate::Coordinate;

/// Mean Earth radius in meters used by the haversine formula.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates in meters (haversine).
///
/// Symmetric and non-negative; zero for identical coordinates.
///
/// # Example
/// ```
/// use walking_tour::{Coordinate, geo_utils::distance_meters};
///
/// let a = Coordinate::new(50.000, 12.000);
/// let b = Coordinate::new(50.001, 12.000);
/// let d = distance_meters(&a, &b);
/// assert!((d - 111.2).abs() < 0.5);
/// ```
pub fn distance_meters(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Clamp guards against h drifting just above 1.0 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Initial compass bearing from `a` to `b` in degrees, in `[0, 360)`.
pub fn bearing_degrees(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlng = (b.longitude - a.longitude).to_radians();

    let y = dlng.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlng.cos();

    let bearing = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if bearing >= 360.0 {
        0.0
    } else {
        bearing
    }
}

/// Find the path vertex closest to `point`.
///
/// Returns the vertex and its distance in meters, or `None` for an empty path.
/// Ties resolve to the first occurrence.
pub fn closest_point_on_path(point: &Coordinate, path: &[Coordinate]) -> Option<(Coordinate, f64)> {
    let mut best: Option<(Coordinate, f64)> = None;
    for candidate in path {
        let d = distance_meters(point, candidate);
        match best {
            Some((_, best_d)) if d >= best_d => {}
            _ => best = Some((*candidate, d)),
        }
    }
    best
}

/// Total length of a polyline in meters.
pub fn polyline_length(points: &[Coordinate]) -> f64 {
    points
        .windows(2)
        .map(|w| distance_meters(&w[0], &w[1]))
        .sum()
}

/// Simplify a dense path with Douglas-Peucker for display.
///
/// `tolerance` is in degrees (0.0001 is roughly 11 meters). Paths with fewer
/// than 3 points are returned unchanged.
pub fn simplify_path(points: &[Coordinate], tolerance: f64) -> Vec<Coordinate> {
    if points.len() < 3 {
        return points.to_vec();
    }

    let line: LineString<f64> = points
        .iter()
        .map(|p| geo::Coord {
            x: p.longitude,
            y: p.latitude,
        })
        .collect();

    line.simplify(&tolerance)
        .0
        .iter()
        .map(|c| Coordinate::new(c.y, c.x))
        .collect()
}
