//! # Geographic Utilities
//!
//! Core geometry for circuit indexing: great-circle distances, track length,
//! degree spans and point-in-polygon containment.
//!
//! ## Overview
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`haversine_distance`] | Great-circle distance between two points |
//! | [`great_circle_distance`] | Same, on raw latitude/longitude values |
//! | [`track_distance`] | Total length of a track in meters |
//! | [`meters_to_degrees`] | Degree span that covers a distance at a latitude |
//! | [`point_in_polygon`] | Even-odd ray casting over a polygon's exterior ring |
//!
//! ## Example
//!
//! ```rust
//! use circuit_index::{GeoPoint, geo_utils};
//!
//! let track = vec![
//!     GeoPoint::new(33.8076, 10.8451),
//!     GeoPoint::new(33.8080, 10.8460),
//!     GeoPoint::new(33.8090, 10.8470),
//! ];
//!
//! let length = geo_utils::track_distance(&track);
//! assert_eq!(geo_utils::format_km(length), "0.2 km");
//! ```
//!
//! ## Algorithm Notes
//!
//! ### Haversine Formula
//!
//! Distances use the haversine formula on a sphere of radius [`EARTH_RADIUS_M`]
//! (6,371,000 m). Circuit distances in published indexes were computed with this
//! exact radius, so it is not swapped for an ellipsoidal model.
//!
//! ### Point in Polygon
//!
//! Containment is decided by even-odd ray casting against the exterior ring
//! only. Holes and antimeridian-crossing rings are not supported. Boundary
//! points follow the half-open rule of the crossing test: a point on a lower or
//! left edge counts as inside, a point on an upper or right edge as outside.

use crate::{GeoPoint, PlanarPoint};

/// Mean Earth radius used by every distance computation, in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Meters spanned by one degree of latitude on the [`EARTH_RADIUS_M`] sphere.
pub const METERS_PER_DEGREE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

// =============================================================================
// Distance Functions
// =============================================================================

/// Great-circle distance in meters between two latitude/longitude pairs.
///
/// # Example
///
/// ```rust
/// use circuit_index::geo_utils;
///
/// // One degree of latitude at the equator
/// let d = geo_utils::great_circle_distance(0.0, 0.0, 1.0, 0.0);
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
pub fn great_circle_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin() * (d_phi / 2.0).sin()
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin() * (d_lambda / 2.0).sin();
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

/// Great-circle distance between two points in meters.
#[inline]
pub fn haversine_distance(p1: &GeoPoint, p2: &GeoPoint) -> f64 {
    great_circle_distance(p1.latitude, p1.longitude, p2.latitude, p2.longitude)
}

/// Total length of a track in meters.
///
/// Sums the haversine distance between consecutive points. Empty or
/// single-point tracks return 0.0.
///
/// # Example
///
/// ```rust
/// use circuit_index::{GeoPoint, geo_utils};
///
/// let a = GeoPoint::new(33.80, 10.85);
/// let b = GeoPoint::new(33.81, 10.85);
/// let c = GeoPoint::new(33.81, 10.86);
///
/// let total = geo_utils::track_distance(&[a, b, c]);
/// let legs = geo_utils::haversine_distance(&a, &b) + geo_utils::haversine_distance(&b, &c);
/// assert_eq!(total, legs);
/// ```
pub fn track_distance(points: &[GeoPoint]) -> f64 {
    if points.len() < 2 {
        return 0.0;
    }

    points
        .windows(2)
        .map(|w| haversine_distance(&w[0], &w[1]))
        .sum()
}

/// Format a distance in meters as kilometers with one decimal, e.g. `"12.3 km"`.
pub fn format_km(meters: f64) -> String {
    format!("{:.1} km", meters / 1000.0)
}

/// Degree span that covers `meters` in any direction at the given latitude.
///
/// Returns the longitude span, which is never smaller than the latitude span.
/// The cosine is floored at 0.01, so the result is only a safe cover below
/// roughly 89.4° of latitude.
#[inline]
pub fn meters_to_degrees(meters: f64, latitude: f64) -> f64 {
    let cos_lat = latitude.to_radians().cos().max(0.01);
    meters / (METERS_PER_DEGREE * cos_lat)
}

// =============================================================================
// Polygon Functions
// =============================================================================

/// Even-odd ray casting test of `point` against a polygon's exterior ring.
///
/// The ring may be open or closed (first vertex repeated at the end).
///
/// # Example
///
/// ```rust
/// use circuit_index::{geo_utils, PlanarPoint};
///
/// let square: Vec<PlanarPoint> = [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]
///     .iter()
///     .map(|&(x, y)| PlanarPoint { x, y })
///     .collect();
///
/// assert!(geo_utils::point_in_polygon(PlanarPoint { x: 0.5, y: 0.5 }, &square));
/// assert!(!geo_utils::point_in_polygon(PlanarPoint { x: 2.0, y: 2.0 }, &square));
/// ```
pub fn point_in_polygon(point: PlanarPoint, ring: &[PlanarPoint]) -> bool {
    if ring.len() < 3 {
        return false;
    }

    let (x, y) = (point.x, point.y);
    let mut inside = false;
    let mut j = ring.len() - 1;

    for i in 0..ring.len() {
        let (xi, yi) = (ring[i].x, ring[i].y);
        let (xj, yj) = (ring[j].x, ring[j].y);

        if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
            inside = !inside;
        }
        j = i;
    }

    inside
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn approx_eq(a: f64, b: f64, epsilon: f64) -> bool {
        (a - b).abs() < epsilon
    }

    fn unit_square() -> Vec<PlanarPoint> {
        [(0.0, 0.0), (0.0, 1.0), (1.0, 1.0), (1.0, 0.0)]
            .iter()
            .map(|&(x, y)| PlanarPoint { x, y })
            .collect()
    }

    #[test]
    fn test_haversine_distance_same_point() {
        let p = GeoPoint::new(33.8076, 10.8451);
        assert_eq!(haversine_distance(&p, &p), 0.0);
    }

    #[test]
    fn test_one_degree_latitude_at_equator() {
        let d = great_circle_distance(0.0, 0.0, 1.0, 0.0);
        assert!(approx_eq(d, 111_195.0, 111_195.0 * 0.005));
        assert!(approx_eq(d, METERS_PER_DEGREE, 1e-6));
    }

    #[test]
    fn test_haversine_distance_known_value() {
        // London to Paris is approximately 344 km
        let dist = great_circle_distance(51.5074, -0.1278, 48.8566, 2.3522);
        assert!(approx_eq(dist, 343_560.0, 5000.0));
    }

    #[test]
    fn test_distance_is_symmetric() {
        let a = GeoPoint::new(33.80, 10.85);
        let b = GeoPoint::new(33.87, 10.99);
        assert!(approx_eq(haversine_distance(&a, &b), haversine_distance(&b, &a), 1e-9));
    }

    #[test]
    fn test_track_distance_empty_and_single() {
        assert_eq!(track_distance(&[]), 0.0);
        assert_eq!(track_distance(&[GeoPoint::new(33.8, 10.8)]), 0.0);
    }

    #[test]
    fn test_track_distance_is_sum_of_legs() {
        let a = GeoPoint::new(33.80, 10.85);
        let b = GeoPoint::new(33.81, 10.86);
        let c = GeoPoint::new(33.80, 10.87);
        let expected = haversine_distance(&a, &b) + haversine_distance(&b, &c);
        assert_eq!(track_distance(&[a, b, c]), expected);
    }

    #[test]
    fn test_track_distance_backtracking_exceeds_direct() {
        let a = GeoPoint::new(0.0, 0.0);
        let b = GeoPoint::new(0.01, 0.0);
        let total = track_distance(&[a, b, a]);
        assert!(total > 0.0);
        assert_eq!(haversine_distance(&a, &a), 0.0);
    }

    #[test]
    fn test_format_km() {
        assert_eq!(format_km(0.0), "0.0 km");
        assert_eq!(format_km(512.0), "0.5 km");
        assert_eq!(format_km(12_345.0), "12.3 km");
    }

    #[test]
    fn test_meters_to_degrees() {
        let deg = meters_to_degrees(METERS_PER_DEGREE, 0.0);
        assert!(approx_eq(deg, 1.0, 1e-9));

        // Longitude degrees shrink away from the equator, so the span grows
        let deg_60 = meters_to_degrees(METERS_PER_DEGREE, 60.0);
        assert!(approx_eq(deg_60, 2.0, 1e-6));
    }

    #[test]
    fn test_point_in_unit_square() {
        let square = unit_square();
        assert!(point_in_polygon(PlanarPoint { x: 0.5, y: 0.5 }, &square));
        assert!(!point_in_polygon(PlanarPoint { x: 2.0, y: 2.0 }, &square));
        assert!(!point_in_polygon(PlanarPoint { x: -0.5, y: 0.5 }, &square));
    }

    #[test]
    fn test_point_in_polygon_vertices_are_half_open() {
        let square = unit_square();
        // Lower-left vertex is inside, upper-right is outside
        assert!(point_in_polygon(PlanarPoint { x: 0.0, y: 0.0 }, &square));
        assert!(!point_in_polygon(PlanarPoint { x: 1.0, y: 1.0 }, &square));
        // Same answer every time
        for _ in 0..3 {
            assert!(point_in_polygon(PlanarPoint { x: 0.0, y: 0.0 }, &square));
        }
    }

    #[test]
    fn test_point_in_polygon_closed_ring() {
        let mut ring = unit_square();
        ring.push(ring[0]);
        assert!(point_in_polygon(PlanarPoint { x: 0.25, y: 0.75 }, &ring));
        assert!(!point_in_polygon(PlanarPoint { x: 1.25, y: 0.75 }, &ring));
    }

    #[test]
    fn test_point_in_concave_polygon() {
        // U shape open at the top
        let ring: Vec<PlanarPoint> = [
            (0.0, 0.0), (3.0, 0.0), (3.0, 3.0), (2.0, 3.0),
            (2.0, 1.0), (1.0, 1.0), (1.0, 3.0), (0.0, 3.0),
        ]
        .iter()
        .map(|&(x, y)| PlanarPoint { x, y })
        .collect();
        assert!(point_in_polygon(PlanarPoint { x: 0.5, y: 2.0 }, &ring));
        assert!(!point_in_polygon(PlanarPoint { x: 1.5, y: 2.0 }, &ring));
        assert!(point_in_polygon(PlanarPoint { x: 1.5, y: 0.5 }, &ring));
    }

    #[test]
    fn test_degenerate_ring() {
        let ring = vec![PlanarPoint { x: 0.0, y: 0.0 }, PlanarPoint { x: 1.0, y: 1.0 }];
        assert!(!point_in_polygon(PlanarPoint { x: 0.5, y: 0.5 }, &ring));
    }
}
