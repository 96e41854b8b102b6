//! # Geographic Utilities
//!
//! | Function | Description |
//! |----------|-------------|
//! | [`geodesic_distance`] | WGS84 geodesic distance between two points (meters) |
//! | [`distance_profile`] | Cumulative path distance at every track point (km) |
//! | [`track_length_km`] | Total track length (km) |
//! | [`min_distance_to_track`] | Closest approach of a point to sampled track points (meters) |
//!
//! All functions expect WGS84 latitude/longitude in degrees.

use geo::{Distance, Geodesic, Point};

use crate::GpsPoint;

/// Geodesic distance between two GPS points on the WGS84 ellipsoid, in meters.
///
/// ```rust
/// use trail_matcher::{GpsPoint, geo_utils};
///
/// let a = GpsPoint::new(48.0, 8.0);
/// let b = GpsPoint::new(48.0, 8.01);
/// let d = geo_utils::geodesic_distance(&a, &b);
/// assert!((d - 745.0).abs() < 5.0);
/// ```
#[inline]
pub fn geodesic_distance(p1: &GpsPoint, p2: &GpsPoint) -> f64 {
    let point1 = Point::new(p1.longitude, p1.latitude);
    let point2 = Point::new(p2.longitude, p2.latitude);
    Geodesic::distance(point1, point2)
}

/// Cumulative distance along the track, in km, aligned with `points`.
///
/// Index 0 is always 0 and the sequence never decreases. An empty track
/// yields an empty profile.
pub fn distance_profile(points: &[GpsPoint]) -> Vec<f64> {
    if points.is_empty() {
        return Vec::new();
    }

    let mut kms = Vec::with_capacity(points.len());
    let mut total = 0.0;
    kms.push(total);
    for w in points.windows(2) {
        total += geodesic_distance(&w[0], &w[1]) / 1000.0;
        kms.push(total);
    }
    kms
}

/// Total length of a track in km.
pub fn track_length_km(points: &[GpsPoint]) -> f64 {
    points
        .windows(2)
        .map(|w| geodesic_distance(&w[0], &w[1]))
        .sum::<f64>()
        / 1000.0
}

/// Smallest distance in meters from `point` to every `stride`-th track point.
///
/// The last track point is always considered. Returns `f64::INFINITY` for an
/// empty track.
pub fn min_distance_to_track(point: &GpsPoint, track: &[GpsPoint], stride: usize) -> f64 {
    let stride = stride.max(1);
    let sampled = track.iter().step_by(stride).chain(track.last());
    sampled
        .map(|p| geodesic_distance(p, point))
        .fold(f64::INFINITY, f64::min)
}
