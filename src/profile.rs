//! # Slope Profile
//!
//! Resamples a track's elevation at half-tick marks along its cumulative
//! distance and turns marks two apart into slope angles.
//!
//! ```text
//! marks:   0     t/2    t    3t/2   2t   ...  L
//! slopes:  [0 -> t] [t/2 -> 3t/2] [t -> 2t] ...
//! ```
//!
//! Slopes are `atan(Δelevation / span)` in degrees, with the elevation delta
//! in metres and the horizontal span in km. Reference corpora are built with
//! the same units, so signatures stay comparable.

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};
use crate::geo_utils::distance_profile;
use crate::raster::ElevationRaster;
use crate::GpsPoint;

/// Minimum number of track points needed for a non-empty profile.
pub const MIN_PROFILE_POINTS: usize = 3;

/// Tolerance for the last regular mark landing exactly on the track end.
const MARK_EPSILON: f64 = 1e-9;

/// Slope angles in degrees, one per resampled tick.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SlopeProfile(Vec<f64>);

impl SlopeProfile {
    pub fn new(slopes: Vec<f64>) -> Self {
        Self(slopes)
    }

    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_inner(self) -> Vec<f64> {
        self.0
    }
}

impl From<Vec<f64>> for SlopeProfile {
    fn from(slopes: Vec<f64>) -> Self {
        Self(slopes)
    }
}

/// Look up the raster elevation of every track point, in metres.
pub fn elevation_profile(points: &[GpsPoint], raster: &ElevationRaster) -> Result<Vec<f64>> {
    points
        .iter()
        .map(|p| raster.elevation_at_point(p).map(f64::from))
        .collect()
}

/// Compute the slope profile of a track with known elevations.
///
/// Tracks with fewer than three points, or shorter than one tick, give an
/// empty profile. The caller decides what an empty profile means.
pub fn slope_profile(points: &[GpsPoint], elevations: &[f64], tick_km: f64) -> Result<SlopeProfile> {
    if points.len() != elevations.len() {
        return Err(TrailError::LengthMismatch {
            points: points.len(),
            elevations: elevations.len(),
        });
    }
    if !(tick_km.is_finite() && tick_km > 0.0) {
        return Err(TrailError::config(format!("tick must be positive, got {}", tick_km)));
    }
    if points.len() < MIN_PROFILE_POINTS {
        return Ok(SlopeProfile::default());
    }

    let kms = distance_profile(points);
    let total = kms.last().copied().unwrap_or(0.0);
    if total < tick_km {
        return Ok(SlopeProfile::default());
    }

    let marks = resample_marks(total, tick_km);
    let elevs: Vec<f64> = marks
        .iter()
        .map(|&m| interpolate(&kms, elevations, m))
        .collect();

    let slopes = (0..marks.len().saturating_sub(2))
        .map(|i| {
            let span = marks[i + 2] - marks[i];
            ((elevs[i + 2] - elevs[i]) / span).atan().to_degrees()
        })
        .collect();

    Ok(SlopeProfile(slopes))
}

/// Resample marks every half tick up to `total`, plus the true end when it
/// lies more than a quarter tick past the last regular mark.
fn resample_marks(total: f64, tick_km: f64) -> Vec<f64> {
    let half = tick_km / 2.0;
    let mut marks: Vec<f64> = (0..)
        .map(|i| i as f64 * half)
        .take_while(|&m| m <= total + MARK_EPSILON)
        .collect();

    let last = marks.last().copied().unwrap_or(0.0);
    if total - last > tick_km / 4.0 {
        marks.push(total);
    }
    marks
}

/// Piecewise-linear interpolation of `ys` over non-decreasing `xs`,
/// clamped to the end values outside the range.
fn interpolate(xs: &[f64], ys: &[f64], x: f64) -> f64 {
    let j = xs.partition_point(|&v| v <= x);
    if j == 0 {
        return ys[0];
    }
    if j >= xs.len() {
        return ys[ys.len() - 1];
    }
    let (x0, x1) = (xs[j - 1], xs[j]);
    let (y0, y1) = (ys[j - 1], ys[j]);
    y0 + (y1 - y0) * (x - x0) / (x1 - x0)
}
