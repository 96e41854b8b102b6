//! # Attribute Preferences
//!
//! Matches trails to a hiker's wishes (interest points on the way, rough
//! length, difficulty, loop or not) instead of to an elevation profile.
//!
//! Every attribute becomes a string shingle, e.g. `"Waterfall"`, `"short"`,
//! `"Easy"`, `"loop"`. Listings inside the requested area are MinHashed into
//! an LSH index and the preference set is looked up against it.

use std::collections::BTreeSet;

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::error::Result;
use crate::geo_utils::{geodesic_distance, min_distance_to_track, track_length_km};
use crate::minhash::{LshIndex, MinHasher};
use crate::{Bounds, Difficulty, GpsPoint};

/// Every n-th track point is checked against interest points.
const POI_SAMPLING_STRIDE: usize = 50;

/// Kind of interest point near a trail.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum PointTag {
    #[serde(rename = "River/Creek")]
    River,
    Waterfall,
    Birding,
    Cave,
    /// Lakes and other standing water
    Lake,
    Spring,
    #[serde(rename = "Geological Significance")]
    Geologic,
    #[serde(rename = "Historical Significance")]
    Historic,
}

impl PointTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            PointTag::River => "River/Creek",
            PointTag::Waterfall => "Waterfall",
            PointTag::Birding => "Birding",
            PointTag::Cave => "Cave",
            PointTag::Lake => "Lake",
            PointTag::Spring => "Spring",
            PointTag::Geologic => "Geological Significance",
            PointTag::Historic => "Historical Significance",
        }
    }
}

/// Rough trail length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthClass {
    Short,
    Medium,
    Long,
}

impl LengthClass {
    /// Under 5 km is short, under 15 km medium, anything longer long.
    pub fn from_km(length_km: f64) -> Self {
        if length_km < 5.0 {
            LengthClass::Short
        } else if length_km < 15.0 {
            LengthClass::Medium
        } else {
            LengthClass::Long
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LengthClass::Short => "short",
            LengthClass::Medium => "medium",
            LengthClass::Long => "long",
        }
    }
}

/// Whether a trail returns to its start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TrackShape {
    #[serde(rename = "loop")]
    Loop,
    #[serde(rename = "not loop")]
    PointToPoint,
}

impl TrackShape {
    /// A loop ends within `loop_threshold_m` of its start.
    pub fn from_points(points: &[GpsPoint], loop_threshold_m: f64) -> Option<Self> {
        let (first, last) = (points.first()?, points.last()?);
        if points.len() > 1 && geodesic_distance(first, last) < loop_threshold_m {
            Some(TrackShape::Loop)
        } else {
            Some(TrackShape::PointToPoint)
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TrackShape::Loop => "loop",
            TrackShape::PointToPoint => "not loop",
        }
    }
}

/// A tagged point of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct InterestPoint {
    pub position: GpsPoint,
    pub tag: PointTag,
}

/// Tags of interest points within `max_distance_m` of the track.
///
/// Only every 50th track point (and the last one) is measured, which is
/// accurate enough for densely recorded tracks.
pub fn interest_points_near(
    track: &[GpsPoint],
    pois: &[InterestPoint],
    max_distance_m: f64,
) -> BTreeSet<PointTag> {
    pois.iter()
        .filter(|poi| {
            min_distance_to_track(&poi.position, track, POI_SAMPLING_STRIDE) < max_distance_m
        })
        .map(|poi| poi.tag)
        .collect()
}

/// Descriptive attributes of a trail or of a request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrailAttributes {
    #[serde(default)]
    pub tags: BTreeSet<PointTag>,
    pub length: Option<LengthClass>,
    pub difficulty: Option<Difficulty>,
    pub shape: Option<TrackShape>,
}

impl TrailAttributes {
    /// Derive attributes from a recorded track and nearby interest points.
    pub fn from_track(
        points: &[GpsPoint],
        pois: &[InterestPoint],
        difficulty: Option<Difficulty>,
        config: &EngineConfig,
    ) -> Self {
        Self {
            tags: interest_points_near(points, pois, config.poi_distance_m),
            length: (points.len() > 1).then(|| LengthClass::from_km(track_length_km(points))),
            difficulty,
            shape: TrackShape::from_points(points, config.loop_threshold_m),
        }
    }

    /// One string shingle per attribute that is set.
    pub fn shingles(&self) -> BTreeSet<String> {
        let mut set: BTreeSet<String> = self.tags.iter().map(|t| t.as_str().to_string()).collect();
        set.extend(self.length.map(|l| l.as_str().to_string()));
        set.extend(self.difficulty.map(|d| d.as_str().to_string()));
        set.extend(self.shape.map(|s| s.as_str().to_string()));
        set
    }
}

/// A candidate trail for preference matching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrailListing {
    pub id: String,
    pub bounds: Bounds,
    pub attributes: TrailAttributes,
}

/// What a hiker is looking for, and where.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PreferenceQuery {
    pub area: Bounds,
    pub attributes: TrailAttributes,
}

/// Ids of listings inside the query area whose attributes are likely similar
/// to the requested ones, in listing order.
///
/// Approximate: `threshold` and `num_perm` tune the LSH index, so close
/// matches may be missed and loose ones reported.
pub fn match_preferences(
    query: &PreferenceQuery,
    listings: &[TrailListing],
    threshold: f64,
    num_perm: usize,
    seed: u64,
) -> Result<Vec<String>> {
    let hasher = MinHasher::new(num_perm, seed);
    let mut lsh = LshIndex::new(threshold, num_perm)?;

    let mut indexed = 0;
    for listing in listings
        .iter()
        .filter(|l| query.area.contains_bounds(&l.bounds))
    {
        let shingles = listing.attributes.shingles();
        if shingles.is_empty() {
            continue;
        }
        if lsh.contains(&listing.id) {
            warn!("[Preferences] Skipping repeated listing id '{}'", listing.id);
            continue;
        }
        lsh.insert(listing.id.clone(), &hasher.sketch_items(&shingles))?;
        indexed += 1;
    }

    let wanted = query.attributes.shingles();
    if wanted.is_empty() {
        return Ok(Vec::new());
    }
    let matches = lsh.query(&hasher.sketch_items(&wanted))?;
    debug!(
        "[Preferences] {} of {} listings in area, {} matched",
        indexed,
        listings.len(),
        matches.len()
    );
    Ok(matches)
}
