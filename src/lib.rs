//! # Trail Matcher
//!
//! Hiking trail difficulty estimation and similar-trail search from GPS tracks.
//!
//! A track's elevation profile is resampled at a length-dependent interval
//! ("tick"), turned into slope angles, quantized into 10° buckets and encoded
//! as a set of integer shingles. Signatures are compared against a labelled
//! reference corpus partitioned by track length, either exhaustively (Jaccard
//! top-k with a score-weighted vote) or approximately through a MinHash/LSH
//! index.
//!
//! ## Features
//!
//! - **`parallel`** - Enable parallel batch classification with rayon
//! - **`persistence`** - Enable the SQLite signature store
//! - **`full`** - Enable all features
//!
//! ## Quick Start
//!
//! ```rust
//! use trail_matcher::{shingle, jaccard, top_k_by_similarity};
//!
//! let query = shingle(&[10.0, 10.0, -20.0, -20.0], 2).unwrap();
//! let reference = shingle(&[10.0, 10.0, -20.0, 0.0], 2).unwrap();
//!
//! let score = jaccard(&query, &reference);
//! assert!(score > 0.0 && score < 1.0);
//!
//! let best = top_k_by_similarity(&query, &[reference], 5);
//! assert_eq!(best.len(), 1);
//! ```

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

// Unified error handling
pub mod error;
pub use error::{OptionExt, Result, TrailError};

// Engine configuration
pub mod config;
pub use config::EngineConfig;

// Geographic utilities (geodesic distance, cumulative distance, bounds)
pub mod geo_utils;

// Elevation raster and single-tile lookup
pub mod raster;
pub use raster::{ElevationRaster, RasterOrigin};
pub mod catalog;
pub use catalog::RasterCatalog;

// Track -> slope profile -> shingle signature
pub mod profile;
pub use profile::{elevation_profile, slope_profile, SlopeProfile};
pub mod shingle;
pub use shingle::{quantize, shingle, SignatureSet};

// Exact and approximate set similarity
pub mod similarity;
pub use similarity::{
    classify_by_knn, jaccard, rank_by_similarity, top_k_by_similarity, DifficultyVote, Neighbor,
};
pub mod minhash;
pub use minhash::{LshIndex, MinHash, MinHasher};

// Length buckets and the reference corpus
pub mod bucket;
pub use bucket::{BucketKey, LengthBuckets, SignatureParams};
pub mod corpus;
pub use corpus::{CorpusSource, JsonDirCorpus, MemoryCorpus, RawReference, ReferenceRecord};
pub mod store;
#[cfg(feature = "persistence")]
pub use store::SqliteStore;
pub use store::{MemoryStore, NullStore, SignatureStore};

// LRU cache for loaded reference buckets
pub mod lru_cache;

pub mod index;
pub use index::{CorpusIndex, IndexStats, ReferenceBucket};

// Attribute-preference matching (interest points, length class, shape)
pub mod attributes;
pub use attributes::{
    interest_points_near, match_preferences, InterestPoint, LengthClass, PointTag,
    PreferenceQuery, TrackShape, TrailAttributes, TrailListing,
};

// Stateful engine tying the pipeline together
pub mod engine;
pub use engine::{
    ElevationInput, InsufficientData, SimilarTrack, TrackQuery, TrackSignature, TrailEngine,
    Verdict,
};

// ============================================================================
// Core Types
// ============================================================================

/// A GPS coordinate with latitude and longitude.
///
/// # Example
/// ```
/// use trail_matcher::GpsPoint;
/// let point = GpsPoint::new(48.4133, 8.1432); // Black Forest
/// assert!(point.is_valid());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GpsPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GpsPoint {
    /// Create a new GPS point.
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Check if the point has valid coordinates.
    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && self.latitude >= -90.0
            && self.latitude <= 90.0
            && self.longitude >= -180.0
            && self.longitude <= 180.0
    }
}

/// Bounding box of a track or an area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub min_lat: f64,
    pub max_lat: f64,
    pub min_lng: f64,
    pub max_lng: f64,
}

impl Bounds {
    /// Create bounds from GPS points.
    pub fn from_points(points: &[GpsPoint]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let mut min_lat = f64::MAX;
        let mut max_lat = f64::MIN;
        let mut min_lng = f64::MAX;
        let mut max_lng = f64::MIN;

        for p in points {
            min_lat = min_lat.min(p.latitude);
            max_lat = max_lat.max(p.latitude);
            min_lng = min_lng.min(p.longitude);
            max_lng = max_lng.max(p.longitude);
        }

        Some(Self {
            min_lat,
            max_lat,
            min_lng,
            max_lng,
        })
    }

    /// Whether `other` lies entirely inside these bounds (edges inclusive).
    pub fn contains_bounds(&self, other: &Bounds) -> bool {
        other.min_lat >= self.min_lat
            && other.max_lat <= self.max_lat
            && other.min_lng >= self.min_lng
            && other.max_lng <= self.max_lng
    }
}

/// Trail difficulty grade.
///
/// The derived ordering is the severity order, used to break ties in the
/// neighbour vote.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Difficulty {
    Easy,
    Intermediate,
    Difficult,
    VeryDifficult,
}

impl Difficulty {
    /// All grades in severity order.
    pub const ALL: [Difficulty; 4] = [
        Difficulty::Easy,
        Difficulty::Intermediate,
        Difficulty::Difficult,
        Difficulty::VeryDifficult,
    ];

    /// Human-readable label as used by the reference corpus.
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Intermediate => "Intermediate",
            Difficulty::Difficult => "Difficult",
            Difficulty::VeryDifficult => "Very Difficult",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let normalized: String = s
            .trim()
            .chars()
            .filter(|c| !c.is_whitespace() && *c != '_' && *c != '-')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "easy" => Ok(Difficulty::Easy),
            "intermediate" => Ok(Difficulty::Intermediate),
            "difficult" => Ok(Difficulty::Difficult),
            "verydifficult" => Ok(Difficulty::VeryDifficult),
            _ => Err(format!("unknown difficulty label '{}'", s)),
        }
    }
}

impl Serialize for Difficulty {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Difficulty {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gps_point_validation() {
        assert!(GpsPoint::new(48.4133, 8.1432).is_valid());
        assert!(!GpsPoint::new(91.0, 0.0).is_valid());
        assert!(!GpsPoint::new(0.0, 181.0).is_valid());
        assert!(!GpsPoint::new(f64::NAN, 0.0).is_valid());
    }

    #[test]
    fn test_bounds_contains() {
        let tile = Bounds {
            min_lat: 48.0,
            max_lat: 49.0,
            min_lng: 8.0,
            max_lng: 9.0,
        };
        let track = Bounds::from_points(&[
            GpsPoint::new(48.40, 8.10),
            GpsPoint::new(48.43, 8.18),
        ])
        .unwrap();
        assert!(tile.contains_bounds(&track));
        assert!(!track.contains_bounds(&tile));
        assert!(Bounds::from_points(&[]).is_none());
    }

    #[test]
    fn test_difficulty_order_and_parse() {
        assert!(Difficulty::Easy < Difficulty::Intermediate);
        assert!(Difficulty::Difficult < Difficulty::VeryDifficult);
        assert_eq!("Very Difficult".parse::<Difficulty>(), Ok(Difficulty::VeryDifficult));
        assert_eq!("very_difficult".parse::<Difficulty>(), Ok(Difficulty::VeryDifficult));
        assert_eq!(" easy ".parse::<Difficulty>(), Ok(Difficulty::Easy));
        assert!("Extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn test_difficulty_serde() {
        let json = serde_json::to_string(&Difficulty::VeryDifficult).unwrap();
        assert_eq!(json, "\"Very Difficult\"");
        let back: Difficulty = serde_json::from_str("\"Intermediate\"").unwrap();
        assert_eq!(back, Difficulty::Intermediate);
    }
}
