//! Engine configuration.
//!
//! All knobs that shape signatures or similarity results live here so that
//! query and corpus signatures are always computed from the same values.
//! The struct deserializes from partial JSON; missing fields take defaults.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, TrailError};
use crate::shingle::MAX_SHINGLE_LENGTH;

/// Configuration for the trail engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Width of a length bucket in km.
    /// Default: 5.0 (lengths in (0, 5] share bucket 0)
    pub bucket_size_km: f64,

    /// Resampling tick for bucket 0 in km; bucket `n` uses `(n + 1)` times this.
    /// Default: 0.25
    pub base_tick_km: f64,

    /// Longest track with its own bucket. Longer tracks share the last bucket.
    /// Default: 1000.0
    pub max_track_length_km: f64,

    /// Number of neighbours consulted by the difficulty vote.
    /// Default: 5
    pub neighbors: usize,

    /// Number of consecutive quantized slopes per shingle.
    /// Default: 1
    pub shingle_length: usize,

    /// Estimated Jaccard similarity above which LSH should report a match.
    /// Higher values mean fewer false positives and more false negatives.
    /// Default: 0.67
    pub lsh_threshold: f64,

    /// MinHash permutations per sketch. More permutations tighten the
    /// similarity estimate at the cost of memory and hashing time.
    /// Default: 128
    pub num_permutations: usize,

    /// Seed for the MinHash permutation parameters. Sketches are only
    /// comparable when built with the same seed and permutation count.
    /// Default: 1
    pub minhash_seed: u64,

    /// Maximum number of shingled reference buckets kept in memory.
    /// Default: 64
    pub bucket_cache_capacity: usize,

    /// Start/end distance below which a track counts as a loop (meters).
    /// Default: 100.0
    pub loop_threshold_m: f64,

    /// Distance within which an interest point counts as on the trail (meters).
    /// Default: 200.0
    pub poi_distance_m: f64,

    /// LSH threshold for attribute-preference matching.
    /// Default: 0.6
    pub attribute_threshold: f64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            bucket_size_km: 5.0,
            base_tick_km: 0.25,
            max_track_length_km: 1000.0,
            neighbors: 5,
            shingle_length: 1,
            lsh_threshold: 0.67,
            num_permutations: 128,
            minhash_seed: 1,
            bucket_cache_capacity: 64,
            loop_threshold_m: 100.0,
            poi_distance_m: 200.0,
            attribute_threshold: 0.6,
        }
    }
}

impl EngineConfig {
    /// Parse a configuration from JSON and validate it.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig =
            serde_json::from_str(json).map_err(|e| TrailError::config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read a JSON configuration file and validate it.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|e| TrailError::io(path, e))?;
        Self::from_json_str(&json)
    }

    /// Check that every field is in its usable range.
    pub fn validate(&self) -> Result<()> {
        if !(self.bucket_size_km.is_finite() && self.bucket_size_km > 0.0) {
            return Err(TrailError::config("bucket_size_km must be positive"));
        }
        if !(self.base_tick_km.is_finite() && self.base_tick_km > 0.0) {
            return Err(TrailError::config("base_tick_km must be positive"));
        }
        if !(self.max_track_length_km >= self.bucket_size_km) {
            return Err(TrailError::config(
                "max_track_length_km must be at least one bucket wide",
            ));
        }
        if self.neighbors == 0 {
            return Err(TrailError::config("neighbors must be at least 1"));
        }
        if self.shingle_length == 0 || self.shingle_length > MAX_SHINGLE_LENGTH {
            return Err(TrailError::InvalidShingleLength {
                length: self.shingle_length,
                max: MAX_SHINGLE_LENGTH,
            });
        }
        for (name, value) in [
            ("lsh_threshold", self.lsh_threshold),
            ("attribute_threshold", self.attribute_threshold),
        ] {
            if !(value > 0.0 && value < 1.0) {
                return Err(TrailError::config(format!("{} must be in (0, 1)", name)));
            }
        }
        if self.num_permutations < 2 {
            return Err(TrailError::config("num_permutations must be at least 2"));
        }
        if self.bucket_cache_capacity == 0 {
            return Err(TrailError::config("bucket_cache_capacity must be at least 1"));
        }
        Ok(())
    }
}
