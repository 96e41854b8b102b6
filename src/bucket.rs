//! Length buckets and the resampling tick derived from them.
//!
//! Tracks are only compared with reference tracks of similar length, and
//! both sides must be resampled with the same tick and shingle length.
//! [`SignatureParams`] carries that triple through every signature
//! computation so query and corpus cannot drift apart.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;

/// Cache and storage key for a shingled reference bucket.
///
/// Includes the tick: buckets shingled at another tick never match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BucketKey {
    pub bucket: u32,
    /// Resampling tick in millionths of a km
    pub tick_micro_km: u64,
    pub shingle_length: usize,
}

impl BucketKey {
    pub fn new(bucket: u32, tick_km: f64, shingle_length: usize) -> Self {
        Self {
            bucket,
            tick_micro_km: (tick_km * 1e6).round() as u64,
            shingle_length,
        }
    }
}

/// Everything that determines how a signature is computed.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignatureParams {
    pub bucket: u32,
    pub tick_km: f64,
    pub shingle_length: usize,
}

impl SignatureParams {
    pub fn key(&self) -> BucketKey {
        BucketKey::new(self.bucket, self.tick_km, self.shingle_length)
    }
}

/// Length buckets `(n·B, (n+1)·B]`, capped at the configured maximum.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LengthBuckets {
    bucket_size_km: f64,
    base_tick_km: f64,
    max_bucket: u32,
}

impl LengthBuckets {
    pub fn new(bucket_size_km: f64, base_tick_km: f64, max_track_length_km: f64) -> Self {
        let max_bucket = ((max_track_length_km / bucket_size_km).floor() as u32).saturating_sub(1);
        Self {
            bucket_size_km,
            base_tick_km,
            max_bucket,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(
            config.bucket_size_km,
            config.base_tick_km,
            config.max_track_length_km,
        )
    }

    pub fn max_bucket(&self) -> u32 {
        self.max_bucket
    }

    /// Bucket of a track length. Exact multiples of the bucket size fall in
    /// the lower bucket; lengths that are not positive have no bucket.
    ///
    /// ```rust
    /// use trail_matcher::LengthBuckets;
    ///
    /// let buckets = LengthBuckets::new(5.0, 0.25, 1000.0);
    /// assert_eq!(buckets.bucket_for(5.0), Some(0));
    /// assert_eq!(buckets.bucket_for(5.01), Some(1));
    /// assert_eq!(buckets.bucket_for(0.0), None);
    /// ```
    pub fn bucket_for(&self, length_km: f64) -> Option<u32> {
        if !(length_km.is_finite() && length_km > 0.0) {
            return None;
        }
        let whole = (length_km / self.bucket_size_km).floor();
        let bucket = if length_km % self.bucket_size_km == 0.0 {
            whole - 1.0
        } else {
            whole
        };
        Some((bucket.max(0.0) as u32).min(self.max_bucket))
    }

    /// Resampling tick for a bucket, growing linearly with the bucket index.
    pub fn tick_for(&self, bucket: u32) -> f64 {
        self.base_tick_km * f64::from(bucket + 1)
    }

    /// Signature parameters for a track of `length_km`.
    pub fn params_for(&self, length_km: f64, shingle_length: usize) -> Option<SignatureParams> {
        let bucket = self.bucket_for(length_km)?;
        Some(self.params_for_bucket(bucket, shingle_length))
    }

    pub fn params_for_bucket(&self, bucket: u32, shingle_length: usize) -> SignatureParams {
        SignatureParams {
            bucket,
            tick_km: self.tick_for(bucket),
            shingle_length,
        }
    }
}
