//! # Reference Corpus
//!
//! Labelled reference tracks, partitioned by length bucket. A corpus source
//! hands out raw entries for one bucket at a time; [`crate::CorpusIndex`]
//! turns them into signatures and caches the result.
//!
//! ## JSON layout
//!
//! One file per bucket, `<dir>/<bucket>.json`, mapping track ids to one of:
//!
//! ```text
//! "id": [[slope, ...], "Easy"]
//! "id": [[slope, ...], 7.4, "Difficult"]
//! "id": { "points": [[lat, lon], ...], "elevations": [m, ...], "label": "Intermediate" }
//! ```
//!
//! Slope lists must already be sampled at the bucket's tick. Point tracks are
//! resampled here with the same tick as queries of that bucket.

use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::bucket::SignatureParams;
use crate::error::{Result, TrailError};
use crate::profile::slope_profile;
use crate::shingle::{shingle, SignatureSet};
use crate::{Difficulty, GpsPoint};

/// One reference entry as stored in the corpus.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawReference {
    /// Pre-computed slopes and a label
    Slopes(Vec<f64>, String),
    /// Pre-computed slopes, track length in km and a label
    SlopesWithLength(Vec<f64>, f64, String),
    /// Raw track with known elevations
    Track {
        points: Vec<[f64; 2]>,
        elevations: Vec<f64>,
        label: String,
    },
}

impl RawReference {
    pub fn label(&self) -> &str {
        match self {
            RawReference::Slopes(_, label)
            | RawReference::SlopesWithLength(_, _, label)
            | RawReference::Track { label, .. } => label,
        }
    }

    /// Shingle signature of this entry under `params`.
    pub fn signature(&self, params: &SignatureParams) -> Result<SignatureSet> {
        match self {
            RawReference::Slopes(slopes, _) | RawReference::SlopesWithLength(slopes, _, _) => {
                shingle(slopes, params.shingle_length)
            }
            RawReference::Track {
                points, elevations, ..
            } => {
                let points: Vec<GpsPoint> =
                    points.iter().map(|&[lat, lon]| GpsPoint::new(lat, lon)).collect();
                let profile = slope_profile(&points, elevations, params.tick_km)?;
                shingle(profile.as_slice(), params.shingle_length)
            }
        }
    }
}

/// A shingled reference track.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReferenceRecord {
    pub id: String,
    pub signature: SignatureSet,
    pub label: Difficulty,
}

impl ReferenceRecord {
    /// Shingle a raw entry. Entries with an unrecognised label are skipped.
    pub fn from_raw(id: &str, raw: &RawReference, params: &SignatureParams) -> Result<Option<Self>> {
        let label = match raw.label().parse::<Difficulty>() {
            Ok(label) => label,
            Err(e) => {
                warn!("[Corpus] Skipping '{}': {}", id, e);
                return Ok(None);
            }
        };
        Ok(Some(Self {
            id: id.to_string(),
            signature: raw.signature(params)?,
            label,
        }))
    }
}

/// Supplier of raw reference entries per length bucket.
pub trait CorpusSource: Send + Sync {
    /// Entries of `bucket`. A bucket without data yields an empty list.
    fn load_bucket(&self, bucket: u32) -> Result<Vec<(String, RawReference)>>;
}

/// Parse one bucket's JSON document, keeping ids in ascending order.
pub fn parse_bucket_json(origin: &str, json: &str) -> Result<Vec<(String, RawReference)>> {
    let entries: BTreeMap<String, RawReference> =
        serde_json::from_str(json).map_err(|e| TrailError::CorpusFormat {
            origin: origin.to_string(),
            message: e.to_string(),
        })?;
    Ok(entries.into_iter().collect())
}

/// Corpus stored as one JSON file per bucket in a directory.
#[derive(Debug, Clone)]
pub struct JsonDirCorpus {
    dir: PathBuf,
}

impl JsonDirCorpus {
    /// Open a corpus directory. Fails if it does not exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.is_dir() {
            return Err(TrailError::CorpusNotFound { path: dir });
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn bucket_path(&self, bucket: u32) -> PathBuf {
        self.dir.join(format!("{}.json", bucket))
    }
}

impl CorpusSource for JsonDirCorpus {
    fn load_bucket(&self, bucket: u32) -> Result<Vec<(String, RawReference)>> {
        let path = self.bucket_path(bucket);
        if !path.exists() {
            debug!("[Corpus] No reference file for bucket {}", bucket);
            return Ok(Vec::new());
        }
        let json = std::fs::read_to_string(&path).map_err(|e| TrailError::io(&path, e))?;
        let entries = parse_bucket_json(&path.display().to_string(), &json)?;
        debug!(
            "[Corpus] Read {} entries from {}",
            entries.len(),
            path.display()
        );
        Ok(entries)
    }
}

/// In-memory corpus.
#[derive(Debug, Clone, Default)]
pub struct MemoryCorpus {
    buckets: HashMap<u32, Vec<(String, RawReference)>>,
}

impl MemoryCorpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, bucket: u32, id: impl Into<String>, raw: RawReference) {
        self.buckets.entry(bucket).or_default().push((id.into(), raw));
    }

    /// Add every entry of a bucket JSON document.
    pub fn insert_json(&mut self, bucket: u32, json: &str) -> Result<()> {
        let entries = parse_bucket_json(&format!("bucket {}", bucket), json)?;
        self.buckets.entry(bucket).or_default().extend(entries);
        Ok(())
    }
}

impl CorpusSource for MemoryCorpus {
    fn load_bucket(&self, bucket: u32) -> Result<Vec<(String, RawReference)>> {
        Ok(self.buckets.get(&bucket).cloned().unwrap_or_default())
    }
}
