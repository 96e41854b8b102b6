//! # Trail Engine
//!
//! Ties the pipeline together for callers:
//!
//! ```text
//! GPS track ──► elevations (known or raster) ──► slope profile ──► shingles
//!                                                                    │
//!     length bucket ──► reference bucket (cache → store → corpus) ◄──┘
//!                              │
//!              exact top-k vote / ranked search / LSH lookup
//! ```
//!
//! The engine owns its raster catalog and corpus index; there is no global
//! state, so independent engines can run side by side (tests, different
//! corpora). Queries take `&self` and may run concurrently once the engine is
//! set up.

use std::sync::Arc;

use log::{debug, info};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::attributes::{match_preferences, InterestPoint, PreferenceQuery, TrailAttributes, TrailListing};
use crate::bucket::SignatureParams;
use crate::catalog::RasterCatalog;
use crate::config::EngineConfig;
use crate::corpus::CorpusSource;
use crate::error::{OptionExt, Result, TrailError};
use crate::geo_utils::track_length_km;
use crate::index::{CorpusIndex, IndexStats, ReferenceBucket};
use crate::profile::{elevation_profile, slope_profile, SlopeProfile};
use crate::raster::ElevationRaster;
use crate::shingle::{shingle, SignatureSet};
use crate::similarity::{classify_by_knn, rank_by_similarity, DifficultyVote};
use crate::store::SignatureStore;
use crate::{Difficulty, GpsPoint};

// ============================================================================
// Core Types
// ============================================================================

/// Where a track's elevations come from.
#[derive(Debug, Clone, Copy)]
pub enum ElevationInput<'a> {
    /// One elevation in metres per track point
    Known(&'a [f64]),
    /// Look up every point in the engine's rasters
    FromRaster,
}

/// Signature of a query track together with how it was computed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackSignature {
    pub length_km: f64,
    /// `None` for tracks without length
    pub params: Option<SignatureParams>,
    pub profile: SlopeProfile,
    pub signature: SignatureSet,
}

/// Why a track could not be classified.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InsufficientData {
    /// All points coincide
    ZeroLength,
    /// Track too short or too sparse for a single slope
    EmptyProfile,
    /// Fewer slopes than the shingle length
    EmptySignature,
    /// The track's length bucket has no reference tracks
    NoReferenceTracks,
}

/// Classification outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Verdict {
    Classified(DifficultyVote),
    InsufficientData(InsufficientData),
}

impl Verdict {
    pub fn label(&self) -> Option<Difficulty> {
        match self {
            Verdict::Classified(vote) => Some(vote.label),
            Verdict::InsufficientData(_) => None,
        }
    }
}

/// A reference track returned by similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarTrack {
    pub id: String,
    pub score: f64,
    pub label: Difficulty,
}

/// One entry of a batch classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackQuery {
    pub points: Vec<GpsPoint>,
    /// Known elevations; `None` reads them from the rasters
    pub elevations: Option<Vec<f64>>,
}

impl TrackQuery {
    fn elevation_input(&self) -> ElevationInput<'_> {
        match &self.elevations {
            Some(elevations) => ElevationInput::Known(elevations),
            None => ElevationInput::FromRaster,
        }
    }
}

/// A query signature matched to its reference bucket.
enum Prepared {
    Ready(TrackSignature, Arc<ReferenceBucket>),
    Insufficient(InsufficientData),
}

// ============================================================================
// Trail Engine
// ============================================================================

/// Difficulty classification and similar-trail search over a reference corpus.
pub struct TrailEngine {
    config: EngineConfig,
    rasters: RasterCatalog,
    index: CorpusIndex,
}

impl TrailEngine {
    /// Create an engine over `source`. Fails if `config` is invalid.
    pub fn new(config: EngineConfig, source: impl CorpusSource + 'static) -> Result<Self> {
        config.validate()?;
        let index = CorpusIndex::new(&config, source);
        info!(
            "[TrailEngine] Initialized (k={}, shingle length {}, LSH {:.2}/{})",
            config.neighbors, config.shingle_length, config.lsh_threshold, config.num_permutations
        );
        Ok(Self {
            config,
            rasters: RasterCatalog::new(),
            index,
        })
    }

    /// Persist shingled buckets in `store` and reuse them across sessions.
    pub fn with_store(mut self, store: Arc<dyn SignatureStore>) -> Self {
        self.index = self.index.with_store(store);
        self
    }

    /// Register an elevation raster for [`ElevationInput::FromRaster`].
    pub fn add_raster(&mut self, raster: ElevationRaster) {
        self.rasters.add(raster);
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn index(&self) -> &CorpusIndex {
        &self.index
    }

    pub fn raster_count(&self) -> usize {
        self.rasters.len()
    }

    pub fn stats(&self) -> IndexStats {
        self.index.stats()
    }

    // ========================================================================
    // Signatures
    // ========================================================================

    /// Compute a track's signature with the parameters of its length bucket.
    ///
    /// Fails on an empty track, an invalid coordinate, mismatched elevations,
    /// missing raster coverage or an invalid shingle length. A zero-length track yields an
    /// empty signature without parameters.
    pub fn signature(
        &self,
        points: &[GpsPoint],
        elevations: ElevationInput<'_>,
        shingle_length: usize,
    ) -> Result<TrackSignature> {
        points.first().ok_or_insufficient_points(points.len(), 1)?;
        if let Some((index, p)) = points.iter().enumerate().find(|(_, p)| !p.is_valid()) {
            return Err(TrailError::InvalidPoint {
                index,
                lat: p.latitude,
                lon: p.longitude,
            });
        }

        let elevations = match elevations {
            ElevationInput::Known(known) => known.to_vec(),
            ElevationInput::FromRaster => {
                let raster = self.rasters.covering_track(points)?;
                elevation_profile(points, &raster)?
            }
        };

        let length_km = track_length_km(points);
        let Some(params) = self.index.buckets().params_for(length_km, shingle_length) else {
            // Still reject bad shingle lengths and mismatched input
            shingle(&[], shingle_length)?;
            if elevations.len() != points.len() {
                return Err(TrailError::LengthMismatch {
                    points: points.len(),
                    elevations: elevations.len(),
                });
            }
            return Ok(TrackSignature {
                length_km,
                params: None,
                profile: SlopeProfile::default(),
                signature: SignatureSet::new(),
            });
        };

        let profile = slope_profile(points, &elevations, params.tick_km)?;
        let signature = shingle(profile.as_slice(), shingle_length)?;
        debug!(
            "[TrailEngine] {:.2} km track -> bucket {}, {} slopes, {} shingles",
            length_km,
            params.bucket,
            profile.len(),
            signature.len()
        );

        Ok(TrackSignature {
            length_km,
            params: Some(params),
            profile,
            signature,
        })
    }

    fn prepare(
        &self,
        points: &[GpsPoint],
        elevations: ElevationInput<'_>,
        shingle_length: usize,
    ) -> Result<Prepared> {
        let track = self.signature(points, elevations, shingle_length)?;
        let Some(params) = track.params else {
            return Ok(Prepared::Insufficient(InsufficientData::ZeroLength));
        };
        if track.profile.is_empty() {
            return Ok(Prepared::Insufficient(InsufficientData::EmptyProfile));
        }
        if track.signature.is_empty() {
            return Ok(Prepared::Insufficient(InsufficientData::EmptySignature));
        }

        let bucket = self.index.get_bucket_for(&params)?;
        if bucket.is_empty() {
            return Ok(Prepared::Insufficient(InsufficientData::NoReferenceTracks));
        }
        Ok(Prepared::Ready(track, bucket))
    }

    // ========================================================================
    // Classification
    // ========================================================================

    /// Predict a track's difficulty from its `k` most similar reference tracks.
    pub fn classify(
        &self,
        points: &[GpsPoint],
        elevations: ElevationInput<'_>,
        k: usize,
        shingle_length: usize,
    ) -> Result<Verdict> {
        if k == 0 {
            return Err(TrailError::config("k must be at least 1"));
        }

        let (track, bucket) = match self.prepare(points, elevations, shingle_length)? {
            Prepared::Ready(track, bucket) => (track, bucket),
            Prepared::Insufficient(reason) => {
                debug!("[TrailEngine] Cannot classify: {:?}", reason);
                return Ok(Verdict::InsufficientData(reason));
            }
        };

        match classify_by_knn(&track.signature, bucket.records(), k) {
            Some(vote) => {
                debug!(
                    "[TrailEngine] Classified {:.2} km track as {} (score {:.3})",
                    track.length_km, vote.label, vote.score
                );
                Ok(Verdict::Classified(vote))
            }
            None => Ok(Verdict::InsufficientData(InsufficientData::NoReferenceTracks)),
        }
    }

    fn classify_query(&self, query: &TrackQuery) -> Result<Verdict> {
        self.classify(
            &query.points,
            query.elevation_input(),
            self.config.neighbors,
            self.config.shingle_length,
        )
    }

    /// Classify independent tracks with the configured `k` and shingle length.
    ///
    /// Results line up with `queries`.
    pub fn classify_batch(&self, queries: &[TrackQuery]) -> Vec<Result<Verdict>> {
        info!("[TrailEngine] Classifying {} tracks", queries.len());

        #[cfg(feature = "parallel")]
        let verdicts = queries.par_iter().map(|q| self.classify_query(q)).collect();

        #[cfg(not(feature = "parallel"))]
        let verdicts = queries.iter().map(|q| self.classify_query(q)).collect();

        verdicts
    }

    // ========================================================================
    // Similarity Search
    // ========================================================================

    /// Up to `k` reference tracks most similar to the query, best first.
    ///
    /// Exact Jaccard scores. Tracks that cannot be signed give an empty list.
    pub fn similar_tracks(
        &self,
        points: &[GpsPoint],
        elevations: ElevationInput<'_>,
        k: usize,
        shingle_length: usize,
    ) -> Result<Vec<SimilarTrack>> {
        let (track, bucket) = match self.prepare(points, elevations, shingle_length)? {
            Prepared::Ready(track, bucket) => (track, bucket),
            Prepared::Insufficient(_) => return Ok(Vec::new()),
        };

        let records = bucket.records();
        let ranked = rank_by_similarity(&track.signature, records.iter().map(|r| &r.signature), k);
        Ok(ranked
            .into_iter()
            .map(|n| SimilarTrack {
                id: records[n.index].id.clone(),
                score: n.score,
                label: records[n.index].label,
            })
            .collect())
    }

    /// Ids of reference tracks whose estimated similarity likely exceeds the
    /// configured LSH threshold. Unordered and approximate.
    pub fn similar_tracks_lsh(
        &self,
        points: &[GpsPoint],
        elevations: ElevationInput<'_>,
        shingle_length: usize,
    ) -> Result<Vec<String>> {
        let (track, bucket) = match self.prepare(points, elevations, shingle_length)? {
            Prepared::Ready(track, bucket) => (track, bucket),
            Prepared::Insufficient(_) => return Ok(Vec::new()),
        };

        let hasher = self.index.hasher();
        let lsh = bucket.lsh_index(hasher, self.index.lsh_threshold())?;
        lsh.query(&hasher.sketch(&track.signature))
    }

    // ========================================================================
    // Attribute Preferences
    // ========================================================================

    /// Attributes of a recorded track using the configured distances.
    pub fn attributes_for_track(
        &self,
        points: &[GpsPoint],
        pois: &[InterestPoint],
        difficulty: Option<Difficulty>,
    ) -> TrailAttributes {
        TrailAttributes::from_track(points, pois, difficulty, &self.config)
    }

    /// Listings matching a hiker's preferences, see [`match_preferences`].
    pub fn match_preferences(
        &self,
        query: &PreferenceQuery,
        listings: &[TrailListing],
    ) -> Result<Vec<String>> {
        match_preferences(
            query,
            listings,
            self.config.attribute_threshold,
            self.config.num_permutations,
            self.config.minhash_seed,
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
