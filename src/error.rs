//! Unified error handling for the trail-matcher library.
//!
//! Data errors (missing or malformed rasters and corpora, degenerate input
//! geometry) surface here. Numeric edge cases such as an empty slope profile
//! are not errors; they are reported through [`crate::Verdict`].

use std::path::PathBuf;

use thiserror::Error;

/// Unified error type for trail-matcher operations.
#[derive(Debug, Error)]
pub enum TrailError {
    /// Underlying file could not be read or written
    #[error("I/O error on '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Raster file size is not `dim * dim * 2` bytes
    #[error("raster '{}' has {byte_len} bytes, expected a square grid of 16-bit samples", path.display())]
    RasterFormat { path: PathBuf, byte_len: usize },

    /// Tile file name does not follow the `N48E002.hgt` convention
    #[error("'{name}' is not a valid elevation tile name")]
    InvalidTileName { name: String },

    /// Coordinate lies outside the raster's coverage
    #[error("point ({lat:.5}, {lon:.5}) lies outside raster coverage")]
    OutOfCoverage { lat: f64, lon: f64 },

    /// No loaded raster fully covers the requested track
    #[error("no raster covers the track bounds")]
    NoRasterCoverage,

    /// Track has too few points to be processed
    #[error("track has {point_count} points, minimum {minimum_required} required")]
    InsufficientPoints {
        point_count: usize,
        minimum_required: usize,
    },

    /// Track point with non-finite or out-of-range coordinates
    #[error("track point {index} ({lat}, {lon}) is not a valid coordinate")]
    InvalidPoint { index: usize, lat: f64, lon: f64 },

    /// Elevation series does not line up with the point list
    #[error("{points} track points but {elevations} elevation samples")]
    LengthMismatch { points: usize, elevations: usize },

    /// Shingle length outside the encodable range
    #[error("shingle length {length} is outside 1..={max}")]
    InvalidShingleLength { length: usize, max: usize },

    /// Configuration error
    #[error("configuration error: {message}")]
    InvalidConfig { message: String },

    /// Reference corpus location does not exist
    #[error("reference corpus '{}' not found", path.display())]
    CorpusNotFound { path: PathBuf },

    /// Reference corpus data could not be parsed
    #[error("malformed corpus data in '{origin}': {message}")]
    CorpusFormat { origin: String, message: String },

    /// Persistence/storage error
    #[error("persistence error: {message}")]
    Persistence { message: String },

    /// MinHash sketches are not comparable or LSH parameters are inconsistent
    #[error("invalid sketch: {message}")]
    InvalidSketch { message: String },

    /// Key inserted twice into an LSH index
    #[error("key '{key}' is already indexed")]
    DuplicateKey { key: String },
}

impl TrailError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        TrailError::Io {
            path: path.into(),
            source,
        }
    }

    pub(crate) fn config(message: impl Into<String>) -> Self {
        TrailError::InvalidConfig {
            message: message.into(),
        }
    }
}

/// Result type alias for trail-matcher operations.
pub type Result<T> = std::result::Result<T, TrailError>;

/// Extension trait for converting Option to TrailError.
pub trait OptionExt<T> {
    /// Convert Option to Result with insufficient points error.
    fn ok_or_insufficient_points(self, point_count: usize, minimum: usize) -> Result<T>;

    /// Convert Option to Result with an out-of-coverage error for the given point.
    fn ok_or_out_of_coverage(self, lat: f64, lon: f64) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_insufficient_points(self, point_count: usize, minimum: usize) -> Result<T> {
        self.ok_or(TrailError::InsufficientPoints {
            point_count,
            minimum_required: minimum,
        })
    }

    fn ok_or_out_of_coverage(self, lat: f64, lon: f64) -> Result<T> {
        self.ok_or(TrailError::OutOfCoverage { lat, lon })
    }
}
