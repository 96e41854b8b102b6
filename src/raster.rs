//! # Elevation Raster
//!
//! A square grid of big-endian signed 16-bit elevation samples (meters), laid
//! out row-major from the north-west corner, as in SRTM `.hgt` tiles.
//!
//! The grid covers one degree in each direction, so the cell size is
//! `1 / dim` degrees. Lookups use the nearest enclosing cell; there is no
//! interpolation between samples.

use std::path::Path;

use log::info;

use crate::error::{OptionExt, Result, TrailError};
use crate::{Bounds, GpsPoint};

/// Geographic position of a raster's top-left (north-west) corner.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterOrigin {
    pub top_lat: f64,
    pub left_lon: f64,
}

impl RasterOrigin {
    pub fn new(top_lat: f64, left_lon: f64) -> Self {
        Self { top_lat, left_lon }
    }

    /// Parse an SRTM tile name such as `N48E002.hgt` or `S33W071`.
    ///
    /// The name encodes the tile's south-west corner, so the origin's
    /// latitude is one degree further north.
    ///
    /// ```rust
    /// use trail_matcher::RasterOrigin;
    ///
    /// let origin = RasterOrigin::from_hgt_name("N48E002.hgt").unwrap();
    /// assert_eq!(origin, RasterOrigin::new(49.0, 2.0));
    /// ```
    pub fn from_hgt_name(name: &str) -> Result<Self> {
        let invalid = || TrailError::InvalidTileName {
            name: name.to_string(),
        };

        let stem = name
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(name)
            .trim_end_matches(".hgt")
            .trim_end_matches(".HGT");
        if stem.len() != 7 || !stem.is_ascii() {
            return Err(invalid());
        }

        let lat_sign = match &stem[0..1] {
            "N" | "n" => 1.0,
            "S" | "s" => -1.0,
            _ => return Err(invalid()),
        };
        let lon_sign = match &stem[3..4] {
            "E" | "e" => 1.0,
            "W" | "w" => -1.0,
            _ => return Err(invalid()),
        };
        let lat: f64 = stem[1..3].parse().map_err(|_| invalid())?;
        let lon: f64 = stem[4..7].parse().map_err(|_| invalid())?;

        Ok(Self::new(lat_sign * lat + 1.0, lon_sign * lon))
    }
}

/// Immutable square elevation grid.
#[derive(Debug, Clone)]
pub struct ElevationRaster {
    origin: RasterOrigin,
    dim: usize,
    samples: Vec<i16>,
}

impl ElevationRaster {
    /// Load a raster file whose top-left corner is supplied by the caller.
    ///
    /// Fails with [`TrailError::Io`] if the file cannot be read and with
    /// [`TrailError::RasterFormat`] if its size is not a square number of
    /// 16-bit samples.
    pub fn load(path: impl AsRef<Path>, origin: RasterOrigin) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).map_err(|e| TrailError::io(path, e))?;
        let raster = Self::parse(&bytes, origin).ok_or_else(|| TrailError::RasterFormat {
            path: path.to_path_buf(),
            byte_len: bytes.len(),
        })?;
        info!(
            "[Raster] Loaded {} ({}x{} samples)",
            path.display(),
            raster.dim,
            raster.dim
        );
        Ok(raster)
    }

    /// Load an SRTM tile, deriving the origin from its file name.
    pub fn load_hgt(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| TrailError::InvalidTileName {
                name: path.display().to_string(),
            })?;
        let origin = RasterOrigin::from_hgt_name(name)?;
        Self::load(path, origin)
    }

    /// Build a raster from in-memory bytes.
    pub fn from_bytes(bytes: &[u8], origin: RasterOrigin) -> Result<Self> {
        Self::parse(bytes, origin).ok_or_else(|| TrailError::RasterFormat {
            path: "<memory>".into(),
            byte_len: bytes.len(),
        })
    }

    /// Build a raster from row-major samples. `samples.len()` must be a
    /// non-zero perfect square.
    pub fn from_samples(samples: Vec<i16>, origin: RasterOrigin) -> Result<Self> {
        let dim = square_dim(samples.len()).ok_or_else(|| TrailError::RasterFormat {
            path: "<memory>".into(),
            byte_len: samples.len() * 2,
        })?;
        Ok(Self {
            origin,
            dim,
            samples,
        })
    }

    fn parse(bytes: &[u8], origin: RasterOrigin) -> Option<Self> {
        if bytes.len() % 2 != 0 {
            return None;
        }
        let dim = square_dim(bytes.len() / 2)?;
        let samples = bytes
            .chunks_exact(2)
            .map(|pair| i16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        Some(Self {
            origin,
            dim,
            samples,
        })
    }

    pub fn origin(&self) -> RasterOrigin {
        self.origin
    }

    /// Samples per side.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Angular size of one cell in degrees.
    pub fn cell_size(&self) -> f64 {
        1.0 / self.dim as f64
    }

    /// Geographic area covered by the grid.
    pub fn bounds(&self) -> Bounds {
        Bounds {
            min_lat: self.origin.top_lat - 1.0,
            max_lat: self.origin.top_lat,
            min_lng: self.origin.left_lon,
            max_lng: self.origin.left_lon + 1.0,
        }
    }

    /// Whether a lookup at (`lat`, `lon`) addresses a cell of this grid.
    pub fn covers(&self, lat: f64, lon: f64) -> bool {
        self.cell_index(lat, lon).is_some()
    }

    /// Whether every point of `bounds` can be looked up in this grid.
    pub fn covers_bounds(&self, bounds: &Bounds) -> bool {
        self.covers(bounds.max_lat, bounds.min_lng) && self.covers(bounds.min_lat, bounds.max_lng)
    }

    /// Elevation in meters of the cell enclosing (`lat`, `lon`).
    pub fn elevation_at(&self, lat: f64, lon: f64) -> Result<i16> {
        self.cell_index(lat, lon)
            .map(|(row, col)| self.samples[row * self.dim + col])
            .ok_or_out_of_coverage(lat, lon)
    }

    /// Elevation at a GPS point.
    pub fn elevation_at_point(&self, point: &GpsPoint) -> Result<i16> {
        self.elevation_at(point.latitude, point.longitude)
    }

    /// Row and column of the cell enclosing the coordinate.
    fn cell_index(&self, lat: f64, lon: f64) -> Option<(usize, usize)> {
        let cell = self.cell_size();
        let row = ((self.origin.top_lat - lat) / cell).floor();
        let col = ((lon - self.origin.left_lon) / cell).floor();
        let dim = self.dim as f64;
        if !(row >= 0.0 && row < dim && col >= 0.0 && col < dim) {
            return None;
        }
        Some((row as usize, col as usize))
    }
}

/// Side length of a square grid with `count` cells.
fn square_dim(count: usize) -> Option<usize> {
    if count == 0 {
        return None;
    }
    let dim = (count as f64).sqrt().round() as usize;
    (dim * dim == count).then_some(dim)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn grid_bytes(samples: &[i16]) -> Vec<u8> {
        samples.iter().flat_map(|s| s.to_be_bytes()).collect()
    }

    #[test]
    fn test_parse_big_endian_rows() {
        let raster =
            ElevationRaster::from_bytes(&grid_bytes(&[1, 2, 3, -4]), RasterOrigin::new(49.0, 8.0))
                .unwrap();
        assert_eq!(raster.dim(), 2);
        assert_eq!(raster.cell_size(), 0.5);
        // North-west, north-east, south-west, south-east
        assert_eq!(raster.elevation_at(48.9, 8.1).unwrap(), 1);
        assert_eq!(raster.elevation_at(48.9, 8.6).unwrap(), 2);
        assert_eq!(raster.elevation_at(48.1, 8.1).unwrap(), 3);
        assert_eq!(raster.elevation_at(48.1, 8.6).unwrap(), -4);
    }

    #[test]
    fn test_rejects_non_square() {
        let origin = RasterOrigin::new(49.0, 8.0);
        assert!(matches!(
            ElevationRaster::from_bytes(&[0, 1, 0, 2, 0, 3], origin),
            Err(TrailError::RasterFormat { byte_len: 6, .. })
        ));
        assert!(ElevationRaster::from_bytes(&[0, 1, 0], origin).is_err());
        assert!(ElevationRaster::from_bytes(&[], origin).is_err());
    }

    #[test]
    fn test_out_of_coverage() {
        let raster = ElevationRaster::from_samples(vec![7; 9], RasterOrigin::new(49.0, 8.0))
            .unwrap();
        assert!(raster.covers(48.5, 8.5));
        assert!(!raster.covers(49.5, 8.5));
        assert!(!raster.covers(48.5, 9.0));
        assert!(matches!(
            raster.elevation_at(47.9, 8.5),
            Err(TrailError::OutOfCoverage { .. })
        ));
    }

    #[test]
    fn test_covers_bounds() {
        let raster = ElevationRaster::from_samples(vec![0; 16], RasterOrigin::new(49.0, 8.0))
            .unwrap();
        let inside = Bounds {
            min_lat: 48.2,
            max_lat: 48.4,
            min_lng: 8.1,
            max_lng: 8.3,
        };
        let straddling = Bounds {
            max_lng: 9.2,
            ..inside
        };
        assert!(raster.covers_bounds(&inside));
        assert!(!raster.covers_bounds(&straddling));
        assert_eq!(raster.bounds().min_lat, 48.0);
    }

    #[test]
    fn test_hgt_name() {
        assert_eq!(
            RasterOrigin::from_hgt_name("N48E002.hgt").unwrap(),
            RasterOrigin::new(49.0, 2.0)
        );
        assert_eq!(
            RasterOrigin::from_hgt_name("tiles/S33W071.hgt").unwrap(),
            RasterOrigin::new(-32.0, -71.0)
        );
        assert!(RasterOrigin::from_hgt_name("X48E002.hgt").is_err());
        assert!(RasterOrigin::from_hgt_name("N4E2.hgt").is_err());
    }

    #[test]
    fn test_load_missing_file() {
        let err = ElevationRaster::load("/nonexistent/N48E002.hgt", RasterOrigin::new(49.0, 2.0))
            .unwrap_err();
        assert!(matches!(err, TrailError::Io { .. }));
    }
}
