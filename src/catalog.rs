//! Spatial catalog of loaded elevation rasters.
//!
//! A track is resolved against exactly one raster: the first registered tile
//! whose grid covers the track's whole bounding box. Tracks that straddle
//! tile edges are not stitched across tiles.

use std::sync::Arc;

use log::debug;
use rstar::{RTree, RTreeObject, AABB};

use crate::error::{Result, TrailError};
use crate::raster::ElevationRaster;
use crate::{Bounds, GpsPoint};

/// Raster footprint for R-tree indexing.
#[derive(Debug, Clone)]
struct RasterFootprint {
    slot: usize,
    bounds: Bounds,
}

impl RTreeObject for RasterFootprint {
    type Envelope = AABB<[f64; 2]>;

    fn envelope(&self) -> Self::Envelope {
        AABB::from_corners(
            [self.bounds.min_lng, self.bounds.min_lat],
            [self.bounds.max_lng, self.bounds.max_lat],
        )
    }
}

/// Collection of rasters with a footprint index.
#[derive(Debug, Default)]
pub struct RasterCatalog {
    rasters: Vec<Arc<ElevationRaster>>,
    footprints: RTree<RasterFootprint>,
}

impl RasterCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a raster. Earlier rasters win when footprints overlap.
    pub fn add(&mut self, raster: ElevationRaster) {
        let slot = self.rasters.len();
        let bounds = raster.bounds();
        debug!(
            "[RasterCatalog] Added raster {} at ({:.3}, {:.3})",
            slot, bounds.max_lat, bounds.min_lng
        );
        self.footprints.insert(RasterFootprint { slot, bounds });
        self.rasters.push(Arc::new(raster));
    }

    pub fn len(&self) -> usize {
        self.rasters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rasters.is_empty()
    }

    /// Raster covering every point of `bounds`.
    pub fn covering(&self, bounds: &Bounds) -> Option<Arc<ElevationRaster>> {
        let envelope = AABB::from_corners(
            [bounds.min_lng, bounds.min_lat],
            [bounds.max_lng, bounds.max_lat],
        );
        self.footprints
            .locate_in_envelope_intersecting(&envelope)
            .filter(|f| self.rasters[f.slot].covers_bounds(bounds))
            .map(|f| f.slot)
            .min()
            .map(|slot| Arc::clone(&self.rasters[slot]))
    }

    /// Raster covering the whole track, or [`TrailError::NoRasterCoverage`].
    pub fn covering_track(&self, points: &[GpsPoint]) -> Result<Arc<ElevationRaster>> {
        let bounds = Bounds::from_points(points).ok_or(TrailError::NoRasterCoverage)?;
        self.covering(&bounds).ok_or(TrailError::NoRasterCoverage)
    }
}
