use std::sync::Arc;

use nalgebra::Vector3;

use dem::{Location, SimpleTile, Tile, TileCache, TileUpdater};
use geom::{Ellipsoid, GeodeticPoint, NormalizedGeodeticPoint};

use crate::algorithm::{AlgorithmId, IntersectionAlgorithm, ground_or_escape, scan_cells};
use crate::{Error, Result};

const STEP: f64 = 0.01;

/// Exhaustive ray/terrain intersection.
///
/// Walks the same tiles as the tree-based search but tests every cell of the
/// rectangle spanned by the entry and exit points. Slow, with no pruning and
/// no sensitivity to numerical noise; used as the reference implementation.
pub struct BasicScanAlgorithm {
    cache: TileCache<SimpleTile>,
}

impl BasicScanAlgorithm {
    pub fn new(updater: Arc<dyn TileUpdater>, max_cached_tiles: usize) -> Self {
        BasicScanAlgorithm {
            cache: TileCache::new(updater, max_cached_tiles),
        }
    }

    fn cell_indices(tile: &SimpleTile, gp: &NormalizedGeodeticPoint) -> (i32, i32) {
        (
            tile.floor_latitude_index(gp.latitude())
                .clamp(0, tile.latitude_rows() as i32 - 2),
            tile.floor_longitude_index(gp.longitude())
                .clamp(0, tile.longitude_columns() as i32 - 2),
        )
    }
}

impl IntersectionAlgorithm for BasicScanAlgorithm {
    fn intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint> {
        let gp0 = ground_or_escape(ellipsoid.point_on_ground(position, los, 0.0))?;
        let mut tile = self.cache.get_tile(gp0.latitude(), gp0.longitude())?;
        let mut h_max = tile.max_elevation();

        // entry point at the top of the terrain envelope
        let mut entry;
        loop {
            let entry_p = ground_or_escape(ellipsoid.point_at_altitude(position, los, h_max + STEP))?;
            if (entry_p - position).dot(los) < 0.0 {
                let position_gp = ellipsoid.geodetic_normalized(position, tile.min_longitude())?;
                let elevation = tile
                    .interpolate_elevation(position_gp.latitude(), position_gp.longitude())
                    .map_err(|_| Error::DemEntryPointIsBehindSpacecraft)?;
                if position_gp.altitude() >= elevation {
                    entry = position_gp;
                } else {
                    return Err(Error::DemEntryPointIsBehindSpacecraft);
                }
            } else {
                entry = ellipsoid.geodetic_normalized(&entry_p, tile.min_longitude())?;
            }
            if tile.location(entry.latitude(), entry.longitude()) == Location::HasInterpolationNeighbors {
                break;
            }
            tile = self.cache.get_tile(entry.latitude(), entry.longitude())?;
            h_max = h_max.max(tile.max_elevation());
        }

        loop {
            // exit through the tile floor or a lateral boundary, whichever
            // comes first
            let exit_p = match ellipsoid.point_at_altitude(position, los, tile.min_elevation() - STEP) {
                Ok(p) => p,
                Err(_) => {
                    let s_low = -position.dot(los) / los.norm_squared();
                    position + los * s_low
                }
            };
            let exit = ellipsoid.geodetic_normalized(&exit_p, tile.min_longitude())?;

            let (entry_row, entry_col) = Self::cell_indices(&tile, &entry);
            let (exit_row, exit_col) = Self::cell_indices(&tile, &exit);
            if let Some(hit) = scan_cells(
                ellipsoid, position, los, &*tile, &entry, entry_row, entry_col, exit_row, exit_col,
            )? {
                return Ok(hit);
            }

            if tile.location(exit.latitude(), exit.longitude()) == Location::HasInterpolationNeighbors {
                // no lateral continuation
                return Err(Error::LineOfSightDoesNotReachGround);
            }

            // walk along the line until it leaves the current tile, then
            // enter the neighboring one; the stride stays below a cell so no
            // tile can be jumped over
            let stride = 0.4 * tile.latitude_step().min(tile.longitude_step()) * ellipsoid.polar_radius();
            let mut advanced = ellipsoid.cartesian(&GeodeticPoint::from(entry));
            let next_tile = loop {
                advanced += los.normalize() * stride.max(STEP);
                let next = ellipsoid.geodetic(&advanced)?;
                // generous margin: neighboring tiles may hold terrain well
                // above anything seen so far
                if next.altitude > h_max + 12_000.0 {
                    return Err(Error::LineOfSightDoesNotReachGround);
                }
                if tile.location(next.latitude, next.longitude) != Location::HasInterpolationNeighbors {
                    break self.cache.get_tile(next.latitude, next.longitude)?;
                }
            };
            tile = next_tile;
            h_max = h_max.max(tile.max_elevation());
            entry = ellipsoid.geodetic_normalized(&advanced, tile.min_longitude())?;
        }
    }

    fn refine_intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<NormalizedGeodeticPoint> {
        let delta = ellipsoid.cartesian(&GeodeticPoint::from(*close_guess)) - position;
        let s = delta.dot(los) / los.norm_squared();
        let projected = position + los * s;
        let gp = ellipsoid.geodetic_normalized(&projected, close_guess.longitude())?;

        let tile = self.cache.get_tile(gp.latitude(), gp.longitude())?;
        let (row, col) = Self::cell_indices(&tile, &gp);
        // scan the guess cell and its whole neighborhood
        let hit = scan_cells(ellipsoid, position, los, &*tile, &gp, row - 1, col - 1, row + 1, col + 1)?;
        hit.ok_or(Error::LineOfSightDoesNotReachGround)
    }

    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let tile = self.cache.get_tile(latitude, longitude)?;
        Ok(tile.interpolate_elevation(latitude, longitude)?)
    }

    fn id(&self) -> AlgorithmId {
        AlgorithmId::BasicScan
    }
}
