use std::sync::Arc;

use log::warn;
use nalgebra::Vector3;

use dem::{Location, MinMaxTreeTile, Tile, TileCache, TileUpdater};
use geom::{Ellipsoid, GeodeticPoint, NormalizedGeodeticPoint};

use crate::algorithm::{AlgorithmId, IntersectionAlgorithm, ground_or_escape, scan_cells};
use crate::{Error, Result};

/// Margin used when stepping above the terrain envelope or across tile
/// boundaries, in meters.
const STEP: f64 = 0.01;

const MAX_RECURSION_DEPTH: usize = 30;

/// Ray/terrain intersection with min/max k-d tree pruning.
///
/// The line of sight enters the terrain envelope at the tile maximum
/// altitude, then tiles are traversed one by one; inside a tile, whole
/// sub-tiles whose maximum elevation stays below the ray are skipped using
/// the tree, and only the few remaining cells are tested exactly.
pub struct DuvenhageAlgorithm {
    cache: TileCache<MinMaxTreeTile>,
    flat_body: bool,
}

enum ExitKind {
    /// The ray leaves through a lateral tile boundary.
    Side,
    /// The ray crosses the minimum-altitude surface of the tile.
    Bottom,
    /// The ray stays above the minimum altitude and re-ascends inside the
    /// tile footprint.
    Above,
}

struct ExitPoint {
    point: NormalizedGeodeticPoint,
    kind: ExitKind,
}

impl DuvenhageAlgorithm {
    pub fn new(updater: Arc<dyn TileUpdater>, max_cached_tiles: usize, flat_body: bool) -> Self {
        DuvenhageAlgorithm {
            cache: TileCache::new(updater, max_cached_tiles),
            flat_body,
        }
    }

    fn cell_indices(tile: &MinMaxTreeTile, gp: &NormalizedGeodeticPoint) -> (i32, i32) {
        (
            tile.floor_latitude_index(gp.latitude())
                .clamp(0, tile.latitude_rows() as i32 - 2),
            tile.floor_longitude_index(gp.longitude())
                .clamp(0, tile.longitude_columns() as i32 - 2),
        )
    }

    // entry point of the search: where the line of sight pierces the
    // current maximum-altitude envelope, switching tiles as needed
    fn find_entry(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<(NormalizedGeodeticPoint, Arc<MinMaxTreeTile>)> {
        let gp0 = ground_or_escape(ellipsoid.point_on_ground(position, los, 0.0))?;
        let mut tile = self.cache.get_tile(gp0.latitude(), gp0.longitude())?;
        let mut h_max = tile.max_elevation();

        loop {
            let entry_p = ground_or_escape(ellipsoid.point_at_altitude(position, los, h_max + STEP))?;
            let current = if (entry_p - position).dot(los) < 0.0 {
                // the whole envelope is behind the spacecraft, usable only
                // if the spacecraft itself flies above the terrain
                let position_gp = ellipsoid.geodetic_normalized(position, tile.min_longitude())?;
                let elevation = tile
                    .interpolate_elevation(position_gp.latitude(), position_gp.longitude())
                    .map_err(|_| Error::DemEntryPointIsBehindSpacecraft)?;
                if position_gp.altitude() >= elevation {
                    position_gp
                } else {
                    return Err(Error::DemEntryPointIsBehindSpacecraft);
                }
            } else {
                ellipsoid.geodetic_normalized(&entry_p, tile.min_longitude())?
            };

            if tile.location(current.latitude(), current.longitude()) == Location::HasInterpolationNeighbors {
                return Ok((current, tile));
            }
            // the entry point belongs to another tile
            tile = self.cache.get_tile(current.latitude(), current.longitude())?;
            h_max = h_max.max(tile.max_elevation());
        }
    }

    // first crossing of either the minimum-altitude surface or a lateral
    // boundary of the tile
    fn find_exit(
        &self,
        tile: &MinMaxTreeTile,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<ExitPoint> {
        let (exit_gp, reaches_bottom) = match ellipsoid.point_at_altitude(position, los, tile.min_elevation()) {
            Ok(p) => (ellipsoid.geodetic_normalized(&p, tile.min_longitude())?, true),
            Err(_) => {
                // grazing ray that never descends to the tile floor; use its
                // lowest point as a pseudo exit
                let s_low = -position.dot(los) / los.norm_squared();
                let lowest = position + los * s_low;
                (ellipsoid.geodetic_normalized(&lowest, tile.min_longitude())?, false)
            }
        };

        let location = tile.location(exit_gp.latitude(), exit_gp.longitude());
        if location == Location::HasInterpolationNeighbors {
            return Ok(ExitPoint {
                point: exit_gp,
                kind: if reaches_bottom { ExitKind::Bottom } else { ExitKind::Above },
            });
        }

        // candidate crossings with the lateral boundaries on the exit side
        let exit_cartesian = ellipsoid.cartesian(&GeodeticPoint::from(exit_gp));
        let mut candidates: Vec<Vector3<f64>> = Vec::new();
        match location {
            Location::West | Location::SouthWest | Location::NorthWest => {
                if let Ok(p) = ellipsoid.point_at_longitude(position, los, tile.min_longitude()) {
                    candidates.push(p);
                }
            }
            Location::East | Location::SouthEast | Location::NorthEast => {
                if let Ok(p) = ellipsoid.point_at_longitude(position, los, tile.max_longitude()) {
                    candidates.push(p);
                }
            }
            _ => {}
        }
        match location {
            Location::South | Location::SouthWest | Location::SouthEast => {
                if let Ok(p) = ellipsoid.point_at_latitude(position, los, tile.min_latitude(), &exit_cartesian) {
                    candidates.push(p);
                }
            }
            Location::North | Location::NorthWest | Location::NorthEast => {
                if let Ok(p) = ellipsoid.point_at_latitude(position, los, tile.max_latitude(), &exit_cartesian) {
                    candidates.push(p);
                }
            }
            _ => {}
        }

        // the tile is left at the first crossing along the line
        let best = candidates
            .into_iter()
            .map(|p| ((p - position).dot(los), p))
            .min_by(|a, b| a.0.total_cmp(&b.0));
        match best {
            Some((_, p)) => Ok(ExitPoint {
                point: ellipsoid.geodetic_normalized(&p, tile.min_longitude())?,
                kind: ExitKind::Side,
            }),
            None => Ok(ExitPoint {
                point: exit_gp,
                kind: ExitKind::Above,
            }),
        }
    }

    fn linear_crossing(
        entry: &NormalizedGeodeticPoint,
        exit: &NormalizedGeodeticPoint,
        fraction: f64,
    ) -> NormalizedGeodeticPoint {
        NormalizedGeodeticPoint::new(
            entry.latitude() + fraction * (exit.latitude() - entry.latitude()),
            entry.longitude() + fraction * (exit.longitude() - entry.longitude()),
            entry.altitude() + fraction * (exit.altitude() - entry.altitude()),
            entry.longitude(),
        )
    }

    fn crossing_at_longitude(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        entry: &NormalizedGeodeticPoint,
        exit: &NormalizedGeodeticPoint,
        longitude: f64,
    ) -> NormalizedGeodeticPoint {
        if !self.flat_body {
            if let Ok(p) = ellipsoid.point_at_longitude(position, los, longitude) {
                if let Ok(gp) = ellipsoid.geodetic_normalized(&p, entry.longitude()) {
                    return gp;
                }
            }
            // transient geometric failure, degrade to linear interpolation
        }
        let span = exit.longitude() - entry.longitude();
        let fraction = if span.abs() < 1.0e-15 {
            0.5
        } else {
            (longitude - entry.longitude()) / span
        };
        Self::linear_crossing(entry, exit, fraction)
    }

    fn crossing_at_latitude(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        entry: &NormalizedGeodeticPoint,
        exit: &NormalizedGeodeticPoint,
        latitude: f64,
    ) -> NormalizedGeodeticPoint {
        if !self.flat_body {
            let close = ellipsoid.cartesian(&GeodeticPoint::from(Self::linear_crossing(entry, exit, 0.5)));
            if let Ok(p) = ellipsoid.point_at_latitude(position, los, latitude, &close) {
                if let Ok(gp) = ellipsoid.geodetic_normalized(&p, entry.longitude()) {
                    return gp;
                }
            }
        }
        let span = exit.latitude() - entry.latitude();
        let fraction = if span.abs() < 1.0e-15 {
            0.5
        } else {
            (latitude - entry.latitude()) / span
        };
        Self::linear_crossing(entry, exit, fraction)
    }

    #[allow(clippy::too_many_arguments)]
    fn recurse_intersection(
        &self,
        depth: usize,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        tile: &MinMaxTreeTile,
        entry: &NormalizedGeodeticPoint,
        entry_row: i32,
        entry_col: i32,
        exit: &NormalizedGeodeticPoint,
        exit_row: i32,
        exit_col: i32,
    ) -> Result<Option<NormalizedGeodeticPoint>> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(Error::InternalError(
                "maximum recursion depth reached while searching the terrain intersection".into(),
            ));
        }

        if (entry_row - exit_row).abs() <= 1 && (entry_col - exit_col).abs() <= 1 {
            // the search narrowed down to a few cells, test them all
            return scan_cells(ellipsoid, position, los, tile, entry, entry_row, entry_col, exit_row, exit_col);
        }

        let merge = tile.get_merge_level(
            entry_row as usize,
            entry_col as usize,
            exit_row as usize,
            exit_col as usize,
        );
        let level = ((merge + 1) as usize).min(tile.levels());

        if exit.altitude() >= tile.get_max_elevation(exit_row as usize, exit_col as usize, level)? {
            // the whole segment flies above the local terrain envelope
            return Ok(None);
        }

        let max_row = tile.latitude_rows() as i32 - 2;
        let max_col = tile.longitude_columns() as i32 - 2;
        let mut prev = *entry;
        let (mut prev_row, mut prev_col) = (entry_row, entry_col);

        if tile.is_column_merging(level) {
            let forward = exit_col >= entry_col;
            for boundary in tile.get_crossed_boundary_columns(entry_col, exit_col, level) {
                let longitude = tile.longitude_at(boundary);
                let crossing = self.crossing_at_longitude(ellipsoid, position, los, &prev, exit, longitude);
                let crossing_row = tile.floor_latitude_index(crossing.latitude()).clamp(0, max_row);
                let before = if forward { boundary - 1 } else { boundary }.clamp(0, max_col);
                let after = if forward { boundary } else { boundary - 1 }.clamp(0, max_col);
                if let Some(hit) = self.recurse_intersection(
                    depth + 1,
                    ellipsoid,
                    position,
                    los,
                    tile,
                    &prev,
                    prev_row,
                    prev_col,
                    &crossing,
                    crossing_row,
                    before,
                )? {
                    return Ok(Some(hit));
                }
                prev = crossing;
                prev_row = crossing_row;
                prev_col = after;
            }
        } else {
            let forward = exit_row >= entry_row;
            for boundary in tile.get_crossed_boundary_rows(entry_row, exit_row, level) {
                let latitude = tile.latitude_at(boundary);
                let crossing = self.crossing_at_latitude(ellipsoid, position, los, &prev, exit, latitude);
                let crossing_col = tile.floor_longitude_index(crossing.longitude()).clamp(0, max_col);
                let before = if forward { boundary - 1 } else { boundary }.clamp(0, max_row);
                let after = if forward { boundary } else { boundary - 1 }.clamp(0, max_row);
                if let Some(hit) = self.recurse_intersection(
                    depth + 1,
                    ellipsoid,
                    position,
                    los,
                    tile,
                    &prev,
                    prev_row,
                    prev_col,
                    &crossing,
                    before,
                    crossing_col,
                )? {
                    return Ok(Some(hit));
                }
                prev = crossing;
                prev_row = after;
                prev_col = crossing_col;
            }
        }

        self.recurse_intersection(
            depth + 1,
            ellipsoid,
            position,
            los,
            tile,
            &prev,
            prev_row,
            prev_col,
            exit,
            exit_row,
            exit_col,
        )
    }
}

impl IntersectionAlgorithm for DuvenhageAlgorithm {
    fn intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint> {
        let (mut entry, mut tile) = self.find_entry(ellipsoid, position, los)?;

        loop {
            let exit = self.find_exit(&tile, ellipsoid, position, los)?;

            let (entry_row, entry_col) = Self::cell_indices(&tile, &entry);
            let (exit_row, exit_col) = Self::cell_indices(&tile, &exit.point);

            if let Some(hit) = self.recurse_intersection(
                0,
                ellipsoid,
                position,
                los,
                &tile,
                &entry,
                entry_row,
                entry_col,
                &exit.point,
                exit_row,
                exit_col,
            )? {
                return Ok(hit);
            }

            match exit.kind {
                ExitKind::Side => {
                    // continue the search in the neighboring tile
                    let advanced =
                        ellipsoid.cartesian(&GeodeticPoint::from(exit.point)) + los.normalize() * STEP;
                    let next = ellipsoid.geodetic(&advanced)?;
                    tile = self.cache.get_tile(next.latitude, next.longitude)?;
                    entry = ellipsoid.geodetic_normalized(&advanced, tile.min_longitude())?;
                }
                ExitKind::Above => {
                    // the ray re-ascends without having met the terrain
                    return Err(Error::LineOfSightDoesNotReachGround);
                }
                ExitKind::Bottom => {
                    // the pruning recursion lost the crossing to numerical
                    // noise, fall back to an exhaustive scan of the segment
                    warn!("tree search missed a terrain crossing, scanning cells exhaustively");
                    let scanned = scan_cells(
                        ellipsoid, position, los, &*tile, &entry, entry_row, entry_col, exit_row, exit_col,
                    )?;
                    return scanned.ok_or_else(|| {
                        Error::InternalError("line of sight crossed the tile floor without meeting terrain".into())
                    });
                }
            }
        }
    }

    fn refine_intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<NormalizedGeodeticPoint> {
        // project the close guess back onto the line of sight
        let delta = ellipsoid.cartesian(&GeodeticPoint::from(*close_guess)) - position;
        let s = delta.dot(los) / los.norm_squared();
        let projected = position + los * s;
        let gp = ellipsoid.geodetic_normalized(&projected, close_guess.longitude())?;

        let tile = self.cache.get_tile(gp.latitude(), gp.longitude())?;
        let (row, col) = Self::cell_indices(&tile, &gp);
        let topo_los = ellipsoid.convert_los(&GeodeticPoint::from(gp), los);

        if let Some(hit) = tile.cell_intersection(&gp, &topo_los, row, col)? {
            return Ok(hit);
        }
        if self.flat_body {
            // under the flat-body assumption the guess neighborhood is
            // authoritative; a guess sitting exactly on a cell boundary may
            // resolve in an adjacent cell
            let hit = scan_cells(ellipsoid, position, los, &*tile, &gp, row - 1, col - 1, row + 1, col + 1)?;
            return hit.ok_or(Error::LineOfSightDoesNotReachGround);
        }

        // the refined geometry left the cell of the guess: step out of the
        // cell along the line and restart a full search from there
        let u = tile.fractional_longitude_index(gp.longitude()) - col as f64;
        let v = tile.fractional_latitude_index(gp.latitude()) - row as f64;
        let du = topo_los.x / tile.longitude_step();
        let dv = topo_los.y / tile.latitude_step();
        let mut s_exit = f64::INFINITY;
        for (coord, rate) in [(u, du), (v, dv)] {
            if rate > 1.0e-15 {
                s_exit = s_exit.min((1.0 - coord) / rate);
            } else if rate < -1.0e-15 {
                s_exit = s_exit.min(-coord / rate);
            }
        }
        if !s_exit.is_finite() {
            s_exit = 0.0;
        }
        let restart = ellipsoid.cartesian(&GeodeticPoint::from(gp)) + los.normalize() * (s_exit + STEP);
        self.intersection(ellipsoid, &restart, los)
    }

    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let tile = self.cache.get_tile(latitude, longitude)?;
        Ok(tile.interpolate_elevation(latitude, longitude)?)
    }

    fn id(&self) -> AlgorithmId {
        if self.flat_body {
            AlgorithmId::DuvenhageFlatBody
        } else {
            AlgorithmId::Duvenhage
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use dem::UpdatableTile;
    use geom::EllipsoidId;

    use super::*;

    struct FlatUpdater {
        elevation: f64,
    }

    impl TileUpdater for FlatUpdater {
        fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut dyn UpdatableTile) -> dem::Result {
            let size = 1f64.to_radians();
            let samples = 17;
            let step = size / (samples as f64 - 1.0);
            let min_lat = (latitude / size).floor() * size;
            let min_lon = (longitude / size).floor() * size;
            tile.set_geometry(min_lat, min_lon, step, step, samples + 1, samples + 1)?;
            for i in 0..=samples {
                for j in 0..=samples {
                    tile.set_elevation(i, j, self.elevation)?;
                }
            }
            Ok(())
        }
    }

    fn scene(elevation: f64) -> (Ellipsoid, DuvenhageAlgorithm) {
        (
            Ellipsoid::new(EllipsoidId::Wgs84, geom::FrameId::ITRF),
            DuvenhageAlgorithm::new(Arc::new(FlatUpdater { elevation }), 4, false),
        )
    }

    #[test]
    fn nadir_ray_hits_flat_terrain_at_its_elevation() {
        let (ellipsoid, algorithm) = scene(100.0);
        let origin = GeodeticPoint::from_degrees(0.4, 0.6, 694_000.0);
        let position = ellipsoid.cartesian(&origin);
        let ground = ellipsoid.cartesian(&GeodeticPoint::from_degrees(0.4, 0.6, 0.0));
        let los = (ground - position).normalize();

        let hit = algorithm.intersection(&ellipsoid, &position, &los).unwrap();
        assert_abs_diff_eq!(hit.altitude(), 100.0, epsilon = 1e-4);
        assert_abs_diff_eq!(hit.latitude(), origin.latitude, epsilon = 1e-8);
        assert_abs_diff_eq!(hit.longitude(), origin.longitude, epsilon = 1e-8);

        let refined = algorithm.refine_intersection(&ellipsoid, &position, &los, &hit).unwrap();
        assert_abs_diff_eq!(refined.altitude(), hit.altitude(), epsilon = 1e-6);
        assert_abs_diff_eq!(refined.latitude(), hit.latitude(), epsilon = 1e-10);
    }

    #[test]
    fn elevation_queries_read_the_tiles() {
        let (_, algorithm) = scene(321.5);
        let h = algorithm.elevation_at(0.01, 0.01).unwrap();
        assert_abs_diff_eq!(h, 321.5, epsilon = 1e-9);
    }

    #[test]
    fn spacecraft_below_terrain_is_rejected() {
        let (ellipsoid, algorithm) = scene(100.0);
        // flying at 50 m, below the 100 m terrain
        let position = ellipsoid.cartesian(&GeodeticPoint::from_degrees(0.4, 0.6, 50.0));
        let los = -position.normalize();
        assert!(matches!(
            algorithm.intersection(&ellipsoid, &position, &los),
            Err(Error::DemEntryPointIsBehindSpacecraft)
        ));
    }

    #[test]
    fn slanted_ray_crosses_tile_boundaries() {
        let (ellipsoid, algorithm) = scene(0.0);
        // aim from above one degree square into the neighboring one
        let origin = GeodeticPoint::from_degrees(0.9, 0.9, 694_000.0);
        let target = GeodeticPoint::from_degrees(1.3, 1.4, 0.0);
        let position = ellipsoid.cartesian(&origin);
        let los = (ellipsoid.cartesian(&target) - position).normalize();

        let hit = algorithm.intersection(&ellipsoid, &position, &los).unwrap();
        assert_abs_diff_eq!(hit.latitude(), target.latitude, epsilon = 1e-8);
        assert_abs_diff_eq!(hit.longitude(), target.longitude, epsilon = 1e-8);
        assert_abs_diff_eq!(hit.altitude(), 0.0, epsilon = 1e-3);
    }
}
