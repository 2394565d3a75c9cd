use nalgebra::Vector3;

use geom::NormalizedGeodeticPoint;

use crate::{Error, Result};

/// Where a geodetic point falls with respect to the interpolable interior of
/// a tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    SouthWest,
    West,
    NorthWest,
    North,
    NorthEast,
    East,
    SouthEast,
    South,
    HasInterpolationNeighbors,
}

/// Write access used by [`TileUpdater`](crate::TileUpdater) implementations
/// while filling a tile.
pub trait UpdatableTile {
    /// Defines the raster extent; must be called before any
    /// [`set_elevation`](Self::set_elevation).
    fn set_geometry(
        &mut self,
        min_latitude: f64,
        min_longitude: f64,
        latitude_step: f64,
        longitude_step: f64,
        latitude_rows: usize,
        longitude_columns: usize,
    ) -> Result;

    /// Sets the elevation of one raster sample.
    fn set_elevation(&mut self, row: usize, col: usize, elevation: f64) -> Result;
}

/// A raster tile of cell-centered elevations.
///
/// Cell `(i, j)` owns the rectangle starting at the `i`-th latitude and
/// `j`-th longitude sample; elevation inside it is the bilinear interpolation
/// of the four corner samples, so the last row and column have no
/// interpolation neighbors of their own.
pub trait Tile: Send + Sync {
    fn min_latitude(&self) -> f64;
    fn min_longitude(&self) -> f64;
    fn latitude_step(&self) -> f64;
    fn longitude_step(&self) -> f64;
    fn latitude_rows(&self) -> usize;
    fn longitude_columns(&self) -> usize;
    fn elevation_at_indices(&self, row: usize, col: usize) -> Result<f64>;
    /// Smallest elevation sample of the tile.
    fn min_elevation(&self) -> f64;
    /// Largest elevation sample of the tile.
    fn max_elevation(&self) -> f64;

    /// Hook invoked by the cache once the updater has filled the tile.
    fn tile_update_completed(&mut self) -> Result {
        Ok(())
    }

    fn max_latitude(&self) -> f64 {
        self.min_latitude() + self.latitude_step() * (self.latitude_rows() as f64 - 1.0)
    }

    fn max_longitude(&self) -> f64 {
        self.min_longitude() + self.longitude_step() * (self.longitude_columns() as f64 - 1.0)
    }

    fn latitude_at(&self, row: i32) -> f64 {
        self.min_latitude() + self.latitude_step() * row as f64
    }

    fn longitude_at(&self, col: i32) -> f64 {
        self.min_longitude() + self.longitude_step() * col as f64
    }

    /// Latitude index in fractional form; integer values sit on raster rows.
    fn fractional_latitude_index(&self, latitude: f64) -> f64 {
        (latitude - self.min_latitude()) / self.latitude_step()
    }

    fn fractional_longitude_index(&self, longitude: f64) -> f64 {
        (longitude - self.min_longitude()) / self.longitude_step()
    }

    fn floor_latitude_index(&self, latitude: f64) -> i32 {
        self.fractional_latitude_index(latitude).floor() as i32
    }

    fn floor_longitude_index(&self, longitude: f64) -> i32 {
        self.fractional_longitude_index(longitude).floor() as i32
    }

    fn location(&self, latitude: f64, longitude: f64) -> Location {
        let row = self.floor_latitude_index(latitude);
        let col = self.floor_longitude_index(longitude);
        let last_row = self.latitude_rows() as i32 - 2;
        let last_col = self.longitude_columns() as i32 - 2;

        if col < 0 {
            if row < 0 {
                Location::SouthWest
            } else if row > last_row {
                Location::NorthWest
            } else {
                Location::West
            }
        } else if col > last_col {
            if row < 0 {
                Location::SouthEast
            } else if row > last_row {
                Location::NorthEast
            } else {
                Location::East
            }
        } else if row < 0 {
            Location::South
        } else if row > last_row {
            Location::North
        } else {
            Location::HasInterpolationNeighbors
        }
    }

    /// Bilinear interpolation of the elevation at a geodetic position.
    ///
    /// Queries up to half a cell outside the raster are clamped to the
    /// nearest interpolable cell, farther ones fail.
    fn interpolate_elevation(&self, latitude: f64, longitude: f64) -> Result<f64> {
        let rows = self.latitude_rows();
        let cols = self.longitude_columns();
        let lat_index = self.fractional_latitude_index(latitude);
        let lon_index = self.fractional_longitude_index(longitude);

        if rows < 2
            || cols < 2
            || lat_index < -0.5
            || lat_index > rows as f64 - 0.5
            || lon_index < -0.5
            || lon_index > cols as f64 - 0.5
        {
            return Err(Error::OutOfTileAngles {
                latitude,
                longitude,
                min_latitude: self.min_latitude(),
                max_latitude: self.max_latitude(),
                min_longitude: self.min_longitude(),
                max_longitude: self.max_longitude(),
            });
        }

        let row = (lat_index.floor() as i32).clamp(0, rows as i32 - 2) as usize;
        let col = (lon_index.floor() as i32).clamp(0, cols as i32 - 2) as usize;
        let dv = lat_index - row as f64;
        let du = lon_index - col as f64;

        let z00 = self.elevation_at_indices(row, col)?;
        let z01 = self.elevation_at_indices(row, col + 1)?;
        let z10 = self.elevation_at_indices(row + 1, col)?;
        let z11 = self.elevation_at_indices(row + 1, col + 1)?;

        Ok(z00 * (1.0 - du) * (1.0 - dv) + z01 * du * (1.0 - dv) + z10 * (1.0 - du) * dv + z11 * du * dv)
    }

    /// First intersection of a line with the bilinear surface over a single
    /// cell.
    ///
    /// `entry` is a point of the line and `los` its direction expressed as
    /// derivatives of (longitude, latitude, altitude) along the line, as
    /// produced by [`geom::Ellipsoid::convert_los`]. Returns `None` when the
    /// line leaves the cell before reaching the surface.
    fn cell_intersection(
        &self,
        entry: &NormalizedGeodeticPoint,
        los: &Vector3<f64>,
        row: i32,
        col: i32,
    ) -> Result<Option<NormalizedGeodeticPoint>> {
        let rows = self.latitude_rows();
        let cols = self.longitude_columns();
        if row < 0 || col < 0 || row > rows as i32 - 2 || col > cols as i32 - 2 {
            return Err(Error::OutOfTileIndices {
                row,
                col,
                rows,
                cols,
            });
        }
        let (row, col) = (row as usize, col as usize);

        let z00 = self.elevation_at_indices(row, col)?;
        let z01 = self.elevation_at_indices(row, col + 1)?;
        let z10 = self.elevation_at_indices(row + 1, col)?;
        let z11 = self.elevation_at_indices(row + 1, col + 1)?;

        // bilinear surface z(u, v) = c0 + c1 u + c2 v + c3 u v over the unit
        // cell, u along longitude, v along latitude
        let c0 = z00;
        let c1 = z01 - z00;
        let c2 = z10 - z00;
        let c3 = z00 - z01 - z10 + z11;

        let u0 = (entry.longitude() - self.longitude_at(col as i32)) / self.longitude_step();
        let v0 = (entry.latitude() - self.latitude_at(row as i32)) / self.latitude_step();
        let du = los.x / self.longitude_step();
        let dv = los.y / self.latitude_step();

        // substitute the parametric line into the surface equation
        let a = c3 * du * dv;
        let b = c3 * (u0 * dv + v0 * du) + c1 * du + c2 * dv - los.z;
        let c = c3 * u0 * v0 + c1 * u0 + c2 * v0 + c0 - entry.altitude();

        let mut roots = [f64::NAN, f64::NAN];
        if a.abs() < 1.0e-20 {
            if b.abs() > 1.0e-20 {
                roots[0] = -c / b;
            }
        } else {
            let discriminant = b * b - 4.0 * a * c;
            if discriminant >= 0.0 {
                let q = -0.5 * (b + b.signum() * discriminant.sqrt());
                let (s1, s2) = (q / a, if q != 0.0 { c / q } else { q / a });
                roots = [s1.min(s2), s1.max(s2)];
            }
        }

        // a whisker of slack on the abscissa and the cell bounds absorbs
        // round-off when the entry point sits exactly on the surface or on a
        // cell edge
        const ABSCISSA_TOLERANCE: f64 = 1.0e-6;
        const IN_CELL_TOLERANCE: f64 = 1.0e-10;
        for s in roots {
            if !s.is_finite() || s < -ABSCISSA_TOLERANCE {
                continue;
            }
            let s = s.max(0.0);
            let u = u0 + s * du;
            let v = v0 + s * dv;
            if (-IN_CELL_TOLERANCE..=1.0 + IN_CELL_TOLERANCE).contains(&u)
                && (-IN_CELL_TOLERANCE..=1.0 + IN_CELL_TOLERANCE).contains(&v)
            {
                return Ok(Some(NormalizedGeodeticPoint::new(
                    entry.latitude() + s * los.y,
                    entry.longitude() + s * los.x,
                    entry.altitude() + s * los.z,
                    entry.longitude(),
                )));
            }
        }

        Ok(None)
    }
}
