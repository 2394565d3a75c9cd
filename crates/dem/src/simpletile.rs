use crate::{Error, Result, Tile, UpdatableTile};

/// Plain in-memory elevation raster.
#[derive(Debug, Clone, Default)]
pub struct SimpleTile {
    min_latitude: f64,
    min_longitude: f64,
    latitude_step: f64,
    longitude_step: f64,
    latitude_rows: usize,
    longitude_columns: usize,
    min_elevation: f64,
    max_elevation: f64,
    elevations: Vec<f64>,
}

impl SimpleTile {
    pub fn new() -> Self {
        SimpleTile::default()
    }
}

impl UpdatableTile for SimpleTile {
    fn set_geometry(
        &mut self,
        min_latitude: f64,
        min_longitude: f64,
        latitude_step: f64,
        longitude_step: f64,
        latitude_rows: usize,
        longitude_columns: usize,
    ) -> Result {
        if latitude_rows < 1 || longitude_columns < 1 {
            return Err(Error::EmptyTile {
                rows: latitude_rows,
                cols: longitude_columns,
            });
        }
        self.min_latitude = min_latitude;
        self.min_longitude = min_longitude;
        self.latitude_step = latitude_step;
        self.longitude_step = longitude_step;
        self.latitude_rows = latitude_rows;
        self.longitude_columns = longitude_columns;
        self.min_elevation = f64::INFINITY;
        self.max_elevation = f64::NEG_INFINITY;
        self.elevations = vec![0.0; latitude_rows * longitude_columns];
        Ok(())
    }

    fn set_elevation(&mut self, row: usize, col: usize, elevation: f64) -> Result {
        if row >= self.latitude_rows || col >= self.longitude_columns {
            return Err(Error::OutOfTileIndices {
                row: row as i32,
                col: col as i32,
                rows: self.latitude_rows,
                cols: self.longitude_columns,
            });
        }
        self.min_elevation = self.min_elevation.min(elevation);
        self.max_elevation = self.max_elevation.max(elevation);
        self.elevations[row * self.longitude_columns + col] = elevation;
        Ok(())
    }
}

impl Tile for SimpleTile {
    fn min_latitude(&self) -> f64 {
        self.min_latitude
    }

    fn min_longitude(&self) -> f64 {
        self.min_longitude
    }

    fn latitude_step(&self) -> f64 {
        self.latitude_step
    }

    fn longitude_step(&self) -> f64 {
        self.longitude_step
    }

    fn latitude_rows(&self) -> usize {
        self.latitude_rows
    }

    fn longitude_columns(&self) -> usize {
        self.longitude_columns
    }

    fn elevation_at_indices(&self, row: usize, col: usize) -> Result<f64> {
        if row >= self.latitude_rows || col >= self.longitude_columns {
            return Err(Error::OutOfTileIndices {
                row: row as i32,
                col: col as i32,
                rows: self.latitude_rows,
                cols: self.longitude_columns,
            });
        }
        Ok(self.elevations[row * self.longitude_columns + col])
    }

    fn min_elevation(&self) -> f64 {
        self.min_elevation
    }

    fn max_elevation(&self) -> f64 {
        self.max_elevation
    }
}
