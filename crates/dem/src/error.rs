use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("cell ({row}, {col}) is outside tile of {rows} rows x {cols} columns")]
    OutOfTileIndices {
        row: i32,
        col: i32,
        rows: usize,
        cols: usize,
    },
    #[error(
        "point (lat {}\u{b0}, lon {}\u{b0}) is outside tile [{}\u{b0}, {}\u{b0}] x [{}\u{b0}, {}\u{b0}]",
        .latitude.to_degrees(), .longitude.to_degrees(),
        .min_latitude.to_degrees(), .max_latitude.to_degrees(),
        .min_longitude.to_degrees(), .max_longitude.to_degrees()
    )]
    OutOfTileAngles {
        latitude: f64,
        longitude: f64,
        min_latitude: f64,
        max_latitude: f64,
        min_longitude: f64,
        max_longitude: f64,
    },
    #[error("no DEM data at lat {}\u{b0}, lon {}\u{b0}", .latitude.to_degrees(), .longitude.to_degrees())]
    NoDemData { latitude: f64, longitude: f64 },
    #[error("DEM tile is empty: {rows} rows x {cols} columns")]
    EmptyTile { rows: usize, cols: usize },
    #[error(
        "DEM updater returned a tile without interpolation neighbors around lat {}\u{b0}, lon {}\u{b0}",
        .latitude.to_degrees(), .longitude.to_degrees()
    )]
    TileWithoutRequiredNeighborsSelected { latitude: f64, longitude: f64 },
    #[error(transparent)]
    Geometry(#[from] geom::Error),
}
