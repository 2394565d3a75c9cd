use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("internal error: {0}")]
    InternalError(String),
    #[error("unknown sensor {0}")]
    UnknownSensor(String),
    #[error("line of sight does not reach ground")]
    LineOfSightDoesNotReachGround,
    #[error("DEM entry point is behind spacecraft")]
    DemEntryPointIsBehindSpacecraft,
    #[error("no refraction layer data below altitude {altitude} m, lowest layer starts at {lowest} m")]
    NoLayerData { altitude: f64, lowest: f64 },
    #[error("invalid line range [{min_line}, {max_line}]")]
    InvalidRangeForLines { min_line: f64, max_line: f64 },
    #[error("sensor pixel not found in line range [{min_line}, {max_line}]")]
    SensorPixelNotFoundInRangeLines { min_line: f64, max_line: f64 },
    #[error("sensor pixel not found in pixels of line {line}")]
    SensorPixelNotFoundInPixelsLine { line: f64 },
    #[error("cannot parse dump line {line}: {message}")]
    CannotParseDumpLine { line: usize, message: String },
    #[error(transparent)]
    Geometry(#[from] geom::Error),
    #[error(transparent)]
    Dem(#[from] dem::Error),
    #[error(transparent)]
    Orbit(#[from] orbit::Error),
    #[error("dump I/O error: {0}")]
    Io(#[from] std::io::Error),
}
