use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("line of sight never crosses altitude {0} m")]
    LineOfSightNeverCrossesAltitude(f64),
    #[error("line of sight never crosses latitude {}\u{b0}", .0.to_degrees())]
    LineOfSightNeverCrossesLatitude(f64),
    #[error("line of sight never crosses longitude {}\u{b0}", .0.to_degrees())]
    LineOfSightNeverCrossesLongitude(f64),
}
