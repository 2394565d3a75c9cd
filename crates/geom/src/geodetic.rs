use std::f64::consts::PI;

use approx::{AbsDiffEq, RelativeEq};

/// Geodetic coordinates: latitude and longitude in radians, altitude in
/// meters above the ellipsoid.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct GeodeticPoint {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

impl GeodeticPoint {
    pub const fn new(latitude: f64, longitude: f64, altitude: f64) -> Self {
        GeodeticPoint {
            latitude,
            longitude,
            altitude,
        }
    }

    pub fn from_degrees(latitude: f64, longitude: f64, altitude: f64) -> Self {
        GeodeticPoint::new(latitude.to_radians(), longitude.to_radians(), altitude)
    }

    pub fn latitude_deg(&self) -> f64 {
        self.latitude.to_degrees()
    }

    pub fn longitude_deg(&self) -> f64 {
        self.longitude.to_degrees()
    }
}

impl std::fmt::Display for GeodeticPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "(lat: {}\u{b0}, lon: {}\u{b0}, alt: {} m)",
            self.latitude.to_degrees(),
            self.longitude.to_degrees(),
            self.altitude
        )
    }
}

/// Brings `longitude` into `[center - PI, center + PI)`.
pub fn normalized_longitude(longitude: f64, center: f64) -> f64 {
    center - PI + (longitude - center + PI).rem_euclid(2.0 * PI)
}

/// A geodetic point whose longitude has been normalized around a reference
/// longitude, so that longitude differences against nearby points stay small
/// and usable as tile offsets.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct NormalizedGeodeticPoint {
    latitude: f64,
    longitude: f64,
    altitude: f64,
}

impl NormalizedGeodeticPoint {
    pub fn new(latitude: f64, longitude: f64, altitude: f64, center: f64) -> Self {
        NormalizedGeodeticPoint {
            latitude,
            longitude: normalized_longitude(longitude, center),
            altitude,
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }

    pub fn altitude(&self) -> f64 {
        self.altitude
    }

    pub fn with_altitude(&self, altitude: f64) -> Self {
        NormalizedGeodeticPoint { altitude, ..*self }
    }
}

impl From<NormalizedGeodeticPoint> for GeodeticPoint {
    fn from(p: NormalizedGeodeticPoint) -> Self {
        GeodeticPoint::new(p.latitude, p.longitude, p.altitude)
    }
}

impl std::fmt::Display for NormalizedGeodeticPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        GeodeticPoint::from(*self).fmt(f)
    }
}

impl AbsDiffEq for GeodeticPoint {
    type Epsilon = f64;

    fn default_epsilon() -> Self::Epsilon {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        self.latitude.abs_diff_eq(&other.latitude, epsilon)
            && self.longitude.abs_diff_eq(&other.longitude, epsilon)
            && self.altitude.abs_diff_eq(&other.altitude, epsilon)
    }
}

impl RelativeEq for GeodeticPoint {
    fn default_max_relative() -> Self::Epsilon {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: Self::Epsilon, max_relative: Self::Epsilon) -> bool {
        self.latitude.relative_eq(&other.latitude, epsilon, max_relative)
            && self.longitude.relative_eq(&other.longitude, epsilon, max_relative)
            && self.altitude.relative_eq(&other.altitude, epsilon, max_relative)
    }
}
