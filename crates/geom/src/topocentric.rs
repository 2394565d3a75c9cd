use nalgebra::Vector3;

use crate::GeodeticPoint;

/// Local east/north/zenith basis at a geodetic point, expressed in the body
/// frame.
pub fn topocentric_basis(origin: &GeodeticPoint) -> (Vector3<f64>, Vector3<f64>, Vector3<f64>) {
    let (sin_lat, cos_lat) = origin.latitude.sin_cos();
    let (sin_lon, cos_lon) = origin.longitude.sin_cos();

    let east = Vector3::new(-sin_lon, cos_lon, 0.0);
    let north = Vector3::new(-sin_lat * cos_lon, -sin_lat * sin_lon, cos_lat);
    let zenith = Vector3::new(cos_lat * cos_lon, cos_lat * sin_lon, sin_lat);

    (east, north, zenith)
}
