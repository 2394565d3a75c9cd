#![allow(dead_code)]

//! Shared scene builders: a circular equatorial orbit with a nadir-pointing
//! platform, synthetic terrains and sensor fans.

use std::sync::Arc;

use hifitime::{Duration, Epoch};
use nalgebra::{Matrix3, Rotation3, UnitQuaternion, Vector3};

use dem::{TileUpdater, UpdatableTile};
use geom::{Ellipsoid, EllipsoidId, FrameId, constants::WGS84_EQUATORIAL_RADIUS};
use locate::{AlgorithmId, FixedLos, LineSensor, LinearLineDatation, Locator, LocatorBuilder};
use orbit::{AttitudeSample, PvSample, Trajectory, UniformlyRotatingBody};

pub const EARTH_MU: f64 = 3.986004418e14;
pub const ORBIT_ALTITUDE: f64 = 694_000.0;

pub fn t0() -> Epoch {
    Epoch::from_gpst_seconds(1.3e9)
}

pub fn orbit_radius() -> f64 {
    WGS84_EQUATORIAL_RADIUS + ORBIT_ALTITUDE
}

fn attitude_at(theta: f64) -> UnitQuaternion<f64> {
    let r_hat = Vector3::new(theta.cos(), theta.sin(), 0.0);
    let v_hat = Vector3::new(-theta.sin(), theta.cos(), 0.0);
    let x = v_hat;
    let z = -r_hat;
    let y = z.cross(&x);
    // rows of the inertial -> spacecraft matrix
    let m = Matrix3::new(x.x, x.y, x.z, y.x, y.y, y.z, z.x, z.y, z.z);
    UnitQuaternion::from_rotation_matrix(&Rotation3::from_matrix_unchecked(m))
}

/// Circular equatorial orbit crossing longitude 0 at `t0`, with the
/// platform flying velocity-forward and looking nadir.
pub fn circular_trajectory(radius: f64) -> Trajectory {
    let omega = (EARTH_MU / (radius * radius * radius)).sqrt();
    let mut pv = Vec::new();
    let mut attitude = Vec::new();
    for k in -20..=40 {
        let t = k as f64;
        let epoch = t0() + Duration::from_seconds(t);
        let theta = omega * t;
        pv.push(PvSample::new(
            epoch,
            Vector3::new(radius * theta.cos(), radius * theta.sin(), 0.0),
            Vector3::new(-radius * omega * theta.sin(), radius * omega * theta.cos(), 0.0),
        ));
        attitude.push(AttitudeSample {
            epoch,
            rotation: attitude_at(theta),
            rate: Some(Vector3::new(0.0, -omega, 0.0)),
            rate_derivative: None,
        });
    }
    Trajectory::new(FrameId::GCRF, pv, attitude).expect("valid synthetic trajectory")
}

pub enum FanAxis {
    /// Pixels sweep across the ground track.
    CrossTrack,
    /// Pixels sweep along the ground track.
    AlongTrack,
}

/// Sensor with `n` pixels spread over twice `half_aperture`, the whole fan
/// rolled by `roll` around the velocity axis. Line 0 is dated `t0`, at
/// 1.5 ms per line.
pub fn line_sensor(name: &str, n: usize, half_aperture: f64, roll: f64, fan: FanAxis) -> LineSensor {
    let directions = (0..n)
        .map(|p| {
            let delta = half_aperture * (2.0 * p as f64 / (n as f64 - 1.0) - 1.0);
            match fan {
                FanAxis::CrossTrack => {
                    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), roll + delta) * Vector3::z()
                }
                FanAxis::AlongTrack => {
                    UnitQuaternion::from_axis_angle(&Vector3::x_axis(), roll)
                        * (UnitQuaternion::from_axis_angle(&Vector3::y_axis(), delta) * Vector3::z())
                }
            }
        })
        .collect();
    LineSensor::new(
        name,
        Vector3::zeros(),
        Box::new(LinearLineDatation::new(t0(), 0.0, 1.0 / 1.5e-3)),
        Box::new(FixedLos::new(directions)),
    )
}

/// One-degree, corner-aligned tiles sampling a smooth global elevation
/// field; continuous across tile seams so neighboring tiles agree.
pub struct SmoothTerrainUpdater {
    pub base: f64,
    pub amplitude: f64,
    pub samples: usize,
}

impl SmoothTerrainUpdater {
    pub fn new(base: f64, amplitude: f64, samples: usize) -> Self {
        SmoothTerrainUpdater {
            base,
            amplitude,
            samples,
        }
    }

    pub fn elevation(&self, latitude: f64, longitude: f64) -> f64 {
        let undulation = 0.5
            * ((1800.0 * latitude + 1.3).sin() * (2400.0 * longitude + 0.7).sin()
                + (700.0 * latitude - 0.4).sin() * (900.0 * longitude + 2.1).sin());
        self.base + self.amplitude * 0.5 * (undulation + 1.0)
    }
}

impl TileUpdater for SmoothTerrainUpdater {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut dyn UpdatableTile) -> dem::Result {
        let size = 1f64.to_radians();
        let step = size / (self.samples as f64 - 1.0);
        let min_lat = (latitude / size).floor() * size;
        let min_lon = (longitude / size).floor() * size;
        // one extra row and column so tile edges keep interpolation
        // neighbors inside a single tile
        let n = self.samples + 1;
        tile.set_geometry(min_lat, min_lon, step, step, n, n)?;
        for i in 0..n {
            for j in 0..n {
                let lat = min_lat + i as f64 * step;
                let lon = min_lon + j as f64 * step;
                tile.set_elevation(i, j, self.elevation(lat, lon))?;
            }
        }
        Ok(())
    }
}

/// Flat terrain at a constant elevation.
pub struct ConstantTerrainUpdater {
    pub elevation: f64,
}

impl TileUpdater for ConstantTerrainUpdater {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut dyn UpdatableTile) -> dem::Result {
        let size = 1f64.to_radians();
        let samples = 33;
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

pub fn wgs84() -> Ellipsoid {
    Ellipsoid::new(EllipsoidId::Wgs84, FrameId::ITRF)
}

/// Assembles a locator around the standard test orbit.
pub fn build_locator(
    sensor: LineSensor,
    updater: Arc<dyn TileUpdater>,
    algorithm: AlgorithmId,
    light_time: bool,
    aberration: bool,
) -> Locator {
    let trajectory = circular_trajectory(orbit_radius());
    let provider = UniformlyRotatingBody::earth(t0(), 0.0);
    LocatorBuilder::new()
        .ellipsoid(wgs84())
        .trajectory(
            trajectory,
            Box::new(provider),
            t0() - Duration::from_seconds(5.0),
            t0() + Duration::from_seconds(10.0),
            0.25,
            0.1,
        )
        .algorithm(algorithm)
        .digital_elevation_model(updater, 12)
        .light_time_correction(light_time)
        .aberration_of_light_correction(aberration)
        .add_sensor(sensor)
        .build()
        .expect("locator configuration is complete")
}

/// Chord distance between two geodetic points, adequate for meter-scale
/// separations.
pub fn ground_distance(ellipsoid: &Ellipsoid, a: &geom::GeodeticPoint, b: &geom::GeodeticPoint) -> f64 {
    (ellipsoid.cartesian(a) - ellipsoid.cartesian(b)).norm()
}
