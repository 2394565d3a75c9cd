//! Finite-speed-of-light corrections applied in the inertial frame.

use nalgebra::Vector3;

pub const SPEED_OF_LIGHT: f64 = 299_792_458.0;

/// Corrects an observed line of sight for the aberration of light.
///
/// Classical, non-relativistic composition of the observed direction with
/// the observer velocity: the true direction towards the ground is
/// `c los - v`, renormalized.
pub fn aberration_corrected_los(los: &Vector3<f64>, spacecraft_velocity: &Vector3<f64>) -> Vector3<f64> {
    (los * SPEED_OF_LIGHT - spacecraft_velocity).normalize()
}

/// One-way light travel time from a ground point to the spacecraft.
pub fn light_time_delay(ground: &Vector3<f64>, spacecraft: &Vector3<f64>) -> f64 {
    (ground - spacecraft).norm() / SPEED_OF_LIGHT
}
