use nalgebra::{Unit, Vector3};

use crate::meanplane::CrossingResult;
use crate::sensor::LineSensor;

/// Locates, within a crossing line, the fractional pixel whose interpolated
/// line of sight points at the target.
///
/// The search axis is the direction along the sensor line,
/// `target x mean-plane normal`; the signed projection of the pixel lines of
/// sight on that axis changes sign at the target pixel.
pub(crate) fn locate_pixel(
    sensor: &LineSensor,
    mean_plane_normal: &Unit<Vector3<f64>>,
    crossing: &CrossingResult,
) -> Option<f64> {
    let cross_axis = crossing.direction.cross(mean_plane_normal);
    let norm = cross_axis.norm();
    if norm < 1.0e-15 {
        return None;
    }
    let cross_axis = cross_axis / norm;

    let n = sensor.nb_pixels();
    let mut previous = sensor.los(crossing.date, 0).dot(&cross_axis);
    for pixel in 1..n {
        let current = sensor.los(crossing.date, pixel).dot(&cross_axis);
        if previous == 0.0 {
            return Some((pixel - 1) as f64);
        }
        if previous * current <= 0.0 {
            // linear interpolation of the sign change
            return Some((pixel - 1) as f64 + previous / (previous - current));
        }
        previous = current;
    }
    None
}

#[cfg(test)]
mod tests {
    use hifitime::Epoch;
    use nalgebra::{UnitQuaternion, Vector3};

    use crate::meanplane::CrossingResult;
    use crate::sensor::{FixedLos, LineSensor, LinearLineDatation};

    use super::*;

    fn fan_sensor(n: usize, half_aperture: f64) -> LineSensor {
        let directions = (0..n)
            .map(|p| {
                let delta = half_aperture * (2.0 * p as f64 / (n as f64 - 1.0) - 1.0);
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), delta) * Vector3::z()
            })
            .collect();
        LineSensor::new(
            "fan",
            Vector3::zeros(),
            Box::new(LinearLineDatation::new(Epoch::from_gpst_seconds(1.0e9), 0.0, 1000.0)),
            Box::new(FixedLos::new(directions)),
        )
    }

    fn crossing_towards(angle: f64, sensor: &LineSensor) -> CrossingResult {
        CrossingResult {
            line: 0.0,
            date: sensor.date(0.0),
            direction: UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angle) * Vector3::z(),
            direction_derivative: Vector3::zeros(),
        }
    }

    #[test]
    fn pixel_is_interpolated_between_neighbors() {
        let sensor = fan_sensor(11, 0.1);
        let normal = sensor.mean_plane().normal;

        // direction of the fractional pixel 3.25
        let angle = 0.1 * (2.0 * 3.25 / 10.0 - 1.0);
        let crossing = crossing_towards(angle, &sensor);
        let pixel = locate_pixel(&sensor, &normal, &crossing).unwrap();
        assert!((pixel - 3.25).abs() < 1.0e-3, "pixel {pixel}");
    }

    #[test]
    fn directions_outside_the_fan_yield_no_pixel() {
        let sensor = fan_sensor(11, 0.1);
        let normal = sensor.mean_plane().normal;
        let crossing = crossing_towards(0.25, &sensor);
        assert!(locate_pixel(&sensor, &normal, &crossing).is_none());
    }
}
