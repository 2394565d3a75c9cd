use std::sync::Mutex;

use hifitime::{Duration, Epoch};
use nalgebra::{DMatrix, SVD, Unit, Vector3};

/// Real-valued sensor coordinates, sub-pixel accurate.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SensorPixel {
    pub line: f64,
    pub pixel: f64,
}

/// Datation model mapping sensor lines to absolute dates and back.
pub trait LineDatation: Send + Sync {
    fn date(&self, line: f64) -> Epoch;
    fn line(&self, date: Epoch) -> f64;
    /// Lines per second at `line`.
    fn rate(&self, line: f64) -> f64;
}

/// Linear datation: `date = t0 + (line - l0) / rate`.
#[derive(Debug, Clone, Copy)]
pub struct LinearLineDatation {
    reference_date: Epoch,
    reference_line: f64,
    rate: f64,
}

impl LinearLineDatation {
    pub fn new(reference_date: Epoch, reference_line: f64, rate: f64) -> Self {
        LinearLineDatation {
            reference_date,
            reference_line,
            rate,
        }
    }
}

impl LineDatation for LinearLineDatation {
    fn date(&self, line: f64) -> Epoch {
        self.reference_date + Duration::from_seconds((line - self.reference_line) / self.rate)
    }

    fn line(&self, date: Epoch) -> f64 {
        self.reference_line + (date - self.reference_date).to_seconds() * self.rate
    }

    fn rate(&self, _line: f64) -> f64 {
        self.rate
    }
}

/// Pixel lines of sight, possibly drifting with time through calibration
/// parameters.
pub trait TimeDependentLos: Send + Sync {
    fn nb_pixels(&self) -> usize;
    /// Unit line of sight of `pixel` at `date`, in the spacecraft frame.
    fn los(&self, date: Epoch, pixel: usize) -> Vector3<f64>;
    /// Bumped whenever an underlying calibration parameter changes, so
    /// dependent caches can be invalidated.
    fn version(&self) -> u64 {
        0
    }
}

/// Time-independent list of directions.
#[derive(Debug, Clone)]
pub struct FixedLos {
    directions: Vec<Vector3<f64>>,
}

impl FixedLos {
    pub fn new(directions: Vec<Vector3<f64>>) -> Self {
        FixedLos {
            directions: directions.into_iter().map(|d| d.normalize()).collect(),
        }
    }
}

impl TimeDependentLos for FixedLos {
    fn nb_pixels(&self) -> usize {
        self.directions.len()
    }

    fn los(&self, _date: Epoch, pixel: usize) -> Vector3<f64> {
        self.directions[pixel]
    }
}

/// Least-squares best-fit plane of the sensor lines of sight.
#[derive(Debug, Clone, Copy)]
pub struct MeanPlane {
    pub reference_date: Epoch,
    pub reference_point: Vector3<f64>,
    pub normal: Unit<Vector3<f64>>,
}

/// A named push-broom line sensor.
pub struct LineSensor {
    name: String,
    position: Vector3<f64>,
    datation: Box<dyn LineDatation>,
    los: Box<dyn TimeDependentLos>,
    mean_plane: Mutex<Option<(u64, MeanPlane)>>,
}

impl LineSensor {
    pub fn new(
        name: impl Into<String>,
        position: Vector3<f64>,
        datation: Box<dyn LineDatation>,
        los: Box<dyn TimeDependentLos>,
    ) -> Self {
        LineSensor {
            name: name.into(),
            position,
            datation,
            los,
            mean_plane: Mutex::new(None),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Sensor reference position in the spacecraft frame.
    pub fn position(&self) -> Vector3<f64> {
        self.position
    }

    pub fn nb_pixels(&self) -> usize {
        self.los.nb_pixels()
    }

    pub fn date(&self, line: f64) -> Epoch {
        self.datation.date(line)
    }

    pub fn line(&self, date: Epoch) -> f64 {
        self.datation.line(date)
    }

    pub fn rate(&self, line: f64) -> f64 {
        self.datation.rate(line)
    }

    pub fn los(&self, date: Epoch, pixel: usize) -> Vector3<f64> {
        self.los.los(date, pixel)
    }

    /// Mean plane of the lines of sight, computed by singular value
    /// decomposition at the line 0 date and cached until a calibration
    /// parameter changes.
    pub fn mean_plane(&self) -> MeanPlane {
        let version = self.los.version();
        let mut cached = self.mean_plane.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if let Some((v, plane)) = *cached {
            if v == version {
                return plane;
            }
        }
        let plane = self.compute_mean_plane();
        *cached = Some((version, plane));
        plane
    }

    pub fn mean_plane_normal(&self) -> Unit<Vector3<f64>> {
        self.mean_plane().normal
    }

    pub fn mean_plane_reference_point(&self) -> Vector3<f64> {
        self.mean_plane().reference_point
    }

    fn compute_mean_plane(&self) -> MeanPlane {
        let date = self.date(0.0);
        let n = self.nb_pixels();
        let points: Vec<Vector3<f64>> = (0..n).map(|i| self.position + self.los(date, i)).collect();
        let centroid = points.iter().fold(Vector3::zeros(), |acc, p| acc + p) / n as f64;

        let mut deviations = DMatrix::<f64>::zeros(3, n);
        for (k, p) in points.iter().enumerate() {
            deviations.set_column(k, &(p - centroid));
        }

        // the left singular vector of the smallest singular value is the
        // normal of the best-fit plane
        let svd = SVD::new(deviations, true, false);
        let u = svd.u.expect("singular vectors were requested");
        let mut normal = Vector3::new(u[(0, 2)], u[(1, 2)], u[(2, 2)]);

        // canonical orientation, so downstream line bracketing is monotone
        let reference = if normal.x.abs() > 1.0e-12 {
            normal.x
        } else if normal.y.abs() > 1.0e-12 {
            normal.y
        } else {
            normal.z
        };
        if reference < 0.0 {
            normal = -normal;
        }

        MeanPlane {
            reference_date: date,
            reference_point: centroid,
            normal: Unit::new_normalize(normal),
        }
    }
}

impl std::fmt::Debug for LineSensor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LineSensor")
            .field("name", &self.name)
            .field("position", &self.position)
            .field("nb_pixels", &self.nb_pixels())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::UnitQuaternion;

    use super::*;

    fn t0() -> Epoch {
        Epoch::from_gpst_seconds(1.1e9)
    }

    /// Fan of 2001 directions in the plane of normal +X, spread over
    /// +/- 0.17 rad around +Z.
    fn perfect_sensor() -> LineSensor {
        let directions = (0..2001)
            .map(|i| {
                let angle = -0.17 + 0.34 * i as f64 / 2000.0;
                UnitQuaternion::from_axis_angle(&Vector3::x_axis(), angle) * Vector3::z()
            })
            .collect();
        LineSensor::new(
            "perfect line",
            Vector3::new(1.5, 0.0, 0.0),
            Box::new(LinearLineDatation::new(t0(), 0.0, 1.0 / 1.5e-3)),
            Box::new(FixedLos::new(directions)),
        )
    }

    #[test]
    fn perfect_line_sensor_geometry() {
        let sensor = perfect_sensor();

        assert_eq!(sensor.name(), "perfect line");
        assert_eq!(sensor.nb_pixels(), 2001);
        assert_eq!(sensor.date(0.0), t0());
        assert_abs_diff_eq!((sensor.position() - Vector3::new(1.5, 0.0, 0.0)).norm(), 0.0, epsilon = 1e-15);

        let plane = sensor.mean_plane();
        // all fan points lie in the x = 1.5 plane
        assert_abs_diff_eq!(plane.reference_point.x, 1.5, epsilon = 1e-15);
        let angle = plane.normal.into_inner().cross(&Vector3::x()).norm().asin();
        assert_abs_diff_eq!(angle, 0.0, epsilon = 1e-15);
    }

    #[test]
    fn linear_datation_round_trip() {
        let datation = LinearLineDatation::new(t0(), 100.0, 1.0 / 1.5e-3);
        let date = datation.date(250.0);
        assert_abs_diff_eq!((date - t0()).to_seconds(), 150.0 * 1.5e-3, epsilon = 1e-12);
        assert_abs_diff_eq!(datation.line(date), 250.0, epsilon = 1e-9);
        assert_abs_diff_eq!(datation.rate(250.0), 1.0 / 1.5e-3, epsilon = 1e-12);
    }

    #[test]
    fn mean_plane_is_cached() {
        let sensor = perfect_sensor();
        let p1 = sensor.mean_plane();
        let p2 = sensor.mean_plane();
        assert_eq!(p1.reference_point, p2.reference_point);
        assert_eq!(p1.normal, p2.normal);
    }
}
