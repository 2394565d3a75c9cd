use hifitime::Epoch;
use log::debug;
use nalgebra::Vector3;

use crate::locator::Locator;
use crate::sensor::LineSensor;
use crate::Result;

/// Result of a mean-plane crossing search: the line at which the sensor
/// mean plane sweeps through the target, with the target direction in the
/// spacecraft frame and its derivative with respect to the line number.
pub(crate) struct CrossingResult {
    pub line: f64,
    pub date: Epoch,
    pub direction: Vector3<f64>,
    pub direction_derivative: Vector3<f64>,
}

const MAX_ITERATIONS: usize = 20;
const LINE_TOLERANCE: f64 = 1.0e-7;
/// Lines outside the search range by more than this margin are treated as
/// misses; the mean plane being a least-squares fit, the true crossing can
/// sit a few lines away from the plane crossing.
const SEARCH_MARGIN: f64 = 10.0;

/// Finds the line at which the mean plane of `sensor` contains the target.
///
/// The signed distance of the target direction to the mean plane is a
/// monotone function of the line over a sensor sweep; its zero is found by a
/// Newton iteration with finite-difference derivatives.
pub(crate) struct SensorMeanPlaneCrossing<'a> {
    locator: &'a Locator,
    sensor: &'a LineSensor,
    min_line: f64,
    max_line: f64,
    /// Start of the search; successive targets of the same pass cross close
    /// to each other, so the previous crossing makes a good seed.
    start_line: f64,
}

impl<'a> SensorMeanPlaneCrossing<'a> {
    pub fn new(locator: &'a Locator, sensor: &'a LineSensor, min_line: f64, max_line: f64) -> Self {
        SensorMeanPlaneCrossing {
            locator,
            sensor,
            min_line,
            max_line,
            start_line: 0.5 * (min_line + max_line),
        }
    }

    pub fn with_start(mut self, start_line: f64) -> Self {
        if start_line > self.min_line && start_line < self.max_line {
            self.start_line = start_line;
        }
        self
    }

    pub fn find(&self, target_body: &Vector3<f64>) -> Result<Option<CrossingResult>> {
        let normal = self.sensor.mean_plane().normal;
        let distance = |line: f64| -> Result<f64> {
            let direction = self.locator.target_direction_at(self.sensor, target_body, line)?;
            Ok(normal.dot(&direction))
        };

        let mut line = self.start_line;
        // half a line keeps the finite difference well inside the bracket
        let delta = 0.5;

        for _ in 0..MAX_ITERATIONS {
            let f = distance(line)?;
            let f_plus = distance(line + delta)?;
            let f_minus = distance(line - delta)?;
            let derivative = (f_plus - f_minus) / (2.0 * delta);
            if derivative == 0.0 {
                return Ok(None);
            }

            let new_line = line - f / derivative;
            if new_line < self.min_line - SEARCH_MARGIN || new_line > self.max_line + SEARCH_MARGIN {
                debug!("mean plane crossing left the line search range at {new_line}");
                return Ok(None);
            }
            let converged = (new_line - line).abs() < LINE_TOLERANCE;
            line = new_line;
            if converged {
                if line < self.min_line || line > self.max_line {
                    return Ok(None);
                }
                let (direction, derivative) = self.locator.target_direction(self.sensor, target_body, line)?;
                return Ok(Some(CrossingResult {
                    line,
                    date: self.sensor.date(line),
                    direction,
                    direction_derivative: derivative,
                }));
            }
        }
        Ok(None)
    }
}
