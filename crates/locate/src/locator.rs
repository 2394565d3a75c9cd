use std::collections::HashMap;
use std::f64::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex, PoisonError};

use hifitime::{Duration, Epoch};
use nalgebra::Vector3;

use geom::{Ellipsoid, GeodeticPoint};
use orbit::TrajectoryInterpolator;
use orbit::corrections::{SPEED_OF_LIGHT, aberration_corrected_los, light_time_delay};

use crate::algorithm::{IntersectionAlgorithm, ground_or_escape};
use crate::dump;
use crate::meanplane::SensorMeanPlaneCrossing;
use crate::pixelcrossing::locate_pixel;
use crate::refraction::AtmosphericRefraction;
use crate::sensor::{LineSensor, SensorPixel};
use crate::{Error, Result};

/// Immutable geolocation configuration: ellipsoid, resampled trajectory,
/// intersection algorithm and named sensors.
///
/// Once built, a locator is read-only and can be shared freely between
/// threads; the only mutable state underneath is the tile cache, which
/// serializes itself.
pub struct Locator {
    pub(crate) ellipsoid: Ellipsoid,
    pub(crate) interpolator: TrajectoryInterpolator,
    pub(crate) algorithm: Box<dyn IntersectionAlgorithm>,
    pub(crate) sensors: HashMap<String, Arc<LineSensor>>,
    pub(crate) light_time_correction: bool,
    pub(crate) aberration_of_light_correction: bool,
    pub(crate) refraction: Option<Box<dyn AtmosphericRefraction>>,
    /// Last crossing line found per sensor, seeding the next search.
    pub(crate) crossing_seeds: Mutex<HashMap<String, f64>>,
}

impl Locator {
    pub fn ellipsoid(&self) -> &Ellipsoid {
        &self.ellipsoid
    }

    pub fn interpolator(&self) -> &TrajectoryInterpolator {
        &self.interpolator
    }

    pub fn algorithm(&self) -> &dyn IntersectionAlgorithm {
        self.algorithm.as_ref()
    }

    pub fn is_light_time_corrected(&self) -> bool {
        self.light_time_correction
    }

    pub fn is_aberration_of_light_corrected(&self) -> bool {
        self.aberration_of_light_correction
    }

    pub fn sensor(&self, name: &str) -> Result<&Arc<LineSensor>> {
        self.sensors.get(name).ok_or_else(|| Error::UnknownSensor(name.into()))
    }

    pub fn sensor_names(&self) -> impl Iterator<Item = &str> {
        self.sensors.keys().map(String::as_str)
    }

    /// Terrain elevation as seen by the intersection algorithm.
    pub fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64> {
        self.algorithm.elevation_at(latitude, longitude)
    }

    /// Geodetic points observed by every pixel of line `line`.
    pub fn direct_location_line(&self, sensor_name: &str, line: f64) -> Result<Vec<GeodeticPoint>> {
        let sensor = Arc::clone(self.sensor(sensor_name)?);
        let date = sensor.date(line);
        let position = sensor.position();
        (0..sensor.nb_pixels())
            .map(|pixel| self.direct_location(date, &position, &sensor.los(date, pixel)))
            .collect()
    }

    /// Geodetic point observed by one pixel.
    pub fn direct_location_pixel(&self, sensor_name: &str, line: f64, pixel: usize) -> Result<GeodeticPoint> {
        let sensor = self.sensor(sensor_name)?;
        let date = sensor.date(line);
        self.direct_location(date, &sensor.position(), &sensor.los(date, pixel))
    }

    /// Geodetic point observed along `los` from `position`, both expressed
    /// in the spacecraft frame at `date`.
    pub fn direct_location(&self, date: Epoch, position: &Vector3<f64>, los: &Vector3<f64>) -> Result<GeodeticPoint> {
        dump::dump_ellipsoid(&self.ellipsoid);
        dump::dump_algorithm(self.algorithm.id());
        dump::dump_span(&self.interpolator);
        dump::dump_direct_location(
            date,
            position,
            los,
            self.light_time_correction,
            self.aberration_of_light_correction,
            self.refraction.is_some(),
        );

        let sc_to_inertial = self.interpolator.sc_to_inertial(date)?;
        let p_inert = sc_to_inertial.apply_to_position(position);
        let mut l_inert = sc_to_inertial.apply_to_vector(los);

        if self.aberration_of_light_correction {
            l_inert = aberration_corrected_los(&l_inert, &sc_to_inertial.velocity);
        }

        let (p_body, l_body) = if self.light_time_correction {
            // estimate the travel time from the zero-delay ground point,
            // then use the body orientation at emission time
            let instantaneous = self.interpolator.inertial_to_body(date)?;
            let p0 = instantaneous.apply_to_position(&p_inert);
            let l0 = instantaneous.apply_to_vector(&l_inert);
            let g0 = ground_or_escape(self.ellipsoid.point_on_ground(&p0, &l0, 0.0))?;
            let g0_inert = instantaneous
                .inverse()
                .apply_to_position(&self.ellipsoid.cartesian(&GeodeticPoint::from(g0)));
            let delay = light_time_delay(&g0_inert, &p_inert);
            let shifted = self.interpolator.inertial_to_body(date - Duration::from_seconds(delay))?;
            (shifted.apply_to_position(&p_inert), shifted.apply_to_vector(&l_inert))
        } else {
            let inertial_to_body = self.interpolator.inertial_to_body(date)?;
            (
                inertial_to_body.apply_to_position(&p_inert),
                inertial_to_body.apply_to_vector(&l_inert),
            )
        };

        let raw = self.algorithm.intersection(&self.ellipsoid, &p_body, &l_body)?;
        let refined = match &self.refraction {
            Some(model) => model.apply_correction(&p_body, &l_body, &raw, self.algorithm.as_ref(), &self.ellipsoid)?,
            None => self.algorithm.refine_intersection(&self.ellipsoid, &p_body, &l_body, &raw)?,
        };

        let result = GeodeticPoint::from(refined);
        dump::dump_direct_location_result(&result);
        Ok(result)
    }

    /// Sensor coordinates observing the ground point, if the point is inside
    /// the field of view swept between `min_line` and `max_line`.
    ///
    /// A point outside the field of view yields `Ok(None)`, never an error.
    pub fn inverse_location(
        &self,
        sensor_name: &str,
        ground: &GeodeticPoint,
        min_line: f64,
        max_line: f64,
    ) -> Result<Option<SensorPixel>> {
        if !(min_line < max_line) {
            return Err(Error::InvalidRangeForLines { min_line, max_line });
        }
        let sensor = Arc::clone(self.sensor(sensor_name)?);

        dump::dump_ellipsoid(&self.ellipsoid);
        dump::dump_algorithm(self.algorithm.id());
        dump::dump_span(&self.interpolator);
        dump::dump_sensor(&sensor, min_line, max_line);
        dump::dump_inverse_location(
            sensor_name,
            ground,
            min_line,
            max_line,
            self.light_time_correction,
            self.aberration_of_light_correction,
            self.refraction.is_some(),
        );

        let result = match &self.refraction {
            None => self.inverse_location_raw(&sensor, ground, min_line, max_line)?,
            Some(_) => {
                // refraction shifts the ground track slightly; solve the
                // straight-ray problem against a displaced target
                let raw = self.inverse_location_raw(&sensor, ground, min_line, max_line)?;
                match raw {
                    None => None,
                    Some(pixel) => {
                        let corrected = self.refraction_corrected_inverse(&sensor, ground, &pixel)?;
                        if corrected.line < min_line || corrected.line > max_line {
                            return Err(Error::SensorPixelNotFoundInRangeLines { min_line, max_line });
                        }
                        if corrected.pixel < 0.0 || corrected.pixel > sensor.nb_pixels() as f64 - 1.0 {
                            return Err(Error::SensorPixelNotFoundInPixelsLine { line: corrected.line });
                        }
                        Some(corrected)
                    }
                }
            }
        };

        dump::dump_inverse_location_result(result);
        Ok(result)
    }

    /// Date at which the sensor mean plane sweeps through the ground point.
    pub fn date_location(
        &self,
        sensor_name: &str,
        ground: &GeodeticPoint,
        min_line: f64,
        max_line: f64,
    ) -> Result<Option<Epoch>> {
        if !(min_line < max_line) {
            return Err(Error::InvalidRangeForLines { min_line, max_line });
        }
        let sensor = self.sensor(sensor_name)?;
        let target_body = self.ellipsoid.cartesian(ground);
        let crossing = SensorMeanPlaneCrossing::new(self, sensor, min_line, max_line).find(&target_body)?;
        Ok(crossing.map(|c| c.date))
    }

    fn inverse_location_raw(
        &self,
        sensor: &LineSensor,
        ground: &GeodeticPoint,
        min_line: f64,
        max_line: f64,
    ) -> Result<Option<SensorPixel>> {
        let target_body = self.ellipsoid.cartesian(ground);

        let seed = self
            .crossing_seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(sensor.name())
            .copied();
        let mut finder = SensorMeanPlaneCrossing::new(self, sensor, min_line, max_line);
        if let Some(seed) = seed {
            finder = finder.with_start(seed);
        }
        let crossing = finder.find(&target_body)?;
        let Some(crossing) = crossing else {
            return Ok(None);
        };
        self.crossing_seeds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(sensor.name().to_string(), crossing.line);

        let plane_normal = sensor.mean_plane().normal;
        let Some(coarse_pixel) = locate_pixel(sensor, &plane_normal, &crossing) else {
            return Ok(None);
        };

        // fix the line: the mean plane is only a least-squares fit, so bring
        // the target into the exact plane of the two neighboring pixels
        let nb_pixels = sensor.nb_pixels();
        let low = (coarse_pixel.floor() as i32).clamp(0, nb_pixels as i32 - 2) as usize;
        let low_los = sensor.los(crossing.date, low);
        let high_los = sensor.los(crossing.date, low + 1);
        let local_z = low_los.cross(&high_los).normalize();

        let dot = crossing.direction.dot(&local_z).clamp(-1.0, 1.0);
        let beta = dot.acos();
        let s = crossing.direction_derivative.dot(&local_z);
        let beta_derivative = -s / (1.0 - dot * dot).sqrt();
        let delta_line = if beta_derivative.abs() > 1.0e-18 {
            (FRAC_PI_2 - beta) / beta_derivative
        } else {
            0.0
        };
        let fixed_line = crossing.line + delta_line;
        let fixed_direction = (crossing.direction + crossing.direction_derivative * delta_line).normalize();

        // fix the pixel along the refined focal line
        let fixed_date = sensor.date(fixed_line);
        let fixed_x = sensor.los(fixed_date, low);
        let fixed_next = sensor.los(fixed_date, low + 1);
        let fixed_z = fixed_x.cross(&fixed_next);
        let fixed_y = fixed_z.cross(&fixed_x).normalize();
        let fixed_x = fixed_x.normalize();

        let pixel_width = fixed_next.dot(&fixed_y).atan2(fixed_next.dot(&fixed_x));
        let alpha = fixed_direction.dot(&fixed_y).atan2(fixed_direction.dot(&fixed_x));
        let fixed_pixel = low as f64 + alpha / pixel_width;

        if fixed_line < min_line
            || fixed_line > max_line
            || fixed_pixel < 0.0
            || fixed_pixel > nb_pixels as f64 - 1.0
        {
            return Ok(None);
        }
        Ok(Some(SensorPixel {
            line: fixed_line,
            pixel: fixed_pixel,
        }))
    }

    // one fixed-point iteration against the refraction ground displacement
    fn refraction_corrected_inverse(
        &self,
        sensor: &LineSensor,
        ground: &GeodeticPoint,
        raw_pixel: &SensorPixel,
    ) -> Result<SensorPixel> {
        let pixel_index = (raw_pixel.pixel.round() as i32).clamp(0, sensor.nb_pixels() as i32 - 1) as usize;
        let date = sensor.date(raw_pixel.line);
        let position = sensor.position();
        let los = sensor.los(date, pixel_index);

        let refracted = self.direct_location(date, &position, &los)?;
        let straight = {
            // same geometry, refraction bypassed
            let sc_to_inertial = self.interpolator.sc_to_inertial(date)?;
            let p_inert = sc_to_inertial.apply_to_position(&position);
            let mut l_inert = sc_to_inertial.apply_to_vector(&los);
            if self.aberration_of_light_correction {
                l_inert = aberration_corrected_los(&l_inert, &sc_to_inertial.velocity);
            }
            let inertial_to_body = self.interpolator.inertial_to_body(date)?;
            let p_body = inertial_to_body.apply_to_position(&p_inert);
            let l_body = inertial_to_body.apply_to_vector(&l_inert);
            let raw = self.algorithm.intersection(&self.ellipsoid, &p_body, &l_body)?;
            GeodeticPoint::from(self.algorithm.refine_intersection(&self.ellipsoid, &p_body, &l_body, &raw)?)
        };

        let displacement = self.ellipsoid.cartesian(&refracted) - self.ellipsoid.cartesian(&straight);
        let displaced_target = self.ellipsoid.cartesian(ground) - displacement;
        let displaced_gp = self.ellipsoid.geodetic(&displaced_target)?;

        // generous bracket: the escape checks are done by the caller
        let margin = 50.0;
        let corrected = self.inverse_location_raw(
            sensor,
            &displaced_gp,
            raw_pixel.line - margin,
            raw_pixel.line + margin,
        )?;
        Ok(corrected.unwrap_or(*raw_pixel))
    }

    /// Direction from the sensor to the target in the spacecraft frame at
    /// `line`, with its derivative with respect to the line number; applies
    /// the same light-time and aberration corrections as direct location.
    pub(crate) fn target_direction(
        &self,
        sensor: &LineSensor,
        target_body: &Vector3<f64>,
        line: f64,
    ) -> Result<(Vector3<f64>, Vector3<f64>)> {
        let delta = 1.0;
        let d0 = self.target_direction_at(sensor, target_body, line)?;
        let d_plus = self.target_direction_at(sensor, target_body, line + delta)?;
        let d_minus = self.target_direction_at(sensor, target_body, line - delta)?;
        Ok((d0, (d_plus - d_minus) / (2.0 * delta)))
    }

    pub(crate) fn target_direction_at(
        &self,
        sensor: &LineSensor,
        target_body: &Vector3<f64>,
        line: f64,
    ) -> Result<Vector3<f64>> {
        let date = sensor.date(line);
        let sc_to_inertial = self.interpolator.sc_to_inertial(date)?;
        let sensor_inert = sc_to_inertial.apply_to_position(&sensor.position());

        let target_inert = if self.light_time_correction {
            // the photons left the target before the reception date
            let instantaneous = self.interpolator.inertial_to_body(date)?;
            let approx = instantaneous.inverse().apply_to_position(target_body);
            let delay = light_time_delay(&approx, &sensor_inert);
            self.interpolator
                .inertial_to_body(date - Duration::from_seconds(delay))?
                .inverse()
                .apply_to_position(target_body)
        } else {
            self.interpolator.inertial_to_body(date)?.inverse().apply_to_position(target_body)
        };

        let mut direction = (target_inert - sensor_inert).normalize();
        if self.aberration_of_light_correction {
            // apparent direction seen by the moving sensor
            direction = (direction * SPEED_OF_LIGHT + sc_to_inertial.velocity).normalize();
        }
        Ok(sc_to_inertial.rotation.inverse() * direction)
    }
}
