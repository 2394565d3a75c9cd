use hifitime::{Duration, Epoch};
use log::debug;

use geom::FrameId;

use crate::interpolation::{RotationSample, VectorSample, hermite, interpolate_rotation};
use crate::{
    AngularDerivativesFilter, CartesianDerivativesFilter, Error, InertialToBody, Result, Trajectory, Transform,
};

struct GridEntry {
    epoch: Epoch,
    sc_to_inertial: Transform,
    inertial_to_body: Transform,
}

/// Time-indexed cache of the frame composition spacecraft -> inertial ->
/// body, resampled on a regular grid.
///
/// The grid step must stay below the fastest significant frequency of the
/// trajectory and attitude motion, so that the interpolation error at lookup
/// time remains below the tolerance needed by intersection refinement.
pub struct TrajectoryInterpolator {
    inertial_frame: FrameId,
    body_frame: FrameId,
    t_min: Epoch,
    t_max: Epoch,
    t_step: f64,
    overshoot_tolerance: f64,
    cartesian_filter: CartesianDerivativesFilter,
    angular_filter: AngularDerivativesFilter,
    neighbors: usize,
    grid: Vec<GridEntry>,
}

impl TrajectoryInterpolator {
    /// Resamples `trajectory` and the body rotation `provider` every
    /// `t_step` seconds over `[t_min, t_max]`.
    ///
    /// Queries may overshoot the span by up to `overshoot_tolerance`
    /// seconds; the trajectory samples themselves must cover the span.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        trajectory: &Trajectory,
        provider: &dyn InertialToBody,
        t_min: Epoch,
        t_max: Epoch,
        t_step: f64,
        overshoot_tolerance: f64,
        cartesian_filter: CartesianDerivativesFilter,
        angular_filter: AngularDerivativesFilter,
        interpolation_neighbors: usize,
    ) -> Result<Self> {
        if !(t_step.is_finite() && t_step > 0.0) {
            return Err(Error::InvalidStep { step: t_step });
        }
        if provider.inertial_frame() != trajectory.inertial_frame() {
            return Err(Error::FrameMismatch {
                expected: trajectory.inertial_frame(),
                actual: provider.inertial_frame(),
            });
        }
        for &requested in &[t_min, t_max] {
            if requested < trajectory.t_min() || requested > trajectory.t_max() {
                return Err(Error::OutOfTimeRange {
                    requested,
                    min: trajectory.t_min(),
                    max: trajectory.t_max(),
                });
            }
        }

        let neighbors = Self::even_neighbors(interpolation_neighbors);
        let span = (t_max - t_min).to_seconds();
        let steps = (span / t_step).floor() as usize;
        let mut epochs: Vec<Epoch> = (0..=steps)
            .map(|k| t_min + Duration::from_seconds(k as f64 * t_step))
            .collect();
        if (t_max - epochs[epochs.len() - 1]).to_seconds() > 1.0e-9 {
            epochs.push(t_max);
        }
        debug!(
            "resampling {} -> {} every {} s: {} grid entries",
            t_min,
            t_max,
            t_step,
            epochs.len()
        );

        let grid = epochs
            .into_iter()
            .map(|epoch| GridEntry {
                epoch,
                sc_to_inertial: Self::raw_sc_to_inertial(trajectory, epoch, cartesian_filter, angular_filter, neighbors),
                inertial_to_body: provider.transform_at(epoch),
            })
            .collect();

        Ok(TrajectoryInterpolator {
            inertial_frame: trajectory.inertial_frame(),
            body_frame: provider.body_frame(),
            t_min,
            t_max,
            t_step,
            overshoot_tolerance,
            cartesian_filter,
            angular_filter,
            neighbors,
            grid,
        })
    }

    /// Rebuilds an interpolator from an already resampled transform table,
    /// given as `(epoch, sc_to_inertial, inertial_to_body)` entries.
    #[allow(clippy::too_many_arguments)]
    pub fn from_transforms(
        inertial_frame: FrameId,
        body_frame: FrameId,
        t_step: f64,
        overshoot_tolerance: f64,
        cartesian_filter: CartesianDerivativesFilter,
        angular_filter: AngularDerivativesFilter,
        interpolation_neighbors: usize,
        entries: Vec<(Epoch, Transform, Transform)>,
    ) -> Result<Self> {
        if entries.len() < 2 {
            return Err(Error::NotEnoughSamples {
                needed: 2,
                available: entries.len(),
            });
        }
        if !(t_step.is_finite() && t_step > 0.0) {
            return Err(Error::InvalidStep { step: t_step });
        }
        let t_min = entries[0].0;
        let t_max = entries[entries.len() - 1].0;
        Ok(TrajectoryInterpolator {
            inertial_frame,
            body_frame,
            t_min,
            t_max,
            t_step,
            overshoot_tolerance,
            cartesian_filter,
            angular_filter,
            neighbors: Self::even_neighbors(interpolation_neighbors),
            grid: entries
                .into_iter()
                .map(|(epoch, sc_to_inertial, inertial_to_body)| GridEntry {
                    epoch,
                    sc_to_inertial,
                    inertial_to_body,
                })
                .collect(),
        })
    }

    fn even_neighbors(n: usize) -> usize {
        2 * n.max(1).div_ceil(2)
    }

    pub fn inertial_frame(&self) -> FrameId {
        self.inertial_frame
    }

    pub fn body_frame(&self) -> FrameId {
        self.body_frame
    }

    pub fn t_min(&self) -> Epoch {
        self.t_min
    }

    pub fn t_max(&self) -> Epoch {
        self.t_max
    }

    pub fn t_step(&self) -> f64 {
        self.t_step
    }

    pub fn overshoot_tolerance(&self) -> f64 {
        self.overshoot_tolerance
    }

    /// Grid entries, for persistence.
    pub fn transforms(&self) -> impl Iterator<Item = (Epoch, &Transform, &Transform)> {
        self.grid.iter().map(|e| (e.epoch, &e.sc_to_inertial, &e.inertial_to_body))
    }

    /// Transform from the spacecraft frame to the inertial frame at `t`.
    pub fn sc_to_inertial(&self, t: Epoch) -> Result<Transform> {
        let window = self.window(t)?;
        Ok(Self::interpolate_transforms(
            window,
            t,
            self.cartesian_filter,
            self.angular_filter,
            |e| &e.sc_to_inertial,
        ))
    }

    /// Transform from the inertial frame to the rotating body frame at `t`.
    pub fn inertial_to_body(&self, t: Epoch) -> Result<Transform> {
        let window = self.window(t)?;
        Ok(Self::interpolate_transforms(
            window,
            t,
            self.cartesian_filter,
            self.angular_filter,
            |e| &e.inertial_to_body,
        ))
    }

    /// Composed transform from the spacecraft frame to the body frame at
    /// `t`.
    pub fn sc_to_body(&self, t: Epoch) -> Result<Transform> {
        let window = self.window(t)?;
        let sc_to_inertial =
            Self::interpolate_transforms(window, t, self.cartesian_filter, self.angular_filter, |e| &e.sc_to_inertial);
        let inertial_to_body =
            Self::interpolate_transforms(window, t, self.cartesian_filter, self.angular_filter, |e| &e.inertial_to_body);
        Ok(Transform::compose(&sc_to_inertial, &inertial_to_body))
    }

    fn window(&self, t: Epoch) -> Result<&[GridEntry]> {
        let tolerance = Duration::from_seconds(self.overshoot_tolerance);
        if t < self.t_min - tolerance || t > self.t_max + tolerance {
            return Err(Error::OutOfTimeRange {
                requested: t,
                min: self.t_min,
                max: self.t_max,
            });
        }
        let n = self.neighbors.min(self.grid.len());
        let after = self.grid.partition_point(|e| e.epoch <= t);
        let start = after.saturating_sub(n / 2).min(self.grid.len() - n);
        Ok(&self.grid[start..start + n])
    }

    fn interpolate_transforms(
        window: &[GridEntry],
        t: Epoch,
        cartesian_filter: CartesianDerivativesFilter,
        angular_filter: AngularDerivativesFilter,
        select: impl Fn(&GridEntry) -> &Transform,
    ) -> Transform {
        let t0 = window[0].epoch;
        let at = (t - t0).to_seconds();

        let cartesian: Vec<VectorSample> = window
            .iter()
            .map(|e| {
                let tr = select(e);
                VectorSample {
                    t: (e.epoch - t0).to_seconds(),
                    value: tr.translation,
                    first: cartesian_filter.uses_velocity().then_some(tr.velocity),
                    second: cartesian_filter.uses_acceleration().then_some(tr.acceleration),
                }
            })
            .collect();
        let (translation, velocity) = hermite(&cartesian, at);

        let angular: Vec<RotationSample> = window
            .iter()
            .map(|e| {
                let tr = select(e);
                RotationSample {
                    t: (e.epoch - t0).to_seconds(),
                    rotation: tr.rotation,
                    rate: angular_filter.uses_rate().then_some(tr.rotation_rate),
                    rate_derivative: None,
                }
            })
            .collect();
        let (rotation, rotation_rate) = interpolate_rotation(&angular, at);

        Transform::new(translation, velocity, rotation, rotation_rate)
    }

    // spacecraft -> inertial transform straight from the raw samples
    fn raw_sc_to_inertial(
        trajectory: &Trajectory,
        epoch: Epoch,
        cartesian_filter: CartesianDerivativesFilter,
        angular_filter: AngularDerivativesFilter,
        neighbors: usize,
    ) -> Transform {
        let pv = trajectory.pv_samples();
        let n = neighbors.min(pv.len());
        let after = pv.partition_point(|s| s.epoch <= epoch);
        let start = after.saturating_sub(n / 2).min(pv.len() - n);
        let window = &pv[start..start + n];
        let t0 = window[0].epoch;
        let samples: Vec<VectorSample> = window
            .iter()
            .map(|s| VectorSample {
                t: (s.epoch - t0).to_seconds(),
                value: s.position,
                first: cartesian_filter.uses_velocity().then_some(s.velocity),
                second: if cartesian_filter.uses_acceleration() {
                    s.acceleration
                } else {
                    None
                },
            })
            .collect();
        let (position, velocity) = hermite(&samples, (epoch - t0).to_seconds());

        let attitude = trajectory.attitude_samples();
        let n = neighbors.min(attitude.len());
        let after = attitude.partition_point(|s| s.epoch <= epoch);
        let start = after.saturating_sub(n / 2).min(attitude.len() - n);
        let window = &attitude[start..start + n];
        let t0 = window[0].epoch;
        let samples: Vec<RotationSample> = window
            .iter()
            .map(|s| RotationSample {
                t: (s.epoch - t0).to_seconds(),
                rotation: s.rotation,
                rate: if angular_filter.uses_rate() { s.rate } else { None },
                rate_derivative: if angular_filter.uses_rate_derivative() {
                    s.rate_derivative
                } else {
                    None
                },
            })
            .collect();
        let (q_attitude, rate) = interpolate_rotation(&samples, (epoch - t0).to_seconds());

        // the attitude maps inertial to spacecraft; the stored transform goes
        // the other way and its angular rate is expressed in the inertial
        // frame
        let sc_to_inertial = q_attitude.inverse();
        Transform::new(position, velocity, sc_to_inertial, sc_to_inertial * rate)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use nalgebra::{Unit, UnitQuaternion, Vector3};

    use crate::{AttitudeSample, PvSample, UniformlyRotatingBody};

    use super::*;

    const MU: f64 = 3.986004418e14;
    const RADIUS: f64 = 7.2e6;

    fn t0() -> Epoch {
        Epoch::from_gpst_seconds(1.2e9)
    }

    fn orbit_position(t: f64) -> Vector3<f64> {
        let omega = (MU / (RADIUS * RADIUS * RADIUS)).sqrt();
        let theta = omega * t;
        Vector3::new(RADIUS * theta.cos(), RADIUS * theta.sin(), 0.0)
    }

    fn orbit_velocity(t: f64) -> Vector3<f64> {
        let omega = (MU / (RADIUS * RADIUS * RADIUS)).sqrt();
        let theta = omega * t;
        Vector3::new(-RADIUS * omega * theta.sin(), RADIUS * omega * theta.cos(), 0.0)
    }

    fn spin_attitude(t: f64) -> UnitQuaternion<f64> {
        UnitQuaternion::from_axis_angle(&Unit::new_normalize(Vector3::new(0.0, 0.0, 1.0)), 1.0e-3 * t)
    }

    fn trajectory() -> Trajectory {
        let pv = (0..=30)
            .map(|k| {
                let t = 10.0 * k as f64;
                PvSample::new(t0() + Duration::from_seconds(t), orbit_position(t), orbit_velocity(t))
            })
            .collect();
        let attitude = (0..=30)
            .map(|k| {
                let t = 10.0 * k as f64;
                AttitudeSample {
                    epoch: t0() + Duration::from_seconds(t),
                    rotation: spin_attitude(t),
                    rate: Some(Vector3::new(0.0, 0.0, 1.0e-3)),
                    rate_derivative: None,
                }
            })
            .collect();
        Trajectory::new(FrameId::GCRF, pv, attitude).unwrap()
    }

    fn interpolator() -> TrajectoryInterpolator {
        let body = UniformlyRotatingBody::earth(t0(), 0.3);
        TrajectoryInterpolator::new(
            &trajectory(),
            &body,
            t0() + Duration::from_seconds(20.0),
            t0() + Duration::from_seconds(280.0),
            2.5,
            1.0,
            CartesianDerivativesFilter::UsePv,
            AngularDerivativesFilter::UseRr,
            4,
        )
        .unwrap()
    }

    #[test]
    fn positions_are_recovered_between_grid_points() {
        let interp = interpolator();
        for &t in &[21.3, 77.7, 154.2, 279.9] {
            let transform = interp.sc_to_inertial(t0() + Duration::from_seconds(t)).unwrap();
            assert_abs_diff_eq!((transform.translation - orbit_position(t)).norm(), 0.0, epsilon = 1e-3);
            assert_abs_diff_eq!((transform.velocity - orbit_velocity(t)).norm(), 0.0, epsilon = 1e-4);
        }
    }

    #[test]
    fn attitude_is_recovered_between_grid_points() {
        let interp = interpolator();
        for &t in &[25.0, 100.1, 250.6] {
            let transform = interp.sc_to_inertial(t0() + Duration::from_seconds(t)).unwrap();
            // stored rotation is spacecraft -> inertial
            assert_abs_diff_eq!(
                transform.rotation.angle_to(&spin_attitude(t).inverse()),
                0.0,
                epsilon = 1e-9
            );
        }
    }

    #[test]
    fn composition_goes_through_the_rotating_body() {
        let interp = interpolator();
        let t = 120.0;
        let epoch = t0() + Duration::from_seconds(t);

        let sc_to_body = interp.sc_to_body(epoch).unwrap();
        let manual = Transform::compose(
            &interp.sc_to_inertial(epoch).unwrap(),
            &interp.inertial_to_body(epoch).unwrap(),
        );
        assert_abs_diff_eq!((sc_to_body.translation - manual.translation).norm(), 0.0, epsilon = 1e-9);
        assert_abs_diff_eq!(sc_to_body.rotation.angle_to(&manual.rotation), 0.0, epsilon = 1e-12);

        // spacecraft origin lands at its rotated inertial position
        let origin_body = sc_to_body.apply_to_position(&Vector3::zeros());
        let expected = interp.inertial_to_body(epoch).unwrap().apply_to_position(&orbit_position(t));
        assert_abs_diff_eq!((origin_body - expected).norm(), 0.0, epsilon = 1e-3);
    }

    #[test]
    fn queries_outside_the_span_fail() {
        let interp = interpolator();
        // within the overshoot tolerance
        assert!(interp.sc_to_inertial(t0() + Duration::from_seconds(19.5)).is_ok());
        // beyond it
        let too_early = t0() + Duration::from_seconds(10.0);
        assert!(matches!(
            interp.sc_to_inertial(too_early),
            Err(Error::OutOfTimeRange { .. })
        ));
        let too_late = t0() + Duration::from_seconds(300.0);
        assert!(matches!(interp.sc_to_body(too_late), Err(Error::OutOfTimeRange { .. })));
    }

    #[test]
    fn span_not_covered_by_samples_is_rejected() {
        let body = UniformlyRotatingBody::earth(t0(), 0.0);
        let result = TrajectoryInterpolator::new(
            &trajectory(),
            &body,
            t0() - Duration::from_seconds(50.0),
            t0() + Duration::from_seconds(100.0),
            2.5,
            1.0,
            CartesianDerivativesFilter::UsePv,
            AngularDerivativesFilter::UseRr,
            4,
        );
        assert!(matches!(result, Err(Error::OutOfTimeRange { .. })));
    }
}
