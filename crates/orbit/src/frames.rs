use hifitime::Epoch;
use nalgebra::{Unit, UnitQuaternion, Vector3};

use geom::FrameId;

use crate::Transform;

/// IERS conventional rotation rate of the Earth, rad/s.
pub const EARTH_ROTATION_RATE: f64 = 7.292115146706979e-5;

/// Provider of the rotation from an inertial frame to the rotating body
/// frame.
///
/// The core treats frames as opaque tokens and never relies on process-wide
/// frame registries; hosts with a full reference frame chain implement this
/// trait, simple hosts can use [`UniformlyRotatingBody`].
pub trait InertialToBody: Send + Sync {
    fn inertial_frame(&self) -> FrameId;
    fn body_frame(&self) -> FrameId;
    /// Transform from the inertial frame to the body frame at `epoch`.
    fn transform_at(&self, epoch: Epoch) -> Transform;
}

/// Body frame rotating at a constant rate around a fixed inertial axis.
#[derive(Debug, Clone, Copy)]
pub struct UniformlyRotatingBody {
    inertial: FrameId,
    body: FrameId,
    axis: Unit<Vector3<f64>>,
    rate: f64,
    reference_epoch: Epoch,
    reference_angle: f64,
}

impl UniformlyRotatingBody {
    pub fn new(
        inertial: FrameId,
        body: FrameId,
        axis: Unit<Vector3<f64>>,
        rate: f64,
        reference_epoch: Epoch,
        reference_angle: f64,
    ) -> Self {
        UniformlyRotatingBody {
            inertial,
            body,
            axis,
            rate,
            reference_epoch,
            reference_angle,
        }
    }

    /// GCRF to ITRF modeled as a uniform rotation around +Z, with the prime
    /// meridian at `reference_angle` for `reference_epoch`.
    pub fn earth(reference_epoch: Epoch, reference_angle: f64) -> Self {
        UniformlyRotatingBody::new(
            FrameId::GCRF,
            FrameId::ITRF,
            Vector3::z_axis(),
            EARTH_ROTATION_RATE,
            reference_epoch,
            reference_angle,
        )
    }
}

impl InertialToBody for UniformlyRotatingBody {
    fn inertial_frame(&self) -> FrameId {
        self.inertial
    }

    fn body_frame(&self) -> FrameId {
        self.body
    }

    fn transform_at(&self, epoch: Epoch) -> Transform {
        let theta = self.reference_angle + self.rate * (epoch - self.reference_epoch).to_seconds();
        Transform::new(
            Vector3::zeros(),
            Vector3::zeros(),
            UnitQuaternion::from_axis_angle(&self.axis, -theta),
            self.axis.into_inner() * -self.rate,
        )
    }
}
