use nalgebra::{UnitQuaternion, Vector3};

/// Rigid transform between two frames, with first-order kinematics.
///
/// Mapping a point from frame A to frame B:
/// `x_B = rotation * x_A + translation`. The kinematic fields follow the
/// same orientation: `velocity` is the derivative of `translation`, and
/// `rotation_rate` is the angular velocity of frame A with respect to
/// frame B, expressed in B, so that a point with velocity `v_A` maps to
/// `rotation * v_A + velocity + rotation_rate x (rotation * x_A)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub translation: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Vector3<f64>,
    pub rotation: UnitQuaternion<f64>,
    pub rotation_rate: Vector3<f64>,
}

impl Transform {
    pub fn identity() -> Self {
        Transform {
            translation: Vector3::zeros(),
            velocity: Vector3::zeros(),
            acceleration: Vector3::zeros(),
            rotation: UnitQuaternion::identity(),
            rotation_rate: Vector3::zeros(),
        }
    }

    pub fn new(
        translation: Vector3<f64>,
        velocity: Vector3<f64>,
        rotation: UnitQuaternion<f64>,
        rotation_rate: Vector3<f64>,
    ) -> Self {
        Transform {
            translation,
            velocity,
            acceleration: Vector3::zeros(),
            rotation,
            rotation_rate,
        }
    }

    pub fn apply_to_position(&self, p: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * p + self.translation
    }

    /// Applies the rotation only, for direction vectors.
    pub fn apply_to_vector(&self, v: &Vector3<f64>) -> Vector3<f64> {
        self.rotation * v
    }

    pub fn apply_to_pv(&self, p: &Vector3<f64>, v: &Vector3<f64>) -> (Vector3<f64>, Vector3<f64>) {
        let rp = self.rotation * p;
        (
            rp + self.translation,
            self.rotation * v + self.velocity + self.rotation_rate.cross(&rp),
        )
    }

    /// Transform applying `first` then `second`.
    pub fn compose(first: &Transform, second: &Transform) -> Transform {
        let rotated_t1 = second.rotation * first.translation;
        Transform {
            translation: rotated_t1 + second.translation,
            velocity: second.rotation * first.velocity + second.velocity + second.rotation_rate.cross(&rotated_t1),
            acceleration: second.rotation * first.acceleration + second.acceleration,
            rotation: second.rotation * first.rotation,
            rotation_rate: second.rotation_rate + second.rotation * first.rotation_rate,
        }
    }

    pub fn inverse(&self) -> Transform {
        let inv_rotation = self.rotation.inverse();
        Transform {
            translation: -(inv_rotation * self.translation),
            velocity: inv_rotation * (self.rotation_rate.cross(&self.translation) - self.velocity),
            acceleration: -(inv_rotation * self.acceleration),
            rotation: inv_rotation,
            rotation_rate: -(inv_rotation * self.rotation_rate),
        }
    }
}
