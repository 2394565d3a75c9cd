use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use hifitime::Epoch;
use nalgebra::{Unit, UnitQuaternion, Vector3};

use crate::sensor::TimeDependentLos;

/// Stable index of a calibration parameter inside a [`ParameterArena`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParameterId(usize);

/// Table of named calibration parameters shared between a sensor and its
/// estimation drivers.
///
/// Values can be rewritten after construction; every write bumps a version
/// counter that dependent caches (derived lines of sight, mean planes) use
/// for invalidation.
#[derive(Debug, Default)]
pub struct ParameterArena {
    names: Vec<String>,
    values: Mutex<Vec<f64>>,
    version: AtomicU64,
}

impl ParameterArena {
    pub fn new() -> Self {
        ParameterArena::default()
    }

    pub fn declare(&mut self, name: impl Into<String>, initial: f64) -> ParameterId {
        self.names.push(name.into());
        let values = self.values.get_mut().unwrap_or_else(PoisonError::into_inner);
        values.push(initial);
        ParameterId(values.len() - 1)
    }

    pub fn name(&self, id: ParameterId) -> &str {
        &self.names[id.0]
    }

    pub fn value(&self, id: ParameterId) -> f64 {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)[id.0]
    }

    pub fn set_value(&self, id: ParameterId, value: f64) {
        self.values.lock().unwrap_or_else(PoisonError::into_inner)[id.0] = value;
        self.version.fetch_add(1, Ordering::Release);
    }

    pub fn version(&self) -> u64 {
        self.version.load(Ordering::Acquire)
    }
}

enum LosTransform {
    /// Rotation by a constant angle.
    FixedRotation { axis: Unit<Vector3<f64>>, angle: f64 },
    /// Rotation whose angle is driven by a calibration parameter.
    ParametricRotation { axis: Unit<Vector3<f64>>, angle: ParameterId },
    /// Rotation whose angle drifts with time, as a polynomial in the
    /// seconds elapsed since a reference date.
    PolynomialRotation {
        axis: Unit<Vector3<f64>>,
        reference: Epoch,
        coefficients: Vec<f64>,
    },
}

/// Builds a [`TimeDependentLos`] from raw directions and a chain of
/// elementary transforms applied in order.
pub struct LosBuilder {
    raw: Vec<Vector3<f64>>,
    transforms: Vec<LosTransform>,
}

impl LosBuilder {
    pub fn new(raw: Vec<Vector3<f64>>) -> Self {
        LosBuilder {
            raw: raw.into_iter().map(|d| d.normalize()).collect(),
            transforms: Vec::new(),
        }
    }

    pub fn rotate(mut self, axis: Unit<Vector3<f64>>, angle: f64) -> Self {
        self.transforms.push(LosTransform::FixedRotation { axis, angle });
        self
    }

    pub fn rotate_by_parameter(mut self, axis: Unit<Vector3<f64>>, angle: ParameterId) -> Self {
        self.transforms.push(LosTransform::ParametricRotation { axis, angle });
        self
    }

    /// Slow calibration drift: the rotation angle is a polynomial in the
    /// seconds elapsed since `reference`, lowest degree first.
    pub fn rotate_over_time(mut self, axis: Unit<Vector3<f64>>, reference: Epoch, coefficients: Vec<f64>) -> Self {
        self.transforms.push(LosTransform::PolynomialRotation {
            axis,
            reference,
            coefficients,
        });
        self
    }

    /// Freezes the chain; `arena` is required when parametric transforms
    /// are present.
    pub fn build(self, arena: Option<Arc<ParameterArena>>) -> BuiltLos {
        assert!(
            arena.is_some()
                || !self
                    .transforms
                    .iter()
                    .any(|t| matches!(t, LosTransform::ParametricRotation { .. })),
            "parametric transforms need a parameter arena"
        );
        BuiltLos {
            raw: self.raw,
            transforms: self.transforms,
            arena,
        }
    }
}

/// Line-of-sight provider produced by [`LosBuilder`].
pub struct BuiltLos {
    raw: Vec<Vector3<f64>>,
    transforms: Vec<LosTransform>,
    arena: Option<Arc<ParameterArena>>,
}

impl TimeDependentLos for BuiltLos {
    fn nb_pixels(&self) -> usize {
        self.raw.len()
    }

    fn los(&self, date: Epoch, pixel: usize) -> Vector3<f64> {
        let mut v = self.raw[pixel];
        for transform in &self.transforms {
            let rotation = match transform {
                LosTransform::FixedRotation { axis, angle } => UnitQuaternion::from_axis_angle(axis, *angle),
                LosTransform::ParametricRotation { axis, angle } => UnitQuaternion::from_axis_angle(
                    axis,
                    self.arena.as_ref().expect("checked at build time").value(*angle),
                ),
                LosTransform::PolynomialRotation {
                    axis,
                    reference,
                    coefficients,
                } => {
                    let dt = (date - *reference).to_seconds();
                    let angle = coefficients.iter().rev().fold(0.0, |acc, c| acc * dt + c);
                    UnitQuaternion::from_axis_angle(axis, angle)
                }
            };
            v = rotation * v;
        }
        v
    }

    fn version(&self) -> u64 {
        self.arena.as_ref().map_or(0, |a| a.version())
    }
}
