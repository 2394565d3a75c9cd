use hifitime::Epoch;
use nalgebra::{UnitQuaternion, Vector3};

use geom::FrameId;

use crate::{Error, Result};

/// Time-stamped position/velocity of the spacecraft in the inertial frame,
/// with an optional acceleration.
#[derive(Debug, Clone, Copy)]
pub struct PvSample {
    pub epoch: Epoch,
    pub position: Vector3<f64>,
    pub velocity: Vector3<f64>,
    pub acceleration: Option<Vector3<f64>>,
}

impl PvSample {
    pub fn new(epoch: Epoch, position: Vector3<f64>, velocity: Vector3<f64>) -> Self {
        PvSample {
            epoch,
            position,
            velocity,
            acceleration: None,
        }
    }
}

/// Time-stamped attitude in the inertial frame.
///
/// `rotation` maps inertial coordinates to spacecraft body coordinates; the
/// optional `rate` is the angular velocity in the spacecraft frame.
#[derive(Debug, Clone, Copy)]
pub struct AttitudeSample {
    pub epoch: Epoch,
    pub rotation: UnitQuaternion<f64>,
    pub rate: Option<Vector3<f64>>,
    pub rate_derivative: Option<Vector3<f64>>,
}

impl AttitudeSample {
    pub fn new(epoch: Epoch, rotation: UnitQuaternion<f64>) -> Self {
        AttitudeSample {
            epoch,
            rotation,
            rate: None,
            rate_derivative: None,
        }
    }
}

/// Immutable ordered list of trajectory and attitude samples.
#[derive(Debug, Clone)]
pub struct Trajectory {
    inertial_frame: FrameId,
    pv: Vec<PvSample>,
    attitude: Vec<AttitudeSample>,
}

impl Trajectory {
    /// Builds a trajectory after checking that both sample lists are
    /// non-empty and strictly increasing in time.
    pub fn new(inertial_frame: FrameId, pv: Vec<PvSample>, attitude: Vec<AttitudeSample>) -> Result<Self> {
        if pv.len() < 2 {
            return Err(Error::NotEnoughSamples {
                needed: 2,
                available: pv.len(),
            });
        }
        if attitude.len() < 2 {
            return Err(Error::NotEnoughSamples {
                needed: 2,
                available: attitude.len(),
            });
        }
        for (index, w) in pv.windows(2).enumerate() {
            if w[1].epoch <= w[0].epoch {
                return Err(Error::UnsortedTrajectory { index: index + 1 });
            }
        }
        for (index, w) in attitude.windows(2).enumerate() {
            if w[1].epoch <= w[0].epoch {
                return Err(Error::UnsortedTrajectory { index: index + 1 });
            }
        }
        Ok(Trajectory {
            inertial_frame,
            pv,
            attitude,
        })
    }

    pub fn inertial_frame(&self) -> FrameId {
        self.inertial_frame
    }

    pub fn pv_samples(&self) -> &[PvSample] {
        &self.pv
    }

    pub fn attitude_samples(&self) -> &[AttitudeSample] {
        &self.attitude
    }

    /// First date covered by both sample lists.
    pub fn t_min(&self) -> Epoch {
        self.pv[0].epoch.max(self.attitude[0].epoch)
    }

    /// Last date covered by both sample lists.
    pub fn t_max(&self) -> Epoch {
        self.pv[self.pv.len() - 1]
            .epoch
            .min(self.attitude[self.attitude.len() - 1].epoch)
    }
}
