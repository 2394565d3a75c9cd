//! Spacecraft trajectory resampling and frame transforms.
//!
//! A [`Trajectory`] holds time-stamped position/velocity and attitude
//! samples in an inertial frame. The [`TrajectoryInterpolator`] resamples it
//! together with an [`InertialToBody`] provider on a regular time grid and
//! then answers, for any instant of the covered span, the composed transform
//! from the spacecraft body frame to the rotating planetary frame. The
//! [`corrections`] module holds the finite-speed-of-light helpers.

pub type Result<T = ()> = std::result::Result<T, Error>;

pub mod corrections;
mod error;
mod filters;
mod frames;
mod interpolation;
mod resampler;
mod sample;
mod transform;

#[doc(inline)]
pub use {
    error::Error, filters::AngularDerivativesFilter, filters::CartesianDerivativesFilter, frames::InertialToBody,
    frames::UniformlyRotatingBody, resampler::TrajectoryInterpolator, sample::AttitudeSample, sample::PvSample,
    sample::Trajectory, transform::Transform,
};
