//! Direct and inverse geolocation for push-broom line sensors.
//!
//! A [`Locator`] composes an ellipsoid, a resampled trajectory, a terrain
//! intersection algorithm and named [`LineSensor`]s into an immutable
//! configuration answering the two reciprocal queries:
//!
//! - direct location: a sensor (line, pixel) sample maps to the geodetic
//!   point on the terrain the pixel observed;
//! - inverse location: a geodetic point maps back to the real-valued
//!   (line, pixel) coordinates of the pixel that saw it, if any.
//!
//! The terrain is intersected by the tree-pruned [`DuvenhageAlgorithm`] by
//! default; the other [`AlgorithmId`] variants trade speed for simplicity or
//! drop the DEM entirely. Optional corrections cover the finite speed of
//! light, the aberration of light and multi-layer atmospheric
//! [`refraction`]. The [`dump`] module records queries for deterministic
//! replay through [`DumpReplayer`].

pub type Result<T = ()> = std::result::Result<T, Error>;

mod algorithm;
mod basicscan;
mod builder;
mod constantelevation;
pub mod dump;
mod dumpreplay;
mod duvenhage;
mod error;
mod locator;
mod losbuilder;
mod meanplane;
mod pixelcrossing;
mod refraction;
mod sensor;

#[doc(inline)]
pub use {
    algorithm::AlgorithmId, algorithm::IntersectionAlgorithm, algorithm::create_algorithm,
    basicscan::BasicScanAlgorithm, builder::LocatorBuilder, constantelevation::ConstantElevationAlgorithm,
    constantelevation::IgnoreDemAlgorithm, dumpreplay::DumpReplayer, dumpreplay::ReplayedDirect,
    dumpreplay::ReplayedInverse, duvenhage::DuvenhageAlgorithm, error::Error, locator::Locator,
    losbuilder::BuiltLos, losbuilder::LosBuilder, losbuilder::ParameterArena, losbuilder::ParameterId,
    refraction::AtmosphericRefraction, refraction::ConstantRefractionLayer, refraction::MultiLayerModel,
    sensor::FixedLos, sensor::LineDatation, sensor::LineSensor, sensor::LinearLineDatation, sensor::MeanPlane,
    sensor::SensorPixel, sensor::TimeDependentLos,
};
