//! Closed-form geometry on oblate ellipsoids.
//!
//! All cartesian coordinates handled by this crate live in the rotating body
//! frame carried by the [`Ellipsoid`]; the frame itself is an opaque token
//! supplied by the trajectory layer.

pub type Result<T = ()> = std::result::Result<T, Error>;

pub mod constants;
mod ellipsoid;
mod error;
mod frame;
mod geodetic;
mod topocentric;

#[doc(inline)]
pub use {
    ellipsoid::Ellipsoid, ellipsoid::EllipsoidId, error::Error, frame::FrameId, geodetic::GeodeticPoint,
    geodetic::NormalizedGeodeticPoint, geodetic::normalized_longitude, topocentric::topocentric_basis,
};
