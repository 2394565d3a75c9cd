use nalgebra::Vector3;

use geom::{Ellipsoid, NormalizedGeodeticPoint};

use crate::algorithm::{AlgorithmId, IntersectionAlgorithm, ground_or_escape};
use crate::Result;

/// Terrain modeled as a constant altitude surface over the ellipsoid, no DEM
/// involved.
pub struct ConstantElevationAlgorithm {
    elevation: f64,
}

impl ConstantElevationAlgorithm {
    pub fn new(elevation: f64) -> Self {
        ConstantElevationAlgorithm { elevation }
    }
}

impl IntersectionAlgorithm for ConstantElevationAlgorithm {
    fn intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint> {
        let p = ground_or_escape(ellipsoid.point_at_altitude(position, los, self.elevation))?;
        Ok(ellipsoid.geodetic_normalized(&p, 0.0)?)
    }

    fn refine_intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<NormalizedGeodeticPoint> {
        // project the guess on the line, then solve again from there
        let delta = ellipsoid.cartesian(&geom::GeodeticPoint::from(*close_guess)) - position;
        let s = delta.dot(los) / los.norm_squared();
        let projected = position + los * s;
        let p = ground_or_escape(ellipsoid.point_at_altitude(&projected, los, self.elevation))?;
        Ok(ellipsoid.geodetic_normalized(&p, close_guess.longitude())?)
    }

    fn elevation_at(&self, _latitude: f64, _longitude: f64) -> Result<f64> {
        Ok(self.elevation)
    }

    fn id(&self) -> AlgorithmId {
        AlgorithmId::ConstantElevationOverEllipsoid(self.elevation)
    }
}

/// Terrain modeled by the ellipsoid surface itself.
pub struct IgnoreDemAlgorithm {
    inner: ConstantElevationAlgorithm,
}

impl IgnoreDemAlgorithm {
    pub fn new() -> Self {
        IgnoreDemAlgorithm {
            inner: ConstantElevationAlgorithm::new(0.0),
        }
    }
}

impl Default for IgnoreDemAlgorithm {
    fn default() -> Self {
        IgnoreDemAlgorithm::new()
    }
}

impl IntersectionAlgorithm for IgnoreDemAlgorithm {
    fn intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint> {
        self.inner.intersection(ellipsoid, position, los)
    }

    fn refine_intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<NormalizedGeodeticPoint> {
        self.inner.refine_intersection(ellipsoid, position, los, close_guess)
    }

    fn elevation_at(&self, _latitude: f64, _longitude: f64) -> Result<f64> {
        Ok(0.0)
    }

    fn id(&self) -> AlgorithmId {
        AlgorithmId::IgnoreDemUseEllipsoid
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;
    use geom::{EllipsoidId, FrameId};

    use super::*;

    #[test]
    fn intersection_lands_at_the_configured_altitude() {
        let ellipsoid = Ellipsoid::new(EllipsoidId::Wgs84, FrameId::ITRF);
        let algorithm = ConstantElevationAlgorithm::new(2500.0);

        let position = Vector3::new(ellipsoid.equatorial_radius() + 694_000.0, 0.0, 0.0);
        let los = Vector3::new(-1.0, 0.02, 0.01).normalize();

        let hit = algorithm.intersection(&ellipsoid, &position, &los).unwrap();
        assert_abs_diff_eq!(hit.altitude(), 2500.0, epsilon = 1e-6);
        assert_abs_diff_eq!(algorithm.elevation_at(0.3, 0.3).unwrap(), 2500.0, epsilon = 0.0);

        let refined = algorithm.refine_intersection(&ellipsoid, &position, &los, &hit).unwrap();
        assert_abs_diff_eq!(hit.latitude(), refined.latitude(), epsilon = 1e-12);
        assert_abs_diff_eq!(hit.longitude(), refined.longitude(), epsilon = 1e-12);
    }

    #[test]
    fn ignore_dem_uses_the_ellipsoid_surface() {
        let ellipsoid = Ellipsoid::new(EllipsoidId::Wgs84, FrameId::ITRF);
        let algorithm = IgnoreDemAlgorithm::new();

        let position = Vector3::new(ellipsoid.equatorial_radius() + 694_000.0, 0.0, 0.0);
        let los = Vector3::new(-1.0, 0.0, 0.0);

        let hit = algorithm.intersection(&ellipsoid, &position, &los).unwrap();
        assert_abs_diff_eq!(hit.altitude(), 0.0, epsilon = 1e-6);
        assert_abs_diff_eq!(hit.latitude(), 0.0, epsilon = 1e-12);
        assert_abs_diff_eq!(algorithm.elevation_at(1.0, 1.0).unwrap(), 0.0, epsilon = 0.0);
    }

    #[test]
    fn rays_missing_the_surface_are_reported() {
        let ellipsoid = Ellipsoid::new(EllipsoidId::Wgs84, FrameId::ITRF);
        let algorithm = IgnoreDemAlgorithm::new();

        // line running parallel to the polar axis, far from the surface
        let position = Vector3::new(ellipsoid.equatorial_radius() + 694_000.0, 0.0, 0.0);
        let along_pole = Vector3::new(0.0, 0.0, 1.0);
        assert!(matches!(
            algorithm.intersection(&ellipsoid, &position, &along_pole),
            Err(crate::Error::LineOfSightDoesNotReachGround)
        ));
    }
}
