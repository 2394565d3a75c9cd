use nalgebra::Vector3;

use geom::{Ellipsoid, NormalizedGeodeticPoint, topocentric_basis};

use crate::algorithm::IntersectionAlgorithm;
use crate::{Error, Result};

/// Atmospheric refraction correction applied after the raw terrain
/// intersection.
///
/// Implementations are pure: they derive a corrected intersection from the
/// satellite geometry and the uncorrected one, without touching any state.
pub trait AtmosphericRefraction: Send + Sync {
    fn apply_correction(
        &self,
        sat_pos: &Vector3<f64>,
        sat_los: &Vector3<f64>,
        raw_intersection: &NormalizedGeodeticPoint,
        algorithm: &dyn IntersectionAlgorithm,
        ellipsoid: &Ellipsoid,
    ) -> Result<NormalizedGeodeticPoint>;
}

/// One atmospheric band with a constant refractive index.
#[derive(Debug, Clone, Copy)]
pub struct ConstantRefractionLayer {
    /// Altitude of the bottom of the band, in meters.
    pub lowest_altitude: f64,
    pub refractive_index: f64,
}

impl ConstantRefractionLayer {
    pub fn new(lowest_altitude: f64, refractive_index: f64) -> Self {
        ConstantRefractionLayer {
            lowest_altitude,
            refractive_index,
        }
    }
}

/// Pile of constant-index layers, refracting the line of sight with Snell's
/// law at each interface.
pub struct MultiLayerModel {
    /// Sorted from the top of the atmosphere down.
    layers: Vec<ConstantRefractionLayer>,
}

impl MultiLayerModel {
    pub fn new(mut layers: Vec<ConstantRefractionLayer>) -> Result<Self> {
        if layers.is_empty() {
            return Err(Error::InternalError("refraction model needs at least one layer".into()));
        }
        layers.sort_by(|a, b| b.lowest_altitude.total_cmp(&a.lowest_altitude));
        Ok(MultiLayerModel { layers })
    }

    /// Standard atmosphere: the refractivity decays exponentially with an
    /// 8 km scale height from 2.93e-4 at sea level.
    pub fn default_atmosphere() -> Self {
        let altitudes = [
            100_000.0, 50_000.0, 40_000.0, 30_000.0, 23_000.0, 18_000.0, 15_000.0, 12_000.0, 9_000.0, 7_000.0,
            5_000.0, 3_000.0, 1_000.0, 0.0, -1_000.0,
        ];
        let layers = altitudes
            .iter()
            .map(|&h| ConstantRefractionLayer::new(h, 1.0 + 2.93e-4 * (-h / 8_000.0).exp()))
            .collect();
        MultiLayerModel { layers }
    }

    fn lowest_altitude(&self) -> f64 {
        self.layers[self.layers.len() - 1].lowest_altitude
    }
}

impl AtmosphericRefraction for MultiLayerModel {
    fn apply_correction(
        &self,
        sat_pos: &Vector3<f64>,
        sat_los: &Vector3<f64>,
        raw_intersection: &NormalizedGeodeticPoint,
        algorithm: &dyn IntersectionAlgorithm,
        ellipsoid: &Ellipsoid,
    ) -> Result<NormalizedGeodeticPoint> {
        let target_altitude = raw_intersection.altitude();
        if target_altitude < self.lowest_altitude() {
            return Err(Error::NoLayerData {
                altitude: target_altitude,
                lowest: self.lowest_altitude(),
            });
        }

        let mut pos = *sat_pos;
        let mut los = sat_los.normalize();
        for pair in self.layers.windows(2) {
            let (above, below) = (pair[0], pair[1]);
            if above.lowest_altitude <= target_altitude {
                // the raw intersection sits inside or above this band
                break;
            }

            // propagate to the interface and bend the ray there
            pos = ellipsoid.point_at_altitude(&pos, &los, above.lowest_altitude)?;
            let gp = ellipsoid.geodetic(&pos)?;
            let (_, _, zenith) = topocentric_basis(&gp);

            let ratio = above.refractive_index / below.refractive_index;
            let k = ratio * los.dot(&zenith);
            let beta = -k - (1.0 + k * k - ratio * ratio).sqrt();
            los = (los * ratio + zenith * beta).normalize();
        }

        algorithm.refine_intersection(ellipsoid, &pos, &los, raw_intersection)
    }
}
