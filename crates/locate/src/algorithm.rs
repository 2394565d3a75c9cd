use std::sync::Arc;

use nalgebra::Vector3;

use dem::{Tile, TileUpdater};
use geom::{Ellipsoid, GeodeticPoint, NormalizedGeodeticPoint};

use crate::basicscan::BasicScanAlgorithm;
use crate::constantelevation::{ConstantElevationAlgorithm, IgnoreDemAlgorithm};
use crate::duvenhage::DuvenhageAlgorithm;
use crate::{Error, Result};

/// Terrain intersection capability used by the locators.
pub trait IntersectionAlgorithm: Send + Sync {
    /// First point where the line of sight enters the terrain.
    fn intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
    ) -> Result<NormalizedGeodeticPoint>;

    /// Sharpens an intersection from a close guess; corrections applied
    /// upstream may have shifted the geometry slightly since the first
    /// search.
    fn refine_intersection(
        &self,
        ellipsoid: &Ellipsoid,
        position: &Vector3<f64>,
        los: &Vector3<f64>,
        close_guess: &NormalizedGeodeticPoint,
    ) -> Result<NormalizedGeodeticPoint>;

    /// The algorithm's view of the terrain elevation.
    fn elevation_at(&self, latitude: f64, longitude: f64) -> Result<f64>;

    /// Identifier of the algorithm variant, for persistence.
    fn id(&self) -> AlgorithmId;
}

/// Selector of the intersection algorithm variant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum AlgorithmId {
    /// Min/max k-d tree pruning over the DEM tiles.
    Duvenhage,
    /// Same traversal, but crossings computed without the ellipsoid
    /// curvature correction, for comparison with legacy systems.
    DuvenhageFlatBody,
    /// Exhaustive cell scan, slow but straightforward; reference for tests.
    BasicScan,
    /// No DEM, terrain modeled at a constant altitude over the ellipsoid.
    ConstantElevationOverEllipsoid(f64),
    /// No DEM, terrain modeled by the ellipsoid itself.
    IgnoreDemUseEllipsoid,
}

/// Instantiates the algorithm selected by `id`; the updater and cache size
/// are ignored by the variants that do not read a DEM.
pub fn create_algorithm(
    id: AlgorithmId,
    updater: Arc<dyn TileUpdater>,
    max_cached_tiles: usize,
) -> Box<dyn IntersectionAlgorithm> {
    match id {
        AlgorithmId::Duvenhage => Box::new(DuvenhageAlgorithm::new(updater, max_cached_tiles, false)),
        AlgorithmId::DuvenhageFlatBody => Box::new(DuvenhageAlgorithm::new(updater, max_cached_tiles, true)),
        AlgorithmId::BasicScan => Box::new(BasicScanAlgorithm::new(updater, max_cached_tiles)),
        AlgorithmId::ConstantElevationOverEllipsoid(h) => Box::new(ConstantElevationAlgorithm::new(h)),
        AlgorithmId::IgnoreDemUseEllipsoid => Box::new(IgnoreDemAlgorithm::new()),
    }
}

/// Tests every cell of the index rectangle and keeps the hit closest to the
/// origin of the line.
///
/// The entry point anchors the local linearization of the line of sight, so
/// the rectangle must stay small with respect to the body curvature.
pub(crate) fn scan_cells(
    ellipsoid: &Ellipsoid,
    position: &Vector3<f64>,
    los: &Vector3<f64>,
    tile: &dyn Tile,
    entry: &NormalizedGeodeticPoint,
    row_1: i32,
    col_1: i32,
    row_2: i32,
    col_2: i32,
) -> Result<Option<NormalizedGeodeticPoint>> {
    let max_row = tile.latitude_rows() as i32 - 2;
    let max_col = tile.longitude_columns() as i32 - 2;
    let row_lo = row_1.min(row_2).clamp(0, max_row);
    let row_hi = row_1.max(row_2).clamp(0, max_row);
    let col_lo = col_1.min(col_2).clamp(0, max_col);
    let col_hi = col_1.max(col_2).clamp(0, max_col);

    let topo_los = ellipsoid.convert_los(&GeodeticPoint::from(*entry), los);

    let mut best: Option<(f64, NormalizedGeodeticPoint)> = None;
    for row in row_lo..=row_hi {
        for col in col_lo..=col_hi {
            if let Some(hit) = tile.cell_intersection(entry, &topo_los, row, col)? {
                let s = (ellipsoid.cartesian(&GeodeticPoint::from(hit)) - position).dot(los);
                if best.is_none_or(|(bs, _)| s < bs) {
                    best = Some((s, hit));
                }
            }
        }
    }
    Ok(best.map(|(_, hit)| hit))
}

/// Maps an ellipsoid miss onto the domain error for rays escaping to space.
pub(crate) fn ground_or_escape<T>(result: geom::Result<T>) -> Result<T> {
    result.map_err(|e| match e {
        geom::Error::LineOfSightNeverCrossesAltitude(_) => Error::LineOfSightDoesNotReachGround,
        other => Error::Geometry(other),
    })
}
