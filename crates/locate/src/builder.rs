use std::collections::HashMap;
use std::sync::Arc;

use hifitime::Epoch;

use dem::{TileUpdater, UpdatableTile};
use geom::Ellipsoid;
use orbit::{
    AngularDerivativesFilter, CartesianDerivativesFilter, InertialToBody, Trajectory, TrajectoryInterpolator,
};

use crate::algorithm::{AlgorithmId, create_algorithm};
use crate::dump;
use crate::locator::Locator;
use crate::refraction::AtmosphericRefraction;
use crate::sensor::LineSensor;
use crate::{Error, Result};

/// Assembles an immutable [`Locator`] from its collaborators.
///
/// The trajectory is resampled at build time; everything handed over to the
/// builder is frozen into the locator.
pub struct LocatorBuilder {
    ellipsoid: Option<Ellipsoid>,
    trajectory: Option<Trajectory>,
    provider: Option<Box<dyn InertialToBody>>,
    t_min: Option<Epoch>,
    t_max: Option<Epoch>,
    t_step: f64,
    overshoot_tolerance: f64,
    cartesian_filter: CartesianDerivativesFilter,
    angular_filter: AngularDerivativesFilter,
    interpolation_neighbors: usize,
    algorithm_id: AlgorithmId,
    updater: Option<Arc<dyn TileUpdater>>,
    max_cached_tiles: usize,
    light_time_correction: bool,
    aberration_of_light_correction: bool,
    refraction: Option<Box<dyn AtmosphericRefraction>>,
    sensors: Vec<LineSensor>,
}

impl LocatorBuilder {
    pub fn new() -> Self {
        LocatorBuilder {
            ellipsoid: None,
            trajectory: None,
            provider: None,
            t_min: None,
            t_max: None,
            t_step: 1.0,
            overshoot_tolerance: 1.0e-3,
            cartesian_filter: CartesianDerivativesFilter::UsePv,
            angular_filter: AngularDerivativesFilter::UseRr,
            interpolation_neighbors: 4,
            algorithm_id: AlgorithmId::IgnoreDemUseEllipsoid,
            updater: None,
            max_cached_tiles: 8,
            light_time_correction: true,
            aberration_of_light_correction: true,
            refraction: None,
            sensors: Vec::new(),
        }
    }

    pub fn ellipsoid(mut self, ellipsoid: Ellipsoid) -> Self {
        self.ellipsoid = Some(ellipsoid);
        self
    }

    /// Trajectory and body rotation provider, with the resampling window and
    /// step.
    pub fn trajectory(
        mut self,
        trajectory: Trajectory,
        provider: Box<dyn InertialToBody>,
        t_min: Epoch,
        t_max: Epoch,
        t_step: f64,
        overshoot_tolerance: f64,
    ) -> Self {
        self.trajectory = Some(trajectory);
        self.provider = Some(provider);
        self.t_min = Some(t_min);
        self.t_max = Some(t_max);
        self.t_step = t_step;
        self.overshoot_tolerance = overshoot_tolerance;
        self
    }

    pub fn derivative_filters(
        mut self,
        cartesian: CartesianDerivativesFilter,
        angular: AngularDerivativesFilter,
    ) -> Self {
        self.cartesian_filter = cartesian;
        self.angular_filter = angular;
        self
    }

    pub fn interpolation_neighbors(mut self, neighbors: usize) -> Self {
        self.interpolation_neighbors = neighbors;
        self
    }

    /// Intersection algorithm and, for DEM-based variants, its tile source.
    pub fn algorithm(mut self, id: AlgorithmId) -> Self {
        self.algorithm_id = id;
        self
    }

    pub fn digital_elevation_model(mut self, updater: Arc<dyn TileUpdater>, max_cached_tiles: usize) -> Self {
        self.updater = Some(updater);
        self.max_cached_tiles = max_cached_tiles;
        self
    }

    pub fn light_time_correction(mut self, enabled: bool) -> Self {
        self.light_time_correction = enabled;
        self
    }

    pub fn aberration_of_light_correction(mut self, enabled: bool) -> Self {
        self.aberration_of_light_correction = enabled;
        self
    }

    pub fn refraction(mut self, model: Box<dyn AtmosphericRefraction>) -> Self {
        self.refraction = Some(model);
        self
    }

    pub fn add_sensor(mut self, sensor: LineSensor) -> Self {
        self.sensors.push(sensor);
        self
    }

    pub fn build(self) -> Result<Locator> {
        let ellipsoid = self
            .ellipsoid
            .ok_or_else(|| Error::InternalError("no ellipsoid configured".into()))?;
        let trajectory = self
            .trajectory
            .ok_or_else(|| Error::InternalError("no trajectory configured".into()))?;
        let provider = self
            .provider
            .ok_or_else(|| Error::InternalError("no body rotation provider configured".into()))?;
        let (t_min, t_max) = (
            self.t_min.ok_or_else(|| Error::InternalError("no time span configured".into()))?,
            self.t_max.ok_or_else(|| Error::InternalError("no time span configured".into()))?,
        );

        let interpolator = TrajectoryInterpolator::new(
            &trajectory,
            provider.as_ref(),
            t_min,
            t_max,
            self.t_step,
            self.overshoot_tolerance,
            self.cartesian_filter,
            self.angular_filter,
            self.interpolation_neighbors,
        )?;

        let updater = match self.updater {
            Some(updater) => Arc::new(DumpingUpdater { inner: updater }) as Arc<dyn TileUpdater>,
            None => Arc::new(NoDemUpdater) as Arc<dyn TileUpdater>,
        };
        let algorithm = create_algorithm(self.algorithm_id, updater, self.max_cached_tiles);

        let sensors: HashMap<String, Arc<LineSensor>> = self
            .sensors
            .into_iter()
            .map(|s| (s.name().to_string(), Arc::new(s)))
            .collect();

        Ok(Locator {
            ellipsoid,
            interpolator,
            algorithm,
            sensors,
            light_time_correction: self.light_time_correction,
            aberration_of_light_correction: self.aberration_of_light_correction,
            refraction: self.refraction,
            crossing_seeds: Default::default(),
        })
    }
}

impl Default for LocatorBuilder {
    fn default() -> Self {
        LocatorBuilder::new()
    }
}

/// Placeholder updater for the DEM-free algorithms.
struct NoDemUpdater;

impl TileUpdater for NoDemUpdater {
    fn update_tile(&self, latitude: f64, longitude: f64, _tile: &mut dyn UpdatableTile) -> dem::Result {
        Err(dem::Error::NoDemData { latitude, longitude })
    }
}

/// Records every tile produced by the wrapped updater into the active dump.
struct DumpingUpdater {
    inner: Arc<dyn TileUpdater>,
}

struct RecordingTile<'a> {
    target: &'a mut dyn UpdatableTile,
    copy: dem::SimpleTile,
}

impl UpdatableTile for RecordingTile<'_> {
    fn set_geometry(
        &mut self,
        min_latitude: f64,
        min_longitude: f64,
        latitude_step: f64,
        longitude_step: f64,
        latitude_rows: usize,
        longitude_columns: usize,
    ) -> dem::Result {
        self.copy.set_geometry(
            min_latitude,
            min_longitude,
            latitude_step,
            longitude_step,
            latitude_rows,
            longitude_columns,
        )?;
        self.target.set_geometry(
            min_latitude,
            min_longitude,
            latitude_step,
            longitude_step,
            latitude_rows,
            longitude_columns,
        )
    }

    fn set_elevation(&mut self, row: usize, col: usize, elevation: f64) -> dem::Result {
        self.copy.set_elevation(row, col, elevation)?;
        self.target.set_elevation(row, col, elevation)
    }
}

impl TileUpdater for DumpingUpdater {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut dyn UpdatableTile) -> dem::Result {
        if !dump::is_active() {
            return self.inner.update_tile(latitude, longitude, tile);
        }
        let mut recording = RecordingTile {
            target: tile,
            copy: dem::SimpleTile::new(),
        };
        self.inner.update_tile(latitude, longitude, &mut recording)?;
        dump::dump_tile(&recording.copy);
        Ok(())
    }
}
