//! Reconstruction of a replayable configuration from a dump stream.

use std::collections::HashMap;
use std::sync::Arc;

use hifitime::Epoch;
use nalgebra::{Quaternion, UnitQuaternion, Vector3};

use dem::{TileUpdater, UpdatableTile};
use geom::{Ellipsoid, FrameId, GeodeticPoint};
use orbit::{AngularDerivativesFilter, CartesianDerivativesFilter, TrajectoryInterpolator, Transform};

use crate::algorithm::{AlgorithmId, create_algorithm};
use crate::locator::Locator;
use crate::sensor::{LineSensor, LinearLineDatation, SensorPixel, TimeDependentLos};
use crate::{Error, Result};

/// One replayed direct location query.
pub struct ReplayedDirect {
    pub expected: Option<GeodeticPoint>,
    pub computed: GeodeticPoint,
}

/// One replayed inverse location query.
pub struct ReplayedInverse {
    pub expected: Option<Option<SensorPixel>>,
    pub computed: Option<SensorPixel>,
}

struct DirectQuery {
    date: Epoch,
    position: Vector3<f64>,
    los: Vector3<f64>,
    light_time: bool,
    aberration: bool,
    result: Option<GeodeticPoint>,
}

struct InverseQuery {
    sensor_name: String,
    point: GeodeticPoint,
    min_line: f64,
    max_line: f64,
    light_time: bool,
    aberration: bool,
    result: Option<Option<SensorPixel>>,
}

#[derive(Clone, Default)]
struct ParsedTile {
    min_latitude: f64,
    min_longitude: f64,
    latitude_step: f64,
    longitude_step: f64,
    latitude_rows: usize,
    longitude_columns: usize,
    elevations: Vec<f64>,
}

#[derive(Default)]
struct ParsedSensor {
    position: Vector3<f64>,
    nb_pixels: usize,
    datation: Vec<(f64, Epoch)>,
    los: Vec<Vec<(Epoch, Vector3<f64>)>>,
}

/// Parses a dump back into a configuration able to re-run every recorded
/// query.
pub struct DumpReplayer {
    ellipsoid: Option<Ellipsoid>,
    algorithm: Option<AlgorithmId>,
    t_step: f64,
    tolerance: f64,
    inertial_frame: FrameId,
    body_frame: FrameId,
    transforms: Vec<(Epoch, Transform, Transform)>,
    tiles: Vec<ParsedTile>,
    sensors: HashMap<String, ParsedSensor>,
    direct_queries: Vec<DirectQuery>,
    inverse_queries: Vec<InverseQuery>,
}

struct Tokens<'a> {
    line: usize,
    inner: std::str::SplitWhitespace<'a>,
}

impl<'a> Tokens<'a> {
    fn next(&mut self) -> Result<&'a str> {
        self.inner.next().ok_or_else(|| Error::CannotParseDumpLine {
            line: self.line,
            message: "unexpected end of record".into(),
        })
    }

    fn key(&mut self, expected: &str) -> Result<()> {
        let token = self.next()?;
        if token == expected {
            Ok(())
        } else {
            Err(Error::CannotParseDumpLine {
                line: self.line,
                message: format!("expected key {expected}, found {token}"),
            })
        }
    }

    fn f64(&mut self) -> Result<f64> {
        let token = self.next()?;
        token.parse().map_err(|_| Error::CannotParseDumpLine {
            line: self.line,
            message: format!("not a number: {token}"),
        })
    }

    fn usize(&mut self) -> Result<usize> {
        let token = self.next()?;
        token.parse().map_err(|_| Error::CannotParseDumpLine {
            line: self.line,
            message: format!("not an index: {token}"),
        })
    }

    fn bool(&mut self) -> Result<bool> {
        let token = self.next()?;
        token.parse().map_err(|_| Error::CannotParseDumpLine {
            line: self.line,
            message: format!("not a boolean: {token}"),
        })
    }

    fn epoch(&mut self) -> Result<Epoch> {
        Ok(Epoch::from_gpst_seconds(self.f64()?))
    }

    fn vector3(&mut self) -> Result<Vector3<f64>> {
        Ok(Vector3::new(self.f64()?, self.f64()?, self.f64()?))
    }

    fn quaternion(&mut self) -> Result<UnitQuaternion<f64>> {
        let (w, i, j, k) = (self.f64()?, self.f64()?, self.f64()?, self.f64()?);
        Ok(UnitQuaternion::from_quaternion(Quaternion::new(w, i, j, k)))
    }
}

fn frame_from_name(name: &str) -> FrameId {
    match name {
        "GCRF" => FrameId::GCRF,
        "ITRF" => FrameId::ITRF,
        other => FrameId::new(Box::leak(other.to_string().into_boxed_str())),
    }
}

impl DumpReplayer {
    pub fn parse(content: &str) -> Result<Self> {
        let mut replayer = DumpReplayer {
            ellipsoid: None,
            algorithm: None,
            t_step: 1.0,
            tolerance: 1.0e-3,
            inertial_frame: FrameId::GCRF,
            body_frame: FrameId::ITRF,
            transforms: Vec::new(),
            tiles: Vec::new(),
            sensors: HashMap::new(),
            direct_queries: Vec::new(),
            inverse_queries: Vec::new(),
        };

        for (index, raw_line) in content.lines().enumerate() {
            let line = index + 1;
            let raw_line = raw_line.trim();
            if raw_line.is_empty() {
                continue;
            }
            let (key, rest) = raw_line.split_once(':').ok_or_else(|| Error::CannotParseDumpLine {
                line,
                message: "missing record key".into(),
            })?;
            let mut tokens = Tokens {
                line,
                inner: rest.split_whitespace(),
            };
            match key {
                "ellipsoid" => replayer.parse_ellipsoid(&mut tokens)?,
                "algorithm" => replayer.parse_algorithm(&mut tokens)?,
                "span" => replayer.parse_span(&mut tokens)?,
                "transform" => replayer.parse_transform(&mut tokens)?,
                "DEM tile" => replayer.parse_tile(&mut tokens)?,
                "DEM cell" => replayer.parse_cell(&mut tokens)?,
                "sensor" => replayer.parse_sensor(&mut tokens)?,
                "sensor mean plane" => { /* recomputed from the lines of sight */ }
                "sensor datation" => replayer.parse_datation(&mut tokens)?,
                "sensor rate" => { /* implied by the datation samples */ }
                "sensor LOS" => replayer.parse_los(&mut tokens)?,
                "direct location" => replayer.parse_direct(&mut tokens)?,
                "direct location result" => replayer.parse_direct_result(&mut tokens)?,
                "inverse location" => replayer.parse_inverse(&mut tokens)?,
                "inverse location result" => replayer.parse_inverse_result(&mut tokens)?,
                other => {
                    return Err(Error::CannotParseDumpLine {
                        line,
                        message: format!("unknown record key {other}"),
                    });
                }
            }
        }
        Ok(replayer)
    }

    fn parse_ellipsoid(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("ae")?;
        let ae = t.f64()?;
        t.key("f")?;
        let f = t.f64()?;
        t.key("frame")?;
        let frame = frame_from_name(t.next()?);
        self.ellipsoid = Some(Ellipsoid::with_radii(ae, f, frame));
        Ok(())
    }

    fn parse_algorithm(&mut self, t: &mut Tokens) -> Result<()> {
        let name = t.next()?;
        self.algorithm = Some(match name {
            "DUVENHAGE" => AlgorithmId::Duvenhage,
            "DUVENHAGE_FLAT_BODY" => AlgorithmId::DuvenhageFlatBody,
            "BASIC_SCAN" => AlgorithmId::BasicScan,
            "IGNORE_DEM_USE_ELLIPSOID" => AlgorithmId::IgnoreDemUseEllipsoid,
            "CONSTANT_ELEVATION_OVER_ELLIPSOID" => {
                t.key("elevation")?;
                AlgorithmId::ConstantElevationOverEllipsoid(t.f64()?)
            }
            other => {
                return Err(Error::CannotParseDumpLine {
                    line: t.line,
                    message: format!("unknown algorithm {other}"),
                });
            }
        });
        Ok(())
    }

    fn parse_span(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("minDate")?;
        let _ = t.f64()?;
        t.key("maxDate")?;
        let _ = t.f64()?;
        t.key("tStep")?;
        self.t_step = t.f64()?;
        t.key("tolerance")?;
        self.tolerance = t.f64()?;
        t.key("inertialFrame")?;
        self.inertial_frame = frame_from_name(t.next()?);
        t.key("bodyFrame")?;
        self.body_frame = frame_from_name(t.next()?);
        Ok(())
    }

    fn parse_transform(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("index")?;
        let _ = t.usize()?;
        t.key("date")?;
        let date = t.epoch()?;
        t.key("scq")?;
        let scq = t.quaternion()?;
        t.key("scomega")?;
        let scomega = t.vector3()?;
        t.key("scp")?;
        let scp = t.vector3()?;
        t.key("scv")?;
        let scv = t.vector3()?;
        t.key("ibq")?;
        let ibq = t.quaternion()?;
        t.key("ibomega")?;
        let ibomega = t.vector3()?;
        self.transforms.push((
            date,
            Transform::new(scp, scv, scq, scomega),
            Transform::new(Vector3::zeros(), Vector3::zeros(), ibq, ibomega),
        ));
        Ok(())
    }

    fn tile_index(&mut self, t: &mut Tokens) -> Result<usize> {
        let token = t.next()?;
        let index: usize = token
            .strip_prefix('t')
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| Error::CannotParseDumpLine {
                line: t.line,
                message: format!("not a tile name: {token}"),
            })?;
        while self.tiles.len() <= index {
            self.tiles.push(ParsedTile::default());
        }
        Ok(index)
    }

    fn parse_tile(&mut self, t: &mut Tokens) -> Result<()> {
        let index = self.tile_index(t)?;
        t.key("latMin")?;
        let min_latitude = t.f64()?;
        t.key("latStep")?;
        let latitude_step = t.f64()?;
        t.key("latRows")?;
        let latitude_rows = t.usize()?;
        t.key("lonMin")?;
        let min_longitude = t.f64()?;
        t.key("lonStep")?;
        let longitude_step = t.f64()?;
        t.key("lonCols")?;
        let longitude_columns = t.usize()?;
        self.tiles[index] = ParsedTile {
            min_latitude,
            min_longitude,
            latitude_step,
            longitude_step,
            latitude_rows,
            longitude_columns,
            elevations: vec![0.0; latitude_rows * longitude_columns],
        };
        Ok(())
    }

    fn parse_cell(&mut self, t: &mut Tokens) -> Result<()> {
        let index = self.tile_index(t)?;
        t.key("latIndex")?;
        let i = t.usize()?;
        t.key("lonIndex")?;
        let j = t.usize()?;
        t.key("elevation")?;
        let elevation = t.f64()?;
        let tile = &mut self.tiles[index];
        let cols = tile.longitude_columns;
        if i >= tile.latitude_rows || j >= cols {
            return Err(Error::CannotParseDumpLine {
                line: t.line,
                message: format!("cell ({i}, {j}) outside tile t{index}"),
            });
        }
        tile.elevations[i * cols + j] = elevation;
        Ok(())
    }

    fn parse_sensor(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("sensorName")?;
        let name = t.next()?.to_string();
        t.key("nbPixels")?;
        let nb_pixels = t.usize()?;
        t.key("position")?;
        let position = t.vector3()?;
        let sensor = self.sensors.entry(name).or_default();
        sensor.nb_pixels = nb_pixels;
        sensor.position = position;
        sensor.los.resize(nb_pixels, Vec::new());
        Ok(())
    }

    fn parse_datation(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("sensorName")?;
        let name = t.next()?.to_string();
        t.key("lineNumber")?;
        let line_number = t.f64()?;
        t.key("date")?;
        let date = t.epoch()?;
        self.sensors.entry(name).or_default().datation.push((line_number, date));
        Ok(())
    }

    fn parse_los(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("sensorName")?;
        let name = t.next()?.to_string();
        t.key("date")?;
        let date = t.epoch()?;
        t.key("pixelNumber")?;
        let pixel = t.usize()?;
        t.key("los")?;
        let los = t.vector3()?;
        let sensor = self.sensors.entry(name).or_default();
        if sensor.los.len() <= pixel {
            sensor.los.resize(pixel + 1, Vec::new());
        }
        sensor.los[pixel].push((date, los));
        Ok(())
    }

    fn parse_direct(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("date")?;
        let date = t.epoch()?;
        t.key("position")?;
        let position = t.vector3()?;
        t.key("los")?;
        let los = t.vector3()?;
        t.key("lightTime")?;
        let light_time = t.bool()?;
        t.key("aberration")?;
        let aberration = t.bool()?;
        t.key("refraction")?;
        let _ = t.bool()?;
        self.direct_queries.push(DirectQuery {
            date,
            position,
            los,
            light_time,
            aberration,
            result: None,
        });
        Ok(())
    }

    fn parse_direct_result(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("latitude")?;
        let latitude = t.f64()?;
        t.key("longitude")?;
        let longitude = t.f64()?;
        t.key("elevation")?;
        let altitude = t.f64()?;
        let query = self.direct_queries.last_mut().ok_or_else(|| Error::CannotParseDumpLine {
            line: t.line,
            message: "result record without a pending direct location".into(),
        })?;
        query.result = Some(GeodeticPoint::new(latitude, longitude, altitude));
        Ok(())
    }

    fn parse_inverse(&mut self, t: &mut Tokens) -> Result<()> {
        t.key("sensorName")?;
        let sensor_name = t.next()?.to_string();
        t.key("latitude")?;
        let latitude = t.f64()?;
        t.key("longitude")?;
        let longitude = t.f64()?;
        t.key("elevation")?;
        let altitude = t.f64()?;
        t.key("minLine")?;
        let min_line = t.f64()?;
        t.key("maxLine")?;
        let max_line = t.f64()?;
        t.key("lightTime")?;
        let light_time = t.bool()?;
        t.key("aberration")?;
        let aberration = t.bool()?;
        t.key("refraction")?;
        let _ = t.bool()?;
        self.inverse_queries.push(InverseQuery {
            sensor_name,
            point: GeodeticPoint::new(latitude, longitude, altitude),
            min_line,
            max_line,
            light_time,
            aberration,
            result: None,
        });
        Ok(())
    }

    fn parse_inverse_result(&mut self, t: &mut Tokens) -> Result<()> {
        let query = self.inverse_queries.last_mut().ok_or_else(|| Error::CannotParseDumpLine {
            line: t.line,
            message: "result record without a pending inverse location".into(),
        })?;
        let token = t.next()?;
        query.result = Some(if token == "NONE" {
            None
        } else if token == "lineNumber" {
            let line = t.f64()?;
            t.key("pixelNumber")?;
            let pixel = t.f64()?;
            Some(SensorPixel { line, pixel })
        } else {
            return Err(Error::CannotParseDumpLine {
                line: t.line,
                message: format!("unexpected token {token}"),
            });
        });
        Ok(())
    }

    /// Rebuilds a locator from the parsed records.
    pub fn rebuild(&self) -> Result<Locator> {
        let ellipsoid = self
            .ellipsoid
            .ok_or_else(|| Error::InternalError("dump carries no ellipsoid record".into()))?;
        let algorithm_id = self
            .algorithm
            .ok_or_else(|| Error::InternalError("dump carries no algorithm record".into()))?;

        let interpolator = TrajectoryInterpolator::from_transforms(
            self.inertial_frame,
            self.body_frame,
            self.t_step,
            self.tolerance,
            CartesianDerivativesFilter::UsePv,
            AngularDerivativesFilter::UseRr,
            4,
            self.transforms.clone(),
        )?;

        let updater = Arc::new(ReplayedUpdater {
            tiles: self.tiles.clone(),
        });
        let algorithm = create_algorithm(algorithm_id, updater, self.tiles.len().max(1));

        let mut sensors = HashMap::new();
        let (mut light_time, mut aberration) = (false, false);
        if let Some(q) = self.direct_queries.first() {
            light_time = q.light_time;
            aberration = q.aberration;
        }
        if let Some(q) = self.inverse_queries.first() {
            light_time = q.light_time;
            aberration = q.aberration;
        }
        for (name, parsed) in &self.sensors {
            let datation = parsed.replayed_datation(name)?;
            let sensor = LineSensor::new(
                name.clone(),
                parsed.position,
                Box::new(datation),
                Box::new(ReplayedLos {
                    los: parsed.los.clone(),
                }),
            );
            sensors.insert(name.clone(), Arc::new(sensor));
        }

        Ok(Locator {
            ellipsoid,
            interpolator,
            algorithm,
            sensors,
            light_time_correction: light_time,
            aberration_of_light_correction: aberration,
            refraction: None,
            crossing_seeds: Default::default(),
        })
    }

    /// Re-runs every recorded query against the rebuilt configuration.
    pub fn replay(&self) -> Result<(Vec<ReplayedDirect>, Vec<ReplayedInverse>)> {
        let locator = self.rebuild()?;

        let mut direct = Vec::with_capacity(self.direct_queries.len());
        for query in &self.direct_queries {
            let computed = locator.direct_location(query.date, &query.position, &query.los)?;
            direct.push(ReplayedDirect {
                expected: query.result,
                computed,
            });
        }

        let mut inverse = Vec::with_capacity(self.inverse_queries.len());
        for query in &self.inverse_queries {
            let computed = locator.inverse_location(&query.sensor_name, &query.point, query.min_line, query.max_line)?;
            inverse.push(ReplayedInverse {
                expected: query.result,
                computed,
            });
        }
        Ok((direct, inverse))
    }
}

impl ParsedSensor {
    fn replayed_datation(&self, name: &str) -> Result<LinearLineDatation> {
        if self.datation.len() < 2 {
            return Err(Error::InternalError(format!(
                "dump carries fewer than two datation samples for sensor {name}"
            )));
        }
        let (l1, d1) = self.datation[0];
        let (l2, d2) = self.datation[self.datation.len() - 1];
        let rate = (l2 - l1) / (d2 - d1).to_seconds();
        Ok(LinearLineDatation::new(d1, l1, rate))
    }
}

struct ReplayedUpdater {
    tiles: Vec<ParsedTile>,
}

impl TileUpdater for ReplayedUpdater {
    fn update_tile(&self, latitude: f64, longitude: f64, tile: &mut dyn UpdatableTile) -> dem::Result {
        for parsed in &self.tiles {
            // interpolable interior of the recorded tile
            let max_lat = parsed.min_latitude + parsed.latitude_step * (parsed.latitude_rows as f64 - 1.0);
            let max_lon = parsed.min_longitude + parsed.longitude_step * (parsed.longitude_columns as f64 - 1.0);
            if latitude >= parsed.min_latitude && latitude < max_lat && longitude >= parsed.min_longitude && longitude < max_lon
            {
                tile.set_geometry(
                    parsed.min_latitude,
                    parsed.min_longitude,
                    parsed.latitude_step,
                    parsed.longitude_step,
                    parsed.latitude_rows,
                    parsed.longitude_columns,
                )?;
                for i in 0..parsed.latitude_rows {
                    for j in 0..parsed.longitude_columns {
                        tile.set_elevation(i, j, parsed.elevations[i * parsed.longitude_columns + j])?;
                    }
                }
                return Ok(());
            }
        }
        Err(dem::Error::NoDemData { latitude, longitude })
    }
}

struct ReplayedLos {
    los: Vec<Vec<(Epoch, Vector3<f64>)>>,
}

impl TimeDependentLos for ReplayedLos {
    fn nb_pixels(&self) -> usize {
        self.los.len()
    }

    fn los(&self, date: Epoch, pixel: usize) -> Vector3<f64> {
        let samples = &self.los[pixel];
        samples
            .iter()
            .min_by(|a, b| (a.0 - date).abs().cmp(&(b.0 - date).abs()))
            .map(|(_, v)| *v)
            .unwrap_or_else(Vector3::zeros)
    }
}
