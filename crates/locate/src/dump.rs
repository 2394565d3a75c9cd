//! Opt-in recording of geometry queries for deterministic replay.
//!
//! The dump is thread-local: each worker thread activates its own sink and
//! only queries issued from that thread are recorded. Records are single
//! UTF-8 lines of whitespace-separated key/value pairs, all units SI; dates
//! are written as GPST seconds so records stay whitespace-free.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use hifitime::Epoch;
use log::warn;
use nalgebra::{UnitQuaternion, Vector3};

use dem::Tile;
use geom::{Ellipsoid, GeodeticPoint};
use orbit::{Transform, TrajectoryInterpolator};

use crate::algorithm::AlgorithmId;
use crate::sensor::{LineSensor, SensorPixel};
use crate::Result;

struct DumpState {
    writer: Box<dyn Write>,
    ellipsoid_dumped: bool,
    algorithm_dumped: bool,
    span_dumped: bool,
    sensors_dumped: HashSet<String>,
    tiles_dumped: Vec<(u64, u64)>,
}

thread_local! {
    static DUMP: RefCell<Option<DumpState>> = const { RefCell::new(None) };
}

/// Starts recording the current thread's queries into `writer`.
pub fn activate(writer: Box<dyn Write>) {
    DUMP.with(|d| {
        *d.borrow_mut() = Some(DumpState {
            writer,
            ellipsoid_dumped: false,
            algorithm_dumped: false,
            span_dumped: false,
            sensors_dumped: HashSet::new(),
            tiles_dumped: Vec::new(),
        });
    });
}

/// Starts recording the current thread's queries into a file.
pub fn activate_file(path: impl AsRef<Path>) -> Result {
    let file = File::create(path)?;
    activate(Box::new(BufWriter::new(file)));
    Ok(())
}

/// Stops recording and flushes the sink.
pub fn deactivate() {
    DUMP.with(|d| {
        if let Some(mut state) = d.borrow_mut().take() {
            if let Err(e) = state.writer.flush() {
                warn!("failed to flush dump: {e}");
            }
        }
    });
}

pub fn is_active() -> bool {
    DUMP.with(|d| d.borrow().is_some())
}

fn with_dump(f: impl FnOnce(&mut DumpState) -> std::io::Result<()>) {
    DUMP.with(|d| {
        if let Some(state) = d.borrow_mut().as_mut() {
            if let Err(e) = f(state) {
                warn!("failed to write dump record: {e}");
            }
        }
    });
}

fn seconds(epoch: Epoch) -> f64 {
    epoch.to_gpst_seconds()
}

fn v3(v: &Vector3<f64>) -> String {
    format!("{:e} {:e} {:e}", v.x, v.y, v.z)
}

fn quaternion(q: &UnitQuaternion<f64>) -> String {
    format!("{:e} {:e} {:e} {:e}", q.w, q.i, q.j, q.k)
}

pub(crate) fn dump_ellipsoid(ellipsoid: &Ellipsoid) {
    with_dump(|state| {
        if state.ellipsoid_dumped {
            return Ok(());
        }
        state.ellipsoid_dumped = true;
        writeln!(
            state.writer,
            "ellipsoid: ae {:e} f {:e} frame {}",
            ellipsoid.equatorial_radius(),
            ellipsoid.flattening(),
            ellipsoid.body_frame()
        )
    });
}

pub(crate) fn dump_algorithm(id: AlgorithmId) {
    with_dump(|state| {
        if state.algorithm_dumped {
            return Ok(());
        }
        state.algorithm_dumped = true;
        match id {
            AlgorithmId::Duvenhage => writeln!(state.writer, "algorithm: DUVENHAGE"),
            AlgorithmId::DuvenhageFlatBody => writeln!(state.writer, "algorithm: DUVENHAGE_FLAT_BODY"),
            AlgorithmId::BasicScan => writeln!(state.writer, "algorithm: BASIC_SCAN"),
            AlgorithmId::ConstantElevationOverEllipsoid(h) => {
                writeln!(state.writer, "algorithm: CONSTANT_ELEVATION_OVER_ELLIPSOID elevation {h:e}")
            }
            AlgorithmId::IgnoreDemUseEllipsoid => writeln!(state.writer, "algorithm: IGNORE_DEM_USE_ELLIPSOID"),
        }
    });
}

pub(crate) fn dump_span(interpolator: &TrajectoryInterpolator) {
    with_dump(|state| {
        if state.span_dumped {
            return Ok(());
        }
        state.span_dumped = true;
        writeln!(
            state.writer,
            "span: minDate {:e} maxDate {:e} tStep {:e} tolerance {:e} inertialFrame {} bodyFrame {}",
            seconds(interpolator.t_min()),
            seconds(interpolator.t_max()),
            interpolator.t_step(),
            interpolator.overshoot_tolerance(),
            interpolator.inertial_frame(),
            interpolator.body_frame()
        )?;
        for (index, (epoch, sc, ib)) in interpolator.transforms().enumerate() {
            dump_transform(&mut state.writer, index, epoch, sc, ib)?;
        }
        Ok(())
    });
}

fn dump_transform(
    writer: &mut dyn Write,
    index: usize,
    epoch: Epoch,
    sc_to_inertial: &Transform,
    inertial_to_body: &Transform,
) -> std::io::Result<()> {
    writeln!(
        writer,
        "transform: index {} date {:e} scq {} scomega {} scp {} scv {} ibq {} ibomega {}",
        index,
        seconds(epoch),
        quaternion(&sc_to_inertial.rotation),
        v3(&sc_to_inertial.rotation_rate),
        v3(&sc_to_inertial.translation),
        v3(&sc_to_inertial.velocity),
        quaternion(&inertial_to_body.rotation),
        v3(&inertial_to_body.rotation_rate),
    )
}

pub(crate) fn dump_tile(tile: &dyn Tile) {
    with_dump(|state| {
        let key = (tile.min_latitude().to_bits(), tile.min_longitude().to_bits());
        if state.tiles_dumped.contains(&key) {
            return Ok(());
        }
        state.tiles_dumped.push(key);
        let name = state.tiles_dumped.len() - 1;
        writeln!(
            state.writer,
            "DEM tile: t{} latMin {:e} latStep {:e} latRows {} lonMin {:e} lonStep {:e} lonCols {}",
            name,
            tile.min_latitude(),
            tile.latitude_step(),
            tile.latitude_rows(),
            tile.min_longitude(),
            tile.longitude_step(),
            tile.longitude_columns()
        )?;
        for i in 0..tile.latitude_rows() {
            for j in 0..tile.longitude_columns() {
                let elevation = tile.elevation_at_indices(i, j).unwrap_or(f64::NAN);
                writeln!(
                    state.writer,
                    "DEM cell: t{name} latIndex {i} lonIndex {j} elevation {elevation:e}"
                )?;
            }
        }
        Ok(())
    });
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn dump_direct_location(
    date: Epoch,
    position: &Vector3<f64>,
    los: &Vector3<f64>,
    light_time: bool,
    aberration: bool,
    refraction: bool,
) {
    with_dump(|state| {
        writeln!(
            state.writer,
            "direct location: date {:e} position {} los {} lightTime {} aberration {} refraction {}",
            seconds(date),
            v3(position),
            v3(los),
            light_time,
            aberration,
            refraction
        )
    });
}

pub(crate) fn dump_direct_location_result(gp: &GeodeticPoint) {
    with_dump(|state| {
        writeln!(
            state.writer,
            "direct location result: latitude {:e} longitude {:e} elevation {:e}",
            gp.latitude, gp.longitude, gp.altitude
        )
    });
}

#[allow(clippy::too_many_arguments)]
pub(crate) fn dump_inverse_location(
    sensor_name: &str,
    point: &GeodeticPoint,
    min_line: f64,
    max_line: f64,
    light_time: bool,
    aberration: bool,
    refraction: bool,
) {
    with_dump(|state| {
        writeln!(
            state.writer,
            "inverse location: sensorName {} latitude {:e} longitude {:e} elevation {:e} minLine {:e} maxLine {:e} lightTime {} aberration {} refraction {}",
            sensor_name, point.latitude, point.longitude, point.altitude, min_line, max_line, light_time, aberration, refraction
        )
    });
}

pub(crate) fn dump_inverse_location_result(pixel: Option<SensorPixel>) {
    with_dump(|state| match pixel {
        Some(p) => writeln!(
            state.writer,
            "inverse location result: lineNumber {:e} pixelNumber {:e}",
            p.line, p.pixel
        ),
        None => writeln!(state.writer, "inverse location result: NONE"),
    });
}

pub(crate) fn dump_sensor(sensor: &LineSensor, min_line: f64, max_line: f64) {
    with_dump(|state| {
        if !state.sensors_dumped.insert(sensor.name().to_string()) {
            return Ok(());
        }
        writeln!(
            state.writer,
            "sensor: sensorName {} nbPixels {} position {}",
            sensor.name(),
            sensor.nb_pixels(),
            v3(&sensor.position())
        )?;
        let plane = sensor.mean_plane();
        writeln!(
            state.writer,
            "sensor mean plane: sensorName {} refDate {:e} refPoint {} normal {}",
            sensor.name(),
            seconds(plane.reference_date),
            v3(&plane.reference_point),
            v3(&plane.normal)
        )?;
        for line in [min_line, max_line] {
            writeln!(
                state.writer,
                "sensor datation: sensorName {} lineNumber {:e} date {:e}",
                sensor.name(),
                line,
                seconds(sensor.date(line))
            )?;
            writeln!(
                state.writer,
                "sensor rate: sensorName {} lineNumber {:e} rate {:e}",
                sensor.name(),
                line,
                sensor.rate(line)
            )?;
        }
        // lines of sight at the mean plane reference date, one per pixel
        for pixel in 0..sensor.nb_pixels() {
            let los = sensor.los(plane.reference_date, pixel);
            writeln!(
                state.writer,
                "sensor LOS: sensorName {} date {:e} pixelNumber {} los {}",
                sensor.name(),
                seconds(plane.reference_date),
                pixel,
                v3(&los)
            )?;
        }
        Ok(())
    });
}
