//! Direct/inverse round trips and range checks on the standard test scene.

mod testutil;

use std::sync::Arc;

use geom::GeodeticPoint;
use locate::AlgorithmId;
use testutil::*;

#[test]
fn direct_inverse_round_trip_at_mid_orbit() {
    let sensor = line_sensor(
        "roundtrip",
        2000,
        // 2000 pixels of 2.6 arcsec each
        (2.6 / 3600.0f64).to_radians() * 999.5,
        50.0f64.to_radians(),
        FanAxis::CrossTrack,
    );
    let updater = Arc::new(SmoothTerrainUpdater::new(0.0, 1000.0, 257));
    let locator = build_locator(sensor, updater, AlgorithmId::Duvenhage, false, false);

    let reference_line = 0.87654 * 2000.0;
    let gp = locator.direct_location_line("roundtrip", reference_line).unwrap();
    assert_eq!(gp.len(), 2000);

    for i in 0..gp.len() - 1 {
        let midpoint = GeodeticPoint::new(
            0.5 * (gp[i].latitude + gp[i + 1].latitude),
            0.5 * (gp[i].longitude + gp[i + 1].longitude),
            0.5 * (gp[i].altitude + gp[i + 1].altitude),
        );
        let pixel = locator
            .inverse_location("roundtrip", &midpoint, 0.0, 2000.0)
            .unwrap()
            .unwrap_or_else(|| panic!("midpoint {i} fell outside the field of view"));
        assert!(
            (pixel.line - reference_line).abs() < 5.0e-5,
            "pixel {i}: line {} vs {reference_line}",
            pixel.line
        );
        assert!(
            (pixel.pixel - (i as f64 + 0.5)).abs() < 8.0e-5,
            "pixel {i}: pixel {} vs {}",
            pixel.pixel,
            i as f64 + 0.5
        );
    }
}

#[test]
fn inverse_location_does_not_depend_on_the_bracket() {
    let sensor = line_sensor(
        "bracket",
        500,
        0.01,
        30.0f64.to_radians(),
        FanAxis::CrossTrack,
    );
    let updater = Arc::new(SmoothTerrainUpdater::new(0.0, 800.0, 129));
    let locator = build_locator(sensor, updater, AlgorithmId::Duvenhage, false, false);

    let target = locator.direct_location_pixel("bracket", 1200.0, 250).unwrap();

    let wide = locator.inverse_location("bracket", &target, 0.0, 2000.0).unwrap().unwrap();
    let narrow = locator
        .inverse_location("bracket", &target, 900.0, 1500.0)
        .unwrap()
        .unwrap();
    assert!((wide.line - narrow.line).abs() < 1.0e-6);
    assert!((wide.pixel - narrow.pixel).abs() < 1.0e-6);
    assert!((wide.line - 1200.0).abs() < 1.0e-3);
    assert!((wide.pixel - 250.0).abs() < 1.0e-3);
}

#[test]
fn points_outside_the_field_of_view_are_absent() {
    let sensor = line_sensor("narrow", 200, 0.002, 0.0, FanAxis::CrossTrack);
    let updater = Arc::new(ConstantTerrainUpdater { elevation: 0.0 });
    let locator = build_locator(sensor, updater, AlgorithmId::Duvenhage, false, false);

    // a point far off the ground track
    let off_track = GeodeticPoint::from_degrees(25.0, 0.0, 0.0);
    assert!(
        locator
            .inverse_location("narrow", &off_track, 0.0, 2000.0)
            .unwrap()
            .is_none()
    );
}

#[test]
fn last_line_and_pixel_are_reachable() {
    let sensor = line_sensor("edges", 200, 0.01, 20.0f64.to_radians(), FanAxis::CrossTrack);
    let updater = Arc::new(ConstantTerrainUpdater { elevation: 120.0 });
    let locator = build_locator(sensor, updater, AlgorithmId::Duvenhage, false, false);

    let max_line = 2000.0;
    let gp = locator.direct_location_pixel("edges", max_line, 199).unwrap();
    assert!((gp.altitude - 120.0).abs() < 1.0e-3);
}

#[test]
fn unknown_sensors_are_reported() {
    let sensor = line_sensor("known", 10, 0.01, 0.0, FanAxis::CrossTrack);
    let updater = Arc::new(ConstantTerrainUpdater { elevation: 0.0 });
    let locator = build_locator(sensor, updater, AlgorithmId::Duvenhage, false, false);

    assert!(matches!(
        locator.direct_location_line("missing", 0.0),
        Err(locate::Error::UnknownSensor(name)) if name == "missing"
    ));
}

#[test]
fn dates_outside_the_trajectory_span_are_reported() {
    use hifitime::Duration;
    use locate::LocatorBuilder;
    use orbit::UniformlyRotatingBody;

    let sensor = line_sensor("short", 100, 0.01, 0.0, FanAxis::CrossTrack);
    // the covered span starts well after the line 0 date
    let locator = LocatorBuilder::new()
        .ellipsoid(wgs84())
        .trajectory(
            circular_trajectory(orbit_radius()),
            Box::new(UniformlyRotatingBody::earth(t0(), 0.0)),
            t0() + Duration::from_seconds(10.0),
            t0() + Duration::from_seconds(20.0),
            0.25,
            0.1,
        )
        .algorithm(AlgorithmId::IgnoreDemUseEllipsoid)
        .add_sensor(sensor)
        .build()
        .unwrap();

    match locator.direct_location_line("short", 0.0) {
        Err(locate::Error::Orbit(orbit::Error::OutOfTimeRange { requested, .. })) => {
            assert_eq!(requested, t0());
        }
        other => panic!("expected an out-of-range failure, got {other:?}"),
    }
}

#[test]
fn direct_location_is_deterministic() {
    let make = || {
        let sensor = line_sensor("det", 64, 0.008, 35.0f64.to_radians(), FanAxis::CrossTrack);
        let updater = Arc::new(SmoothTerrainUpdater::new(0.0, 2000.0, 65));
        build_locator(sensor, updater, AlgorithmId::Duvenhage, false, false)
    };
    let first = make().direct_location_line("det", 500.0).unwrap();
    let second = make().direct_location_line("det", 500.0).unwrap();
    for (a, b) in first.iter().zip(&second) {
        assert_eq!(a.latitude.to_bits(), b.latitude.to_bits());
        assert_eq!(a.longitude.to_bits(), b.longitude.to_bits());
        assert_eq!(a.altitude.to_bits(), b.altitude.to_bits());
    }
}
