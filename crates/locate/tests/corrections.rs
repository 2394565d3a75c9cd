//! Magnitude and shape of the physical corrections on the standard scene.

mod testutil;

use std::sync::Arc;

use hifitime::Duration;
use locate::{AlgorithmId, LocatorBuilder, MultiLayerModel};
use orbit::UniformlyRotatingBody;
use testutil::*;

/// 400 pixels over +/- 10 degrees, swept along track so the slant range
/// stays nearly constant across the fan, rolled 28.2 degrees off nadir.
fn correction_sensor(name: &str) -> locate::LineSensor {
    line_sensor(name, 400, 10.0f64.to_radians(), 28.2f64.to_radians(), FanAxis::AlongTrack)
}

fn locator_with_corrections(light_time: bool, aberration: bool) -> locate::Locator {
    let updater = Arc::new(ConstantTerrainUpdater { elevation: 0.0 });
    build_locator(
        correction_sensor("correction"),
        updater,
        AlgorithmId::Duvenhage,
        light_time,
        aberration,
    )
}

#[test]
fn light_time_correction_magnitude() {
    let with = locator_with_corrections(true, false);
    let without = locator_with_corrections(false, false);

    let corrected = with.direct_location_line("correction", 200.0).unwrap();
    let raw = without.direct_location_line("correction", 200.0).unwrap();

    let ellipsoid = wgs84();
    for (c, r) in corrected.iter().zip(&raw) {
        let distance = ground_distance(&ellipsoid, c, r);
        assert!(
            (1.23..=1.27).contains(&distance),
            "light time displacement {distance} m out of range"
        );
    }
}

#[test]
fn aberration_of_light_correction_magnitude() {
    let with = locator_with_corrections(false, true);
    let without = locator_with_corrections(false, false);

    let corrected = with.direct_location_line("correction", 200.0).unwrap();
    let raw = without.direct_location_line("correction", 200.0).unwrap();

    let ellipsoid = wgs84();
    for (c, r) in corrected.iter().zip(&raw) {
        let distance = ground_distance(&ellipsoid, c, r);
        assert!(
            (19.85..=20.65).contains(&distance),
            "aberration displacement {distance} m out of range"
        );
    }
}

#[test]
fn light_time_correction_grows_with_altitude() {
    let displacement_at = |extra_altitude: f64| -> f64 {
        let radius = orbit_radius() + extra_altitude;
        let build = |light_time: bool| {
            LocatorBuilder::new()
                .ellipsoid(wgs84())
                .trajectory(
                    circular_trajectory(radius),
                    Box::new(UniformlyRotatingBody::earth(t0(), 0.0)),
                    t0() - Duration::from_seconds(5.0),
                    t0() + Duration::from_seconds(10.0),
                    0.25,
                    0.1,
                )
                .algorithm(AlgorithmId::IgnoreDemUseEllipsoid)
                .light_time_correction(light_time)
                .aberration_of_light_correction(false)
                .add_sensor(correction_sensor("alt"))
                .build()
                .unwrap()
        };
        let with = build(true).direct_location_pixel("alt", 200.0, 200).unwrap();
        let without = build(false).direct_location_pixel("alt", 200.0, 200).unwrap();
        ground_distance(&wgs84(), &with, &without)
    };

    let low = displacement_at(0.0);
    let high = displacement_at(300_000.0);
    assert!(low > 0.5);
    assert!(high > low, "displacement {high} m at high orbit vs {low} m");
}

#[test]
fn corrections_vanish_when_disabled() {
    let a = locator_with_corrections(false, false);
    let b = locator_with_corrections(false, false);
    let ga = a.direct_location_line("correction", 200.0).unwrap();
    let gb = b.direct_location_line("correction", 200.0).unwrap();
    for (x, y) in ga.iter().zip(&gb) {
        assert_eq!(x.latitude.to_bits(), y.latitude.to_bits());
        assert_eq!(x.longitude.to_bits(), y.longitude.to_bits());
    }
}

#[test]
fn refraction_shifts_the_ground_point_slightly() {
    let updater = Arc::new(ConstantTerrainUpdater { elevation: 0.0 });
    let trajectory = circular_trajectory(orbit_radius());
    let refracted = LocatorBuilder::new()
        .ellipsoid(wgs84())
        .trajectory(
            trajectory,
            Box::new(UniformlyRotatingBody::earth(t0(), 0.0)),
            t0() - Duration::from_seconds(5.0),
            t0() + Duration::from_seconds(10.0),
            0.25,
            0.1,
        )
        .algorithm(AlgorithmId::Duvenhage)
        .digital_elevation_model(Arc::clone(&updater) as Arc<dyn dem::TileUpdater>, 12)
        .light_time_correction(false)
        .aberration_of_light_correction(false)
        .refraction(Box::new(MultiLayerModel::default_atmosphere()))
        .add_sensor(correction_sensor("refr"))
        .build()
        .unwrap();
    let straight = build_locator(
        correction_sensor("refr"),
        updater,
        AlgorithmId::Duvenhage,
        false,
        false,
    );

    let bent = refracted.direct_location_pixel("refr", 200.0, 398).unwrap();
    let raw = straight.direct_location_pixel("refr", 200.0, 398).unwrap();
    let distance = ground_distance(&wgs84(), &bent, &raw);
    assert!(
        (0.05..=50.0).contains(&distance),
        "refraction displacement {distance} m out of range"
    );

    // inverse location still converges near the observing pixel
    let pixel = refracted.inverse_location("refr", &bent, 0.0, 2000.0).unwrap().unwrap();
    assert!((pixel.line - 200.0).abs() < 0.5);
    assert!((pixel.pixel - 398.0).abs() < 0.5);
}
