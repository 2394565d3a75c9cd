use nalgebra::Vector3;

use crate::{
    Error, FrameId, GeodeticPoint, NormalizedGeodeticPoint, Result, constants, topocentric::topocentric_basis,
};

/// Reference ellipsoid selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EllipsoidId {
    Wgs84,
    Grs80,
    Iers96,
    Iers2003,
    /// Spherical body with the WGS84 equatorial radius, for comparison runs.
    Sphere,
}

/// An oblate ellipsoid of revolution attached to a rotating body frame.
///
/// All vectors accepted and returned by the intersection methods are
/// expressed in that body frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ellipsoid {
    equatorial_radius: f64,
    flattening: f64,
    polar_radius: f64,
    e2: f64,
    body_frame: FrameId,
}

// quadratic discriminants below this relative threshold are handled as
// tangent rays
const TANGENT_EPSILON: f64 = 1.0e-20;

impl Ellipsoid {
    pub fn new(id: EllipsoidId, body_frame: FrameId) -> Self {
        let (a, f) = match id {
            EllipsoidId::Wgs84 => (constants::WGS84_EQUATORIAL_RADIUS, constants::WGS84_FLATTENING),
            EllipsoidId::Grs80 => (constants::GRS80_EQUATORIAL_RADIUS, constants::GRS80_FLATTENING),
            EllipsoidId::Iers96 => (constants::IERS96_EQUATORIAL_RADIUS, constants::IERS96_FLATTENING),
            EllipsoidId::Iers2003 => (constants::IERS2003_EQUATORIAL_RADIUS, constants::IERS2003_FLATTENING),
            EllipsoidId::Sphere => (constants::WGS84_EQUATORIAL_RADIUS, 0.0),
        };
        Self::with_radii(a, f, body_frame)
    }

    pub fn with_radii(equatorial_radius: f64, flattening: f64, body_frame: FrameId) -> Self {
        Ellipsoid {
            equatorial_radius,
            flattening,
            polar_radius: equatorial_radius * (1.0 - flattening),
            e2: flattening * (2.0 - flattening),
            body_frame,
        }
    }

    pub fn equatorial_radius(&self) -> f64 {
        self.equatorial_radius
    }

    pub fn flattening(&self) -> f64 {
        self.flattening
    }

    pub fn polar_radius(&self) -> f64 {
        self.polar_radius
    }

    pub fn eccentricity_squared(&self) -> f64 {
        self.e2
    }

    pub fn body_frame(&self) -> FrameId {
        self.body_frame
    }

    /// Cartesian body-frame coordinates of a geodetic point.
    pub fn cartesian(&self, point: &GeodeticPoint) -> Vector3<f64> {
        let (sin_lat, cos_lat) = point.latitude.sin_cos();
        let (sin_lon, cos_lon) = point.longitude.sin_cos();

        let n = self.equatorial_radius / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
        let r = (n + point.altitude) * cos_lat;

        Vector3::new(
            r * cos_lon,
            r * sin_lon,
            ((1.0 - self.e2) * n + point.altitude) * sin_lat,
        )
    }

    /// Geodetic coordinates of a cartesian body-frame point.
    ///
    /// Uses the closed-form expansion of Olson (1996), which keeps round-trip
    /// errors below 1e-10 rad for any point of geolocation interest; points
    /// close to the body center have no geodetic representation and are
    /// rejected.
    pub fn geodetic(&self, p: &Vector3<f64>) -> Result<GeodeticPoint> {
        let w2 = p.x * p.x + p.y * p.y;
        let r2 = w2 + p.z * p.z;
        if r2 == 0.0 {
            return Err(Error::InvalidArgument(
                "point at the body center has no geodetic coordinates".into(),
            ));
        }
        if r2.sqrt() < 0.5 * self.polar_radius {
            return self.geodetic_iterative(p, w2);
        }

        let a = self.equatorial_radius;
        let e2 = self.e2;
        let a1 = a * e2;
        let a2 = a1 * a1;
        let a3 = a1 * e2 / 2.0;
        let a4 = 2.5 * a2;
        let a5 = a1 + a3;
        let a6 = 1.0 - e2;

        let zp = p.z.abs();
        let w = w2.sqrt();
        let r = r2.sqrt();

        let lon = p.y.atan2(p.x);
        let s2 = p.z * p.z / r2;
        let c2 = w2 / r2;
        let mut u = a2 / r;
        let mut v = a3 - a4 / r;

        let (s, c, ss, mut lat);
        if c2 > 0.3 {
            s = (zp / r) * (1.0 + c2 * (a1 + u + s2 * v) / r);
            lat = s.asin();
            ss = s * s;
            c = (1.0 - ss).sqrt();
        } else {
            c = (w / r) * (1.0 - s2 * (a5 - u - c2 * v) / r);
            lat = c.acos();
            ss = 1.0 - c * c;
            s = ss.sqrt();
        }

        let g = 1.0 - e2 * ss;
        let rg = a / g.sqrt();
        let rf = a6 * rg;
        u = w - rg * c;
        v = zp - rf * s;
        let f = c * u + s * v;
        let m = c * v - s * u;
        let q = m / (rf / g + f);

        lat += q;
        let alt = f + m * q / 2.0;
        if p.z < 0.0 {
            lat = -lat;
        }

        Ok(GeodeticPoint::new(lat, lon, alt))
    }

    /// Same as [`geodetic`](Self::geodetic), with the longitude normalized
    /// around `center`.
    pub fn geodetic_normalized(&self, p: &Vector3<f64>, center: f64) -> Result<NormalizedGeodeticPoint> {
        let gp = self.geodetic(p)?;
        Ok(NormalizedGeodeticPoint::new(gp.latitude, gp.longitude, gp.altitude, center))
    }

    // plain fixed-point iteration, only used deep inside the body where the
    // closed-form expansion loses accuracy
    fn geodetic_iterative(&self, p: &Vector3<f64>, w2: f64) -> Result<GeodeticPoint> {
        let w = w2.sqrt();
        let lon = p.y.atan2(p.x);
        let mut lat = p.z.atan2(w * (1.0 - self.e2));
        let mut alt = 0.0;
        for _ in 0..20 {
            let sin_lat = lat.sin();
            let n = self.equatorial_radius / (1.0 - self.e2 * sin_lat * sin_lat).sqrt();
            alt = if lat.cos().abs() > 1.0e-12 {
                w / lat.cos() - n
            } else {
                p.z.abs() - n * (1.0 - self.e2)
            };
            lat = p.z.atan2(w * (1.0 - self.e2 * n / (n + alt)));
        }
        Ok(GeodeticPoint::new(lat, lon, alt))
    }

    /// Point at altitude `h` along the line `p + s los`, choosing the
    /// crossing closest to `p`.
    ///
    /// The constant-altitude surface is approximated by the ellipsoid with
    /// both radii enlarged by `h`. Picking the closest crossing lets callers
    /// detect from the direction of the result that a surface lies behind
    /// them, which the terrain entry step relies on.
    pub fn point_at_altitude(&self, p: &Vector3<f64>, los: &Vector3<f64>, h: f64) -> Result<Vector3<f64>> {
        let ap2 = (self.equatorial_radius + h) * (self.equatorial_radius + h);
        let bp2 = (self.polar_radius + h) * (self.polar_radius + h);

        let alpha = (los.x * los.x + los.y * los.y) / ap2 + los.z * los.z / bp2;
        let beta = (p.x * los.x + p.y * los.y) / ap2 + p.z * los.z / bp2;
        let gamma = (p.x * p.x + p.y * p.y) / ap2 + p.z * p.z / bp2 - 1.0;

        let mut discriminant = beta * beta - alpha * gamma;
        if discriminant < 0.0 {
            if discriminant > -TANGENT_EPSILON * beta.max(1.0) * beta.max(1.0) {
                discriminant = 0.0;
            } else {
                return Err(Error::LineOfSightNeverCrossesAltitude(h));
            }
        }

        // stable quadratic roots
        let q = -(beta + beta.signum() * discriminant.sqrt());
        let (s1, s2) = if q != 0.0 {
            (q / alpha, gamma / q)
        } else {
            (0.0, 0.0)
        };

        let s = if s1.abs() <= s2.abs() { s1 } else { s2 };
        Ok(p + los * s)
    }

    /// Point at geodetic latitude `latitude` along the line `p + s los`,
    /// choosing among the (up to two) crossings of the iso-latitude cone the
    /// one closest to `close_reference`.
    pub fn point_at_latitude(
        &self,
        p: &Vector3<f64>,
        los: &Vector3<f64>,
        latitude: f64,
        close_reference: &Vector3<f64>,
    ) -> Result<Vector3<f64>> {
        // geocentric latitude of the ellipsoid surface point at this
        // geodetic latitude
        let psi = ((1.0 - self.e2) * latitude.tan()).atan();
        let (sin_psi, cos_psi) = psi.sin_cos();
        let c2 = cos_psi * cos_psi;
        let s2 = sin_psi * sin_psi;

        let a = los.z * los.z * c2 - (los.x * los.x + los.y * los.y) * s2;
        let b = p.z * los.z * c2 - (p.x * los.x + p.y * los.y) * s2;
        let c = p.z * p.z * c2 - (p.x * p.x + p.y * p.y) * s2;

        let s_ref = (close_reference - p).dot(los) / los.norm_squared();

        let scale = los.norm_squared().max(1.0);
        let mut candidates: [Option<f64>; 2] = [None, None];
        if a.abs() < 1.0e-12 * scale {
            // degenerate cone (equator, or line parallel to the cone)
            if b.abs() > 1.0e-12 * scale {
                candidates[0] = Some(-c / (2.0 * b));
            }
        } else {
            let mut discriminant = b * b - a * c;
            if discriminant < 0.0 {
                if discriminant > -TANGENT_EPSILON * b.max(1.0) * b.max(1.0) {
                    discriminant = 0.0;
                } else {
                    return Err(Error::LineOfSightNeverCrossesLatitude(latitude));
                }
            }
            let q = -(b + b.signum() * discriminant.sqrt());
            if q != 0.0 {
                candidates[0] = Some(q / a);
                candidates[1] = Some(c / q);
            } else {
                candidates[0] = Some(0.0);
            }
        }

        // reject the wrong cone nappe and keep the root closest to the
        // reference abscissa
        let mut best: Option<f64> = None;
        for s in candidates.into_iter().flatten() {
            let z = p.z + s * los.z;
            if latitude != 0.0 && z * latitude < 0.0 {
                continue;
            }
            match best {
                Some(b0) if (b0 - s_ref).abs() <= (s - s_ref).abs() => {}
                _ => best = Some(s),
            }
        }

        match best {
            Some(s) => Ok(p + los * s),
            None => Err(Error::LineOfSightNeverCrossesLatitude(latitude)),
        }
    }

    /// Point at longitude `longitude` along the line `p + s los`.
    pub fn point_at_longitude(&self, p: &Vector3<f64>, los: &Vector3<f64>, longitude: f64) -> Result<Vector3<f64>> {
        let (sin_lon, cos_lon) = longitude.sin_cos();
        let normal = Vector3::new(-sin_lon, cos_lon, 0.0);

        let den = los.dot(&normal);
        if den.abs() < 1.0e-12 * los.norm() {
            return Err(Error::LineOfSightNeverCrossesLongitude(longitude));
        }

        let s = -p.dot(&normal) / den;
        Ok(p + los * s)
    }

    /// Ground intersection of the line of sight, at altitude zero, with the
    /// longitude normalized around `center`.
    pub fn point_on_ground(
        &self,
        p: &Vector3<f64>,
        los: &Vector3<f64>,
        center: f64,
    ) -> Result<NormalizedGeodeticPoint> {
        let ground = self.point_at_altitude(p, los, 0.0)?;
        self.geodetic_normalized(&ground, center)
    }

    /// Converts a body-frame line of sight into derivatives of
    /// (longitude, latitude, altitude) along the line, at `origin`.
    ///
    /// The east and north projections are scaled by the local parallel and
    /// meridian curvature radii so the result can be composed directly with
    /// geodetic coordinates; the zenith projection is kept in meters.
    pub fn convert_los(&self, origin: &GeodeticPoint, los: &Vector3<f64>) -> Vector3<f64> {
        let (east, north, zenith) = topocentric_basis(origin);

        let sin_lat = origin.latitude.sin();
        let g = 1.0 - self.e2 * sin_lat * sin_lat;
        let n = self.equatorial_radius / g.sqrt();
        // radius of the local parallel and meridian curvature radius, both
        // at the origin altitude
        let r_parallel = (n + origin.altitude) * origin.latitude.cos();
        let r_meridian = n * (1.0 - self.e2) / g + origin.altitude;

        Vector3::new(
            los.dot(&east) / r_parallel,
            los.dot(&north) / r_meridian,
            los.dot(&zenith),
        )
    }

    /// Converts the direction from `primary` to `secondary` the same way as
    /// [`convert_los`](Self::convert_los).
    pub fn convert_los_between(&self, primary: &Vector3<f64>, secondary: &Vector3<f64>) -> Result<Vector3<f64>> {
        let origin = self.geodetic(primary)?;
        let los = (secondary - primary).normalize();
        Ok(self.convert_los(&origin, &los))
    }
}

#[cfg(test)]
mod tests {
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use std::f64::consts::PI;

    use super::*;

    fn wgs84() -> Ellipsoid {
        Ellipsoid::new(EllipsoidId::Wgs84, FrameId::ITRF)
    }

    #[test]
    fn derived_quantities() {
        let e = wgs84();
        assert_relative_eq!(e.polar_radius(), 6_356_752.314245, epsilon = 1e-5);
        assert_relative_eq!(e.eccentricity_squared(), 6.69437999014e-3, epsilon = 1e-12);
    }

    #[test]
    fn cartesian_geodetic_round_trip() {
        let e = wgs84();
        for &(lat, lon, alt) in &[
            (0.0, 0.0, 0.0),
            (0.7, -2.5, 2500.0),
            (-1.2, 3.0, 694_000.0),
            (1.5707, 0.1, -100.0),
            (-0.3, -3.1, 8848.0),
        ] {
            let gp = GeodeticPoint::new(lat, lon, alt);
            let back = e.geodetic(&e.cartesian(&gp)).unwrap();
            assert_abs_diff_eq!(back.latitude, lat, epsilon = 1e-10);
            assert_abs_diff_eq!(back.longitude, lon, epsilon = 1e-10);
            assert_abs_diff_eq!(back.altitude, alt, epsilon = 1e-4);
        }
    }

    #[test]
    fn center_is_rejected() {
        let e = wgs84();
        assert!(matches!(
            e.geodetic(&Vector3::zeros()),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn altitude_intersection_from_orbit() {
        let e = wgs84();
        let p = Vector3::new(e.equatorial_radius() + 694_000.0, 0.0, 0.0);
        let los = Vector3::new(-1.0, 0.0, 0.0);

        let ground = e.point_at_altitude(&p, &los, 0.0).unwrap();
        let gp = e.geodetic(&ground).unwrap();
        assert_abs_diff_eq!(gp.altitude, 0.0, epsilon = 1e-8);
        assert_abs_diff_eq!(gp.latitude, 0.0, epsilon = 1e-12);

        let high = e.point_at_altitude(&p, &los, 10_000.0).unwrap();
        let gp = e.geodetic(&high).unwrap();
        assert_abs_diff_eq!(gp.altitude, 10_000.0, epsilon = 1e-7);
        // the near crossing is the one in front of the spacecraft
        assert!((high - p).dot(&los) > 0.0);
    }

    #[test]
    fn altitude_miss_is_detected() {
        let e = wgs84();
        let p = Vector3::new(e.equatorial_radius() + 694_000.0, 0.0, 0.0);
        let los = Vector3::new(0.0, 0.0, 1.0);
        assert!(matches!(
            e.point_at_altitude(&p, &los, 0.0),
            Err(Error::LineOfSightNeverCrossesAltitude(_))
        ));
    }

    #[test]
    fn latitude_intersection_picks_reference_side() {
        let e = wgs84();
        let p = Vector3::new(e.equatorial_radius() + 694_000.0, 0.0, 100_000.0);
        let los = Vector3::new(-1.0, 0.0, -0.05).normalize();

        let target_lat = 0.005;
        let close = e.point_at_altitude(&p, &los, 0.0).unwrap();
        let pt = e.point_at_latitude(&p, &los, target_lat, &close).unwrap();

        // the returned point sits on the geocentric cone matching the
        // requested geodetic latitude, on the northern nappe
        let psi = ((1.0 - e.eccentricity_squared()) * target_lat.tan()).atan();
        let geocentric = pt.z.atan2((pt.x * pt.x + pt.y * pt.y).sqrt());
        assert_abs_diff_eq!(geocentric, psi, epsilon = 1e-9);
        assert!(pt.z > 0.0);
    }

    #[test]
    fn equatorial_cone_degenerates_to_plane() {
        let e = wgs84();
        let p = Vector3::new(e.equatorial_radius() + 694_000.0, 0.0, 50_000.0);
        let los = Vector3::new(-0.2, 0.0, -1.0).normalize();

        let pt = e.point_at_latitude(&p, &los, 0.0, &p).unwrap();
        assert_abs_diff_eq!(pt.z, 0.0, epsilon = 1e-6);
    }

    #[test]
    fn longitude_intersection() {
        let e = wgs84();
        let p = Vector3::new(e.equatorial_radius() + 694_000.0, -200_000.0, 0.0);
        let los = Vector3::new(-1.0, 0.5, 0.0).normalize();

        let lon = 0.01;
        let pt = e.point_at_longitude(&p, &los, lon).unwrap();
        let gp = e.geodetic(&pt).unwrap();
        assert_abs_diff_eq!(gp.longitude, lon, epsilon = 1e-12);

        // line parallel to the meridian plane never crosses it
        let parallel = Vector3::new(lon.cos(), lon.sin(), 0.0);
        assert!(matches!(
            e.point_at_longitude(&p, &parallel, lon),
            Err(Error::LineOfSightNeverCrossesLongitude(_))
        ));
    }

    #[test]
    fn converted_los_matches_geodetic_rates() {
        let e = wgs84();
        let gp = GeodeticPoint::new(0.6, 1.1, 1200.0);
        let p = e.cartesian(&gp);

        // step along an arbitrary slanted direction and compare the
        // geodetic increments with the converted rates
        let los = Vector3::new(-0.4, 0.7, -0.59).normalize();
        let rates = e.convert_los(&gp, &los);

        let step = 0.5;
        let moved = e.geodetic(&(p + los * step)).unwrap();
        assert_abs_diff_eq!(moved.longitude - gp.longitude, rates.x * step, epsilon = 1e-12);
        assert_abs_diff_eq!(moved.latitude - gp.latitude, rates.y * step, epsilon = 1e-12);
        assert_abs_diff_eq!(moved.altitude - gp.altitude, rates.z * step, epsilon = 1e-5);
    }

    #[test]
    fn ground_point_longitude_is_normalized() {
        let e = wgs84();
        let gp = GeodeticPoint::new(0.1, PI - 0.01, 0.0);
        let p = e.cartesian(&GeodeticPoint::new(0.1, PI - 0.01, 694_000.0));
        let los = (e.cartesian(&gp) - p).normalize();

        let ground = e.point_on_ground(&p, &los, PI).unwrap();
        assert!(ground.longitude() > PI - 0.02 && ground.longitude() < PI + 0.02);
    }
}
