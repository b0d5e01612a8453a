use super::Coordinate;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two coordinates, in meters.
pub fn distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat_a = a.latitude().to_radians();
    let lat_b = b.latitude().to_radians();
    let d_lat = (b.latitude() - a.latitude()).to_radians();
    let d_lon = (b.longitude() - a.longitude()).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1.0 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());

    EARTH_RADIUS_METERS * c
}

#[cfg(test)]
mod tests {
    use super::*;

    fn coord(lat: f64, lon: f64) -> Coordinate {
        Coordinate::new(lat, lon).unwrap()
    }

    #[test]
    fn zero_for_identical_points() {
        let points = [
            coord(0.0, 0.0),
            coord(-7.4503, 110.221),
            coord(89.9, -179.9),
            coord(-90.0, 180.0),
        ];
        for p in points {
            assert_eq!(distance(&p, &p), 0.0);
        }
    }

    #[test]
    fn symmetric() {
        let points = [
            coord(0.0, 0.0),
            coord(-7.4503, 110.221),
            coord(51.5007, -0.1246),
            coord(40.6892, -74.0445),
            coord(-33.8568, 151.2153),
            coord(89.0, 179.0),
        ];
        for a in &points {
            for b in &points {
                let ab = distance(a, b);
                let ba = distance(b, a);
                assert!((ab - ba).abs() < 1e-6, "{ab} != {ba}");
            }
        }
    }

    #[test]
    fn small_eastward_offsets_at_equator() {
        let origin = coord(0.0, 0.0);

        let far = distance(&origin, &coord(0.0, 0.0045));
        assert!(far > 500.0 && far < 505.0, "got {far}");

        let near = distance(&origin, &coord(0.0, 0.0044));
        assert!(near > 485.0 && near < 500.0, "got {near}");
    }

    #[test]
    fn antipodes_are_half_circumference() {
        let d = distance(&coord(0.0, 0.0), &coord(0.0, 180.0));
        let half = std::f64::consts::PI * EARTH_RADIUS_METERS;
        assert!((d - half).abs() < 1e-3);
    }
}
