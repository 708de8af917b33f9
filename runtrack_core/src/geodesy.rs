//! Great-circle distance and the running distance total.
//!
//! Distances use the Haversine formula on a sphere of radius
//! [`EARTH_RADIUS_M`]. All arithmetic is f64, angles in radians.

use runtrack_env::RoutePoint;

use crate::geofix::Segment;

/// Mean Earth radius used for all distance math (meters)
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two WGS84 coordinates (degrees).
///
/// ```text
/// a = sin²(Δφ/2) + cos φ1 · cos φ2 · sin²(Δλ/2)
/// d = 2R · atan2(√a, √(1−a))
/// ```
pub fn haversine_m(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    if lat1 == lat2 && lon1 == lon2 {
        return 0.0;
    }

    let phi1 = lat1.to_radians();
    let phi2 = lat2.to_radians();
    let d_phi = (lat2 - lat1).to_radians();
    let d_lambda = (lon2 - lon1).to_radians();

    let a = (d_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (d_lambda / 2.0).sin().powi(2);
    // Rounding can push `a` a hair past 1 for antipodal points
    let a = a.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * a.sqrt().atan2((1.0 - a).sqrt())
}

/// Haversine distance between two fixes.
pub fn distance_between(a: &RoutePoint, b: &RoutePoint) -> f64 {
    haversine_m(a.latitude, a.longitude, b.latitude, b.longitude)
}

/// Converts a fix into a `geo` point (x = longitude, y = latitude).
pub fn to_geo_point(p: &RoutePoint) -> geo::Point<f64> {
    geo::Point::new(p.longitude, p.latitude)
}

/// Running sum of usable segment lengths.
///
/// Only ever grows: segments are measured with a non-negative formula and
/// nothing is subtracted.
#[derive(Debug, Clone, Default)]
pub struct DistanceAccumulator {
    total_m: f64,
    segments: usize,
}

impl DistanceAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a usable segment and returns its length in meters.
    pub fn add_segment(&mut self, segment: &Segment) -> f64 {
        let d = distance_between(&segment.from, &segment.to);
        if d.is_finite() {
            self.total_m += d;
            self.segments += 1;
            d
        } else {
            0.0
        }
    }

    /// Total distance in meters.
    pub fn total_m(&self) -> f64 {
        self.total_m
    }

    /// Number of segments that contributed.
    pub fn segment_count(&self) -> usize {
        self.segments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use geo::HaversineDistance;
    use proptest::prelude::*;

    fn seg(a: (f64, f64), b: (f64, f64)) -> Segment {
        Segment {
            from: RoutePoint::new(a.0, a.1, 0),
            to: RoutePoint::new(b.0, b.1, 1000),
        }
    }

    #[test]
    fn test_identical_coordinates_are_zero() {
        assert_eq!(haversine_m(51.5, -0.12, 51.5, -0.12), 0.0);
        assert_eq!(haversine_m(0.0, 0.0, 0.0, 0.0), 0.0);
    }

    #[test]
    fn test_quarter_meridian() {
        // Equator to pole along a meridian is a quarter circumference
        let expected = std::f64::consts::PI * EARTH_RADIUS_M / 2.0;
        assert_relative_eq!(haversine_m(0.0, 0.0, 90.0, 0.0), expected, max_relative = 1e-9);
    }

    #[test]
    fn test_one_degree_longitude_at_equator() {
        let expected = EARTH_RADIUS_M * 1.0_f64.to_radians();
        assert_relative_eq!(haversine_m(0.0, 0.0, 0.0, 1.0), expected, max_relative = 1e-9);
    }

    #[test]
    fn test_matches_geo_crate_up_to_radius() {
        // geo uses the IUGG mean radius; only the scale may differ
        const GEO_MEAN_EARTH_RADIUS: f64 = 6_371_008.8;
        let a = RoutePoint::new(48.8566, 2.3522, 0);
        let b = RoutePoint::new(51.5074, -0.1278, 0);
        let ours = distance_between(&a, &b);
        let theirs = to_geo_point(&a).haversine_distance(&to_geo_point(&b));
        assert_relative_eq!(
            ours / EARTH_RADIUS_M,
            theirs / GEO_MEAN_EARTH_RADIUS,
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_small_reference_segments() {
        // ~15.7 m and ~11.1 m near the equator
        let d1 = haversine_m(0.0, 0.0, 0.0001, 0.0001);
        let d2 = haversine_m(0.0001, 0.0001, 0.0002, 0.0001);
        let r = EARTH_RADIUS_M * 0.0001_f64.to_radians();
        assert_relative_eq!(d1, r * 2.0_f64.sqrt(), max_relative = 1e-6);
        assert_relative_eq!(d2, r, max_relative = 1e-6);
    }

    #[test]
    fn test_accumulator_sums_segments() {
        let mut acc = DistanceAccumulator::new();
        let s1 = seg((0.0, 0.0), (0.0001, 0.0001));
        let s2 = seg((0.0001, 0.0001), (0.0002, 0.0001));
        let d1 = acc.add_segment(&s1);
        let d2 = acc.add_segment(&s2);
        assert_relative_eq!(acc.total_m(), d1 + d2);
        assert_eq!(acc.segment_count(), 2);
    }

    proptest! {
        #[test]
        fn prop_accumulated_distance_is_monotone(
            coords in prop::collection::vec((-60.0f64..60.0, -170.0f64..170.0), 2..40)
        ) {
            let mut acc = DistanceAccumulator::new();
            let mut expected = 0.0;
            let mut last_total = 0.0;
            for pair in coords.windows(2) {
                let s = seg(pair[0], pair[1]);
                expected += haversine_m(pair[0].0, pair[0].1, pair[1].0, pair[1].1);
                acc.add_segment(&s);
                prop_assert!(acc.total_m() >= last_total);
                last_total = acc.total_m();
            }
            prop_assert!((acc.total_m() - expected).abs() <= 1e-6 * expected.max(1.0));
        }
    }
}
