//! Coordinate type and spherical distance helpers.

use serde::{Deserialize, Serialize};

const EARTH_RADIUS_METRES: f64 = 6_371_000.0;

/// A WGS84 latitude/longitude pair.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordinate {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }

    /// Whether the coordinate can be used for distance maths.
    ///
    /// Rejects non-finite values, out-of-range lat/lon, and the exact
    /// (0, 0) point, which recorders emit when they have no fix.
    pub fn is_usable(&self) -> bool {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return false;
        }
        if self.latitude.abs() > 90.0 || self.longitude.abs() > 180.0 {
            return false;
        }
        if self.latitude == 0.0 && self.longitude == 0.0 {
            return false;
        }
        true
    }

    /// Great-circle (haversine) distance to another coordinate, in metres.
    pub fn distance_from(&self, other: &Coordinate) -> f64 {
        let lat_a = self.latitude.to_radians();
        let lat_b = other.latitude.to_radians();
        let d_lat = (other.latitude - self.latitude).to_radians();
        let d_lon = (other.longitude - self.longitude).to_radians();

        let a = (d_lat / 2.0).sin().powi(2) + lat_a.cos() * lat_b.cos() * (d_lon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

        EARTH_RADIUS_METRES * c
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn distance_to_self_is_zero() {
        let coord = Coordinate::new(-37.8136, 144.9631);
        assert_eq!(coord.distance_from(&coord), 0.0);
    }

    #[test]
    fn known_pair_distance_is_close() {
        // Melbourne CBD to Southbank, roughly 1.4 km
        let a = Coordinate::new(-37.8136, 144.9631);
        let b = Coordinate::new(-37.8226, 144.9589);
        let distance = a.distance_from(&b);
        assert!(distance > 1_000.0 && distance < 1_200.0, "got {distance}");
    }

    #[test]
    fn short_distance_is_accurate() {
        // ~111m per 0.001 degrees of latitude
        let a = Coordinate::new(-37.8136, 144.9631);
        let b = Coordinate::new(-37.8146, 144.9631);
        let distance = a.distance_from(&b);
        assert!((distance - 111.0).abs() < 1.0, "got {distance}");
    }

    #[test]
    fn null_island_is_not_usable() {
        assert!(!Coordinate::new(0.0, 0.0).is_usable());
        assert!(Coordinate::new(0.0001, 0.0).is_usable());
    }

    #[test]
    fn out_of_range_is_not_usable() {
        assert!(!Coordinate::new(91.0, 0.0).is_usable());
        assert!(!Coordinate::new(0.0, 181.0).is_usable());
        assert!(!Coordinate::new(f64::NAN, 0.0).is_usable());
    }
}
