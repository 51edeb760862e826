//! # Geofence Distance
//!
//! Great-circle distance between two WGS-84 coordinates using the haversine
//! formula on a spherical Earth.
//!
//! **Earth radius**: 6,371,000 m (mean radius)

use serde::Serialize;

/// Mean Earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A geographic position in decimal degrees
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    #[must_use]
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }

    /// Distance in meters to another point
    #[must_use]
    pub fn distance_to(&self, other: &GeoPoint) -> f64 {
        distance(self.lat, self.lon, other.lat, other.lon)
    }
}

/// Calculate great-circle distance in meters (haversine)
///
/// # Arguments
///
/// * `lat1`, `lon1` - First position in degrees
/// * `lat2`, `lon2` - Second position in degrees
///
/// # Returns
///
/// * `f64` - Distance in meters, exactly `0.0` for identical points
///
/// # Examples
///
/// ```
/// use drone_safety::geofence::distance;
///
/// // One degree of latitude is roughly 111 km
/// let d = distance(0.0, 0.0, 1.0, 0.0);
/// assert!((d - 111_194.9).abs() < 1.0);
/// ```
#[must_use]
pub fn distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    // Rounding can push `a` past 1 for near-antipodal pairs
    let a = a.clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_M * c
}

#[cfg(test)]
mod tests {
    use super::*;

    const BANGKOK: GeoPoint = GeoPoint { lat: 13.7563, lon: 100.5018 };

    #[test]
    fn test_same_point_is_zero() {
        for &(lat, lon) in &[
            (0.0, 0.0),
            (13.7563, 100.5018),
            (-33.8688, 151.2093),
            (89.9999, -179.9999),
            (-90.0, 180.0),
        ] {
            assert_eq!(distance(lat, lon, lat, lon), 0.0, "({}, {})", lat, lon);
        }
    }

    #[test]
    fn test_symmetry() {
        let pairs = [
            ((13.7563, 100.5018), (13.7570, 100.5030)),
            ((51.5074, -0.1278), (40.7128, -74.0060)),
            ((-33.8688, 151.2093), (35.6762, 139.6503)),
        ];

        for ((lat1, lon1), (lat2, lon2)) in pairs {
            assert_eq!(
                distance(lat1, lon1, lat2, lon2),
                distance(lat2, lon2, lat1, lon1)
            );
        }
    }

    #[test]
    fn test_one_degree_latitude() {
        let expected = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;
        let d = distance(10.0, 20.0, 11.0, 20.0);
        assert!((d - expected).abs() < 1e-6, "got {}", d);
    }

    #[test]
    fn test_antipodal_points() {
        let d = distance(0.0, 0.0, 0.0, 180.0);
        let half_circumference = EARTH_RADIUS_M * std::f64::consts::PI;
        assert!((d - half_circumference).abs() < 1e-3);
    }

    #[test]
    fn test_near_antipodal_sweep_is_finite() {
        let half_circumference = EARTH_RADIUS_M * std::f64::consts::PI;

        for i in 0..2000 {
            let lat = -89.0 + 178.0 * f64::from(i) / 1999.0;
            let d = distance(lat, 10.0, -lat, -170.0);
            assert!(d.is_finite(), "NaN at latitude {}", lat);
            assert!((d - half_circumference).abs() < 1.0, "latitude {}: got {}", lat, d);
        }
    }

    #[test]
    fn test_short_hop_near_home() {
        // ~0.0009 degrees of latitude is about 100 m
        let nearby = GeoPoint::new(BANGKOK.lat + 0.0009, BANGKOK.lon);
        let d = BANGKOK.distance_to(&nearby);
        assert!((d - 100.08).abs() < 0.1, "got {}", d);
    }

    #[test]
    fn test_known_city_pair() {
        // London -> Paris, spherical model
        let d = distance(51.5074, -0.1278, 48.8566, 2.3522);
        assert!((d - 343_560.0).abs() < 1_000.0, "got {}", d);
    }
}
