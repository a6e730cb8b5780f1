//! Great-circle distance

use crate::error::{Result, VisitrackError};

/// Mean Earth radius in kilometers
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Reject non-finite or out-of-range coordinates
pub fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !latitude.is_finite() || latitude.abs() > 90.0 {
        return Err(VisitrackError::InvalidInput(format!(
            "latitude must be within [-90, 90], got {}",
            latitude
        )));
    }
    if !longitude.is_finite() || longitude.abs() > 180.0 {
        return Err(VisitrackError::InvalidInput(format!(
            "longitude must be within [-180, 180], got {}",
            longitude
        )));
    }
    Ok(())
}

/// Haversine distance in kilometers between two points in decimal degrees
pub fn haversine_km(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();

    // Rounding can push `a` just past 1 for antipodal points
    let a = ((d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2))
    .clamp(0.0, 1.0);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());

    EARTH_RADIUS_KM * c
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_point_is_zero() {
        assert_eq!(haversine_km(37.5665, 126.9780, 37.5665, 126.9780), 0.0);
    }

    #[test]
    fn test_one_degree_latitude() {
        // One degree along a meridian is R * pi / 180
        let d = haversine_km(0.0, 0.0, 1.0, 0.0);
        let expected = EARTH_RADIUS_KM * std::f64::consts::PI / 180.0;
        assert!((d - expected).abs() < 1e-9);
    }

    #[test]
    fn test_symmetric() {
        let a = haversine_km(37.5665, 126.9780, 35.1796, 129.0756);
        let b = haversine_km(35.1796, 129.0756, 37.5665, 126.9780);
        assert!((a - b).abs() < 1e-9);
    }

    #[test]
    fn test_seoul_to_busan() {
        let d = haversine_km(37.5665, 126.9780, 35.1796, 129.0756);
        assert!(d > 320.0 && d < 330.0, "got {}", d);
    }

    #[test]
    fn test_short_hop() {
        let d = haversine_km(37.5665, 126.9780, 37.5669, 126.9784);
        assert!(d > 0.05 && d < 0.06, "got {}", d);
    }

    #[test]
    fn test_antipodal_is_half_circumference() {
        let d = haversine_km(0.0, 0.0, 0.0, 180.0);
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-6);
    }

    #[test]
    fn test_near_antipodal_pair_is_finite() {
        let d = haversine_km(-70.877, -178.544, 70.877, 1.456);
        assert!(d.is_finite());
        assert!((d - EARTH_RADIUS_KM * std::f64::consts::PI).abs() < 1e-3, "got {}", d);
    }

    #[test]
    fn test_validate_coordinates() {
        assert!(validate_coordinates(0.0, 0.0).is_ok());
        assert!(validate_coordinates(-90.0, 180.0).is_ok());
        assert!(validate_coordinates(90.0001, 0.0).is_err());
        assert!(validate_coordinates(0.0, 180.0001).is_err());
        assert!(validate_coordinates(f64::INFINITY, 0.0).is_err());
        assert!(validate_coordinates(0.0, f64::NAN).is_err());
    }
}
