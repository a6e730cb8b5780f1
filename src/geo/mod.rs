//! Geofence matching
//!
//! Haversine distance plus nearest-site resolution for a GPS fix.

pub mod distance;
pub mod resolver;

pub use distance::{EARTH_RADIUS_KM, haversine_km, validate_coordinates};
pub use resolver::LocationResolver;
