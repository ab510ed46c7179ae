//! crates/crm_core/src/geo.rs
//!
//! Great-circle distance for office geofencing.

use crate::domain::Office;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Haversine distance in meters between two (latitude, longitude) points in degrees.
pub fn haversine_distance(lat1: f64, lon1: f64, lat2: f64, lon2: f64) -> f64 {
    let d_lat = (lat2 - lat1).to_radians();
    let d_lon = (lon2 - lon1).to_radians();
    let a = (d_lat / 2.0).sin().powi(2)
        + lat1.to_radians().cos() * lat2.to_radians().cos() * (d_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().atan2((1.0 - a).sqrt());
    EARTH_RADIUS_METERS * c
}

/// Outcome of testing a position against an office's geofence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeofenceCheck {
    pub distance_meters: f64,
    pub inside: bool,
}

impl Office {
    pub fn check_position(&self, latitude: f64, longitude: f64) -> GeofenceCheck {
        let distance_meters = haversine_distance(self.latitude, self.longitude, latitude, longitude);
        GeofenceCheck {
            distance_meters,
            inside: distance_meters <= self.radius_meters,
        }
    }
}

/// Rejects coordinates outside the valid degree ranges.
pub fn valid_coordinates(latitude: f64, longitude: f64) -> bool {
    latitude.is_finite()
        && longitude.is_finite()
        && (-90.0..=90.0).contains(&latitude)
        && (-180.0..=180.0).contains(&longitude)
}
