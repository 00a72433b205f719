// Geographic coordinate value object

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.latitude.is_finite()
            && self.longitude.is_finite()
            && (-90.0..=90.0).contains(&self.latitude)
            && (-180.0..=180.0).contains(&self.longitude)
    }

    /// Haversine distance in meters.
    pub fn distance_meters(&self, other: &GeoPoint) -> f64 {
        let dlat = (other.latitude - self.latitude).to_radians();
        let dlon = (other.longitude - self.longitude).to_radians();
        let lat1 = self.latitude.to_radians();
        let lat2 = other.latitude.to_radians();
        let a = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
        let c = 2.0 * a.sqrt().atan2((1.0 - a).max(0.0).sqrt());
        EARTH_RADIUS_METERS * c
    }

    /// Latitude/longitude half-extents (degrees) of a box enclosing a circle
    /// of `radius_meters` around this point. Used to prefilter before the
    /// exact distance check.
    pub fn bounding_deltas(&self, radius_meters: f64) -> (f64, f64) {
        let lat_delta = (radius_meters / EARTH_RADIUS_METERS).to_degrees();
        let cos_lat = self.latitude.to_radians().cos().abs();
        let lon_delta = if cos_lat < 1e-9 {
            180.0
        } else {
            (lat_delta / cos_lat).min(180.0)
        };
        (lat_delta, lon_delta)
    }
}
