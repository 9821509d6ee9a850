use serde::{Deserialize, Serialize};

const EARTH_RADIUS_IN_KM: f64 = 6371.0;

/// A point on the globe, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinates {
    pub fn new(lat: f64, lng: f64) -> Self {
        Self { lat, lng }
    }

    /// Great-circle distance using the haversine formula
    pub fn distance_in_km(&self, other: &Coordinates) -> f64 {
        let (lat1, lat2) = (self.lat.to_radians(), other.lat.to_radians());
        let d_lat = (other.lat - self.lat).to_radians();
        let d_lng = (other.lng - self.lng).to_radians();

        let a = (d_lat / 2.).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.).sin().powi(2);

        2. * EARTH_RADIUS_IN_KM * a.sqrt().asin()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_point_is_zero() {
        let bangalore = Coordinates::new(12.9716, 77.5946);
        assert!(bangalore.distance_in_km(&bangalore) < 1e-9);
    }

    #[test]
    fn known_distance() {
        let bangalore = Coordinates::new(12.9716, 77.5946);
        let chennai = Coordinates::new(13.0827, 80.2707);

        let distance = bangalore.distance_in_km(&chennai);
        assert!((285.0..295.0).contains(&distance), "{distance}");
    }
}
