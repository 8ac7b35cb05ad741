// src/geo.rs

use serde::{Deserialize, Serialize};

/// Mean Earth radius used for great-circle distances.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

/// Default number of fractional digits kept by privacy rounding (~1.1 km).
pub const DEFAULT_APPROX_DECIMALS: u32 = 2;

/// A latitude/longitude pair in degrees.
#[derive(Debug, Serialize, Deserialize, Clone, Copy, PartialEq)]
pub struct Coordinate {
    pub lat: f64,
    pub lng: f64,
}

impl Coordinate {
    /// Creates a new `Coordinate`. No range check is performed, see [`Coordinate::is_valid`].
    pub const fn new(lat: f64, lng: f64) -> Self {
        Coordinate { lat, lng }
    }

    /// Returns true if latitude is within [-90, 90] and longitude within [-180, 180].
    pub fn is_valid(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lng)
    }

    /// Great-circle distance to `other` in kilometres.
    pub fn distance_km(&self, other: &Coordinate) -> f64 {
        distance_km(*self, *other)
    }

    /// This coordinate rounded to `decimals` fractional digits.
    pub fn rounded(&self, decimals: u32) -> Coordinate {
        round_coordinate(*self, decimals)
    }
}

/// Great-circle distance between `a` and `b` in kilometres (haversine).
///
/// NaN inputs propagate to a NaN result.
pub fn distance_km(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();
    let dlat = (b.lat - a.lat).to_radians();
    let dlng = (b.lng - a.lng).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlng / 2.0).sin().powi(2);
    // Rounding can push h just past 1 for antipodal points.
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().asin();

    EARTH_RADIUS_KM * c
}

/// Rounds both components of `c` to `decimals` fractional digits, half away from zero.
pub fn round_coordinate(c: Coordinate, decimals: u32) -> Coordinate {
    let factor = 10f64.powi(decimals as i32);
    Coordinate {
        lat: (c.lat * factor).round() / factor,
        lng: (c.lng * factor).round() / factor,
    }
}
