// src/geo.rs
//! Great-circle helpers on a spherical earth

use crate::gps::data::Coordinate;

/// Mean earth radius in meters
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Haversine distance in meters between two coordinates
pub fn haversine_distance(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    // Rounding can push h a hair above 1 for antipodal points
    2.0 * EARTH_RADIUS_M * h.sqrt().min(1.0).asin()
}

/// Forward azimuth from `a` to `b` in degrees, 0 = north, in [0, 360)
pub fn bearing(a: Coordinate, b: Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let y = dlon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * dlon.cos();
    let degrees = y.atan2(x).to_degrees().rem_euclid(360.0);
    // rem_euclid can return 360.0 for tiny negative inputs
    if degrees >= 360.0 {
        0.0
    } else {
        degrees
    }
}
