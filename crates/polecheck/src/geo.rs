//! Great-circle distance between GPS fixes.

use serde::Serialize;

/// Mean Earth radius in meters.
pub const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// A GPS fix in decimal degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// Haversine distance in meters.
pub fn haversine_m(a: GeoPoint, b: GeoPoint) -> f64 {
    let (phi1, phi2) = (a.lat.to_radians(), b.lat.to_radians());
    let (delta_phi, delta_lambda) = ((b.lat - a.lat).to_radians(), (b.lon - a.lon).to_radians());
    let h = (delta_phi / 2.0).sin().powi(2)
        + phi1.cos() * phi2.cos() * (delta_lambda / 2.0).sin().powi(2);
    // Rounding can push h a hair outside [0, 1] for antipodal points.
    let h = h.clamp(0.0, 1.0);
    2.0 * EARTH_RADIUS_M * h.sqrt().atan2((1.0 - h).sqrt())
}

/// Parse one coordinate. Rejects empty, non-numeric and non-finite text.
pub fn parse_coordinate(raw: &str) -> Option<f64> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    trimmed.parse::<f64>().ok().filter(|v| v.is_finite())
}

pub fn parse_latitude(raw: &str) -> Option<f64> {
    parse_coordinate(raw).filter(|v| (-90.0..=90.0).contains(v))
}

pub fn parse_longitude(raw: &str) -> Option<f64> {
    parse_coordinate(raw).filter(|v| (-180.0..=180.0).contains(v))
}

/// Distance between two textual fixes. `None` if any coordinate is unusable.
pub fn distance_m(lat1: &str, lon1: &str, lat2: &str, lon2: &str) -> Option<f64> {
    let a = GeoPoint::new(parse_latitude(lat1)?, parse_longitude(lon1)?);
    let b = GeoPoint::new(parse_latitude(lat2)?, parse_longitude(lon2)?);
    Some(haversine_m(a, b))
}

/// Largest distance between any two fixes.
///
/// `None` with no fixes, `Some(0.0)` with exactly one.
pub fn max_pairwise_distance(fixes: &[GeoPoint]) -> Option<f64> {
    if fixes.is_empty() {
        return None;
    }
    let mut max = 0.0_f64;
    for (i, a) in fixes.iter().enumerate() {
        for b in &fixes[i + 1..] {
            max = max.max(haversine_m(*a, *b));
        }
    }
    Some(max)
}
