use crate::models::GeoPoint;

/// Mean Earth radius used by the haversine formula.
pub const EARTH_RADIUS_KM: f64 = 6371.0;

const MPS_TO_KMH: f64 = 3.6;

/// Great-circle distance between two points in kilometres (haversine).
pub fn distance_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let d_lat = (b.lat - a.lat).to_radians();
    let d_lon = (b.lon - a.lon).to_radians();
    let lat1 = a.lat.to_radians();
    let lat2 = b.lat.to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h past 1 for near-antipodal points
    let h = h.clamp(0.0, 1.0);
    let c = 2.0 * h.sqrt().atan2((1.0 - h).sqrt());
    EARTH_RADIUS_KM * c
}

/// Initial compass bearing from `from` to `to` in degrees [0, 360).
/// Clockwise from north. Meaningless but finite when both points coincide.
pub fn bearing_degrees(from: GeoPoint, to: GeoPoint) -> f64 {
    let lat1 = from.lat.to_radians();
    let lat2 = to.lat.to_radians();
    let d_lon = (to.lon - from.lon).to_radians();

    let y = d_lon.sin() * lat2.cos();
    let x = lat1.cos() * lat2.sin() - lat1.sin() * lat2.cos() * d_lon.cos();
    normalize_angle(y.atan2(x).to_degrees())
}

/// Map any angle onto [0, 360).
pub fn normalize_angle(angle: f64) -> f64 {
    let wrapped = angle.rem_euclid(360.0);
    // rem_euclid rounds tiny negative inputs up to exactly 360
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Signed shortest-path difference `a - b` in degrees (-180, 180].
pub fn angular_difference(a: f64, b: f64) -> f64 {
    let d = normalize_angle(a - b);
    if d > 180.0 {
        d - 360.0
    } else {
        d
    }
}

/// Bearing of a target as seen from the vehicle frame: 0 means dead ahead,
/// 90 to the right, 270 to the left. `offset` rotates the dial face.
pub fn relative_bearing(bearing: f64, heading: f64, offset: f64) -> f64 {
    normalize_angle(bearing - heading + offset)
}

pub fn mps_to_kmh(speed: f64) -> f64 {
    speed * MPS_TO_KMH
}
