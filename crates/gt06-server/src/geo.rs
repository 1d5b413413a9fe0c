//! Distance and heading helpers

const EARTH_RADIUS_M: f64 = 6_371_000.0;

/// Great-circle distance in meters between two (lat, lon) points
pub fn haversine_m(a: (f64, f64), b: (f64, f64)) -> f64 {
    let (lat1, lon1) = (a.0.to_radians(), a.1.to_radians());
    let (lat2, lon2) = (b.0.to_radians(), b.1.to_radians());
    let dlat = lat2 - lat1;
    let dlon = lon2 - lon1;

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}

/// Angle in degrees between segment `a -> b` and segment `b -> c`.
///
/// 0 means straight on, 180 a full reversal. Computed on a local
/// equirectangular projection around `b`; `None` if either segment has
/// zero length.
pub fn turn_angle_deg(a: (f64, f64), b: (f64, f64), c: (f64, f64)) -> Option<f64> {
    let scale = b.0.to_radians().cos();
    let project = |p: (f64, f64)| ((p.1 - b.1) * scale, p.0 - b.0);

    let (ax, ay) = project(a);
    let (cx, cy) = project(c);
    // b projects to the origin
    let (v1x, v1y) = (-ax, -ay);
    let (v2x, v2y) = (cx, cy);

    let n1 = v1x.hypot(v1y);
    let n2 = v2x.hypot(v2y);
    if n1 == 0.0 || n2 == 0.0 {
        return None;
    }
    let cos = ((v1x * v2x + v1y * v2y) / (n1 * n2)).clamp(-1.0, 1.0);
    Some(cos.acos().to_degrees())
}
