//! Numeric quantization applied at the wire boundary.
//!
//! All functions round half away from zero (`f64::round`), symmetrically for
//! negative values: `-0.05` becomes `-0.1` at one decimal place. A result of
//! negative zero is normalised to `0.0`. `None` stays `None`.

/// Decimal places kept for ground speed (knots).
pub const GROUND_SPEED_PLACES: i32 = 1;

/// Decimal places kept for track angle (degrees).
pub const TRACK_PLACES: i32 = 1;

/// Decimal places kept for latitude and longitude (degrees).
pub const COORDINATE_PLACES: i32 = 6;

/// Round ground speed to one decimal place.
pub fn ground_speed(value: Option<f64>) -> Option<f64> {
    value.map(|v| to_places(v, GROUND_SPEED_PLACES))
}

/// Round track angle to one decimal place.
pub fn track(value: Option<f64>) -> Option<f64> {
    value.map(|v| to_places(v, TRACK_PLACES))
}

/// Round a latitude or longitude to six decimal places.
pub fn coordinate(value: Option<f64>) -> Option<f64> {
    value.map(|v| to_places(v, COORDINATE_PLACES))
}

/// Scale a value to an integer count of `10^-places` units, rounding half
/// away from zero. Used by the binary codec so that it stores exactly the
/// quantity the text codec prints.
///
/// `None` for NaN, infinities, and values whose unit count does not fit an
/// `i64`.
pub fn to_units(value: f64, places: i32) -> Option<i64> {
    let scaled = (value * 10f64.powi(places)).round();
    // i64::MAX as f64 is 2^63, the first value that does not fit.
    if !scaled.is_finite() || scaled.abs() >= i64::MAX as f64 {
        return None;
    }
    Some(scaled as i64)
}

/// Inverse of [`to_units`].
pub fn from_units(units: i64, places: i32) -> f64 {
    normalise_zero(units as f64 / 10f64.powi(places))
}

fn to_places(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return value;
    }
    let scale = 10f64.powi(places);
    let scaled = value * scale;
    // Beyond 2^52 every f64 is already an integer at this scale.
    if scaled.abs() >= 4_503_599_627_370_496.0 {
        return value;
    }
    normalise_zero(scaled.round() / scale)
}

fn normalise_zero(value: f64) -> f64 {
    if value == 0.0 {
        0.0
    } else {
        value
    }
}
