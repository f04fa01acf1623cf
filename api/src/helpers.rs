//! Presentation rounding for values leaving the API.
//!
//! The engine keeps full `f64` precision; rounding happens only when a
//! response body is built:
//!
//! - `round_1dp`: distances (km)
//! - `opt_round_1dp`: temperature means (°C), where `None` is "no data"
//!
//! Non-finite means become `None` so that "no data" never turns into a number.

/// Round to 1 decimal place.
pub(crate) fn round_1dp(v: f64) -> f64 {
    round_to(v, 10.0)
}

/// Round an optional mean to 1 decimal place, mapping non-finite values to `None`.
pub(crate) fn opt_round_1dp(v: Option<f64>) -> Option<f64> {
    v.filter(|x| x.is_finite()).map(round_1dp)
}

fn round_to(v: f64, scale: f64) -> f64 {
    if !v.is_finite() {
        tracing::warn!("round_to received non-finite value {}", v);
        return v;
    }
    let rounded = (v * scale).round() / scale;
    // Avoid serializing "-0.0".
    if rounded == 0.0 {
        0.0
    } else {
        rounded
    }
}
