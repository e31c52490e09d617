//! Approximate distance from signal strength.
//!
//! Uses the ratio of received signal strength to the beacon's calibrated TX
//! power (the RSSI expected at one metre). Close range follows `ratio^10`;
//! beyond one metre a fitted power curve takes over.

const COEFFICIENT: f64 = 0.42093;
const EXPONENT: f64 = 6.9476;
const INTERCEPT: f64 = 0.54992;

/// Estimate the distance to a beacon in metres.
///
/// `tx_power` is the calibrated RSSI at one metre and must be negative, as
/// must `rssi`. Returns `None` otherwise.
#[must_use]
pub fn estimate_distance(rssi: i16, tx_power: i8) -> Option<f64> {
    if rssi >= 0 || tx_power >= 0 {
        return None;
    }

    let ratio = f64::from(rssi) / f64::from(tx_power);
    if ratio < 1.0 {
        Some(ratio.powi(10))
    } else {
        Some(COEFFICIENT.mul_add(ratio.powf(EXPONENT), INTERCEPT))
    }
}
