/// Derived values computed from decoded readings
use crate::models::{DerivedSample, FrostbiteRisk, Vector3};
use crate::utils::round_to;

// Fitted finger -> wrist temperature model (5th order)
const WRIST_COEFFICIENTS: [f64; 6] = [
    0.0,
    6.67442699e-01,
    -1.61778992e-02,
    4.62979185e-03,
    -2.11631073e-04,
    2.87972154e-06,
];
const WRIST_INTERCEPT: f64 = 3.870732386468518;

const MEDIUM_RISK_FLOOR: f64 = -4.0;

/// Euclidean norm of a 3-axis sample, rounded to 2 decimal places
pub fn magnitude(x: f64, y: f64, z: f64) -> f64 {
    round_to((x * x + y * y + z * z).sqrt(), 2)
}

pub fn derive(vector: Vector3) -> DerivedSample {
    DerivedSample {
        vector,
        resultant: magnitude(vector.x, vector.y, vector.z),
    }
}

/// Estimate wrist temperature from finger temperature
///
/// Evaluates `intercept + sum(c_i * t^i)` for i in 1..=5 and rounds to
/// 2 decimals. The fit was made on roughly -20°C..30°C; values outside that
/// range are extrapolated as-is.
pub fn predicted_wrist_temperature(finger_temperature: f64) -> f64 {
    let estimate = WRIST_COEFFICIENTS
        .iter()
        .enumerate()
        .skip(1)
        .fold(WRIST_INTERCEPT, |acc, (power, coefficient)| {
            acc + coefficient * finger_temperature.powi(power as i32)
        });
    round_to(estimate, 2)
}

/// Classify finger temperature into a frostbite risk band
///
/// Boundaries: 0 is Low, -4 is High.
pub fn frostbite_risk(finger_temperature: f64) -> FrostbiteRisk {
    if finger_temperature >= 0.0 {
        FrostbiteRisk::Low
    } else if finger_temperature > MEDIUM_RISK_FLOOR {
        FrostbiteRisk::Medium
    } else {
        FrostbiteRisk::High
    }
}
