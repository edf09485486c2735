/// Utility functions for rounding, time and display formatting
use time::{format_description, OffsetDateTime};

use crate::models::{DerivedSample, FrostbiteRisk, GpsFix};

const UNKNOWN: &str = "N/A";

/// Round to a fixed number of decimal places
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

/// Current wall-clock time as fractional Unix seconds
pub fn now_seconds() -> f64 {
    OffsetDateTime::now_utc().unix_timestamp_nanos() as f64 / 1e9
}

/// Format a timestamp for human-readable logging
///
/// Converts an OffsetDateTime to DD.MM.YYYY - HH:MM:SS format
/// Falls back to default string representation if formatting fails.
pub fn format_datetime(dt: &OffsetDateTime) -> String {
    match format_description::parse("[day].[month].[year] - [hour]:[minute]:[second]") {
        Ok(format) => dt.format(&format).unwrap_or_else(|_| dt.to_string()),
        Err(_) => dt.to_string(),
    }
}

/// Finger temperature as shown on the dashboard (1 decimal)
pub fn format_temperature(value: Option<f64>) -> String {
    match value {
        Some(t) => format!("{:.1}°C", t),
        None => UNKNOWN.to_string(),
    }
}

/// Wrist temperature is already rounded to 2 decimals
pub fn format_wrist_temperature(value: Option<f64>) -> String {
    match value {
        Some(t) => format!("{:.2}°C", t),
        None => UNKNOWN.to_string(),
    }
}

/// Resultant followed by the raw axes, e.g. `51.96 (X: 30, Y: 30, Z: 30)`
pub fn format_vector(sample: Option<&DerivedSample>) -> String {
    match sample {
        Some(s) => format!(
            "{:.2} (X: {}, Y: {}, Z: {})",
            s.resultant, s.vector.x, s.vector.y, s.vector.z
        ),
        None => UNKNOWN.to_string(),
    }
}

/// `lat, lon, alt m` with 4/4/1 decimals
pub fn format_gps(fix: Option<&GpsFix>) -> String {
    match fix {
        Some(f) => format!(
            "{:.4}, {:.4}, {:.1} m",
            f.latitude, f.longitude, f.altitude
        ),
        None => UNKNOWN.to_string(),
    }
}

pub fn format_risk(risk: Option<FrostbiteRisk>) -> String {
    risk.map(|r| r.to_string())
        .unwrap_or_else(|| "Unknown".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Vector3;

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to(1.005_1, 2), 1.01);
        assert_eq!(round_to(-2.345_6, 2), -2.35);
        assert_eq!(round_to(3.870_732_386, 2), 3.87);
    }

    #[test]
    fn unknown_values_render_as_placeholder() {
        assert_eq!(format_temperature(None), "N/A");
        assert_eq!(format_gps(None), "N/A");
        assert_eq!(format_vector(None), "N/A");
        assert_eq!(format_risk(None), "Unknown");
    }

    #[test]
    fn known_values_use_dashboard_precision() {
        assert_eq!(format_temperature(Some(-3.26)), "-3.3°C");
        assert_eq!(format_wrist_temperature(Some(3.87)), "3.87°C");
        let fix = GpsFix {
            latitude: 45.123456,
            longitude: 25.654321,
            altitude: 1234.56,
        };
        assert_eq!(format_gps(Some(&fix)), "45.1235, 25.6543, 1234.6 m");
        let sample = DerivedSample {
            vector: Vector3 {
                x: 3.0,
                y: 4.0,
                z: 0.0,
            },
            resultant: 5.0,
        };
        assert_eq!(format_vector(Some(&sample)), "5.00 (X: 3, Y: 4, Z: 0)");
        assert_eq!(format_risk(Some(FrostbiteRisk::High)), "High");
    }

    #[test]
    fn datetime_has_day_first_layout() {
        let dt = OffsetDateTime::from_unix_timestamp(0).unwrap();
        assert_eq!(format_datetime(&dt), "01.01.1970 - 00:00:00");
    }
}
