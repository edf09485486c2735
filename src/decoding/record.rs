/// Wire record decoding shared by the BLE and serial transports
use base64::{engine::general_purpose, Engine as _};
use log::debug;

use crate::error::RejectedRecord;
use crate::models::{GpsFix, Reading, Vector3};

// Wire record layout:
// magX,magY,magZ,gyroX,gyroY,gyroZ,accelX,accelY,accelZ,lat,lon,alt,sats,fingerTemp,rssi
pub const RECORD_FIELDS: usize = 15;

const MAGNETOMETER: usize = 0;
const GYROSCOPE: usize = 3;
const ACCELEROMETER: usize = 6;
const LATITUDE: usize = 9;
const LONGITUDE: usize = 10;
const ALTITUDE: usize = 11;
const SATELLITES: usize = 12;
const FINGER_TEMPERATURE: usize = 13;
const SIGNAL_STRENGTH: usize = 14;

/// Decode one comma-separated record
///
/// Fewer than 15 fields rejects the whole record. Past that point each
/// group is parsed on its own, so a garbled GPS fix leaves the temperature
/// and motion groups intact. Fields beyond the 15th are ignored.
pub fn decode(raw: &str) -> Result<Reading, RejectedRecord> {
    let fields: Vec<&str> = raw.split(',').map(str::trim).collect();
    if fields.len() < RECORD_FIELDS {
        return Err(RejectedRecord::Malformed {
            expected: RECORD_FIELDS,
            found: fields.len(),
        });
    }

    let reading = Reading {
        magnetometer: parse_vector(&fields, MAGNETOMETER),
        gyroscope: parse_vector(&fields, GYROSCOPE),
        accelerometer: parse_vector(&fields, ACCELEROMETER),
        gps: parse_gps(&fields),
        satellites: parse_count(fields[SATELLITES]),
        finger_temperature: parse_finite(fields[FINGER_TEMPERATURE]),
        signal_strength: parse_finite(fields[SIGNAL_STRENGTH]),
    };

    if reading.is_partial() {
        debug!("Partial record, some groups withheld: {:?}", raw);
    }

    Ok(reading)
}

/// Unwrap a BLE notification into record text
///
/// The device base64-encodes the same comma-separated record it writes to
/// the serial port.
pub fn notification_text(payload: &[u8]) -> Result<String, RejectedRecord> {
    let encoded = String::from_utf8_lossy(payload);
    let bytes = general_purpose::STANDARD
        .decode(encoded.trim().trim_end_matches('\0'))
        .map_err(|e| RejectedRecord::InvalidEncoding(e.to_string()))?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn parse_finite(field: &str) -> Option<f64> {
    field.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Leading decimal digits of `field`, so "7.0" or "7sat" still count as 7
fn parse_count(field: &str) -> Option<u32> {
    let digits = field.strip_prefix('+').unwrap_or(field);
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end].parse::<u32>().ok()
}

fn parse_vector(fields: &[&str], start: usize) -> Option<Vector3> {
    Some(Vector3 {
        x: parse_finite(fields[start])?,
        y: parse_finite(fields[start + 1])?,
        z: parse_finite(fields[start + 2])?,
    })
}

fn parse_gps(fields: &[&str]) -> Option<GpsFix> {
    Some(GpsFix {
        latitude: parse_finite(fields[LATITUDE])?,
        longitude: parse_finite(fields[LONGITUDE])?,
        altitude: parse_finite(fields[ALTITUDE])?,
    })
}
