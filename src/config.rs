use bluer::Uuid;
use log::info;
use std::env;
use std::error::Error;
use std::str::FromStr;

use crate::decoding::framing::DEFAULT_MAX_LINE_BYTES;
use crate::models::TransportKind;
use crate::series::DEFAULT_HISTORY_CAPACITY;

// The firmware advertises the same UUID for the service and its data characteristic
pub const DEFAULT_SERVICE_UUID: &str = "19b10000-e8f2-537e-4f6c-d104768a1214";
pub const DEFAULT_CHARACTERISTIC_UUID: &str = "19b10000-e8f2-537e-4f6c-d104768a1214";
pub const DEFAULT_BAUD_RATE: u32 = 115_200;
const DEFAULT_SCAN_SECS: u64 = 20;
const DEFAULT_RECONNECT_SECS: u64 = 5;
const DEFAULT_SUMMARY_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct BleConfig {
    pub service_uuid: Uuid,
    pub characteristic_uuid: Uuid,
    pub scan_secs: u64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SerialConfig {
    /// Port path; the first enumerated port is used when unset
    pub port: Option<String>,
    pub baud_rate: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    pub transport: TransportKind,
    pub ble: BleConfig,
    pub serial: SerialConfig,
    pub history_capacity: usize,
    pub max_line_bytes: usize,
    pub reconnect_secs: u64,
    pub summary_secs: u64,
}

impl IngestConfig {
    pub fn new() -> Result<Self, Box<dyn Error>> {
        // Load environment variables
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build the configuration from any key/value source
    pub fn from_lookup<F>(lookup: F) -> Result<Self, Box<dyn Error>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let transport = parse_or(get("HIKE_TRANSPORT"), "HIKE_TRANSPORT", TransportKind::Ble)?;

        let ble = BleConfig {
            service_uuid: parse_uuid(get("HIKE_BLE_SERVICE_UUID"), DEFAULT_SERVICE_UUID)?,
            characteristic_uuid: parse_uuid(
                get("HIKE_BLE_CHARACTERISTIC_UUID"),
                DEFAULT_CHARACTERISTIC_UUID,
            )?,
            scan_secs: parse_or(get("HIKE_BLE_SCAN_SECS"), "HIKE_BLE_SCAN_SECS", DEFAULT_SCAN_SECS)?,
        };

        let serial = SerialConfig {
            port: get("HIKE_SERIAL_PORT"),
            baud_rate: parse_or(get("HIKE_SERIAL_BAUD"), "HIKE_SERIAL_BAUD", DEFAULT_BAUD_RATE)?,
        };

        let history_capacity = parse_or(
            get("HIKE_HISTORY_CAPACITY"),
            "HIKE_HISTORY_CAPACITY",
            DEFAULT_HISTORY_CAPACITY,
        )?;
        if history_capacity == 0 {
            return Err("HIKE_HISTORY_CAPACITY must be at least 1".into());
        }

        let max_line_bytes = parse_or(
            get("HIKE_MAX_LINE_BYTES"),
            "HIKE_MAX_LINE_BYTES",
            DEFAULT_MAX_LINE_BYTES,
        )?;
        if max_line_bytes == 0 {
            return Err("HIKE_MAX_LINE_BYTES must be at least 1".into());
        }

        let config = IngestConfig {
            transport,
            ble,
            serial,
            history_capacity,
            max_line_bytes,
            reconnect_secs: parse_or(
                get("HIKE_RECONNECT_SECS"),
                "HIKE_RECONNECT_SECS",
                DEFAULT_RECONNECT_SECS,
            )?,
            summary_secs: parse_or(get("HIKE_SUMMARY_SECS"), "HIKE_SUMMARY_SECS", DEFAULT_SUMMARY_SECS)?,
        };

        info!(
            "Transport: {}, history capacity: {}, max line: {} bytes",
            config.transport, config.history_capacity, config.max_line_bytes
        );

        Ok(config)
    }
}

fn parse_or<T>(value: Option<String>, key: &str, default: T) -> Result<T, Box<dyn Error>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .parse::<T>()
            .map_err(|e| format!("Invalid {} '{}': {}", key, raw, e).into()),
        None => Ok(default),
    }
}

fn parse_uuid(value: Option<String>, default: &str) -> Result<Uuid, Box<dyn Error>> {
    let raw = value.as_deref().unwrap_or(default);
    Uuid::parse_str(raw).map_err(|e| format!("Invalid UUID '{}': {}", raw, e).into())
}
