use std::fmt;
use std::str::FromStr;

/// One 3-axis sample (magnetometer, gyroscope or accelerometer)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Vector3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GpsFix {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
}

/// A decoded wire record.
///
/// Every group is optional: a group whose fields did not parse to finite
/// numbers is `None` while the rest of the record still applies.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Reading {
    pub magnetometer: Option<Vector3>,
    pub gyroscope: Option<Vector3>,
    pub accelerometer: Option<Vector3>,
    pub gps: Option<GpsFix>,
    pub satellites: Option<u32>,
    pub finger_temperature: Option<f64>,
    pub signal_strength: Option<f64>,
}

impl Reading {
    /// True when at least one group failed to parse
    pub fn is_partial(&self) -> bool {
        self.magnetometer.is_none()
            || self.gyroscope.is_none()
            || self.accelerometer.is_none()
            || self.gps.is_none()
            || self.satellites.is_none()
            || self.finger_temperature.is_none()
            || self.signal_strength.is_none()
    }
}

/// A 3-axis sample together with its resultant magnitude
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DerivedSample {
    pub vector: Vector3,
    pub resultant: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FrostbiteRisk {
    Low,
    Medium,
    High,
}

impl fmt::Display for FrostbiteRisk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            FrostbiteRisk::Low => "Low",
            FrostbiteRisk::Medium => "Medium",
            FrostbiteRisk::High => "High",
        };
        f.write_str(label)
    }
}

/// Signals that keep rolling series
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Signal {
    Temperature,
    Magnetometer,
    Gyroscope,
    Accelerometer,
}

impl Signal {
    pub const ALL: [Signal; 4] = [
        Signal::Temperature,
        Signal::Magnetometer,
        Signal::Gyroscope,
        Signal::Accelerometer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Signal::Temperature => "temperature",
            Signal::Magnetometer => "magnetometer",
            Signal::Gyroscope => "gyroscope",
            Signal::Accelerometer => "accelerometer",
        }
    }
}

/// Plotting point keyed by a synthetic, strictly increasing index
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SeriesPoint {
    pub index: u64,
    pub value: f64,
}

/// History sample keyed by wall-clock seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TimedSample {
    pub seconds: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransportKind {
    Ble,
    Serial,
}

impl fmt::Display for TransportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportKind::Ble => f.write_str("BLE"),
            TransportKind::Serial => f.write_str("Serial"),
        }
    }
}

impl FromStr for TransportKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ble" | "bluetooth" => Ok(TransportKind::Ble),
            "serial" | "uart" => Ok(TransportKind::Serial),
            other => Err(format!("unknown transport '{}'", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_kind_parses_aliases() {
        assert_eq!("BLE".parse::<TransportKind>(), Ok(TransportKind::Ble));
        assert_eq!(" serial ".parse::<TransportKind>(), Ok(TransportKind::Serial));
        assert!("usb".parse::<TransportKind>().is_err());
    }

    #[test]
    fn default_reading_is_partial() {
        assert!(Reading::default().is_partial());
    }
}
