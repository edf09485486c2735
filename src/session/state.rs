use std::fmt;

use crate::metrics::{derive, frostbite_risk, predicted_wrist_temperature};
use crate::models::{DerivedSample, FrostbiteRisk, GpsFix, Reading, Signal, TransportKind};
use crate::utils::round_to;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Disconnected,
    Connecting,
    Connected(TransportKind),
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionState::Disconnected => f.write_str("disconnected"),
            SessionState::Connecting => f.write_str("connecting"),
            SessionState::Connected(kind) => write!(f, "connected ({})", kind),
        }
    }
}

/// Latest known value of every reading group; `None` means unknown
#[derive(Debug, Clone, Default, PartialEq)]
pub struct LatestValues {
    pub magnetometer: Option<DerivedSample>,
    pub gyroscope: Option<DerivedSample>,
    pub accelerometer: Option<DerivedSample>,
    pub gps: Option<GpsFix>,
    pub satellites: Option<u32>,
    pub finger_temperature: Option<f64>,
    pub wrist_temperature: Option<f64>,
    pub frostbite_risk: Option<FrostbiteRisk>,
    pub signal_strength: Option<f64>,
}

impl LatestValues {
    /// Apply the groups present in `reading`, leaving absent ones untouched.
    ///
    /// Returns the values to append to each signal's series.
    pub fn apply(&mut self, reading: &Reading) -> Vec<(Signal, f64)> {
        let mut updates = Vec::with_capacity(Signal::ALL.len());

        if let Some(temperature) = reading.finger_temperature {
            // Displayed to one decimal; risk and wrist estimate follow the shown value
            let temperature = round_to(temperature, 1);
            self.finger_temperature = Some(temperature);
            self.wrist_temperature = Some(predicted_wrist_temperature(temperature));
            self.frostbite_risk = Some(frostbite_risk(temperature));
            updates.push((Signal::Temperature, temperature));
        }

        let vectors = [
            (Signal::Magnetometer, reading.magnetometer, &mut self.magnetometer),
            (Signal::Gyroscope, reading.gyroscope, &mut self.gyroscope),
            (Signal::Accelerometer, reading.accelerometer, &mut self.accelerometer),
        ];
        for (signal, vector, slot) in vectors {
            if let Some(vector) = vector {
                let sample = derive(vector);
                *slot = Some(sample);
                updates.push((signal, sample.resultant));
            }
        }

        if reading.gps.is_some() {
            self.gps = reading.gps;
        }
        if reading.satellites.is_some() {
            self.satellites = reading.satellites;
        }
        if reading.signal_strength.is_some() {
            self.signal_strength = reading.signal_strength;
        }

        updates
    }

    pub fn is_unknown(&self) -> bool {
        *self == LatestValues::default()
    }
}

/// Per-session ingestion counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IngestStats {
    pub records_applied: u64,
    pub records_rejected: u64,
    pub partial_records: u64,
    pub lines_filtered: u64,
    pub overflows: u64,
}

/// Read-only view handed to consumers
#[derive(Debug, Clone, PartialEq)]
pub struct SessionSnapshot {
    pub state: SessionState,
    pub latest: LatestValues,
    pub stats: IngestStats,
    pub last_error: Option<String>,
}
