// Telemetry data domain models
use super::machine::MachineId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One telemetry reading for one machine at one tick.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub machine_id: MachineId,
    /// °C
    pub temperature: f64,
    /// mm/s
    pub vibration: f64,
    /// Units produced during the interval.
    pub units: u32,
    pub anomaly: bool,
}

impl Sample {
    pub fn new(
        timestamp: DateTime<Utc>,
        machine_id: MachineId,
        temperature: f64,
        vibration: f64,
        units: u32,
        anomaly: bool,
    ) -> Self {
        Self {
            timestamp,
            machine_id,
            temperature,
            vibration,
            units,
            anomaly,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MachineStatus {
    Normal,
    Warning,
    Critical,
}

/// A downsampled point for trend charts.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendPoint {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub vibration: f64,
}

impl TrendPoint {
    pub fn new(timestamp: DateTime<Utc>, temperature: f64, vibration: f64) -> Self {
        Self {
            timestamp,
            temperature,
            vibration,
        }
    }
}
