// Machine domain model
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier from the closed set of machines configured at startup.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MachineId(String);

impl MachineId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for MachineId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for MachineId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

#[derive(Debug, Clone)]
pub struct Machine {
    pub id: MachineId,
    pub name: String,
}

impl Machine {
    pub fn new(id: MachineId) -> Self {
        let name = Self::format_name(id.as_str());
        Self { id, name }
    }

    fn format_name(id: &str) -> String {
        // Convert "M-3" to "Machine 3", leave anything else as-is
        match id.strip_prefix("M-") {
            Some(number) if !number.is_empty() => format!("Machine {}", number),
            _ => id.replace(['_', '-'], " "),
        }
    }
}

/// Random-walk position of one simulated machine.
///
/// Owned by the simulator; `anomaly_active == (anomaly_remaining_ticks > 0)`
/// holds between ticks.
#[derive(Debug, Clone, PartialEq)]
pub struct MachineState {
    pub temperature: f64,
    pub vibration: f64,
    pub anomaly_active: bool,
    pub anomaly_remaining_ticks: u32,
}

impl MachineState {
    pub fn new(temperature: f64, vibration: f64) -> Self {
        Self {
            temperature,
            vibration,
            anomaly_active: false,
            anomaly_remaining_ticks: 0,
        }
    }
}
