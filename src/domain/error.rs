// Error taxonomy shared across layers
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AnalyticsError {
    /// No data exists yet for the requested scope. Callers branch on this
    /// ("waiting for data"), it is never fatal.
    #[error("no telemetry available for the requested scope")]
    EmptyInput,
}

/// Invalid startup configuration. Fatal: the driver refuses to start.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("no machines configured")]
    NoMachines,
    #[error("machine id {0:?} is configured more than once")]
    DuplicateMachine(String),
    #[error("machine id must not be empty")]
    EmptyMachineId,
    #[error("invalid thresholds: {0}")]
    InvalidThresholds(String),
    #[error("{0} must be positive")]
    NonPositive(&'static str),
    #[error("invalid range for {field}: {reason}")]
    InvalidRange { field: &'static str, reason: String },
    #[error("invalid utc offset {0:?}, expected +HH:MM or -HH:MM")]
    InvalidUtcOffset(String),
    #[error("invalid server address {0:?}")]
    InvalidServerAddr(String),
    #[error("the influx store backend requires an [influx] section")]
    MissingInfluxSettings,
}

/// Failure of a persistent store backend. Appends never partially succeed.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("failed to decode stored sample: {0}")]
    Decode(String),
}
