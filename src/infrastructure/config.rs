use crate::domain::analytics::Thresholds;
use crate::domain::error::ConfigError;
use crate::domain::machine::MachineId;
use chrono::FixedOffset;
use serde::Deserialize;
use std::collections::HashSet;
use std::net::SocketAddr;
use std::time::Duration;

const DEFAULT_CONFIG_FILE: &str = "config/telemetry";

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerSettings,
    pub machines: Vec<MachineSettings>,
    pub simulation: SimulationSettings,
    pub thresholds: Thresholds,
    pub analytics: AnalyticsSettings,
    pub store: StoreSettings,
    pub influx: Option<InfluxSettings>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            machines: default_machines(),
            simulation: SimulationSettings::default(),
            thresholds: Thresholds::default(),
            analytics: AnalyticsSettings::default(),
            store: StoreSettings::default(),
            influx: None,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerSettings {
    pub addr: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// One machine and the baseline its random walk starts from.
#[derive(Debug, Deserialize, Clone)]
pub struct MachineSettings {
    pub id: String,
    pub baseline_temperature: f64,
    pub baseline_vibration: f64,
}

impl MachineSettings {
    fn new(id: &str, baseline_temperature: f64, baseline_vibration: f64) -> Self {
        Self {
            id: id.to_string(),
            baseline_temperature,
            baseline_vibration,
        }
    }
}

fn default_machines() -> Vec<MachineSettings> {
    vec![
        MachineSettings::new("M-1", 68.0, 2.8),
        MachineSettings::new("M-2", 70.0, 3.1),
        MachineSettings::new("M-3", 72.0, 3.4),
        MachineSettings::new("M-4", 66.0, 2.6),
        MachineSettings::new("M-5", 74.0, 3.7),
    ]
}

/// Closed real interval `[min, max]`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    pub fn clamp(&self, value: f64) -> f64 {
        value.clamp(self.min, self.max)
    }

    pub fn contains(&self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if !self.min.is_finite() || !self.max.is_finite() || self.min > self.max {
            return Err(ConfigError::InvalidRange {
                field,
                reason: format!("[{}, {}] is not a finite, ordered interval", self.min, self.max),
            });
        }
        Ok(())
    }
}

/// Closed integer interval `[min, max]`.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
pub struct CountRange {
    pub min: u32,
    pub max: u32,
}

impl CountRange {
    pub const fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        if self.min > self.max {
            return Err(ConfigError::InvalidRange {
                field,
                reason: format!("min {} exceeds max {}", self.min, self.max),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct SimulationSettings {
    /// Fixed RNG seed; entropy-seeded when absent.
    pub seed: Option<u64>,
    pub tick_period_secs: f64,
    pub temperature_sigma: f64,
    pub vibration_sigma: f64,
    pub anomaly_probability: f64,
    pub anomaly_ticks: CountRange,
    pub anomaly_temperature_rise: Bounds,
    pub anomaly_vibration_rise: Bounds,
    pub temperature_bounds: Bounds,
    pub vibration_bounds: Bounds,
    pub normal_units: CountRange,
    pub degraded_units: CountRange,
    /// Half-width of the uniform offset applied to each baseline at startup.
    pub initial_temperature_spread: f64,
    pub initial_vibration_spread: f64,
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            seed: None,
            tick_period_secs: 5.0,
            temperature_sigma: 0.3,
            vibration_sigma: 0.1,
            anomaly_probability: 0.05,
            anomaly_ticks: CountRange::new(3, 7),
            anomaly_temperature_rise: Bounds::new(0.8, 1.5),
            anomaly_vibration_rise: Bounds::new(0.2, 0.6),
            temperature_bounds: Bounds::new(60.0, 95.0),
            vibration_bounds: Bounds::new(1.5, 9.0),
            normal_units: CountRange::new(12, 18),
            degraded_units: CountRange::new(5, 10),
            initial_temperature_spread: 2.0,
            initial_vibration_spread: 0.3,
        }
    }
}

impl SimulationSettings {
    pub fn tick_period(&self) -> Duration {
        Duration::from_secs_f64(self.tick_period_secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct AnalyticsSettings {
    /// Offset used to decide which calendar day a reading belongs to.
    pub utc_offset: String,
    pub context_radius_minutes: i64,
    pub history_hours: u32,
    pub max_trend_points: usize,
}

impl Default for AnalyticsSettings {
    fn default() -> Self {
        Self {
            utc_offset: "+05:30".to_string(),
            context_radius_minutes: 10,
            history_hours: 6,
            max_trend_points: 150,
        }
    }
}

impl AnalyticsSettings {
    pub fn context_radius(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.context_radius_minutes)
    }

    pub fn timezone(&self) -> Result<FixedOffset, ConfigError> {
        parse_utc_offset(&self.utc_offset)
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Influx,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub retention_hours: u32,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            retention_hours: 24,
        }
    }
}

impl StoreSettings {
    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.retention_hours))
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct InfluxSettings {
    pub host: String,
    pub token: String,
    pub database: String,
    pub retention_policy: String,
    #[serde(default = "default_measurement")]
    pub measurement: String,
}

fn default_measurement() -> String {
    "machine_telemetry".to_string()
}

impl AppConfig {
    pub fn machine_ids(&self) -> Vec<MachineId> {
        self.machines.iter().map(|m| MachineId::new(m.id.as_str())).collect()
    }

    pub fn server_addr(&self) -> Result<SocketAddr, ConfigError> {
        self.server
            .addr
            .parse()
            .map_err(|_| ConfigError::InvalidServerAddr(self.server.addr.clone()))
    }

    /// Reject anything that would make the simulator or analytics meaningless.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.machines.is_empty() {
            return Err(ConfigError::NoMachines);
        }
        let mut seen = HashSet::new();
        for machine in &self.machines {
            if machine.id.trim().is_empty() {
                return Err(ConfigError::EmptyMachineId);
            }
            if !seen.insert(machine.id.as_str()) {
                return Err(ConfigError::DuplicateMachine(machine.id.clone()));
            }
            if !machine.baseline_temperature.is_finite() || !machine.baseline_vibration.is_finite() {
                return Err(ConfigError::InvalidRange {
                    field: "machines.baseline",
                    reason: format!("baseline for {} is not finite", machine.id),
                });
            }
        }

        validate_thresholds(&self.thresholds)?;
        self.validate_simulation()?;

        if self.analytics.context_radius_minutes <= 0 {
            return Err(ConfigError::NonPositive("analytics.context_radius_minutes"));
        }
        if chrono::Duration::try_minutes(self.analytics.context_radius_minutes).is_none() {
            return Err(ConfigError::InvalidRange {
                field: "analytics.context_radius_minutes",
                reason: format!("{} minutes is out of range", self.analytics.context_radius_minutes),
            });
        }
        if self.analytics.history_hours == 0 {
            return Err(ConfigError::NonPositive("analytics.history_hours"));
        }
        if self.analytics.max_trend_points == 0 {
            return Err(ConfigError::NonPositive("analytics.max_trend_points"));
        }
        self.analytics.timezone()?;

        if self.store.retention_hours == 0 {
            return Err(ConfigError::NonPositive("store.retention_hours"));
        }
        if self.store.backend == StoreBackend::Influx && self.influx.is_none() {
            return Err(ConfigError::MissingInfluxSettings);
        }

        self.server_addr()?;
        Ok(())
    }

    fn validate_simulation(&self) -> Result<(), ConfigError> {
        let sim = &self.simulation;
        if !(sim.tick_period_secs.is_finite() && sim.tick_period_secs > 0.0) {
            return Err(ConfigError::NonPositive("simulation.tick_period_secs"));
        }
        match Duration::try_from_secs_f64(sim.tick_period_secs) {
            Ok(period) if !period.is_zero() => {}
            _ => {
                return Err(ConfigError::InvalidRange {
                    field: "simulation.tick_period_secs",
                    reason: format!("{} seconds is not a usable tick period", sim.tick_period_secs),
                });
            }
        }
        for (field, sigma) in [
            ("simulation.temperature_sigma", sim.temperature_sigma),
            ("simulation.vibration_sigma", sim.vibration_sigma),
            ("simulation.initial_temperature_spread", sim.initial_temperature_spread),
            ("simulation.initial_vibration_spread", sim.initial_vibration_spread),
        ] {
            if !(sigma.is_finite() && sigma >= 0.0) {
                return Err(ConfigError::InvalidRange {
                    field,
                    reason: format!("{} must be a non-negative number", sigma),
                });
            }
        }
        if !(0.0..=1.0).contains(&sim.anomaly_probability) {
            return Err(ConfigError::InvalidRange {
                field: "simulation.anomaly_probability",
                reason: format!("{} is outside [0, 1]", sim.anomaly_probability),
            });
        }
        sim.anomaly_ticks.validate("simulation.anomaly_ticks")?;
        if sim.anomaly_ticks.min == 0 {
            return Err(ConfigError::NonPositive("simulation.anomaly_ticks.min"));
        }
        sim.anomaly_temperature_rise
            .validate("simulation.anomaly_temperature_rise")?;
        sim.anomaly_vibration_rise
            .validate("simulation.anomaly_vibration_rise")?;
        sim.temperature_bounds.validate("simulation.temperature_bounds")?;
        sim.vibration_bounds.validate("simulation.vibration_bounds")?;
        sim.normal_units.validate("simulation.normal_units")?;
        sim.degraded_units.validate("simulation.degraded_units")?;
        Ok(())
    }
}

fn validate_thresholds(t: &Thresholds) -> Result<(), ConfigError> {
    let values = [
        t.temperature_warning,
        t.temperature_critical,
        t.vibration_warning,
        t.vibration_critical,
    ];
    if values.iter().any(|v| !v.is_finite()) {
        return Err(ConfigError::InvalidThresholds(
            "thresholds must be finite".to_string(),
        ));
    }
    if t.temperature_warning > t.temperature_critical {
        return Err(ConfigError::InvalidThresholds(format!(
            "temperature warning {} exceeds critical {}",
            t.temperature_warning, t.temperature_critical
        )));
    }
    if t.vibration_warning > t.vibration_critical {
        return Err(ConfigError::InvalidThresholds(format!(
            "vibration warning {} exceeds critical {}",
            t.vibration_warning, t.vibration_critical
        )));
    }
    Ok(())
}

/// Parse `+HH:MM` / `-HH:MM` (or `Z`) into a fixed offset.
pub fn parse_utc_offset(raw: &str) -> Result<FixedOffset, ConfigError> {
    let invalid = || ConfigError::InvalidUtcOffset(raw.to_string());
    let raw_trimmed = raw.trim();
    if raw_trimmed.eq_ignore_ascii_case("z") || raw_trimmed.eq_ignore_ascii_case("utc") {
        return FixedOffset::east_opt(0).ok_or_else(invalid);
    }

    let (sign, rest) = match raw_trimmed.split_at_checked(1) {
        Some(("+", rest)) => (1, rest),
        Some(("-", rest)) => (-1, rest),
        _ => return Err(invalid()),
    };
    let (hours, minutes) = rest.split_once(':').ok_or_else(invalid)?;
    let hours: i32 = hours.parse().map_err(|_| invalid())?;
    let minutes: i32 = minutes.parse().map_err(|_| invalid())?;
    if !(0..=23).contains(&hours) || !(0..=59).contains(&minutes) {
        return Err(invalid());
    }

    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60)).ok_or_else(invalid)
}

/// Load from `$OEE_CONFIG` (or the optional `config/telemetry.*`), then
/// overlay `OEE__SECTION__KEY` environment variables.
pub fn load_app_config() -> anyhow::Result<AppConfig> {
    let file = match std::env::var("OEE_CONFIG") {
        Ok(path) => config::File::with_name(&path),
        Err(_) => config::File::with_name(DEFAULT_CONFIG_FILE).required(false),
    };
    load_with(file)
}

fn load_with(file: config::File<config::FileSourceFile, config::FileFormat>) -> anyhow::Result<AppConfig> {
    let settings = config::Config::builder()
        .add_source(file)
        .add_source(
            config::Environment::with_prefix("OEE")
                .separator("__")
                .try_parsing(true),
        )
        .build()?;

    Ok(settings.try_deserialize()?)
}
