// Telemetry simulator - Stateful random walk with injected anomaly episodes
use crate::domain::error::ConfigError;
use crate::domain::machine::{MachineId, MachineState};
use crate::domain::telemetry::Sample;
use crate::infrastructure::config::{CountRange, MachineSettings, SimulationSettings};
use chrono::{DateTime, Utc};
use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

/// Noise model shared by every machine.
struct DriftModel {
    settings: SimulationSettings,
    temperature_noise: Normal<f64>,
    vibration_noise: Normal<f64>,
}

/// What one machine produced during one tick.
struct Reading {
    temperature: f64,
    vibration: f64,
    units: u32,
    anomaly: bool,
}

impl DriftModel {
    fn new(settings: SimulationSettings) -> Result<Self, ConfigError> {
        let temperature_noise = Normal::new(0.0, settings.temperature_sigma).map_err(|e| {
            ConfigError::InvalidRange {
                field: "simulation.temperature_sigma",
                reason: e.to_string(),
            }
        })?;
        let vibration_noise = Normal::new(0.0, settings.vibration_sigma).map_err(|e| {
            ConfigError::InvalidRange {
                field: "simulation.vibration_sigma",
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            settings,
            temperature_noise,
            vibration_noise,
        })
    }

    fn initial_state(&self, machine: &MachineSettings, rng: &mut StdRng) -> MachineState {
        let s = &self.settings;
        let temperature = machine.baseline_temperature
            + symmetric_offset(rng, s.initial_temperature_spread);
        let vibration =
            machine.baseline_vibration + symmetric_offset(rng, s.initial_vibration_spread);
        MachineState::new(
            s.temperature_bounds.clamp(temperature),
            s.vibration_bounds.clamp(vibration),
        )
    }

    fn advance(&self, state: &mut MachineState, rng: &mut StdRng) -> Reading {
        let s = &self.settings;

        state.temperature += self.temperature_noise.sample(rng);
        state.vibration += self.vibration_noise.sample(rng);

        if !state.anomaly_active && rng.gen_bool(s.anomaly_probability) {
            state.anomaly_active = true;
            state.anomaly_remaining_ticks = draw_count(rng, s.anomaly_ticks);
        }

        // Every tick of an episode is flagged, including the one that starts it
        let in_episode = state.anomaly_active;
        if in_episode {
            state.temperature += rng.gen_range(
                s.anomaly_temperature_rise.min..=s.anomaly_temperature_rise.max,
            );
            state.vibration +=
                rng.gen_range(s.anomaly_vibration_rise.min..=s.anomaly_vibration_rise.max);
            state.anomaly_remaining_ticks = state.anomaly_remaining_ticks.saturating_sub(1);
            if state.anomaly_remaining_ticks == 0 {
                state.anomaly_active = false;
            }
        }

        state.temperature = s.temperature_bounds.clamp(state.temperature);
        state.vibration = s.vibration_bounds.clamp(state.vibration);

        // Production follows the flag as it stands after this tick's update
        let units = if state.anomaly_active {
            draw_count(rng, s.degraded_units)
        } else {
            draw_count(rng, s.normal_units)
        };

        Reading {
            temperature: s.temperature_bounds.clamp(round2(state.temperature)),
            vibration: s.vibration_bounds.clamp(round2(state.vibration)),
            units,
            anomaly: in_episode,
        }
    }
}

/// Advances every configured machine by one tick.
///
/// Machine state is private to the simulator; the only output is the
/// batch returned from [`TelemetrySimulator::tick`].
pub struct TelemetrySimulator {
    model: DriftModel,
    machines: Vec<(MachineId, MachineState)>,
    rng: StdRng,
}

impl TelemetrySimulator {
    pub fn new(
        machines: &[MachineSettings],
        settings: SimulationSettings,
    ) -> Result<Self, ConfigError> {
        if machines.is_empty() {
            return Err(ConfigError::NoMachines);
        }

        let mut rng = match settings.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let model = DriftModel::new(settings)?;
        let machines = machines
            .iter()
            .map(|m| (MachineId::new(m.id.as_str()), model.initial_state(m, &mut rng)))
            .collect();

        Ok(Self {
            model,
            machines,
            rng,
        })
    }

    /// Machine ids in the order every batch is produced.
    pub fn machine_ids(&self) -> impl Iterator<Item = &MachineId> {
        self.machines.iter().map(|(id, _)| id)
    }

    #[cfg(test)]
    pub fn state(&self, machine_id: &MachineId) -> Option<&MachineState> {
        self.machines
            .iter()
            .find(|(id, _)| id == machine_id)
            .map(|(_, state)| state)
    }

    /// One sample per machine, all stamped `now`, in configuration order.
    pub fn tick(&mut self, now: DateTime<Utc>) -> Vec<Sample> {
        let mut batch = Vec::with_capacity(self.machines.len());
        for (id, state) in self.machines.iter_mut() {
            let reading = self.model.advance(state, &mut self.rng);
            batch.push(Sample::new(
                now,
                id.clone(),
                reading.temperature,
                reading.vibration,
                reading.units,
                reading.anomaly,
            ));
        }
        batch
    }
}

fn symmetric_offset(rng: &mut StdRng, spread: f64) -> f64 {
    if spread > 0.0 {
        rng.gen_range(-spread..=spread)
    } else {
        0.0
    }
}

fn draw_count(rng: &mut StdRng, range: CountRange) -> u32 {
    rng.gen_range(range.min..=range.max)
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
