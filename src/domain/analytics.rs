// Windowed analytics over time-ordered samples
//
// Everything here is a pure function of its arguments. The only accumulator,
// `CriticalCycleCounter`, is owned by whoever drives the ticks.
use super::error::AnalyticsError;
use super::machine::MachineId;
use super::telemetry::{MachineStatus, Sample};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Status thresholds. Readings at or above a threshold fall into its tier.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct Thresholds {
    pub temperature_warning: f64,
    pub temperature_critical: f64,
    pub vibration_warning: f64,
    pub vibration_critical: f64,
}

impl Default for Thresholds {
    fn default() -> Self {
        Self {
            temperature_warning: 80.0,
            temperature_critical: 85.0,
            vibration_warning: 6.5,
            vibration_critical: 7.5,
        }
    }
}

/// The sample with the greatest timestamp. On equal timestamps the later
/// element of the sequence wins.
pub fn latest(samples: &[Sample]) -> Result<&Sample, AnalyticsError> {
    samples
        .iter()
        .max_by_key(|s| s.timestamp)
        .ok_or(AnalyticsError::EmptyInput)
}

pub fn classify(sample: &Sample, thresholds: &Thresholds) -> MachineStatus {
    if sample.temperature >= thresholds.temperature_critical
        || sample.vibration >= thresholds.vibration_critical
    {
        MachineStatus::Critical
    } else if sample.temperature >= thresholds.temperature_warning
        || sample.vibration >= thresholds.vibration_warning
    {
        MachineStatus::Warning
    } else {
        MachineStatus::Normal
    }
}

/// Hottest sample whose local calendar date in `tz` is `day`.
/// Ties go to the earliest timestamp.
pub fn daily_peak<'a, Tz: TimeZone>(
    samples: &'a [Sample],
    day: NaiveDate,
    tz: &Tz,
) -> Option<&'a Sample> {
    samples
        .iter()
        .filter(|s| s.timestamp.with_timezone(tz).date_naive() == day)
        .fold(None, |best: Option<&Sample>, s| match best {
            Some(b)
                if b.temperature > s.temperature
                    || (b.temperature == s.temperature && b.timestamp <= s.timestamp) =>
            {
                Some(b)
            }
            _ => Some(s),
        })
}

/// All samples within `radius` of `center` (inclusive on both ends),
/// in timestamp order.
pub fn context_window(
    samples: &[Sample],
    center: DateTime<Utc>,
    radius: chrono::Duration,
) -> Vec<Sample> {
    let mut window: Vec<Sample> = samples
        .iter()
        .filter(|s| (s.timestamp - center).abs() <= radius)
        .cloned()
        .collect();
    window.sort_by_key(|s| s.timestamp);
    window
}

/// Estimated time spent in CRITICAL: one full tick period per critical cycle.
///
/// This is an estimate, not measured downtime. A machine may have recovered
/// (or failed) at any point inside a tick.
pub fn estimate_downtime(critical_cycle_count: u64, tick_period: Duration) -> Duration {
    let nanos = tick_period
        .as_nanos()
        .saturating_mul(u128::from(critical_cycle_count));
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

/// Linear extrapolation of one interval's production to an hourly rate.
///
/// Not smoothed: a single degraded tick swings the estimate. Returns 0 for a
/// zero tick period.
pub fn estimate_throughput_per_hour(latest_units: u32, tick_period: Duration) -> f64 {
    let secs = tick_period.as_secs_f64();
    if secs <= 0.0 {
        return 0.0;
    }
    f64::from(latest_units) * (3600.0 / secs)
}

/// Per-machine count of ticks classified CRITICAL.
///
/// The machine set is fixed at construction, so recording never needs a lock.
#[derive(Debug, Default)]
pub struct CriticalCycleCounter {
    counts: HashMap<MachineId, AtomicU64>,
}

impl CriticalCycleCounter {
    pub fn new<'a>(machines: impl IntoIterator<Item = &'a MachineId>) -> Self {
        let counts = machines
            .into_iter()
            .map(|id| (id.clone(), AtomicU64::new(0)))
            .collect();
        Self { counts }
    }

    /// Count one cycle if `status` is CRITICAL. Unknown machines are ignored.
    pub fn record(&self, machine_id: &MachineId, status: MachineStatus) {
        if status != MachineStatus::Critical {
            return;
        }
        if let Some(count) = self.counts.get(machine_id) {
            count.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn count(&self, machine_id: &MachineId) -> u64 {
        self.counts
            .get(machine_id)
            .map(|c| c.load(Ordering::Relaxed))
            .unwrap_or(0)
    }
}
