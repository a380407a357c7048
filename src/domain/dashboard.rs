// Dashboard domain model
use super::machine::Machine;
use super::telemetry::{MachineStatus, Sample, TrendPoint};
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct LiveStatus {
    pub latest: Sample,
    pub status: MachineStatus,
    pub throughput_per_hour: f64,
    pub critical_cycles: u64,
    pub estimated_downtime: Duration,
}

/// Root-cause view of the hottest reading of the day.
#[derive(Debug, Clone)]
pub struct PeakAnalysis {
    pub peak: Sample,
    pub status: MachineStatus,
    pub window: Vec<Sample>,
}

#[derive(Debug, Clone)]
pub enum DashboardState {
    WaitingForData,
    Live(LiveStatus),
}

#[derive(Debug, Clone)]
pub struct Dashboard {
    pub machine: Machine,
    pub history_hours: u32,
    pub state: DashboardState,
    pub trend: Vec<TrendPoint>,
    pub peak: Option<PeakAnalysis>,
}

impl Dashboard {
    pub fn new(
        machine: Machine,
        history_hours: u32,
        state: DashboardState,
        trend: Vec<TrendPoint>,
        peak: Option<PeakAnalysis>,
    ) -> Self {
        Self {
            machine,
            history_hours,
            state,
            trend,
            peak,
        }
    }

    #[cfg(test)]
    pub fn waiting_for_data(machine: Machine, history_hours: u32) -> Self {
        Self::new(machine, history_hours, DashboardState::WaitingForData, Vec::new(), None)
    }
}
