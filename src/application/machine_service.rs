// Machine service - Use case for listing the fleet and its current status
use crate::application::clock::Clock;
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::analytics::{classify, latest, Thresholds};
use crate::domain::machine::{Machine, MachineId};
use crate::domain::telemetry::{MachineStatus, Sample};
use anyhow::Context;
use std::sync::Arc;

/// Latest reading of one machine, if any.
#[derive(Debug, Clone)]
pub struct FleetEntry {
    pub machine: Machine,
    pub latest: Option<(Sample, MachineStatus)>,
}

#[derive(Clone)]
pub struct MachineService {
    store: Arc<dyn TelemetryStore>,
    clock: Arc<dyn Clock>,
    machines: Vec<MachineId>,
    thresholds: Thresholds,
}

impl MachineService {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        clock: Arc<dyn Clock>,
        machines: Vec<MachineId>,
        thresholds: Thresholds,
    ) -> Self {
        Self {
            store,
            clock,
            machines,
            thresholds,
        }
    }

    pub fn list_machines(&self) -> Vec<Machine> {
        self.machines.iter().cloned().map(Machine::new).collect()
    }

    pub fn find(&self, machine_id: &str) -> Option<Machine> {
        self.machines
            .iter()
            .find(|id| id.as_str() == machine_id)
            .cloned()
            .map(Machine::new)
    }

    /// Aggregate view over all machines, built from per-machine queries.
    /// Machines silent for the last `hours` report no latest reading.
    pub async fn fleet_overview(&self, hours: u32) -> anyhow::Result<Vec<FleetEntry>> {
        let since = self
            .clock
            .now()
            .checked_sub_signed(chrono::Duration::hours(i64::from(hours)));
        let mut entries = Vec::with_capacity(self.machines.len());
        for id in &self.machines {
            let samples = self
                .store
                .query(id, since, None)
                .await
                .with_context(|| format!("failed to query telemetry for {}", id))?;
            let latest = latest(&samples)
                .ok()
                .map(|s| (s.clone(), classify(s, &self.thresholds)));
            entries.push(FleetEntry {
                machine: Machine::new(id.clone()),
                latest,
            });
        }
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::testing::ManualClock;
    use crate::infrastructure::memory_store::InMemoryStore;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_fleet_overview_reports_waiting_machines() {
        let store = Arc::new(InMemoryStore::unbounded());
        let noon = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        store
            .append(vec![Sample::new(noon, MachineId::from("M-1"), 86.0, 3.0, 9, true)])
            .await
            .unwrap();

        let service = MachineService::new(
            store,
            Arc::new(ManualClock::new(noon + chrono::Duration::minutes(1))),
            vec![MachineId::from("M-1"), MachineId::from("M-2")],
            Thresholds::default(),
        );

        let fleet = service.fleet_overview(1).await.unwrap();
        assert_eq!(fleet.len(), 2);
        let (sample, status) = fleet[0].latest.clone().unwrap();
        assert_eq!(sample.temperature, 86.0);
        assert_eq!(status, MachineStatus::Critical);
        assert!(fleet[1].latest.is_none());
        assert_eq!(fleet[1].machine.name, "Machine 2");
    }

    #[tokio::test]
    async fn test_fleet_overview_with_unbounded_window() {
        let store = Arc::new(InMemoryStore::unbounded());
        let noon = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        store
            .append(vec![Sample::new(
                noon - chrono::Duration::days(30),
                MachineId::from("M-1"),
                70.0,
                3.0,
                15,
                false,
            )])
            .await
            .unwrap();

        let service = MachineService::new(
            store,
            Arc::new(ManualClock::new(noon)),
            vec![MachineId::from("M-1")],
            Thresholds::default(),
        );

        let fleet = service.fleet_overview(u32::MAX).await.unwrap();
        let (_, status) = fleet[0].latest.clone().unwrap();
        assert_eq!(status, MachineStatus::Normal);
    }

    #[test]
    fn test_find_only_known_machines() {
        let service = MachineService::new(
            Arc::new(InMemoryStore::unbounded()),
            Arc::new(ManualClock::new(Utc::now())),
            vec![MachineId::from("M-1")],
            Thresholds::default(),
        );
        assert!(service.find("M-1").is_some());
        assert!(service.find("M-7").is_none());
        assert_eq!(service.list_machines().len(), 1);
    }
}
