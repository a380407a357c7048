// Dashboard service - Use case for building per-machine dashboards
use crate::application::clock::Clock;
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::analytics::{
    classify, context_window, daily_peak, estimate_downtime, estimate_throughput_per_hour, latest,
    CriticalCycleCounter, Thresholds,
};
use crate::domain::dashboard::{Dashboard, DashboardState, LiveStatus, PeakAnalysis};
use crate::domain::error::AnalyticsError;
use crate::domain::machine::{Machine, MachineId};
use crate::domain::telemetry::{MachineStatus, Sample, TrendPoint};
use anyhow::Context;
use chrono::{DateTime, FixedOffset, TimeZone, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Analytics knobs, resolved from configuration at startup.
#[derive(Debug, Clone)]
pub struct DashboardSettings {
    pub thresholds: Thresholds,
    pub timezone: FixedOffset,
    pub context_radius: chrono::Duration,
    pub tick_period: Duration,
    pub max_trend_points: usize,
    /// Trend window used when a caller does not ask for one.
    pub history_hours: u32,
}

#[derive(Clone)]
pub struct DashboardService {
    store: Arc<dyn TelemetryStore>,
    clock: Arc<dyn Clock>,
    critical_cycles: Arc<CriticalCycleCounter>,
    settings: DashboardSettings,
}

impl DashboardService {
    pub fn new(
        store: Arc<dyn TelemetryStore>,
        clock: Arc<dyn Clock>,
        critical_cycles: Arc<CriticalCycleCounter>,
        settings: DashboardSettings,
    ) -> Self {
        Self {
            store,
            clock,
            critical_cycles,
            settings,
        }
    }

    pub fn settings(&self) -> &DashboardSettings {
        &self.settings
    }

    pub async fn get_dashboard(&self, machine: Machine, hours: u32) -> anyhow::Result<Dashboard> {
        let now = self.clock.now();
        // A window reaching past the representable range covers everything
        let since = now.checked_sub_signed(chrono::Duration::hours(i64::from(hours)));

        let history = self
            .store
            .query(&machine.id, since, None)
            .await
            .with_context(|| format!("failed to query history for {}", machine.id))?;

        // Peak analysis looks at the whole local day, independent of `hours`
        let peak = self.peak_analysis(&machine.id, now).await?;

        let state = match self.live_status(&machine.id, &history) {
            Ok(status) => DashboardState::Live(status),
            Err(AnalyticsError::EmptyInput) => {
                tracing::debug!(machine_id = %machine.id, "No telemetry yet");
                DashboardState::WaitingForData
            }
        };

        let trend = downsample(&history, self.settings.max_trend_points);
        Ok(Dashboard::new(machine, hours, state, trend, peak))
    }

    /// Raw range query, passed through for export and charting.
    pub async fn samples(
        &self,
        machine_id: &MachineId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> anyhow::Result<Vec<Sample>> {
        self.store
            .query(machine_id, since, until)
            .await
            .with_context(|| format!("failed to query samples for {}", machine_id))
    }

    /// Status of a single reading, as the live stream reports it.
    pub fn classify(&self, sample: &Sample) -> MachineStatus {
        classify(sample, &self.settings.thresholds)
    }

    fn live_status(
        &self,
        machine_id: &MachineId,
        history: &[Sample],
    ) -> Result<LiveStatus, AnalyticsError> {
        let latest = latest(history)?;
        let critical_cycles = self.critical_cycles.count(machine_id);
        Ok(LiveStatus {
            latest: latest.clone(),
            status: classify(latest, &self.settings.thresholds),
            throughput_per_hour: estimate_throughput_per_hour(
                latest.units,
                self.settings.tick_period,
            ),
            critical_cycles,
            estimated_downtime: estimate_downtime(critical_cycles, self.settings.tick_period),
        })
    }

    async fn peak_analysis(
        &self,
        machine_id: &MachineId,
        now: DateTime<Utc>,
    ) -> anyhow::Result<Option<PeakAnalysis>> {
        let tz = &self.settings.timezone;
        let today = now.with_timezone(tz).date_naive();
        let day_start = today
            .and_hms_opt(0, 0, 0)
            .and_then(|midnight| tz.from_local_datetime(&midnight).single())
            .map(|start| start.with_timezone(&Utc))
            .context("local midnight is not representable")?;

        let day = self
            .store
            .query(machine_id, Some(day_start), None)
            .await
            .with_context(|| format!("failed to query today's telemetry for {}", machine_id))?;

        let Some(peak) = daily_peak(&day, today, tz) else {
            return Ok(None);
        };

        let radius = self.settings.context_radius;
        let around = self
            .store
            .query(
                machine_id,
                peak.timestamp.checked_sub_signed(radius),
                peak.timestamp.checked_add_signed(radius),
            )
            .await
            .with_context(|| format!("failed to query peak context for {}", machine_id))?;

        Ok(Some(PeakAnalysis {
            peak: peak.clone(),
            status: classify(peak, &self.settings.thresholds),
            window: context_window(&around, peak.timestamp, radius),
        }))
    }
}

/// Downsample samples into at most `max_points` trend points using bucket averaging
fn downsample(samples: &[Sample], max_points: usize) -> Vec<TrendPoint> {
    if samples.len() <= max_points || max_points == 0 {
        return samples
            .iter()
            .map(|s| TrendPoint::new(s.timestamp, s.temperature, s.vibration))
            .collect();
    }

    let bucket_size = (samples.len() as f64 / max_points as f64).ceil() as usize;
    let mut downsampled = Vec::with_capacity(max_points);

    for chunk in samples.chunks(bucket_size) {
        // Use middle sample's timestamp and average values
        let mid = &chunk[chunk.len() / 2];
        let n = chunk.len() as f64;
        let temperature = chunk.iter().map(|s| s.temperature).sum::<f64>() / n;
        let vibration = chunk.iter().map(|s| s.vibration).sum::<f64>() / n;
        downsampled.push(TrendPoint::new(mid.timestamp, temperature, vibration));
    }

    downsampled
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::clock::testing::ManualClock;
    use crate::infrastructure::memory_store::InMemoryStore;
    use approx::assert_relative_eq;

    // Wall-clock time at +05:30
    fn local(h: u32, m: u32) -> DateTime<Utc> {
        ist()
            .with_ymd_and_hms(2025, 3, 14, h, m, 0)
            .unwrap()
            .with_timezone(&Utc)
    }

    fn ist() -> FixedOffset {
        FixedOffset::east_opt(5 * 3600 + 1800).unwrap()
    }

    fn sample(ts: DateTime<Utc>, temperature: f64, vibration: f64, units: u32) -> Sample {
        Sample::new(ts, MachineId::from("M-1"), temperature, vibration, units, false)
    }

    fn build_service(
        store: Arc<InMemoryStore>,
        now: DateTime<Utc>,
    ) -> (DashboardService, Arc<CriticalCycleCounter>) {
        let ids = [MachineId::from("M-1")];
        let counter = Arc::new(CriticalCycleCounter::new(&ids));
        let settings = DashboardSettings {
            thresholds: Thresholds::default(),
            timezone: ist(),
            context_radius: chrono::Duration::minutes(10),
            tick_period: Duration::from_secs(5),
            max_trend_points: 150,
            history_hours: 6,
        };
        let service = DashboardService::new(
            store,
            Arc::new(ManualClock::new(now)),
            counter.clone(),
            settings,
        );
        (service, counter)
    }

    fn machine() -> Machine {
        Machine::new(MachineId::from("M-1"))
    }

    #[tokio::test]
    async fn test_waiting_for_data() {
        let store = Arc::new(InMemoryStore::unbounded());
        let (service, _) = build_service(store, local(12, 0));

        let dashboard = service.get_dashboard(machine(), 6).await.unwrap();
        assert!(matches!(dashboard.state, DashboardState::WaitingForData));
        assert!(dashboard.trend.is_empty());
        assert!(dashboard.peak.is_none());
    }

    #[tokio::test]
    async fn test_live_status_and_peak_analysis() {
        let store = Arc::new(InMemoryStore::unbounded());
        store
            .append(vec![
                // Yesterday, local time: hotter but not today
                sample(local(10, 0) - chrono::Duration::days(1), 95.0, 3.0, 15),
                sample(local(9, 40), 74.0, 3.0, 15),
                sample(local(10, 0), 70.0, 3.0, 15),
                sample(local(10, 5), 92.0, 4.0, 7),
                sample(local(10, 10), 81.0, 3.5, 12),
                sample(local(10, 30), 76.0, 6.8, 15),
            ])
            .await
            .unwrap();
        let (service, counter) = build_service(store, local(10, 31));
        counter.record(&MachineId::from("M-1"), MachineStatus::Critical);
        counter.record(&MachineId::from("M-1"), MachineStatus::Critical);

        let dashboard = service.get_dashboard(machine(), 6).await.unwrap();

        let DashboardState::Live(live) = &dashboard.state else {
            panic!("expected live dashboard");
        };
        assert_eq!(live.latest.timestamp, local(10, 30));
        assert_eq!(live.status, MachineStatus::Warning);
        assert_relative_eq!(live.throughput_per_hour, 10_800.0);
        assert_eq!(live.critical_cycles, 2);
        assert_eq!(live.estimated_downtime, Duration::from_secs(10));

        let peak = dashboard.peak.unwrap();
        assert_eq!(peak.peak.timestamp, local(10, 5));
        assert_eq!(peak.status, MachineStatus::Critical);
        let window: Vec<DateTime<Utc>> = peak.window.iter().map(|s| s.timestamp).collect();
        assert_eq!(window, vec![local(10, 0), local(10, 5), local(10, 10)]);

        // Yesterday's reading is outside the six-hour history
        assert_eq!(dashboard.trend.len(), 5);
    }

    #[tokio::test]
    async fn test_peak_survives_short_history_window() {
        let store = Arc::new(InMemoryStore::unbounded());
        store
            .append(vec![sample(local(8, 0), 90.0, 3.0, 15), sample(local(11, 0), 72.0, 3.0, 15)])
            .await
            .unwrap();
        let (service, _) = build_service(store, local(11, 1));

        let dashboard = service.get_dashboard(machine(), 1).await.unwrap();
        assert_eq!(dashboard.trend.len(), 1);
        assert_eq!(dashboard.peak.unwrap().peak.timestamp, local(8, 0));
    }

    #[tokio::test]
    async fn test_unbounded_history_window() {
        let store = Arc::new(InMemoryStore::unbounded());
        store
            .append(vec![
                sample(local(10, 0) - chrono::Duration::days(400), 75.0, 3.0, 15),
                sample(local(10, 0), 72.0, 3.0, 15),
            ])
            .await
            .unwrap();
        let (service, _) = build_service(store, local(10, 1));

        let dashboard = service.get_dashboard(machine(), u32::MAX).await.unwrap();
        assert_eq!(dashboard.trend.len(), 2);
        assert!(matches!(dashboard.state, DashboardState::Live(_)));
    }

    #[test]
    fn test_downsample_buckets() {
        let base = local(0, 0);
        let samples: Vec<Sample> = (0..10)
            .map(|i| {
                sample(
                    base + chrono::Duration::seconds(i),
                    70.0 + i as f64,
                    3.0,
                    15,
                )
            })
            .collect();

        let points = downsample(&samples, 5);
        assert_eq!(points.len(), 5);
        assert_relative_eq!(points[0].temperature, 70.5);
        assert_eq!(points[0].timestamp, base + chrono::Duration::seconds(1));

        assert_eq!(downsample(&samples, 20).len(), 10);
    }
}
