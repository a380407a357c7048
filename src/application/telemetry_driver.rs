// Periodic driver - the single writer feeding the store
use crate::application::clock::Clock;
use crate::application::simulator::TelemetrySimulator;
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::analytics::{classify, CriticalCycleCounter, Thresholds};
use crate::domain::error::StoreError;
use crate::domain::telemetry::{MachineStatus, Sample};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const LIVE_CHANNEL_CAPACITY: usize = 256;

/// Owns the simulator and pushes one batch per tick into the store.
///
/// `tick()` output goes to `append()` whole; nothing else writes samples.
pub struct TelemetryDriver {
    simulator: TelemetrySimulator,
    store: Arc<dyn TelemetryStore>,
    clock: Arc<dyn Clock>,
    thresholds: Thresholds,
    critical_cycles: Arc<CriticalCycleCounter>,
    live: broadcast::Sender<Sample>,
    tick_period: Duration,
}

impl TelemetryDriver {
    pub fn new(
        simulator: TelemetrySimulator,
        store: Arc<dyn TelemetryStore>,
        clock: Arc<dyn Clock>,
        thresholds: Thresholds,
        tick_period: Duration,
    ) -> Self {
        let critical_cycles = Arc::new(CriticalCycleCounter::new(simulator.machine_ids()));
        let (live, _) = broadcast::channel(LIVE_CHANNEL_CAPACITY);
        Self {
            simulator,
            store,
            clock,
            thresholds,
            critical_cycles,
            live,
            tick_period,
        }
    }

    pub fn critical_cycles(&self) -> Arc<CriticalCycleCounter> {
        Arc::clone(&self.critical_cycles)
    }

    /// Handle for live subscribers; every appended sample is published here.
    pub fn live_sender(&self) -> broadcast::Sender<Sample> {
        self.live.clone()
    }

    /// Run one tick: simulate, append, then count and publish.
    ///
    /// Counters and subscribers only see batches the store accepted.
    pub async fn step(&mut self) -> Result<usize, StoreError> {
        let now = self.clock.now();
        let batch = self.simulator.tick(now);
        let count = batch.len();

        self.store.append(batch.clone()).await?;

        for sample in batch {
            let status = classify(&sample, &self.thresholds);
            if status == MachineStatus::Critical {
                warn!(
                    machine_id = %sample.machine_id,
                    temperature = sample.temperature,
                    vibration = sample.vibration,
                    "Critical reading"
                );
            }
            self.critical_cycles.record(&sample.machine_id, status);
            // No subscribers is fine
            let _ = self.live.send(sample);
        }

        debug!(samples = count, timestamp = %now, "Tick appended");
        Ok(count)
    }

    /// Tick on a fixed cadence until `cancel` fires. Cancellation is only
    /// observed between ticks, never during an append.
    pub async fn run(mut self, cancel: CancellationToken) {
        info!(
            tick_period = ?self.tick_period,
            "Telemetry driver started"
        );

        let mut interval = tokio::time::interval(self.tick_period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("Telemetry driver stopping");
                    break;
                }
                _ = interval.tick() => {
                    if let Err(e) = self.step().await {
                        // Skip this cycle, the next tick tries again
                        error!(error = %e, "Failed to append telemetry batch");
                    }
                }
            }
        }
    }
}
