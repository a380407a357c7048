// Streaming service - Snapshot first, then live samples as they are appended
use crate::application::dashboard_service::DashboardService;
use crate::domain::dashboard::Dashboard;
use crate::domain::machine::Machine;
use crate::domain::telemetry::{MachineStatus, Sample};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc};

const STREAM_BUFFER: usize = 100;

#[derive(Debug, Clone)]
pub enum StreamMessage {
    Snapshot(Box<Dashboard>),
    Sample {
        sample: Sample,
        status: MachineStatus,
    },
}

#[derive(Clone)]
pub struct StreamingService {
    dashboards: DashboardService,
    live: broadcast::Sender<Sample>,
}

impl StreamingService {
    pub fn new(dashboards: DashboardService, live: broadcast::Sender<Sample>) -> Self {
        Self { dashboards, live }
    }

    pub async fn stream_machine(&self, machine: Machine, hours: u32) -> mpsc::Receiver<StreamMessage> {
        let (tx, rx) = mpsc::channel(STREAM_BUFFER);

        // Subscribe before building the snapshot so no append falls in between
        let mut live = self.live.subscribe();
        let machine_id = machine.id.clone();

        match self.dashboards.get_dashboard(machine, hours).await {
            Ok(dashboard) => {
                let _ = tx.send(StreamMessage::Snapshot(Box::new(dashboard))).await;
            }
            Err(e) => {
                tracing::warn!(machine_id = %machine_id, error = %e, "Could not build stream snapshot");
            }
        }

        let dashboards = self.dashboards.clone();
        tokio::spawn(async move {
            loop {
                let received = tokio::select! {
                    _ = tx.closed() => break,
                    received = live.recv() => received,
                };

                match received {
                    Ok(sample) if sample.machine_id == machine_id => {
                        let status = dashboards.classify(&sample);
                        if tx.send(StreamMessage::Sample { sample, status }).await.is_err() {
                            break;
                        }
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(machine_id = %machine_id, skipped, "Live subscriber lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!(machine_id = %machine_id, "Live stream closed");
        });

        rx
    }
}
