// Mapper to convert domain models to JSON wire types
use crate::application::machine_service::FleetEntry;
use crate::application::streaming_service::StreamMessage;
use crate::domain::dashboard::{Dashboard, DashboardState, LiveStatus, PeakAnalysis};
use crate::domain::machine::Machine;
use crate::domain::telemetry::{MachineStatus, Sample, TrendPoint};
use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;

const INCIDENT_TIME_FORMAT: &str = "%I:%M:%S %p";

#[derive(Debug, Serialize)]
pub struct MachineDto {
    pub id: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
pub struct SampleDto {
    pub timestamp: DateTime<Utc>,
    pub local_time: DateTime<FixedOffset>,
    pub machine_id: String,
    pub temperature: f64,
    pub vibration: f64,
    pub units: u32,
    pub anomaly: bool,
}

#[derive(Debug, Serialize)]
pub struct LiveStatusDto {
    pub latest: SampleDto,
    pub status: MachineStatus,
    pub throughput_per_hour: f64,
    pub critical_cycles: u64,
    /// Critical cycles times the tick period, not measured downtime.
    pub estimated_downtime_secs: f64,
}

#[derive(Debug, Serialize)]
pub struct PeakDto {
    pub peak: SampleDto,
    pub status: MachineStatus,
    pub incident_time: String,
    pub window: Vec<SampleDto>,
}

#[derive(Debug, Serialize)]
pub struct TrendPointDto {
    pub timestamp: DateTime<Utc>,
    pub temperature: f64,
    pub vibration: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DashboardStateDto {
    WaitingForData,
    Live,
}

#[derive(Debug, Serialize)]
pub struct DashboardDto {
    pub title: String,
    pub machine: MachineDto,
    pub state: DashboardStateDto,
    pub live: Option<LiveStatusDto>,
    pub trend: Vec<TrendPointDto>,
    pub peak: Option<PeakDto>,
}

#[derive(Debug, Serialize)]
pub struct FleetEntryDto {
    pub machine: MachineDto,
    pub status: Option<MachineStatus>,
    pub latest: Option<SampleDto>,
}

#[derive(Debug, Serialize)]
pub struct LiveSampleDto {
    pub sample: SampleDto,
    pub status: MachineStatus,
}

pub fn machine_to_json(machine: &Machine) -> MachineDto {
    MachineDto {
        id: machine.id.to_string(),
        name: machine.name.clone(),
    }
}

pub fn sample_to_json(sample: &Sample, tz: &FixedOffset) -> SampleDto {
    SampleDto {
        timestamp: sample.timestamp,
        local_time: sample.timestamp.with_timezone(tz),
        machine_id: sample.machine_id.to_string(),
        temperature: sample.temperature,
        vibration: sample.vibration,
        units: sample.units,
        anomaly: sample.anomaly,
    }
}

pub fn dashboard_to_json(dashboard: Dashboard, tz: &FixedOffset) -> DashboardDto {
    let title = format!(
        "{} Telemetry (last {}h)",
        dashboard.machine.name, dashboard.history_hours
    );

    let (state, live) = match &dashboard.state {
        DashboardState::WaitingForData => (DashboardStateDto::WaitingForData, None),
        DashboardState::Live(status) => (DashboardStateDto::Live, Some(live_to_json(status, tz))),
    };

    DashboardDto {
        title,
        machine: machine_to_json(&dashboard.machine),
        state,
        live,
        trend: dashboard.trend.iter().map(trend_to_json).collect(),
        peak: dashboard.peak.as_ref().map(|p| peak_to_json(p, tz)),
    }
}

pub fn fleet_entry_to_json(entry: &FleetEntry, tz: &FixedOffset) -> FleetEntryDto {
    FleetEntryDto {
        machine: machine_to_json(&entry.machine),
        status: entry.latest.as_ref().map(|(_, status)| *status),
        latest: entry.latest.as_ref().map(|(sample, _)| sample_to_json(sample, tz)),
    }
}

/// Event name and payload for one stream message.
pub fn stream_message_to_json(message: StreamMessage, tz: &FixedOffset) -> (&'static str, serde_json::Value) {
    let payload = match message {
        StreamMessage::Snapshot(dashboard) => {
            return ("snapshot", to_value(&dashboard_to_json(*dashboard, tz)));
        }
        StreamMessage::Sample { sample, status } => LiveSampleDto {
            sample: sample_to_json(&sample, tz),
            status,
        },
    };
    ("sample", to_value(&payload))
}

fn to_value<T: Serialize>(value: &T) -> serde_json::Value {
    serde_json::to_value(value).unwrap_or_else(|e| {
        tracing::error!("JSON serialization error: {}", e);
        serde_json::Value::Null
    })
}

fn live_to_json(status: &LiveStatus, tz: &FixedOffset) -> LiveStatusDto {
    LiveStatusDto {
        latest: sample_to_json(&status.latest, tz),
        status: status.status,
        throughput_per_hour: status.throughput_per_hour,
        critical_cycles: status.critical_cycles,
        estimated_downtime_secs: status.estimated_downtime.as_secs_f64(),
    }
}

fn peak_to_json(peak: &PeakAnalysis, tz: &FixedOffset) -> PeakDto {
    PeakDto {
        peak: sample_to_json(&peak.peak, tz),
        status: peak.status,
        incident_time: peak
            .peak
            .timestamp
            .with_timezone(tz)
            .format(INCIDENT_TIME_FORMAT)
            .to_string(),
        window: peak.window.iter().map(|s| sample_to_json(s, tz)).collect(),
    }
}

fn trend_to_json(point: &TrendPoint) -> TrendPointDto {
    TrendPointDto {
        timestamp: point.timestamp,
        temperature: point.temperature,
        vibration: point.vibration,
    }
}
