// HTTP request handlers
use crate::infrastructure::json_mapper::{
    dashboard_to_json, fleet_entry_to_json, machine_to_json, sample_to_json, FleetEntryDto,
    MachineDto, SampleDto,
};
use crate::infrastructure::sse_stream::sse_from_receiver;
use crate::presentation::app_state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::sync::Arc;

#[derive(Deserialize)]
pub struct RangeQuery {
    pub hours: Option<u32>,
}

#[derive(Deserialize)]
pub struct SamplesQuery {
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

/// Health check endpoint
pub async fn health_check() -> &'static str {
    "ok"
}

/// List all configured machines
pub async fn list_machines(State(state): State<Arc<AppState>>) -> Json<Vec<MachineDto>> {
    let machines = state
        .machine_service
        .list_machines()
        .iter()
        .map(machine_to_json)
        .collect();
    Json(machines)
}

/// Latest status of every machine
pub async fn fleet_overview(
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let settings = state.dashboard_service.settings();
    let hours = resolve_hours(query.hours, settings.history_hours);

    match state.machine_service.fleet_overview(hours).await {
        Ok(entries) => {
            let body: Vec<FleetEntryDto> = entries
                .iter()
                .map(|e| fleet_entry_to_json(e, &settings.timezone))
                .collect();
            Json(body).into_response()
        }
        Err(e) => store_unavailable(e),
    }
}

/// Dashboard for a specific machine
pub async fn machine_dashboard(
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(machine) = state.machine_service.find(&id) else {
        return unknown_machine(&id);
    };
    let settings = state.dashboard_service.settings();
    let hours = resolve_hours(query.hours, settings.history_hours);

    match state.dashboard_service.get_dashboard(machine, hours).await {
        Ok(dashboard) => Json(dashboard_to_json(dashboard, &settings.timezone)).into_response(),
        Err(e) => store_unavailable(e),
    }
}

/// Raw samples for a machine within an optional time range
pub async fn machine_samples(
    Path(id): Path<String>,
    Query(query): Query<SamplesQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(machine) = state.machine_service.find(&id) else {
        return unknown_machine(&id);
    };
    let tz = state.dashboard_service.settings().timezone;

    match state
        .dashboard_service
        .samples(&machine.id, query.since, query.until)
        .await
    {
        Ok(samples) => {
            let body: Vec<SampleDto> = samples.iter().map(|s| sample_to_json(s, &tz)).collect();
            Json(body).into_response()
        }
        Err(e) => store_unavailable(e),
    }
}

/// Live stream for a specific machine (snapshot, then samples)
pub async fn stream_machine(
    Path(id): Path<String>,
    Query(query): Query<RangeQuery>,
    State(state): State<Arc<AppState>>,
) -> Response {
    let Some(machine) = state.machine_service.find(&id) else {
        return unknown_machine(&id);
    };
    let settings = state.dashboard_service.settings();
    let hours = resolve_hours(query.hours, settings.history_hours);
    let tz = settings.timezone;

    let rx = state.streaming_service.stream_machine(machine, hours).await;
    sse_from_receiver(rx, tz).into_response()
}

fn resolve_hours(requested: Option<u32>, default: u32) -> u32 {
    requested.unwrap_or(default).max(1)
}

fn unknown_machine(id: &str) -> Response {
    (StatusCode::NOT_FOUND, format!("unknown machine {}", id)).into_response()
}

fn store_unavailable(error: anyhow::Error) -> Response {
    tracing::error!("Telemetry query failed: {:#}", error);
    (StatusCode::SERVICE_UNAVAILABLE, "telemetry store unavailable").into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_hours() {
        assert_eq!(resolve_hours(None, 6), 6);
        assert_eq!(resolve_hours(Some(12), 6), 12);
        assert_eq!(resolve_hours(Some(0), 6), 1);
    }
}
