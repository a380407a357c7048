// Main entry point - Dependency injection, telemetry driver and server setup
mod application;
mod domain;
mod infrastructure;
mod presentation;

use anyhow::Context;
use axum::{routing::get, Router};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tower_http::compression::CompressionLayer;
use tower_http::trace::TraceLayer;

use crate::application::clock::{Clock, SystemClock};
use crate::application::dashboard_service::{DashboardService, DashboardSettings};
use crate::application::machine_service::MachineService;
use crate::application::simulator::TelemetrySimulator;
use crate::application::streaming_service::StreamingService;
use crate::application::telemetry_driver::TelemetryDriver;
use crate::application::telemetry_store::TelemetryStore;
use crate::infrastructure::config::{load_app_config, AppConfig, StoreBackend};
use crate::infrastructure::influx_store::InfluxStore;
use crate::infrastructure::memory_store::InMemoryStore;
use crate::presentation::app_state::AppState;
use crate::presentation::handlers::{
    fleet_overview, health_check, list_machines, machine_dashboard, machine_samples,
    stream_machine,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    // Load and validate configuration; anything invalid stops startup here
    let config = load_app_config().context("failed to load configuration")?;
    config.validate().context("invalid configuration")?;
    let addr = config.server_addr()?;
    let timezone = config.analytics.timezone()?;
    let tick_period = config.simulation.tick_period();

    // Create store (infrastructure layer)
    let store = build_store(&config);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);

    // Create the single writer
    let simulator = TelemetrySimulator::new(&config.machines, config.simulation.clone())?;
    let driver = TelemetryDriver::new(
        simulator,
        store.clone(),
        clock.clone(),
        config.thresholds,
        tick_period,
    );

    // Create services (application layer)
    let machine_service = MachineService::new(
        store.clone(),
        clock.clone(),
        config.machine_ids(),
        config.thresholds,
    );
    let dashboard_service = DashboardService::new(
        store.clone(),
        clock.clone(),
        driver.critical_cycles(),
        DashboardSettings {
            thresholds: config.thresholds,
            timezone,
            context_radius: config.analytics.context_radius(),
            tick_period,
            max_trend_points: config.analytics.max_trend_points,
            history_hours: config.analytics.history_hours,
        },
    );
    let streaming_service = StreamingService::new(dashboard_service.clone(), driver.live_sender());

    // Create application state
    let state = Arc::new(AppState {
        machine_service,
        dashboard_service,
        streaming_service,
    });

    // Build router (presentation layer)
    // The stream route stays outside the compression layer so events are not buffered
    let api = Router::new()
        .route("/healthz", get(health_check))
        .route("/machines", get(list_machines))
        .route("/fleet", get(fleet_overview))
        .route("/machines/:id/dashboard", get(machine_dashboard))
        .route("/machines/:id/samples", get(machine_samples))
        .layer(CompressionLayer::new());
    let router = Router::new()
        .route("/machines/:id/stream", get(stream_machine))
        .merge(api)
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Stop both the driver and the server on Ctrl-C
    let cancel = CancellationToken::new();
    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for shutdown signal");
        }
        tracing::info!("Shutdown requested");
        shutdown.cancel();
    });

    let driver_handle = tokio::spawn(driver.run(cancel.clone()));

    tracing::info!(
        %addr,
        machines = config.machines.len(),
        backend = ?config.store.backend,
        "Starting machine-telemetry service"
    );

    let server_cancel = cancel.clone();
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router)
        .with_graceful_shutdown(async move { server_cancel.cancelled().await })
        .await?;

    // The server may also exit on its own; make sure the driver follows
    cancel.cancel();
    driver_handle.await.context("telemetry driver panicked")?;

    Ok(())
}

fn build_store(config: &AppConfig) -> Arc<dyn TelemetryStore> {
    match (config.store.backend, &config.influx) {
        (StoreBackend::Influx, Some(influx)) => {
            tracing::info!(host = %influx.host, database = %influx.database, "Using InfluxDB store");
            Arc::new(InfluxStore::new(influx))
        }
        _ => {
            tracing::info!(
                retention_hours = config.store.retention_hours,
                "Using in-memory store"
            );
            Arc::new(InMemoryStore::new(config.store.retention()))
        }
    }
}
