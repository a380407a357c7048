// Application state for HTTP handlers
use crate::application::dashboard_service::DashboardService;
use crate::application::machine_service::MachineService;
use crate::application::streaming_service::StreamingService;

#[derive(Clone)]
pub struct AppState {
    pub machine_service: MachineService,
    pub dashboard_service: DashboardService,
    pub streaming_service: StreamingService,
}
