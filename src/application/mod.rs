// Application layer - Use cases and ports
pub mod clock;
pub mod dashboard_service;
pub mod machine_service;
pub mod simulator;
pub mod streaming_service;
pub mod telemetry_driver;
pub mod telemetry_store;
