// Domain layer - Pure types and analytics, no I/O
pub mod analytics;
pub mod dashboard;
pub mod error;
pub mod machine;
pub mod telemetry;
