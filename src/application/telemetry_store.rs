// Store trait for telemetry data access
use crate::domain::error::StoreError;
use crate::domain::machine::MachineId;
use crate::domain::telemetry::Sample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Range-filtered, time-ordered retrieval of samples.
///
/// Callers must not assume a storage medium. Implementations make `append`
/// atomic per batch: a concurrent `query` sees all of a batch or none of it.
#[async_trait]
pub trait TelemetryStore: Send + Sync {
    /// Add a batch in the given order. An empty batch is a no-op.
    async fn append(&self, batch: Vec<Sample>) -> Result<(), StoreError>;

    /// Samples for `machine_id` with `since <= timestamp <= until`, oldest first.
    /// A missing bound is unbounded on that side; no match is an empty vec.
    async fn query(
        &self,
        machine_id: &MachineId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Sample>, StoreError>;
}
