// In-memory store with bounded retention
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::error::StoreError;
use crate::domain::machine::MachineId;
use crate::domain::telemetry::Sample;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use tokio::sync::RwLock;

/// Per-machine time-ordered series behind one lock.
///
/// The write lock is held for a whole batch, so readers never observe a
/// partial append. Queries copy their range out under the read lock.
#[derive(Debug)]
pub struct InMemoryStore {
    retention: Option<chrono::Duration>,
    series: RwLock<HashMap<MachineId, VecDeque<Sample>>>,
}

impl InMemoryStore {
    pub fn new(retention: chrono::Duration) -> Self {
        Self {
            retention: Some(retention),
            series: RwLock::new(HashMap::new()),
        }
    }

    /// Keeps everything.
    #[cfg(test)]
    pub fn unbounded() -> Self {
        Self {
            retention: None,
            series: RwLock::new(HashMap::new()),
        }
    }

    #[cfg(test)]
    pub async fn sample_count(&self) -> usize {
        self.series.read().await.values().map(VecDeque::len).sum()
    }

    fn insert(entries: &mut VecDeque<Sample>, sample: Sample) {
        match entries.back() {
            Some(last) if last.timestamp > sample.timestamp => {
                tracing::warn!(
                    machine_id = %sample.machine_id,
                    timestamp = %sample.timestamp,
                    "Out-of-order sample, inserting at its sorted position"
                );
                let pos = entries.partition_point(|s| s.timestamp <= sample.timestamp);
                entries.insert(pos, sample);
            }
            _ => entries.push_back(sample),
        }
    }

    fn trim(&self, series: &mut HashMap<MachineId, VecDeque<Sample>>, newest: DateTime<Utc>) {
        let Some(retention) = self.retention else {
            return;
        };
        let Some(cutoff) = newest.checked_sub_signed(retention) else {
            return;
        };
        let mut dropped = 0usize;
        for entries in series.values_mut() {
            while entries.front().is_some_and(|s| s.timestamp < cutoff) {
                entries.pop_front();
                dropped += 1;
            }
        }
        if dropped > 0 {
            tracing::debug!(dropped, cutoff = %cutoff, "Trimmed samples past retention");
        }
    }
}

#[async_trait]
impl TelemetryStore for InMemoryStore {
    async fn append(&self, batch: Vec<Sample>) -> Result<(), StoreError> {
        let Some(newest) = batch.iter().map(|s| s.timestamp).max() else {
            return Ok(());
        };

        let mut series = self.series.write().await;
        for sample in batch {
            let entries = series.entry(sample.machine_id.clone()).or_default();
            Self::insert(entries, sample);
        }
        self.trim(&mut series, newest);
        Ok(())
    }

    async fn query(
        &self,
        machine_id: &MachineId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Sample>, StoreError> {
        let series = self.series.read().await;
        let Some(entries) = series.get(machine_id) else {
            return Ok(Vec::new());
        };

        let start = since.map_or(0, |t| entries.partition_point(|s| s.timestamp < t));
        let end = until.map_or(entries.len(), |t| {
            entries.partition_point(|s| s.timestamp <= t)
        });
        if start >= end {
            return Ok(Vec::new());
        }
        Ok(entries.range(start..end).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn at(minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, minute, 0).unwrap()
    }

    fn sample(machine: &str, ts: DateTime<Utc>, temperature: f64) -> Sample {
        Sample::new(ts, MachineId::from(machine), temperature, 3.0, 15, false)
    }

    #[tokio::test]
    async fn test_append_then_query_round_trip() {
        let store = InMemoryStore::unbounded();
        let batch = vec![
            sample("M-1", at(0), 70.0),
            sample("M-1", at(1), 71.0),
            sample("M-1", at(2), 72.0),
        ];
        store.append(batch.clone()).await.unwrap();

        let all = store.query(&MachineId::from("M-1"), None, None).await.unwrap();
        assert_eq!(all, batch);
    }

    #[tokio::test]
    async fn test_query_filters_machine_and_range() {
        let store = InMemoryStore::unbounded();
        for minute in 0..10 {
            store
                .append(vec![
                    sample("M-1", at(minute), 70.0 + f64::from(minute)),
                    sample("M-2", at(minute), 60.0),
                ])
                .await
                .unwrap();
        }

        let m1 = MachineId::from("M-1");
        let ranged = store.query(&m1, Some(at(3)), Some(at(6))).await.unwrap();
        let minutes: Vec<DateTime<Utc>> = ranged.iter().map(|s| s.timestamp).collect();
        assert_eq!(minutes, vec![at(3), at(4), at(5), at(6)]);
        assert!(ranged.iter().all(|s| s.machine_id == m1));
        assert!(ranged.windows(2).all(|w| w[0].timestamp <= w[1].timestamp));

        assert_eq!(store.query(&m1, Some(at(8)), None).await.unwrap().len(), 2);
        assert_eq!(store.query(&m1, None, Some(at(1))).await.unwrap().len(), 2);
        assert!(store.query(&m1, Some(at(7)), Some(at(5))).await.unwrap().is_empty());
        assert!(store
            .query(&MachineId::from("M-9"), None, None)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_empty_batch_is_noop() {
        let store = InMemoryStore::unbounded();
        store.append(Vec::new()).await.unwrap();
        assert_eq!(store.sample_count().await, 0);
    }

    #[tokio::test]
    async fn test_retention_drops_old_samples() {
        let store = InMemoryStore::new(chrono::Duration::minutes(5));
        for minute in 0..10 {
            store.append(vec![sample("M-1", at(minute), 70.0)]).await.unwrap();
        }

        let kept = store.query(&MachineId::from("M-1"), None, None).await.unwrap();
        assert_eq!(kept.first().unwrap().timestamp, at(4));
        assert_eq!(kept.len(), 6);
    }

    #[tokio::test]
    async fn test_retention_beyond_calendar_range_keeps_everything() {
        let store = InMemoryStore::new(chrono::Duration::hours(i64::from(u32::MAX)));
        store.append(vec![sample("M-1", at(0), 70.0)]).await.unwrap();
        store.append(vec![sample("M-1", at(9), 71.0)]).await.unwrap();
        assert_eq!(store.sample_count().await, 2);
    }

    #[tokio::test]
    async fn test_out_of_order_sample_keeps_series_sorted() {
        let store = InMemoryStore::unbounded();
        store
            .append(vec![sample("M-1", at(0), 70.0), sample("M-1", at(5), 71.0)])
            .await
            .unwrap();
        store.append(vec![sample("M-1", at(2), 72.0)]).await.unwrap();

        let all = store.query(&MachineId::from("M-1"), None, None).await.unwrap();
        let stamps: Vec<DateTime<Utc>> = all.iter().map(|s| s.timestamp).collect();
        assert_eq!(stamps, vec![at(0), at(2), at(5)]);
    }

    #[tokio::test]
    async fn test_readers_never_see_partial_batches() {
        const BATCH: usize = 8;
        let store = Arc::new(InMemoryStore::unbounded());
        let base = at(0);

        let writer = {
            let store = store.clone();
            tokio::spawn(async move {
                for round in 0..200i64 {
                    let batch = (0..BATCH as i64)
                        .map(|i| {
                            let ts = base + chrono::Duration::milliseconds(round * 100 + i);
                            sample("M-1", ts, 70.0)
                        })
                        .collect();
                    store.append(batch).await.unwrap();
                    tokio::task::yield_now().await;
                }
            })
        };

        let readers: Vec<_> = (0..4)
            .map(|_| {
                let store = store.clone();
                tokio::spawn(async move {
                    for _ in 0..200 {
                        let seen = store.query(&MachineId::from("M-1"), None, None).await.unwrap();
                        assert_eq!(seen.len() % BATCH, 0);
                        tokio::task::yield_now().await;
                    }
                })
            })
            .collect();

        writer.await.unwrap();
        for reader in readers {
            reader.await.unwrap();
        }
        assert_eq!(store.sample_count().await, 200 * BATCH);
    }
}
