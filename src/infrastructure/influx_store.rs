// InfluxDB store implementation (1.x-compatible HTTP API)
use crate::application::telemetry_store::TelemetryStore;
use crate::domain::error::StoreError;
use crate::domain::machine::MachineId;
use crate::domain::telemetry::Sample;
use crate::infrastructure::config::InfluxSettings;
use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Deserialize;
use std::fmt::Write;

/// Samples live in one measurement tagged by `machine_id`, so the
/// (machine_id, time) pair is the series index.
#[derive(Debug, Clone)]
pub struct InfluxStore {
    client: reqwest::Client,
    host: String,
    token: String,
    database: String,
    retention_policy: String,
    measurement: String,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResponse {
    results: Vec<InfluxQLResult>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLResult {
    #[serde(default)]
    series: Option<Vec<InfluxQLSeries>>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InfluxQLSeries {
    columns: Vec<String>,
    values: Vec<Vec<serde_json::Value>>,
}

impl InfluxStore {
    pub fn new(settings: &InfluxSettings) -> Self {
        Self {
            client: reqwest::Client::new(),
            host: settings.host.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            database: settings.database.clone(),
            retention_policy: settings.retention_policy.clone(),
            measurement: settings.measurement.clone(),
        }
    }

    fn write_url(&self) -> String {
        format!(
            "{}/write?db={}&rp={}&precision=ns",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy)
        )
    }

    fn query_url(&self, query: &str) -> String {
        format!(
            "{}/query?db={}&rp={}&q={}",
            self.host,
            urlencoding::encode(&self.database),
            urlencoding::encode(&self.retention_policy),
            urlencoding::encode(query)
        )
    }

    /// Encode a batch as line protocol, one line per sample.
    fn encode_batch(&self, batch: &[Sample]) -> Result<String, StoreError> {
        let mut body = String::new();
        for sample in batch {
            let nanos = sample.timestamp.timestamp_nanos_opt().ok_or_else(|| {
                StoreError::Backend(format!(
                    "timestamp {} cannot be written with nanosecond precision",
                    sample.timestamp
                ))
            })?;
            // Writing into a String cannot fail
            let _ = writeln!(
                body,
                "{},machine_id={} temperature={},vibration={},units={}i,anomaly={} {}",
                escape_line(&self.measurement, &[',', ' ']),
                escape_line(sample.machine_id.as_str(), &[',', '=', ' ']),
                sample.temperature,
                sample.vibration,
                sample.units,
                sample.anomaly,
                nanos
            );
        }
        Ok(body)
    }

    fn build_range_query(
        &self,
        machine_id: &MachineId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> String {
        let mut query = format!(
            "SELECT temperature, vibration, units, anomaly FROM \"{}\" WHERE \"machine_id\" = '{}'",
            self.measurement.replace('"', "\\\""),
            escape_literal(machine_id.as_str())
        );
        if let Some(since) = since {
            let _ = write!(
                query,
                " AND time >= '{}'",
                since.to_rfc3339_opts(SecondsFormat::Nanos, true)
            );
        }
        if let Some(until) = until {
            let _ = write!(
                query,
                " AND time <= '{}'",
                until.to_rfc3339_opts(SecondsFormat::Nanos, true)
            );
        }
        query.push_str(" ORDER BY time ASC");
        query
    }

    async fn execute_query(&self, query: &str) -> Result<InfluxQLResponse, StoreError> {
        let response = self
            .client
            .get(self.query_url(query))
            .header("Authorization", format!("Token {}", self.token))
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("failed to reach InfluxDB: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!(
                "InfluxDB query failed with status {}: {}",
                status, body
            )));
        }

        response
            .json::<InfluxQLResponse>()
            .await
            .map_err(|e| StoreError::Decode(format!("invalid InfluxDB response: {}", e)))
    }
}

#[async_trait]
impl TelemetryStore for InfluxStore {
    async fn append(&self, batch: Vec<Sample>) -> Result<(), StoreError> {
        if batch.is_empty() {
            return Ok(());
        }
        let body = self.encode_batch(&batch)?;

        // One request per batch: InfluxDB accepts or rejects it as a whole
        let response = self
            .client
            .post(self.write_url())
            .header("Authorization", format!("Token {}", self.token))
            .header("Content-Type", "text/plain; charset=utf-8")
            .body(body)
            .send()
            .await
            .map_err(|e| StoreError::Backend(format!("failed to reach InfluxDB: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(StoreError::Backend(format!(
                "InfluxDB write failed with status {}: {}",
                status, body
            )));
        }

        tracing::debug!(samples = batch.len(), "Wrote batch to InfluxDB");
        Ok(())
    }

    async fn query(
        &self,
        machine_id: &MachineId,
        since: Option<DateTime<Utc>>,
        until: Option<DateTime<Utc>>,
    ) -> Result<Vec<Sample>, StoreError> {
        let query = self.build_range_query(machine_id, since, until);
        tracing::debug!("Executing range query: {}", query);

        let response = self.execute_query(&query).await?;
        decode_samples(machine_id, response)
    }
}

fn decode_samples(
    machine_id: &MachineId,
    response: InfluxQLResponse,
) -> Result<Vec<Sample>, StoreError> {
    let Some(result) = response.results.into_iter().next() else {
        return Ok(Vec::new());
    };
    if let Some(error) = result.error {
        return Err(StoreError::Backend(format!("InfluxDB query error: {}", error)));
    }

    let mut samples = Vec::new();
    for series in result.series.unwrap_or_default() {
        let column = |name: &str| {
            series
                .columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| StoreError::Decode(format!("missing column {:?}", name)))
        };
        let time_idx = column("time")?;
        let temperature_idx = column("temperature")?;
        let vibration_idx = column("vibration")?;
        let units_idx = column("units")?;
        let anomaly_idx = column("anomaly")?;

        for row in &series.values {
            let cell = |idx: usize| {
                row.get(idx)
                    .ok_or_else(|| StoreError::Decode(format!("row is missing column {}", idx)))
            };

            let time = cell(time_idx)?
                .as_str()
                .ok_or_else(|| StoreError::Decode("time is not a string".to_string()))?;
            let timestamp = DateTime::parse_from_rfc3339(time)
                .map_err(|e| StoreError::Decode(format!("bad time {:?}: {}", time, e)))?
                .with_timezone(&Utc);
            let temperature = cell(temperature_idx)?
                .as_f64()
                .ok_or_else(|| StoreError::Decode("temperature is not a number".to_string()))?;
            let vibration = cell(vibration_idx)?
                .as_f64()
                .ok_or_else(|| StoreError::Decode("vibration is not a number".to_string()))?;
            let units = cell(units_idx)?
                .as_u64()
                .and_then(|u| u32::try_from(u).ok())
                .ok_or_else(|| StoreError::Decode("units is not a count".to_string()))?;
            let anomaly = cell(anomaly_idx)?
                .as_bool()
                .ok_or_else(|| StoreError::Decode("anomaly is not a boolean".to_string()))?;

            samples.push(Sample::new(
                timestamp,
                machine_id.clone(),
                temperature,
                vibration,
                units,
                anomaly,
            ));
        }
    }

    samples.sort_by_key(|s| s.timestamp);
    Ok(samples)
}

/// Backslash-escape line protocol delimiters.
fn escape_line(raw: &str, special: &[char]) -> String {
    let mut escaped = String::with_capacity(raw.len());
    for c in raw.chars() {
        if special.contains(&c) {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

/// Escape a single-quoted InfluxQL string literal.
fn escape_literal(raw: &str) -> String {
    raw.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn store() -> InfluxStore {
        InfluxStore::new(&InfluxSettings {
            host: "http://localhost:8086/".to_string(),
            token: "secret".to_string(),
            database: "factory".to_string(),
            retention_policy: "autogen".to_string(),
            measurement: "machine_telemetry".to_string(),
        })
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_encode_batch_line_protocol() {
        let batch = vec![
            Sample::new(noon(), MachineId::from("M-1"), 71.25, 3.5, 15, false),
            Sample::new(noon(), MachineId::from("press line,2"), 88.0, 7.75, 6, true),
        ];
        let body = store().encode_batch(&batch).unwrap();
        let lines: Vec<&str> = body.lines().collect();

        assert_eq!(
            lines[0],
            "machine_telemetry,machine_id=M-1 temperature=71.25,vibration=3.5,units=15i,anomaly=false 1748779200000000000"
        );
        assert_eq!(
            lines[1],
            "machine_telemetry,machine_id=press\\ line\\,2 temperature=88,vibration=7.75,units=6i,anomaly=true 1748779200000000000"
        );
    }

    #[test]
    fn test_urls_trim_host_and_encode() {
        let store = store();
        assert_eq!(
            store.write_url(),
            "http://localhost:8086/write?db=factory&rp=autogen&precision=ns"
        );
        assert!(store.query_url("SELECT 1").ends_with("&q=SELECT%201"));
    }

    #[test]
    fn test_build_range_query() {
        let store = store();
        let id = MachineId::from("M-1");

        assert_eq!(
            store.build_range_query(&id, None, None),
            "SELECT temperature, vibration, units, anomaly FROM \"machine_telemetry\" WHERE \"machine_id\" = 'M-1' ORDER BY time ASC"
        );

        let bounded = store.build_range_query(
            &id,
            Some(noon()),
            Some(noon() + chrono::Duration::minutes(10)),
        );
        assert!(bounded.contains("AND time >= '2025-06-01T12:00:00.000000000Z'"));
        assert!(bounded.contains("AND time <= '2025-06-01T12:10:00.000000000Z'"));

        let tricky = store.build_range_query(&MachineId::from("o'neil"), None, None);
        assert!(tricky.contains("= 'o\\'neil'"));
    }

    #[test]
    fn test_decode_samples() {
        let response: InfluxQLResponse = serde_json::from_str(
            r#"{"results":[{"statement_id":0,"series":[{"name":"machine_telemetry",
                "columns":["time","temperature","vibration","units","anomaly"],
                "values":[["2025-06-01T12:00:05Z",72.5,3.1,14,false],
                          ["2025-06-01T12:00:00Z",71.0,3.0,15,true]]}]}]}"#,
        )
        .unwrap();

        let samples = decode_samples(&MachineId::from("M-2"), response).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].timestamp, noon());
        assert!(samples[0].anomaly);
        assert_eq!(samples[1].units, 14);
        assert!(samples.iter().all(|s| s.machine_id == MachineId::from("M-2")));
    }

    #[test]
    fn test_decode_empty_and_errors() {
        let empty: InfluxQLResponse =
            serde_json::from_str(r#"{"results":[{"statement_id":0}]}"#).unwrap();
        assert!(decode_samples(&MachineId::from("M-1"), empty).unwrap().is_empty());

        let failed: InfluxQLResponse =
            serde_json::from_str(r#"{"results":[{"error":"database not found"}]}"#).unwrap();
        assert!(matches!(
            decode_samples(&MachineId::from("M-1"), failed),
            Err(StoreError::Backend(_))
        ));

        let bad_row: InfluxQLResponse = serde_json::from_str(
            r#"{"results":[{"series":[{"name":"m",
                "columns":["time","temperature","vibration","units","anomaly"],
                "values":[["2025-06-01T12:00:00Z","hot",3.0,15,false]]}]}]}"#,
        )
        .unwrap();
        assert!(matches!(
            decode_samples(&MachineId::from("M-1"), bad_row),
            Err(StoreError::Decode(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_append_does_not_touch_network() {
        let store = InfluxStore::new(&InfluxSettings {
            host: "http://127.0.0.1:1".to_string(),
            token: String::new(),
            database: "factory".to_string(),
            retention_policy: "autogen".to_string(),
            measurement: "machine_telemetry".to_string(),
        });
        assert!(store.append(Vec::new()).await.is_ok());
    }
}
