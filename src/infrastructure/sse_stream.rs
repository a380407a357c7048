// Server-Sent Events streaming utilities
use crate::application::streaming_service::StreamMessage;
use crate::infrastructure::json_mapper::stream_message_to_json;
use axum::response::sse::{Event, KeepAlive, Sse};
use chrono::FixedOffset;
use futures::stream::Stream;
use std::convert::Infallible;
use tokio::sync::mpsc;

/// Serialize a single StreamMessage to a named SSE event
fn serialize_event(message: StreamMessage, tz: &FixedOffset) -> Result<Event, axum::Error> {
    let (name, payload) = stream_message_to_json(message, tz);
    Event::default().event(name).json_data(payload)
}

/// Helper to create an SSE response from a receiver
pub fn sse_from_receiver(
    mut rx: mpsc::Receiver<StreamMessage>,
    tz: FixedOffset,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(message) = rx.recv().await {
            match serialize_event(message, &tz) {
                Ok(event) => yield Ok::<Event, Infallible>(event),
                Err(e) => tracing::error!("SSE serialization error: {}", e),
            }
        }
    };

    // Idle machines still get periodic comments so proxies keep the connection
    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::machine::MachineId;
    use crate::domain::telemetry::{MachineStatus, Sample};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_serialize_event() {
        let sample = Sample::new(
            Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap(),
            MachineId::from("M-1"),
            70.0,
            3.0,
            15,
            false,
        );
        let event = serialize_event(
            StreamMessage::Sample {
                sample,
                status: MachineStatus::Normal,
            },
            &FixedOffset::east_opt(0).unwrap(),
        );
        assert!(event.is_ok());
    }
}
