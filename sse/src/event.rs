use std::fmt::Write as _;

use chrono::Utc;
use registry::error::encoding_error;
use registry::{Error, Frame};
use serde_json::Value;

/// Payload of one SSE event: either a raw string written as-is, or a
/// structured value serialized to single-line JSON.
#[derive(Debug, Clone, PartialEq)]
pub enum SseData {
    Text(String),
    Json(Value),
}

/// One `text/event-stream` event block.
///
/// Field lines are emitted in the order `id`, `event`, `data`, `retry`, each
/// present only when set, and the block is terminated by a blank line. Every
/// frame carries a `data` line.
#[derive(Debug, Clone, PartialEq)]
pub struct SseEvent {
    id: Option<String>,
    event: Option<String>,
    data: SseData,
    retry: Option<u64>,
}

impl SseEvent {
    /// Event carrying a raw string payload.
    pub fn text(data: impl Into<String>) -> Self {
        Self {
            id: None,
            event: None,
            data: SseData::Text(data.into()),
            retry: None,
        }
    }

    /// Event carrying a structured payload, serialized at encode time.
    pub fn json(data: Value) -> Self {
        Self {
            id: None,
            event: None,
            data: SseData::Json(data),
            retry: None,
        }
    }

    /// Set the event id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Set the event name.
    pub fn event(mut self, event: impl Into<String>) -> Self {
        self.event = Some(event.into());
        self
    }

    /// Set the client reconnection delay, in milliseconds.
    pub fn retry(mut self, retry_ms: u64) -> Self {
        self.retry = Some(retry_ms);
        self
    }

    /// The keep-alive frame broadcast by the heartbeat scheduler.
    pub fn heartbeat() -> Self {
        Self::json(serde_json::json!({ "timestamp": Utc::now().timestamp_millis() }))
            .event("heartbeat")
    }
}

impl Frame for SseEvent {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut block = String::new();

        if let Some(id) = &self.id {
            let _ = writeln!(block, "id: {id}");
        }
        if let Some(event) = &self.event {
            let _ = writeln!(block, "event: {event}");
        }
        match &self.data {
            SseData::Text(text) => {
                let _ = writeln!(block, "data: {text}");
            }
            SseData::Json(value) => {
                let json = serde_json::to_string(value).map_err(|err| encoding_error(err))?;
                let _ = writeln!(block, "data: {json}");
            }
        }
        if let Some(retry) = self.retry {
            let _ = writeln!(block, "retry: {retry}");
        }
        block.push('\n');

        Ok(block.into_bytes())
    }
}
