use chrono::Utc;
use registry::error::encoding_error;
use registry::{Error, Frame};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The WebSocket wire envelope.
///
/// `type` is required and non-empty; `payload` defaults to JSON `null`;
/// `timestamp` (wall-clock milliseconds) is filled at encode time when the
/// sender leaves it unset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    #[serde(default)]
    pub payload: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<i64>,
}

impl WsMessage {
    pub fn new(message_type: impl Into<String>, payload: Value) -> Self {
        Self {
            message_type: message_type.into(),
            payload,
            id: None,
            timestamp: None,
        }
    }

    /// Set the correlation id.
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The error frame sent back on the originating connection when inbound
    /// validation or a handler fails.
    pub fn error(message: impl Into<String>) -> Self {
        Self::new("error", serde_json::json!({ "error": message.into() }))
    }

    /// The keep-alive frame broadcast by the heartbeat scheduler.
    pub fn heartbeat() -> Self {
        Self::new("heartbeat", serde_json::json!({ "timestamp": now_ms() }))
    }
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

impl Frame for WsMessage {
    fn encode(&self) -> Result<Vec<u8>, Error> {
        let mut message = self.clone();
        message.timestamp.get_or_insert_with(now_ms);
        serde_json::to_vec(&message).map_err(|err| encoding_error(err))
    }
}
