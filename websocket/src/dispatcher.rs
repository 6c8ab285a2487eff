use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use log::*;
use registry::{Connection, ConnectionId, Error, Registry};
use serde_json::Value;

use crate::message::WsMessage;

/// Error frame text for an oversized inbound frame.
const SIZE_LIMIT_MESSAGE: &str = "Message size exceeds maximum allowed size";

/// Error frame text for a frame whose `type` field is absent or empty.
const MISSING_TYPE_MESSAGE: &str = "Message is missing a type";

/// A caller-supplied handler bound to one inbound message type.
///
/// Handlers for one connection may run concurrently; per-connection
/// serialization, where needed, is the caller's responsibility. A returned
/// error is reported to the client as an `error` frame and goes no further.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(&self, connection: Arc<Connection>, message: WsMessage) -> Result<(), Error>;
}

/// Inbound frame validation and type-indexed dispatch.
///
/// No failure escapes [`handle_message`](Dispatcher::handle_message):
/// frames from unknown connections are dropped, everything else is answered
/// with an `error` frame on the originating connection.
pub struct Dispatcher {
    registry: Arc<Registry>,
    handlers: DashMap<String, Arc<dyn MessageHandler>>,
}

impl Dispatcher {
    pub fn new(registry: Arc<Registry>) -> Self {
        Self {
            registry,
            handlers: DashMap::new(),
        }
    }

    /// Register (or replace) the handler for a message type.
    pub fn on_message(&self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        let message_type = message_type.into();
        if self.handlers.insert(message_type.clone(), handler).is_some() {
            debug!("Replaced handler for message type {message_type}");
        }
    }

    /// Parse, validate, and dispatch one inbound frame.
    pub async fn handle_message(&self, connection_id: &ConnectionId, raw: &[u8]) {
        let Some(conn) = self.registry.get_connection(connection_id) else {
            debug!("Dropping frame for unknown connection {connection_id}");
            return;
        };

        if raw.len() > self.registry.config().max_message_size {
            warn!(
                "Rejecting {}-byte frame from {connection_id} (limit {})",
                raw.len(),
                self.registry.config().max_message_size
            );
            self.send_error(&conn, SIZE_LIMIT_MESSAGE);
            return;
        }

        let value: Value = match serde_json::from_slice(raw) {
            Ok(value) => value,
            Err(err) => {
                self.send_error(&conn, &err.to_string());
                return;
            }
        };

        let message_type = value
            .get("type")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        if message_type.is_empty() {
            self.send_error(&conn, MISSING_TYPE_MESSAGE);
            return;
        }

        let message: WsMessage = match serde_json::from_value(value) {
            Ok(message) => message,
            Err(err) => {
                self.send_error(&conn, &err.to_string());
                return;
            }
        };

        let Some(handler) = self
            .handlers
            .get(&message_type)
            .map(|entry| Arc::clone(entry.value()))
        else {
            self.send_error(
                &conn,
                &format!("No handler found for message type: {message_type}"),
            );
            return;
        };

        if let Err(err) = handler.handle(Arc::clone(&conn), message).await {
            warn!("Handler for {message_type} failed on {connection_id}: {err}");
            self.send_error(&conn, &err.to_string());
        }
    }

    fn send_error(&self, conn: &Connection, message: &str) {
        if let Err(err) = conn.send(&WsMessage::error(message)) {
            warn!("Failed to deliver error frame to {}: {err}", conn.id());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use registry::{ConnectionParams, RegistryConfig, TransportKind};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    struct Recorded {
        frames: Arc<Mutex<Vec<Value>>>,
    }

    fn registry_with(max_message_size: usize) -> Arc<Registry> {
        Arc::new(Registry::new(RegistryConfig {
            max_message_size,
            ..RegistryConfig::default()
        }))
    }

    fn connect(registry: &Arc<Registry>, id: &str) -> Recorded {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        registry
            .add_connection(ConnectionParams {
                id: ConnectionId::new(id),
                kind: TransportKind::WebSocket,
                user_id: None,
                channel: None,
                send_raw: Box::new(move |bytes| {
                    sink.lock()
                        .unwrap()
                        .push(serde_json::from_slice(bytes).unwrap());
                    Ok(())
                }),
                close_raw: Box::new(|_, _| {}),
            })
            .unwrap();
        Recorded { frames }
    }

    struct CountingHandler {
        calls: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl MessageHandler for CountingHandler {
        async fn handle(&self, _conn: Arc<Connection>, _message: WsMessage) -> Result<(), Error> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    #[async_trait]
    impl MessageHandler for FailingHandler {
        async fn handle(&self, _conn: Arc<Connection>, _message: WsMessage) -> Result<(), Error> {
            Err(registry::error::handler_error("chat room is read-only"))
        }
    }

    struct EchoHandler;

    #[async_trait]
    impl MessageHandler for EchoHandler {
        async fn handle(&self, conn: Arc<Connection>, message: WsMessage) -> Result<(), Error> {
            conn.send(&WsMessage::new("echo", message.payload))?;
            Ok(())
        }
    }

    fn error_text(frame: &Value) -> &str {
        frame["payload"]["error"].as_str().unwrap()
    }

    #[tokio::test]
    async fn dispatches_to_the_registered_handler() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        let calls = Arc::new(AtomicUsize::new(0));
        dispatcher.on_message(
            "chat:send",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
            }),
        );

        dispatcher
            .handle_message(
                &ConnectionId::new("c1"),
                br#"{"type":"chat:send","payload":{"text":"hi"}}"#,
            )
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_connection_is_ignored_silently() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));

        // Must not panic or emit anything.
        dispatcher
            .handle_message(&ConnectionId::new("ghost"), br#"{"type":"x"}"#)
            .await;
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected_before_any_handler_runs() {
        let registry = registry_with(16);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        let calls = Arc::new(AtomicUsize::new(0));
        dispatcher.on_message(
            "chat:send",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
            }),
        );

        let raw = br#"{"type":"chat:send","payload":"xxxxxxxxxxxxxxxx"}"#;
        assert!(raw.len() > 16);
        dispatcher.handle_message(&ConnectionId::new("c1"), raw).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let frames = client.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "error");
        assert_eq!(error_text(&frames[0]), SIZE_LIMIT_MESSAGE);
        assert!(frames[0]["timestamp"].is_i64());
    }

    #[tokio::test]
    async fn frame_at_exactly_the_size_limit_is_accepted() {
        let raw = br#"{"type":"chat:send","payload":{}}"#;
        let registry = registry_with(raw.len());
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        let calls = Arc::new(AtomicUsize::new(0));
        dispatcher.on_message(
            "chat:send",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
            }),
        );

        dispatcher.handle_message(&ConnectionId::new("c1"), raw).await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(client.frames.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn frame_one_byte_over_the_size_limit_is_rejected() {
        let raw = br#"{"type":"chat:send","payload":{}}"#;
        // Limit set so this exact frame is one byte too long.
        let registry = registry_with(raw.len() - 1);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        let calls = Arc::new(AtomicUsize::new(0));
        dispatcher.on_message(
            "chat:send",
            Arc::new(CountingHandler {
                calls: Arc::clone(&calls),
            }),
        );

        dispatcher.handle_message(&ConnectionId::new("c1"), raw).await;

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        let frames = client.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(error_text(&frames[0]), SIZE_LIMIT_MESSAGE);
    }

    #[tokio::test]
    async fn unparseable_frame_is_answered_with_the_parser_error() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");

        dispatcher
            .handle_message(&ConnectionId::new("c1"), b"{not json")
            .await;

        let frames = client.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "error");
        assert!(!error_text(&frames[0]).is_empty());
    }

    #[tokio::test]
    async fn missing_or_empty_type_is_rejected() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");

        dispatcher
            .handle_message(&ConnectionId::new("c1"), br#"{"payload":{}}"#)
            .await;
        dispatcher
            .handle_message(&ConnectionId::new("c1"), br#"{"type":"","payload":{}}"#)
            .await;

        let frames = client.frames.lock().unwrap();
        assert_eq!(frames.len(), 2);
        assert_eq!(error_text(&frames[0]), MISSING_TYPE_MESSAGE);
        assert_eq!(error_text(&frames[1]), MISSING_TYPE_MESSAGE);
    }

    #[tokio::test]
    async fn unknown_type_names_the_type_in_the_error() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        dispatcher.on_message("chat:send", Arc::new(EchoHandler));

        dispatcher
            .handle_message(&ConnectionId::new("c1"), br#"{"type":"chat:sned","payload":{}}"#)
            .await;

        let frames = client.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(
            error_text(&frames[0]),
            "No handler found for message type: chat:sned"
        );
    }

    #[tokio::test]
    async fn handler_failure_becomes_an_error_frame() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        dispatcher.on_message("chat:send", Arc::new(FailingHandler));

        dispatcher
            .handle_message(&ConnectionId::new("c1"), br#"{"type":"chat:send"}"#)
            .await;

        let frames = client.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "error");
        assert!(error_text(&frames[0]).contains("chat room is read-only"));
    }

    #[tokio::test]
    async fn handlers_can_reply_on_the_same_connection() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        dispatcher.on_message("chat:send", Arc::new(EchoHandler));

        dispatcher
            .handle_message(
                &ConnectionId::new("c1"),
                br#"{"type":"chat:send","payload":{"text":"hi"}}"#,
            )
            .await;

        let frames = client.frames.lock().unwrap();
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0]["type"], "echo");
        assert_eq!(frames[0]["payload"], json!({"text": "hi"}));
    }

    #[tokio::test]
    async fn registering_a_type_twice_replaces_the_handler() {
        let registry = registry_with(1024);
        let dispatcher = Dispatcher::new(Arc::clone(&registry));
        let client = connect(&registry, "c1");
        let stale = Arc::new(AtomicUsize::new(0));
        dispatcher.on_message(
            "chat:send",
            Arc::new(CountingHandler {
                calls: Arc::clone(&stale),
            }),
        );
        dispatcher.on_message("chat:send", Arc::new(EchoHandler));

        dispatcher
            .handle_message(&ConnectionId::new("c1"), br#"{"type":"chat:send","payload":1}"#)
            .await;

        assert_eq!(stale.load(Ordering::SeqCst), 0);
        assert_eq!(client.frames.lock().unwrap().len(), 1);
    }
}
