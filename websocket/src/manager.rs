use std::sync::Arc;

use log::*;
use registry::{
    CloseFn, Connection, ConnectionId, ConnectionParams, Error, Heartbeat, Registry,
    RegistryConfig, SendFn, TransportKind,
};

use crate::dispatcher::{Dispatcher, MessageHandler};
use crate::message::WsMessage;

/// WebSocket broker facade: owns the registry for WebSocket transports, the
/// inbound dispatcher, and the keep-alive heartbeat.
pub struct Manager {
    registry: Arc<Registry>,
    dispatcher: Dispatcher,
    heartbeat: Heartbeat,
}

impl Manager {
    /// Create the broker and start its heartbeat scheduler.
    pub fn new(config: RegistryConfig) -> Self {
        let interval = config.heartbeat_interval();
        let registry = Arc::new(Registry::new(config));
        let heartbeat = Heartbeat::spawn(Arc::clone(&registry), interval, WsMessage::heartbeat);

        Self {
            dispatcher: Dispatcher::new(Arc::clone(&registry)),
            registry,
            heartbeat,
        }
    }

    /// Register a new connection and return its record.
    pub fn register_connection(
        &self,
        id: ConnectionId,
        user_id: Option<String>,
        channel: Option<String>,
        send_raw: SendFn,
        close_raw: CloseFn,
    ) -> Result<Arc<Connection>, Error> {
        let conn = self.registry.add_connection(ConnectionParams {
            id,
            kind: TransportKind::WebSocket,
            user_id,
            channel,
            send_raw,
            close_raw,
        })?;
        info!("Registered new WebSocket connection");
        Ok(conn)
    }

    /// Unregister a connection by id. Idempotent.
    pub fn unregister_connection(&self, id: &ConnectionId) {
        self.registry.remove_connection(id);
    }

    /// Register (or replace) the handler for an inbound message type.
    pub fn on_message(&self, message_type: impl Into<String>, handler: Arc<dyn MessageHandler>) {
        self.dispatcher.on_message(message_type, handler);
    }

    /// Validate and dispatch one inbound frame. Never fails; all problems
    /// are reported to the client as `error` frames.
    pub async fn handle_message(&self, connection_id: &ConnectionId, raw: &[u8]) {
        self.dispatcher.handle_message(connection_id, raw).await;
    }

    pub fn send_to_connection(
        &self,
        id: &ConnectionId,
        message: &WsMessage,
    ) -> Result<usize, Error> {
        self.registry.send_to_connection(id, message)
    }

    pub fn send_to_user(&self, user_id: &str, message: &WsMessage) -> usize {
        self.registry.send_to_user(user_id, message)
    }

    pub fn send_to_channel(&self, channel: &str, message: &WsMessage) -> usize {
        self.registry.send_to_channel(channel, message)
    }

    pub fn broadcast(&self, message: &WsMessage) -> usize {
        self.registry.broadcast(message)
    }

    pub fn get_connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.registry.get_connection(id)
    }

    pub fn connection_count(&self) -> usize {
        self.registry.connection_count()
    }

    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.registry.user_connection_count(user_id)
    }

    pub fn channel_connection_count(&self, channel: &str) -> usize {
        self.registry.channel_connection_count(channel)
    }

    pub fn config(&self) -> &RegistryConfig {
        self.registry.config()
    }

    /// Close every connection and stop the heartbeat scheduler.
    pub fn close_all(&self, code: Option<u16>, reason: Option<&str>) {
        info!("Shutting down WebSocket broker");
        self.heartbeat.stop();
        self.registry.close_all(code, reason);
    }
}
