use std::sync::Arc;

use log::*;
use registry::{
    CloseFn, Connection, ConnectionId, ConnectionParams, Error, Heartbeat, Registry,
    RegistryConfig, Scope, SendFn, TransportKind,
};

use crate::event::SseEvent;
use crate::message::Message;

/// SSE broker facade: owns the registry for SSE transports and the
/// keep-alive heartbeat, and exposes registration and scoped routing.
pub struct Manager {
    registry: Arc<Registry>,
    heartbeat: Heartbeat,
}

impl Manager {
    /// Create the broker and start its heartbeat scheduler.
    pub fn new(config: RegistryConfig) -> Self {
        let interval = config.heartbeat_interval();
        let registry = Arc::new(Registry::new(config));
        let heartbeat = Heartbeat::spawn(Arc::clone(&registry), interval, SseEvent::heartbeat);

        Self {
            registry,
            heartbeat,
        }
    }

    /// Register a new connection and return its record.
    ///
    /// `user_id` and `channel` are optional fan-out keys; admission enforces
    /// the per-user quota before anything is indexed.
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
            kind: TransportKind::Sse,
            user_id,
            channel,
            send_raw,
            close_raw,
        })?;
        info!("Registered new SSE connection");
        Ok(conn)
    }

    /// Unregister a connection by id. Idempotent.
    pub fn unregister_connection(&self, id: &ConnectionId) {
        self.registry.remove_connection(id);
    }

    /// Send a message based on its scope, returning the delivery count.
    pub fn send_message(&self, message: Message) -> usize {
        match message.scope {
            Scope::Connection(id) => self
                .registry
                .send_to_connection(&id, &message.event)
                .unwrap_or_else(|err| {
                    error!("Failed to deliver SSE event to {id}: {err}");
                    0
                }),
            Scope::User(user_id) => self.registry.send_to_user(&user_id, &message.event),
            Scope::Channel(channel) => self.registry.send_to_channel(&channel, &message.event),
            Scope::Broadcast => self.registry.broadcast(&message.event),
        }
    }

    pub fn send_to_connection(&self, id: &ConnectionId, event: &SseEvent) -> Result<usize, Error> {
        self.registry.send_to_connection(id, event)
    }

    pub fn send_to_user(&self, user_id: &str, event: &SseEvent) -> usize {
        self.registry.send_to_user(user_id, event)
    }

    pub fn send_to_channel(&self, channel: &str, event: &SseEvent) -> usize {
        self.registry.send_to_channel(channel, event)
    }

    pub fn broadcast(&self, event: &SseEvent) -> usize {
        self.registry.broadcast(event)
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
        info!("Shutting down SSE broker");
        self.heartbeat.stop();
        self.registry.close_all(code, reason);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn capture() -> (SendFn, Arc<Mutex<Vec<String>>>) {
        let frames = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&frames);
        let send: SendFn = Box::new(move |bytes| {
            sink.lock().unwrap().push(String::from_utf8_lossy(bytes).into_owned());
            Ok(())
        });
        (send, frames)
    }

    fn register(
        manager: &Manager,
        id: &str,
        user_id: Option<&str>,
        channel: Option<&str>,
    ) -> Arc<Mutex<Vec<String>>> {
        let (send, frames) = capture();
        manager
            .register_connection(
                ConnectionId::new(id),
                user_id.map(String::from),
                channel.map(String::from),
                send,
                Box::new(|_, _| {}),
            )
            .unwrap();
        frames
    }

    #[tokio::test]
    async fn scoped_message_reaches_only_the_target_user() {
        let manager = Manager::new(RegistryConfig::default());
        let f1 = register(&manager, "c1", Some("u1"), None);
        let f2 = register(&manager, "c2", Some("u1"), None);
        let f3 = register(&manager, "c3", Some("u2"), None);

        let delivered = manager.send_message(Message::new(
            SseEvent::text("ping").event("n"),
            Scope::User("u1".to_string()),
        ));

        assert_eq!(delivered, 2);
        assert_eq!(f1.lock().unwrap().len(), 1);
        assert_eq!(f2.lock().unwrap().len(), 1);
        assert!(f3.lock().unwrap().is_empty());
        assert_eq!(f1.lock().unwrap()[0], "event: n\ndata: ping\n\n");
    }

    #[tokio::test]
    async fn broadcast_scope_reaches_everyone() {
        let manager = Manager::new(RegistryConfig::default());
        let f1 = register(&manager, "c1", Some("u1"), Some("x"));
        let f2 = register(&manager, "c2", None, None);

        let delivered =
            manager.send_message(Message::new(SseEvent::text("hi"), Scope::Broadcast));

        assert_eq!(delivered, 2);
        assert_eq!(f1.lock().unwrap().len(), 1);
        assert_eq!(f2.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn unregister_stops_future_deliveries() {
        let manager = Manager::new(RegistryConfig::default());
        let frames = register(&manager, "c1", Some("u1"), None);

        manager.unregister_connection(&ConnectionId::new("c1"));

        assert_eq!(manager.send_to_user("u1", &SseEvent::text("late")), 0);
        assert!(frames.lock().unwrap().is_empty());
        assert_eq!(manager.connection_count(), 0);
    }

    #[tokio::test]
    async fn close_all_zeroes_every_counter() {
        let manager = Manager::new(RegistryConfig::default());
        register(&manager, "c1", Some("u1"), Some("x"));
        register(&manager, "c2", Some("u2"), Some("x"));

        manager.close_all(None, Some("shutdown"));

        assert_eq!(manager.connection_count(), 0);
        assert_eq!(manager.user_connection_count("u1"), 0);
        assert_eq!(manager.channel_connection_count("x"), 0);
    }
}
