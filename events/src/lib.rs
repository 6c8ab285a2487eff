//! Event system infrastructure for the fan-out platform.
//!
//! This crate provides the hook surface that decouples application code from
//! the realtime brokers: producers publish [`AppEvent`]s without knowing how
//! (or whether) they reach a client, and broker crates register
//! [`EventHandler`]s that forward them over live connections.
//!
//! # Architecture
//!
//! - **AppEvent**: a named event with an arbitrary JSON payload and a
//!   delivery scope
//! - **EventHandler**: trait for implementing event handlers
//! - **EventPublisher**: publishes events to registered handlers
//!
//! This crate has no dependencies on the other fan-out crates, avoiding
//! circular dependencies. Payloads are carried as serialized JSON values.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

/// Who an event is addressed to. Identities are opaque strings; the brokers
/// resolve them against their own connection indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BroadcastScope {
    /// All connections belonging to one user.
    User(String),
    /// All connections subscribed to one channel.
    Channel(String),
    /// Every connection.
    All,
}

/// One application-level event bound for connected clients.
#[derive(Debug, Clone)]
pub struct AppEvent {
    /// Event name as seen by the client (e.g. `"order_updated"`).
    pub name: String,
    /// Serialized event payload.
    pub payload: Value,
    pub scope: BroadcastScope,
}

impl AppEvent {
    pub fn new(name: impl Into<String>, payload: Value, scope: BroadcastScope) -> Self {
        Self {
            name: name.into(),
            payload,
            scope,
        }
    }
}

/// Trait for handling published events.
/// Implementations can perform side effects like forwarding to connected
/// clients, updating caches, logging, etc.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn handle(&self, event: &AppEvent);
}

/// Publishes events to registered handlers.
/// Handlers are called sequentially in registration order.
#[derive(Clone, Default)]
pub struct EventPublisher {
    handlers: Arc<Vec<Arc<dyn EventHandler>>>,
}

impl EventPublisher {
    pub fn new() -> Self {
        Self {
            handlers: Arc::new(Vec::new()),
        }
    }

    /// Register a new event handler.
    /// Note: This creates a new publisher instance with the additional
    /// handler. Store the returned publisher in your application state.
    pub fn with_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        let mut handlers = (*self.handlers).clone();
        handlers.push(handler);
        self.handlers = Arc::new(handlers);
        self
    }

    /// Publish an event to all registered handlers, sequentially.
    pub async fn publish(&self, event: AppEvent) {
        for handler in self.handlers.iter() {
            handler.handle(&event).await;
        }
    }
}
