use async_trait::async_trait;
use events::{AppEvent, BroadcastScope, EventHandler};
use log::*;
use registry::Scope;
use std::sync::Arc;

use crate::event::SseEvent;
use crate::manager::Manager;
use crate::message::Message;

/// Forwards published application events to connected SSE clients.
///
/// Application code decides who should be notified and publishes an
/// [`AppEvent`] with that scope; this handler converts it into an SSE event
/// and routes it. It owns no policy of its own.
pub struct SseEventBridge {
    manager: Arc<Manager>,
}

impl SseEventBridge {
    pub fn new(manager: Arc<Manager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl EventHandler for SseEventBridge {
    async fn handle(&self, event: &AppEvent) {
        let scope = match &event.scope {
            BroadcastScope::User(user_id) => Scope::User(user_id.clone()),
            BroadcastScope::Channel(channel) => Scope::Channel(channel.clone()),
            BroadcastScope::All => Scope::Broadcast,
        };

        let sse_event = SseEvent::json(event.payload.clone()).event(event.name.clone());
        let delivered = self.manager.send_message(Message::new(sse_event, scope));

        info!(
            "Forwarded {} event to {} connection(s)",
            event.name, delivered
        );
    }
}
