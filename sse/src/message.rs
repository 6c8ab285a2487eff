use registry::Scope;

use crate::event::SseEvent;

/// One outbound SSE event paired with its delivery scope.
#[derive(Debug, Clone)]
pub struct Message {
    pub event: SseEvent,
    pub scope: Scope,
}

impl Message {
    pub fn new(event: SseEvent, scope: Scope) -> Self {
        Self { event, scope }
    }
}
