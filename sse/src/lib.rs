//! Server-Sent Events (SSE) broker for one-way real-time updates.
//!
//! This crate pairs the core connection registry with the
//! `text/event-stream` wire format to push events from the backend to
//! connected clients.
//!
//! # Architecture
//!
//! - **Triple-index registry**: O(1) routing by connection id, user id, and
//!   channel via the shared `registry` crate.
//! - **Connection, user, channel, and broadcast scopes**: messages can be
//!   sent to one transport, all of a user's transports, a channel, or
//!   everyone.
//! - **Ephemeral messages**: events are fire-and-forget. A client that is
//!   offline misses the event and reconciles from fresh data on reconnect.
//! - **Keep-alive heartbeat**: a `heartbeat` event broadcast on a fixed
//!   period keeps intermediaries from reaping idle streams.
//!
//! # Message Flow
//!
//! 1. The accept loop establishes the stream and hands the broker the
//!    connection id, identity, and transport hooks
//! 2. The connection is registered in the shared registry with all indices
//!    updated atomically
//! 3. When something noteworthy happens, application code sends a
//!    [`Message`] via [`Manager::send_message`] (or publishes an
//!    `events::AppEvent` consumed by [`SseEventBridge`])
//! 4. The broker snapshots the target set, encodes the event, and writes one
//!    frame per live transport
//!
//! # Example: Sending an event
//!
//! ```rust,ignore
//! use sse::{Manager, Message, SseEvent};
//! use registry::Scope;
//!
//! let delivered = manager.send_message(Message {
//!     event: SseEvent::json(payload).event("order_updated"),
//!     scope: Scope::User(recipient_id),
//! });
//! ```
//!
//! # Modules
//!
//! - `event`: `text/event-stream` frame shape and encoder
//! - `event_bridge`: forwards published application events to the broker
//! - `manager`: registration, scoped routing, heartbeat ownership
//! - `message`: scoped message envelope

pub mod event;
pub mod event_bridge;
pub mod manager;
pub mod message;

pub use event::{SseData, SseEvent};
pub use event_bridge::SseEventBridge;
pub use manager::Manager;
pub use message::Message;
