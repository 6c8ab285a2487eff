//! WebSocket broker for full-duplex real-time messaging.
//!
//! This crate pairs the core connection registry with a JSON message
//! envelope and a type-indexed inbound dispatcher.
//!
//! # Architecture
//!
//! - **Triple-index registry**: O(1) routing by connection id, user id, and
//!   channel via the shared `registry` crate.
//! - **Typed envelope**: every message on the wire is
//!   `{type, payload, id?, timestamp}`; the broker fills `timestamp` when the
//!   sender omits it.
//! - **Pluggable handlers**: inbound frames dispatch by their `type` string
//!   to a registered [`MessageHandler`]. Handler and validation failures are
//!   answered with an `error` frame on the same connection and never
//!   propagate.
//! - **Keep-alive heartbeat**: a `heartbeat` message broadcast on a fixed
//!   period.
//!
//! # Message Flow
//!
//! Outbound: application code targets a connection, user, channel, or
//! everyone through [`Manager`]; the broker snapshots the target set and
//! writes one encoded envelope per live transport.
//!
//! Inbound: the accept loop pushes each received frame into
//! [`Manager::handle_message`], which validates size and shape, then invokes
//! the handler registered for the message type.
//!
//! # Modules
//!
//! - `dispatcher`: inbound validation and type-indexed dispatch
//! - `manager`: registration, outbound routing, heartbeat ownership
//! - `message`: the wire envelope and its encoder

pub mod dispatcher;
pub mod manager;
pub mod message;

pub use dispatcher::{Dispatcher, MessageHandler};
pub use manager::Manager;
pub use message::WsMessage;
