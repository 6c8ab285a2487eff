//! Core connection fan-out registry for real-time transports.
//!
//! This crate provides the shared substrate underneath the `sse` and
//! `websocket` broker crates: connection records, the triple-index registry,
//! targeted publishing, and the heartbeat scheduler.
//!
//! # Architecture
//!
//! - **Triple-index registry**: O(1) lookups by connection id, by user id,
//!   and by channel. All three indices are mutated together under a single
//!   short-lived lock, so observers never see a partially indexed connection.
//! - **Admission control**: a per-user connection quota is enforced
//!   atomically with insertion; rejected registrations mutate nothing.
//! - **Snapshot publishing**: multi-target sends copy the target set out of
//!   the indices under the lock, then deliver without holding it. Transport
//!   writes never happen under the registry lock.
//! - **Per-connection send lock**: encoded frames for one connection are
//!   written atomically, so frames never interleave at the byte level while
//!   unrelated connections write in parallel.
//! - **Heartbeat scheduler**: a tokio task broadcasting a keep-alive frame on
//!   a fixed period until shut down.
//!
//! # Transport neutrality
//!
//! The registry does not know how bytes reach the client. Callers hand it a
//! pair of closures per connection (`SendFn`, `CloseFn`) wrapping whatever
//! transport the accept loop established. Outbound messages implement the
//! [`Frame`] trait to produce their on-wire encoding.
//!
//! # Modules
//!
//! - `config`: tunable limits and intervals with sensible defaults
//! - `connection`: per-connection record, identity, and transport hooks
//! - `error`: error types shared across the fan-out crates
//! - `frame`: the outbound encoding seam
//! - `heartbeat`: periodic keep-alive broadcast task
//! - `publisher`: targeted delivery with snapshot semantics
//! - `registry`: admission, indexing, and lifecycle

pub mod config;
pub mod connection;
pub mod error;
pub mod frame;
pub mod heartbeat;
pub mod publisher;
pub mod registry;

pub use config::RegistryConfig;
pub use connection::{CloseFn, Connection, ConnectionId, ConnectionParams, SendFn, TransportKind};
pub use error::{AdmissionErrorKind, Error, ErrorKind, TransportErrorKind};
pub use frame::Frame;
pub use heartbeat::Heartbeat;
pub use publisher::Scope;
pub use registry::Registry;
