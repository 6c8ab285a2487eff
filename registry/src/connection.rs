use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, Weak};
use std::time::Instant;

use log::*;

use crate::error::{transport_error, Error, TransportErrorKind};
use crate::frame::Frame;
use crate::registry::SharedState;

/// Unique identifier for a connection. Opaque to the registry; normally
/// supplied by the accept loop, or generated server-side via
/// [`ConnectionId::generate`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ConnectionId(String);

impl ConnectionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random connection id.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for ConnectionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Which transport a connection record fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Sse,
    WebSocket,
}

/// Transport write hook. Invoked with one fully encoded frame; an error means
/// the transport is dead and the connection will be removed.
pub type SendFn = Box<dyn Fn(&[u8]) -> io::Result<()> + Send + Sync>;

/// Transport close hook. Invoked at most once, with an optional close code
/// and reason. Best-effort: failures inside the hook are the hook's problem.
pub type CloseFn = Box<dyn Fn(Option<u16>, Option<&str>) + Send + Sync>;

/// Everything the accept loop hands the registry to register one transport.
pub struct ConnectionParams {
    pub id: ConnectionId,
    pub kind: TransportKind,
    /// Resolved user identity, or `None` for anonymous connections.
    /// Empty strings are normalized to `None` at admission.
    pub user_id: Option<String>,
    /// Logical topic this connection subscribes to, if any.
    /// Empty strings are normalized to `None` at admission.
    pub channel: Option<String>,
    pub send_raw: SendFn,
    pub close_raw: CloseFn,
}

/// One live transport between the process and a remote client.
///
/// A record exists in the registry's indices exactly while it is alive.
/// Removal happens once, through whichever path gets there first: explicit
/// deregistration, the record's own [`close`](Connection::close), a failed
/// write, or registry shutdown.
pub struct Connection {
    id: ConnectionId,
    kind: TransportKind,
    user_id: Option<String>,
    channel: Option<String>,
    connected_at: Instant,
    send_raw: SendFn,
    close_raw: CloseFn,
    /// Serializes encode + write so frames never interleave on one wire.
    send_lock: Mutex<()>,
    /// True while the record is present in the registry indices.
    alive: AtomicBool,
    /// Ensures `close_raw` runs exactly once.
    close_called: AtomicBool,
    /// Deregistration capability back into the owning registry. Weak, so a
    /// record held by a publisher snapshot cannot keep the registry alive.
    state: Weak<SharedState>,
}

impl Connection {
    pub(crate) fn new(params: ConnectionParams, state: Weak<SharedState>) -> Self {
        Self {
            id: params.id,
            kind: params.kind,
            user_id: params.user_id,
            channel: params.channel,
            connected_at: Instant::now(),
            send_raw: params.send_raw,
            close_raw: params.close_raw,
            send_lock: Mutex::new(()),
            alive: AtomicBool::new(true),
            close_called: AtomicBool::new(false),
            state,
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn channel(&self) -> Option<&str> {
        self.channel.as_deref()
    }

    pub fn connected_at(&self) -> Instant {
        self.connected_at
    }

    /// Whether this record is still present in the registry indices.
    pub fn is_alive(&self) -> bool {
        self.alive.load(Ordering::Acquire)
    }

    /// Flip the record dead. Called under the registry lock while the record
    /// is being removed from the indices.
    pub(crate) fn mark_dead(&self) {
        self.alive.store(false, Ordering::Release);
    }

    /// Encode `frame` and write it to the transport.
    ///
    /// The per-connection send lock is held across encoding and the single
    /// `send_raw` call, so two concurrent sends to this connection appear on
    /// the wire in lock-acquisition order and never interleave. Sends to a
    /// record that has already been removed fail with a `Closed` transport
    /// error and write nothing.
    pub fn send(&self, frame: &dyn Frame) -> Result<(), Error> {
        if !self.is_alive() {
            return Err(transport_error(
                TransportErrorKind::Closed,
                "connection is closed",
            ));
        }

        let _guard = self
            .send_lock
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let bytes = frame.encode()?;
        (self.send_raw)(&bytes).map_err(Error::from)
    }

    /// Close the transport and deregister this record.
    ///
    /// The first call invokes `close_raw` and removes the record from the
    /// registry; subsequent calls are no-ops. Safe to call from any thread,
    /// including publisher loops that discover a dead transport.
    pub fn close(&self, code: Option<u16>, reason: Option<&str>) {
        if self.close_called.swap(true, Ordering::AcqRel) {
            return;
        }

        if let Some(state) = self.state.upgrade() {
            // Guard on identity: the id may have been reused by a newer
            // record after this one was removed.
            state.detach_exact(&self.id, self as *const Connection);
        }
        // Shutdown may have already detached us; the flag must drop either way.
        self.mark_dead();

        debug!("Closing connection {}", self.id);
        (self.close_raw)(code, reason);
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("user_id", &self.user_id)
            .field("channel", &self.channel)
            .field("alive", &self.is_alive())
            .finish_non_exhaustive()
    }
}
