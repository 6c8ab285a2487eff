//! Targeted delivery with snapshot semantics.
//!
//! Multi-target operations copy the target set out of the indices under the
//! registry lock, drop the lock, then deliver. Connections registered after
//! the snapshot are not targeted; connections removed after the snapshot fail
//! their send and are not counted. A dead transport discovered mid-loop is
//! closed and the loop continues, so these operations always return a count.

use std::sync::Arc;

use log::*;

use crate::connection::{Connection, ConnectionId};
use crate::error::{Error, ErrorKind};
use crate::frame::Frame;
use crate::registry::Registry;

/// Delivery target for one outbound message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Scope {
    /// One specific connection.
    Connection(ConnectionId),
    /// Every connection registered to a user.
    User(String),
    /// Every connection subscribed to a channel.
    Channel(String),
    /// Every connection in the registry.
    Broadcast,
}

impl Registry {
    /// Send one frame to one connection.
    ///
    /// Returns `Ok(0)` when the id is unknown and `Ok(1)` on delivery.
    /// Unlike the multi-target operations, failures surface to the caller; a
    /// write failure additionally closes the connection.
    pub fn send_to_connection(&self, id: &ConnectionId, frame: &dyn Frame) -> Result<usize, Error> {
        let Some(conn) = self.get_connection(id) else {
            return Ok(0);
        };

        match conn.send(frame) {
            Ok(()) => Ok(1),
            Err(err) => {
                if err.is_write_failure() {
                    warn!("Write to connection {id} failed, removing it: {err}");
                    conn.close(None, None);
                }
                Err(err)
            }
        }
    }

    /// Send one frame to every connection registered to `user_id`.
    /// Returns the number of successful deliveries.
    pub fn send_to_user(&self, user_id: &str, frame: &dyn Frame) -> usize {
        self.deliver(self.snapshot_user(user_id), frame)
    }

    /// Send one frame to every connection subscribed to `channel`.
    /// Returns the number of successful deliveries.
    pub fn send_to_channel(&self, channel: &str, frame: &dyn Frame) -> usize {
        self.deliver(self.snapshot_channel(channel), frame)
    }

    /// Send one frame to every connection. Returns the number of successful
    /// deliveries.
    pub fn broadcast(&self, frame: &dyn Frame) -> usize {
        self.deliver(self.snapshot_all(), frame)
    }

    /// Deliver to a snapshot, outside the registry lock.
    fn deliver(&self, targets: Vec<Arc<Connection>>, frame: &dyn Frame) -> usize {
        let mut delivered = 0;

        for conn in targets {
            match conn.send(frame) {
                Ok(()) => delivered += 1,
                Err(err) => match err.error_kind {
                    ErrorKind::Encoding => {
                        // The connection is healthy; only this message is
                        // undeliverable to it.
                        warn!("Skipping connection {}: {err}", conn.id());
                    }
                    ErrorKind::Transport(_) if err.is_write_failure() => {
                        warn!("Write to connection {} failed, removing it: {err}", conn.id());
                        conn.close(None, None);
                    }
                    _ => {
                        // Removed between snapshot and send; nothing to do.
                        debug!("Connection {} closed before delivery", conn.id());
                    }
                },
            }
        }

        delivered
    }
}
