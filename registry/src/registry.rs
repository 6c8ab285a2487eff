use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use log::*;

use crate::config::RegistryConfig;
use crate::connection::{Connection, ConnectionId, ConnectionParams};
use crate::error::{admission_error, AdmissionErrorKind, Error};

/// The three indices, always mutated together.
///
/// Invariants at every quiescent point:
/// - every id in `by_user`/`by_channel` keys a record in `connections` whose
///   user id / channel matches, and vice versa;
/// - no set in `by_user`/`by_channel` is empty (empty sets are deleted);
/// - a record is present here iff it is alive.
#[derive(Default)]
struct Indexes {
    connections: HashMap<ConnectionId, Arc<Connection>>,
    by_user: HashMap<String, HashSet<ConnectionId>>,
    by_channel: HashMap<String, HashSet<ConnectionId>>,
}

impl Indexes {
    fn remove(&mut self, id: &ConnectionId) -> Option<Arc<Connection>> {
        let conn = self.connections.remove(id)?;

        if let Some(user_id) = conn.user_id() {
            if let Some(ids) = self.by_user.get_mut(user_id) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_user.remove(user_id);
                }
            }
        }

        if let Some(channel) = conn.channel() {
            if let Some(ids) = self.by_channel.get_mut(channel) {
                ids.remove(id);
                if ids.is_empty() {
                    self.by_channel.remove(channel);
                }
            }
        }

        conn.mark_dead();
        Some(conn)
    }
}

/// State shared between the registry handle and its connection records.
/// Records hold a `Weak` reference to this so that `Connection::close` can
/// deregister without an ownership cycle.
pub(crate) struct SharedState {
    indexes: Mutex<Indexes>,
}

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, Indexes> {
        self.indexes
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remove `id` from all three indices. Idempotent.
    pub(crate) fn detach(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.lock().remove(id)
    }

    /// Remove `id` only if it still maps to the given record.
    pub(crate) fn detach_exact(
        &self,
        id: &ConnectionId,
        record: *const Connection,
    ) -> Option<Arc<Connection>> {
        let mut indexes = self.lock();
        let is_same_record = indexes
            .connections
            .get(id)
            .is_some_and(|conn| std::ptr::eq(Arc::as_ptr(conn), record));
        if is_same_record {
            indexes.remove(id)
        } else {
            None
        }
    }
}

/// Connection fan-out registry: admission, triple-index bookkeeping, and
/// lifecycle for one broker's live transports.
///
/// `add_connection` and `remove_connection` are single critical sections over
/// all three indices, so external observers never see a partially indexed
/// connection, and the per-user quota check is atomic with insertion.
pub struct Registry {
    config: RegistryConfig,
    state: Arc<SharedState>,
}

impl Registry {
    pub fn new(config: RegistryConfig) -> Self {
        Self {
            config,
            state: Arc::new(SharedState {
                indexes: Mutex::new(Indexes::default()),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Admit and index a new connection.
    ///
    /// Rejections (duplicate id, user quota reached) mutate nothing. When two
    /// registrations for the same user race against the quota, at most one
    /// succeeds.
    pub fn add_connection(&self, mut params: ConnectionParams) -> Result<Arc<Connection>, Error> {
        // Empty identity strings behave as absent: no quota, no index entry.
        params.user_id = params.user_id.filter(|user_id| !user_id.is_empty());
        params.channel = params.channel.filter(|channel| !channel.is_empty());

        let mut indexes = self.state.lock();

        if indexes.connections.contains_key(&params.id) {
            return Err(admission_error(
                AdmissionErrorKind::DuplicateId,
                &format!("connection id {} is already registered", params.id),
            ));
        }

        if let Some(user_id) = &params.user_id {
            let held = indexes.by_user.get(user_id).map_or(0, HashSet::len);
            if held >= self.config.max_connections_per_user {
                return Err(admission_error(
                    AdmissionErrorKind::QuotaExceeded,
                    &format!(
                        "user {user_id} already holds {held} of {} allowed connections",
                        self.config.max_connections_per_user
                    ),
                ));
            }
        }

        let id = params.id.clone();
        let user_id = params.user_id.clone();
        let channel = params.channel.clone();
        let conn = Arc::new(Connection::new(params, Arc::downgrade(&self.state)));

        indexes.connections.insert(id.clone(), Arc::clone(&conn));
        if let Some(user_id) = user_id {
            indexes.by_user.entry(user_id).or_default().insert(id.clone());
        }
        if let Some(channel) = channel {
            indexes
                .by_channel
                .entry(channel)
                .or_default()
                .insert(id.clone());
        }
        drop(indexes);

        debug!("Registered connection {id}");
        Ok(conn)
    }

    /// Remove a connection from all indices. Idempotent; unknown ids are a
    /// no-op. Does not touch the transport: pair with
    /// [`Connection::close`] when the transport should be shut down too.
    pub fn remove_connection(&self, id: &ConnectionId) {
        if self.state.detach(id).is_some() {
            debug!("Removed connection {id}");
        }
    }

    pub fn get_connection(&self, id: &ConnectionId) -> Option<Arc<Connection>> {
        self.state.lock().connections.get(id).cloned()
    }

    pub fn connection_count(&self) -> usize {
        self.state.lock().connections.len()
    }

    pub fn user_connection_count(&self, user_id: &str) -> usize {
        self.state.lock().by_user.get(user_id).map_or(0, HashSet::len)
    }

    pub fn channel_connection_count(&self, channel: &str) -> usize {
        self.state
            .lock()
            .by_channel
            .get(channel)
            .map_or(0, HashSet::len)
    }

    /// Close every connection and empty all indices.
    ///
    /// Transport close hooks run outside the registry lock, after the indices
    /// are already drained, so a slow `close_raw` cannot stall registrations
    /// arriving on other threads.
    pub fn close_all(&self, code: Option<u16>, reason: Option<&str>) {
        let drained: Vec<Arc<Connection>> = {
            let mut indexes = self.state.lock();
            indexes.by_user.clear();
            indexes.by_channel.clear();
            indexes
                .connections
                .drain()
                .map(|(_, conn)| {
                    conn.mark_dead();
                    conn
                })
                .collect()
        };

        if drained.is_empty() {
            return;
        }

        info!("Closing all {} connection(s)", drained.len());
        for conn in drained {
            conn.close(code, reason);
        }
    }

    /// Snapshot of all live records, taken under the registry lock.
    pub(crate) fn snapshot_all(&self) -> Vec<Arc<Connection>> {
        self.state.lock().connections.values().cloned().collect()
    }

    /// Snapshot of one user's records, taken under the registry lock.
    pub(crate) fn snapshot_user(&self, user_id: &str) -> Vec<Arc<Connection>> {
        let indexes = self.state.lock();
        match indexes.by_user.get(user_id) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| indexes.connections.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }

    /// Snapshot of one channel's records, taken under the registry lock.
    pub(crate) fn snapshot_channel(&self, channel: &str) -> Vec<Arc<Connection>> {
        let indexes = self.state.lock();
        match indexes.by_channel.get(channel) {
            Some(ids) => ids
                .iter()
                .filter_map(|id| indexes.connections.get(id).cloned())
                .collect(),
            None => Vec::new(),
        }
    }
}
