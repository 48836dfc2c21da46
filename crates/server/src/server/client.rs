//! Connected viewer registry.

use protocol::ServerMessage;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;

/// Errors raised while pushing a message to a viewer.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("connection closed")]
    Closed,

    #[error(transparent)]
    Encode(#[from] protocol::ProtocolError),
}

/// Outbound side of a viewer connection.
pub trait Transport: Send + Sync {
    /// Whether the peer can still receive messages.
    fn is_open(&self) -> bool;

    /// Queue a message for delivery. Must not block.
    fn send(&self, msg: &ServerMessage) -> Result<(), SendError>;
}

/// Opaque key identifying a live connection, chosen by the network layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnHandle(pub u64);

impl std::fmt::Display for ConnHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "conn#{}", self.0)
    }
}

/// A connected viewer.
pub struct ClientConnection {
    /// Client id, `c<n>`.
    pub id: String,
    pub handle: ConnHandle,
    /// Camera center used for AOI queries.
    pub view_x: f64,
    pub view_z: f64,
    /// Agent whose position drives the camera.
    pub follow_agent_id: Option<String>,
    /// Tick of the first snapshot delivered; 0 means a full unfiltered
    /// snapshot is still owed.
    pub last_ack_tick: u64,
    pub connected_at: Instant,
    pub transport: Arc<dyn Transport>,
}

impl ClientConnection {
    pub fn needs_full_snapshot(&self) -> bool {
        self.last_ack_tick == 0
    }
}

impl std::fmt::Debug for ClientConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConnection")
            .field("id", &self.id)
            .field("handle", &self.handle)
            .field("view", &(self.view_x, self.view_z))
            .field("follow_agent_id", &self.follow_agent_id)
            .field("last_ack_tick", &self.last_ack_tick)
            .finish()
    }
}

/// Registry of connected viewers.
///
/// Two explicit tables: client id -> state and connection handle -> client id.
#[derive(Debug, Default)]
pub struct ClientManager {
    next_client_id: u64,
    clients: HashMap<String, ClientConnection>,
    by_handle: HashMap<ConnHandle, String>,
    /// Ids of all clients, rebuilt only after add/remove.
    cached_ids: Option<Arc<[String]>>,
}

impl ClientManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new connection and return its client id.
    pub fn add_client(&mut self, handle: ConnHandle, transport: Arc<dyn Transport>) -> String {
        self.next_client_id += 1;
        let id = format!("c{}", self.next_client_id);

        if let Some(old_id) = self.by_handle.insert(handle, id.clone()) {
            self.clients.remove(&old_id);
        }
        self.clients.insert(
            id.clone(),
            ClientConnection {
                id: id.clone(),
                handle,
                view_x: 0.0,
                view_z: 0.0,
                follow_agent_id: None,
                last_ack_tick: 0,
                connected_at: Instant::now(),
                transport,
            },
        );
        self.cached_ids = None;
        id
    }

    /// Forget a connection. Returns the removed entry.
    pub fn remove_client(&mut self, handle: ConnHandle) -> Option<ClientConnection> {
        let id = self.by_handle.remove(&handle)?;
        self.cached_ids = None;
        self.clients.remove(&id)
    }

    pub fn update_viewport(&mut self, handle: ConnHandle, x: f64, z: f64) {
        if let Some(client) = self.get_by_handle_mut(handle) {
            client.view_x = x;
            client.view_z = z;
        }
    }

    pub fn set_follow_agent(&mut self, handle: ConnHandle, agent_id: impl Into<String>) {
        if let Some(client) = self.get_by_handle_mut(handle) {
            client.follow_agent_id = Some(agent_id.into());
        }
    }

    pub fn ack_tick(&mut self, handle: ConnHandle, tick: u64) {
        if let Some(client) = self.get_by_handle_mut(handle) {
            client.last_ack_tick = tick;
        }
    }

    pub fn get_by_handle(&self, handle: ConnHandle) -> Option<&ClientConnection> {
        self.by_handle.get(&handle).and_then(|id| self.clients.get(id))
    }

    pub fn get_by_handle_mut(&mut self, handle: ConnHandle) -> Option<&mut ClientConnection> {
        let id = self.by_handle.get(&handle)?;
        self.clients.get_mut(id)
    }

    pub fn get(&self, id: &str) -> Option<&ClientConnection> {
        self.clients.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ClientConnection> {
        self.clients.get_mut(id)
    }

    /// Ids of every connected client.
    ///
    /// The sequence is cached and shared until the next add/remove.
    pub fn get_all_clients(&mut self) -> Arc<[String]> {
        self.cached_ids
            .get_or_insert_with(|| self.clients.keys().cloned().collect())
            .clone()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ClientConnection> {
        self.clients.values()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ClientConnection> {
        self.clients.values_mut()
    }

    pub fn len(&self) -> usize {
        self.clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
