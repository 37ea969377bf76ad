//! Room membership registry for the relay server.
//!
//! Tracks every open connection together with the rooms it has joined. A room
//! has no record of its own: it exists exactly while at least one connection
//! is a member, and disappears with its last member. Two maps are kept in
//! step, room → connections for broadcast and connection → rooms for cleanup
//! on disconnect.
//!
//! Every operation takes the registry lock once and never awaits, so a
//! membership change or a broadcast is a single uninterrupted step.

use std::collections::{HashMap, HashSet};
use std::fmt;

use axum::extract::ws::Message;
use parking_lot::Mutex;
use roomcast_proto::id::RoomId;
use tokio::sync::mpsc;
use uuid::Uuid;

/// Sender half of a connection's outbound WebSocket channel.
pub type Outbound = mpsc::UnboundedSender<Message>;

/// Unique identifier of one client connection (UUID v7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(Uuid);

impl ConnectionId {
    /// Generates a fresh connection id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for ConnectionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

struct ConnectionEntry {
    sender: Outbound,
    /// Every room the connection is in: `joined` plus `personal`.
    rooms: HashSet<RoomId>,
    /// Rooms entered through an explicit join.
    joined: HashSet<RoomId>,
    personal: Option<RoomId>,
}

#[derive(Default)]
struct Membership {
    connections: HashMap<ConnectionId, ConnectionEntry>,
    rooms: HashMap<RoomId, HashSet<ConnectionId>>,
}

impl Membership {
    /// Puts `id` on both sides of the room maps.
    fn attach(&mut self, id: ConnectionId, room: &RoomId) -> bool {
        let Some(entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if !entry.rooms.insert(room.clone()) {
            return false;
        }
        self.rooms.entry(room.clone()).or_default().insert(id);
        true
    }

    fn remove(&mut self, id: ConnectionId, room: &RoomId) -> bool {
        let Some(entry) = self.connections.get_mut(&id) else {
            return false;
        };
        if !entry.rooms.remove(room) {
            return false;
        }
        entry.joined.remove(room);
        if entry.personal.as_ref() == Some(room) {
            entry.personal = None;
        }
        self.detach(id, room);
        true
    }

    /// Drops `id` from the room → connections side, deleting emptied rooms.
    fn detach(&mut self, id: ConnectionId, room: &RoomId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }
}

/// In-memory membership table shared by all connections of one process.
///
/// Thread-safe via [`Mutex`]. Created once at startup and handed to the
/// [`crate::relay::Relay`]; entries are removed as connections close.
pub struct RoomRegistry {
    inner: Mutex<Membership>,
}

impl Default for RoomRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl RoomRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Membership::default()),
        }
    }

    /// Registers a connection and its outbound channel.
    ///
    /// Returns `false`, leaving the existing entry untouched, if the id is
    /// already registered.
    pub fn connect(&self, id: ConnectionId, sender: Outbound) -> bool {
        let mut inner = self.inner.lock();
        if inner.connections.contains_key(&id) {
            return false;
        }
        inner.connections.insert(
            id,
            ConnectionEntry {
                sender,
                rooms: HashSet::new(),
                joined: HashSet::new(),
                personal: None,
            },
        );
        true
    }

    /// Adds a connection to a room.
    ///
    /// Returns `false` if the connection is unknown or already a member.
    /// Joining the current personal room still records the explicit join, so
    /// the room is kept when the personal room later moves.
    pub fn join(&self, id: ConnectionId, room: &RoomId) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.connections.get_mut(&id) else {
            return false;
        };
        entry.joined.insert(room.clone());
        inner.attach(id, room)
    }

    /// Makes `room` the connection's personal room.
    ///
    /// A connection has at most one personal room. A previous, different
    /// personal room is left unless the connection also joined it
    /// explicitly. Returns `false` if the connection is unknown or `room`
    /// already is its personal room.
    pub fn set_personal_room(&self, id: ConnectionId, room: &RoomId) -> bool {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.connections.get_mut(&id) else {
            return false;
        };
        if entry.personal.as_ref() == Some(room) {
            return false;
        }
        let previous = entry.personal.replace(room.clone());
        let vacated =
            previous.filter(|old| !entry.joined.contains(old) && entry.rooms.remove(old));
        if let Some(old) = vacated {
            inner.detach(id, &old);
        }
        inner.attach(id, room);
        true
    }

    /// Removes a connection from one room.
    ///
    /// Returns `false` if the connection was not a member.
    pub fn leave(&self, id: ConnectionId, room: &RoomId) -> bool {
        self.inner.lock().remove(id, room)
    }

    /// Removes a connection and all of its memberships.
    ///
    /// Returns the rooms the connection was in, sorted. Unknown ids yield an
    /// empty list.
    pub fn disconnect(&self, id: ConnectionId) -> Vec<RoomId> {
        let mut inner = self.inner.lock();
        let Some(entry) = inner.connections.remove(&id) else {
            return Vec::new();
        };
        for room in &entry.rooms {
            inner.detach(id, room);
        }
        drop(inner);

        let mut left: Vec<RoomId> = entry.rooms.into_iter().collect();
        left.sort();
        left
    }

    /// Delivers a message to a single connection.
    ///
    /// Returns `false` if the connection is unknown or its channel is closed.
    pub fn send_to(&self, id: ConnectionId, msg: Message) -> bool {
        let inner = self.inner.lock();
        inner
            .connections
            .get(&id)
            .is_some_and(|entry| entry.sender.send(msg).is_ok())
    }

    /// Delivers a message to every member of `room` except `except`.
    ///
    /// Returns the number of connections the message was handed to. Members
    /// whose channel already closed are skipped; their own disconnect cleans
    /// them up.
    pub fn broadcast(&self, room: &RoomId, except: Option<ConnectionId>, msg: &Message) -> usize {
        let inner = self.inner.lock();
        let Some(members) = inner.rooms.get(room) else {
            return 0;
        };
        members
            .iter()
            .filter(|member| Some(**member) != except)
            .filter_map(|member| inner.connections.get(member))
            .filter(|entry| entry.sender.send(msg.clone()).is_ok())
            .count()
    }

    /// Sends a WebSocket Close frame to every connection.
    ///
    /// Each connection's writer task forwards the frame and shuts down, which
    /// in turn runs the normal disconnect cleanup.
    pub fn close_all(&self) {
        let inner = self.inner.lock();
        for (id, entry) in &inner.connections {
            tracing::info!(conn_id = %id, "sending close frame");
            let _ = entry.sender.send(Message::Close(None));
        }
    }

    /// Returns the members of a room, sorted.
    #[must_use]
    pub fn members(&self, room: &RoomId) -> Vec<ConnectionId> {
        let inner = self.inner.lock();
        let mut members: Vec<ConnectionId> = inner
            .rooms
            .get(room)
            .map(|m| m.iter().copied().collect())
            .unwrap_or_default();
        drop(inner);
        members.sort();
        members
    }

    /// Returns the rooms a connection belongs to, sorted.
    #[must_use]
    pub fn rooms_of(&self, id: ConnectionId) -> Vec<RoomId> {
        let inner = self.inner.lock();
        let mut rooms: Vec<RoomId> = inner
            .connections
            .get(&id)
            .map(|entry| entry.rooms.iter().cloned().collect())
            .unwrap_or_default();
        drop(inner);
        rooms.sort();
        rooms
    }

    /// Returns the connection's personal room, if `setup` has run.
    #[must_use]
    pub fn personal_room(&self, id: ConnectionId) -> Option<RoomId> {
        let inner = self.inner.lock();
        inner
            .connections
            .get(&id)
            .and_then(|entry| entry.personal.clone())
    }

    /// Returns every room that currently has members, sorted.
    #[must_use]
    pub fn room_ids(&self) -> Vec<RoomId> {
        let inner = self.inner.lock();
        let mut rooms: Vec<RoomId> = inner.rooms.keys().cloned().collect();
        drop(inner);
        rooms.sort();
        rooms
    }

    /// Returns `true` if the connection is registered.
    #[must_use]
    pub fn contains(&self, id: ConnectionId) -> bool {
        self.inner.lock().connections.contains_key(&id)
    }

    /// Number of rooms with at least one member.
    #[must_use]
    pub fn room_count(&self) -> usize {
        self.inner.lock().rooms.len()
    }

    /// Number of registered connections.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.inner.lock().connections.len()
    }
}
