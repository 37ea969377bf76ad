//! Relay core: routes inbound client events to rooms.
//!
//! The relay is stateless per event. All state lives in the injected
//! [`RoomRegistry`]; each handler performs its membership change or
//! broadcast synchronously and returns. Nothing is ever reported back to the
//! sender on failure: malformed events are dropped, and the connection stays
//! open.

use std::sync::Arc;

use axum::extract::ws::Message;
use roomcast_proto::codec::{self, CodecError};
use roomcast_proto::event::{ClientEvent, ServerEvent};
use roomcast_proto::id::RoomId;
use roomcast_proto::message::ChatMessage;
use serde_json::Value;

use crate::registry::{ConnectionId, Outbound, RoomRegistry};

/// Event router layered on a [`RoomRegistry`].
#[derive(Clone)]
pub struct Relay {
    registry: Arc<RoomRegistry>,
}

impl Default for Relay {
    fn default() -> Self {
        Self::new(Arc::new(RoomRegistry::new()))
    }
}

impl Relay {
    /// Creates a relay over the given registry.
    #[must_use]
    pub fn new(registry: Arc<RoomRegistry>) -> Self {
        Self { registry }
    }

    /// Returns the membership registry.
    #[must_use]
    pub const fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    /// Registers a freshly opened connection.
    pub fn connect(&self, conn: ConnectionId, sender: Outbound) {
        if !self.registry.connect(conn, sender) {
            tracing::warn!(conn_id = %conn, "connection id already registered");
            return;
        }
        tracing::info!(conn_id = %conn, "client connected");
    }

    /// Removes a closed connection from every room it joined.
    ///
    /// Other members are not notified.
    pub fn disconnect(&self, conn: ConnectionId) {
        let rooms = self.registry.disconnect(conn);
        tracing::info!(conn_id = %conn, rooms = rooms.len(), "client disconnected");
    }

    /// Decodes a text frame and dispatches it.
    ///
    /// Undecodable frames and unknown event names are logged and dropped.
    pub fn handle_frame(&self, conn: ConnectionId, text: &str) {
        match codec::decode_client(text) {
            Ok(event) => self.handle_event(conn, event),
            Err(CodecError::UnknownEvent(name)) => {
                tracing::debug!(conn_id = %conn, event = %name, "ignoring unknown event");
            }
            Err(e) => {
                tracing::warn!(conn_id = %conn, error = %e, "dropping malformed frame");
            }
        }
    }

    /// Dispatches one inbound event from `conn`.
    pub fn handle_event(&self, conn: ConnectionId, event: ClientEvent) {
        match event {
            ClientEvent::Setup(user) => self.setup(conn, user),
            ClientEvent::JoinRoom(room) => self.join_room(conn, room),
            ClientEvent::Typing(room) => self.presence(conn, room, ServerEvent::Typing),
            ClientEvent::StopTyping(room) => self.presence(conn, room, ServerEvent::StopTyping),
            ClientEvent::NewMessage(payload) => self.new_message(conn, payload),
        }
    }

    /// `setup`: join the personal room and acknowledge with `connected`.
    fn setup(&self, conn: ConnectionId, user: Option<RoomId>) {
        let Some(user) = user else {
            tracing::debug!(conn_id = %conn, "setup without user id, ignoring");
            return;
        };
        self.registry.set_personal_room(conn, &user);
        tracing::info!(conn_id = %conn, user = %user, "joined personal room");

        if let Some(msg) = encode(ServerEvent::Connected) {
            self.registry.send_to(conn, msg);
        }
    }

    /// `join room`: join a chat room.
    fn join_room(&self, conn: ConnectionId, room: Option<RoomId>) {
        let Some(room) = room else {
            tracing::debug!(conn_id = %conn, "join room without room id, ignoring");
            return;
        };
        if self.registry.join(conn, &room) {
            tracing::info!(conn_id = %conn, room = %room, "joined room");
        }
    }

    /// `typing` / `stop typing`: tell everyone else in the room.
    fn presence(&self, conn: ConnectionId, room: Option<RoomId>, event: ServerEvent) {
        let Some(room) = room else {
            tracing::debug!(conn_id = %conn, event = event.name(), "presence without room id, ignoring");
            return;
        };
        let name = event.name();
        let Some(msg) = encode(event) else {
            return;
        };
        let delivered = self.registry.broadcast(&room, Some(conn), &msg);
        tracing::debug!(conn_id = %conn, room = %room, event = name, delivered, "presence broadcast");
    }

    /// `new message`: deliver to the personal room of every member but the
    /// sender.
    fn new_message(&self, conn: ConnectionId, payload: Value) {
        let message = ChatMessage::new(payload);
        let recipients = match message.recipients() {
            Ok(r) => r,
            Err(e) => {
                tracing::warn!(conn_id = %conn, error = %e, "invalid message or chat data");
                return;
            }
        };
        if recipients.unaddressable > 0 {
            tracing::debug!(
                conn_id = %conn,
                count = recipients.unaddressable,
                "skipping chat members without an id"
            );
        }

        let Some(msg) = encode(ServerEvent::MessageReceived(message.into_payload())) else {
            return;
        };
        let mut delivered = 0;
        for room in &recipients.rooms {
            delivered += self.registry.broadcast(room, Some(conn), &msg);
        }
        tracing::debug!(
            conn_id = %conn,
            recipients = recipients.rooms.len(),
            delivered,
            "message fanned out"
        );
    }
}

/// Encodes an outbound event as a text frame, logging failures.
fn encode(event: ServerEvent) -> Option<Message> {
    match codec::encode_server(event) {
        Ok(text) => Some(Message::Text(text.into())),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode outbound event");
            None
        }
    }
}
