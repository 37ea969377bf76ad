//! Named events exchanged between clients and the relay.
//!
//! Every WebSocket text frame carries one [`Frame`]: an event name plus an
//! optional JSON payload. [`ClientEvent`] is the typed view of the five
//! inbound events, [`ServerEvent`] of the four outbound ones.
//!
//! Payload interpretation is lenient. A frame with a known event name always
//! converts to a [`ClientEvent`]; a missing or unusable identifier becomes
//! `None` so the relay can drop the event without treating it as a protocol
//! error.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::codec::CodecError;
use crate::id::RoomId;

/// Inbound: join the caller's personal room.
pub const SETUP: &str = "setup";
/// Inbound: join a chat room.
pub const JOIN_ROOM: &str = "join room";
/// Inbound and outbound: typing started in a room.
pub const TYPING: &str = "typing";
/// Inbound and outbound: typing stopped in a room.
pub const STOP_TYPING: &str = "stop typing";
/// Inbound: a chat message to fan out to the chat's members.
pub const NEW_MESSAGE: &str = "new message";
/// Outbound: acknowledgement of `setup`.
pub const CONNECTED: &str = "connected";
/// Outbound: a chat message delivered to a member's personal room.
pub const MESSAGE_RECEIVED: &str = "message received";

/// One event on the wire: `{ "event": <name>, "data": <payload> }`.
///
/// `data` is omitted when the event carries no payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Event name, e.g. `"join room"`.
    pub event: String,
    /// Event payload; `null` when absent.
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub data: Value,
}

impl Frame {
    /// Builds a frame with a payload.
    #[must_use]
    pub fn new(event: impl Into<String>, data: Value) -> Self {
        Self {
            event: event.into(),
            data,
        }
    }

    /// Builds a frame with no payload.
    #[must_use]
    pub fn bare(event: impl Into<String>) -> Self {
        Self::new(event, Value::Null)
    }
}

/// Events a client sends to the relay.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    /// `setup` with the user id from `data.id`, if usable.
    Setup(Option<RoomId>),
    /// `join room` with the chat id from `data`, if usable.
    JoinRoom(Option<RoomId>),
    /// `typing` in the room named by `data`, if usable.
    Typing(Option<RoomId>),
    /// `stop typing` in the room named by `data`, if usable.
    StopTyping(Option<RoomId>),
    /// `new message` carrying the raw chat message payload.
    NewMessage(Value),
}

impl ClientEvent {
    /// Returns the wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Setup(_) => SETUP,
            Self::JoinRoom(_) => JOIN_ROOM,
            Self::Typing(_) => TYPING,
            Self::StopTyping(_) => STOP_TYPING,
            Self::NewMessage(_) => NEW_MESSAGE,
        }
    }

    /// Interprets a frame as an inbound event.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownEvent`] if the event name is not one of
    /// the five inbound events.
    pub fn from_frame(frame: Frame) -> Result<Self, CodecError> {
        let Frame { event, data } = frame;
        match event.as_str() {
            SETUP => Ok(Self::Setup(data.get("id").and_then(RoomId::from_value))),
            JOIN_ROOM => Ok(Self::JoinRoom(RoomId::from_value(&data))),
            TYPING => Ok(Self::Typing(RoomId::from_value(&data))),
            STOP_TYPING => Ok(Self::StopTyping(RoomId::from_value(&data))),
            NEW_MESSAGE => Ok(Self::NewMessage(data)),
            _ => Err(CodecError::UnknownEvent(event)),
        }
    }

    /// Converts the event into its wire frame.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        let name = self.name();
        let data = match self {
            Self::Setup(Some(id)) => json!({ "id": id }),
            Self::JoinRoom(Some(room)) | Self::Typing(Some(room)) | Self::StopTyping(Some(room)) => {
                Value::from(room)
            }
            Self::NewMessage(payload) => payload,
            Self::Setup(None) | Self::JoinRoom(None) | Self::Typing(None) | Self::StopTyping(None) => {
                Value::Null
            }
        };
        Frame::new(name, data)
    }
}

/// Events the relay sends to clients.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    /// Acknowledges a successful `setup`.
    Connected,
    /// Another connection in a shared room started typing.
    Typing,
    /// Another connection in a shared room stopped typing.
    StopTyping,
    /// A chat message for one of the recipient's chats, unmodified.
    MessageReceived(Value),
}

impl ServerEvent {
    /// Returns the wire name of this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connected => CONNECTED,
            Self::Typing => TYPING,
            Self::StopTyping => STOP_TYPING,
            Self::MessageReceived(_) => MESSAGE_RECEIVED,
        }
    }

    /// Interprets a frame as an outbound event.
    ///
    /// # Errors
    ///
    /// Returns [`CodecError::UnknownEvent`] if the event name is not one of
    /// the four outbound events.
    pub fn from_frame(frame: Frame) -> Result<Self, CodecError> {
        match frame.event.as_str() {
            CONNECTED => Ok(Self::Connected),
            TYPING => Ok(Self::Typing),
            STOP_TYPING => Ok(Self::StopTyping),
            MESSAGE_RECEIVED => Ok(Self::MessageReceived(frame.data)),
            _ => Err(CodecError::UnknownEvent(frame.event)),
        }
    }

    /// Converts the event into its wire frame.
    #[must_use]
    pub fn into_frame(self) -> Frame {
        match self {
            Self::MessageReceived(payload) => Frame::new(MESSAGE_RECEIVED, payload),
            other => Frame::bare(other.name()),
        }
    }
}
