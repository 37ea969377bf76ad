//! Read-only view over a `new message` payload.
//!
//! The relay never rewrites chat messages. It only needs two things out of
//! the payload: the chat's member list (`chatId.users[]._id`) and the
//! sender's id (`sender._id`). Everything else rides along untouched and is
//! delivered verbatim in `message received`.

use serde_json::Value;

use crate::id::RoomId;

/// Reasons a `new message` payload cannot be routed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageError {
    /// The payload has no `chatId` object with a `users` array.
    #[error("message has no chat member list (chatId.users)")]
    MissingMembers,
    /// The payload has no `sender`.
    #[error("message has no sender")]
    MissingSender,
}

/// A chat message as produced by the message-creation endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatMessage {
    payload: Value,
}

/// Personal rooms a message must be delivered to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recipients {
    /// Members other than the sender, in member-list order, without repeats.
    pub rooms: Vec<RoomId>,
    /// Member entries that had no usable `_id`.
    pub unaddressable: usize,
}

impl ChatMessage {
    /// Wraps a raw payload.
    #[must_use]
    pub const fn new(payload: Value) -> Self {
        Self { payload }
    }

    /// Returns the payload exactly as received.
    #[must_use]
    pub const fn payload(&self) -> &Value {
        &self.payload
    }

    /// Consumes the view, returning the payload.
    #[must_use]
    pub fn into_payload(self) -> Value {
        self.payload
    }

    /// Returns the raw `sender._id`, if the sender has one.
    #[must_use]
    pub fn sender_id(&self) -> Option<&Value> {
        self.payload.get("sender").and_then(|s| s.get("_id"))
    }

    /// Computes the personal rooms this message fans out to.
    ///
    /// Members are skipped when their `_id` equals the sender's `_id` as a
    /// JSON value: no trimming, case folding or number/string coercion. A
    /// member and sender that both lack `_id` count as equal. Members whose
    /// `_id` is falsy or not a scalar cannot name a room and are counted in
    /// [`Recipients::unaddressable`].
    ///
    /// # Errors
    ///
    /// Returns [`MessageError::MissingMembers`] if `chatId.users` is absent
    /// or not an array, and [`MessageError::MissingSender`] if `sender` is
    /// absent or `null`.
    pub fn recipients(&self) -> Result<Recipients, MessageError> {
        let members = self
            .payload
            .get("chatId")
            .and_then(|chat| chat.get("users"))
            .and_then(Value::as_array)
            .ok_or(MessageError::MissingMembers)?;

        if self.payload.get("sender").is_none_or(Value::is_null) {
            return Err(MessageError::MissingSender);
        }
        let sender_id = self.sender_id();

        let mut recipients = Recipients::default();
        for member in members {
            let member_id = member.get("_id");
            if member_id == sender_id {
                continue;
            }
            match member_id.and_then(RoomId::from_value) {
                Some(room) if !recipients.rooms.contains(&room) => recipients.rooms.push(room),
                Some(_) => {}
                None => recipients.unaddressable += 1,
            }
        }
        Ok(recipients)
    }
}

impl From<Value> for ChatMessage {
    fn from(payload: Value) -> Self {
        Self::new(payload)
    }
}
