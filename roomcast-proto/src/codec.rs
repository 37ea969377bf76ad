//! Text-frame encoding for the event protocol.
//!
//! Each WebSocket text frame holds exactly one JSON [`Frame`]. Relay side
//! uses [`decode_client`] / [`encode_server`]; clients (and tests) use the
//! mirror pair [`encode_client`] / [`decode_server`].

use crate::event::{ClientEvent, Frame, ServerEvent};

/// Error type for codec encode/decode operations.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The text is not a JSON object of the form `{event, data}`.
    #[error("malformed frame: {0}")]
    Json(#[from] serde_json::Error),
    /// The frame names an event this side does not accept.
    #[error("unknown event: {0:?}")]
    UnknownEvent(String),
}

/// Parses a raw text frame without interpreting the event name.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if `text` is not a valid frame.
pub fn decode_frame(text: &str) -> Result<Frame, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Decodes an inbound text frame into a [`ClientEvent`].
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON and
/// [`CodecError::UnknownEvent`] for unrecognised event names.
pub fn decode_client(text: &str) -> Result<ClientEvent, CodecError> {
    ClientEvent::from_frame(decode_frame(text)?)
}

/// Encodes a [`ServerEvent`] into a text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload cannot be serialized.
pub fn encode_server(event: ServerEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&event.into_frame())?)
}

/// Encodes a [`ClientEvent`] into a text frame.
///
/// # Errors
///
/// Returns [`CodecError::Json`] if the payload cannot be serialized.
pub fn encode_client(event: ClientEvent) -> Result<String, CodecError> {
    Ok(serde_json::to_string(&event.into_frame())?)
}

/// Decodes an outbound text frame into a [`ServerEvent`].
///
/// # Errors
///
/// Returns [`CodecError::Json`] for malformed JSON and
/// [`CodecError::UnknownEvent`] for unrecognised event names.
pub fn decode_server(text: &str) -> Result<ServerEvent, CodecError> {
    ServerEvent::from_frame(decode_frame(text)?)
}
