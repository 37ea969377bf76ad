//! Room identifiers.
//!
//! A room is named either by a user identifier (the user's personal room) or
//! by a chat identifier (a shared room). Both are opaque JSON scalars compared
//! by exact value: the string `"7"` and the number `7` name different rooms,
//! and nothing is trimmed or case-folded.
//!
//! Values that are falsy on the wire (`null`, `false`, `0`, `""`) never name
//! a room. Objects and arrays are rejected as well.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Number, Value};

/// Largest integer an `f64` represents exactly (2^53).
const MAX_EXACT_FLOAT_INT: f64 = 9_007_199_254_740_992.0;

/// Errors raised when constructing an identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IdError {
    /// The value was `null`, `false`, `0` or the empty string.
    #[error("room identifier is empty")]
    Empty,
    /// The value was an object or an array.
    #[error("a JSON {0} cannot name a room")]
    Unsupported(&'static str),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
enum Key {
    Text(String),
    /// Canonical JSON text of a non-zero number.
    Number(String),
    True,
}

/// Name of a room: a user id (personal room) or a chat id (group room).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct RoomId(Key);

impl RoomId {
    /// Creates a room id from a non-empty string.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Empty`] if `id` is empty.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        Ok(Self(Key::Text(id)))
    }

    /// Interprets a JSON value as a room id.
    ///
    /// # Errors
    ///
    /// Returns [`IdError::Empty`] for falsy scalars and
    /// [`IdError::Unsupported`] for objects and arrays.
    pub fn parse(value: &Value) -> Result<Self, IdError> {
        match value {
            Value::String(s) => Self::new(s.as_str()),
            Value::Number(n) => canonical_number(n)
                .map(|text| Self(Key::Number(text)))
                .ok_or(IdError::Empty),
            Value::Bool(true) => Ok(Self(Key::True)),
            Value::Null | Value::Bool(false) => Err(IdError::Empty),
            Value::Array(_) => Err(IdError::Unsupported("array")),
            Value::Object(_) => Err(IdError::Unsupported("object")),
        }
    }

    /// Reads a room id out of a JSON payload value, if it names one.
    #[must_use]
    pub fn from_value(value: &Value) -> Option<Self> {
        Self::parse(value).ok()
    }

    /// Returns the id as it appears on the wire.
    #[must_use]
    pub fn to_value(&self) -> Value {
        match &self.0 {
            Key::Text(s) => Value::String(s.clone()),
            Key::Number(text) => text
                .parse::<Number>()
                .map_or_else(|_| Value::String(text.clone()), Value::Number),
            Key::True => Value::Bool(true),
        }
    }
}

/// Canonical text for a non-zero number, or `None` for zero.
///
/// Integral floats collapse onto the matching integer so `7` and `7.0` name
/// the same room.
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
fn canonical_number(n: &Number) -> Option<String> {
    if let Some(i) = n.as_i64() {
        return (i != 0).then(|| i.to_string());
    }
    if let Some(u) = n.as_u64() {
        return Some(u.to_string());
    }
    let f = n.as_f64()?;
    if f == 0.0 {
        return None;
    }
    if f.fract() == 0.0 && f.abs() < MAX_EXACT_FLOAT_INT {
        return Some((f as i64).to_string());
    }
    Some(n.to_string())
}

impl fmt::Display for RoomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Key::Text(s) | Key::Number(s) => f.write_str(s),
            Key::True => f.write_str("true"),
        }
    }
}

impl TryFrom<Value> for RoomId {
    type Error = IdError;

    fn try_from(value: Value) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<RoomId> for Value {
    fn from(id: RoomId) -> Self {
        id.to_value()
    }
}

impl TryFrom<&str> for RoomId {
    type Error = IdError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}
