//! Shared protocol definitions for the Roomcast event relay.

pub mod codec;
pub mod event;
pub mod id;
pub mod message;
