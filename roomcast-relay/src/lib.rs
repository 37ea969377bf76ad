//! Roomcast relay server library.
//!
//! Exposes the relay server for use in tests and embedding.
//! The relay accepts WebSocket connections, tracks which rooms each
//! connection belongs to, and fans chat events out to room members.

pub mod config;
pub mod registry;
pub mod relay;
pub mod server;
