//! Relay broker for the pool calculator.
//!
//! Endpoints register an identity over a WebSocket, then open connections
//! to each other by identity. The broker relays their messages and tells
//! each side when the other goes away.

pub mod relay;
pub mod server;
