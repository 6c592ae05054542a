//! Messages between an endpoint and the relay broker.
//!
//! Each endpoint holds one WebSocket to the broker. It registers under an
//! identity, then opens and uses connections to other endpoints. The broker
//! forwards `data` payloads untouched; they carry [`PeerMessage`] JSON.
//!
//! [`PeerMessage`]: crate::PeerMessage

use serde::{Deserialize, Serialize};

/// Endpoint to broker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayRequest {
    /// Claim `id`, or let the broker pick one.
    Register {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },
    /// Open a connection to `target`. `request` is echoed in `conn_open`.
    Connect { target: String, request: u64 },
    Send { conn: u64, data: serde_json::Value },
    Close { conn: u64 },
}

/// Broker to endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RelayEvent {
    /// Registration succeeded.
    Open { id: String },
    Error { kind: RelayErrorKind, message: String },
    /// Another endpoint connected to this one.
    Connection { conn: u64, peer: String },
    /// A connection this endpoint asked for is open.
    ConnOpen { conn: u64, request: u64 },
    Data { conn: u64, data: serde_json::Value },
    ConnClose { conn: u64 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RelayErrorKind {
    /// The requested identity is already registered.
    UnavailableId,
    /// No endpoint is registered under the dialed identity.
    PeerUnavailable,
    InvalidId,
    Network,
}
