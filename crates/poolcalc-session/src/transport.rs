//! The peer transport seam.
//!
//! A transport registers endpoints under an identity, dials other endpoints
//! and carries [`PeerMessage`]s over the resulting connections. Everything it
//! learns asynchronously comes back as a [`TransportEvent`] tagged with the
//! handle it concerns, so a session can drop events for handles it has
//! already released.

use poolcalc_core::{PeerId, PeerMessage, RelayErrorKind};
use std::fmt;

/// A registered (or registering) endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EndpointHandle(pub u64);

/// One connection between two endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionHandle(pub u64);

/// Operations a session needs from the underlying peer link.
///
/// None of these block. Results arrive later as events.
pub trait Transport {
    /// Register a new endpoint, asking for `preferred` as its identity.
    /// With `None` the transport picks one.
    fn create_endpoint(&mut self, preferred: Option<&PeerId>) -> EndpointHandle;

    /// Dial `target` from `endpoint`.
    fn connect(&mut self, endpoint: EndpointHandle, target: &PeerId) -> ConnectionHandle;

    /// Queue a message on an open connection.
    fn send(&mut self, conn: ConnectionHandle, message: &PeerMessage)
    -> Result<(), TransportError>;

    fn close(&mut self, conn: ConnectionHandle);

    fn destroy(&mut self, endpoint: EndpointHandle);
}

/// Something the transport observed.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The endpoint is registered under `id`.
    EndpointOpen { endpoint: EndpointHandle, id: PeerId },
    EndpointError {
        endpoint: EndpointHandle,
        error: TransportError,
    },
    /// Another endpoint dialed this one.
    IncomingConnection {
        endpoint: EndpointHandle,
        conn: ConnectionHandle,
        peer: PeerId,
    },
    /// An outbound connection is ready.
    ConnectionOpen { conn: ConnectionHandle },
    ConnectionData {
        conn: ConnectionHandle,
        message: PeerMessage,
    },
    ConnectionClosed { conn: ConnectionHandle },
    ConnectionError {
        conn: ConnectionHandle,
        error: TransportError,
    },
}

/// Error categories a transport distinguishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportErrorKind {
    /// The requested identity is already registered.
    UnavailableId,
    /// The dialed identity is not registered.
    PeerUnavailable,
    InvalidId,
    Network,
    Other,
}

impl TransportErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransportErrorKind::UnavailableId => "unavailable-id",
            TransportErrorKind::PeerUnavailable => "peer-unavailable",
            TransportErrorKind::InvalidId => "invalid-id",
            TransportErrorKind::Network => "network",
            TransportErrorKind::Other => "other",
        }
    }
}

impl From<RelayErrorKind> for TransportErrorKind {
    fn from(kind: RelayErrorKind) -> Self {
        match kind {
            RelayErrorKind::UnavailableId => TransportErrorKind::UnavailableId,
            RelayErrorKind::PeerUnavailable => TransportErrorKind::PeerUnavailable,
            RelayErrorKind::InvalidId => TransportErrorKind::InvalidId,
            RelayErrorKind::Network => TransportErrorKind::Network,
        }
    }
}

impl fmt::Display for TransportErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error reported by the transport.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct TransportError {
    pub kind: TransportErrorKind,
    pub message: String,
}

impl TransportError {
    pub fn new(kind: TransportErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    pub fn is_unavailable_id(&self) -> bool {
        self.kind == TransportErrorKind::UnavailableId
    }
}
