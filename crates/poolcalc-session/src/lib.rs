//! Session coordination for the pool calculator.
//!
//! A [`Session`] owns one game state and, optionally, a link to a peer. The
//! host applies every command and pushes the resulting state to its remote;
//! a connected remote forwards commands and mirrors whatever the host sends.
//!
//! The session never touches the network itself. It talks to a
//! [`Transport`] and reacts to the [`TransportEvent`]s the caller feeds it,
//! one at a time, in delivery order.

mod coordinator;
mod cue;
mod transport;

pub use coordinator::{ConnectionStatus, Role, Session, SessionError};
pub use cue::{CueError, CueSink, SilentCues};
pub use transport::{
    ConnectionHandle, EndpointHandle, Transport, TransportError, TransportErrorKind,
    TransportEvent,
};
