//! Core types for the pool calculator.
//!
//! This crate holds the shared game state, the command engine that advances
//! it, the messages two peers exchange to keep their copies in step, and the
//! framing both peers use to talk through the relay broker. Nothing here
//! performs I/O.

mod engine;
mod identity;
mod message;
mod relay;
mod state;

pub use engine::{Outcome, apply_command};
pub use identity::{PeerId, ROOM_CODE_LEN, RoomCode, RoomCodeError};
pub use message::{DecodeError, PeerMessage};
pub use relay::{RelayErrorKind, RelayEvent, RelayRequest};
pub use state::{Command, Cue, GameState, NameSlot, STAKE, STARTING_BALANCE};
