//! Peer identities and room codes.
//!
//! A host registers under a three-digit, zero-padded room code such as
//! `042`. A remote registers under whatever the transport hands it and
//! dials the host by room code.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Number of characters in a room code.
pub const ROOM_CODE_LEN: usize = 3;

/// An addressable transport identity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PeerId(String);

impl PeerId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Draw a random host room code, `000` through `999`.
    pub fn random_room_code<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self(format!("{:03}", rng.gen_range(0..1000u16)))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// True for ids shaped like a host room code.
    pub fn is_room_code(&self) -> bool {
        self.0.len() == ROOM_CODE_LEN && self.0.bytes().all(|b| b.is_ascii_digit())
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<RoomCode> for PeerId {
    fn from(code: RoomCode) -> Self {
        Self(code.0)
    }
}

/// A join code entered by the remote user.
///
/// Only the length is checked; the host decides whether it exists.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoomCode(String);

impl RoomCode {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RoomCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RoomCode {
    type Err = RoomCodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let code = s.trim();
        if code.is_empty() {
            return Err(RoomCodeError::Empty);
        }
        let len = code.chars().count();
        if len != ROOM_CODE_LEN {
            return Err(RoomCodeError::WrongLength(len));
        }
        Ok(Self(code.to_string()))
    }
}

/// Error parsing a room code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RoomCodeError {
    #[error("room code cannot be empty")]
    Empty,
    #[error("room code must be 3 characters, got {0}")]
    WrongLength(usize),
}
