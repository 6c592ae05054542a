//! Peer messages.
//!
//! The host sends `STATE_SYNC` after every state change; a connected remote
//! sends `COMMAND` instead of applying commands itself.

use crate::state::{Command, GameState};
use serde::{Deserialize, Serialize};

/// Envelope exchanged between host and remote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum PeerMessage {
    /// Full authoritative state, host to remote.
    #[serde(rename = "STATE_SYNC", alias = "SYNC_STATE")]
    StateSync(GameState),
    /// A command for the host to apply, remote to host.
    #[serde(rename = "COMMAND")]
    Command(Command),
}

impl PeerMessage {
    pub fn to_value(&self) -> serde_json::Value {
        // Every field is a plain string or integer, so this cannot fail.
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self, DecodeError> {
        Ok(serde_json::from_value(value)?)
    }

    pub fn to_json(&self) -> String {
        self.to_value().to_string()
    }

    pub fn from_json(text: &str) -> Result<Self, DecodeError> {
        Ok(serde_json::from_str(text)?)
    }
}

/// A peer message could not be decoded.
#[derive(Debug, thiserror::Error)]
#[error("malformed peer message: {0}")]
pub struct DecodeError(#[from] serde_json::Error);
