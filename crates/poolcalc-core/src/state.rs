//! Game state and the commands that act on it.

use serde::{Deserialize, Serialize};

/// Balance each player starts a session with.
pub const STARTING_BALANCE: i64 = 10_000;

/// Amount each player stakes per ADD_1000 / SUB_1000 press.
pub const STAKE: i64 = 1_000;

/// The shared numeric state of one session.
///
/// Values are replaced wholesale on every transition. `display_value`,
/// `p1_change` and `p2_change` hold the staged transfer that the next
/// EQUALS commits; they are zero at rest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GameState {
    pub player1: i64,
    pub player2: i64,
    pub pool: i64,
    pub name1: String,
    pub name2: String,
    pub display_value: i64,
    pub p1_change: i64,
    pub p2_change: i64,
}

impl GameState {
    /// The fixed starting state: both players at the starting balance, an
    /// empty pool, nothing staged and default names.
    pub fn initial() -> Self {
        Self {
            player1: STARTING_BALANCE,
            player2: STARTING_BALANCE,
            pool: 0,
            name1: "Player 1".to_string(),
            name2: "Player 2".to_string(),
            display_value: 0,
            p1_change: 0,
            p2_change: 0,
        }
    }

    /// Money held by both players and the pool together. Saturates rather
    /// than overflowing on mirrored states with extreme values.
    pub fn total(&self) -> i64 {
        self.player1
            .saturating_add(self.player2)
            .saturating_add(self.pool)
    }

    /// True when no transfer is staged.
    pub fn is_settled(&self) -> bool {
        self.display_value == 0 && self.p1_change == 0 && self.p2_change == 0
    }

    pub(crate) fn clear_stage(&mut self) {
        self.display_value = 0;
        self.p1_change = 0;
        self.p2_change = 0;
    }
}

impl Default for GameState {
    fn default() -> Self {
        Self::initial()
    }
}

/// A user-issued command.
///
/// Serialized as `{"command": NAME}` or, for name updates,
/// `{"command": "UPDATE_NAME", "payload": {"id": .., "value": ..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "command", content = "payload")]
pub enum Command {
    #[serde(rename = "ADD_1000")]
    Add1000,
    #[serde(rename = "SUB_1000")]
    Sub1000,
    #[serde(rename = "EQUALS")]
    Equals,
    #[serde(rename = "SEND_TO_P1")]
    SendToP1,
    #[serde(rename = "SEND_TO_P2")]
    SendToP2,
    #[serde(rename = "CLEAR_POOL")]
    ClearPool,
    #[serde(rename = "RESET")]
    Reset,
    #[serde(rename = "UPDATE_NAME")]
    UpdateName { id: String, value: String },
}

impl Command {
    /// Build a name update for one of the two labels.
    pub fn rename(slot: NameSlot, value: impl Into<String>) -> Self {
        Command::UpdateName {
            id: slot.id().to_string(),
            value: value.into(),
        }
    }

    /// Wire name of the command.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Add1000 => "ADD_1000",
            Command::Sub1000 => "SUB_1000",
            Command::Equals => "EQUALS",
            Command::SendToP1 => "SEND_TO_P1",
            Command::SendToP2 => "SEND_TO_P2",
            Command::ClearPool => "CLEAR_POOL",
            Command::Reset => "RESET",
            Command::UpdateName { .. } => "UPDATE_NAME",
        }
    }
}

/// Which display label a name update targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NameSlot {
    First,
    Second,
}

impl NameSlot {
    /// The field id carried in UPDATE_NAME payloads.
    pub fn id(&self) -> &'static str {
        match self {
            NameSlot::First => "name1",
            NameSlot::Second => "name2",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id {
            "name1" => Some(NameSlot::First),
            "name2" => Some(NameSlot::Second),
            _ => None,
        }
    }
}

/// Advisory sound cue handed to the audio collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Cue {
    Up,
    Down,
    Confirm,
    Connect,
}

impl Cue {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cue::Up => "up",
            Cue::Down => "down",
            Cue::Confirm => "confirm",
            Cue::Connect => "connect",
        }
    }
}
