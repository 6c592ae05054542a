//! Terminal input and status rendering.

use poolcalc_core::{Command, GameState, NameSlot};
use poolcalc_session::{ConnectionStatus, Role};

/// One line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Input {
    Host,
    Join,
    Connect(String),
    Disconnect,
    Command(Command),
    Show,
    Help,
    Quit,
}

pub const HELP: &str = "\
  host | join | connect <code> | disconnect
  +  -  =          stake 1000 each, unstake, commit
  p1 | p2          pay the pool to a player
  clear | reset    empty the pool, start over
  name1 <text> | name2 <text>
  state | help | quit";

/// Parse a line. `None` for blank or unrecognized input.
pub fn parse(line: &str) -> Option<Input> {
    let line = line.trim();
    let (word, rest) = match line.split_once(char::is_whitespace) {
        Some((word, rest)) => (word, rest.trim()),
        None => (line, ""),
    };

    let input = match word.to_ascii_lowercase().as_str() {
        "host" => Input::Host,
        "join" => Input::Join,
        "connect" => Input::Connect(rest.to_string()),
        "disconnect" => Input::Disconnect,
        "+" => Input::Command(Command::Add1000),
        "-" => Input::Command(Command::Sub1000),
        "=" => Input::Command(Command::Equals),
        "p1" => Input::Command(Command::SendToP1),
        "p2" => Input::Command(Command::SendToP2),
        "clear" => Input::Command(Command::ClearPool),
        "reset" => Input::Command(Command::Reset),
        "name1" => Input::Command(Command::rename(NameSlot::First, rest)),
        "name2" => Input::Command(Command::rename(NameSlot::Second, rest)),
        "state" => Input::Show,
        "help" | "?" => Input::Help,
        "quit" | "exit" => Input::Quit,
        _ => return None,
    };
    Some(input)
}

/// Single-line summary of the board.
pub fn render(state: &GameState) -> String {
    format!(
        "{}: {}{}  | pool: {}{} |  {}: {}{}",
        state.name1,
        state.player1,
        delta(state.p1_change),
        state.pool,
        delta(state.display_value),
        state.name2,
        state.player2,
        delta(state.p2_change),
    )
}

pub fn render_session(role: Role, status: ConnectionStatus, local_id: Option<&str>) -> String {
    let role = match role {
        Role::None => return "offline".to_string(),
        Role::Host => "host",
        Role::Remote => "remote",
    };
    let status = match status {
        ConnectionStatus::Connected => "connected",
        ConnectionStatus::Disconnected => "waiting",
    };
    format!("{role} {} ({status})", local_id.unwrap_or("..."))
}

fn delta(value: i64) -> String {
    if value == 0 {
        String::new()
    } else {
        format!(" ({value:+})")
    }
}
