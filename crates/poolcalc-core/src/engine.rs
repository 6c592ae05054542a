//! The command engine.
//!
//! `apply_command` is a pure function of the current state and a command.
//! It never fails: a command whose guard does not hold leaves the balances
//! as they were.

use crate::state::{Command, Cue, GameState, NameSlot, STAKE};

/// Result of applying one command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outcome {
    /// The next state.
    pub state: GameState,
    /// Sound cue to play, if the command has one.
    pub cue: Option<Cue>,
}

impl Outcome {
    fn silent(state: GameState) -> Self {
        Self { state, cue: None }
    }

    fn with_cue(state: GameState, cue: Cue) -> Self {
        Self {
            state,
            cue: Some(cue),
        }
    }
}

/// Apply `command` to `state`, returning the next state and its cue.
pub fn apply_command(state: &GameState, command: &Command) -> Outcome {
    let mut next = state.clone();

    match command {
        Command::Add1000 => {
            if let Some((p1, p2, shown)) = stake(state) {
                next.p1_change = p1;
                next.p2_change = p2;
                next.display_value = shown;
            }
            Outcome::silent(next)
        }

        Command::Sub1000 => {
            if let Some((p1, p2, shown)) = unstake(state) {
                next.p1_change = p1;
                next.p2_change = p2;
                next.display_value = shown;
            }
            Outcome::silent(next)
        }

        Command::Equals => {
            if let Some((p1, p2, pool)) = commit(state) {
                next.player1 = p1;
                next.player2 = p2;
                next.pool = pool;
            }
            next.clear_stage();
            Outcome::with_cue(next, Cue::Up)
        }

        Command::SendToP1 => {
            if let Some(p1) = payout(state.player1, state.pool) {
                next.player1 = p1;
                next.pool = 0;
            }
            next.clear_stage();
            Outcome::with_cue(next, Cue::Up)
        }

        Command::SendToP2 => {
            if let Some(p2) = payout(state.player2, state.pool) {
                next.player2 = p2;
                next.pool = 0;
            }
            next.clear_stage();
            Outcome::with_cue(next, Cue::Up)
        }

        Command::ClearPool => {
            if state.pool > 0 {
                next.pool = 0;
            }
            next.clear_stage();
            Outcome::with_cue(next, Cue::Down)
        }

        Command::Reset => Outcome::with_cue(GameState::initial(), Cue::Confirm),

        Command::UpdateName { id, value } => {
            match NameSlot::from_id(id) {
                Some(NameSlot::First) => next.name1 = value.clone(),
                Some(NameSlot::Second) => next.name2 = value.clone(),
                None => {}
            }
            Outcome::silent(next)
        }
    }
}

// Any arithmetic that would overflow counts as a failed guard.

/// Staged values after one more stake from each player, if both can cover it.
/// The guard checks the stage as it stands, not the stage after this press.
fn stake(state: &GameState) -> Option<(i64, i64, i64)> {
    let p1_left = state.player1.checked_add(state.p1_change)?;
    let p2_left = state.player2.checked_add(state.p2_change)?;
    if p1_left < STAKE || p2_left < STAKE {
        return None;
    }
    Some((
        state.p1_change.checked_sub(STAKE)?,
        state.p2_change.checked_sub(STAKE)?,
        state.display_value.checked_add(2 * STAKE)?,
    ))
}

fn unstake(state: &GameState) -> Option<(i64, i64, i64)> {
    Some((
        state.p1_change.checked_add(STAKE)?,
        state.p2_change.checked_add(STAKE)?,
        state.display_value.checked_sub(2 * STAKE)?,
    ))
}

/// Committed balances and pool, if nothing would go negative.
fn commit(state: &GameState) -> Option<(i64, i64, i64)> {
    let p1 = state.player1.checked_add(state.p1_change)?;
    let p2 = state.player2.checked_add(state.p2_change)?;
    let pool = state.pool.checked_add(state.display_value)?;
    (p1 >= 0 && p2 >= 0 && pool >= 0).then_some((p1, p2, pool))
}

fn payout(balance: i64, pool: i64) -> Option<i64> {
    if pool > 0 {
        balance.checked_add(pool)
    } else {
        None
    }
}
